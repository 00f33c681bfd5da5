//! End-to-end CABAC decoding: a P picture whose macroblocks are all coded
//! as mb_skip_flag = 1 under an arithmetic-coded PPS, reproducing the CAVLC
//! skip-run picture sample for sample.

mod common;

use common::{annex_b_unit, idr_black_slice_nal, pps_nal, sps_nal, BitWriter};
use kestrel_avc::Decoder;

/// A second PPS with entropy_coding_mode_flag set; the non-IDR slices below
/// reference it while the IDR keeps the CAVLC PPS 0.
fn cabac_pps_nal() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(1); // pic_parameter_set_id
    w.ue(0); // seq_parameter_set_id
    w.bit(true); // entropy_coding_mode_flag (CABAC)
    w.bit(false); // bottom_field_pic_order_in_frame_present_flag
    w.ue(0); // num_slice_groups_minus1
    w.ue(0); // num_ref_idx_l0_default_active_minus1
    w.ue(0); // num_ref_idx_l1_default_active_minus1
    w.bit(false); // weighted_pred_flag
    w.bits(0, 2); // weighted_bipred_idc
    w.se(14); // pic_init_qp_minus26 -> SliceQpY 40
    w.se(0); // pic_init_qs_minus26
    w.se(0); // chroma_qp_index_offset
    w.bit(true); // deblocking_filter_control_present_flag
    w.bit(false); // constrained_intra_pred_flag
    w.bit(false); // redundant_pic_cnt_present_flag
    w.rbsp_trailing();
    annex_b_unit(0x68, w.into_bytes())
}

/// A CABAC P slice whose every macroblock decodes mb_skip_flag = 1.
///
/// The arithmetic data is two bytes giving codIOffset 0 after the nine
/// initialization bits: each skip context decision then lands in the MPS
/// subinterval (the context initializes with valMPS = 1 at SliceQpY 40),
/// and every interior end_of_slice_flag stays below codIRange - 2, so no
/// renormalisation bits are consumed.
fn p_skip_cabac_slice_nal(frame_num: u32, poc_lsb: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(0); // first_mb_in_slice
    w.ue(5); // slice_type P (all slices of the picture)
    w.ue(1); // pic_parameter_set_id -> the CABAC PPS
    w.bits(frame_num & 0xf, 4); // frame_num
    w.bits(poc_lsb & 0xf, 4); // pic_order_cnt_lsb
    w.bit(false); // num_ref_idx_active_override_flag
    w.bit(false); // ref_pic_list_modification_flag_l0
    w.bit(false); // adaptive_ref_pic_marking_mode_flag
    w.ue(0); // cabac_init_idc
    w.se(0); // slice_qp_delta
    w.ue(1); // disable_deblocking_filter_idc
    w.align_ones(); // cabac_alignment_one_bit
    w.bytes(&[0x00, 0x20]);
    annex_b_unit(0x61, w.into_bytes())
}

#[test]
fn cabac_skip_copies_whole_picture() {
    let stream = [
        sps_nal(2, 2),
        pps_nal(),
        cabac_pps_nal(),
        idr_black_slice_nal(4),
        p_skip_cabac_slice_nal(1, 2),
    ]
    .concat();

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pictures.len(), 2);

    let pocs: Vec<i32> = output.pictures.iter().map(|p| p.poc).collect();
    assert_eq!(pocs, vec![0, 2]);

    // The CABAC-skipped picture reproduces the reference exactly.
    for pic in &output.pictures {
        let luma = pic.cropped_plane(0);
        assert_eq!(luma.len(), 32 * 32);
        assert!(luma.iter().all(|&v| v == 0));
        for plane in 1..3 {
            let chroma = pic.cropped_plane(plane);
            assert!(chroma.iter().all(|&v| v == 128));
        }
    }
}

#[test]
fn cabac_and_cavlc_skip_agree() {
    // Scenario pair: the same skipped-P content coded with either entropy
    // coder produces identical samples.
    let cavlc_stream = [
        sps_nal(2, 2),
        pps_nal(),
        idr_black_slice_nal(4),
        common::p_skip_slice_nal(1, 2, 4),
    ]
    .concat();
    let cabac_stream = [
        sps_nal(2, 2),
        pps_nal(),
        cabac_pps_nal(),
        idr_black_slice_nal(4),
        p_skip_cabac_slice_nal(1, 2),
    ]
    .concat();

    let mut cavlc_dec = Decoder::new();
    let cavlc_out = cavlc_dec.decode_annex_b(&cavlc_stream).unwrap();
    let mut cabac_dec = Decoder::new();
    let cabac_out = cabac_dec.decode_annex_b(&cabac_stream).unwrap();

    assert_eq!(cavlc_out.pictures.len(), cabac_out.pictures.len());
    for (a, b) in cavlc_out.pictures.iter().zip(cabac_out.pictures.iter()) {
        assert_eq!(a.poc, b.poc);
        for plane in 0..3 {
            assert_eq!(
                a.cropped_plane(plane),
                b.cropped_plane(plane),
                "plane {} differs at POC {}",
                plane,
                a.poc
            );
        }
    }
}

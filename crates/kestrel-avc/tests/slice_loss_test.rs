//! Slice loss and the concealment hook: a picture whose second slice never
//! arrives is completed by the policy and flagged.

mod common;

use common::{annex_b_unit, pps_nal, sps_nal, BitWriter};
use kestrel_avc::{DecodeError, Decoder, NoConcealment};

/// An IDR slice covering only the first macroblock of a two-MB picture.
fn partial_idr_slice() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(0); // first_mb_in_slice
    w.ue(7); // slice_type I
    w.ue(0); // pic_parameter_set_id
    w.bits(0, 4); // frame_num
    w.ue(0); // idr_pic_id
    w.bits(0, 4); // pic_order_cnt_lsb
    w.bit(false); // no_output_of_prior_pics_flag
    w.bit(false); // long_term_reference_flag
    w.se(0); // slice_qp_delta
    w.ue(1); // disable_deblocking_filter_idc
    // One black I_16x16 DC macroblock, then the slice ends.
    w.ue(3);
    w.ue(0);
    w.se(0);
    w.bits(0b000101, 6);
    w.bits(0, 15);
    w.bit(true);
    w.bits(31, 12);
    w.bit(true);
    w.rbsp_trailing();
    annex_b_unit(0x65, w.into_bytes())
}

#[test]
fn lost_slice_invokes_concealment() {
    let stream = [sps_nal(2, 1), pps_nal(), partial_idr_slice()].concat();

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();

    assert_eq!(output.pictures.len(), 1);
    let pic = &output.pictures[0];
    assert!(pic.concealed);
    assert!(output
        .errors
        .iter()
        .any(|e| matches!(e.kind(), DecodeError::SliceLoss(_))));

    let luma = pic.cropped_plane(0);
    // The received MB decoded to black; the lost MB was filled by the
    // frame-copy policy (mid-grey with an empty DPB).
    assert!(luma[..16].iter().all(|&v| v == 0));
    assert!(luma[16..32].iter().all(|&v| v == 128));
}

#[test]
fn disabled_concealment_keeps_zeroed_samples() {
    let stream = [sps_nal(2, 1), pps_nal(), partial_idr_slice()].concat();

    let mut decoder = Decoder::new();
    decoder.set_concealment(Box::new(NoConcealment));
    let output = decoder.decode_annex_b(&stream).unwrap();

    assert_eq!(output.pictures.len(), 1);
    let pic = &output.pictures[0];
    assert!(pic.concealed);
    let luma = pic.cropped_plane(0);
    assert!(luma[16..32].iter().all(|&v| v == 0));
}

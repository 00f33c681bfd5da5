//! Shared helpers for the integration tests: a bit writer and canned
//! Annex B stream builders.
#![allow(dead_code)]

/// MSB-first bit writer for assembling test bitstreams.
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit_count: 0,
        }
    }

    pub fn bit(&mut self, value: bool) {
        if self.bit_count == 0 {
            self.bytes.push(0);
        }
        if value {
            let last = self.bytes.last_mut().unwrap();
            *last |= 1 << (7 - self.bit_count);
        }
        self.bit_count = (self.bit_count + 1) % 8;
    }

    pub fn bits(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            self.bit((value >> i) & 1 != 0);
        }
    }

    pub fn ue(&mut self, value: u32) {
        let code = value + 1;
        let len = 32 - code.leading_zeros() as u8;
        self.bits(0, len - 1);
        self.bits(code, len);
    }

    pub fn se(&mut self, value: i32) {
        let code = if value <= 0 {
            (-2 * value) as u32
        } else {
            (2 * value - 1) as u32
        };
        self.ue(code);
    }

    pub fn rbsp_trailing(&mut self) {
        self.bit(true);
        while self.bit_count != 0 {
            self.bit(false);
        }
    }

    /// cabac_alignment_one_bit: pad with 1-bits to the next byte boundary.
    pub fn align_ones(&mut self) {
        while self.bit_count != 0 {
            self.bit(true);
        }
    }

    /// Append raw bytes; the writer must be byte-aligned.
    pub fn bytes(&mut self, data: &[u8]) {
        assert_eq!(self.bit_count, 0, "unaligned raw byte append");
        self.bytes.extend_from_slice(data);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Wrap an EBSP-free payload as one Annex B NAL unit.
pub fn annex_b_unit(header_byte: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x00, 0x01, header_byte];
    // Insert emulation prevention where the payload would mimic a start
    // code. The canned streams below never need it, but keep them honest.
    let mut zeros = 0;
    for byte in payload {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(byte);
    }
    out
}

/// A Baseline 4:2:0 8-bit SPS for a `width_mbs` x `height_mbs` frame
/// picture, poc type 0 with 4-bit lsb.
pub fn sps_nal(width_mbs: u32, height_mbs: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.bits(66, 8); // profile_idc Baseline
    w.bits(0, 8); // constraint flags + reserved
    w.bits(30, 8); // level_idc 3.0
    w.ue(0); // seq_parameter_set_id
    w.ue(0); // log2_max_frame_num_minus4
    w.ue(0); // pic_order_cnt_type
    w.ue(0); // log2_max_pic_order_cnt_lsb_minus4
    w.ue(4); // max_num_ref_frames
    w.bit(false); // gaps_in_frame_num_value_allowed_flag
    w.ue(width_mbs - 1); // pic_width_in_mbs_minus1
    w.ue(height_mbs - 1); // pic_height_in_map_units_minus1
    w.bit(true); // frame_mbs_only_flag
    w.bit(true); // direct_8x8_inference_flag
    w.bit(false); // frame_cropping_flag
    w.bit(false); // vui_parameters_present_flag
    w.rbsp_trailing();
    annex_b_unit(0x67, w.into_bytes())
}

/// A CAVLC PPS with pic_init_qp 40 and deblocking control in the headers.
pub fn pps_nal() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(0); // pic_parameter_set_id
    w.ue(0); // seq_parameter_set_id
    w.bit(false); // entropy_coding_mode_flag (CAVLC)
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

/// Write the common IDR slice-header prefix (deblocking off).
fn idr_slice_header(w: &mut BitWriter, first_mb: u32) {
    w.ue(first_mb); // first_mb_in_slice
    w.ue(7); // slice_type I (all slices of the picture)
    w.ue(0); // pic_parameter_set_id
    w.bits(0, 4); // frame_num
    w.ue(0); // idr_pic_id
    w.bits(0, 4); // pic_order_cnt_lsb
    w.bit(false); // no_output_of_prior_pics_flag
    w.bit(false); // long_term_reference_flag
    w.se(0); // slice_qp_delta
    w.ue(1); // disable_deblocking_filter_idc: off
}

/// One all-black I_16x16 DC macroblock. The first MB of a picture carries a
/// luma DC level of -32, which at QP 40 produces a -128 residual against the
/// mid-grey DC prediction; later MBs predict black from their neighbours and
/// code nothing.
fn black_i16x16_mb(w: &mut BitWriter, first_in_picture: bool) {
    w.ue(3); // mb_type I_16x16_2_0_0: DC prediction, cbp 0
    w.ue(0); // intra_chroma_pred_mode DC
    w.se(0); // mb_qp_delta
    if first_in_picture {
        // Luma DC block: coeff_token (TotalCoeff 1, TrailingOnes 0), level
        // -32 via the escape code, total_zeros 0.
        w.bits(0b000101, 6);
        w.bits(0, 15); // level_prefix 15
        w.bit(true);
        w.bits(31, 12); // level_suffix -> -31, sign-adjusted to -32
        w.bit(true); // total_zeros 0
    } else {
        w.bit(true); // coeff_token: TotalCoeff 0
    }
}

/// An IDR slice of `num_mbs` all-black macroblocks starting at MB 0.
pub fn idr_black_slice_nal(num_mbs: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    idr_slice_header(&mut w, 0);
    for mb in 0..num_mbs {
        black_i16x16_mb(&mut w, mb == 0);
    }
    w.rbsp_trailing();
    annex_b_unit(0x65, w.into_bytes())
}

/// A non-IDR P slice that skips every macroblock (zero-motion copy of the
/// nearest reference).
pub fn p_skip_slice_nal(frame_num: u32, poc_lsb: u32, num_mbs: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(0); // first_mb_in_slice
    w.ue(5); // slice_type P (all slices of the picture)
    w.ue(0); // pic_parameter_set_id
    w.bits(frame_num & 0xf, 4); // frame_num
    w.bits(poc_lsb & 0xf, 4); // pic_order_cnt_lsb
    w.bit(false); // num_ref_idx_active_override_flag
    w.bit(false); // ref_pic_list_modification_flag_l0
    w.bit(false); // adaptive_ref_pic_marking_mode_flag
    w.se(0); // slice_qp_delta
    w.ue(1); // disable_deblocking_filter_idc
    w.ue(num_mbs); // mb_skip_run covering the whole picture
    w.rbsp_trailing();
    annex_b_unit(0x61, w.into_bytes())
}

/// A non-IDR P slice with one explicit P_L0_16x16 macroblock, ref_idx 0 and
/// zero motion (the 16x16 copy of scenario testing).
pub fn p_copy_slice_nal(frame_num: u32, poc_lsb: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(0); // first_mb_in_slice
    w.ue(5); // slice_type P
    w.ue(0); // pic_parameter_set_id
    w.bits(frame_num & 0xf, 4);
    w.bits(poc_lsb & 0xf, 4);
    w.bit(false); // num_ref_idx_active_override_flag
    w.bit(false); // ref_pic_list_modification_flag_l0
    w.bit(false); // adaptive_ref_pic_marking_mode_flag
    w.se(0); // slice_qp_delta
    w.ue(1); // disable_deblocking_filter_idc
    // slice data
    w.ue(0); // mb_skip_run
    w.ue(0); // mb_type P_L0_16x16
    w.se(0); // mvd_l0 x
    w.se(0); // mvd_l0 y
    w.ue(0); // coded_block_pattern 0 (inter)
    w.rbsp_trailing();
    annex_b_unit(0x61, w.into_bytes())
}

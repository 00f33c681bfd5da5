//! Shared helpers for unit tests: a minimal bit writer and canned parameter
//! sets. Compiled only for tests.

use crate::sps::{ChromaFormat, ProfileIdc, ScalingLists, Sps};

/// MSB-first bit writer used to assemble syntax in tests.
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

    /// Unsigned Exp-Golomb.
    pub fn ue(&mut self, value: u32) {
        let code = value + 1;
        let len = 32 - code.leading_zeros() as u8;
        self.bits(0, len - 1);
        self.bits(code, len);
    }

    /// Signed Exp-Golomb.
    pub fn se(&mut self, value: i32) {
        let code = if value <= 0 {
            (-2 * value) as u32
        } else {
            (2 * value - 1) as u32
        };
        self.ue(code);
    }

    /// Stop bit plus zero padding to a byte boundary.
    pub fn rbsp_trailing(&mut self) {
        self.bit(true);
        while self.bit_count != 0 {
            self.bit(false);
        }
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A Baseline 4:2:0 8-bit SPS sized in macroblocks, as the scenario tests use.
pub fn baseline_sps(width_mbs: u32, height_mbs: u32) -> Sps {
    Sps {
        profile_idc: ProfileIdc::Baseline,
        constraint_set0_flag: false,
        constraint_set1_flag: false,
        constraint_set2_flag: false,
        constraint_set3_flag: false,
        constraint_set4_flag: false,
        constraint_set5_flag: false,
        level_idc: 30,
        seq_parameter_set_id: 0,
        chroma_format_idc: ChromaFormat::Yuv420,
        separate_colour_plane_flag: false,
        bit_depth_luma_minus8: 0,
        bit_depth_chroma_minus8: 0,
        qpprime_y_zero_transform_bypass_flag: false,
        seq_scaling_matrix_present_flag: false,
        scaling_lists: ScalingLists::default(),
        log2_max_frame_num_minus4: 0,
        pic_order_cnt_type: 0,
        log2_max_pic_order_cnt_lsb_minus4: 0,
        delta_pic_order_always_zero_flag: false,
        offset_for_non_ref_pic: 0,
        offset_for_top_to_bottom_field: 0,
        offset_for_ref_frame: Vec::new(),
        max_num_ref_frames: 4,
        gaps_in_frame_num_value_allowed_flag: false,
        pic_width_in_mbs_minus1: width_mbs - 1,
        pic_height_in_map_units_minus1: height_mbs - 1,
        frame_mbs_only_flag: true,
        mb_adaptive_frame_field_flag: false,
        direct_8x8_inference_flag: true,
        frame_cropping_flag: false,
        frame_crop_left_offset: 0,
        frame_crop_right_offset: 0,
        frame_crop_top_offset: 0,
        frame_crop_bottom_offset: 0,
        vui_parameters_present_flag: false,
        vui_parameters: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_writer_reader_round_trip() {
        let mut w = BitWriter::new();
        for v in [0u32, 1, 2, 7, 31, 255] {
            w.ue(v);
        }
        for v in [0i32, 1, -1, 14, -14] {
            w.se(v);
        }
        w.rbsp_trailing();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        for v in [0u32, 1, 2, 7, 31, 255] {
            assert_eq!(r.read_ue().unwrap(), v);
        }
        for v in [0i32, 1, -1, 14, -14] {
            assert_eq!(r.read_se().unwrap(), v);
        }
    }
}

//! H.264/AVC Picture Parameter Set (PPS) parsing.

use crate::bitreader::BitReader;
use crate::error::{DecodeError, Result};
use crate::sps::{ChromaFormat, ScalingLists, Sps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slice-group map type (FMO), Table 7-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SliceGroupMapType {
    #[default]
    Interleaved = 0,
    Dispersed = 1,
    ForegroundLeftover = 2,
    BoxOut = 3,
    RasterScan = 4,
    Wipe = 5,
    Explicit = 6,
}

impl SliceGroupMapType {
    pub fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            0 => SliceGroupMapType::Interleaved,
            1 => SliceGroupMapType::Dispersed,
            2 => SliceGroupMapType::ForegroundLeftover,
            3 => SliceGroupMapType::BoxOut,
            4 => SliceGroupMapType::RasterScan,
            5 => SliceGroupMapType::Wipe,
            6 => SliceGroupMapType::Explicit,
            other => {
                return Err(DecodeError::SyntaxViolation(format!(
                    "slice_group_map_type {} exceeds maximum 6",
                    other
                )))
            }
        })
    }

    /// Map types whose geometry changes per picture via
    /// slice_group_change_cycle.
    pub fn is_changing(&self) -> bool {
        matches!(
            self,
            SliceGroupMapType::BoxOut | SliceGroupMapType::RasterScan | SliceGroupMapType::Wipe
        )
    }
}

/// Picture Parameter Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pps {
    pub pic_parameter_set_id: u8,
    pub seq_parameter_set_id: u8,
    /// entropy_coding_mode_flag (false=CAVLC, true=CABAC)
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    pub slice_group_map_type: SliceGroupMapType,
    /// run_length_minus1 per group (map type 0).
    pub run_length_minus1: Vec<u32>,
    /// (top_left, bottom_right) per group (map type 2).
    pub top_left_bottom_right: Vec<(u32, u32)>,
    /// slice_group_change_direction_flag (map types 3..5).
    pub slice_group_change_direction_flag: bool,
    /// slice_group_change_rate_minus1 (map types 3..5).
    pub slice_group_change_rate_minus1: u32,
    /// Explicit per-map-unit group ids (map type 6).
    pub slice_group_id: Vec<u8>,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    /// transform_8x8_mode_flag (more-data extension)
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    pub scaling_lists: ScalingLists,
    pub second_chroma_qp_index_offset: i32,
}

impl Pps {
    /// Check if CABAC is used.
    pub fn is_cabac(&self) -> bool {
        self.entropy_coding_mode_flag
    }

    /// Get the picture-level initial QP.
    pub fn initial_qp(&self) -> i32 {
        26 + self.pic_init_qp_minus26
    }

    /// SliceGroupChangeRate (7-24).
    pub fn slice_group_change_rate(&self) -> u32 {
        self.slice_group_change_rate_minus1 + 1
    }
}

/// Parse a PPS from a NAL unit payload. The referenced SPS must already be
/// present: the scaling-matrix list count depends on its chroma format.
pub fn parse_pps(data: &[u8], sps_map: &HashMap<u8, Sps>) -> Result<Pps> {
    let mut reader = BitReader::new(data);

    let pic_parameter_set_id = reader.read_ue()?;
    if pic_parameter_set_id > 255 {
        return Err(DecodeError::SyntaxViolation(format!(
            "pic_parameter_set_id {} exceeds maximum 255",
            pic_parameter_set_id
        )));
    }
    let seq_parameter_set_id = reader.read_ue()?;
    if seq_parameter_set_id > 31 {
        return Err(DecodeError::SyntaxViolation(format!(
            "seq_parameter_set_id {} exceeds maximum 31",
            seq_parameter_set_id
        )));
    }
    let sps = sps_map.get(&(seq_parameter_set_id as u8)).ok_or_else(|| {
        DecodeError::InvalidParameterSet(format!("PPS references unknown SPS {}", seq_parameter_set_id))
    })?;

    let entropy_coding_mode_flag = reader.read_flag()?;
    let bottom_field_pic_order_in_frame_present_flag = reader.read_flag()?;

    let num_slice_groups_minus1 = reader.read_ue()?;
    if num_slice_groups_minus1 > 7 {
        return Err(DecodeError::SyntaxViolation(format!(
            "num_slice_groups_minus1 {} exceeds maximum 7",
            num_slice_groups_minus1
        )));
    }

    let mut slice_group_map_type = SliceGroupMapType::Interleaved;
    let mut run_length_minus1 = Vec::new();
    let mut top_left_bottom_right = Vec::new();
    let mut slice_group_change_direction_flag = false;
    let mut slice_group_change_rate_minus1 = 0;
    let mut slice_group_id = Vec::new();

    if num_slice_groups_minus1 > 0 {
        slice_group_map_type = SliceGroupMapType::from_u32(reader.read_ue()?)?;

        match slice_group_map_type {
            SliceGroupMapType::Interleaved => {
                for _ in 0..=num_slice_groups_minus1 {
                    run_length_minus1.push(reader.read_ue()?);
                }
            }
            SliceGroupMapType::ForegroundLeftover => {
                for _ in 0..num_slice_groups_minus1 {
                    let top_left = reader.read_ue()?;
                    let bottom_right = reader.read_ue()?;
                    top_left_bottom_right.push((top_left, bottom_right));
                }
            }
            SliceGroupMapType::BoxOut | SliceGroupMapType::RasterScan | SliceGroupMapType::Wipe => {
                slice_group_change_direction_flag = reader.read_flag()?;
                slice_group_change_rate_minus1 = reader.read_ue()?;
            }
            SliceGroupMapType::Explicit => {
                let pic_size_in_map_units_minus1 = reader.read_ue()?;
                let bits = {
                    // Ceil(Log2(num_slice_groups_minus1 + 1))
                    let n = num_slice_groups_minus1 + 1;
                    (32 - (n - 1).leading_zeros()) as u8
                };
                for _ in 0..=pic_size_in_map_units_minus1 {
                    let id = reader.read_bits(bits)?;
                    if id > num_slice_groups_minus1 {
                        return Err(DecodeError::SyntaxViolation(format!(
                            "slice_group_id {} exceeds num_slice_groups_minus1 {}",
                            id, num_slice_groups_minus1
                        )));
                    }
                    slice_group_id.push(id as u8);
                }
            }
            SliceGroupMapType::Dispersed => {}
        }
    }

    let num_ref_idx_l0_default_active_minus1 = reader.read_ue()?;
    let num_ref_idx_l1_default_active_minus1 = reader.read_ue()?;
    if num_ref_idx_l0_default_active_minus1 > 31 || num_ref_idx_l1_default_active_minus1 > 31 {
        return Err(DecodeError::SyntaxViolation(
            "num_ref_idx_lX_default_active_minus1 exceeds maximum 31".to_string(),
        ));
    }

    let weighted_pred_flag = reader.read_flag()?;
    let weighted_bipred_idc = reader.read_bits(2)? as u8;
    let pic_init_qp_minus26 = reader.read_se()?;
    let pic_init_qs_minus26 = reader.read_se()?;
    let chroma_qp_index_offset = reader.read_se()?;
    if !(-12..=12).contains(&chroma_qp_index_offset) {
        return Err(DecodeError::SyntaxViolation(format!(
            "chroma_qp_index_offset {} out of [-12, 12]",
            chroma_qp_index_offset
        )));
    }
    let deblocking_filter_control_present_flag = reader.read_flag()?;
    let constrained_intra_pred_flag = reader.read_flag()?;
    let redundant_pic_cnt_present_flag = reader.read_flag()?;

    // Extension syntax for profiles with the 8x8 transform.
    let mut transform_8x8_mode_flag = false;
    let mut pic_scaling_matrix_present_flag = false;
    let mut scaling_lists = ScalingLists::default();
    let mut second_chroma_qp_index_offset = chroma_qp_index_offset;

    if reader.more_rbsp_data() {
        transform_8x8_mode_flag = reader.read_flag()?;
        pic_scaling_matrix_present_flag = reader.read_flag()?;

        if pic_scaling_matrix_present_flag {
            let extra_8x8 = if transform_8x8_mode_flag {
                if sps.chroma_format_idc == ChromaFormat::Yuv444 {
                    6
                } else {
                    2
                }
            } else {
                0
            };
            let num_lists = 6 + extra_8x8;
            for i in 0..num_lists {
                scaling_lists.present[i] = reader.read_flag()?;
                if !scaling_lists.present[i] {
                    continue;
                }
                if i < 6 {
                    scaling_lists.use_default_4x4[i] =
                        crate::sps::parse_scaling_list(&mut reader, &mut scaling_lists.list_4x4[i])?;
                } else {
                    scaling_lists.use_default_8x8[i - 6] =
                        crate::sps::parse_scaling_list(&mut reader, &mut scaling_lists.list_8x8[i - 6])?;
                }
            }
        }

        second_chroma_qp_index_offset = reader.read_se()?;
        if !(-12..=12).contains(&second_chroma_qp_index_offset) {
            return Err(DecodeError::SyntaxViolation(format!(
                "second_chroma_qp_index_offset {} out of [-12, 12]",
                second_chroma_qp_index_offset
            )));
        }
    }

    Ok(Pps {
        pic_parameter_set_id: pic_parameter_set_id as u8,
        seq_parameter_set_id: seq_parameter_set_id as u8,
        entropy_coding_mode_flag,
        bottom_field_pic_order_in_frame_present_flag,
        num_slice_groups_minus1,
        slice_group_map_type,
        run_length_minus1,
        top_left_bottom_right,
        slice_group_change_direction_flag,
        slice_group_change_rate_minus1,
        slice_group_id,
        num_ref_idx_l0_default_active_minus1,
        num_ref_idx_l1_default_active_minus1,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        pic_init_qs_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
        transform_8x8_mode_flag,
        pic_scaling_matrix_present_flag,
        scaling_lists,
        second_chroma_qp_index_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{baseline_sps, BitWriter};

    #[test]
    fn test_parse_minimal_pps() {
        let mut sps_map = HashMap::new();
        sps_map.insert(0u8, baseline_sps(1, 1));

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
        w.se(14); // pic_init_qp_minus26 -> qp 40
        w.se(0); // pic_init_qs_minus26
        w.se(0); // chroma_qp_index_offset
        w.bit(true); // deblocking_filter_control_present_flag
        w.bit(false); // constrained_intra_pred_flag
        w.bit(false); // redundant_pic_cnt_present_flag
        w.rbsp_trailing();

        let pps = parse_pps(&w.into_bytes(), &sps_map).unwrap();
        assert_eq!(pps.pic_parameter_set_id, 0);
        assert!(!pps.is_cabac());
        assert_eq!(pps.initial_qp(), 40);
        assert!(pps.deblocking_filter_control_present_flag);
        assert!(!pps.transform_8x8_mode_flag);
        assert_eq!(pps.second_chroma_qp_index_offset, 0);
    }

    #[test]
    fn test_pps_unknown_sps_is_invalid_parameter_set() {
        let sps_map = HashMap::new();
        let mut w = BitWriter::new();
        w.ue(0);
        w.ue(3); // references SPS 3 which does not exist
        w.bit(false);
        w.bit(false);
        w.ue(0);
        w.rbsp_trailing();
        let err = parse_pps(&w.into_bytes(), &sps_map).unwrap_err();
        assert!(matches!(err.kind(), DecodeError::InvalidParameterSet(_)));
    }

    #[test]
    fn test_slice_group_map_type_bounds() {
        assert!(SliceGroupMapType::from_u32(6).is_ok());
        assert!(SliceGroupMapType::from_u32(7).is_err());
        assert!(SliceGroupMapType::BoxOut.is_changing());
        assert!(!SliceGroupMapType::Explicit.is_changing());
    }
}

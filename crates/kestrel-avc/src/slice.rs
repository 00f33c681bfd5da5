//! H.264/AVC slice header parsing and per-slice derived state.

use crate::bitreader::BitReader;
use crate::error::{DecodeError, Result};
use crate::nal::{NalUnit, NalUnitType};
use crate::picture::PictureStructure;
use crate::pps::Pps;
use crate::sps::{ChromaFormat, Sps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceType {
    /// P slice (predictive)
    P = 0,
    /// B slice (bi-predictive)
    B = 1,
    /// I slice (intra)
    I = 2,
    /// SP slice (switching P)
    Sp = 3,
    /// SI slice (switching I)
    Si = 4,
}

impl SliceType {
    /// Create from the raw slice_type element (values 5..9 alias 0..4).
    pub fn from_u32(value: u32) -> Result<Self> {
        Ok(match value % 5 {
            0 => SliceType::P,
            1 => SliceType::B,
            2 => SliceType::I,
            3 => SliceType::Sp,
            _ => SliceType::Si,
        })
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, SliceType::I | SliceType::Si)
    }

    pub fn is_b(&self) -> bool {
        matches!(self, SliceType::B)
    }

    pub fn is_p(&self) -> bool {
        matches!(self, SliceType::P | SliceType::Sp)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SliceType::P => "P",
            SliceType::B => "B",
            SliceType::I => "I",
            SliceType::Sp => "SP",
            SliceType::Si => "SI",
        }
    }
}

/// One ref_pic_list_modification operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefListModOp {
    /// modification_of_pic_nums_idc 0
    ShortTermSubtract { abs_diff_pic_num_minus1: u32 },
    /// modification_of_pic_nums_idc 1
    ShortTermAdd { abs_diff_pic_num_minus1: u32 },
    /// modification_of_pic_nums_idc 2
    LongTerm { long_term_pic_num: u32 },
    /// modification_of_pic_nums_idc 4 (MVC)
    ViewSubtract { abs_diff_view_idx_minus1: u32 },
    /// modification_of_pic_nums_idc 5 (MVC)
    ViewAdd { abs_diff_view_idx_minus1: u32 },
}

/// One memory_management_control_operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MmcoOp {
    /// Op 1: mark a short-term picture unused.
    ShortTermToUnused { difference_of_pic_nums_minus1: u32 },
    /// Op 2: mark a long-term picture unused.
    LongTermToUnused { long_term_pic_num: u32 },
    /// Op 3: convert a short-term picture to long-term.
    ShortTermToLongTerm {
        difference_of_pic_nums_minus1: u32,
        long_term_frame_idx: u32,
    },
    /// Op 4: set MaxLongTermFrameIdx.
    SetMaxLongTermFrameIdx { max_long_term_frame_idx_plus1: u32 },
    /// Op 5: mark everything unused and reset frame_num/POC.
    ResetAll,
    /// Op 6: mark the current picture long-term.
    CurrentToLongTerm { long_term_frame_idx: u32 },
}

/// Decoded reference picture marking carried in the slice header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecRefPicMarking {
    /// no_output_of_prior_pics_flag (IDR only)
    pub no_output_of_prior_pics_flag: bool,
    /// long_term_reference_flag (IDR only)
    pub long_term_reference_flag: bool,
    /// adaptive_ref_pic_marking_mode_flag
    pub adaptive_ref_pic_marking_mode_flag: bool,
    /// MMCO list when adaptive marking is on.
    pub mmco_ops: Vec<MmcoOp>,
}

impl DecRefPicMarking {
    /// True when the list contains an MMCO 5.
    pub fn has_reset(&self) -> bool {
        self.mmco_ops.iter().any(|op| matches!(op, MmcoOp::ResetAll))
    }
}

/// Explicit prediction weights for one reference index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightEntry {
    pub luma_weight: i32,
    pub luma_offset: i32,
    pub chroma_weight: [i32; 2],
    pub chroma_offset: [i32; 2],
}

impl WeightEntry {
    pub fn default_for(luma_log2_denom: u8, chroma_log2_denom: u8) -> Self {
        Self {
            luma_weight: 1 << luma_log2_denom,
            luma_offset: 0,
            chroma_weight: [1 << chroma_log2_denom; 2],
            chroma_offset: [0; 2],
        }
    }
}

/// pred_weight_table() contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u8,
    pub chroma_log2_weight_denom: u8,
    pub l0: Vec<WeightEntry>,
    pub l1: Vec<WeightEntry>,
}

/// Slice header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub pic_parameter_set_id: u8,
    pub colour_plane_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    pub redundant_pic_cnt: u32,
    pub direct_spatial_mv_pred_flag: bool,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_modification_l0: Vec<RefListModOp>,
    pub ref_pic_list_modification_l1: Vec<RefListModOp>,
    pub pred_weight_table: Option<PredWeightTable>,
    pub dec_ref_pic_marking: DecRefPicMarking,
    pub cabac_init_idc: u8,
    pub slice_qp_delta: i32,
    pub sp_for_switch_flag: bool,
    pub slice_qs_delta: i32,
    pub disable_deblocking_filter_idc: u8,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,
    pub slice_group_change_cycle: u32,

    // Properties of the carrying NAL unit.
    pub idr_flag: bool,
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
    /// MVC view this slice belongs to (0 for the base view).
    pub view_id: u16,
    pub inter_view_flag: bool,
    pub anchor_pic_flag: bool,
}

impl SliceHeader {
    /// MbaffFrameFlag (7-25).
    pub fn mbaff_frame_flag(&self, sps: &Sps) -> bool {
        sps.mb_adaptive_frame_field_flag && !self.field_pic_flag
    }

    /// PicHeightInMbs (7-26).
    pub fn pic_height_in_mbs(&self, sps: &Sps) -> u32 {
        sps.frame_height_in_mbs() / (1 + self.field_pic_flag as u32)
    }

    /// PicSizeInMbs.
    pub fn pic_size_in_mbs(&self, sps: &Sps) -> u32 {
        sps.pic_width_in_mbs() * self.pic_height_in_mbs(sps)
    }

    /// MaxPicNum (7-27).
    pub fn max_pic_num(&self, sps: &Sps) -> u32 {
        if self.field_pic_flag {
            2 * sps.max_frame_num()
        } else {
            sps.max_frame_num()
        }
    }

    /// CurrPicNum (7-28).
    pub fn curr_pic_num(&self, sps: &Sps) -> u32 {
        if self.field_pic_flag {
            2 * self.frame_num + 1
        } else {
            self.frame_num
        }
    }

    /// SliceQPY (7-29), validated against [-QpBdOffsetY, 51].
    pub fn slice_qp(&self, sps: &Sps, pps: &Pps) -> Result<i32> {
        let qp = 26 + pps.pic_init_qp_minus26 + self.slice_qp_delta;
        if qp < -sps.qp_bd_offset_y() || qp > 51 {
            return Err(DecodeError::SyntaxViolation(format!(
                "SliceQpY {} out of [{}, 51]",
                qp,
                -sps.qp_bd_offset_y()
            )));
        }
        Ok(qp)
    }

    /// QSY for SP/SI slices.
    pub fn slice_qs(&self, pps: &Pps) -> i32 {
        26 + pps.pic_init_qs_minus26 + self.slice_qs_delta
    }

    /// FilterOffsetA/B.
    pub fn filter_offset_a(&self) -> i32 {
        self.slice_alpha_c0_offset_div2 * 2
    }

    pub fn filter_offset_b(&self) -> i32 {
        self.slice_beta_offset_div2 * 2
    }

    /// Picture structure selected by the field flags.
    pub fn structure(&self) -> PictureStructure {
        if !self.field_pic_flag {
            PictureStructure::Frame
        } else if self.bottom_field_flag {
            PictureStructure::BottomField
        } else {
            PictureStructure::TopField
        }
    }

    /// MapUnitsInSliceGroup0 (7-32).
    pub fn map_units_in_slice_group0(&self, sps: &Sps, pps: &Pps) -> u32 {
        (self.slice_group_change_cycle * pps.slice_group_change_rate())
            .min(sps.pic_size_in_map_units())
    }

    pub fn is_first_slice(&self) -> bool {
        self.first_mb_in_slice == 0
    }

    /// Number of active references in each list.
    pub fn active_refs(&self) -> (usize, usize) {
        let l0 = if self.slice_type.is_intra() {
            0
        } else {
            self.num_ref_idx_l0_active_minus1 as usize + 1
        };
        let l1 = if self.slice_type.is_b() {
            self.num_ref_idx_l1_active_minus1 as usize + 1
        } else {
            0
        };
        (l0, l1)
    }
}

/// Parse a slice header from an open reader positioned after the NAL header.
/// The reader is left at the first bit of the slice data.
pub fn parse_slice_header(
    reader: &mut BitReader,
    sps_map: &HashMap<u8, Sps>,
    pps_map: &HashMap<u8, Pps>,
    nal: &NalUnit,
) -> Result<SliceHeader> {
    let nal_type = nal.nal_type();
    let idr_flag = match nal_type {
        NalUnitType::IdrSlice => true,
        NalUnitType::SliceExtension => nal
            .mvc_header
            .map(|h| !h.non_idr_flag)
            .unwrap_or(false),
        _ => false,
    };

    let first_mb_in_slice = reader.read_ue()?;
    let slice_type_raw = reader.read_ue()?;
    if slice_type_raw > 9 {
        return Err(DecodeError::SyntaxViolation(format!(
            "slice_type {} exceeds maximum 9",
            slice_type_raw
        )));
    }
    let slice_type = SliceType::from_u32(slice_type_raw)?;
    if idr_flag && !slice_type.is_intra() {
        return Err(DecodeError::SyntaxViolation(format!(
            "IDR slice with slice_type {}",
            slice_type.name()
        )));
    }

    let pic_parameter_set_id = reader.read_ue()?;
    let pps = pps_map.get(&(pic_parameter_set_id as u8)).ok_or_else(|| {
        DecodeError::InvalidParameterSet(format!("PPS {} not found", pic_parameter_set_id))
    })?;
    let sps = sps_map.get(&pps.seq_parameter_set_id).ok_or_else(|| {
        DecodeError::InvalidParameterSet(format!("SPS {} not found", pps.seq_parameter_set_id))
    })?;

    let mut colour_plane_id = 0;
    if sps.separate_colour_plane_flag {
        colour_plane_id = reader.read_bits(2)? as u8;
        if colour_plane_id > 2 {
            return Err(DecodeError::SyntaxViolation(
                "colour_plane_id exceeds maximum 2".to_string(),
            ));
        }
    }

    let frame_num = reader.read_bits(sps.log2_max_frame_num_minus4 + 4)?;
    if idr_flag && frame_num != 0 {
        return Err(DecodeError::SyntaxViolation(format!(
            "IDR picture with frame_num {}",
            frame_num
        )));
    }

    let mut field_pic_flag = false;
    let mut bottom_field_flag = false;
    if !sps.frame_mbs_only_flag {
        field_pic_flag = reader.read_flag()?;
        if field_pic_flag {
            bottom_field_flag = reader.read_flag()?;
        }
    }

    let mut idr_pic_id = 0;
    if nal_type == NalUnitType::IdrSlice {
        idr_pic_id = reader.read_ue()?;
    }

    let mut pic_order_cnt_lsb = 0;
    let mut delta_pic_order_cnt_bottom = 0;
    let mut delta_pic_order_cnt = [0i32; 2];

    match sps.pic_order_cnt_type {
        0 => {
            pic_order_cnt_lsb = reader.read_bits(sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?;
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt_bottom = reader.read_se()?;
            }
        }
        1 if !sps.delta_pic_order_always_zero_flag => {
            delta_pic_order_cnt[0] = reader.read_se()?;
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt[1] = reader.read_se()?;
            }
        }
        _ => {}
    }

    let mut redundant_pic_cnt = 0;
    if pps.redundant_pic_cnt_present_flag {
        redundant_pic_cnt = reader.read_ue()?;
    }

    let mut direct_spatial_mv_pred_flag = false;
    if slice_type.is_b() {
        direct_spatial_mv_pred_flag = reader.read_flag()?;
    }

    let mut num_ref_idx_active_override_flag = false;
    let mut num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
    let mut num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;

    if slice_type.is_p() || slice_type.is_b() {
        num_ref_idx_active_override_flag = reader.read_flag()?;
        if num_ref_idx_active_override_flag {
            num_ref_idx_l0_active_minus1 = reader.read_ue()?;
            if slice_type.is_b() {
                num_ref_idx_l1_active_minus1 = reader.read_ue()?;
            }
        }
        let limit = if field_pic_flag { 31 } else { 15 };
        if num_ref_idx_l0_active_minus1 > limit || num_ref_idx_l1_active_minus1 > limit {
            return Err(DecodeError::SyntaxViolation(format!(
                "num_ref_idx_lX_active_minus1 exceeds maximum {}",
                limit
            )));
        }
    }

    let is_mvc = nal_type == NalUnitType::SliceExtension;
    let mut ref_pic_list_modification_l0 = Vec::new();
    let mut ref_pic_list_modification_l1 = Vec::new();
    if !slice_type.is_intra() && reader.read_flag()? {
        ref_pic_list_modification_l0 = parse_ref_pic_list_modification(reader, is_mvc)?;
    }
    if slice_type.is_b() && reader.read_flag()? {
        ref_pic_list_modification_l1 = parse_ref_pic_list_modification(reader, is_mvc)?;
    }

    let weighted = (pps.weighted_pred_flag && slice_type.is_p())
        || (pps.weighted_bipred_idc == 1 && slice_type.is_b());
    let pred_weight_table = if weighted {
        Some(parse_pred_weight_table(
            reader,
            sps,
            slice_type,
            num_ref_idx_l0_active_minus1 as usize,
            num_ref_idx_l1_active_minus1 as usize,
        )?)
    } else {
        None
    };

    let mut dec_ref_pic_marking = DecRefPicMarking::default();
    if nal.header.nal_ref_idc != 0 {
        dec_ref_pic_marking = parse_dec_ref_pic_marking(reader, idr_flag)?;
    }

    let mut cabac_init_idc = 0;
    if pps.entropy_coding_mode_flag && !slice_type.is_intra() {
        cabac_init_idc = reader.read_ue()?;
        if cabac_init_idc > 2 {
            return Err(DecodeError::SyntaxViolation(format!(
                "cabac_init_idc {} exceeds maximum 2",
                cabac_init_idc
            )));
        }
    }

    let slice_qp_delta = reader.read_se()?;

    let mut sp_for_switch_flag = false;
    let mut slice_qs_delta = 0;
    if matches!(slice_type, SliceType::Sp | SliceType::Si) {
        if slice_type == SliceType::Sp {
            sp_for_switch_flag = reader.read_flag()?;
        }
        slice_qs_delta = reader.read_se()?;
    }

    let mut disable_deblocking_filter_idc = 0;
    let mut slice_alpha_c0_offset_div2 = 0;
    let mut slice_beta_offset_div2 = 0;
    if pps.deblocking_filter_control_present_flag {
        disable_deblocking_filter_idc = reader.read_ue()?;
        if disable_deblocking_filter_idc > 2 {
            return Err(DecodeError::SyntaxViolation(format!(
                "disable_deblocking_filter_idc {} exceeds maximum 2",
                disable_deblocking_filter_idc
            )));
        }
        if disable_deblocking_filter_idc != 1 {
            slice_alpha_c0_offset_div2 = reader.read_se()?;
            slice_beta_offset_div2 = reader.read_se()?;
        }
    }

    let mut slice_group_change_cycle = 0;
    if pps.num_slice_groups_minus1 > 0 && pps.slice_group_map_type.is_changing() {
        // Ceil(Log2(PicSizeInMapUnits / SliceGroupChangeRate + 1)) bits.
        let units = sps.pic_size_in_map_units() / pps.slice_group_change_rate() + 1;
        let bits = (32 - (units - 1).leading_zeros()).max(1) as u8;
        slice_group_change_cycle = reader.read_bits(bits)?;
    }

    let (view_id, inter_view_flag, anchor_pic_flag) = match nal.mvc_header {
        Some(h) => (h.view_id, h.inter_view_flag, h.anchor_pic_flag),
        None => (0, true, idr_flag),
    };

    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        pic_parameter_set_id: pic_parameter_set_id as u8,
        colour_plane_id,
        frame_num,
        field_pic_flag,
        bottom_field_flag,
        idr_pic_id,
        pic_order_cnt_lsb,
        delta_pic_order_cnt_bottom,
        delta_pic_order_cnt,
        redundant_pic_cnt,
        direct_spatial_mv_pred_flag,
        num_ref_idx_active_override_flag,
        num_ref_idx_l0_active_minus1,
        num_ref_idx_l1_active_minus1,
        ref_pic_list_modification_l0,
        ref_pic_list_modification_l1,
        pred_weight_table,
        dec_ref_pic_marking,
        cabac_init_idc: cabac_init_idc as u8,
        slice_qp_delta,
        sp_for_switch_flag,
        slice_qs_delta,
        disable_deblocking_filter_idc: disable_deblocking_filter_idc as u8,
        slice_alpha_c0_offset_div2,
        slice_beta_offset_div2,
        slice_group_change_cycle,
        idr_flag,
        nal_ref_idc: nal.header.nal_ref_idc,
        nal_unit_type: nal_type as u8,
        view_id,
        inter_view_flag,
        anchor_pic_flag,
    })
}

/// Parse one list's ref_pic_list_modification operations.
fn parse_ref_pic_list_modification(
    reader: &mut BitReader,
    allow_mvc: bool,
) -> Result<Vec<RefListModOp>> {
    let mut ops = Vec::new();

    loop {
        let idc = reader.read_ue()?;
        let op = match idc {
            0 => RefListModOp::ShortTermSubtract {
                abs_diff_pic_num_minus1: reader.read_ue()?,
            },
            1 => RefListModOp::ShortTermAdd {
                abs_diff_pic_num_minus1: reader.read_ue()?,
            },
            2 => RefListModOp::LongTerm {
                long_term_pic_num: reader.read_ue()?,
            },
            3 => break,
            4 if allow_mvc => RefListModOp::ViewSubtract {
                abs_diff_view_idx_minus1: reader.read_ue()?,
            },
            5 if allow_mvc => RefListModOp::ViewAdd {
                abs_diff_view_idx_minus1: reader.read_ue()?,
            },
            other => {
                return Err(DecodeError::SyntaxViolation(format!(
                    "modification_of_pic_nums_idc {} out of range",
                    other
                )))
            }
        };
        ops.push(op);
        if ops.len() > 33 {
            return Err(DecodeError::SyntaxViolation(
                "ref_pic_list_modification longer than 33 operations".to_string(),
            ));
        }
    }

    Ok(ops)
}

/// Parse pred_weight_table(), keeping the values (the reconstruction needs
/// them, unlike a pure header scanner).
fn parse_pred_weight_table(
    reader: &mut BitReader,
    sps: &Sps,
    slice_type: SliceType,
    num_l0_minus1: usize,
    num_l1_minus1: usize,
) -> Result<PredWeightTable> {
    let luma_log2_weight_denom = reader.read_ue()?;
    if luma_log2_weight_denom > 7 {
        return Err(DecodeError::SyntaxViolation(format!(
            "luma_log2_weight_denom {} exceeds maximum 7",
            luma_log2_weight_denom
        )));
    }
    let has_chroma = sps.chroma_format_idc != ChromaFormat::Monochrome;
    let mut chroma_log2_weight_denom = 0;
    if has_chroma {
        chroma_log2_weight_denom = reader.read_ue()?;
        if chroma_log2_weight_denom > 7 {
            return Err(DecodeError::SyntaxViolation(format!(
                "chroma_log2_weight_denom {} exceeds maximum 7",
                chroma_log2_weight_denom
            )));
        }
    }

    let luma_denom = luma_log2_weight_denom as u8;
    let chroma_denom = chroma_log2_weight_denom as u8;

    let read_list = |reader: &mut BitReader, count: usize| -> Result<Vec<WeightEntry>> {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let mut entry = WeightEntry::default_for(luma_denom, chroma_denom);
            if reader.read_flag()? {
                entry.luma_weight = reader.read_se()?;
                entry.luma_offset = reader.read_se()?;
            }
            if has_chroma && reader.read_flag()? {
                for c in 0..2 {
                    entry.chroma_weight[c] = reader.read_se()?;
                    entry.chroma_offset[c] = reader.read_se()?;
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    };

    let l0 = read_list(reader, num_l0_minus1 + 1)?;
    let l1 = if slice_type.is_b() {
        read_list(reader, num_l1_minus1 + 1)?
    } else {
        Vec::new()
    };

    Ok(PredWeightTable {
        luma_log2_weight_denom: luma_denom,
        chroma_log2_weight_denom: chroma_denom,
        l0,
        l1,
    })
}

/// Parse dec_ref_pic_marking().
fn parse_dec_ref_pic_marking(reader: &mut BitReader, idr_flag: bool) -> Result<DecRefPicMarking> {
    let mut marking = DecRefPicMarking::default();

    if idr_flag {
        marking.no_output_of_prior_pics_flag = reader.read_flag()?;
        marking.long_term_reference_flag = reader.read_flag()?;
        return Ok(marking);
    }

    marking.adaptive_ref_pic_marking_mode_flag = reader.read_flag()?;
    if !marking.adaptive_ref_pic_marking_mode_flag {
        return Ok(marking);
    }

    loop {
        let op = reader.read_ue()?;
        let op = match op {
            0 => break,
            1 => MmcoOp::ShortTermToUnused {
                difference_of_pic_nums_minus1: reader.read_ue()?,
            },
            2 => MmcoOp::LongTermToUnused {
                long_term_pic_num: reader.read_ue()?,
            },
            3 => MmcoOp::ShortTermToLongTerm {
                difference_of_pic_nums_minus1: reader.read_ue()?,
                long_term_frame_idx: reader.read_ue()?,
            },
            4 => MmcoOp::SetMaxLongTermFrameIdx {
                max_long_term_frame_idx_plus1: reader.read_ue()?,
            },
            5 => MmcoOp::ResetAll,
            6 => MmcoOp::CurrentToLongTerm {
                long_term_frame_idx: reader.read_ue()?,
            },
            other => {
                return Err(DecodeError::SyntaxViolation(format!(
                    "memory_management_control_operation {} out of range",
                    other
                )))
            }
        };
        marking.mmco_ops.push(op);
        if marking.mmco_ops.len() > 35 {
            return Err(DecodeError::SyntaxViolation(
                "runaway dec_ref_pic_marking list".to_string(),
            ));
        }
    }

    Ok(marking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::parse_nal_unit;
    use crate::testutil::{baseline_sps, BitWriter};

    fn minimal_pps() -> Pps {
        let mut sps_map = HashMap::new();
        sps_map.insert(0u8, baseline_sps(1, 1));
        let mut w = BitWriter::new();
        w.ue(0);
        w.ue(0);
        w.bit(false);
        w.bit(false);
        w.ue(0);
        w.ue(0);
        w.ue(0);
        w.bit(false);
        w.bits(0, 2);
        w.se(14);
        w.se(0);
        w.se(0);
        w.bit(true);
        w.bit(false);
        w.bit(false);
        w.rbsp_trailing();
        crate::pps::parse_pps(&w.into_bytes(), &sps_map).unwrap()
    }

    #[test]
    fn test_slice_type() {
        assert_eq!(SliceType::from_u32(0).unwrap(), SliceType::P);
        assert_eq!(SliceType::from_u32(1).unwrap(), SliceType::B);
        assert_eq!(SliceType::from_u32(2).unwrap(), SliceType::I);
        assert_eq!(SliceType::from_u32(7).unwrap(), SliceType::I);
        assert!(SliceType::I.is_intra());
        assert!(SliceType::Si.is_intra());
        assert!(SliceType::B.is_b());
        assert!(SliceType::Sp.is_p());
    }

    #[test]
    fn test_parse_idr_slice_header() {
        let mut sps_map = HashMap::new();
        sps_map.insert(0u8, baseline_sps(1, 1));
        let mut pps_map = HashMap::new();
        pps_map.insert(0u8, minimal_pps());

        let mut w = BitWriter::new();
        w.ue(0); // first_mb_in_slice
        w.ue(7); // slice_type: I (all slices of picture)
        w.ue(0); // pic_parameter_set_id
        w.bits(0, 4); // frame_num
        w.ue(0); // idr_pic_id
        w.bits(0, 4); // pic_order_cnt_lsb
        w.bit(false); // no_output_of_prior_pics_flag
        w.bit(false); // long_term_reference_flag
        w.se(0); // slice_qp_delta
        w.ue(1); // disable_deblocking_filter_idc
        w.rbsp_trailing();
        let payload = w.into_bytes();

        let mut nal_bytes = vec![0x65];
        nal_bytes.extend_from_slice(&payload);
        let nal = parse_nal_unit(&nal_bytes, 0).unwrap();

        let mut reader = BitReader::new(&nal.payload);
        let header = parse_slice_header(&mut reader, &sps_map, &pps_map, &nal).unwrap();

        assert!(header.idr_flag);
        assert_eq!(header.slice_type, SliceType::I);
        assert_eq!(header.frame_num, 0);
        assert_eq!(header.structure(), PictureStructure::Frame);
        assert_eq!(
            header.slice_qp(&sps_map[&0], &pps_map[&0]).unwrap(),
            40
        );
        assert_eq!(header.disable_deblocking_filter_idc, 1);
        assert!(!header.mbaff_frame_flag(&sps_map[&0]));
        assert_eq!(header.pic_size_in_mbs(&sps_map[&0]), 1);
    }

    #[test]
    fn test_idr_with_p_type_rejected() {
        let mut sps_map = HashMap::new();
        sps_map.insert(0u8, baseline_sps(1, 1));
        let mut pps_map = HashMap::new();
        pps_map.insert(0u8, minimal_pps());

        let mut w = BitWriter::new();
        w.ue(0); // first_mb_in_slice
        w.ue(0); // slice_type P on an IDR NAL
        w.ue(0);
        w.bits(0, 4);
        w.rbsp_trailing();
        let payload = w.into_bytes();
        let mut nal_bytes = vec![0x65];
        nal_bytes.extend_from_slice(&payload);
        let nal = parse_nal_unit(&nal_bytes, 0).unwrap();
        let mut reader = BitReader::new(&nal.payload);
        assert!(parse_slice_header(&mut reader, &sps_map, &pps_map, &nal).is_err());
    }

    #[test]
    fn test_mmco_parse() {
        // Non-IDR reference slice with MMCO {3, diff 0, ltIdx 0} then end.
        let mut sps_map = HashMap::new();
        sps_map.insert(0u8, baseline_sps(1, 1));
        let mut pps_map = HashMap::new();
        pps_map.insert(0u8, minimal_pps());

        let mut w = BitWriter::new();
        w.ue(0); // first_mb_in_slice
        w.ue(5); // slice_type P
        w.ue(0); // pps id
        w.bits(1, 4); // frame_num
        w.bits(2, 4); // pic_order_cnt_lsb
        w.bit(false); // num_ref_idx_active_override_flag
        w.bit(false); // ref_pic_list_modification_flag_l0
        w.bit(true); // adaptive_ref_pic_marking_mode_flag
        w.ue(3); // mmco 3
        w.ue(0); // difference_of_pic_nums_minus1
        w.ue(0); // long_term_frame_idx
        w.ue(0); // mmco end
        w.se(0); // slice_qp_delta
        w.ue(1); // disable_deblocking_filter_idc
        w.rbsp_trailing();
        let payload = w.into_bytes();
        let mut nal_bytes = vec![0x61]; // ref_idc 3, type 1
        nal_bytes.extend_from_slice(&payload);
        let nal = parse_nal_unit(&nal_bytes, 0).unwrap();
        let mut reader = BitReader::new(&nal.payload);
        let header = parse_slice_header(&mut reader, &sps_map, &pps_map, &nal).unwrap();
        assert_eq!(
            header.dec_ref_pic_marking.mmco_ops,
            vec![MmcoOp::ShortTermToLongTerm {
                difference_of_pic_nums_minus1: 0,
                long_term_frame_idx: 0
            }]
        );
        assert!(!header.dec_ref_pic_marking.has_reset());
    }
}

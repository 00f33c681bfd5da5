//! H.264/AVC Sequence Parameter Set (SPS) parsing and derived variables.

use crate::bitreader::BitReader;
use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// H.264/AVC Profile IDC values covered by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProfileIdc {
    /// Baseline Profile
    Baseline = 66,
    /// Main Profile
    Main = 77,
    /// Extended Profile
    Extended = 88,
    /// High Profile
    High = 100,
    /// High 10 Profile
    High10 = 110,
    /// High 4:2:2 Profile
    High422 = 122,
    /// High 4:4:4 Predictive Profile
    High444 = 244,
    /// CAVLC 4:4:4 Intra Profile
    Cavlc444 = 44,
    /// Multiview High Profile
    MultiviewHigh = 118,
    /// Stereo High Profile
    StereoHigh = 128,
}

impl ProfileIdc {
    /// Create from raw value; profiles outside the covered set are rejected.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            66 => Ok(ProfileIdc::Baseline),
            77 => Ok(ProfileIdc::Main),
            88 => Ok(ProfileIdc::Extended),
            100 => Ok(ProfileIdc::High),
            110 => Ok(ProfileIdc::High10),
            122 => Ok(ProfileIdc::High422),
            244 => Ok(ProfileIdc::High444),
            44 => Ok(ProfileIdc::Cavlc444),
            118 => Ok(ProfileIdc::MultiviewHigh),
            128 => Ok(ProfileIdc::StereoHigh),
            other => Err(DecodeError::UnsupportedProfile(format!(
                "profile_idc {}",
                other
            ))),
        }
    }

    /// Profiles that carry the chroma-format/bit-depth/scaling syntax block.
    pub fn has_chroma_info(&self) -> bool {
        matches!(
            self,
            ProfileIdc::High
                | ProfileIdc::High10
                | ProfileIdc::High422
                | ProfileIdc::High444
                | ProfileIdc::Cavlc444
                | ProfileIdc::MultiviewHigh
                | ProfileIdc::StereoHigh
        )
    }

    /// MVC profiles decoded on DPB layer 1.
    pub fn is_mvc(&self) -> bool {
        matches!(self, ProfileIdc::MultiviewHigh | ProfileIdc::StereoHigh)
    }
}

impl fmt::Display for ProfileIdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileIdc::Baseline => "Baseline",
            ProfileIdc::Main => "Main",
            ProfileIdc::Extended => "Extended",
            ProfileIdc::High => "High",
            ProfileIdc::High10 => "High 10",
            ProfileIdc::High422 => "High 4:2:2",
            ProfileIdc::High444 => "High 4:4:4",
            ProfileIdc::Cavlc444 => "CAVLC 4:4:4",
            ProfileIdc::MultiviewHigh => "Multiview High",
            ProfileIdc::StereoHigh => "Stereo High",
        };
        write!(f, "{}", name)
    }
}

/// Chroma format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaFormat {
    /// Monochrome (4:0:0)
    Monochrome = 0,
    /// 4:2:0
    #[default]
    Yuv420 = 1,
    /// 4:2:2
    Yuv422 = 2,
    /// 4:4:4
    Yuv444 = 3,
}

impl ChromaFormat {
    /// Create from a validated raw value (0-3).
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ChromaFormat::Monochrome),
            1 => Ok(ChromaFormat::Yuv420),
            2 => Ok(ChromaFormat::Yuv422),
            3 => Ok(ChromaFormat::Yuv444),
            other => Err(DecodeError::SyntaxViolation(format!(
                "chroma_format_idc {} exceeds maximum 3",
                other
            ))),
        }
    }

    /// SubWidthC (0 for monochrome where it is undefined).
    pub fn sub_width_c(&self) -> u32 {
        match self {
            ChromaFormat::Monochrome => 0,
            ChromaFormat::Yuv420 | ChromaFormat::Yuv422 => 2,
            ChromaFormat::Yuv444 => 1,
        }
    }

    /// SubHeightC (0 for monochrome where it is undefined).
    pub fn sub_height_c(&self) -> u32 {
        match self {
            ChromaFormat::Monochrome => 0,
            ChromaFormat::Yuv420 => 2,
            ChromaFormat::Yuv422 | ChromaFormat::Yuv444 => 1,
        }
    }
}

/// Scaling lists carried by an SPS or PPS: six 4x4 lists and up to six 8x8
/// lists, plus the per-list "use default" markers from the delta parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingLists {
    /// scaling_list_present_flag per list index (up to 12).
    pub present: [bool; 12],
    /// Parsed 4x4 lists in coefficient order.
    pub list_4x4: [[u8; 16]; 6],
    /// Parsed 8x8 lists in coefficient order.
    #[serde(with = "big_array_8x8")]
    pub list_8x8: [[u8; 64]; 6],
    /// Set when a list's first delta selected the default matrix.
    pub use_default_4x4: [bool; 6],
    /// Set when an 8x8 list's first delta selected the default matrix.
    pub use_default_8x8: [bool; 6],
}

impl Default for ScalingLists {
    fn default() -> Self {
        Self {
            present: [false; 12],
            list_4x4: [[16; 16]; 6],
            list_8x8: [[16; 64]; 6],
            use_default_4x4: [false; 6],
            use_default_8x8: [false; 6],
        }
    }
}

/// Manual (de)serialization for `[[u8; 64]; 6]`: serde only derives
/// `Serialize`/`Deserialize` for arrays up to 32 elements, so the inner
/// 64-element arrays need an explicit `with` module.
mod big_array_8x8 {
    use serde::de::{SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &[[u8; 64]; 6], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(6)?;
        for row in value {
            tup.serialize_element(&row[..])?;
        }
        tup.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[[u8; 64]; 6], D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ListsVisitor;

        impl<'de> Visitor<'de> for ListsVisitor {
            type Value = [[u8; 64]; 6];

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an array of six 64-element arrays")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut out = [[0u8; 64]; 6];
                for (i, slot) in out.iter_mut().enumerate() {
                    let row: Vec<u8> = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                    if row.len() != 64 {
                        return Err(serde::de::Error::invalid_length(row.len(), &self));
                    }
                    slot.copy_from_slice(&row);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_tuple(6, ListsVisitor)
    }
}

/// Table 7-3: default 4x4 scaling lists.
pub const DEFAULT_4X4_INTRA: [u8; 16] = [6, 13, 13, 20, 20, 20, 28, 28, 28, 28, 32, 32, 32, 37, 37, 42];
pub const DEFAULT_4X4_INTER: [u8; 16] = [10, 14, 14, 20, 20, 20, 24, 24, 24, 24, 27, 27, 27, 30, 30, 34];

/// Table 7-4: default 8x8 scaling lists.
pub const DEFAULT_8X8_INTRA: [u8; 64] = [
    6, 10, 10, 13, 11, 13, 16, 16, 16, 16, 18, 18, 18, 18, 18, 23, 23, 23, 23, 23, 23, 25, 25, 25,
    25, 25, 25, 25, 27, 27, 27, 27, 27, 27, 27, 27, 29, 29, 29, 29, 29, 29, 29, 29, 31, 31, 31, 31,
    31, 31, 31, 33, 33, 33, 33, 33, 36, 36, 36, 36, 38, 38, 40, 42,
];
pub const DEFAULT_8X8_INTER: [u8; 64] = [
    9, 13, 13, 15, 13, 15, 17, 17, 17, 17, 19, 19, 19, 19, 19, 21, 21, 21, 21, 21, 21, 22, 22, 22,
    22, 22, 22, 22, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 25, 27, 27, 27, 27,
    27, 27, 27, 28, 28, 28, 28, 28, 30, 30, 30, 30, 32, 32, 33, 35,
];

/// Parse one scaling_list() of `out.len()` coefficients. Returns true when
/// the list requested the default matrix.
pub fn parse_scaling_list(reader: &mut BitReader, out: &mut [u8]) -> Result<bool> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;

    for (j, entry) in out.iter_mut().enumerate() {
        if next_scale != 0 {
            let delta_scale = reader.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
            if j == 0 && next_scale == 0 {
                return Ok(true);
            }
        }
        *entry = if next_scale == 0 {
            last_scale as u8
        } else {
            next_scale as u8
        };
        last_scale = *entry as i32;
    }

    Ok(false)
}

/// Parse the scaling-list block shared by SPS and PPS syntax.
fn parse_scaling_lists(
    reader: &mut BitReader,
    num_lists: usize,
    lists: &mut ScalingLists,
) -> Result<()> {
    for i in 0..num_lists {
        lists.present[i] = reader.read_flag()?;
        if !lists.present[i] {
            continue;
        }
        if i < 6 {
            lists.use_default_4x4[i] = parse_scaling_list(reader, &mut lists.list_4x4[i])?;
        } else {
            lists.use_default_8x8[i - 6] =
                parse_scaling_list(reader, &mut lists.list_8x8[i - 6])?;
        }
    }
    Ok(())
}

/// HRD parameters (E.1.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HrdParameters {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub bit_rate_value_minus1: Vec<u32>,
    pub cpb_size_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}

/// VUI (Video Usability Information) parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VuiParameters {
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,
    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,
    pub video_signal_type_present_flag: bool,
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
    pub nal_hrd_parameters_present_flag: bool,
    pub nal_hrd_parameters: Option<HrdParameters>,
    pub vcl_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters: Option<HrdParameters>,
    pub low_delay_hrd_flag: bool,
    pub pic_struct_present_flag: bool,
    pub bitstream_restriction_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

/// Sequence Parameter Set with the variables §7.4.2.1 derives from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sps {
    pub profile_idc: ProfileIdc,
    pub constraint_set0_flag: bool,
    pub constraint_set1_flag: bool,
    pub constraint_set2_flag: bool,
    pub constraint_set3_flag: bool,
    pub constraint_set4_flag: bool,
    pub constraint_set5_flag: bool,
    pub level_idc: u8,
    pub seq_parameter_set_id: u8,
    pub chroma_format_idc: ChromaFormat,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub seq_scaling_matrix_present_flag: bool,
    pub scaling_lists: ScalingLists,
    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt_type: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub delta_pic_order_always_zero_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: Vec<i32>,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
    pub vui_parameters_present_flag: bool,
    pub vui_parameters: Option<VuiParameters>,
}

impl Sps {
    /// ChromaArrayType: 0 when the colour planes are coded separately.
    pub fn chroma_array_type(&self) -> u8 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc as u8
        }
    }

    /// Chroma macroblock width in samples (0 when no chroma is parsed).
    pub fn mb_width_c(&self) -> u32 {
        match self.chroma_array_type() {
            0 => 0,
            _ => 16 / self.chroma_format_idc.sub_width_c(),
        }
    }

    /// Chroma macroblock height in samples.
    pub fn mb_height_c(&self) -> u32 {
        match self.chroma_array_type() {
            0 => 0,
            _ => 16 / self.chroma_format_idc.sub_height_c(),
        }
    }

    pub fn bit_depth_luma(&self) -> u8 {
        self.bit_depth_luma_minus8 + 8
    }

    pub fn bit_depth_chroma(&self) -> u8 {
        self.bit_depth_chroma_minus8 + 8
    }

    pub fn qp_bd_offset_y(&self) -> i32 {
        6 * self.bit_depth_luma_minus8 as i32
    }

    pub fn qp_bd_offset_c(&self) -> i32 {
        6 * self.bit_depth_chroma_minus8 as i32
    }

    /// Bits of a raw I_PCM macroblock payload.
    pub fn raw_mb_bits(&self) -> u32 {
        256 * self.bit_depth_luma() as u32
            + 2 * self.mb_width_c() * self.mb_height_c() * self.bit_depth_chroma() as u32
    }

    pub fn max_frame_num(&self) -> u32 {
        1 << (self.log2_max_frame_num_minus4 + 4)
    }

    pub fn max_pic_order_cnt_lsb(&self) -> u32 {
        1 << (self.log2_max_pic_order_cnt_lsb_minus4 + 4)
    }

    pub fn expected_delta_per_pic_order_cnt_cycle(&self) -> i32 {
        self.offset_for_ref_frame.iter().sum()
    }

    pub fn pic_width_in_mbs(&self) -> u32 {
        self.pic_width_in_mbs_minus1 + 1
    }

    pub fn pic_height_in_map_units(&self) -> u32 {
        self.pic_height_in_map_units_minus1 + 1
    }

    pub fn pic_size_in_map_units(&self) -> u32 {
        self.pic_width_in_mbs() * self.pic_height_in_map_units()
    }

    pub fn frame_height_in_mbs(&self) -> u32 {
        (2 - self.frame_mbs_only_flag as u32) * self.pic_height_in_map_units()
    }

    /// Picture width in luma samples.
    pub fn pic_width(&self) -> u32 {
        self.pic_width_in_mbs() * 16
    }

    /// Frame height in luma samples.
    pub fn pic_height(&self) -> u32 {
        self.frame_height_in_mbs() * 16
    }

    pub fn pic_width_c(&self) -> u32 {
        self.pic_width_in_mbs() * self.mb_width_c()
    }

    pub fn pic_height_c(&self) -> u32 {
        self.frame_height_in_mbs() * self.mb_height_c()
    }

    /// Cropping-unit sizes (7-19..7-22).
    pub fn crop_unit_x(&self) -> u32 {
        if self.chroma_array_type() == 0 {
            1
        } else {
            self.chroma_format_idc.sub_width_c()
        }
    }

    pub fn crop_unit_y(&self) -> u32 {
        let base = if self.chroma_array_type() == 0 {
            1
        } else {
            self.chroma_format_idc.sub_height_c()
        };
        base * (2 - self.frame_mbs_only_flag as u32)
    }

    /// Display width after cropping.
    pub fn display_width(&self) -> u32 {
        let width = self.pic_width();
        if self.frame_cropping_flag {
            width - self.crop_unit_x() * (self.frame_crop_left_offset + self.frame_crop_right_offset)
        } else {
            width
        }
    }

    /// Display height after cropping.
    pub fn display_height(&self) -> u32 {
        let height = self.pic_height();
        if self.frame_cropping_flag {
            height
                - self.crop_unit_y() * (self.frame_crop_top_offset + self.frame_crop_bottom_offset)
        } else {
            height
        }
    }

    /// MaxDpbFrames per level (Table A-1), clamped to [1, 16] and never below
    /// max_num_ref_frames.
    pub fn max_dpb_frames(&self) -> u32 {
        let max_dpb_mbs: u32 = match self.level_idc {
            0..=10 => 396,
            11 => 900,
            12 | 13 | 20 => 2376,
            21 => 4752,
            22 | 30 => 8100,
            31 => 18000,
            32 => 20480,
            40 | 41 => 32768,
            42 => 34816,
            50 => 110_400,
            51 | 52 => 184_320,
            60 => 696_320,
            61 => 1_382_400,
            _ => 3_110_400,
        };
        let frame_mbs = self.pic_width_in_mbs() * self.frame_height_in_mbs();
        let by_level = (max_dpb_mbs / frame_mbs.max(1)).clamp(1, 16);
        by_level.max(self.max_num_ref_frames)
    }
}

/// Parse an SPS from a NAL unit payload.
pub fn parse_sps(data: &[u8]) -> Result<Sps> {
    let mut reader = BitReader::new(data);
    parse_sps_data(&mut reader)
}

/// Parse seq_parameter_set_data() from an open reader (shared with the
/// subset-SPS path).
pub fn parse_sps_data(reader: &mut BitReader) -> Result<Sps> {
    let profile_idc = ProfileIdc::from_u8(reader.read_bits(8)? as u8)?;
    let constraint_set0_flag = reader.read_flag()?;
    let constraint_set1_flag = reader.read_flag()?;
    let constraint_set2_flag = reader.read_flag()?;
    let constraint_set3_flag = reader.read_flag()?;
    let constraint_set4_flag = reader.read_flag()?;
    let constraint_set5_flag = reader.read_flag()?;
    let _reserved_zero_2bits = reader.read_bits(2)?;
    let level_idc = reader.read_bits(8)? as u8;
    let seq_parameter_set_id = reader.read_ue()?;
    if seq_parameter_set_id > 31 {
        return Err(DecodeError::SyntaxViolation(format!(
            "seq_parameter_set_id {} exceeds maximum 31",
            seq_parameter_set_id
        )));
    }

    let mut chroma_format_idc = ChromaFormat::Yuv420;
    let mut separate_colour_plane_flag = false;
    let mut bit_depth_luma_minus8 = 0u8;
    let mut bit_depth_chroma_minus8 = 0u8;
    let mut qpprime_y_zero_transform_bypass_flag = false;
    let mut seq_scaling_matrix_present_flag = false;
    let mut scaling_lists = ScalingLists::default();

    if profile_idc.has_chroma_info() {
        chroma_format_idc = ChromaFormat::from_u8(reader.read_ue()? as u8)?;
        if chroma_format_idc == ChromaFormat::Yuv444 {
            separate_colour_plane_flag = reader.read_flag()?;
        }

        // bit_depth above 14 is outside every covered profile.
        const MAX_BIT_DEPTH_MINUS8: u32 = 6;
        let raw = reader.read_ue()?;
        if raw > MAX_BIT_DEPTH_MINUS8 {
            return Err(DecodeError::SyntaxViolation(format!(
                "bit_depth_luma_minus8 {} exceeds maximum {}",
                raw, MAX_BIT_DEPTH_MINUS8
            )));
        }
        bit_depth_luma_minus8 = raw as u8;

        let raw = reader.read_ue()?;
        if raw > MAX_BIT_DEPTH_MINUS8 {
            return Err(DecodeError::SyntaxViolation(format!(
                "bit_depth_chroma_minus8 {} exceeds maximum {}",
                raw, MAX_BIT_DEPTH_MINUS8
            )));
        }
        bit_depth_chroma_minus8 = raw as u8;

        qpprime_y_zero_transform_bypass_flag = reader.read_flag()?;
        seq_scaling_matrix_present_flag = reader.read_flag()?;

        if seq_scaling_matrix_present_flag {
            let num_lists = if chroma_format_idc == ChromaFormat::Yuv444 {
                12
            } else {
                8
            };
            parse_scaling_lists(reader, num_lists, &mut scaling_lists)?;
        }
    }

    let log2_max_frame_num_minus4 = reader.read_ue()?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(DecodeError::SyntaxViolation(format!(
            "log2_max_frame_num_minus4 {} exceeds maximum 12",
            log2_max_frame_num_minus4
        )));
    }
    let pic_order_cnt_type = reader.read_ue()?;
    if pic_order_cnt_type > 2 {
        return Err(DecodeError::SyntaxViolation(format!(
            "pic_order_cnt_type {} exceeds maximum 2",
            pic_order_cnt_type
        )));
    }

    let mut log2_max_pic_order_cnt_lsb_minus4 = 0u8;
    let mut delta_pic_order_always_zero_flag = false;
    let mut offset_for_non_ref_pic = 0i32;
    let mut offset_for_top_to_bottom_field = 0i32;
    let mut offset_for_ref_frame = Vec::new();

    match pic_order_cnt_type {
        0 => {
            let raw = reader.read_ue()?;
            if raw > 12 {
                return Err(DecodeError::SyntaxViolation(format!(
                    "log2_max_pic_order_cnt_lsb_minus4 {} exceeds maximum 12",
                    raw
                )));
            }
            log2_max_pic_order_cnt_lsb_minus4 = raw as u8;
        }
        1 => {
            delta_pic_order_always_zero_flag = reader.read_flag()?;
            offset_for_non_ref_pic = reader.read_se()?;
            offset_for_top_to_bottom_field = reader.read_se()?;

            let cycle_len = reader.read_ue()?;
            if cycle_len > 255 {
                return Err(DecodeError::SyntaxViolation(format!(
                    "num_ref_frames_in_pic_order_cnt_cycle {} exceeds maximum 255",
                    cycle_len
                )));
            }
            for _ in 0..cycle_len {
                offset_for_ref_frame.push(reader.read_se()?);
            }
        }
        _ => {}
    }

    let max_num_ref_frames = reader.read_ue()?;
    if max_num_ref_frames > 16 {
        return Err(DecodeError::SyntaxViolation(format!(
            "max_num_ref_frames {} exceeds maximum 16",
            max_num_ref_frames
        )));
    }

    let gaps_in_frame_num_value_allowed_flag = reader.read_flag()?;

    const MAX_PIC_DIMENSION_IN_MBS: u32 = 1 << 14;
    let pic_width_in_mbs_minus1 = reader.read_ue()?;
    if pic_width_in_mbs_minus1 >= MAX_PIC_DIMENSION_IN_MBS {
        return Err(DecodeError::SyntaxViolation(format!(
            "pic_width_in_mbs_minus1 {} exceeds maximum {}",
            pic_width_in_mbs_minus1, MAX_PIC_DIMENSION_IN_MBS
        )));
    }
    let pic_height_in_map_units_minus1 = reader.read_ue()?;
    if pic_height_in_map_units_minus1 >= MAX_PIC_DIMENSION_IN_MBS {
        return Err(DecodeError::SyntaxViolation(format!(
            "pic_height_in_map_units_minus1 {} exceeds maximum {}",
            pic_height_in_map_units_minus1, MAX_PIC_DIMENSION_IN_MBS
        )));
    }

    let frame_mbs_only_flag = reader.read_flag()?;
    let mut mb_adaptive_frame_field_flag = false;
    if !frame_mbs_only_flag {
        mb_adaptive_frame_field_flag = reader.read_flag()?;
    }

    let direct_8x8_inference_flag = reader.read_flag()?;
    let frame_cropping_flag = reader.read_flag()?;

    let mut frame_crop_left_offset = 0;
    let mut frame_crop_right_offset = 0;
    let mut frame_crop_top_offset = 0;
    let mut frame_crop_bottom_offset = 0;
    if frame_cropping_flag {
        frame_crop_left_offset = reader.read_ue()?;
        frame_crop_right_offset = reader.read_ue()?;
        frame_crop_top_offset = reader.read_ue()?;
        frame_crop_bottom_offset = reader.read_ue()?;
    }

    let vui_parameters_present_flag = reader.read_flag()?;
    let vui_parameters = if vui_parameters_present_flag {
        Some(parse_vui(reader)?)
    } else {
        None
    };

    Ok(Sps {
        profile_idc,
        constraint_set0_flag,
        constraint_set1_flag,
        constraint_set2_flag,
        constraint_set3_flag,
        constraint_set4_flag,
        constraint_set5_flag,
        level_idc,
        seq_parameter_set_id: seq_parameter_set_id as u8,
        chroma_format_idc,
        separate_colour_plane_flag,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        qpprime_y_zero_transform_bypass_flag,
        seq_scaling_matrix_present_flag,
        scaling_lists,
        log2_max_frame_num_minus4: log2_max_frame_num_minus4 as u8,
        pic_order_cnt_type: pic_order_cnt_type as u8,
        log2_max_pic_order_cnt_lsb_minus4,
        delta_pic_order_always_zero_flag,
        offset_for_non_ref_pic,
        offset_for_top_to_bottom_field,
        offset_for_ref_frame,
        max_num_ref_frames,
        gaps_in_frame_num_value_allowed_flag,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only_flag,
        mb_adaptive_frame_field_flag,
        direct_8x8_inference_flag,
        frame_cropping_flag,
        frame_crop_left_offset,
        frame_crop_right_offset,
        frame_crop_top_offset,
        frame_crop_bottom_offset,
        vui_parameters_present_flag,
        vui_parameters,
    })
}

/// One view's dependency description from the subset-SPS MVC extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MvcViewInfo {
    pub view_id: u16,
    pub anchor_ref_l0: Vec<u16>,
    pub anchor_ref_l1: Vec<u16>,
    pub non_anchor_ref_l0: Vec<u16>,
    pub non_anchor_ref_l1: Vec<u16>,
}

/// seq_parameter_set_mvc_extension() (H.7.3.2.1.4), level info skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MvcExtension {
    pub views: Vec<MvcViewInfo>,
}

/// Subset sequence parameter set (MVC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetSps {
    pub sps: Sps,
    pub mvc: MvcExtension,
}

/// Parse a subset SPS (NAL type 15).
pub fn parse_subset_sps(data: &[u8]) -> Result<SubsetSps> {
    let mut reader = BitReader::new(data);
    let sps = parse_sps_data(&mut reader)?;

    if !sps.profile_idc.is_mvc() {
        return Err(DecodeError::UnsupportedProfile(format!(
            "subset SPS with non-MVC profile {}",
            sps.profile_idc
        )));
    }

    let bit_equal_to_one = reader.read_flag()?;
    if !bit_equal_to_one {
        return Err(DecodeError::SyntaxViolation(
            "bit_equal_to_one is zero in subset SPS".to_string(),
        ));
    }

    let num_views_minus1 = reader.read_ue()?;
    if num_views_minus1 > 1023 {
        return Err(DecodeError::SyntaxViolation(format!(
            "num_views_minus1 {} exceeds maximum 1023",
            num_views_minus1
        )));
    }
    let num_views = num_views_minus1 as usize + 1;

    let mut views = vec![MvcViewInfo::default(); num_views];
    for view in views.iter_mut() {
        view.view_id = reader.read_ue()? as u16;
    }
    for view in views.iter_mut().skip(1) {
        let n = reader.read_ue()? as usize;
        for _ in 0..n.min(16) {
            view.anchor_ref_l0.push(reader.read_ue()? as u16);
        }
        let n = reader.read_ue()? as usize;
        for _ in 0..n.min(16) {
            view.anchor_ref_l1.push(reader.read_ue()? as u16);
        }
    }
    for view in views.iter_mut().skip(1) {
        let n = reader.read_ue()? as usize;
        for _ in 0..n.min(16) {
            view.non_anchor_ref_l0.push(reader.read_ue()? as u16);
        }
        let n = reader.read_ue()? as usize;
        for _ in 0..n.min(16) {
            view.non_anchor_ref_l1.push(reader.read_ue()? as u16);
        }
    }

    // Level values and MVC VUI are not needed for reconstruction.
    Ok(SubsetSps {
        sps,
        mvc: MvcExtension { views },
    })
}

/// Parse hrd_parameters().
fn parse_hrd_parameters(reader: &mut BitReader) -> Result<HrdParameters> {
    let cpb_cnt_minus1 = reader.read_ue()?;
    if cpb_cnt_minus1 > 31 {
        return Err(DecodeError::SyntaxViolation(format!(
            "cpb_cnt_minus1 {} exceeds maximum 31",
            cpb_cnt_minus1
        )));
    }

    let mut hrd = HrdParameters {
        cpb_cnt_minus1,
        bit_rate_scale: reader.read_bits(4)? as u8,
        cpb_size_scale: reader.read_bits(4)? as u8,
        ..Default::default()
    };

    for _ in 0..=cpb_cnt_minus1 {
        hrd.bit_rate_value_minus1.push(reader.read_ue()?);
        hrd.cpb_size_value_minus1.push(reader.read_ue()?);
        hrd.cbr_flag.push(reader.read_flag()?);
    }

    hrd.initial_cpb_removal_delay_length_minus1 = reader.read_bits(5)? as u8;
    hrd.cpb_removal_delay_length_minus1 = reader.read_bits(5)? as u8;
    hrd.dpb_output_delay_length_minus1 = reader.read_bits(5)? as u8;
    hrd.time_offset_length = reader.read_bits(5)? as u8;

    Ok(hrd)
}

/// Parse vui_parameters().
fn parse_vui(reader: &mut BitReader) -> Result<VuiParameters> {
    let mut vui = VuiParameters::default();

    vui.aspect_ratio_info_present_flag = reader.read_flag()?;
    if vui.aspect_ratio_info_present_flag {
        vui.aspect_ratio_idc = reader.read_bits(8)? as u8;
        if vui.aspect_ratio_idc == 255 {
            // Extended_SAR
            vui.sar_width = reader.read_bits(16)? as u16;
            vui.sar_height = reader.read_bits(16)? as u16;
        }
    }

    vui.overscan_info_present_flag = reader.read_flag()?;
    if vui.overscan_info_present_flag {
        vui.overscan_appropriate_flag = reader.read_flag()?;
    }

    vui.video_signal_type_present_flag = reader.read_flag()?;
    if vui.video_signal_type_present_flag {
        vui.video_format = reader.read_bits(3)? as u8;
        vui.video_full_range_flag = reader.read_flag()?;
        vui.colour_description_present_flag = reader.read_flag()?;
        if vui.colour_description_present_flag {
            vui.colour_primaries = reader.read_bits(8)? as u8;
            vui.transfer_characteristics = reader.read_bits(8)? as u8;
            vui.matrix_coefficients = reader.read_bits(8)? as u8;
        }
    }

    vui.chroma_loc_info_present_flag = reader.read_flag()?;
    if vui.chroma_loc_info_present_flag {
        vui.chroma_sample_loc_type_top_field = reader.read_ue()?;
        vui.chroma_sample_loc_type_bottom_field = reader.read_ue()?;
        if vui.chroma_sample_loc_type_top_field > 5 || vui.chroma_sample_loc_type_bottom_field > 5 {
            return Err(DecodeError::SyntaxViolation(
                "chroma_sample_loc_type exceeds maximum 5".to_string(),
            ));
        }
    }

    vui.timing_info_present_flag = reader.read_flag()?;
    if vui.timing_info_present_flag {
        vui.num_units_in_tick = reader.read_bits(32)?;
        vui.time_scale = reader.read_bits(32)?;
        vui.fixed_frame_rate_flag = reader.read_flag()?;
    }

    vui.nal_hrd_parameters_present_flag = reader.read_flag()?;
    if vui.nal_hrd_parameters_present_flag {
        vui.nal_hrd_parameters = Some(parse_hrd_parameters(reader)?);
    }
    vui.vcl_hrd_parameters_present_flag = reader.read_flag()?;
    if vui.vcl_hrd_parameters_present_flag {
        vui.vcl_hrd_parameters = Some(parse_hrd_parameters(reader)?);
    }
    if vui.nal_hrd_parameters_present_flag || vui.vcl_hrd_parameters_present_flag {
        vui.low_delay_hrd_flag = reader.read_flag()?;
    }

    vui.pic_struct_present_flag = reader.read_flag()?;
    vui.bitstream_restriction_flag = reader.read_flag()?;
    if vui.bitstream_restriction_flag {
        vui.motion_vectors_over_pic_boundaries_flag = reader.read_flag()?;
        let _max_bytes_per_pic_denom = reader.read_ue()?;
        let _max_bits_per_mb_denom = reader.read_ue()?;
        let _log2_max_mv_length_horizontal = reader.read_ue()?;
        let _log2_max_mv_length_vertical = reader.read_ue()?;
        vui.max_num_reorder_frames = reader.read_ue()?;
        vui.max_dec_frame_buffering = reader.read_ue()?;
        if vui.max_dec_frame_buffering > 32 {
            return Err(DecodeError::SyntaxViolation(format!(
                "max_dec_frame_buffering {} exceeds maximum 32",
                vui.max_dec_frame_buffering
            )));
        }
    }

    Ok(vui)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_sps() -> Sps {
        // Baseline 16x16, 4:2:0, 8-bit, the shape used by the scenario tests.
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
            max_num_ref_frames: 2,
            gaps_in_frame_num_value_allowed_flag: false,
            pic_width_in_mbs_minus1: 0,
            pic_height_in_map_units_minus1: 0,
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

    #[test]
    fn test_derived_values() {
        let sps = minimal_sps();
        assert_eq!(sps.chroma_array_type(), 1);
        assert_eq!(sps.mb_width_c(), 8);
        assert_eq!(sps.mb_height_c(), 8);
        assert_eq!(sps.bit_depth_luma(), 8);
        assert_eq!(sps.qp_bd_offset_y(), 0);
        assert_eq!(sps.max_frame_num(), 16);
        assert_eq!(sps.max_pic_order_cnt_lsb(), 16);
        assert_eq!(sps.pic_width(), 16);
        assert_eq!(sps.pic_height(), 16);
        assert_eq!(sps.frame_height_in_mbs(), 1);
        assert_eq!(sps.raw_mb_bits(), 256 * 8 + 2 * 64 * 8);
        // level 3.0 allows 8100 MBs; one-MB frames clamp to 16
        assert_eq!(sps.max_dpb_frames(), 16);
    }

    #[test]
    fn test_chroma_invariants() {
        // SubWidthC * MbWidthC == 16 whenever chroma is present.
        for fmt in [ChromaFormat::Yuv420, ChromaFormat::Yuv422, ChromaFormat::Yuv444] {
            let mut sps = minimal_sps();
            sps.chroma_format_idc = fmt;
            assert_eq!(fmt.sub_width_c() * sps.mb_width_c(), 16);
            assert_eq!(fmt.sub_height_c() * sps.mb_height_c(), 16);
        }
    }

    #[test]
    fn test_separate_colour_planes_have_no_chroma_arrays() {
        let mut sps = minimal_sps();
        sps.chroma_format_idc = ChromaFormat::Yuv444;
        sps.separate_colour_plane_flag = true;
        assert_eq!(sps.chroma_array_type(), 0);
        assert_eq!(sps.mb_width_c(), 0);
        assert_eq!(sps.mb_height_c(), 0);
    }

    #[test]
    fn test_parse_scaling_list_defaults() {
        // delta_scale -8 at position 0 selects the default matrix.
        // se(-8) codeword: ue 16 -> 000010001
        let data = [0b0000_1000, 0b1000_0000];
        let mut reader = BitReader::new(&data);
        let mut out = [0u8; 16];
        assert!(parse_scaling_list(&mut reader, &mut out).unwrap());
    }

    #[test]
    fn test_parse_scaling_list_explicit() {
        // 16 entries of delta 0 keeps last_scale 8 everywhere: each delta is
        // se(0) = '1'.
        let data = [0xff, 0xff];
        let mut reader = BitReader::new(&data);
        let mut out = [0u8; 16];
        assert!(!parse_scaling_list(&mut reader, &mut out).unwrap());
        assert!(out.iter().all(|&v| v == 8));
    }

    #[test]
    fn test_unsupported_profile() {
        assert!(ProfileIdc::from_u8(83).is_err());
        assert!(ProfileIdc::from_u8(86).is_err());
        assert!(ProfileIdc::from_u8(128).is_ok());
    }
}

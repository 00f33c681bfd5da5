//! H.264/AVC NAL (Network Abstraction Layer) unit parsing.

use crate::bitreader::BitReader;
use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};

/// H.264/AVC NAL unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NalUnitType {
    /// Unspecified
    Unspecified = 0,
    /// Coded slice of a non-IDR picture
    NonIdrSlice = 1,
    /// Coded slice data partition A
    SliceDataA = 2,
    /// Coded slice data partition B
    SliceDataB = 3,
    /// Coded slice data partition C
    SliceDataC = 4,
    /// Coded slice of an IDR picture
    IdrSlice = 5,
    /// Supplemental enhancement information (SEI)
    Sei = 6,
    /// Sequence parameter set (SPS)
    Sps = 7,
    /// Picture parameter set (PPS)
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndOfSequence = 10,
    /// End of stream
    EndOfStream = 11,
    /// Filler data
    FillerData = 12,
    /// SPS extension
    SpsExtension = 13,
    /// Prefix NAL unit (MVC)
    PrefixNal = 14,
    /// Subset SPS (MVC)
    SubsetSps = 15,
    /// Reserved (16-18)
    Reserved16 = 16,
    Reserved17 = 17,
    Reserved18 = 18,
    /// Coded slice of an auxiliary coded picture
    AuxSlice = 19,
    /// Coded slice extension (MVC)
    SliceExtension = 20,
    /// Coded slice extension for depth view
    SliceExtensionDepth = 21,
    /// Reserved (22-23)
    Reserved22 = 22,
    Reserved23 = 23,
    /// View and dependency representation delimiter (MVC)
    Vdrd = 24,
    /// Unspecified (25-31)
    Unspecified25 = 25,
}

impl NalUnitType {
    /// Create from raw value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => NalUnitType::Unspecified,
            1 => NalUnitType::NonIdrSlice,
            2 => NalUnitType::SliceDataA,
            3 => NalUnitType::SliceDataB,
            4 => NalUnitType::SliceDataC,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            13 => NalUnitType::SpsExtension,
            14 => NalUnitType::PrefixNal,
            15 => NalUnitType::SubsetSps,
            16 => NalUnitType::Reserved16,
            17 => NalUnitType::Reserved17,
            18 => NalUnitType::Reserved18,
            19 => NalUnitType::AuxSlice,
            20 => NalUnitType::SliceExtension,
            21 => NalUnitType::SliceExtensionDepth,
            22 => NalUnitType::Reserved22,
            23 => NalUnitType::Reserved23,
            24 => NalUnitType::Vdrd,
            _ => NalUnitType::Unspecified25,
        }
    }

    /// Check if this is a VCL (Video Coding Layer) NAL unit.
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            NalUnitType::NonIdrSlice
                | NalUnitType::SliceDataA
                | NalUnitType::SliceDataB
                | NalUnitType::SliceDataC
                | NalUnitType::IdrSlice
                | NalUnitType::AuxSlice
                | NalUnitType::SliceExtension
                | NalUnitType::SliceExtensionDepth
        )
    }

    /// Check if this is a parameter set.
    pub fn is_parameter_set(&self) -> bool {
        matches!(
            self,
            NalUnitType::Sps
                | NalUnitType::Pps
                | NalUnitType::SpsExtension
                | NalUnitType::SubsetSps
        )
    }
}

/// NAL unit header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NalUnitHeader {
    /// forbidden_zero_bit (must be 0)
    pub forbidden_zero_bit: bool,
    /// nal_ref_idc (0-3)
    pub nal_ref_idc: u8,
    /// nal_unit_type
    pub nal_unit_type: NalUnitType,
}

/// nal_unit_header_mvc_extension() payload of prefix (14) and slice-extension
/// (20) NAL units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MvcNalHeader {
    /// non_idr_flag
    pub non_idr_flag: bool,
    /// priority_id
    pub priority_id: u8,
    /// view_id
    pub view_id: u16,
    /// temporal_id
    pub temporal_id: u8,
    /// anchor_pic_flag
    pub anchor_pic_flag: bool,
    /// inter_view_flag
    pub inter_view_flag: bool,
}

/// Parsed NAL unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NalUnit {
    /// NAL unit header.
    pub header: NalUnitHeader,
    /// MVC header extension, present on types 14 and 20.
    pub mvc_header: Option<MvcNalHeader>,
    /// Byte offset in the original stream (start of NAL unit header).
    pub offset: usize,
    /// Size of the NAL unit in bytes (including header).
    pub size: usize,
    /// RBSP payload (after header bytes, with emulation prevention removed).
    pub payload: Vec<u8>,
}

impl NalUnit {
    /// Get NAL unit type.
    pub fn nal_type(&self) -> NalUnitType {
        self.header.nal_unit_type
    }

    /// Check if this unit carries a reference picture.
    pub fn is_reference(&self) -> bool {
        self.header.nal_ref_idc > 0
    }
}

/// Parse a NAL unit header from its first byte.
pub fn parse_nal_header(byte: u8) -> Result<NalUnitHeader> {
    let forbidden_zero_bit = (byte >> 7) & 1 != 0;
    let nal_ref_idc = (byte >> 5) & 0x03;
    let nal_unit_type = NalUnitType::from_u8(byte & 0x1f);

    if forbidden_zero_bit {
        return Err(DecodeError::SyntaxViolation(
            "forbidden_zero_bit is set".to_string(),
        ));
    }

    Ok(NalUnitHeader {
        forbidden_zero_bit,
        nal_ref_idc,
        nal_unit_type,
    })
}

/// Parse the 3-byte nal_unit_header_mvc_extension.
pub fn parse_mvc_nal_header(reader: &mut BitReader) -> Result<MvcNalHeader> {
    let non_idr_flag = reader.read_flag()?;
    let priority_id = reader.read_bits(6)? as u8;
    let view_id = reader.read_bits(10)? as u16;
    let temporal_id = reader.read_bits(3)? as u8;
    let anchor_pic_flag = reader.read_flag()?;
    let inter_view_flag = reader.read_flag()?;
    let _reserved_one_bit = reader.read_flag()?;

    Ok(MvcNalHeader {
        non_idr_flag,
        priority_id,
        view_id,
        temporal_id,
        anchor_pic_flag,
        inter_view_flag,
    })
}

/// Strip emulation-prevention bytes while copying EBSP payload into RBSP
/// form: a 0x03 that follows a run of two zero bytes is framing, not data.
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zero_run = 0u32;

    for &byte in data {
        if zero_run >= 2 && byte == 0x03 {
            zero_run = 0;
            continue;
        }
        zero_run = if byte == 0 { zero_run + 1 } else { 0 };
        rbsp.push(byte);
    }
    rbsp
}

/// Parse a single NAL unit from one unframed unit (header byte + EBSP bytes).
pub fn parse_nal_unit(data: &[u8], offset: usize) -> Result<NalUnit> {
    if data.is_empty() {
        return Err(DecodeError::BitstreamUnderflow { needed: 8, at: 0 });
    }

    let header = parse_nal_header(data[0])?;
    let mut body_start = 1;
    let mut mvc_header = None;

    if matches!(
        header.nal_unit_type,
        NalUnitType::PrefixNal | NalUnitType::SliceExtension
    ) {
        if data.len() < 4 {
            return Err(DecodeError::BitstreamUnderflow {
                needed: 24,
                at: data.len() * 8,
            });
        }
        // svc_extension_flag must be 0 for the MVC extension header.
        let mut reader = BitReader::new(&data[1..4]);
        let svc_extension_flag = reader.read_flag()?;
        if svc_extension_flag {
            return Err(DecodeError::UnsupportedProfile(
                "SVC extension NAL units are not supported".to_string(),
            ));
        }
        mvc_header = Some(parse_mvc_nal_header(&mut reader)?);
        body_start = 4;
    }

    let payload = unescape_rbsp(&data[body_start..]);

    Ok(NalUnit {
        header,
        mvc_header,
        offset,
        size: data.len(),
        payload,
    })
}

/// Find NAL unit payload start positions in an Annex B byte stream.
/// Returns offsets pointing to the first byte after each start code.
pub fn find_nal_units(data: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                positions.push(i + 3);
                i += 3;
                continue;
            } else if i + 3 < data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                positions.push(i + 4);
                i += 4;
                continue;
            }
        }
        i += 1;
    }

    positions
}

/// Split an Annex B byte stream into parsed NAL units.
pub fn parse_annex_b(data: &[u8]) -> Result<Vec<NalUnit>> {
    let positions = find_nal_units(data);
    let mut nal_units = Vec::new();

    for (idx, &start) in positions.iter().enumerate() {
        if start >= data.len() {
            continue;
        }

        let mut end = if idx + 1 < positions.len() {
            let next_start = positions[idx + 1];
            if next_start >= 4 && data[next_start - 4] == 0 {
                next_start - 4
            } else {
                next_start - 3
            }
        } else {
            data.len()
        };
        // Strip trailing zero bytes that belong to the start-code prefix.
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }

        if start >= end {
            continue;
        }

        let offset = if start >= 4 && data[start - 4] == 0 {
            start - 4
        } else {
            start - 3
        };

        nal_units.push(parse_nal_unit(&data[start..end], offset)?);
    }

    Ok(nal_units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_rbsp() {
        let data = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02];
        assert_eq!(unescape_rbsp(&data), vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
        // A 0x03 with only one preceding zero is payload.
        let data = [0x00, 0x03, 0x00, 0x00, 0x03, 0x03];
        assert_eq!(unescape_rbsp(&data), vec![0x00, 0x03, 0x00, 0x00, 0x03]);
        // An escape resets the run; two further zeros escape again.
        let data = [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x00];
        assert_eq!(unescape_rbsp(&data), vec![0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_find_start_codes() {
        let data = [0x00, 0x00, 0x01, 0x67, 0x00, 0x00, 0x00, 0x01, 0x68];
        let positions = find_nal_units(&data);
        assert_eq!(positions, vec![3, 8]);
    }

    #[test]
    fn test_parse_nal_header() {
        let header = parse_nal_header(0x67).unwrap();
        assert_eq!(header.nal_ref_idc, 3);
        assert_eq!(header.nal_unit_type, NalUnitType::Sps);

        let header = parse_nal_header(0x68).unwrap();
        assert_eq!(header.nal_unit_type, NalUnitType::Pps);

        let header = parse_nal_header(0x65).unwrap();
        assert_eq!(header.nal_unit_type, NalUnitType::IdrSlice);

        assert!(parse_nal_header(0xe5).is_err());
    }

    #[test]
    fn test_nal_type_is_vcl() {
        assert!(NalUnitType::NonIdrSlice.is_vcl());
        assert!(NalUnitType::IdrSlice.is_vcl());
        assert!(NalUnitType::SliceExtension.is_vcl());
        assert!(!NalUnitType::Sps.is_vcl());
        assert!(!NalUnitType::Sei.is_vcl());
    }

    #[test]
    fn test_parse_annex_b_two_units() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xaa, 0xbb, // SPS
            0x00, 0x00, 0x01, 0x68, 0xcc, // PPS
        ];
        let units = parse_annex_b(&data).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nal_type(), NalUnitType::Sps);
        assert_eq!(units[0].payload, vec![0xaa, 0xbb]);
        assert_eq!(units[0].offset, 0);
        assert_eq!(units[1].nal_type(), NalUnitType::Pps);
        assert_eq!(units[1].payload, vec![0xcc]);
        assert_eq!(units[1].offset, 7);
    }

    #[test]
    fn test_parse_mvc_prefix() {
        // Prefix NAL: header 0x6e (ref_idc 3, type 14), svc_extension_flag 0,
        // non_idr 1, priority 0, view_id 1, temporal 0, anchor 0, inter_view 1.
        let bits: u32 = (0 << 23)      // svc_extension_flag
            | (1 << 22)                // non_idr_flag
            | (0 << 16)                // priority_id
            | (1 << 6)                 // view_id
            | (0 << 3)                 // temporal_id
            | (0 << 2)                 // anchor_pic_flag
            | (1 << 1)                 // inter_view_flag
            | 1; //                       reserved_one_bit
        let data = [0x6e, (bits >> 16) as u8, (bits >> 8) as u8, bits as u8];
        let unit = parse_nal_unit(&data, 0).unwrap();
        assert_eq!(unit.nal_type(), NalUnitType::PrefixNal);
        let mvc = unit.mvc_header.unwrap();
        assert!(mvc.non_idr_flag);
        assert_eq!(mvc.view_id, 1);
        assert!(mvc.inter_view_flag);
    }
}

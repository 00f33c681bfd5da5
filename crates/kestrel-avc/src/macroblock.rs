//! Macroblock records: types, partition tables and per-MB parsed state.

use crate::error::{DecodeError, Result};
use crate::slice::SliceType;

/// Decoded macroblock class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbClass {
    /// I_NxN (4x4 or 8x8 intra, selected by transform_size_8x8_flag)
    INxN,
    /// I_16x16 with packed prediction mode / cbp signalling
    I16x16,
    /// I_PCM raw samples
    IPcm,
    /// P/SP skip (inferred P_L0_16x16, zero mvd, ref 0)
    PSkip,
    P16x16,
    P16x8,
    P8x16,
    P8x8,
    P8x8Ref0,
    /// B skip / B_Direct_16x16
    BSkip,
    BDirect16x16,
    B16x16,
    B16x8,
    B8x16,
    B8x8,
}

impl MbClass {
    pub fn is_intra(&self) -> bool {
        matches!(self, MbClass::INxN | MbClass::I16x16 | MbClass::IPcm)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, MbClass::PSkip | MbClass::BSkip)
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, MbClass::BSkip | MbClass::BDirect16x16)
    }

    /// Number of macroblock partitions (1, 2 or 4).
    pub fn num_partitions(&self) -> usize {
        match self {
            MbClass::P16x8 | MbClass::P8x16 | MbClass::B16x8 | MbClass::B8x16 => 2,
            MbClass::P8x8 | MbClass::P8x8Ref0 | MbClass::B8x8 => 4,
            _ => 1,
        }
    }

    /// Partition size in luma samples.
    pub fn partition_size(&self) -> (usize, usize) {
        match self {
            MbClass::P16x8 | MbClass::B16x8 => (16, 8),
            MbClass::P8x16 | MbClass::B8x16 => (8, 16),
            MbClass::P8x8 | MbClass::P8x8Ref0 | MbClass::B8x8 => (8, 8),
            _ => (16, 16),
        }
    }
}

/// Prediction direction of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredDir {
    L0,
    L1,
    Bi,
    /// B direct (derived at prediction time)
    Direct,
}

impl PredDir {
    pub fn uses_list(&self, list: usize) -> bool {
        match self {
            PredDir::L0 => list == 0,
            PredDir::L1 => list == 1,
            PredDir::Bi | PredDir::Direct => true,
        }
    }
}

/// Decode the raw I-slice mb_type code (0..25) into class and I_16x16
/// parameters (Table 7-11).
pub fn decode_i_mb_type(code: u32) -> Result<(MbClass, u8, u8, u8)> {
    match code {
        0 => Ok((MbClass::INxN, 0, 0, 0)),
        1..=24 => {
            let idx = code - 1;
            let pred_mode = (idx % 4) as u8;
            let cbp_chroma = ((idx / 4) % 3) as u8;
            let cbp_luma = if idx / 12 > 0 { 15u8 } else { 0 };
            Ok((MbClass::I16x16, pred_mode, cbp_chroma, cbp_luma))
        }
        25 => Ok((MbClass::IPcm, 0, 0, 0)),
        other => Err(DecodeError::SyntaxViolation(format!(
            "I-slice mb_type {} exceeds maximum 25",
            other
        ))),
    }
}

/// P-slice mb_type (Table 7-13): 0..4 are inter classes, 5.. map to the
/// I-slice table.
pub fn decode_p_mb_type(code: u32) -> Result<(MbClass, u8, u8, u8)> {
    match code {
        0 => Ok((MbClass::P16x16, 0, 0, 0)),
        1 => Ok((MbClass::P16x8, 0, 0, 0)),
        2 => Ok((MbClass::P8x16, 0, 0, 0)),
        3 => Ok((MbClass::P8x8, 0, 0, 0)),
        4 => Ok((MbClass::P8x8Ref0, 0, 0, 0)),
        other => decode_i_mb_type(other - 5),
    }
}

/// B-slice mb_type (Table 7-14): class plus per-partition directions.
pub fn decode_b_mb_type(code: u32) -> Result<(MbClass, [PredDir; 2], u8, u8, u8)> {
    use PredDir::*;
    let two = |c, d0, d1| Ok((c, [d0, d1], 0, 0, 0));
    match code {
        0 => two(MbClass::BDirect16x16, Direct, Direct),
        1 => two(MbClass::B16x16, L0, L0),
        2 => two(MbClass::B16x16, L1, L1),
        3 => two(MbClass::B16x16, Bi, Bi),
        4 => two(MbClass::B16x8, L0, L0),
        5 => two(MbClass::B8x16, L0, L0),
        6 => two(MbClass::B16x8, L1, L1),
        7 => two(MbClass::B8x16, L1, L1),
        8 => two(MbClass::B16x8, L0, L1),
        9 => two(MbClass::B8x16, L0, L1),
        10 => two(MbClass::B16x8, L1, L0),
        11 => two(MbClass::B8x16, L1, L0),
        12 => two(MbClass::B16x8, L0, Bi),
        13 => two(MbClass::B8x16, L0, Bi),
        14 => two(MbClass::B16x8, L1, Bi),
        15 => two(MbClass::B8x16, L1, Bi),
        16 => two(MbClass::B16x8, Bi, L0),
        17 => two(MbClass::B8x16, Bi, L0),
        18 => two(MbClass::B16x8, Bi, L1),
        19 => two(MbClass::B8x16, Bi, L1),
        20 => two(MbClass::B16x8, Bi, Bi),
        21 => two(MbClass::B8x16, Bi, Bi),
        22 => two(MbClass::B8x8, Direct, Direct),
        other => {
            let (class, pm, cc, cl) = decode_i_mb_type(other - 23)?;
            Ok((class, [Direct, Direct], pm, cc, cl))
        }
    }
}

/// P sub_mb_type (Table 7-17): (sub-partition count, width, height).
pub fn decode_p_sub_mb_type(code: u32) -> Result<(u8, usize, usize, PredDir)> {
    match code {
        0 => Ok((1, 8, 8, PredDir::L0)),
        1 => Ok((2, 8, 4, PredDir::L0)),
        2 => Ok((2, 4, 8, PredDir::L0)),
        3 => Ok((4, 4, 4, PredDir::L0)),
        other => Err(DecodeError::SyntaxViolation(format!(
            "P sub_mb_type {} exceeds maximum 3",
            other
        ))),
    }
}

/// B sub_mb_type (Table 7-18).
pub fn decode_b_sub_mb_type(code: u32) -> Result<(u8, usize, usize, PredDir)> {
    use PredDir::*;
    match code {
        0 => Ok((4, 4, 4, Direct)),
        1 => Ok((1, 8, 8, L0)),
        2 => Ok((1, 8, 8, L1)),
        3 => Ok((1, 8, 8, Bi)),
        4 => Ok((2, 8, 4, L0)),
        5 => Ok((2, 4, 8, L0)),
        6 => Ok((2, 8, 4, L1)),
        7 => Ok((2, 4, 8, L1)),
        8 => Ok((2, 8, 4, Bi)),
        9 => Ok((2, 4, 8, Bi)),
        10 => Ok((4, 4, 4, L0)),
        11 => Ok((4, 4, 4, L1)),
        12 => Ok((4, 4, 4, Bi)),
        other => Err(DecodeError::SyntaxViolation(format!(
            "B sub_mb_type {} exceeds maximum 12",
            other
        ))),
    }
}

/// Map the coded_block_pattern code through the intra/inter table
/// (CAVLC `me(v)`, Table 9-4).
pub fn decode_cbp_code(code: u32, intra: bool, chroma_present: bool) -> Result<u8> {
    const CBP_48: [[u8; 2]; 48] = [
        [47, 0], [31, 16], [15, 1], [0, 2], [23, 4], [27, 8], [29, 32], [30, 3],
        [7, 5], [11, 10], [13, 12], [14, 15], [39, 47], [43, 7], [45, 11], [46, 13],
        [16, 14], [3, 6], [5, 9], [10, 31], [12, 35], [19, 37], [21, 42], [26, 44],
        [28, 33], [35, 34], [37, 36], [42, 40], [44, 39], [1, 43], [2, 45], [4, 46],
        [8, 17], [17, 18], [18, 20], [20, 24], [24, 19], [6, 21], [9, 26], [22, 28],
        [25, 23], [32, 27], [33, 29], [34, 30], [36, 22], [40, 25], [38, 38], [41, 41],
    ];
    const CBP_16: [[u8; 2]; 16] = [
        [15, 0], [0, 1], [7, 2], [11, 4], [13, 8], [14, 3], [3, 5], [5, 10],
        [10, 12], [12, 15], [1, 7], [2, 11], [4, 13], [8, 14], [6, 6], [9, 9],
    ];

    let column = if intra { 0 } else { 1 };
    if chroma_present {
        CBP_48
            .get(code as usize)
            .map(|row| row[column])
            .ok_or_else(|| {
                DecodeError::SyntaxViolation(format!("coded_block_pattern code {} out of range", code))
            })
    } else {
        CBP_16
            .get(code as usize)
            .map(|row| row[column])
            .ok_or_else(|| {
                DecodeError::SyntaxViolation(format!("coded_block_pattern code {} out of range", code))
            })
    }
}

/// Raw mb_type ranges per slice type, for validation.
pub fn max_mb_type(slice_type: SliceType) -> u32 {
    match slice_type {
        SliceType::I | SliceType::Si => 25,
        SliceType::P | SliceType::Sp => 30,
        SliceType::B => 48,
    }
}

/// CBF bit positions in the 64-bit per-MB coded-block-flag field: bit 0 luma
/// DC, 1..16 luma 4x4, 17/18 chroma DC, 19.. chroma AC.
pub const CBF_LUMA_DC_BIT: u8 = 0;

#[inline]
pub fn cbf_luma_bit(bx: usize, by: usize) -> u8 {
    1 + (4 * by + bx) as u8
}

#[inline]
pub fn cbf_chroma_dc_bit(plane: usize) -> u8 {
    17 + plane as u8
}

#[inline]
pub fn cbf_chroma_ac_bit(plane: usize, bx: usize, by: usize) -> u8 {
    19 + 16 * plane as u8 + (4 * by + bx) as u8
}

/// One macroblock's parsed state.
#[derive(Debug, Clone)]
pub struct Macroblock {
    pub mb_addr: u32,
    /// Position in macroblock units.
    pub mb_x: u32,
    pub mb_y: u32,
    /// Slice this MB belongs to; -1 until decoded (concealment marker).
    pub slice_nr: i32,

    pub class: MbClass,
    /// Raw mb_type code as parsed.
    pub mb_type_code: u32,
    pub skipped: bool,
    pub transform_size_8x8: bool,
    pub mb_field: bool,

    /// Intra 4x4/8x8 prediction modes per 4x4 block (scan order a..p).
    pub intra_pred_modes: [i8; 16],
    pub intra_chroma_pred_mode: u8,
    pub i16_pred_mode: u8,

    /// 8x8 sub-partition mode codes and directions.
    pub sub_mb_types: [u32; 4],
    pub b8_dir: [PredDir; 4],
    pub b8_parts: [u8; 4],
    pub b8_part_size: [(usize, usize); 4],

    /// Coded block pattern (luma low 4 bits, chroma bits 4..5).
    pub cbp: u8,
    /// Per-4x4 coded-block-flag field (CAVLC total_coeff != 0 or CABAC cbf).
    pub cbf: u64,
    pub qp: i32,
    pub qp_delta: i32,
    /// Chroma QP per component, derived from qp and the PPS offsets.
    pub qpc: [i32; 2],

    /// Motion vector differences [list][by][bx][component].
    pub mvd: [[[[i16; 2]; 4]; 4]; 2],
    /// Reference indices per 8x8 partition [list][b8].
    pub ref_idx: [[i8; 4]; 2],

    /// Number of decoded coefficients per 4x4 block and plane, for CAVLC nC
    /// prediction.
    pub nz_coeff: [[[u8; 4]; 4]; 3],
}

impl Macroblock {
    pub fn new(mb_addr: u32, width_in_mbs: u32) -> Self {
        Self {
            mb_addr,
            mb_x: mb_addr % width_in_mbs,
            mb_y: mb_addr / width_in_mbs,
            slice_nr: -1,
            class: MbClass::PSkip,
            mb_type_code: 0,
            skipped: false,
            transform_size_8x8: false,
            mb_field: false,
            intra_pred_modes: [2; 16], // DC
            intra_chroma_pred_mode: 0,
            i16_pred_mode: 0,
            sub_mb_types: [0; 4],
            b8_dir: [PredDir::Direct; 4],
            b8_parts: [1; 4],
            b8_part_size: [(8, 8); 4],
            cbp: 0,
            cbf: 0,
            qp: 0,
            qp_delta: 0,
            qpc: [0; 2],
            mvd: [[[[0; 2]; 4]; 4]; 2],
            ref_idx: [[-1; 4]; 2],
            nz_coeff: [[[0; 4]; 4]; 3],
        }
    }

    pub fn is_intra(&self) -> bool {
        self.class.is_intra()
    }

    /// Whether the MB was decoded (used by the concealment map).
    pub fn is_decoded(&self) -> bool {
        self.slice_nr >= 0
    }

    #[inline]
    pub fn cbf_bit(&self, bit: u8) -> bool {
        (self.cbf >> bit) & 1 != 0
    }

    #[inline]
    pub fn set_cbf_bit(&mut self, bit: u8) {
        self.cbf |= 1u64 << bit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i_mb_type_table() {
        assert_eq!(decode_i_mb_type(0).unwrap().0, MbClass::INxN);
        assert_eq!(decode_i_mb_type(25).unwrap().0, MbClass::IPcm);
        // mb_type 3: I_16x16_2_0_0 - DC prediction, no coded blocks.
        let (class, pred, cbp_c, cbp_l) = decode_i_mb_type(3).unwrap();
        assert_eq!(class, MbClass::I16x16);
        assert_eq!(pred, 2);
        assert_eq!(cbp_c, 0);
        assert_eq!(cbp_l, 0);
        // mb_type 24: I_16x16_3_2_1 - full luma cbp, chroma 2.
        let (_, pred, cbp_c, cbp_l) = decode_i_mb_type(24).unwrap();
        assert_eq!(pred, 3);
        assert_eq!(cbp_c, 2);
        assert_eq!(cbp_l, 15);
        assert!(decode_i_mb_type(26).is_err());
    }

    #[test]
    fn test_p_mb_type_table() {
        assert_eq!(decode_p_mb_type(0).unwrap().0, MbClass::P16x16);
        assert_eq!(decode_p_mb_type(3).unwrap().0, MbClass::P8x8);
        assert_eq!(decode_p_mb_type(4).unwrap().0, MbClass::P8x8Ref0);
        assert_eq!(decode_p_mb_type(5).unwrap().0, MbClass::INxN);
        assert_eq!(decode_p_mb_type(30).unwrap().0, MbClass::IPcm);
    }

    #[test]
    fn test_b_mb_type_table() {
        let (class, dirs, ..) = decode_b_mb_type(0).unwrap();
        assert_eq!(class, MbClass::BDirect16x16);
        assert!(class.is_direct());
        let (class, dirs2, ..) = decode_b_mb_type(8).unwrap();
        assert_eq!(class, MbClass::B16x8);
        assert_eq!(dirs2, [PredDir::L0, PredDir::L1]);
        let (class, ..) = decode_b_mb_type(22).unwrap();
        assert_eq!(class, MbClass::B8x8);
        let (class, ..) = decode_b_mb_type(23).unwrap();
        assert_eq!(class, MbClass::INxN);
        assert_eq!(dirs, [PredDir::Direct, PredDir::Direct]);
    }

    #[test]
    fn test_cbp_mapping() {
        // Intra code 0 -> cbp 47, inter code 0 -> cbp 0 (chroma formats).
        assert_eq!(decode_cbp_code(0, true, true).unwrap(), 47);
        assert_eq!(decode_cbp_code(0, false, true).unwrap(), 0);
        // Monochrome / 4:4:4 table.
        assert_eq!(decode_cbp_code(0, true, false).unwrap(), 15);
        assert_eq!(decode_cbp_code(1, false, false).unwrap(), 1);
        assert!(decode_cbp_code(48, true, true).is_err());
    }

    #[test]
    fn test_cbf_bits_disjoint() {
        let mut seen = std::collections::HashSet::new();
        seen.insert(CBF_LUMA_DC_BIT);
        for by in 0..4 {
            for bx in 0..4 {
                assert!(seen.insert(cbf_luma_bit(bx, by)));
            }
        }
        assert!(seen.insert(cbf_chroma_dc_bit(0)));
        assert!(seen.insert(cbf_chroma_dc_bit(1)));
        for plane in 0..2 {
            for by in 0..2 {
                for bx in 0..2 {
                    assert!(seen.insert(cbf_chroma_ac_bit(plane, bx, by)));
                }
            }
        }
    }

    #[test]
    fn test_sub_mb_types() {
        assert_eq!(decode_p_sub_mb_type(0).unwrap(), (1, 8, 8, PredDir::L0));
        assert_eq!(decode_p_sub_mb_type(3).unwrap(), (4, 4, 4, PredDir::L0));
        assert_eq!(decode_b_sub_mb_type(3).unwrap(), (1, 8, 8, PredDir::Bi));
        assert!(decode_b_sub_mb_type(13).is_err());
    }
}

//! Inverse scan, dequantisation and inverse integer transforms.

use crate::sps::{
    DEFAULT_4X4_INTER, DEFAULT_4X4_INTRA, DEFAULT_8X8_INTER, DEFAULT_8X8_INTRA, ScalingLists,
};
use crate::tables::{dequant_coef_8x8, DEQUANT_COEF_4X4};

/// Rounded right shift by `a` bits.
#[inline]
pub fn rshift_rnd(x: i32, a: u8) -> i32 {
    (x + (1 << (a - 1))) >> a
}

/// Clip to an inclusive range.
#[inline]
pub fn clip3(low: i32, high: i32, x: i32) -> i32 {
    x.clamp(low, high)
}

/// Clip a reconstructed sample to the bit-depth range.
#[inline]
pub fn clip_pixel(x: i32, max_value: i32) -> u16 {
    x.clamp(0, max_value) as u16
}

/// Effective inverse level-scale tables for one plane, one of intra/inter,
/// built from the active scaling lists at slice start.
#[derive(Debug, Clone)]
pub struct InvLevelScale {
    /// [qp_rem][j][i]
    pub scale_4x4: [[[i32; 4]; 4]; 6],
    /// [qp_rem][j][i]
    pub scale_8x8: [[[i32; 8]; 8]; 6],
}

impl InvLevelScale {
    /// Build from weight lists in coefficient (raster) order.
    pub fn new(weights_4x4: &[u8; 16], weights_8x8: &[u8; 64]) -> Self {
        let mut scale_4x4 = [[[0i32; 4]; 4]; 6];
        let mut scale_8x8 = [[[0i32; 8]; 8]; 6];
        for rem in 0..6 {
            for j in 0..4 {
                for i in 0..4 {
                    scale_4x4[rem][j][i] =
                        DEQUANT_COEF_4X4[rem][j][i] * weights_4x4[j * 4 + i] as i32;
                }
            }
            for j in 0..8 {
                for i in 0..8 {
                    scale_8x8[rem][j][i] =
                        dequant_coef_8x8(rem, j, i) * weights_8x8[j * 8 + i] as i32;
                }
            }
        }
        Self { scale_4x4, scale_8x8 }
    }
}

/// The flat list used when no scaling matrices are signalled.
pub const FLAT_4X4: [u8; 16] = [16; 16];
pub const FLAT_8X8: [u8; 64] = [16; 64];

/// Effective scaling matrices for the active SPS/PPS pair, after the
/// flat/default/fallback rules of 7.4.2.1.1.1.
#[derive(Debug, Clone)]
pub struct EffectiveScalingLists {
    /// Six 4x4 lists: Intra Y/Cb/Cr, Inter Y/Cb/Cr.
    pub list_4x4: [[u8; 16]; 6],
    /// Six 8x8 lists: Intra Y, Inter Y, Intra Cb, Inter Cb, Intra Cr, Inter Cr.
    pub list_8x8: [[u8; 64]; 6],
}

impl Default for EffectiveScalingLists {
    fn default() -> Self {
        Self {
            list_4x4: [FLAT_4X4; 6],
            list_8x8: [FLAT_8X8; 6],
        }
    }
}

impl EffectiveScalingLists {
    /// Apply fallback rule A (SPS level): absent lists inherit the previous
    /// list of the same kind, list 0/3 (and 8x8 list 0/1) fall back to the
    /// defaults.
    fn apply(base: &mut Self, lists: &ScalingLists, fallback_defaults: bool) {
        for idx in 0..6 {
            if lists.present[idx] && !lists.use_default_4x4[idx] {
                base.list_4x4[idx] = lists.list_4x4[idx];
            } else if lists.use_default_4x4[idx] || (!lists.present[idx] && fallback_defaults) {
                match idx {
                    0 | 3 if !lists.present[idx] => {
                        base.list_4x4[idx] = if idx == 0 {
                            DEFAULT_4X4_INTRA
                        } else {
                            DEFAULT_4X4_INTER
                        };
                    }
                    0 => base.list_4x4[idx] = DEFAULT_4X4_INTRA,
                    3 => base.list_4x4[idx] = DEFAULT_4X4_INTER,
                    _ if lists.use_default_4x4[idx] => {
                        base.list_4x4[idx] = if idx < 3 {
                            DEFAULT_4X4_INTRA
                        } else {
                            DEFAULT_4X4_INTER
                        };
                    }
                    _ => base.list_4x4[idx] = base.list_4x4[idx - 1],
                }
            } else if !lists.present[idx] && idx != 0 && idx != 3 {
                base.list_4x4[idx] = base.list_4x4[idx - 1];
            }
        }
        for idx in 0..6 {
            let flag_idx = idx + 6;
            if lists.present[flag_idx] && !lists.use_default_8x8[idx] {
                base.list_8x8[idx] = lists.list_8x8[idx];
            } else if lists.use_default_8x8[idx] || (!lists.present[flag_idx] && fallback_defaults)
            {
                match idx {
                    0 | 1 if !lists.present[flag_idx] => {
                        base.list_8x8[idx] = if idx == 0 {
                            DEFAULT_8X8_INTRA
                        } else {
                            DEFAULT_8X8_INTER
                        };
                    }
                    0 => base.list_8x8[idx] = DEFAULT_8X8_INTRA,
                    1 => base.list_8x8[idx] = DEFAULT_8X8_INTER,
                    _ if lists.use_default_8x8[idx] => {
                        base.list_8x8[idx] = if idx % 2 == 0 {
                            DEFAULT_8X8_INTRA
                        } else {
                            DEFAULT_8X8_INTER
                        };
                    }
                    _ => base.list_8x8[idx] = base.list_8x8[idx - 2],
                }
            } else if !lists.present[flag_idx] && idx >= 2 {
                base.list_8x8[idx] = base.list_8x8[idx - 2];
            }
        }
    }

    /// Derive the effective lists from the SPS (and optionally PPS) matrices.
    pub fn derive(
        sps_present: bool,
        sps_lists: &ScalingLists,
        pps_present: bool,
        pps_lists: &ScalingLists,
    ) -> Self {
        let mut out = Self::default();
        if sps_present {
            Self::apply(&mut out, sps_lists, true);
        }
        if pps_present {
            // Fallback rule B inherits from the SPS-effective lists.
            Self::apply(&mut out, pps_lists, !sps_present);
        }
        out
    }
}

/// Dequantise a single 4x4 AC/luma coefficient at scan position (j, i).
#[inline]
pub fn dequant_4x4(level: i32, scale: &[[i32; 4]; 4], j: usize, i: usize, qp_per: u8) -> i32 {
    rshift_rnd((level * scale[j][i]) << qp_per, 4)
}

/// Dequantise a single 8x8 coefficient at position (j, i).
#[inline]
pub fn dequant_8x8(level: i32, scale: &[[i32; 8]; 8], j: usize, i: usize, qp_per: u8) -> i32 {
    rshift_rnd((level * scale[j][i]) << qp_per, 6)
}

/// In-place 4x4 inverse Hadamard (used for the I_16x16 luma DC plane).
pub fn ihadamard_4x4(block: &mut [[i32; 4]; 4]) {
    // Horizontal
    for row in block.iter_mut() {
        let t0 = row[0] + row[2];
        let t1 = row[0] - row[2];
        let t2 = row[1] - row[3];
        let t3 = row[1] + row[3];
        row[0] = t0 + t3;
        row[1] = t1 + t2;
        row[2] = t1 - t2;
        row[3] = t0 - t3;
    }
    // Vertical
    for i in 0..4 {
        let t0 = block[0][i] + block[2][i];
        let t1 = block[0][i] - block[2][i];
        let t2 = block[1][i] - block[3][i];
        let t3 = block[1][i] + block[3][i];
        block[0][i] = t0 + t3;
        block[1][i] = t1 + t2;
        block[2][i] = t1 - t2;
        block[3][i] = t0 - t3;
    }
}

/// 2x2 inverse Hadamard for 4:2:0 chroma DC; input and output in raster
/// order (c00, c01, c10, c11).
pub fn ihadamard_2x2(c: [i32; 4]) -> [i32; 4] {
    let t0 = c[0] + c[1];
    let t1 = c[0] - c[1];
    let t2 = c[2] + c[3];
    let t3 = c[2] - c[3];
    [t0 + t2, t1 + t3, t0 - t2, t1 - t3]
}

/// 2x4 inverse Hadamard for 4:2:2 chroma DC; `c[x][y]` with x in 0..2 and
/// y in 0..4.
pub fn ihadamard_2x4(c: [[i32; 4]; 2]) -> [[i32; 4]; 2] {
    let mut m4 = [[0i32; 4]; 2];
    for y in 0..4 {
        m4[0][y] = c[0][y] + c[1][y];
        m4[1][y] = c[0][y] - c[1][y];
    }
    let mut out = [[0i32; 4]; 2];
    for x in 0..2 {
        let m6_0 = m4[x][0] + m4[x][2];
        let m6_1 = m4[x][0] - m4[x][2];
        let m6_2 = m4[x][1] - m4[x][3];
        let m6_3 = m4[x][1] + m4[x][3];
        out[x][0] = m6_0 + m6_3;
        out[x][1] = m6_1 + m6_2;
        out[x][2] = m6_1 - m6_2;
        out[x][3] = m6_0 - m6_3;
    }
    out
}

/// In-place 4x4 inverse integer transform, including the final rounded
/// 6-bit shift. Input: dequantised coefficients; output: residual samples.
pub fn itrans_4x4(block: &mut [[i32; 4]; 4]) {
    // Horizontal
    for row in block.iter_mut() {
        let p0 = row[0] + row[2];
        let p1 = row[0] - row[2];
        let p2 = (row[1] >> 1) - row[3];
        let p3 = row[1] + (row[3] >> 1);
        row[0] = p0 + p3;
        row[1] = p1 + p2;
        row[2] = p1 - p2;
        row[3] = p0 - p3;
    }
    // Vertical
    for i in 0..4 {
        let p0 = block[0][i] + block[2][i];
        let p1 = block[0][i] - block[2][i];
        let p2 = (block[1][i] >> 1) - block[3][i];
        let p3 = block[1][i] + (block[3][i] >> 1);
        block[0][i] = rshift_rnd(p0 + p3, 6);
        block[1][i] = rshift_rnd(p1 + p2, 6);
        block[2][i] = rshift_rnd(p1 - p2, 6);
        block[3][i] = rshift_rnd(p0 - p3, 6);
    }
}

fn itrans_8x8_1d(d: &mut [i32; 8]) {
    let a0 = d[0] + d[4];
    let a4 = d[0] - d[4];
    let a2 = (d[2] >> 1) - d[6];
    let a6 = d[2] + (d[6] >> 1);

    let b0 = a0 + a6;
    let b2 = a4 + a2;
    let b4 = a4 - a2;
    let b6 = a0 - a6;

    let a1 = -d[3] + d[5] - d[7] - (d[7] >> 1);
    let a3 = d[1] + d[7] - d[3] - (d[3] >> 1);
    let a5 = -d[1] + d[7] + d[5] + (d[5] >> 1);
    let a7 = d[3] + d[5] + d[1] + (d[1] >> 1);

    let b1 = a1 + (a7 >> 2);
    let b7 = a7 - (a1 >> 2);
    let b3 = a3 + (a5 >> 2);
    let b5 = (a3 >> 2) - a5;

    d[0] = b0 + b7;
    d[7] = b0 - b7;
    d[1] = b2 + b5;
    d[6] = b2 - b5;
    d[2] = b4 + b3;
    d[5] = b4 - b3;
    d[3] = b6 + b1;
    d[4] = b6 - b1;
}

/// In-place 8x8 inverse integer transform with the final rounded shift.
pub fn itrans_8x8(block: &mut [[i32; 8]; 8]) {
    for row in block.iter_mut() {
        itrans_8x8_1d(row);
    }
    let mut col = [0i32; 8];
    for i in 0..8 {
        for j in 0..8 {
            col[j] = block[j][i];
        }
        itrans_8x8_1d(&mut col);
        for j in 0..8 {
            block[j][i] = rshift_rnd(col[j], 6);
        }
    }
}

/// Scale the I_16x16 luma DC plane after the inverse Hadamard
/// (JM `itrans_2`).
pub fn scale_luma_dc(dc: &mut [[i32; 4]; 4], scale: &[[i32; 4]; 4], qp: i32) {
    let qp_per = (qp / 6) as u8;
    let inv = scale[0][0];
    for row in dc.iter_mut() {
        for v in row.iter_mut() {
            *v = rshift_rnd((*v * inv) << qp_per, 6);
        }
    }
}

/// Scale 4:2:0 chroma DC values after the 2x2 inverse Hadamard.
pub fn scale_chroma_dc_420(dc: &mut [i32; 4], scale: &[[i32; 4]; 4], qp: i32) {
    let qp_per = qp / 6;
    let inv = scale[0][0];
    for v in dc.iter_mut() {
        *v = ((*v * inv) << qp_per) >> 5;
    }
}

/// Scale 4:2:2 chroma DC values after the 2x4 inverse Hadamard. The DC QP
/// uses an offset of +3 relative to the block QP.
pub fn scale_chroma_dc_422(dc: &mut [[i32; 4]; 2], scale: &[[i32; 4]; 4], qp_dc: i32) {
    let qp_per = (qp_dc / 6) as u8;
    let inv = scale[0][0];
    for col in dc.iter_mut() {
        for v in col.iter_mut() {
            *v = rshift_rnd((*v * inv) << qp_per, 6);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_only_4x4() {
        // A DC-only block reconstructs to a uniform residual of
        // (dc + 32) >> 6.
        let mut block = [[0i32; 4]; 4];
        block[0][0] = 640;
        itrans_4x4(&mut block);
        for row in &block {
            for &v in row {
                assert_eq!(v, (640 + 32) >> 6);
            }
        }
    }

    #[test]
    fn test_dc_only_8x8() {
        let mut block = [[0i32; 8]; 8];
        block[0][0] = 64;
        itrans_8x8(&mut block);
        for row in &block {
            for &v in row {
                assert_eq!(v, 1);
            }
        }
    }

    #[test]
    fn test_ihadamard_4x4_dc_broadcast() {
        let mut dc = [[0i32; 4]; 4];
        dc[0][0] = -32;
        ihadamard_4x4(&mut dc);
        for row in &dc {
            for &v in row {
                assert_eq!(v, -32);
            }
        }
    }

    #[test]
    fn test_ihadamard_2x2() {
        assert_eq!(ihadamard_2x2([4, 0, 0, 0]), [4, 4, 4, 4]);
        assert_eq!(ihadamard_2x2([0, 0, 0, 4]), [4, -4, -4, 4]);
    }

    #[test]
    fn test_ihadamard_2x4_dc_broadcast() {
        let mut c = [[0i32; 4]; 2];
        c[0][0] = 8;
        let out = ihadamard_2x4(c);
        for col in &out {
            for &v in col {
                assert_eq!(v, 8);
            }
        }
    }

    #[test]
    fn test_dequant_flat_qp40_dc_path() {
        // The scenario-1 arithmetic: level -32, QP 40, flat lists.
        let inv = InvLevelScale::new(&FLAT_4X4, &FLAT_8X8);
        let mut dc = [[0i32; 4]; 4];
        dc[0][0] = -32;
        ihadamard_4x4(&mut dc);
        scale_luma_dc(&mut dc, &inv.scale_4x4[40 % 6], 40);
        // 16 (weight) * 16 (norm at rem 4) = 256; -32 * 256 << 6 >> 6.
        for row in &dc {
            for &v in row {
                assert_eq!(v, -8192);
            }
        }
        let mut block = [[0i32; 4]; 4];
        block[0][0] = dc[0][0];
        itrans_4x4(&mut block);
        for row in &block {
            for &v in row {
                assert_eq!(v, -128);
            }
        }
    }

    #[test]
    fn test_effective_lists_default_flat() {
        let eff = EffectiveScalingLists::default();
        assert!(eff.list_4x4.iter().all(|l| l.iter().all(|&w| w == 16)));
        assert!(eff.list_8x8.iter().all(|l| l.iter().all(|&w| w == 16)));
    }

    #[test]
    fn test_effective_lists_sps_fallback() {
        // seq_scaling_matrix_present with no explicit lists selects the
        // default matrices for list 0/3 and inheritance for the others.
        let lists = ScalingLists::default();
        let eff = EffectiveScalingLists::derive(true, &lists, false, &lists);
        assert_eq!(eff.list_4x4[0], DEFAULT_4X4_INTRA);
        assert_eq!(eff.list_4x4[1], DEFAULT_4X4_INTRA);
        assert_eq!(eff.list_4x4[2], DEFAULT_4X4_INTRA);
        assert_eq!(eff.list_4x4[3], DEFAULT_4X4_INTER);
        assert_eq!(eff.list_4x4[4], DEFAULT_4X4_INTER);
        assert_eq!(eff.list_8x8[0], DEFAULT_8X8_INTRA);
        assert_eq!(eff.list_8x8[1], DEFAULT_8X8_INTER);
    }

    #[test]
    fn test_clip_pixel() {
        assert_eq!(clip_pixel(-5, 255), 0);
        assert_eq!(clip_pixel(300, 255), 255);
        assert_eq!(clip_pixel(128, 255), 128);
        assert_eq!(clip_pixel(1023, 1023), 1023);
    }
}

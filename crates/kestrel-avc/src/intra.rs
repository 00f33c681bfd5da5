//! Intra prediction: 4x4/8x8/16x16 luma and chroma predictors (8.3).

use crate::error::{DecodeError, Result};
use crate::picture::Plane;

/// Neighbour-sample availability for one predicted block.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntraAvail {
    pub left: bool,
    pub up: bool,
    pub up_left: bool,
    pub up_right: bool,
}

/// 4x4 and 8x8 luma prediction modes.
pub mod luma_mode {
    pub const VERTICAL: u8 = 0;
    pub const HORIZONTAL: u8 = 1;
    pub const DC: u8 = 2;
    pub const DIAG_DOWN_LEFT: u8 = 3;
    pub const DIAG_DOWN_RIGHT: u8 = 4;
    pub const VERTICAL_RIGHT: u8 = 5;
    pub const HORIZONTAL_DOWN: u8 = 6;
    pub const VERTICAL_LEFT: u8 = 7;
    pub const HORIZONTAL_UP: u8 = 8;
}

/// 16x16 prediction modes.
pub mod luma16_mode {
    pub const VERTICAL: u8 = 0;
    pub const HORIZONTAL: u8 = 1;
    pub const DC: u8 = 2;
    pub const PLANE: u8 = 3;
}

/// Chroma prediction modes.
pub mod chroma_mode {
    pub const DC: u8 = 0;
    pub const HORIZONTAL: u8 = 1;
    pub const VERTICAL: u8 = 2;
    pub const PLANE: u8 = 3;
}

#[inline]
fn dc_fallback(bit_depth: u8) -> u16 {
    1 << (bit_depth - 1)
}

/// Gather the neighbour samples of an NxN block at (x, y): left column,
/// top row (double width for the diagonal modes) and the corner.
struct Border {
    left: [u16; 16],
    top: [u16; 32],
    corner: u16,
}

fn gather_border<const N: usize>(plane: &Plane, x: usize, y: usize, avail: &IntraAvail) -> Border {
    let mut border = Border {
        left: [0; 16],
        top: [0; 32],
        corner: 0,
    };
    if avail.left {
        for i in 0..N {
            border.left[i] = plane.get(x - 1, y + i);
        }
    }
    if avail.up {
        for i in 0..N {
            border.top[i] = plane.get(x + i, y - 1);
        }
        // Up-right either reads on or replicates the last top sample.
        for i in N..2 * N {
            border.top[i] = if avail.up_right && x + i < plane.width {
                plane.get(x + i, y - 1)
            } else {
                border.top[N - 1]
            };
        }
    }
    if avail.up_left {
        border.corner = plane.get(x - 1, y - 1);
    }
    border
}

/// Predict one 4x4 luma block into `pred`.
pub fn intra_4x4(
    plane: &Plane,
    x: usize,
    y: usize,
    mode: u8,
    avail: &IntraAvail,
    bit_depth: u8,
    pred: &mut [[u16; 4]; 4],
) -> Result<()> {
    let b = gather_border::<4>(plane, x, y, avail);
    let l = &b.left;
    let t = &b.top;
    let q = b.corner;
    let p = |v: u32| v as u16;

    match mode {
        luma_mode::VERTICAL => {
            if !avail.up {
                return Err(DecodeError::SyntaxViolation(
                    "vertical intra prediction without an upper neighbour".to_string(),
                ));
            }
            for row in pred.iter_mut() {
                row.copy_from_slice(&t[0..4]);
            }
        }
        luma_mode::HORIZONTAL => {
            if !avail.left {
                return Err(DecodeError::SyntaxViolation(
                    "horizontal intra prediction without a left neighbour".to_string(),
                ));
            }
            for (j, row) in pred.iter_mut().enumerate() {
                row.fill(l[j]);
            }
        }
        luma_mode::DC => {
            let value = match (avail.left, avail.up) {
                (true, true) => {
                    let sum: u32 = l[..4].iter().chain(t[..4].iter()).map(|&v| v as u32).sum();
                    p((sum + 4) >> 3)
                }
                (true, false) => {
                    let sum: u32 = l[..4].iter().map(|&v| v as u32).sum();
                    p((sum + 2) >> 2)
                }
                (false, true) => {
                    let sum: u32 = t[..4].iter().map(|&v| v as u32).sum();
                    p((sum + 2) >> 2)
                }
                (false, false) => dc_fallback(bit_depth),
            };
            for row in pred.iter_mut() {
                row.fill(value);
            }
        }
        luma_mode::DIAG_DOWN_LEFT => {
            let t = |i: usize| t[i] as u32;
            for j in 0..4 {
                for i in 0..4 {
                    pred[j][i] = if i == 3 && j == 3 {
                        p((t(6) + 3 * t(7) + 2) >> 2)
                    } else {
                        p((t(i + j) + 2 * t(i + j + 1) + t(i + j + 2) + 2) >> 2)
                    };
                }
            }
        }
        luma_mode::DIAG_DOWN_RIGHT => {
            let s = |i: i32| -> u32 {
                if i < 0 {
                    l[(-i - 1) as usize] as u32
                } else if i == 0 {
                    q as u32
                } else {
                    t[(i - 1) as usize] as u32
                }
            };
            for j in 0..4i32 {
                for i in 0..4i32 {
                    let d = i - j;
                    pred[j as usize][i as usize] = p((s(d - 1) + 2 * s(d) + s(d + 1) + 2) >> 2);
                }
            }
        }
        luma_mode::VERTICAL_RIGHT => {
            let t = |i: i32| -> u32 {
                if i < 0 {
                    q as u32
                } else {
                    t[i as usize] as u32
                }
            };
            let l = |i: usize| l[i] as u32;
            for j in 0..4i32 {
                for i in 0..4i32 {
                    let z = 2 * i - j;
                    pred[j as usize][i as usize] = if z >= 0 && z % 2 == 0 {
                        p((t(i - (j >> 1) - 1) + t(i - (j >> 1)) + 1) >> 1)
                    } else if z >= 0 {
                        p((t(i - (j >> 1) - 2) + 2 * t(i - (j >> 1) - 1) + t(i - (j >> 1)) + 2) >> 2)
                    } else if z == -1 {
                        p((l(0) + 2 * t(-1) + t(0) + 2) >> 2)
                    } else {
                        p((l((j - 1) as usize) + 2 * l((j - 2) as usize)
                            + if j >= 3 { l((j - 3) as usize) } else { t(-1) }
                            + 2)
                            >> 2)
                    };
                }
            }
        }
        luma_mode::HORIZONTAL_DOWN => {
            let t = |i: i32| -> u32 {
                if i < 0 {
                    q as u32
                } else {
                    t[i as usize] as u32
                }
            };
            let lv = |i: i32| -> u32 {
                if i < 0 {
                    q as u32
                } else {
                    l[i as usize] as u32
                }
            };
            for j in 0..4i32 {
                for i in 0..4i32 {
                    let z = 2 * j - i;
                    pred[j as usize][i as usize] = if z >= 0 && z % 2 == 0 {
                        p((lv(j - (i >> 1) - 1) + lv(j - (i >> 1)) + 1) >> 1)
                    } else if z >= 0 {
                        p((lv(j - (i >> 1) - 2) + 2 * lv(j - (i >> 1) - 1) + lv(j - (i >> 1)) + 2)
                            >> 2)
                    } else if z == -1 {
                        p((t(0) + 2 * q as u32 + lv(0) + 2) >> 2)
                    } else {
                        p((t(i - 1) + 2 * t(i - 2) + if i >= 3 { t(i - 3) } else { q as u32 } + 2)
                            >> 2)
                    };
                }
            }
        }
        luma_mode::VERTICAL_LEFT => {
            let t = |i: usize| t[i] as u32;
            for j in 0..4usize {
                for i in 0..4usize {
                    let k = i + (j >> 1);
                    pred[j][i] = if j % 2 == 0 {
                        p((t(k) + t(k + 1) + 1) >> 1)
                    } else {
                        p((t(k) + 2 * t(k + 1) + t(k + 2) + 2) >> 2)
                    };
                }
            }
        }
        luma_mode::HORIZONTAL_UP => {
            let l = |i: usize| l[i.min(3)] as u32;
            for j in 0..4usize {
                for i in 0..4usize {
                    let z = i + 2 * j;
                    pred[j][i] = if z > 5 {
                        p(l(3))
                    } else if z == 5 {
                        p((l(2) + 3 * l(3) + 2) >> 2)
                    } else if z % 2 == 0 {
                        p((l(j + (i >> 1)) + l(j + (i >> 1) + 1) + 1) >> 1)
                    } else {
                        p((l(j + (i >> 1)) + 2 * l(j + (i >> 1) + 1) + l(j + (i >> 1) + 2) + 2) >> 2)
                    };
                }
            }
        }
        other => {
            return Err(DecodeError::SyntaxViolation(format!(
                "intra 4x4 prediction mode {} out of range",
                other
            )))
        }
    }
    Ok(())
}

/// Low-pass filter the 8x8 reference samples (8.3.2.2.1), then predict with
/// the shared NxN mode set.
pub fn intra_8x8(
    plane: &Plane,
    x: usize,
    y: usize,
    mode: u8,
    avail: &IntraAvail,
    bit_depth: u8,
    pred: &mut [[u16; 8]; 8],
) -> Result<()> {
    let b = gather_border::<8>(plane, x, y, avail);

    // Filtered references.
    let mut left = [0u16; 8];
    let mut top = [0u16; 16];
    let mut corner = b.corner;
    if avail.left {
        for i in 0..8 {
            let prev = if i == 0 {
                if avail.up_left {
                    b.corner
                } else {
                    b.left[0]
                }
            } else {
                b.left[i - 1]
            };
            let next = if i == 7 { b.left[7] } else { b.left[i + 1] };
            left[i] = ((prev as u32 + 2 * b.left[i] as u32 + next as u32 + 2) >> 2) as u16;
        }
    }
    if avail.up {
        for i in 0..16 {
            let prev = if i == 0 {
                if avail.up_left {
                    b.corner
                } else {
                    b.top[0]
                }
            } else {
                b.top[i - 1]
            };
            let next = if i == 15 { b.top[15] } else { b.top[i + 1] };
            top[i] = ((prev as u32 + 2 * b.top[i] as u32 + next as u32 + 2) >> 2) as u16;
        }
    }
    if avail.up_left {
        let a = if avail.up { b.top[0] } else { b.corner };
        let l0 = if avail.left { b.left[0] } else { b.corner };
        corner = ((l0 as u32 + 2 * b.corner as u32 + a as u32 + 2) >> 2) as u16;
    }

    let t = |i: usize| top[i.min(15)] as u32;
    let lv = |i: usize| left[i.min(7)] as u32;
    let p = |v: u32| v as u16;

    match mode {
        luma_mode::VERTICAL => {
            for row in pred.iter_mut() {
                for (i, v) in row.iter_mut().enumerate() {
                    *v = top[i];
                }
            }
        }
        luma_mode::HORIZONTAL => {
            for (j, row) in pred.iter_mut().enumerate() {
                row.fill(left[j]);
            }
        }
        luma_mode::DC => {
            let value = match (avail.left, avail.up) {
                (true, true) => {
                    let sum: u32 =
                        left.iter().map(|&v| v as u32).sum::<u32>() + top[..8].iter().map(|&v| v as u32).sum::<u32>();
                    ((sum + 8) >> 4) as u16
                }
                (true, false) => {
                    let sum: u32 = left.iter().map(|&v| v as u32).sum();
                    ((sum + 4) >> 3) as u16
                }
                (false, true) => {
                    let sum: u32 = top[..8].iter().map(|&v| v as u32).sum();
                    ((sum + 4) >> 3) as u16
                }
                (false, false) => dc_fallback(bit_depth),
            };
            for row in pred.iter_mut() {
                row.fill(value);
            }
        }
        luma_mode::DIAG_DOWN_LEFT => {
            for j in 0..8 {
                for i in 0..8 {
                    pred[j][i] = if i == 7 && j == 7 {
                        p((t(14) + 3 * t(15) + 2) >> 2)
                    } else {
                        p((t(i + j) + 2 * t(i + j + 1) + t(i + j + 2) + 2) >> 2)
                    };
                }
            }
        }
        luma_mode::DIAG_DOWN_RIGHT => {
            let s = |i: i32| -> u32 {
                if i < 0 {
                    lv((-i - 1) as usize)
                } else if i == 0 {
                    corner as u32
                } else {
                    t((i - 1) as usize)
                }
            };
            for j in 0..8i32 {
                for i in 0..8i32 {
                    let d = i - j;
                    pred[j as usize][i as usize] = p((s(d - 1) + 2 * s(d) + s(d + 1) + 2) >> 2);
                }
            }
        }
        luma_mode::VERTICAL_LEFT => {
            for j in 0..8usize {
                for i in 0..8usize {
                    let k = i + (j >> 1);
                    pred[j][i] = if j % 2 == 0 {
                        p((t(k) + t(k + 1) + 1) >> 1)
                    } else {
                        p((t(k) + 2 * t(k + 1) + t(k + 2) + 2) >> 2)
                    };
                }
            }
        }
        luma_mode::HORIZONTAL_UP => {
            for j in 0..8usize {
                for i in 0..8usize {
                    let z = i + 2 * j;
                    pred[j][i] = if z > 13 {
                        p(lv(7))
                    } else if z == 13 {
                        p((lv(6) + 3 * lv(7) + 2) >> 2)
                    } else if z % 2 == 0 {
                        p((lv(j + (i >> 1)) + lv(j + (i >> 1) + 1) + 1) >> 1)
                    } else {
                        p((lv(j + (i >> 1)) + 2 * lv(j + (i >> 1) + 1) + lv(j + (i >> 1) + 2) + 2)
                            >> 2)
                    };
                }
            }
        }
        luma_mode::VERTICAL_RIGHT | luma_mode::HORIZONTAL_DOWN => {
            // Shared diagonal construction via the 4x4 formulas scaled up.
            let q = corner as u32;
            for j in 0..8i32 {
                for i in 0..8i32 {
                    let value = if mode == luma_mode::VERTICAL_RIGHT {
                        let z = 2 * i - j;
                        if z >= 0 && z % 2 == 0 {
                            (tt(&top, q, i - (j >> 1) - 1) + tt(&top, q, i - (j >> 1)) + 1) >> 1
                        } else if z >= 0 {
                            (tt(&top, q, i - (j >> 1) - 2)
                                + 2 * tt(&top, q, i - (j >> 1) - 1)
                                + tt(&top, q, i - (j >> 1))
                                + 2)
                                >> 2
                        } else if z == -1 {
                            (lv(0) + 2 * q + tt(&top, q, 0) + 2) >> 2
                        } else {
                            (lv((j - 1) as usize)
                                + 2 * lv((j - 2) as usize)
                                + if j >= 3 { lv((j - 3) as usize) } else { q }
                                + 2)
                                >> 2
                        }
                    } else {
                        let z = 2 * j - i;
                        if z >= 0 && z % 2 == 0 {
                            (ll(&left, q, j - (i >> 1) - 1) + ll(&left, q, j - (i >> 1)) + 1) >> 1
                        } else if z >= 0 {
                            (ll(&left, q, j - (i >> 1) - 2)
                                + 2 * ll(&left, q, j - (i >> 1) - 1)
                                + ll(&left, q, j - (i >> 1))
                                + 2)
                                >> 2
                        } else if z == -1 {
                            (tt(&top, q, 0) + 2 * q + ll(&left, q, 0) + 2) >> 2
                        } else {
                            (tt(&top, q, i - 1)
                                + 2 * tt(&top, q, i - 2)
                                + if i >= 3 { tt(&top, q, i - 3) } else { q }
                                + 2)
                                >> 2
                        }
                    };
                    pred[j as usize][i as usize] = p(value);
                }
            }
        }
        other => {
            return Err(DecodeError::SyntaxViolation(format!(
                "intra 8x8 prediction mode {} out of range",
                other
            )))
        }
    }
    Ok(())
}

#[inline]
fn tt(top: &[u16; 16], corner: u32, i: i32) -> u32 {
    if i < 0 {
        corner
    } else {
        top[(i as usize).min(15)] as u32
    }
}

#[inline]
fn ll(left: &[u16; 8], corner: u32, i: i32) -> u32 {
    if i < 0 {
        corner
    } else {
        left[(i as usize).min(7)] as u32
    }
}

/// Predict a full 16x16 luma macroblock.
pub fn intra_16x16(
    plane: &Plane,
    x: usize,
    y: usize,
    mode: u8,
    avail: &IntraAvail,
    bit_depth: u8,
    pred: &mut [[u16; 16]; 16],
) -> Result<()> {
    match mode {
        luma16_mode::VERTICAL => {
            if !avail.up {
                return Err(DecodeError::SyntaxViolation(
                    "16x16 vertical prediction without an upper neighbour".to_string(),
                ));
            }
            for row in pred.iter_mut() {
                for (i, v) in row.iter_mut().enumerate() {
                    *v = plane.get(x + i, y - 1);
                }
            }
        }
        luma16_mode::HORIZONTAL => {
            if !avail.left {
                return Err(DecodeError::SyntaxViolation(
                    "16x16 horizontal prediction without a left neighbour".to_string(),
                ));
            }
            for (j, row) in pred.iter_mut().enumerate() {
                row.fill(plane.get(x - 1, y + j));
            }
        }
        luma16_mode::DC => {
            let value = match (avail.left, avail.up) {
                (true, true) => {
                    let mut sum = 0u32;
                    for i in 0..16 {
                        sum += plane.get(x + i, y - 1) as u32 + plane.get(x - 1, y + i) as u32;
                    }
                    ((sum + 16) >> 5) as u16
                }
                (true, false) => {
                    let sum: u32 = (0..16).map(|i| plane.get(x - 1, y + i) as u32).sum();
                    ((sum + 8) >> 4) as u16
                }
                (false, true) => {
                    let sum: u32 = (0..16).map(|i| plane.get(x + i, y - 1) as u32).sum();
                    ((sum + 8) >> 4) as u16
                }
                (false, false) => dc_fallback(bit_depth),
            };
            for row in pred.iter_mut() {
                row.fill(value);
            }
        }
        luma16_mode::PLANE => {
            if !avail.left || !avail.up || !avail.up_left {
                return Err(DecodeError::SyntaxViolation(
                    "16x16 plane prediction without full neighbours".to_string(),
                ));
            }
            let mut h = 0i32;
            let mut v = 0i32;
            for i in 0..8usize {
                h += (i as i32 + 1)
                    * (plane.get(x + 8 + i, y - 1) as i32
                        - plane.fetch(x as i32 + 6 - i as i32, y as i32 - 1) as i32);
                v += (i as i32 + 1)
                    * (plane.get(x - 1, y + 8 + i) as i32
                        - plane.fetch(x as i32 - 1, y as i32 + 6 - i as i32) as i32);
            }
            let a = 16
                * (plane.get(x + 15, y - 1) as i32 + plane.get(x - 1, y + 15) as i32);
            let b = (5 * h + 32) >> 6;
            let c = (5 * v + 32) >> 6;
            let max = (1i32 << bit_depth) - 1;
            for j in 0..16i32 {
                for i in 0..16i32 {
                    let value = (a + b * (i - 7) + c * (j - 7) + 16) >> 5;
                    pred[j as usize][i as usize] = value.clamp(0, max) as u16;
                }
            }
        }
        other => {
            return Err(DecodeError::SyntaxViolation(format!(
                "intra 16x16 prediction mode {} out of range",
                other
            )))
        }
    }
    Ok(())
}

/// Predict one chroma component MB of size `w` x `h` (8, 8x16 or 16).
pub fn intra_chroma(
    plane: &Plane,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    mode: u8,
    avail: &IntraAvail,
    bit_depth: u8,
    pred: &mut [[u16; 16]; 16],
) -> Result<()> {
    match mode {
        chroma_mode::DC => {
            // Each 4x4 sub-block takes its DC from a specific neighbour
            // subset (8.3.4.1): corner and interior blocks average both
            // edges, top-row blocks prefer the row above, left-column
            // blocks prefer the left column.
            for by in (0..h).step_by(4) {
                for bx in (0..w).step_by(4) {
                    let (want_up, want_left) = if (bx == 0 && by == 0) || (bx > 0 && by > 0) {
                        (avail.up, avail.left)
                    } else if by == 0 {
                        if avail.up {
                            (true, false)
                        } else {
                            (false, avail.left)
                        }
                    } else if avail.left {
                        (false, true)
                    } else {
                        (avail.up, false)
                    };

                    let mut sum = 0u32;
                    let mut count = 0u32;
                    if want_up {
                        for i in 0..4 {
                            sum += plane.get(x + bx + i, y - 1) as u32;
                        }
                        count += 4;
                    }
                    if want_left {
                        for i in 0..4 {
                            sum += plane.get(x - 1, y + by + i) as u32;
                        }
                        count += 4;
                    }
                    let value = if count == 8 {
                        ((sum + 4) >> 3) as u16
                    } else if count == 4 {
                        ((sum + 2) >> 2) as u16
                    } else {
                        dc_fallback(bit_depth)
                    };
                    for j in 0..4 {
                        for i in 0..4 {
                            pred[by + j][bx + i] = value;
                        }
                    }
                }
            }
        }
        chroma_mode::HORIZONTAL => {
            if !avail.left {
                return Err(DecodeError::SyntaxViolation(
                    "chroma horizontal prediction without a left neighbour".to_string(),
                ));
            }
            for j in 0..h {
                let v = plane.get(x - 1, y + j);
                for i in 0..w {
                    pred[j][i] = v;
                }
            }
        }
        chroma_mode::VERTICAL => {
            if !avail.up {
                return Err(DecodeError::SyntaxViolation(
                    "chroma vertical prediction without an upper neighbour".to_string(),
                ));
            }
            for j in 0..h {
                for i in 0..w {
                    pred[j][i] = plane.get(x + i, y - 1);
                }
            }
        }
        chroma_mode::PLANE => {
            if !avail.left || !avail.up || !avail.up_left {
                return Err(DecodeError::SyntaxViolation(
                    "chroma plane prediction without full neighbours".to_string(),
                ));
            }
            let xcf = (w as i32 >> 3) - 1; // 0 for width 8, 1 for 16
            let ycf = (h as i32 >> 3) - 1;
            let mut hsum = 0i32;
            let mut vsum = 0i32;
            for i in 0..(4 + 4 * xcf) {
                hsum += (i + 1)
                    * (plane.fetch((x as i32) + 4 + 4 * xcf + i, y as i32 - 1) as i32
                        - plane.fetch((x as i32) + 2 + 4 * xcf - i, y as i32 - 1) as i32);
            }
            for i in 0..(4 + 4 * ycf) {
                vsum += (i + 1)
                    * (plane.fetch(x as i32 - 1, (y as i32) + 4 + 4 * ycf + i) as i32
                        - plane.fetch(x as i32 - 1, (y as i32) + 2 + 4 * ycf - i) as i32);
            }
            let a = 16
                * (plane.fetch(x as i32 + w as i32 - 1, y as i32 - 1) as i32
                    + plane.fetch(x as i32 - 1, y as i32 + h as i32 - 1) as i32);
            let b = ((34 - 29 * xcf) * hsum + 32) >> 6;
            let c = ((34 - 29 * ycf) * vsum + 32) >> 6;
            let max = (1i32 << bit_depth) - 1;
            for j in 0..h as i32 {
                for i in 0..w as i32 {
                    let value =
                        (a + b * (i - 3 - 4 * xcf) + c * (j - 3 - 4 * ycf) + 16) >> 5;
                    pred[j as usize][i as usize] = value.clamp(0, max) as u16;
                }
            }
        }
        other => {
            return Err(DecodeError::SyntaxViolation(format!(
                "chroma prediction mode {} out of range",
                other
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_plane(w: usize, h: usize, value: u16) -> Plane {
        let mut plane = Plane::new(w, h, 4, 4);
        plane.fill(value);
        plane
    }

    #[test]
    fn test_dc_without_neighbours_is_midscale() {
        let plane = flat_plane(16, 16, 99);
        let avail = IntraAvail::default();
        let mut pred = [[0u16; 4]; 4];
        intra_4x4(&plane, 0, 0, luma_mode::DC, &avail, 8, &mut pred).unwrap();
        assert!(pred.iter().all(|row| row.iter().all(|&v| v == 128)));

        let mut pred16 = [[0u16; 16]; 16];
        intra_16x16(&plane, 0, 0, luma16_mode::DC, &avail, 8, &mut pred16).unwrap();
        assert!(pred16.iter().all(|row| row.iter().all(|&v| v == 128)));

        // 10-bit mid-scale.
        intra_4x4(&plane, 0, 0, luma_mode::DC, &avail, 10, &mut pred).unwrap();
        assert!(pred.iter().all(|row| row.iter().all(|&v| v == 512)));
    }

    #[test]
    fn test_vertical_copies_top_row() {
        let mut plane = flat_plane(16, 16, 0);
        for i in 0..4 {
            plane.set(4 + i, 3, (10 + i) as u16);
        }
        let avail = IntraAvail {
            up: true,
            ..Default::default()
        };
        let mut pred = [[0u16; 4]; 4];
        intra_4x4(&plane, 4, 4, luma_mode::VERTICAL, &avail, 8, &mut pred).unwrap();
        for row in &pred {
            assert_eq!(row, &[10, 11, 12, 13]);
        }
    }

    #[test]
    fn test_horizontal_copies_left_column() {
        let mut plane = flat_plane(16, 16, 0);
        for j in 0..4 {
            plane.set(3, 4 + j, (20 + j) as u16);
        }
        let avail = IntraAvail {
            left: true,
            ..Default::default()
        };
        let mut pred = [[0u16; 4]; 4];
        intra_4x4(&plane, 4, 4, luma_mode::HORIZONTAL, &avail, 8, &mut pred).unwrap();
        for (j, row) in pred.iter().enumerate() {
            assert!(row.iter().all(|&v| v == (20 + j) as u16));
        }
    }

    #[test]
    fn test_dc_with_both_neighbours() {
        let mut plane = flat_plane(16, 16, 0);
        for i in 0..4 {
            plane.set(4 + i, 3, 10);
            plane.set(3, 4 + i, 30);
        }
        let avail = IntraAvail {
            up: true,
            left: true,
            up_left: true,
            ..Default::default()
        };
        let mut pred = [[0u16; 4]; 4];
        intra_4x4(&plane, 4, 4, luma_mode::DC, &avail, 8, &mut pred).unwrap();
        // (4*10 + 4*30 + 4) >> 3 = 20
        assert!(pred.iter().all(|row| row.iter().all(|&v| v == 20)));
    }

    #[test]
    fn test_vertical_without_top_fails() {
        let plane = flat_plane(16, 16, 0);
        let avail = IntraAvail::default();
        let mut pred = [[0u16; 4]; 4];
        assert!(intra_4x4(&plane, 0, 0, luma_mode::VERTICAL, &avail, 8, &mut pred).is_err());
    }

    #[test]
    fn test_plane_mode_on_gradient() {
        let mut plane = flat_plane(32, 32, 0);
        for y in 0..32 {
            for x in 0..32 {
                plane.set(x, y, (x + 2 * y) as u16);
            }
        }
        let avail = IntraAvail {
            up: true,
            left: true,
            up_left: true,
            up_right: true,
        };
        let mut pred = [[0u16; 16]; 16];
        intra_16x16(&plane, 16, 16, luma16_mode::PLANE, &avail, 8, &mut pred).unwrap();
        // A linear ramp predicts itself.
        for j in 0..16 {
            for i in 0..16 {
                let expect = (16 + i) + 2 * (16 + j);
                let got = pred[j][i] as i32;
                assert!((got - expect as i32).abs() <= 1, "({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_chroma_dc_uniform() {
        let plane = flat_plane(8, 8, 128);
        let avail = IntraAvail::default();
        let mut pred = [[0u16; 16]; 16];
        intra_chroma(&plane, 0, 0, 8, 8, chroma_mode::DC, &avail, 8, &mut pred).unwrap();
        for j in 0..8 {
            for i in 0..8 {
                assert_eq!(pred[j][i], 128);
            }
        }
    }
}

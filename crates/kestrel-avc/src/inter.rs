//! Inter prediction: motion-vector prediction, fractional-sample
//! interpolation and weighted prediction (8.4).

use crate::picture::{MotionVector, Plane};
use crate::slice::WeightEntry;

/// One motion-vector predictor candidate (A, B or C after any MBAFF
/// scaling).
#[derive(Debug, Clone, Copy, Default)]
pub struct MvCandidate {
    pub available: bool,
    pub mv: MotionVector,
    pub ref_idx: i32,
}

#[inline]
fn median3(a: i32, b: i32, c: i32) -> i32 {
    if a > b {
        if b > c {
            b
        } else if a > c {
            c
        } else {
            a
        }
    } else if a > c {
        a
    } else if b > c {
        c
    } else {
        b
    }
}

/// Motion-vector prediction (8.4.1.3): median of A/B/C with the
/// single-match and directional special cases. `mb_part_x`/`mb_part_y` are
/// the partition origin inside the MB, `shape` its size in samples.
pub fn predict_mv(
    cands: &[MvCandidate; 3],
    ref_idx: i32,
    mb_part_x: usize,
    mb_part_y: usize,
    shape: (usize, usize),
) -> MotionVector {
    let [a, b, c] = *cands;

    let r_l = if a.available { a.ref_idx } else { -1 };
    let r_u = if b.available { b.ref_idx } else { -1 };
    let r_ur = if c.available { c.ref_idx } else { -1 };

    // Pick a single source when exactly one neighbour uses the target
    // reference, with the 16x8/8x16 directional overrides.
    enum Source {
        Median,
        A,
        B,
        C,
    }
    let mut source = Source::Median;
    if r_l == ref_idx && r_u != ref_idx && r_ur != ref_idx {
        source = Source::A;
    } else if r_l != ref_idx && r_u == ref_idx && r_ur != ref_idx {
        source = Source::B;
    } else if r_l != ref_idx && r_u != ref_idx && r_ur == ref_idx {
        source = Source::C;
    }

    match shape {
        (8, 16) => {
            if mb_part_x == 0 {
                if r_l == ref_idx {
                    source = Source::A;
                }
            } else if r_ur == ref_idx {
                source = Source::C;
            }
        }
        (16, 8) => {
            if mb_part_y == 0 {
                if r_u == ref_idx {
                    source = Source::B;
                }
            } else if r_l == ref_idx {
                source = Source::A;
            }
        }
        _ => {}
    }

    match source {
        Source::A => {
            if a.available {
                a.mv
            } else {
                MotionVector::ZERO
            }
        }
        Source::B => {
            if b.available {
                b.mv
            } else {
                MotionVector::ZERO
            }
        }
        Source::C => {
            if c.available {
                c.mv
            } else {
                MotionVector::ZERO
            }
        }
        Source::Median => {
            if !b.available && !c.available {
                // Only A (or nothing) decoded so far.
                if a.available {
                    a.mv
                } else {
                    MotionVector::ZERO
                }
            } else {
                let ax = if a.available { a.mv } else { MotionVector::ZERO };
                let bx = if b.available { b.mv } else { MotionVector::ZERO };
                let cx = if c.available { c.mv } else { MotionVector::ZERO };
                MotionVector::new(
                    median3(ax.x as i32, bx.x as i32, cx.x as i32) as i16,
                    median3(ax.y as i32, bx.y as i32, cx.y as i32) as i16,
                )
            }
        }
    }
}

#[inline]
fn tap6(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32) -> i32 {
    a - 5 * b + 20 * c + 20 * d - 5 * e + f
}

/// One luma sample at quarter-pel position (xq, yq) from a padded reference
/// plane (8.4.2.2.1).
pub fn luma_sample(plane: &Plane, xq: i32, yq: i32, max_value: i32) -> u16 {
    let xi = xq >> 2;
    let yi = yq >> 2;
    let fx = (xq & 3) as usize;
    let fy = (yq & 3) as usize;

    let full = |dx: i32, dy: i32| plane.fetch(xi + dx, yi + dy) as i32;

    if fx == 0 && fy == 0 {
        return full(0, 0) as u16;
    }

    // Horizontal half-sample at (x, y), unscaled.
    let b1 = |dx: i32, dy: i32| {
        tap6(
            full(dx - 2, dy),
            full(dx - 1, dy),
            full(dx, dy),
            full(dx + 1, dy),
            full(dx + 2, dy),
            full(dx + 3, dy),
        )
    };
    // Vertical half-sample at (x, y), unscaled.
    let h1 = |dx: i32, dy: i32| {
        tap6(
            full(dx, dy - 2),
            full(dx, dy - 1),
            full(dx, dy),
            full(dx, dy + 1),
            full(dx, dy + 2),
            full(dx, dy + 3),
        )
    };
    let clip = |v: i32| v.clamp(0, max_value);

    let b = |dx: i32, dy: i32| clip((b1(dx, dy) + 16) >> 5);
    let h = |dx: i32, dy: i32| clip((h1(dx, dy) + 16) >> 5);
    // Centre half-sample: vertical filter over unscaled horizontal halves.
    let j = || {
        let v = tap6(b1(0, -2), b1(0, -1), b1(0, 0), b1(0, 1), b1(0, 2), b1(0, 3));
        clip((v + 512) >> 10)
    };
    let avg = |p: i32, q: i32| ((p + q + 1) >> 1) as u16;

    match (fx, fy) {
        (2, 0) => b(0, 0) as u16,
        (0, 2) => h(0, 0) as u16,
        (2, 2) => j() as u16,
        (1, 0) => avg(full(0, 0), b(0, 0)),
        (3, 0) => avg(b(0, 0), full(1, 0)),
        (0, 1) => avg(full(0, 0), h(0, 0)),
        (0, 3) => avg(h(0, 0), full(0, 1)),
        (1, 1) => avg(b(0, 0), h(0, 0)),
        (3, 1) => avg(b(0, 0), h(1, 0)),
        (1, 3) => avg(h(0, 0), b(0, 1)),
        (3, 3) => avg(h(1, 0), b(0, 1)),
        (2, 1) => avg(j(), b(0, 0)),
        (2, 3) => avg(j(), b(0, 1)),
        (1, 2) => avg(j(), h(0, 0)),
        (3, 2) => avg(j(), h(1, 0)),
        _ => unreachable!(),
    }
}

/// Motion-compensate one luma block: `x0`/`y0` in samples, `mv` in
/// quarter-pel units.
pub fn mc_luma(
    plane: &Plane,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    mv: MotionVector,
    max_value: i32,
    out: &mut [[u16; 16]; 16],
) {
    let base_x = (x0 as i32) * 4 + mv.x as i32;
    let base_y = (y0 as i32) * 4 + mv.y as i32;
    for j in 0..h {
        for i in 0..w {
            out[j][i] = luma_sample(plane, base_x + 4 * i as i32, base_y + 4 * j as i32, max_value);
        }
    }
}

/// One chroma sample at eighth-pel position (8.4.2.2.2): 2D bilinear.
pub fn chroma_sample(plane: &Plane, x8: i32, y8: i32) -> u16 {
    let xi = x8 >> 3;
    let yi = y8 >> 3;
    let dx = x8 & 7;
    let dy = y8 & 7;

    let a = plane.fetch(xi, yi) as i32;
    let b = plane.fetch(xi + 1, yi) as i32;
    let c = plane.fetch(xi, yi + 1) as i32;
    let d = plane.fetch(xi + 1, yi + 1) as i32;

    (((8 - dx) * (8 - dy) * a + dx * (8 - dy) * b + (8 - dx) * dy * c + dx * dy * d + 32) >> 6)
        as u16
}

/// Motion-compensate one chroma block. The vector arrives in luma
/// quarter-pel units; `shift_x`/`shift_y` convert to the chroma grid
/// (1 for halved dimensions, 0 for full resolution).
pub fn mc_chroma(
    plane: &Plane,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    mv: MotionVector,
    shift_x: u32,
    shift_y: u32,
    out: &mut [[u16; 16]; 16],
) {
    // Quarter-pel luma units become eighth-pel chroma units after the
    // subsampling shift.
    let base_x = (x0 as i32) * 8 + ((mv.x as i32) << (1 - shift_x.min(1)));
    let base_y = (y0 as i32) * 8 + ((mv.y as i32) << (1 - shift_y.min(1)));
    for j in 0..h {
        for i in 0..w {
            out[j][i] = chroma_sample(plane, base_x + 8 * i as i32, base_y + 8 * j as i32);
        }
    }
}

/// Apply unidirectional explicit weighting to one block in place.
pub fn weight_block(
    block: &mut [[u16; 16]; 16],
    w: usize,
    h: usize,
    weight: i32,
    offset: i32,
    log2_denom: u8,
    max_value: i32,
) {
    let round = if log2_denom > 0 {
        1 << (log2_denom - 1)
    } else {
        0
    };
    for row in block.iter_mut().take(h) {
        for v in row.iter_mut().take(w) {
            let s = ((*v as i32 * weight + round) >> log2_denom) + offset;
            *v = s.clamp(0, max_value) as u16;
        }
    }
}

/// Combine two prediction blocks into `dst` with bi-prediction weights
/// (implicit or explicit), or plain averaging when `weights` is None.
#[allow(clippy::too_many_arguments)]
pub fn bipred_blocks(
    dst: &mut [[u16; 16]; 16],
    src0: &[[u16; 16]; 16],
    src1: &[[u16; 16]; 16],
    w: usize,
    h: usize,
    weights: Option<(i32, i32, i32, u8)>,
    max_value: i32,
) {
    match weights {
        None => {
            for j in 0..h {
                for i in 0..w {
                    dst[j][i] = ((src0[j][i] as i32 + src1[j][i] as i32 + 1) >> 1) as u16;
                }
            }
        }
        Some((w0, w1, offset, log2_denom)) => {
            let round = 1 << log2_denom;
            for j in 0..h {
                for i in 0..w {
                    let s = ((src0[j][i] as i32 * w0 + src1[j][i] as i32 * w1 + round)
                        >> (log2_denom + 1))
                        + offset;
                    dst[j][i] = s.clamp(0, max_value) as u16;
                }
            }
        }
    }
}

/// Combined offset of explicit bi-prediction.
pub fn bipred_offset(e0: &WeightEntry, e1: &WeightEntry, chroma: Option<usize>) -> i32 {
    match chroma {
        None => (e0.luma_offset + e1.luma_offset + 1) >> 1,
        Some(c) => (e0.chroma_offset[c] + e1.chroma_offset[c] + 1) >> 1,
    }
}

/// Scale a co-located motion vector for temporal direct mode (8.4.1.2.3).
pub fn temporal_scale_mv(mv: MotionVector, dist_scale_factor: i32) -> (MotionVector, MotionVector) {
    if dist_scale_factor == 9999 {
        // Long-term or zero-distance references copy the vector.
        return (mv, MotionVector::ZERO);
    }
    let mv0 = MotionVector::new(
        (((dist_scale_factor * mv.x as i32 + 128) >> 8).clamp(-32768, 32767)) as i16,
        (((dist_scale_factor * mv.y as i32 + 128) >> 8).clamp(-32768, 32767)) as i16,
    );
    let mv1 = MotionVector::new(mv0.x - mv.x, mv0.y - mv.y);
    (mv0, mv1)
}

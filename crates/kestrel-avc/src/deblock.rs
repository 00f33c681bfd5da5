//! In-loop deblocking filter (8.7): per-edge boundary strengths, threshold
//! tables and sample filtering, plus the MBAFF row de-interleave post-pass.

use crate::macroblock::{cbf_luma_bit, Macroblock};
use crate::picture::Picture;
use crate::tables::{ALPHA_TABLE, BETA_TABLE, CLIP_TABLE, QP_SCALE_CR};

/// Per-slice filter parameters, indexed by a macroblock's slice number.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeblockParams {
    /// disable_deblocking_filter_idc: 0 all, 1 off, 2 not across slices.
    pub disable_idc: u8,
    pub alpha_offset: i32,
    pub beta_offset: i32,
    /// chroma_qp_index_offset / second_chroma_qp_index_offset of the PPS.
    pub chroma_qp_offset: [i32; 2],
}

#[derive(Clone, Copy, PartialEq)]
enum Dir {
    Vertical,
    Horizontal,
}

/// Boundary strength between two 4x4 blocks (8.7.2.1), frame path.
#[allow(clippy::too_many_arguments)]
fn boundary_strength(
    pic: &Picture,
    q_mb: &Macroblock,
    p_mb: &Macroblock,
    mb_edge: bool,
    dir: Dir,
    q_blk: (usize, usize),
    p_blk: (usize, usize),
) -> u8 {
    if q_mb.is_intra() || p_mb.is_intra() {
        if mb_edge {
            // Horizontal MB edges between field macroblocks use strength 3.
            let field_pair = q_mb.mb_field || p_mb.mb_field;
            return if dir == Dir::Horizontal && field_pair { 3 } else { 4 };
        }
        return 3;
    }

    let q_coded = q_mb.cbf_bit(cbf_luma_bit(q_blk.0 % 4, q_blk.1 % 4));
    let p_coded = p_mb.cbf_bit(cbf_luma_bit(p_blk.0 % 4, p_blk.1 % 4));
    if q_coded || p_coded {
        return 2;
    }

    // Compare references and vectors of the two blocks.
    let bpr = pic.blocks_per_row();
    let q_info = &pic.mv_info[(q_mb.mb_y as usize * 4 + q_blk.1 % 4) * bpr
        + q_mb.mb_x as usize * 4
        + q_blk.0 % 4];
    let p_info = &pic.mv_info[(p_mb.mb_y as usize * 4 + p_blk.1 % 4) * bpr
        + p_mb.mb_x as usize * 4
        + p_blk.0 % 4];

    let refs_differ = {
        let q = [q_info.ref_id[0], q_info.ref_id[1]];
        let p = [p_info.ref_id[0], p_info.ref_id[1]];
        // The used reference sets must match, in either list order.
        !(q == p || (q[0] == p[1] && q[1] == p[0]))
    };
    if refs_differ {
        return 1;
    }

    for (l0, l1) in [(0usize, 0usize), (1, 1)] {
        if q_info.ref_id[l0] >= 0 {
            let dmx = (q_info.mv[l0].x - p_info.mv[l1].x).abs();
            let dmy = (q_info.mv[l0].y - p_info.mv[l1].y).abs();
            if dmx >= 4 || dmy >= 4 {
                return 1;
            }
        }
    }
    0
}

struct EdgeThresholds {
    alpha: i32,
    beta: i32,
    tc0: i32,
}

fn thresholds(avg_qp: i32, bs: u8, alpha_offset: i32, beta_offset: i32) -> EdgeThresholds {
    let index_a = (avg_qp + alpha_offset).clamp(0, 51) as usize;
    let index_b = (avg_qp + beta_offset).clamp(0, 51) as usize;
    EdgeThresholds {
        alpha: ALPHA_TABLE[index_a] as i32,
        beta: BETA_TABLE[index_b] as i32,
        tc0: CLIP_TABLE[index_a][bs as usize] as i32,
    }
}

/// Filter one luma edge segment of four lines (8.7.2.3 / 8.7.2.4).
#[allow(clippy::too_many_arguments)]
fn filter_luma_edge(
    pic: &mut Picture,
    dir: Dir,
    x: usize,
    y: usize,
    bs: u8,
    th: &EdgeThresholds,
    max_value: i32,
) {
    for k in 0..4 {
        let fetch = |d: i32| -> i32 {
            match dir {
                Dir::Vertical => pic.luma.get((x as i32 + d - 1) as usize, y + k) as i32,
                Dir::Horizontal => pic.luma.get(x + k, (y as i32 + d - 1) as usize) as i32,
            }
        };
        let p3 = fetch(-3);
        let p2 = fetch(-2);
        let p1 = fetch(-1);
        let p0 = fetch(0);
        let q0 = fetch(1);
        let q1 = fetch(2);
        let q2 = fetch(3);
        let q3 = fetch(4);

        if (p0 - q0).abs() >= th.alpha
            || (p1 - p0).abs() >= th.beta
            || (q1 - q0).abs() >= th.beta
        {
            continue;
        }

        let ap = (p2 - p0).abs();
        let aq = (q2 - q0).abs();

        let mut out = [p3, p2, p1, p0, q0, q1, q2, q3];
        if bs < 4 {
            let tc = th.tc0 + (ap < th.beta) as i32 + (aq < th.beta) as i32;
            let delta = (((q0 - p0) * 4 + (p1 - q1) + 4) >> 3).clamp(-tc, tc);
            out[3] = (p0 + delta).clamp(0, max_value);
            out[4] = (q0 - delta).clamp(0, max_value);
            if ap < th.beta {
                let d = ((p2 + ((p0 + q0 + 1) >> 1) - 2 * p1) >> 1).clamp(-th.tc0, th.tc0);
                out[2] = p1 + d;
            }
            if aq < th.beta {
                let d = ((q2 + ((p0 + q0 + 1) >> 1) - 2 * q1) >> 1).clamp(-th.tc0, th.tc0);
                out[5] = q1 + d;
            }
        } else {
            // Strong filter.
            let small_gap = (p0 - q0).abs() < ((th.alpha >> 2) + 2);
            if small_gap && ap < th.beta {
                out[3] = (p2 + 2 * p1 + 2 * p0 + 2 * q0 + q1 + 4) >> 3;
                out[2] = (p2 + p1 + p0 + q0 + 2) >> 2;
                out[1] = (2 * p3 + 3 * p2 + p1 + p0 + q0 + 4) >> 3;
            } else {
                out[3] = (2 * p1 + p0 + q1 + 2) >> 2;
            }
            if small_gap && aq < th.beta {
                out[4] = (q2 + 2 * q1 + 2 * q0 + 2 * p0 + p1 + 4) >> 3;
                out[5] = (q2 + q1 + q0 + p0 + 2) >> 2;
                out[6] = (2 * q3 + 3 * q2 + q1 + q0 + p0 + 4) >> 3;
            } else {
                out[4] = (2 * q1 + q0 + p1 + 2) >> 2;
            }
        }

        for (d, &v) in out.iter().enumerate() {
            let v = v.clamp(0, max_value) as u16;
            match dir {
                Dir::Vertical => pic.luma.set((x as i32 + d as i32 - 4) as usize, y + k, v),
                Dir::Horizontal => pic.luma.set(x + k, (y as i32 + d as i32 - 4) as usize, v),
            }
        }
    }
}

/// Filter one chroma edge segment (two lines per luma segment in 4:2:0).
#[allow(clippy::too_many_arguments)]
fn filter_chroma_edge(
    pic: &mut Picture,
    plane: usize,
    dir: Dir,
    x: usize,
    y: usize,
    lines: usize,
    bs: u8,
    th: &EdgeThresholds,
    max_value: i32,
) {
    let Some(chroma) = pic.chroma.as_mut() else {
        return;
    };
    let plane = &mut chroma[plane];
    for k in 0..lines {
        let fetch = |d: i32| -> i32 {
            match dir {
                Dir::Vertical => plane.get((x as i32 + d - 1) as usize, y + k) as i32,
                Dir::Horizontal => plane.get(x + k, (y as i32 + d - 1) as usize) as i32,
            }
        };
        let p1 = fetch(-1);
        let p0 = fetch(0);
        let q0 = fetch(1);
        let q1 = fetch(2);

        if (p0 - q0).abs() >= th.alpha
            || (p1 - p0).abs() >= th.beta
            || (q1 - q0).abs() >= th.beta
        {
            continue;
        }

        let (new_p0, new_q0) = if bs < 4 {
            let tc = th.tc0 + 1;
            let delta = (((q0 - p0) * 4 + (p1 - q1) + 4) >> 3).clamp(-tc, tc);
            (p0 + delta, q0 - delta)
        } else {
            ((2 * p1 + p0 + q1 + 2) >> 2, (2 * q1 + q0 + p1 + 2) >> 2)
        };

        let np0 = new_p0.clamp(0, max_value) as u16;
        let nq0 = new_q0.clamp(0, max_value) as u16;
        match dir {
            Dir::Vertical => {
                plane.set(x - 1, y + k, np0);
                plane.set(x, y + k, nq0);
            }
            Dir::Horizontal => {
                plane.set(x + k, y - 1, np0);
                plane.set(x + k, y, nq0);
            }
        }
    }
}

/// Filter a whole reconstructed picture. `mbs` is the per-MB state in
/// decoding order, `params` one entry per slice.
pub fn deblock_picture(
    pic: &mut Picture,
    mbs: &[Macroblock],
    params: &[DeblockParams],
    width_mbs: usize,
) {
    let max_luma = (1i32 << pic.bit_depth_luma) - 1;
    let max_chroma = (1i32 << pic.bit_depth_chroma) - 1;
    let (sub_x, sub_y) = match pic.chroma.as_ref() {
        Some(c) => (
            pic.luma.width / c[0].width,
            pic.luma.height / c[0].height,
        ),
        None => (0, 0),
    };

    for mb in mbs {
        if !mb.is_decoded() {
            continue;
        }
        let param = params
            .get(mb.slice_nr.max(0) as usize)
            .copied()
            .unwrap_or_default();
        if param.disable_idc == 1 {
            continue;
        }

        let mx = mb.mb_x as usize * 16;
        let my = mb.mb_y as usize * 16;
        let step = if mb.transform_size_8x8 { 8 } else { 4 };

        for dir in [Dir::Vertical, Dir::Horizontal] {
            let mut edge = 0usize;
            while edge < 16 {
                let mb_edge = edge == 0;
                // MB-boundary neighbour, or self for internal edges.
                let p_mb_addr: Option<u32> = if !mb_edge {
                    Some(mb.mb_addr)
                } else {
                    match dir {
                        Dir::Vertical if mb.mb_x > 0 => Some(mb.mb_addr - 1),
                        Dir::Horizontal if mb.mb_y > 0 => {
                            Some(mb.mb_addr - width_mbs as u32)
                        }
                        _ => None,
                    }
                };
                let Some(p_addr) = p_mb_addr else {
                    edge += step;
                    continue;
                };
                let p_mb = &mbs[p_addr as usize];
                if mb_edge {
                    if !p_mb.is_decoded() {
                        edge += step;
                        continue;
                    }
                    if param.disable_idc == 2 && p_mb.slice_nr != mb.slice_nr {
                        edge += step;
                        continue;
                    }
                }

                for seg in (0..16).step_by(4) {
                    // Block coordinates of the q (current) and p (previous)
                    // sides of this segment.
                    let (q_blk, p_blk, x, y) = match dir {
                        Dir::Vertical => (
                            (edge / 4, seg / 4),
                            (
                                if mb_edge { 3 } else { edge / 4 - 1 },
                                seg / 4,
                            ),
                            mx + edge,
                            my + seg,
                        ),
                        Dir::Horizontal => (
                            (seg / 4, edge / 4),
                            (
                                seg / 4,
                                if mb_edge { 3 } else { edge / 4 - 1 },
                            ),
                            mx + seg,
                            my + edge,
                        ),
                    };

                    let bs = boundary_strength(pic, mb, p_mb, mb_edge, dir, q_blk, p_blk);
                    if bs == 0 {
                        continue;
                    }

                    let avg_qp = (mb.qp + p_mb.qp + 1) >> 1;
                    let th = thresholds(avg_qp, bs, param.alpha_offset, param.beta_offset);
                    filter_luma_edge(pic, dir, x, y, bs, &th, max_luma);

                    // Chroma follows the luma edges that exist on its grid.
                    if sub_x != 0 {
                        let on_chroma_edge = match dir {
                            Dir::Vertical => edge % (4 * sub_x) == 0,
                            Dir::Horizontal => edge % (4 * sub_y) == 0,
                        };
                        if on_chroma_edge {
                            for c in 0..2 {
                                let avg_qpc = {
                                    let qpc_q = mb.qpc[c];
                                    let qpc_p = p_mb.qpc[c];
                                    (qpc_q + qpc_p + 1) >> 1
                                };
                                let th_c =
                                    thresholds(avg_qpc, bs, param.alpha_offset, param.beta_offset);
                                let (cx, cy, lines) = match dir {
                                    Dir::Vertical => {
                                        (x / sub_x, (my + seg) / sub_y, 4 / sub_y)
                                    }
                                    Dir::Horizontal => {
                                        ((mx + seg) / sub_x, y / sub_y, 4 / sub_x)
                                    }
                                };
                                if (dir == Dir::Vertical && cx > 0)
                                    || (dir == Dir::Horizontal && cy > 0)
                                {
                                    filter_chroma_edge(
                                        pic, c, dir, cx, cy, lines, bs, &th_c, max_chroma,
                                    );
                                }
                            }
                        }
                    }
                }
                edge += step;
            }
        }
    }
}

/// Derive the chroma QP for one component from the luma QP (8.7, via Table
/// 8-15).
pub fn chroma_qp(luma_qp: i32, chroma_offset: i32, qp_bd_offset_c: i32) -> i32 {
    let qpi = (luma_qp + chroma_offset).clamp(-qp_bd_offset_c, 51);
    if qpi < 30 {
        qpi
    } else {
        QP_SCALE_CR[qpi as usize] as i32
    }
}

/// MBAFF post-process: for every field-coded MB pair, de-interleave the two
/// field macroblocks back into frame line order. A deterministic row
/// permutation over the 32-line pair.
pub fn mbaff_post_process(pic: &mut Picture, width_mbs: usize) {
    let pairs = pic.mb_field_flags.len() / 2;
    for pair in 0..pairs {
        if !pic.mb_field_flags[2 * pair] {
            continue;
        }
        let x0 = (pair % width_mbs) * 16;
        let y0 = (pair / width_mbs) * 32;
        permute_pair_rows(&mut pic.luma, x0, y0, 16, 16);
        let (sub_x, sub_y) = match pic.chroma.as_ref() {
            Some(c) => (
                pic.luma.width / c[0].width,
                (pic.luma.height / c[0].height).max(1),
            ),
            None => continue,
        };
        if let Some(chroma) = pic.chroma.as_mut() {
            let w = 16 / sub_x;
            let h = 16 / sub_y;
            for plane in chroma.iter_mut() {
                permute_pair_rows(plane, x0 / sub_x, y0 / sub_y, w, h);
            }
        }
    }
}

fn permute_pair_rows(plane: &mut crate::picture::Plane, x0: usize, y0: usize, w: usize, h: usize) {
    // Gather the two stacked field MBs, then interleave their rows.
    let mut temp = vec![0u16; w * 2 * h];
    for j in 0..2 * h {
        for i in 0..w {
            temp[j * w + i] = plane.get(x0 + i, y0 + j);
        }
    }
    for j in 0..h {
        for i in 0..w {
            plane.set(x0 + i, y0 + 2 * j, temp[j * w + i]);
            plane.set(x0 + i, y0 + 2 * j + 1, temp[(h + j) * w + i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::PictureStructure;
    use crate::testutil::baseline_sps;

    #[test]
    fn test_chroma_qp_mapping() {
        assert_eq!(chroma_qp(26, 0, 0), 26);
        assert_eq!(chroma_qp(40, 0, 0), 36);
        assert_eq!(chroma_qp(51, 0, 0), 39);
        assert_eq!(chroma_qp(30, -2, 0), 28);
    }

    #[test]
    fn test_uniform_picture_unchanged() {
        // Flat content never changes under the filter regardless of bS.
        let sps = baseline_sps(2, 2);
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        pic.luma.fill(77);
        if let Some(c) = pic.chroma.as_mut() {
            c[0].fill(128);
            c[1].fill(128);
        }

        let mut mbs: Vec<Macroblock> = (0..4).map(|a| Macroblock::new(a, 2)).collect();
        for mb in mbs.iter_mut() {
            mb.slice_nr = 0;
            mb.class = crate::macroblock::MbClass::I16x16;
            mb.qp = 40;
            mb.qpc = [36, 36];
        }
        let params = [DeblockParams::default()];
        deblock_picture(&mut pic, &mbs, &params, 2);

        for y in 0..pic.height() {
            for x in 0..pic.width() {
                assert_eq!(pic.luma.get(x, y), 77);
            }
        }
        let c = pic.chroma.as_ref().unwrap();
        for y in 0..c[0].height {
            for x in 0..c[0].width {
                assert_eq!(c[0].get(x, y), 128);
            }
        }
    }

    #[test]
    fn test_disable_idc_skips_filtering() {
        let sps = baseline_sps(2, 1);
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        // Sharp edge at the MB boundary.
        for y in 0..16 {
            for x in 0..32 {
                pic.luma.set(x, y, if x < 16 { 60 } else { 80 });
            }
        }
        let mut mbs: Vec<Macroblock> = (0..2).map(|a| Macroblock::new(a, 2)).collect();
        for mb in mbs.iter_mut() {
            mb.slice_nr = 0;
            mb.class = crate::macroblock::MbClass::I16x16;
            mb.qp = 30;
            mb.qpc = [30, 30];
        }
        let params = [DeblockParams {
            disable_idc: 1,
            ..Default::default()
        }];
        let before: Vec<u16> = (0..16).map(|y| pic.luma.get(16, y)).collect();
        deblock_picture(&mut pic, &mbs, &params, 2);
        let after: Vec<u16> = (0..16).map(|y| pic.luma.get(16, y)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_strong_filter_smooths_intra_edge() {
        let sps = baseline_sps(2, 1);
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        for y in 0..16 {
            for x in 0..32 {
                pic.luma.set(x, y, if x < 16 { 60 } else { 70 });
            }
        }
        let mut mbs: Vec<Macroblock> = (0..2).map(|a| Macroblock::new(a, 2)).collect();
        for mb in mbs.iter_mut() {
            mb.slice_nr = 0;
            mb.class = crate::macroblock::MbClass::I16x16;
            mb.qp = 36;
            mb.qpc = [33, 33];
        }
        let params = [DeblockParams::default()];
        deblock_picture(&mut pic, &mbs, &params, 2);
        // The step across the MB edge narrows.
        let p0 = pic.luma.get(15, 4) as i32;
        let q0 = pic.luma.get(16, 4) as i32;
        assert!((q0 - p0).abs() < 10);
    }

    #[test]
    fn test_mbaff_row_permutation_round_trip() {
        let sps = baseline_sps(1, 2);
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        // Field-MB layout: top-field lines stored in rows 0..16, bottom in
        // 16..32.
        for y in 0..32 {
            for x in 0..16 {
                pic.luma.set(x, y, (100 + y) as u16);
            }
        }
        pic.mb_field_flags = vec![true, true];
        mbaff_post_process(&mut pic, 1);
        // Row 0 keeps the first top-field line; row 1 now holds the first
        // bottom-field line (was row 16).
        assert_eq!(pic.luma.get(0, 0), 100);
        assert_eq!(pic.luma.get(0, 1), 116);
        assert_eq!(pic.luma.get(0, 2), 101);
        assert_eq!(pic.luma.get(0, 3), 117);
    }
}

//! Neighbour derivation: availability and addresses of the A/B/C/D
//! neighbours at macroblock and 4x4-block granularity, for plain frames and
//! MBAFF frames (6.4.9 - 6.4.11).

use crate::macroblock::Macroblock;

/// A located neighbour sample: the MB that contains it and its coordinates
/// both within that MB (x, y) and within the picture (pos_x, pos_y), in the
/// units of the queried plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelPos {
    pub available: bool,
    pub mb_addr: u32,
    pub x: i32,
    pub y: i32,
    pub pos_x: i32,
    pub pos_y: i32,
}

/// Neighbour oracle over the current picture's macroblock array.
pub struct NeighbourCtx<'a> {
    pub width_mbs: u32,
    pub pic_size_in_mbs: u32,
    pub mbaff: bool,
    pub mbs: &'a [Macroblock],
}

impl<'a> NeighbourCtx<'a> {
    pub fn new(width_mbs: u32, pic_size_in_mbs: u32, mbaff: bool, mbs: &'a [Macroblock]) -> Self {
        Self {
            width_mbs,
            pic_size_in_mbs,
            mbaff,
            mbs,
        }
    }

    /// An MB is available to its neighbour queries once decoded and only
    /// within the same slice.
    fn mb_available(&self, curr: u32, addr: i64) -> bool {
        if addr < 0 || addr >= self.pic_size_in_mbs as i64 {
            return false;
        }
        let nb = &self.mbs[addr as usize];
        nb.is_decoded() && nb.slice_nr == self.mbs[curr as usize].slice_nr
    }

    /// Macroblock position in MB units.
    pub fn mb_position(&self, mb_addr: u32) -> (u32, u32) {
        if self.mbaff {
            let pair = mb_addr / 2;
            (
                pair % self.width_mbs,
                (pair / self.width_mbs) * 2 + (mb_addr & 1),
            )
        } else {
            (mb_addr % self.width_mbs, mb_addr / self.width_mbs)
        }
    }

    /// Neighbouring sample lookup for non-MBAFF pictures (6.4.12 for frames
    /// and fields). `max_w`/`max_h` are the MB extent in the queried plane.
    fn get_neighbour_frame(
        &self,
        curr: u32,
        xn: i32,
        yn: i32,
        max_w: i32,
        max_h: i32,
    ) -> PixelPos {
        let w = self.width_mbs as i64;
        let curr_i = curr as i64;
        let col0 = curr_i % w == 0;
        let col_last = (curr_i + 1) % w == 0;

        let (addr, valid): (i64, bool) = if xn < 0 && yn < 0 {
            (curr_i - w - 1, !col0)
        } else if xn < 0 && yn < max_h {
            (curr_i - 1, !col0)
        } else if xn < max_w && yn < 0 {
            (curr_i - w, true)
        } else if xn >= max_w && yn < 0 {
            (curr_i - w + 1, !col_last)
        } else if xn >= 0 && xn < max_w && yn >= 0 && yn < max_h {
            (curr_i, true)
        } else {
            (-1, false)
        };

        let mut pix = PixelPos::default();
        if !valid || !self.mb_available(curr, addr) {
            return pix;
        }
        pix.available = true;
        pix.mb_addr = addr as u32;
        pix.x = xn & (max_w - 1);
        pix.y = yn & (max_h - 1);
        let (mx, my) = self.mb_position(pix.mb_addr);
        pix.pos_x = mx as i32 * max_w + pix.x;
        pix.pos_y = my as i32 * max_h + pix.y;
        pix
    }

    /// Neighbouring sample lookup for MBAFF frames (6.4.10). The pair
    /// mappings depend on the field/frame state of both sides.
    fn get_neighbour_mbaff(
        &self,
        curr: u32,
        xn: i32,
        yn: i32,
        max_w: i32,
        max_h: i32,
    ) -> PixelPos {
        let w = self.width_mbs as i64;
        let curr_i = curr as i64;
        let curr_field = self.mbs[curr as usize].mb_field;
        let is_bottom = curr_i & 1 == 1;
        let pair = curr_i / 2;
        let pair_col0 = pair % w == 0;
        let pair_col_last = (pair + 1) % w == 0;

        let mut pix = PixelPos::default();
        let mut ym = yn;

        // Resolve the neighbouring pair and the member within it.
        let (pair_addr, use_bottom): (i64, bool);
        if xn < 0 && yn < 0 {
            // D
            if !curr_field {
                if !is_bottom {
                    pair_addr = pair - w - 1;
                    use_bottom = true;
                } else {
                    pair_addr = pair - 1;
                    use_bottom = false;
                    ym = yn;
                }
            } else {
                pair_addr = pair - w - 1;
                use_bottom = is_bottom;
            }
            if pair_col0 {
                return pix;
            }
        } else if xn < 0 {
            // A
            pair_addr = pair - 1;
            if pair_col0 {
                return pix;
            }
            let nb_addr = pair_addr * 2;
            if !self.mb_available(curr, nb_addr) {
                return pix;
            }
            let nb_field = self.mbs[nb_addr as usize].mb_field;
            match (curr_field, nb_field) {
                (false, false) | (true, true) => {
                    use_bottom = is_bottom;
                }
                (false, true) => {
                    // Frame MB reading a field pair: the line maps to the
                    // field of matching parity, halved.
                    let abs_y = is_bottom as i32 * max_h + yn;
                    use_bottom = abs_y >= max_h;
                    ym = (abs_y % (2 * max_h)) / 2;
                }
                (true, false) => {
                    // Field MB reading a frame pair: the line doubles.
                    let line = 2 * yn + is_bottom as i32;
                    use_bottom = line >= max_h;
                    ym = line & (max_h - 1);
                }
            }
            return self.finish_mbaff(curr, pair_addr, use_bottom, xn & (max_w - 1), ym, max_w, max_h);
        } else if yn < 0 {
            // B or C
            let (p, last_ok) = if xn >= max_w {
                (pair - w + 1, !pair_col_last)
            } else {
                (pair - w, true)
            };
            if !last_ok {
                return pix;
            }
            if !curr_field && is_bottom {
                // Bottom frame MB: the neighbour above is the top of the own
                // pair.
                pair_addr = pair;
                use_bottom = false;
                if xn >= max_w {
                    return pix;
                }
            } else {
                pair_addr = p;
                let nb_addr = pair_addr * 2;
                if !self.mb_available(curr, nb_addr) {
                    return pix;
                }
                let nb_field = self.mbs[nb_addr as usize].mb_field;
                if curr_field && !nb_field {
                    // Field reading frame pair above: bottom MB, doubled line.
                    use_bottom = true;
                    ym = yn;
                } else if !curr_field && nb_field {
                    use_bottom = is_bottom;
                    ym = yn;
                } else {
                    use_bottom = true;
                    ym = yn;
                }
            }
        } else if xn < max_w && yn < max_h {
            pair_addr = pair;
            use_bottom = is_bottom;
        } else {
            return pix;
        }

        self.finish_mbaff(curr, pair_addr, use_bottom, xn & (max_w - 1), ym, max_w, max_h)
    }

    fn finish_mbaff(
        &self,
        curr: u32,
        pair_addr: i64,
        use_bottom: bool,
        x: i32,
        ym: i32,
        max_w: i32,
        max_h: i32,
    ) -> PixelPos {
        let mut pix = PixelPos::default();
        if pair_addr < 0 {
            return pix;
        }
        let addr = pair_addr * 2 + use_bottom as i64;
        if !self.mb_available(curr, addr) {
            return pix;
        }
        pix.available = true;
        pix.mb_addr = addr as u32;
        pix.x = x;
        pix.y = ym & (max_h - 1);
        let (mx, my) = self.mb_position(pix.mb_addr);
        pix.pos_x = mx as i32 * max_w + pix.x;
        pix.pos_y = my as i32 * max_h + pix.y;
        pix
    }

    /// Neighbouring sample at a relative luma-plane offset.
    pub fn get_neighbour(&self, curr: u32, xn: i32, yn: i32, max_w: i32, max_h: i32) -> PixelPos {
        if self.mbaff {
            self.get_neighbour_mbaff(curr, xn, yn, max_w, max_h)
        } else {
            self.get_neighbour_frame(curr, xn, yn, max_w, max_h)
        }
    }

    /// 4x4-block-granular neighbour: like `get_neighbour` but with the local
    /// coordinates reduced to block indices.
    pub fn get_4x4_neighbour(&self, curr: u32, xn: i32, yn: i32, max_w: i32, max_h: i32) -> PixelPos {
        let mut pix = self.get_neighbour(curr, xn, yn, max_w, max_h);
        if pix.available {
            pix.x >>= 2;
            pix.y >>= 2;
            pix.pos_x >>= 2;
            pix.pos_y >>= 2;
        }
        pix
    }

    /// The canonical A (left), B (up), C (up-right), D (up-left) macroblock
    /// neighbours.
    pub fn mb_neighbours(&self, curr: u32) -> [PixelPos; 4] {
        [
            self.get_neighbour(curr, -1, 0, 16, 16),
            self.get_neighbour(curr, 0, -1, 16, 16),
            self.get_neighbour(curr, 16, -1, 16, 16),
            self.get_neighbour(curr, -1, -1, 16, 16),
        ]
    }

    /// Predicted non-zero coefficient count for CAVLC's nC (9.2.1).
    pub fn predict_nnz(&self, curr: u32, plane: usize, bx: usize, by: usize) -> i32 {
        let pix_a = self.get_4x4_neighbour(curr, (bx as i32) * 4 - 1, (by as i32) * 4, 16, 16);
        let pix_b = self.get_4x4_neighbour(curr, (bx as i32) * 4, (by as i32) * 4 - 1, 16, 16);

        let a = pix_a
            .available
            .then(|| self.mbs[pix_a.mb_addr as usize].nz_coeff[plane][pix_a.y as usize][pix_a.x as usize] as i32);
        let b = pix_b
            .available
            .then(|| self.mbs[pix_b.mb_addr as usize].nz_coeff[plane][pix_b.y as usize][pix_b.x as usize] as i32);

        match (a, b) {
            (Some(a), Some(b)) => (a + b + 1) >> 1,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 0,
        }
    }

    /// Chroma variant of `predict_nnz`; block coordinates in the chroma
    /// plane, extent given by the chroma MB size.
    pub fn predict_nnz_chroma(
        &self,
        curr: u32,
        component: usize,
        bx: usize,
        by: usize,
        mb_width_c: i32,
        mb_height_c: i32,
    ) -> i32 {
        let plane = component + 1;
        let pix_a = self.get_4x4_neighbour(
            curr,
            (bx as i32) * 4 - 1,
            (by as i32) * 4,
            mb_width_c,
            mb_height_c,
        );
        let pix_b = self.get_4x4_neighbour(
            curr,
            (bx as i32) * 4,
            (by as i32) * 4 - 1,
            mb_width_c,
            mb_height_c,
        );

        let a = pix_a
            .available
            .then(|| self.mbs[pix_a.mb_addr as usize].nz_coeff[plane][pix_a.y as usize][pix_a.x as usize] as i32);
        let b = pix_b
            .available
            .then(|| self.mbs[pix_b.mb_addr as usize].nz_coeff[plane][pix_b.y as usize][pix_b.x as usize] as i32);

        match (a, b) {
            (Some(a), Some(b)) => (a + b + 1) >> 1,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_mbs(width: u32, height: u32, slice_nr: i32) -> Vec<Macroblock> {
        (0..width * height)
            .map(|addr| {
                let mut mb = Macroblock::new(addr, width);
                mb.slice_nr = slice_nr;
                mb
            })
            .collect()
    }

    #[test]
    fn test_corner_mb_has_no_neighbours() {
        let mbs = make_mbs(4, 4, 0);
        let ctx = NeighbourCtx::new(4, 16, false, &mbs);
        let [a, b, c, d] = ctx.mb_neighbours(0);
        assert!(!a.available);
        assert!(!b.available);
        assert!(!c.available);
        assert!(!d.available);
    }

    #[test]
    fn test_interior_mb_neighbours() {
        let mbs = make_mbs(4, 4, 0);
        let ctx = NeighbourCtx::new(4, 16, false, &mbs);
        // MB 5 sits at (1, 1).
        let [a, b, c, d] = ctx.mb_neighbours(5);
        assert!(a.available && a.mb_addr == 4);
        assert!(b.available && b.mb_addr == 1);
        assert!(c.available && c.mb_addr == 2);
        assert!(d.available && d.mb_addr == 0);
    }

    #[test]
    fn test_top_right_unavailable_at_row_edge() {
        let mbs = make_mbs(4, 4, 0);
        let ctx = NeighbourCtx::new(4, 16, false, &mbs);
        // MB 7 is at (3, 1): C would wrap to the next row.
        let [_, _, c, _] = ctx.mb_neighbours(7);
        assert!(!c.available);
    }

    #[test]
    fn test_slice_boundary_blocks_availability() {
        let mut mbs = make_mbs(4, 4, 0);
        for mb in mbs.iter_mut().take(4) {
            mb.slice_nr = 0;
        }
        for mb in mbs.iter_mut().skip(4) {
            mb.slice_nr = 1;
        }
        let ctx = NeighbourCtx::new(4, 16, false, &mbs);
        // MB 5 (slice 1) cannot see MB 1 (slice 0) above it.
        let [a, b, _, _] = ctx.mb_neighbours(5);
        assert!(a.available);
        assert!(!b.available);
    }

    #[test]
    fn test_4x4_neighbour_positions() {
        let mbs = make_mbs(4, 4, 0);
        let ctx = NeighbourCtx::new(4, 16, false, &mbs);
        // Left of block (0, 1) inside MB 5 lands in MB 4, block x 3.
        let pix = ctx.get_4x4_neighbour(5, -1, 4, 16, 16);
        assert!(pix.available);
        assert_eq!(pix.mb_addr, 4);
        assert_eq!(pix.x, 3);
        assert_eq!(pix.y, 1);
        // Inside the same MB.
        let pix = ctx.get_4x4_neighbour(5, 4, 4, 16, 16);
        assert!(pix.available);
        assert_eq!(pix.mb_addr, 5);
        assert_eq!(pix.x, 1);
        assert_eq!(pix.y, 1);
    }

    #[test]
    fn test_mbaff_pair_positions() {
        let mut mbs = make_mbs(2, 4, 0); // 2x4 MBs = 2x2 pairs
        for mb in mbs.iter_mut() {
            mb.mb_field = false;
        }
        let ctx = NeighbourCtx::new(2, 8, true, &mbs);
        // Address 3 is the bottom MB of pair 1 at pair position (1, 0).
        assert_eq!(ctx.mb_position(3), (1, 1));
        // Address 4 is the top MB of pair 2 at (0, 2).
        assert_eq!(ctx.mb_position(4), (0, 2));

        // The MB above a bottom frame MB is the top MB of its own pair.
        let pix = ctx.get_neighbour(1, 0, -1, 16, 16);
        assert!(pix.available);
        assert_eq!(pix.mb_addr, 0);
    }

    #[test]
    fn test_predict_nnz() {
        let mut mbs = make_mbs(2, 1, 0);
        mbs[0].nz_coeff[0][0][3] = 4;
        mbs[0].nz_coeff[0][1][3] = 2;
        let ctx = NeighbourCtx::new(2, 2, false, &mbs);
        // Block (0,0) of MB 1: left neighbour is block (3,0) of MB 0 with 4
        // coefficients; no upper neighbour.
        assert_eq!(ctx.predict_nnz(1, 0, 0, 0), 4);
        assert_eq!(ctx.predict_nnz(1, 0, 0, 1), 2);
        // MB 0 has no neighbours at all.
        assert_eq!(ctx.predict_nnz(0, 0, 0, 0), 0);
    }
}

//! Flexible macroblock ordering: derivation of the map-unit and macroblock
//! slice-group maps (8.2.2) and the slice-group scan.

use crate::pps::{Pps, SliceGroupMapType};
use crate::slice::SliceHeader;
use crate::sps::Sps;

/// The per-picture slice-group maps.
#[derive(Debug, Clone)]
pub struct SliceGroupMap {
    /// One entry per map unit.
    map_units: Vec<u8>,
    /// One entry per macroblock address.
    mbs: Vec<u8>,
}

impl SliceGroupMap {
    /// Build the maps for the current picture. `header` supplies
    /// slice_group_change_cycle for the changing map types.
    pub fn build(sps: &Sps, pps: &Pps, header: &SliceHeader) -> Self {
        let num_groups = pps.num_slice_groups_minus1 + 1;
        let units = sps.pic_size_in_map_units() as usize;
        let width = sps.pic_width_in_mbs() as usize;

        let map_units = if num_groups == 1 {
            vec![0u8; units]
        } else {
            match pps.slice_group_map_type {
                SliceGroupMapType::Interleaved => interleaved_map(pps, units),
                SliceGroupMapType::Dispersed => dispersed_map(pps, units, width),
                SliceGroupMapType::ForegroundLeftover => foreground_map(pps, units, width),
                SliceGroupMapType::BoxOut => box_out_map(sps, pps, header, units, width),
                SliceGroupMapType::RasterScan => raster_map(sps, pps, header, units),
                SliceGroupMapType::Wipe => wipe_map(sps, pps, header, units, width),
                SliceGroupMapType::Explicit => {
                    let mut map = vec![0u8; units];
                    for (i, entry) in map.iter_mut().enumerate() {
                        *entry = pps.slice_group_id.get(i).copied().unwrap_or(0);
                    }
                    map
                }
            }
        };

        let mbs = mb_map_from_units(sps, header, &map_units);
        Self { map_units, mbs }
    }

    /// Slice group of a macroblock address.
    pub fn group_of(&self, mb_addr: u32) -> u8 {
        self.mbs.get(mb_addr as usize).copied().unwrap_or(0)
    }

    /// Next MB address in the same slice group, or None at the end of the
    /// picture.
    pub fn next_mb(&self, mb_addr: u32) -> Option<u32> {
        let group = self.group_of(mb_addr);
        let mut i = mb_addr as usize + 1;
        while i < self.mbs.len() {
            if self.mbs[i] == group {
                return Some(i as u32);
            }
            i += 1;
        }
        None
    }

    pub fn num_mbs(&self) -> usize {
        self.mbs.len()
    }

    pub fn map_units(&self) -> &[u8] {
        &self.map_units
    }
}

fn interleaved_map(pps: &Pps, units: usize) -> Vec<u8> {
    let mut map = vec![0u8; units];
    let mut i = 0;
    while i < units {
        for (group, &run) in pps.run_length_minus1.iter().enumerate() {
            for _ in 0..=run {
                if i >= units {
                    return map;
                }
                map[i] = group as u8;
                i += 1;
            }
        }
    }
    map
}

fn dispersed_map(pps: &Pps, units: usize, width: usize) -> Vec<u8> {
    let groups = pps.num_slice_groups_minus1 as usize + 1;
    let mut map = vec![0u8; units];
    for (i, entry) in map.iter_mut().enumerate() {
        *entry = (((i % width) + (((i / width) * groups) / 2)) % groups) as u8;
    }
    map
}

fn foreground_map(pps: &Pps, units: usize, width: usize) -> Vec<u8> {
    let mut map = vec![pps.num_slice_groups_minus1 as u8; units];
    for (group, &(top_left, bottom_right)) in pps.top_left_bottom_right.iter().enumerate().rev() {
        let y_top = top_left as usize / width;
        let x_left = top_left as usize % width;
        let y_bottom = bottom_right as usize / width;
        let x_right = bottom_right as usize % width;
        for y in y_top..=y_bottom.min(units / width - 1) {
            for x in x_left..=x_right.min(width - 1) {
                map[y * width + x] = group as u8;
            }
        }
    }
    map
}

fn changing_units(sps: &Sps, pps: &Pps, header: &SliceHeader) -> usize {
    header.map_units_in_slice_group0(sps, pps) as usize
}

fn box_out_map(sps: &Sps, pps: &Pps, header: &SliceHeader, units: usize, width: usize) -> Vec<u8> {
    let height = units / width;
    let mut map = vec![1u8; units];
    let in_group0 = changing_units(sps, pps, header);

    let dir = pps.slice_group_change_direction_flag;
    let (mut x, mut y) = (
        (width as i32 - dir as i32) / 2,
        (height as i32 - dir as i32) / 2,
    );
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (x, y, x, y);
    let (mut x_dir, mut y_dir) = (dir as i32 - 1, dir as i32);

    let mut assigned = 0usize;
    let mut k = 0usize;
    while k < units * 4 {
        let idx = (y * width as i32 + x) as usize;
        let fresh = map[idx] == 1;
        if fresh {
            map[idx] = 0;
            assigned += 1;
            if assigned >= in_group0 {
                break;
            }
        }
        if x_dir == -1 && x == x_min {
            x_min = (x_min - 1).max(0);
            x = x_min;
            x_dir = 0;
            y_dir = 2 * dir as i32 - 1;
        } else if x_dir == 1 && x == x_max {
            x_max = (x_max + 1).min(width as i32 - 1);
            x = x_max;
            x_dir = 0;
            y_dir = 1 - 2 * dir as i32;
        } else if y_dir == -1 && y == y_min {
            y_min = (y_min - 1).max(0);
            y = y_min;
            x_dir = 1 - 2 * dir as i32;
            y_dir = 0;
        } else if y_dir == 1 && y == y_max {
            y_max = (y_max + 1).min(height as i32 - 1);
            y = y_max;
            x_dir = 2 * dir as i32 - 1;
            y_dir = 0;
        } else {
            x += x_dir;
            y += y_dir;
        }
        k += 1;
    }
    map
}

fn raster_map(sps: &Sps, pps: &Pps, header: &SliceHeader, units: usize) -> Vec<u8> {
    let size_in_group0 = changing_units(sps, pps, header);
    let mut map = vec![1u8; units];
    if pps.slice_group_change_direction_flag {
        // reverse raster
        for i in 0..size_in_group0.min(units) {
            map[units - 1 - i] = 0;
        }
    } else {
        for entry in map.iter_mut().take(size_in_group0) {
            *entry = 0;
        }
    }
    map
}

fn wipe_map(sps: &Sps, pps: &Pps, header: &SliceHeader, units: usize, width: usize) -> Vec<u8> {
    let height = units / width;
    let size_in_group0 = changing_units(sps, pps, header);
    let mut map = vec![1u8; units];
    let mut k = 0usize;
    if pps.slice_group_change_direction_flag {
        // right-to-left, bottom-to-top columns
        'outer_rev: for col in (0..width).rev() {
            for row in (0..height).rev() {
                if k >= size_in_group0 {
                    break 'outer_rev;
                }
                map[row * width + col] = 0;
                k += 1;
            }
        }
    } else {
        'outer: for col in 0..width {
            for row in 0..height {
                if k >= size_in_group0 {
                    break 'outer;
                }
                map[row * width + col] = 0;
                k += 1;
            }
        }
    }
    map
}

/// Expand the map-unit map to macroblock addresses (8.2.2.8).
fn mb_map_from_units(sps: &Sps, header: &SliceHeader, map_units: &[u8]) -> Vec<u8> {
    let width = sps.pic_width_in_mbs() as usize;
    let pic_size_in_mbs = header.pic_size_in_mbs(sps) as usize;
    let mut mbs = vec![0u8; pic_size_in_mbs];

    let mbaff = header.mbaff_frame_flag(sps);
    for (addr, entry) in mbs.iter_mut().enumerate() {
        *entry = if sps.frame_mbs_only_flag || header.field_pic_flag {
            map_units[addr]
        } else if mbaff {
            map_units[addr / 2]
        } else {
            // PAFF-capable frame picture without MBAFF
            map_units[(addr / (2 * width)) * width + (addr % width)]
        };
    }
    mbs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pps::SliceGroupMapType;
    use crate::slice::{DecRefPicMarking, SliceType};
    use crate::testutil::baseline_sps;
    use std::collections::HashMap;

    fn canned_header() -> SliceHeader {
        SliceHeader {
            first_mb_in_slice: 0,
            slice_type: SliceType::I,
            pic_parameter_set_id: 0,
            colour_plane_id: 0,
            frame_num: 0,
            field_pic_flag: false,
            bottom_field_flag: false,
            idr_pic_id: 0,
            pic_order_cnt_lsb: 0,
            delta_pic_order_cnt_bottom: 0,
            delta_pic_order_cnt: [0; 2],
            redundant_pic_cnt: 0,
            direct_spatial_mv_pred_flag: false,
            num_ref_idx_active_override_flag: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            ref_pic_list_modification_l0: Vec::new(),
            ref_pic_list_modification_l1: Vec::new(),
            pred_weight_table: None,
            dec_ref_pic_marking: DecRefPicMarking::default(),
            cabac_init_idc: 0,
            slice_qp_delta: 0,
            sp_for_switch_flag: false,
            slice_qs_delta: 0,
            disable_deblocking_filter_idc: 0,
            slice_alpha_c0_offset_div2: 0,
            slice_beta_offset_div2: 0,
            slice_group_change_cycle: 1,
            idr_flag: true,
            nal_ref_idc: 3,
            nal_unit_type: 5,
            view_id: 0,
            inter_view_flag: false,
            anchor_pic_flag: true,
        }
    }

    fn canned_pps(map_type: SliceGroupMapType, groups_minus1: u32) -> Pps {
        let mut sps_map = HashMap::new();
        sps_map.insert(0u8, baseline_sps(1, 1));
        let mut w = crate::testutil::BitWriter::new();
        w.ue(0);
        w.ue(0);
        w.bit(false);
        w.bit(false);
        w.ue(0);
        w.ue(0);
        w.ue(0);
        w.bit(false);
        w.bits(0, 2);
        w.se(0);
        w.se(0);
        w.se(0);
        w.bit(false);
        w.bit(false);
        w.bit(false);
        w.rbsp_trailing();
        let mut pps = crate::pps::parse_pps(&w.into_bytes(), &sps_map).unwrap();
        pps.slice_group_map_type = map_type;
        pps.num_slice_groups_minus1 = groups_minus1;
        pps
    }

    #[test]
    fn test_single_group_is_raster() {
        let sps = baseline_sps(4, 2);
        let pps = canned_pps(SliceGroupMapType::Interleaved, 0);
        let map = SliceGroupMap::build(&sps, &pps, &canned_header());
        assert_eq!(map.num_mbs(), 8);
        for addr in 0..7 {
            assert_eq!(map.next_mb(addr), Some(addr + 1));
        }
        assert_eq!(map.next_mb(7), None);
    }

    #[test]
    fn test_interleaved_two_groups() {
        let sps = baseline_sps(4, 2);
        let mut pps = canned_pps(SliceGroupMapType::Interleaved, 1);
        pps.run_length_minus1 = vec![1, 1];
        let map = SliceGroupMap::build(&sps, &pps, &canned_header());
        assert_eq!(map.map_units(), &[0, 0, 1, 1, 0, 0, 1, 1]);
        // Scan within group 0 skips over group 1 map units.
        assert_eq!(map.next_mb(1), Some(4));
    }

    #[test]
    fn test_dispersed_two_groups() {
        let sps = baseline_sps(4, 2);
        let pps = canned_pps(SliceGroupMapType::Dispersed, 1);
        let map = SliceGroupMap::build(&sps, &pps, &canned_header());
        assert_eq!(map.map_units(), &[0, 1, 0, 1, 1, 0, 1, 0]);
    }

    #[test]
    fn test_foreground_leftover() {
        let sps = baseline_sps(4, 4);
        let mut pps = canned_pps(SliceGroupMapType::ForegroundLeftover, 1);
        // Group 0 is the 2x2 box with corners at map units 5 and 10.
        pps.top_left_bottom_right = vec![(5, 10)];
        let map = SliceGroupMap::build(&sps, &pps, &canned_header());
        for (i, &g) in map.map_units().iter().enumerate() {
            let (x, y) = (i % 4, i / 4);
            let inside = (1..=2).contains(&x) && (1..=2).contains(&y);
            assert_eq!(g, if inside { 0 } else { 1 }, "unit {}", i);
        }
    }

    #[test]
    fn test_raster_changing() {
        let sps = baseline_sps(4, 2);
        let mut pps = canned_pps(SliceGroupMapType::RasterScan, 1);
        pps.slice_group_change_rate_minus1 = 2; // rate 3
        let mut header = canned_header();
        header.slice_group_change_cycle = 1;
        let map = SliceGroupMap::build(&sps, &pps, &header);
        assert_eq!(map.map_units(), &[0, 0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_explicit_map() {
        let sps = baseline_sps(4, 2);
        let mut pps = canned_pps(SliceGroupMapType::Explicit, 1);
        pps.slice_group_id = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let map = SliceGroupMap::build(&sps, &pps, &canned_header());
        assert_eq!(map.map_units(), &[0, 1, 0, 1, 0, 1, 0, 1]);
    }
}

//! Picture order count derivation (8.2.1) for pic_order_cnt_type 0, 1 and 2.

use crate::picture::PictureStructure;
use crate::slice::SliceHeader;
use crate::sps::Sps;

/// The POC triplet computed for one picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Poc {
    pub top_field_order_cnt: i32,
    pub bottom_field_order_cnt: i32,
    pub pic_order_cnt: i32,
    pub frame_poc: i32,
}

/// Cross-picture POC state, reset at IDR and by MMCO 5.
#[derive(Debug, Clone, Default)]
pub struct PocContext {
    prev_pic_order_cnt_msb: i32,
    prev_pic_order_cnt_lsb: u32,
    prev_frame_num: u32,
    prev_frame_num_offset: i32,
    last_has_mmco5: bool,
    last_pic_bottom_field: bool,
    last_top_poc: i32,
}

impl PocContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the POC triplet for the picture this slice starts, updating
    /// the cross-picture state.
    pub fn compute(&mut self, sps: &Sps, header: &SliceHeader) -> Poc {
        let poc = match sps.pic_order_cnt_type {
            0 => self.compute_type0(sps, header),
            1 => self.compute_type1(sps, header),
            _ => self.compute_type2(sps, header),
        };

        self.last_has_mmco5 = header.dec_ref_pic_marking.has_reset();
        self.last_pic_bottom_field = header.field_pic_flag && header.bottom_field_flag;
        if !self.last_pic_bottom_field {
            self.last_top_poc = poc.top_field_order_cnt;
        }
        poc
    }

    fn compute_type0(&mut self, sps: &Sps, header: &SliceHeader) -> Poc {
        let max_lsb = sps.max_pic_order_cnt_lsb() as i32;
        let lsb = header.pic_order_cnt_lsb as i32;

        let (prev_msb, prev_lsb) = if header.idr_flag {
            (0, 0)
        } else if self.last_has_mmco5 {
            if self.last_pic_bottom_field {
                (0, 0)
            } else {
                (0, self.last_top_poc)
            }
        } else {
            (self.prev_pic_order_cnt_msb, self.prev_pic_order_cnt_lsb as i32)
        };

        let msb = if lsb < prev_lsb && prev_lsb - lsb >= max_lsb / 2 {
            prev_msb + max_lsb
        } else if lsb > prev_lsb && lsb - prev_lsb > max_lsb / 2 {
            prev_msb - max_lsb
        } else {
            prev_msb
        };

        let mut poc = Poc::default();
        match header.structure() {
            PictureStructure::Frame => {
                poc.top_field_order_cnt = msb + lsb;
                poc.bottom_field_order_cnt =
                    poc.top_field_order_cnt + header.delta_pic_order_cnt_bottom;
                poc.pic_order_cnt = poc.top_field_order_cnt.min(poc.bottom_field_order_cnt);
            }
            PictureStructure::TopField => {
                poc.top_field_order_cnt = msb + lsb;
                poc.pic_order_cnt = poc.top_field_order_cnt;
            }
            PictureStructure::BottomField => {
                poc.bottom_field_order_cnt = msb + lsb;
                poc.pic_order_cnt = poc.bottom_field_order_cnt;
            }
        }
        poc.frame_poc = poc.pic_order_cnt;

        if header.nal_ref_idc != 0 {
            self.prev_pic_order_cnt_msb = msb;
            self.prev_pic_order_cnt_lsb = header.pic_order_cnt_lsb;
        }
        poc
    }

    fn frame_num_offset(&self, sps: &Sps, header: &SliceHeader) -> i32 {
        if header.idr_flag {
            0
        } else {
            let (prev_frame_num, prev_offset) = if self.last_has_mmco5 {
                (0, 0)
            } else {
                (self.prev_frame_num, self.prev_frame_num_offset)
            };
            if prev_frame_num > header.frame_num {
                prev_offset + sps.max_frame_num() as i32
            } else {
                prev_offset
            }
        }
    }

    fn compute_type1(&mut self, sps: &Sps, header: &SliceHeader) -> Poc {
        let frame_num_offset = self.frame_num_offset(sps, header);
        let cycle_len = sps.offset_for_ref_frame.len() as i32;

        let mut abs_frame_num = if cycle_len != 0 {
            frame_num_offset + header.frame_num as i32
        } else {
            0
        };
        if header.nal_ref_idc == 0 && abs_frame_num > 0 {
            abs_frame_num -= 1;
        }

        let mut expected_poc = 0i32;
        if abs_frame_num > 0 {
            let cycle_cnt = (abs_frame_num - 1) / cycle_len;
            let frame_num_in_cycle = (abs_frame_num - 1) % cycle_len;
            expected_poc = cycle_cnt * sps.expected_delta_per_pic_order_cnt_cycle();
            for k in 0..=frame_num_in_cycle {
                expected_poc += sps.offset_for_ref_frame[k as usize];
            }
        }
        if header.nal_ref_idc == 0 {
            expected_poc += sps.offset_for_non_ref_pic;
        }

        let mut poc = Poc::default();
        match header.structure() {
            PictureStructure::Frame => {
                poc.top_field_order_cnt = expected_poc + header.delta_pic_order_cnt[0];
                poc.bottom_field_order_cnt = poc.top_field_order_cnt
                    + sps.offset_for_top_to_bottom_field
                    + header.delta_pic_order_cnt[1];
                poc.pic_order_cnt = poc.top_field_order_cnt.min(poc.bottom_field_order_cnt);
            }
            PictureStructure::TopField => {
                poc.top_field_order_cnt = expected_poc + header.delta_pic_order_cnt[0];
                poc.pic_order_cnt = poc.top_field_order_cnt;
            }
            PictureStructure::BottomField => {
                poc.bottom_field_order_cnt = expected_poc
                    + sps.offset_for_top_to_bottom_field
                    + header.delta_pic_order_cnt[0];
                poc.pic_order_cnt = poc.bottom_field_order_cnt;
            }
        }
        poc.frame_poc = poc.pic_order_cnt;

        self.prev_frame_num = header.frame_num;
        self.prev_frame_num_offset = frame_num_offset;
        poc
    }

    fn compute_type2(&mut self, sps: &Sps, header: &SliceHeader) -> Poc {
        let frame_num_offset = self.frame_num_offset(sps, header);

        let temp_poc = if header.idr_flag {
            0
        } else if header.nal_ref_idc == 0 {
            2 * (frame_num_offset + header.frame_num as i32) - 1
        } else {
            2 * (frame_num_offset + header.frame_num as i32)
        };

        let mut poc = Poc {
            top_field_order_cnt: temp_poc,
            bottom_field_order_cnt: temp_poc,
            pic_order_cnt: temp_poc,
            frame_poc: temp_poc,
        };
        match header.structure() {
            PictureStructure::TopField => poc.bottom_field_order_cnt = 0,
            PictureStructure::BottomField => poc.top_field_order_cnt = 0,
            PictureStructure::Frame => {}
        }

        self.prev_frame_num = header.frame_num;
        self.prev_frame_num_offset = frame_num_offset;
        poc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::{DecRefPicMarking, SliceType};
    use crate::testutil::baseline_sps;

    fn header(frame_num: u32, lsb: u32, idr: bool, ref_idc: u8) -> SliceHeader {
        SliceHeader {
            first_mb_in_slice: 0,
            slice_type: SliceType::P,
            pic_parameter_set_id: 0,
            colour_plane_id: 0,
            frame_num,
            field_pic_flag: false,
            bottom_field_flag: false,
            idr_pic_id: 0,
            pic_order_cnt_lsb: lsb,
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
            slice_group_change_cycle: 0,
            idr_flag: idr,
            nal_ref_idc: ref_idc,
            nal_unit_type: if idr { 5 } else { 1 },
            view_id: 0,
            inter_view_flag: false,
            anchor_pic_flag: idr,
        }
    }

    #[test]
    fn test_type0_basic_sequence() {
        // MaxPicOrderCntLsb is 16 for the canned SPS.
        let sps = baseline_sps(1, 1);
        let mut ctx = PocContext::new();

        let poc = ctx.compute(&sps, &header(0, 0, true, 3));
        assert_eq!(poc.pic_order_cnt, 0);

        let poc = ctx.compute(&sps, &header(1, 2, false, 3));
        assert_eq!(poc.pic_order_cnt, 2);

        let poc = ctx.compute(&sps, &header(2, 4, false, 3));
        assert_eq!(poc.pic_order_cnt, 4);
    }

    #[test]
    fn test_type0_lsb_wrap() {
        let sps = baseline_sps(1, 1);
        let mut ctx = PocContext::new();
        ctx.compute(&sps, &header(0, 0, true, 3));
        ctx.compute(&sps, &header(1, 14, false, 3));
        // lsb wraps 14 -> 2: MSB steps up by MaxPicOrderCntLsb.
        let poc = ctx.compute(&sps, &header(2, 2, false, 3));
        assert_eq!(poc.pic_order_cnt, 16 + 2);
    }

    #[test]
    fn test_type0_idr_resets() {
        let sps = baseline_sps(1, 1);
        let mut ctx = PocContext::new();
        ctx.compute(&sps, &header(0, 0, true, 3));
        ctx.compute(&sps, &header(1, 8, false, 3));
        let poc = ctx.compute(&sps, &header(0, 0, true, 3));
        assert_eq!(poc.pic_order_cnt, 0);
    }

    #[test]
    fn test_type2_alternates_for_non_ref() {
        let mut sps = baseline_sps(1, 1);
        sps.pic_order_cnt_type = 2;
        let mut ctx = PocContext::new();
        assert_eq!(ctx.compute(&sps, &header(0, 0, true, 3)).pic_order_cnt, 0);
        assert_eq!(ctx.compute(&sps, &header(1, 0, false, 3)).pic_order_cnt, 2);
        assert_eq!(ctx.compute(&sps, &header(2, 0, false, 0)).pic_order_cnt, 3);
        assert_eq!(ctx.compute(&sps, &header(2, 0, false, 3)).pic_order_cnt, 4);
    }

    #[test]
    fn test_type1_with_cycle() {
        let mut sps = baseline_sps(1, 1);
        sps.pic_order_cnt_type = 1;
        sps.offset_for_ref_frame = vec![2];
        let mut ctx = PocContext::new();
        assert_eq!(ctx.compute(&sps, &header(0, 0, true, 3)).pic_order_cnt, 0);
        assert_eq!(ctx.compute(&sps, &header(1, 0, false, 3)).pic_order_cnt, 2);
        assert_eq!(ctx.compute(&sps, &header(2, 0, false, 3)).pic_order_cnt, 4);
    }
}

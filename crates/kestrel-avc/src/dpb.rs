//! Decoded picture buffer: reference marking, output bumping, frame-num gap
//! synthesis and the MVC layer split.

use crate::error::{DecodeError, Result};
use crate::picture::{FrameStore, Picture, PictureStructure, RefState};
use crate::slice::{DecRefPicMarking, MmcoOp};
use crate::sps::Sps;
use tracing::{debug, trace, warn};

/// Handle to a stored reference picture. Stable for the duration of one
/// picture's decode: stores are only removed at `store_picture` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefPicHandle {
    pub store: usize,
    pub structure: PictureStructure,
}

/// The decoded picture buffer for one MVC layer.
pub struct Dpb {
    pub layer_id: u8,
    /// MaxDpbFrames for the active sequence.
    size: usize,
    num_ref_frames: usize,
    max_frame_num: u32,
    stores: Vec<FrameStore>,
    max_long_term_frame_idx: i32,
    last_output_poc: i32,
    init_done: bool,
}

impl Dpb {
    pub fn new(layer_id: u8) -> Self {
        Self {
            layer_id,
            size: 0,
            num_ref_frames: 0,
            max_frame_num: 0,
            stores: Vec::new(),
            max_long_term_frame_idx: -1,
            last_output_poc: i32::MIN,
            init_done: false,
        }
    }

    /// (Re-)initialize for an activated SPS. The caller flushes first when
    /// prior pictures must still be output.
    pub fn init(&mut self, sps: &Sps) {
        self.size = sps.max_dpb_frames() as usize;
        self.num_ref_frames = sps.max_num_ref_frames.max(1) as usize;
        self.max_frame_num = sps.max_frame_num();
        self.stores.clear();
        self.max_long_term_frame_idx = -1;
        self.last_output_poc = i32::MIN;
        self.init_done = true;
        debug!(
            layer = self.layer_id,
            size = self.size,
            refs = self.num_ref_frames,
            "DPB initialized"
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.init_done
    }

    pub fn used_size(&self) -> usize {
        self.stores.len()
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn stores(&self) -> &[FrameStore] {
        &self.stores
    }

    /// Resolve a handle to a stored picture.
    pub fn picture(&self, handle: RefPicHandle) -> Option<&Picture> {
        let fs = self.stores.get(handle.store)?;
        match handle.structure {
            PictureStructure::Frame => fs.frame.as_ref(),
            PictureStructure::TopField => fs.top_field.as_ref(),
            PictureStructure::BottomField => fs.bottom_field.as_ref(),
        }
    }

    /// Store one decoded picture, applying reference marking and producing
    /// any pictures forced out by bumping.
    pub fn store_picture(
        &mut self,
        mut pic: Picture,
        marking: &DecRefPicMarking,
        outputs: &mut Vec<Picture>,
        next_id: &mut i64,
    ) -> Result<()> {
        let mut mmco5 = false;

        if pic.idr_flag {
            self.idr_memory_management(&pic, marking, outputs)?;
            pic.is_long_term = marking.long_term_reference_flag;
            if pic.is_long_term {
                pic.long_term_frame_idx = 0;
                self.max_long_term_frame_idx = 0;
            } else {
                self.max_long_term_frame_idx = -1;
            }
        } else if pic.used_for_reference && marking.adaptive_ref_pic_marking_mode_flag {
            mmco5 = self.adaptive_memory_management(&mut pic, marking)?;
        }

        if mmco5 {
            // MMCO 5 behaves like a stream restart for ordering purposes.
            pic.top_poc -= pic.poc;
            pic.bottom_poc -= pic.poc;
            pic.frame_poc = pic.top_poc.min(pic.bottom_poc);
            pic.poc = 0;
            self.flush(outputs);
        }

        // A field may complete an open complementary pair.
        if pic.structure.is_field() {
            if let Some(idx) = self.open_pair_for(&pic) {
                self.insert_field_into(idx, pic, next_id);
                self.post_store(marking, outputs, next_id)?;
                return Ok(());
            }
        }

        // Sliding-window marking for short-term references.
        if pic.used_for_reference
            && !pic.idr_flag
            && !pic.is_long_term
            && !marking.adaptive_ref_pic_marking_mode_flag
        {
            self.sliding_window(pic.frame_num);
        }

        // Make room before inserting.
        while self.stores.len() >= self.size {
            self.remove_unused();
            if self.stores.len() < self.size {
                break;
            }
            if !self.bump_one(outputs) {
                return Err(DecodeError::DpbOverflow(format!(
                    "no removable frame store ({} of {})",
                    self.stores.len(),
                    self.size
                )));
            }
        }

        let mut fs = FrameStore::new();
        fs.frame_num = pic.frame_num;
        fs.poc = pic.poc;
        fs.non_existing = pic.non_existing;
        fs.concealed = pic.concealed;
        fs.view_id = pic.view_id;
        fs.inter_view_flag = pic.inter_view_flag;
        fs.anchor_pic_flag = pic.anchor_pic_flag;
        fs.long_term_frame_idx = pic.long_term_frame_idx;
        // Synthesized gap frames are never displayed.
        fs.is_output = pic.non_existing;

        let used_bits;
        match pic.structure {
            PictureStructure::Frame => {
                used_bits = 3;
                if pic.used_for_reference {
                    fs.is_reference = 3;
                    if pic.is_long_term {
                        fs.is_long_term = 3;
                    }
                }
                fs.frame = Some(pic);
                fs.dpb_split_frame(bump_id(next_id, 2));
            }
            PictureStructure::TopField => {
                used_bits = 1;
                if pic.used_for_reference {
                    fs.is_reference = 1;
                    if pic.is_long_term {
                        fs.is_long_term = 1;
                    }
                }
                fs.top_field = Some(pic);
            }
            PictureStructure::BottomField => {
                used_bits = 2;
                if pic.used_for_reference {
                    fs.is_reference = 2;
                    if pic.is_long_term {
                        fs.is_long_term = 2;
                    }
                }
                fs.bottom_field = Some(pic);
            }
        }
        fs.is_used = used_bits;
        trace!(
            layer = self.layer_id,
            frame_num = fs.frame_num,
            poc = fs.poc,
            "stored picture"
        );
        self.stores.push(fs);

        self.post_store(marking, outputs, next_id)
    }

    fn post_store(
        &mut self,
        _marking: &DecRefPicMarking,
        outputs: &mut Vec<Picture>,
        _next_id: &mut i64,
    ) -> Result<()> {
        self.remove_unused();
        while self.stores.len() > self.size {
            if !self.bump_one(outputs) {
                return Err(DecodeError::DpbOverflow(format!(
                    "cannot bump below capacity {}",
                    self.size
                )));
            }
            self.remove_unused();
        }
        Ok(())
    }

    fn open_pair_for(&self, pic: &Picture) -> Option<usize> {
        let want = match pic.structure {
            PictureStructure::TopField => 2u8,
            PictureStructure::BottomField => 1u8,
            PictureStructure::Frame => return None,
        };
        let idx = self.stores.len().checked_sub(1)?;
        let fs = &self.stores[idx];
        (fs.is_used == want && !fs.is_output && fs.frame_num == pic.frame_num).then_some(idx)
    }

    fn insert_field_into(&mut self, idx: usize, pic: Picture, next_id: &mut i64) {
        let fs = &mut self.stores[idx];
        let bit = if pic.structure == PictureStructure::TopField {
            1
        } else {
            2
        };
        fs.is_used |= bit;
        if pic.used_for_reference {
            fs.is_reference |= bit;
            if pic.is_long_term {
                fs.is_long_term |= bit;
            }
        }
        match pic.structure {
            PictureStructure::TopField => fs.top_field = Some(pic),
            PictureStructure::BottomField => fs.bottom_field = Some(pic),
            PictureStructure::Frame => unreachable!(),
        }
        if fs.is_used == 3 {
            fs.dpb_combine_fields(bump_id(next_id, 1));
        }
    }

    /// IDR path: flush or silently drop all prior pictures.
    fn idr_memory_management(
        &mut self,
        pic: &Picture,
        marking: &DecRefPicMarking,
        outputs: &mut Vec<Picture>,
    ) -> Result<()> {
        if marking.no_output_of_prior_pics_flag {
            debug!(layer = self.layer_id, "IDR drops prior pictures");
            self.stores.clear();
        } else {
            self.flush(outputs);
        }
        self.last_output_poc = i32::MIN;
        let _ = pic;
        Ok(())
    }

    /// Apply the slice's MMCO list. Returns true when an MMCO 5 was present.
    fn adaptive_memory_management(
        &mut self,
        pic: &mut Picture,
        marking: &DecRefPicMarking,
    ) -> Result<bool> {
        let mut saw_reset = false;
        for op in &marking.mmco_ops {
            match *op {
                MmcoOp::ShortTermToUnused {
                    difference_of_pic_nums_minus1,
                } => {
                    let pic_num_x =
                        self.pic_num_x(pic, difference_of_pic_nums_minus1);
                    self.unmark_short_term(pic_num_x);
                }
                MmcoOp::LongTermToUnused { long_term_pic_num } => {
                    self.unmark_long_term(long_term_pic_num as i32);
                }
                MmcoOp::ShortTermToLongTerm {
                    difference_of_pic_nums_minus1,
                    long_term_frame_idx,
                } => {
                    let pic_num_x =
                        self.pic_num_x(pic, difference_of_pic_nums_minus1);
                    // Uniqueness of LongTermFrameIdx: any holder is unmarked.
                    self.unmark_long_term_frame_idx(long_term_frame_idx as i32);
                    self.assign_long_term(pic_num_x, long_term_frame_idx as i32);
                }
                MmcoOp::SetMaxLongTermFrameIdx {
                    max_long_term_frame_idx_plus1,
                } => {
                    self.max_long_term_frame_idx = max_long_term_frame_idx_plus1 as i32 - 1;
                    // Long-term frames above the new bound become unused.
                    for fs in &mut self.stores {
                        if fs.is_long_term_reference()
                            && fs.long_term_frame_idx > self.max_long_term_frame_idx
                        {
                            fs.is_reference = 0;
                            fs.is_long_term = 0;
                        }
                    }
                }
                MmcoOp::ResetAll => {
                    for fs in &mut self.stores {
                        fs.is_reference = 0;
                        fs.is_long_term = 0;
                    }
                    self.max_long_term_frame_idx = -1;
                    saw_reset = true;
                }
                MmcoOp::CurrentToLongTerm { long_term_frame_idx } => {
                    self.unmark_long_term_frame_idx(long_term_frame_idx as i32);
                    pic.is_long_term = true;
                    pic.long_term_frame_idx = long_term_frame_idx as i32;
                }
            }
        }
        Ok(saw_reset)
    }

    fn pic_num_x(&self, pic: &Picture, difference_of_pic_nums_minus1: u32) -> i32 {
        let curr_pic_num = if pic.structure == PictureStructure::Frame {
            pic.frame_num as i32
        } else {
            2 * pic.frame_num as i32 + 1
        };
        curr_pic_num - (difference_of_pic_nums_minus1 as i32 + 1)
    }

    fn unmark_short_term(&mut self, pic_num_x: i32) {
        let max_frame_num = self.max_frame_num;
        for fs in &mut self.stores {
            if fs.is_short_term_reference() {
                // Frame granularity; pic_num_x of a field maps onto its pair.
                let pic_num = fs.frame_num as i32 % max_frame_num.max(1) as i32;
                if pic_num == pic_num_x || pic_num == pic_num_x / 2 {
                    fs.is_reference = 0;
                    fs.is_long_term = 0;
                    return;
                }
            }
        }
        warn!(pic_num_x, "MMCO 1 found no short-term picture");
    }

    fn unmark_long_term(&mut self, long_term_pic_num: i32) {
        for fs in &mut self.stores {
            if fs.is_long_term_reference()
                && (fs.long_term_frame_idx == long_term_pic_num
                    || fs.long_term_frame_idx == long_term_pic_num / 2)
            {
                fs.is_reference = 0;
                fs.is_long_term = 0;
                return;
            }
        }
        warn!(long_term_pic_num, "MMCO 2 found no long-term picture");
    }

    fn unmark_long_term_frame_idx(&mut self, idx: i32) {
        for fs in &mut self.stores {
            if fs.is_long_term_reference() && fs.long_term_frame_idx == idx {
                fs.is_reference = 0;
                fs.is_long_term = 0;
            }
        }
    }

    fn assign_long_term(&mut self, pic_num_x: i32, long_term_frame_idx: i32) {
        let max_frame_num = self.max_frame_num;
        for fs in &mut self.stores {
            if fs.is_short_term_reference() {
                let pic_num = fs.frame_num as i32 % max_frame_num.max(1) as i32;
                if pic_num == pic_num_x || pic_num == pic_num_x / 2 {
                    fs.is_long_term = fs.is_reference;
                    fs.long_term_frame_idx = long_term_frame_idx;
                    if let Some(frame) = fs.frame.as_mut() {
                        frame.is_long_term = true;
                        frame.long_term_frame_idx = long_term_frame_idx;
                    }
                    for field in [fs.top_field.as_mut(), fs.bottom_field.as_mut()]
                        .into_iter()
                        .flatten()
                    {
                        field.is_long_term = true;
                        field.long_term_frame_idx = long_term_frame_idx;
                    }
                    return;
                }
            }
        }
        warn!(pic_num_x, "MMCO 3 found no short-term picture");
    }

    /// Sliding-window eviction (8.2.5.3): with the window full, the oldest
    /// short-term frame (smallest FrameNumWrap) becomes unused.
    fn sliding_window(&mut self, curr_frame_num: u32) {
        let num_refs = self
            .stores
            .iter()
            .filter(|fs| fs.is_referenced())
            .count();
        if num_refs < self.num_ref_frames {
            return;
        }

        let max_frame_num = self.max_frame_num as i32;
        let mut oldest: Option<(usize, i32)> = None;
        for (idx, fs) in self.stores.iter().enumerate() {
            if fs.is_short_term_reference() {
                let wrap = if fs.frame_num > curr_frame_num {
                    fs.frame_num as i32 - max_frame_num
                } else {
                    fs.frame_num as i32
                };
                if oldest.map(|(_, w)| wrap < w).unwrap_or(true) {
                    oldest = Some((idx, wrap));
                }
            }
        }
        if let Some((idx, wrap)) = oldest {
            trace!(frame_num_wrap = wrap, "sliding window unmarks frame");
            self.stores[idx].is_reference = 0;
            self.stores[idx].is_long_term = 0;
        }
    }

    /// Drop stores that are neither referenced nor awaiting output.
    fn remove_unused(&mut self) {
        self.stores
            .retain(|fs| fs.is_referenced() || !(fs.is_output && fs.is_complete()));
    }

    /// Output the lowest-POC complete picture. Returns false when nothing is
    /// outputtable.
    fn bump_one(&mut self, outputs: &mut Vec<Picture>) -> bool {
        let mut best: Option<(usize, i32)> = None;
        for (idx, fs) in self.stores.iter().enumerate() {
            if fs.is_complete() && !fs.is_output {
                if best.map(|(_, poc)| fs.poc < poc).unwrap_or(true) {
                    best = Some((idx, fs.poc));
                }
            }
        }
        let Some((idx, poc)) = best else {
            return false;
        };

        let fs = &mut self.stores[idx];
        fs.is_output = true;
        if let Some(frame) = fs.frame.as_ref() {
            if !fs.non_existing {
                outputs.push(frame.clone());
            }
        }
        self.last_output_poc = poc;
        if !self.stores[idx].is_referenced() {
            self.stores.remove(idx);
        }
        true
    }

    /// Output every pending picture and clear the buffer.
    pub fn flush(&mut self, outputs: &mut Vec<Picture>) {
        // Lone fields at the end of a sequence are emitted as they are.
        for fs in &mut self.stores {
            if !fs.is_complete() && !fs.is_output {
                if let Some(field) = fs.top_field.as_ref().or(fs.bottom_field.as_ref()) {
                    outputs.push(field.clone());
                    fs.is_output = true;
                }
            }
        }
        while self.bump_one(outputs) {}
        self.stores.clear();
        self.last_output_poc = i32::MIN;
    }

    /// Synthesize non-existing frames covering a frame_num gap
    /// (gaps_in_frame_num_value_allowed_flag).
    pub fn fill_frame_num_gap(
        &mut self,
        sps: &Sps,
        prev_frame_num: u32,
        curr_frame_num: u32,
        poc_of_gap: i32,
        outputs: &mut Vec<Picture>,
        next_id: &mut i64,
    ) -> Result<()> {
        let max_frame_num = sps.max_frame_num();
        let mut unused_frame_num = (prev_frame_num + 1) % max_frame_num;
        debug!(
            prev_frame_num,
            curr_frame_num, "filling frame_num gap with non-existing frames"
        );

        while unused_frame_num != curr_frame_num {
            let mut pic = Picture::alloc(bump_id(next_id, 1), sps, PictureStructure::Frame);
            pic.frame_num = unused_frame_num;
            pic.pic_num = unused_frame_num as i32;
            pic.non_existing = true;
            pic.used_for_reference = true;
            pic.top_poc = poc_of_gap;
            pic.bottom_poc = poc_of_gap;
            pic.frame_poc = poc_of_gap;
            pic.poc = poc_of_gap;

            self.store_picture(pic, &DecRefPicMarking::default(), outputs, next_id)?;
            unused_frame_num = (unused_frame_num + 1) % max_frame_num;
        }
        Ok(())
    }

    /// Same-POC inter-view reference candidates from this (base) layer.
    pub fn inter_view_refs(&self, poc: i32) -> Vec<RefPicHandle> {
        let mut refs = Vec::new();
        for (idx, fs) in self.stores.iter().enumerate() {
            if fs.inter_view_flag && fs.poc == poc && fs.is_complete() {
                refs.push(RefPicHandle {
                    store: idx,
                    structure: PictureStructure::Frame,
                });
            }
        }
        refs
    }
}

#[inline]
fn bump_id(next_id: &mut i64, by: i64) -> i64 {
    let id = *next_id;
    *next_id += by;
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::baseline_sps;

    fn ref_frame(sps: &Sps, id: i64, frame_num: u32, poc: i32) -> Picture {
        let mut pic = Picture::alloc(id, sps, PictureStructure::Frame);
        pic.frame_num = frame_num;
        pic.pic_num = frame_num as i32;
        pic.used_for_reference = true;
        pic.top_poc = poc;
        pic.bottom_poc = poc;
        pic.frame_poc = poc;
        pic.poc = poc;
        pic
    }

    fn store(dpb: &mut Dpb, pic: Picture, next_id: &mut i64) -> Vec<Picture> {
        let mut outputs = Vec::new();
        dpb.store_picture(pic, &DecRefPicMarking::default(), &mut outputs, next_id)
            .unwrap();
        outputs
    }

    #[test]
    fn test_sliding_window_keeps_count_bounded() {
        let mut sps = baseline_sps(1, 1);
        sps.max_num_ref_frames = 2;
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;

        for n in 0..5u32 {
            store(&mut dpb, ref_frame(&sps, n as i64, n % 16, 2 * n as i32), &mut next_id);
        }
        let refs = dpb.stores().iter().filter(|fs| fs.is_referenced()).count();
        assert!(refs <= 2, "sliding window failed: {} refs", refs);
    }

    #[test]
    fn test_idr_flush_outputs_in_poc_order() {
        let sps = baseline_sps(1, 1);
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;

        store(&mut dpb, ref_frame(&sps, 0, 0, 4), &mut next_id);
        store(&mut dpb, ref_frame(&sps, 1, 1, 2), &mut next_id);

        let mut idr = ref_frame(&sps, 2, 0, 0);
        idr.idr_flag = true;
        let mut outputs = Vec::new();
        dpb.store_picture(idr, &DecRefPicMarking::default(), &mut outputs, &mut next_id)
            .unwrap();
        let pocs: Vec<i32> = outputs.iter().map(|p| p.poc).collect();
        assert_eq!(pocs, vec![2, 4]);
    }

    #[test]
    fn test_idr_no_output_of_prior_pics() {
        let sps = baseline_sps(1, 1);
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;
        store(&mut dpb, ref_frame(&sps, 0, 0, 4), &mut next_id);

        let mut idr = ref_frame(&sps, 1, 0, 0);
        idr.idr_flag = true;
        let marking = DecRefPicMarking {
            no_output_of_prior_pics_flag: true,
            ..Default::default()
        };
        let mut outputs = Vec::new();
        dpb.store_picture(idr, &marking, &mut outputs, &mut next_id)
            .unwrap();
        assert!(outputs.is_empty());
        assert_eq!(dpb.used_size(), 1);
    }

    #[test]
    fn test_mmco_short_to_long_term() {
        let mut sps = baseline_sps(1, 1);
        sps.max_num_ref_frames = 4;
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;

        store(&mut dpb, ref_frame(&sps, 0, 0, 0), &mut next_id);
        store(&mut dpb, ref_frame(&sps, 1, 1, 2), &mut next_id);

        // Picture with frame_num 2 marks pic_num 1 (diff 0) long-term idx 0.
        let pic = ref_frame(&sps, 2, 2, 4);
        let marking = DecRefPicMarking {
            adaptive_ref_pic_marking_mode_flag: true,
            mmco_ops: vec![MmcoOp::ShortTermToLongTerm {
                difference_of_pic_nums_minus1: 0,
                long_term_frame_idx: 0,
            }],
            ..Default::default()
        };
        let mut outputs = Vec::new();
        dpb.store_picture(pic, &marking, &mut outputs, &mut next_id)
            .unwrap();

        let long_terms: Vec<u32> = dpb
            .stores()
            .iter()
            .filter(|fs| fs.is_long_term_reference())
            .map(|fs| fs.frame_num)
            .collect();
        assert_eq!(long_terms, vec![1]);
        assert_eq!(
            dpb.stores()
                .iter()
                .filter(|fs| fs.is_short_term_reference())
                .count(),
            2
        );
    }

    #[test]
    fn test_gap_synthesis() {
        let mut sps = baseline_sps(1, 1);
        sps.gaps_in_frame_num_value_allowed_flag = true;
        sps.max_num_ref_frames = 6;
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;

        store(&mut dpb, ref_frame(&sps, 0, 0, 0), &mut next_id);
        let mut outputs = Vec::new();
        dpb.fill_frame_num_gap(&sps, 0, 3, 0, &mut outputs, &mut next_id)
            .unwrap();

        let frame_nums: Vec<u32> = dpb.stores().iter().map(|fs| fs.frame_num).collect();
        assert_eq!(frame_nums, vec![0, 1, 2]);
        assert!(dpb.stores()[1].non_existing);
        assert!(dpb.stores()[2].non_existing);

        // Non-existing frames never reach the output list.
        let mut flushed = Vec::new();
        dpb.flush(&mut flushed);
        assert_eq!(flushed.len(), 1);
    }

    #[test]
    fn test_field_pair_combines() {
        let mut sps = baseline_sps(1, 2);
        sps.frame_mbs_only_flag = false;
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 10i64;

        let mut top = Picture::alloc(0, &sps, PictureStructure::TopField);
        top.frame_num = 0;
        top.used_for_reference = true;
        top.poc = 0;
        let mut bottom = Picture::alloc(1, &sps, PictureStructure::BottomField);
        bottom.frame_num = 0;
        bottom.used_for_reference = true;
        bottom.poc = 1;

        store(&mut dpb, top, &mut next_id);
        assert!(!dpb.stores()[0].is_complete());
        store(&mut dpb, bottom, &mut next_id);
        assert!(dpb.stores()[0].is_complete());
        assert!(dpb.stores()[0].frame.is_some());
    }
}

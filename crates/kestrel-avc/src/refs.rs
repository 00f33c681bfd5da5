//! Reference picture list initialization, modification and the prediction
//! weight/motion-scale tables derived from them (8.2.4, 8.4.2.3, 8.4.3).

use crate::dpb::{Dpb, RefPicHandle};
use crate::error::{DecodeError, Result};
use crate::picture::PictureStructure;
use crate::slice::{RefListModOp, SliceHeader, WeightEntry};
use crate::sps::Sps;
use tracing::trace;

/// One reference list entry, denormalised for fast use during prediction.
#[derive(Debug, Clone, Copy)]
pub struct RefEntry {
    pub handle: RefPicHandle,
    /// Unique picture id (for deblocking "same reference" tests).
    pub id: i64,
    pub poc: i32,
    /// PicNum for short-term entries, LongTermPicNum for long-term ones.
    pub pic_num: i32,
    pub long_term: bool,
    pub non_existing: bool,
    /// Set for MVC inter-view entries appended from the base layer.
    pub inter_view: bool,
}

/// The L0/L1 lists for one slice.
#[derive(Debug, Clone, Default)]
pub struct RefLists {
    pub l0: Vec<RefEntry>,
    pub l1: Vec<RefEntry>,
}

impl RefLists {
    pub fn list(&self, list: usize) -> &[RefEntry] {
        if list == 0 {
            &self.l0
        } else {
            &self.l1
        }
    }
}

fn frame_num_wrap(frame_num: u32, curr_frame_num: u32, max_frame_num: u32) -> i32 {
    if frame_num > curr_frame_num {
        frame_num as i32 - max_frame_num as i32
    } else {
        frame_num as i32
    }
}

/// Collect short-term reference entries (frame granularity).
fn short_term_entries(dpb: &Dpb, header: &SliceHeader, sps: &Sps) -> Vec<RefEntry> {
    let mut entries = Vec::new();
    for (idx, fs) in dpb.stores().iter().enumerate() {
        if !fs.is_short_term_reference() || !fs.is_complete() {
            continue;
        }
        let Some(frame) = fs.frame.as_ref() else {
            continue;
        };
        let wrap = frame_num_wrap(fs.frame_num, header.frame_num, sps.max_frame_num());
        entries.push(RefEntry {
            handle: RefPicHandle {
                store: idx,
                structure: PictureStructure::Frame,
            },
            id: frame.id,
            poc: fs.poc,
            pic_num: wrap,
            long_term: false,
            non_existing: fs.non_existing,
            inter_view: false,
        });
    }
    entries
}

/// Collect long-term reference entries (frame granularity).
fn long_term_entries(dpb: &Dpb) -> Vec<RefEntry> {
    let mut entries = Vec::new();
    for (idx, fs) in dpb.stores().iter().enumerate() {
        if !fs.is_long_term_reference() || !fs.is_complete() {
            continue;
        }
        let Some(frame) = fs.frame.as_ref() else {
            continue;
        };
        entries.push(RefEntry {
            handle: RefPicHandle {
                store: idx,
                structure: PictureStructure::Frame,
            },
            id: frame.id,
            poc: fs.poc,
            pic_num: fs.long_term_frame_idx,
            long_term: true,
            non_existing: fs.non_existing,
            inter_view: false,
        });
    }
    entries.sort_by_key(|e| e.pic_num);
    entries
}

/// Turn frame entries into field entries with alternating parity
/// (8.2.4.2.5), starting with the current field's parity.
fn interleave_fields(frame_entries: &[RefEntry], dpb: &Dpb, structure: PictureStructure) -> Vec<RefEntry> {
    let first = structure;
    let second = structure.opposite();
    let mut out = Vec::with_capacity(frame_entries.len() * 2);
    let mut want = first;
    let mut taken = vec![[false; 2]; frame_entries.len()];

    // Walk the frame list repeatedly, taking the next untaken field of the
    // wanted parity; fall back to the other parity when none remains.
    loop {
        let mut advanced = false;
        for (i, entry) in frame_entries.iter().enumerate() {
            let slot = (want == second) as usize;
            if taken[i][slot] {
                continue;
            }
            let structure = want;
            let field = RefPicHandle {
                store: entry.handle.store,
                structure,
            };
            if dpb.picture(field).is_none() {
                taken[i][slot] = true;
                continue;
            }
            taken[i][slot] = true;
            let mut field_entry = *entry;
            field_entry.handle = field;
            field_entry.pic_num = 2 * entry.pic_num + 1;
            out.push(field_entry);
            want = if want == first { second } else { first };
            advanced = true;
            break;
        }
        if !advanced {
            let any_left = taken.iter().any(|t| !t[0] || !t[1]);
            if !any_left {
                break;
            }
            want = if want == first { second } else { first };
            if !taken
                .iter()
                .any(|t| !t[(want == second) as usize])
            {
                break;
            }
        }
    }
    out
}

/// Initialize the lists for a P/SP slice.
pub fn init_lists_p(dpb: &Dpb, header: &SliceHeader, sps: &Sps) -> RefLists {
    let mut short = short_term_entries(dpb, header, sps);
    short.sort_by(|a, b| b.pic_num.cmp(&a.pic_num));
    let mut l0 = short;
    l0.extend(long_term_entries(dpb));

    if header.field_pic_flag {
        l0 = interleave_fields(&l0, dpb, header.structure());
    }
    RefLists { l0, l1: Vec::new() }
}

/// Initialize the lists for a B slice from the POC split.
pub fn init_lists_b(dpb: &Dpb, header: &SliceHeader, sps: &Sps, curr_poc: i32) -> RefLists {
    let short = short_term_entries(dpb, header, sps);
    let long = long_term_entries(dpb);

    let mut before: Vec<RefEntry> = short.iter().copied().filter(|e| e.poc <= curr_poc).collect();
    let mut after: Vec<RefEntry> = short.iter().copied().filter(|e| e.poc > curr_poc).collect();
    before.sort_by(|a, b| b.poc.cmp(&a.poc));
    after.sort_by(|a, b| a.poc.cmp(&b.poc));

    let mut l0 = before.clone();
    l0.extend(after.iter().copied());
    l0.extend(long.iter().copied());

    let mut l1 = after;
    l1.extend(before.into_iter());
    l1.extend(long.into_iter());

    // With identical lists of two or more entries, the first two of L1 swap.
    if l1.len() > 1 && lists_equal(&l0, &l1) {
        l1.swap(0, 1);
    }

    let mut lists = RefLists { l0, l1 };
    if header.field_pic_flag {
        lists.l0 = interleave_fields(&lists.l0, dpb, header.structure());
        lists.l1 = interleave_fields(&lists.l1, dpb, header.structure());
    }
    lists
}

fn lists_equal(a: &[RefEntry], b: &[RefEntry]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.id == y.id)
}

/// Apply one list's modification operations (8.2.4.3): each operation moves
/// the named picture to the running index and rotates the tail.
fn apply_modifications(
    list: &mut Vec<RefEntry>,
    ops: &[RefListModOp],
    header: &SliceHeader,
    sps: &Sps,
    inter_view: &[RefEntry],
) -> Result<()> {
    let max_pic_num = header.max_pic_num(sps) as i32;
    let curr_pic_num = header.curr_pic_num(sps) as i32;
    let mut pic_num_pred = curr_pic_num;
    let mut view_idx_pred = -1i32;
    let mut ref_idx = 0usize;

    if list.len() > 33 {
        list.truncate(33);
    }

    for op in ops {
        let target = match *op {
            RefListModOp::ShortTermSubtract {
                abs_diff_pic_num_minus1,
            }
            | RefListModOp::ShortTermAdd {
                abs_diff_pic_num_minus1,
            } => {
                let diff = abs_diff_pic_num_minus1 as i32 + 1;
                let mut pred = match op {
                    RefListModOp::ShortTermSubtract { .. } => pic_num_pred - diff,
                    _ => pic_num_pred + diff,
                };
                if pred < 0 {
                    pred += max_pic_num;
                } else if pred >= max_pic_num {
                    pred -= max_pic_num;
                }
                pic_num_pred = pred;
                let pic_num = if pred > curr_pic_num {
                    pred - max_pic_num
                } else {
                    pred
                };
                list.iter()
                    .position(|e| !e.long_term && !e.inter_view && e.pic_num == pic_num)
            }
            RefListModOp::LongTerm { long_term_pic_num } => list
                .iter()
                .position(|e| e.long_term && e.pic_num == long_term_pic_num as i32),
            RefListModOp::ViewSubtract {
                abs_diff_view_idx_minus1,
            } => {
                let diff = abs_diff_view_idx_minus1 as i32 + 1;
                view_idx_pred -= diff;
                let idx = view_idx_pred.rem_euclid(inter_view.len().max(1) as i32) as usize;
                push_inter_view(list, inter_view, idx)
            }
            RefListModOp::ViewAdd {
                abs_diff_view_idx_minus1,
            } => {
                let diff = abs_diff_view_idx_minus1 as i32 + 1;
                view_idx_pred += diff;
                let idx = view_idx_pred.rem_euclid(inter_view.len().max(1) as i32) as usize;
                push_inter_view(list, inter_view, idx)
            }
        };

        let Some(pos) = target else {
            return Err(DecodeError::SyntaxViolation(
                "ref_pic_list_modification names an absent picture".to_string(),
            ));
        };

        // Move entry `pos` to `ref_idx`, rotating the tail right.
        if pos >= ref_idx {
            let entry = list.remove(pos);
            list.insert(ref_idx, entry);
        } else {
            let entry = list[pos];
            list.insert(ref_idx.min(list.len()), entry);
        }
        ref_idx += 1;
    }

    Ok(())
}

fn push_inter_view(
    list: &mut Vec<RefEntry>,
    inter_view: &[RefEntry],
    idx: usize,
) -> Option<usize> {
    let entry = inter_view.get(idx)?;
    if let Some(pos) = list.iter().position(|e| e.inter_view && e.id == entry.id) {
        Some(pos)
    } else {
        list.push(*entry);
        Some(list.len() - 1)
    }
}

/// Build the final lists for a slice: initialization, MVC inter-view append,
/// modification, and truncation to the active counts.
pub fn build_ref_lists(
    dpb: &Dpb,
    base_layer: Option<&Dpb>,
    header: &SliceHeader,
    sps: &Sps,
    curr_poc: i32,
) -> Result<RefLists> {
    let mut lists = if header.slice_type.is_b() {
        init_lists_b(dpb, header, sps, curr_poc)
    } else if header.slice_type.is_p() {
        init_lists_p(dpb, header, sps)
    } else {
        RefLists::default()
    };

    // MVC: same-POC base-layer pictures with inter_view_flag append after the
    // intra-view entries.
    let mut inter_view_entries = Vec::new();
    if let Some(base) = base_layer {
        for handle in base.inter_view_refs(curr_poc) {
            if let Some(pic) = base.picture(handle) {
                inter_view_entries.push(RefEntry {
                    handle,
                    id: pic.id,
                    poc: pic.poc,
                    pic_num: pic.pic_num,
                    long_term: false,
                    non_existing: false,
                    inter_view: true,
                });
            }
        }
        if !header.slice_type.is_intra() {
            lists.l0.extend(inter_view_entries.iter().copied());
            if header.slice_type.is_b() {
                lists.l1.extend(inter_view_entries.iter().copied());
            }
        }
    }

    let (active_l0, active_l1) = header.active_refs();
    if !header.slice_type.is_intra() {
        apply_modifications(
            &mut lists.l0,
            &header.ref_pic_list_modification_l0,
            header,
            sps,
            &inter_view_entries,
        )?;
    }
    if header.slice_type.is_b() {
        apply_modifications(
            &mut lists.l1,
            &header.ref_pic_list_modification_l1,
            header,
            sps,
            &inter_view_entries,
        )?;
    }

    // Truncate to the active sizes; a short list repeats its tail entry so
    // that every index below num_ref_idx_active resolves.
    finalize(&mut lists.l0, active_l0)?;
    finalize(&mut lists.l1, active_l1)?;

    trace!(
        l0 = lists.l0.len(),
        l1 = lists.l1.len(),
        "reference lists built"
    );
    Ok(lists)
}

fn finalize(list: &mut Vec<RefEntry>, active: usize) -> Result<()> {
    if active == 0 {
        list.clear();
        return Ok(());
    }
    if list.is_empty() {
        return Err(DecodeError::SliceLoss(
            "no reference pictures available for an inter slice".to_string(),
        ));
    }
    while list.len() < active {
        let last = *list.last().unwrap();
        list.push(last);
    }
    list.truncate(active);
    Ok(())
}

/// Effective prediction weights for one slice.
#[derive(Debug, Clone)]
pub struct WeightTables {
    pub luma_log2_denom: u8,
    pub chroma_log2_denom: u8,
    pub explicit: bool,
    pub l0: Vec<WeightEntry>,
    pub l1: Vec<WeightEntry>,
    /// Implicit bi-prediction weights per (l0 idx, l1 idx): (w0, w1).
    pub implicit: Vec<Vec<(i32, i32)>>,
}

impl WeightTables {
    /// Unweighted defaults.
    pub fn identity(l0: usize, l1: usize) -> Self {
        Self {
            luma_log2_denom: 0,
            chroma_log2_denom: 0,
            explicit: false,
            l0: vec![WeightEntry::default_for(0, 0); l0],
            l1: vec![WeightEntry::default_for(0, 0); l1],
            implicit: Vec::new(),
        }
    }

    /// Build from the slice header and lists: explicit tables when signalled,
    /// implicit POC-distance weights for weighted_bipred_idc 2.
    pub fn build(header: &SliceHeader, lists: &RefLists, weighted_bipred_idc: u8, curr_poc: i32) -> Self {
        if let Some(table) = header.pred_weight_table.as_ref() {
            let mut wt = Self {
                luma_log2_denom: table.luma_log2_weight_denom,
                chroma_log2_denom: table.chroma_log2_weight_denom,
                explicit: true,
                l0: table.l0.clone(),
                l1: table.l1.clone(),
                implicit: Vec::new(),
            };
            // Lists padded by finalize() reuse the last signalled weights.
            while wt.l0.len() < lists.l0.len() {
                wt.l0.push(
                    wt.l0
                        .last()
                        .copied()
                        .unwrap_or(WeightEntry::default_for(wt.luma_log2_denom, wt.chroma_log2_denom)),
                );
            }
            while wt.l1.len() < lists.l1.len() {
                wt.l1.push(
                    wt.l1
                        .last()
                        .copied()
                        .unwrap_or(WeightEntry::default_for(wt.luma_log2_denom, wt.chroma_log2_denom)),
                );
            }
            return wt;
        }

        if weighted_bipred_idc == 2 && header.slice_type.is_b() {
            // Implicit weights from the POC distance ratio (8.4.2.3.1).
            let mut implicit = Vec::with_capacity(lists.l0.len());
            for e0 in &lists.l0 {
                let mut row = Vec::with_capacity(lists.l1.len());
                for e1 in &lists.l1 {
                    let tb = (curr_poc - e0.poc).clamp(-128, 127);
                    let td = (e1.poc - e0.poc).clamp(-128, 127);
                    let (w0, w1) = if td == 0 || e0.long_term || e1.long_term {
                        (32, 32)
                    } else {
                        let tx = (16384 + (td / 2).abs()) / td;
                        let dsf = ((tb * tx + 32) >> 6).clamp(-1024, 1023);
                        if dsf >> 2 < -64 || dsf >> 2 > 128 {
                            (32, 32)
                        } else {
                            let w1 = dsf >> 2;
                            if w1 < -64 || w1 > 128 {
                                (32, 32)
                            } else {
                                (64 - w1, w1)
                            }
                        }
                    };
                    row.push((w0, w1));
                }
                implicit.push(row);
            }
            let mut wt = Self::identity(lists.l0.len(), lists.l1.len());
            wt.luma_log2_denom = 5;
            wt.chroma_log2_denom = 5;
            wt.implicit = implicit;
            return wt;
        }

        Self::identity(lists.l0.len(), lists.l1.len())
    }
}

/// Temporal-direct distance scale factors per L0 reference (8.4.1.2.3).
pub fn temporal_direct_scales(lists: &RefLists, curr_poc: i32) -> Vec<i32> {
    let Some(col) = lists.l1.first() else {
        return Vec::new();
    };
    lists
        .l0
        .iter()
        .map(|e0| {
            let tb = (curr_poc - e0.poc).clamp(-128, 127);
            let td = (col.poc - e0.poc).clamp(-128, 127);
            if td == 0 || e0.long_term {
                9999
            } else {
                let tx = (16384 + (td / 2).abs()) / td;
                ((tb * tx + 32) >> 6).clamp(-1024, 1023)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::Picture;
    use crate::slice::{DecRefPicMarking, MmcoOp, SliceType};
    use crate::testutil::baseline_sps;

    fn header(slice_type: SliceType, frame_num: u32, active_l0: u32) -> SliceHeader {
        SliceHeader {
            first_mb_in_slice: 0,
            slice_type,
            pic_parameter_set_id: 0,
            colour_plane_id: 0,
            frame_num,
            field_pic_flag: false,
            bottom_field_flag: false,
            idr_pic_id: 0,
            pic_order_cnt_lsb: 0,
            delta_pic_order_cnt_bottom: 0,
            delta_pic_order_cnt: [0; 2],
            redundant_pic_cnt: 0,
            direct_spatial_mv_pred_flag: false,
            num_ref_idx_active_override_flag: true,
            num_ref_idx_l0_active_minus1: active_l0.saturating_sub(1),
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
            idr_flag: false,
            nal_ref_idc: 3,
            nal_unit_type: 1,
            view_id: 0,
            inter_view_flag: false,
            anchor_pic_flag: false,
        }
    }

    fn dpb_with_frames(frames: &[(u32, i32)]) -> Dpb {
        let mut sps = baseline_sps(1, 1);
        sps.max_num_ref_frames = 16;
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;
        for &(frame_num, poc) in frames {
            let mut pic = Picture::alloc(next_id, &sps, PictureStructure::Frame);
            next_id += 1;
            pic.frame_num = frame_num;
            pic.pic_num = frame_num as i32;
            pic.used_for_reference = true;
            pic.poc = poc;
            pic.top_poc = poc;
            pic.bottom_poc = poc;
            pic.frame_poc = poc;
            let mut outputs = Vec::new();
            dpb.store_picture(pic, &DecRefPicMarking::default(), &mut outputs, &mut next_id)
                .unwrap();
        }
        dpb
    }

    #[test]
    fn test_p_list_orders_by_decreasing_pic_num() {
        let sps = baseline_sps(1, 1);
        let dpb = dpb_with_frames(&[(0, 0), (1, 2), (2, 4)]);
        let h = header(SliceType::P, 3, 3);
        let lists = build_ref_lists(&dpb, None, &h, &sps, 6).unwrap();
        let nums: Vec<i32> = lists.l0.iter().map(|e| e.pic_num).collect();
        assert_eq!(nums, vec![2, 1, 0]);
        assert!(lists.l1.is_empty());
    }

    #[test]
    fn test_long_term_after_short_term() {
        // Scenario: after MMCO marks frame 0 long-term idx 0, a P slice's L0
        // lists short-term entries first, then LongTermPicNum 0.
        let mut sps = baseline_sps(1, 1);
        sps.max_num_ref_frames = 16;
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;
        for (frame_num, poc) in [(0u32, 0i32), (1, 2)] {
            let mut pic = Picture::alloc(next_id, &sps, PictureStructure::Frame);
            next_id += 1;
            pic.frame_num = frame_num;
            pic.used_for_reference = true;
            pic.poc = poc;
            pic.frame_poc = poc;
            let mut outputs = Vec::new();
            dpb.store_picture(pic, &DecRefPicMarking::default(), &mut outputs, &mut next_id)
                .unwrap();
        }
        // Third reference frame carries MMCO {3: diff 1 -> pic_num 0, idx 0}.
        let mut pic = Picture::alloc(next_id, &sps, PictureStructure::Frame);
        next_id += 1;
        pic.frame_num = 2;
        pic.used_for_reference = true;
        pic.poc = 4;
        pic.frame_poc = 4;
        let marking = DecRefPicMarking {
            adaptive_ref_pic_marking_mode_flag: true,
            mmco_ops: vec![MmcoOp::ShortTermToLongTerm {
                difference_of_pic_nums_minus1: 1,
                long_term_frame_idx: 0,
            }],
            ..Default::default()
        };
        let mut outputs = Vec::new();
        dpb.store_picture(pic, &marking, &mut outputs, &mut next_id)
            .unwrap();

        let h = header(SliceType::P, 3, 3);
        let lists = build_ref_lists(&dpb, None, &h, &sps, 6).unwrap();
        assert_eq!(lists.l0.len(), 3);
        assert!(!lists.l0[0].long_term);
        assert!(!lists.l0[1].long_term);
        assert!(lists.l0[2].long_term);
        assert_eq!(lists.l0[2].pic_num, 0);
    }

    #[test]
    fn test_b_list_poc_split() {
        let sps = baseline_sps(1, 1);
        let dpb = dpb_with_frames(&[(0, 0), (1, 4), (2, 8)]);
        let mut h = header(SliceType::B, 3, 2);
        h.num_ref_idx_l1_active_minus1 = 1;
        // Current POC 6 sits between 4 and 8.
        let lists = build_ref_lists(&dpb, None, &h, &sps, 6).unwrap();
        let l0_pocs: Vec<i32> = lists.l0.iter().map(|e| e.poc).collect();
        let l1_pocs: Vec<i32> = lists.l1.iter().map(|e| e.poc).collect();
        assert_eq!(l0_pocs, vec![4, 0]);
        assert_eq!(l1_pocs, vec![8, 4]);
    }

    #[test]
    fn test_modification_moves_picture_to_front() {
        let sps = baseline_sps(1, 1);
        let dpb = dpb_with_frames(&[(0, 0), (1, 2), (2, 4)]);
        let mut h = header(SliceType::P, 3, 3);
        // abs_diff_pic_num_minus1 = 2 names pic_num 0.
        h.ref_pic_list_modification_l0 = vec![RefListModOp::ShortTermSubtract {
            abs_diff_pic_num_minus1: 2,
        }];
        let lists = build_ref_lists(&dpb, None, &h, &sps, 6).unwrap();
        let nums: Vec<i32> = lists.l0.iter().map(|e| e.pic_num).collect();
        assert_eq!(nums, vec![0, 2, 1]);
    }

    #[test]
    fn test_no_duplicates_within_active_range() {
        let sps = baseline_sps(1, 1);
        let dpb = dpb_with_frames(&[(0, 0), (1, 2), (2, 4)]);
        let h = header(SliceType::P, 3, 3);
        let lists = build_ref_lists(&dpb, None, &h, &sps, 6).unwrap();
        let mut ids: Vec<i64> = lists.l0.iter().map(|e| e.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), lists.l0.len());
    }

    #[test]
    fn test_temporal_scales_clamped() {
        let sps = baseline_sps(1, 1);
        let dpb = dpb_with_frames(&[(0, 0), (1, 8)]);
        let mut h = header(SliceType::B, 2, 1);
        h.num_ref_idx_l1_active_minus1 = 0;
        let lists = build_ref_lists(&dpb, None, &h, &sps, 4).unwrap();
        let scales = temporal_direct_scales(&lists, 4);
        assert_eq!(scales.len(), lists.l0.len());
        for s in scales {
            assert!(s == 9999 || (-1024..=1023).contains(&s));
        }
    }
}

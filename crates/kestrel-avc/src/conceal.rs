//! Error concealment hook: the decoder tracks which macroblocks were
//! received and hands the rest to a pluggable policy (frame copy / motion
//! copy by default).

use crate::dpb::{Dpb, RefPicHandle};
use crate::macroblock::Macroblock;
use crate::picture::{Picture, PictureStructure};
use tracing::warn;

/// One contiguous run of macroblocks with the same received/lost state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub first_mb: u32,
    pub last_mb: u32,
    pub lost: bool,
}

/// Split the picture's MB map into received/lost segments, in decoding
/// order.
pub fn segment_mb_map(mbs: &[Macroblock]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0u32;
    let mut lost = mbs.first().map(|mb| !mb.is_decoded()).unwrap_or(false);
    for (i, mb) in mbs.iter().enumerate().skip(1) {
        let mb_lost = !mb.is_decoded();
        if mb_lost != lost {
            segments.push(Segment {
                first_mb: start,
                last_mb: i as u32 - 1,
                lost,
            });
            start = i as u32;
            lost = mb_lost;
        }
    }
    if !mbs.is_empty() {
        segments.push(Segment {
            first_mb: start,
            last_mb: mbs.len() as u32 - 1,
            lost,
        });
    }
    segments
}

/// The concealment policy invoked on slice loss. Implementations write
/// whatever samples they choose for the lost macroblocks; the core then
/// proceeds to deblocking with the result.
pub trait Concealment {
    /// Conceal the lost MBs of `pic`. `mbs` is the per-MB receive state and
    /// `dpb` offers candidate reference pictures. Returns true when any
    /// sample was written.
    fn conceal(&mut self, pic: &mut Picture, mbs: &mut [Macroblock], dpb: &Dpb) -> bool;
}

/// Built-in policy: copy co-located samples from the nearest reference
/// picture (frame copy); on an empty DPB fill lost regions with mid-grey.
#[derive(Debug, Default)]
pub struct FrameCopyConcealment;

impl FrameCopyConcealment {
    fn nearest_reference<'a>(&self, pic: &Picture, dpb: &'a Dpb) -> Option<&'a Picture> {
        let mut best: Option<(&Picture, i32)> = None;
        for (idx, fs) in dpb.stores().iter().enumerate() {
            if !fs.is_complete() || fs.non_existing {
                continue;
            }
            let handle = RefPicHandle {
                store: idx,
                structure: PictureStructure::Frame,
            };
            if let Some(candidate) = dpb.picture(handle) {
                let dist = (candidate.poc - pic.poc).abs();
                if best.map(|(_, d)| dist < d).unwrap_or(true) {
                    best = Some((candidate, dist));
                }
            }
        }
        best.map(|(p, _)| p)
    }
}

impl Concealment for FrameCopyConcealment {
    fn conceal(&mut self, pic: &mut Picture, mbs: &mut [Macroblock], dpb: &Dpb) -> bool {
        let segments = segment_mb_map(mbs);
        if segments.iter().all(|s| !s.lost) {
            return false;
        }
        warn!(
            poc = pic.poc,
            lost = segments.iter().filter(|s| s.lost).count(),
            "concealing lost macroblock segments"
        );

        let source = self.nearest_reference(pic, dpb).cloned();
        let mid_luma = 1u16 << (pic.bit_depth_luma - 1);
        let mid_chroma = 1u16 << (pic.bit_depth_chroma - 1);
        let (sub_x, sub_y) = match pic.chroma.as_ref() {
            Some(c) => (pic.luma.width / c[0].width, pic.luma.height / c[0].height),
            None => (1, 1),
        };

        for mb in mbs.iter_mut().filter(|mb| !mb.is_decoded()) {
            let x0 = mb.mb_x as usize * 16;
            let y0 = mb.mb_y as usize * 16;
            for j in 0..16 {
                for i in 0..16 {
                    let v = source
                        .as_ref()
                        .map(|s| s.luma.fetch((x0 + i) as i32, (y0 + j) as i32))
                        .unwrap_or(mid_luma);
                    pic.luma.set(x0 + i, y0 + j, v);
                }
            }
            if let Some(chroma) = pic.chroma.as_mut() {
                let cw = 16 / sub_x;
                let ch = 16 / sub_y;
                let cx0 = x0 / sub_x;
                let cy0 = y0 / sub_y;
                for (c, plane) in chroma.iter_mut().enumerate() {
                    for j in 0..ch {
                        for i in 0..cw {
                            let v = source
                                .as_ref()
                                .and_then(|s| {
                                    s.chroma
                                        .as_ref()
                                        .map(|sc| sc[c].fetch((cx0 + i) as i32, (cy0 + j) as i32))
                                })
                                .unwrap_or(mid_chroma);
                            plane.set(cx0 + i, cy0 + j, v);
                        }
                    }
                }
            }
            // Concealed MBs join a synthetic slice so deblocking can run.
            mb.slice_nr = i32::MAX - 1;
            mb.qp = pic.qp;
        }

        pic.concealed = true;
        true
    }
}

/// Disabled concealment: lost MBs keep their zeroed samples; the picture is
/// still flagged.
#[derive(Debug, Default)]
pub struct NoConcealment;

impl Concealment for NoConcealment {
    fn conceal(&mut self, pic: &mut Picture, mbs: &mut [Macroblock], _dpb: &Dpb) -> bool {
        if mbs.iter().any(|mb| !mb.is_decoded()) {
            pic.concealed = true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::DecRefPicMarking;
    use crate::testutil::baseline_sps;

    #[test]
    fn test_segment_map() {
        let mut mbs: Vec<Macroblock> = (0..6).map(|a| Macroblock::new(a, 3)).collect();
        mbs[0].slice_nr = 0;
        mbs[1].slice_nr = 0;
        // 2..4 lost
        mbs[4].slice_nr = 1;
        mbs[5].slice_nr = 1;
        let segments = segment_mb_map(&mbs);
        assert_eq!(
            segments,
            vec![
                Segment { first_mb: 0, last_mb: 1, lost: false },
                Segment { first_mb: 2, last_mb: 3, lost: true },
                Segment { first_mb: 4, last_mb: 5, lost: false },
            ]
        );
    }

    #[test]
    fn test_frame_copy_from_reference() {
        let sps = baseline_sps(2, 1);
        let mut dpb = Dpb::new(0);
        dpb.init(&sps);
        let mut next_id = 0i64;

        let mut reference = Picture::alloc(0, &sps, PictureStructure::Frame);
        reference.luma.fill(150);
        if let Some(c) = reference.chroma.as_mut() {
            c[0].fill(90);
            c[1].fill(60);
        }
        reference.used_for_reference = true;
        let mut outputs = Vec::new();
        dpb.store_picture(reference, &DecRefPicMarking::default(), &mut outputs, &mut next_id)
            .unwrap();

        let mut pic = Picture::alloc(1, &sps, PictureStructure::Frame);
        let mut mbs: Vec<Macroblock> = (0..2).map(|a| Macroblock::new(a, 2)).collect();
        mbs[0].slice_nr = 0; // first MB received, second lost

        let mut policy = FrameCopyConcealment;
        assert!(policy.conceal(&mut pic, &mut mbs, &dpb));
        assert!(pic.concealed);
        // The lost MB copied the reference samples.
        assert_eq!(pic.luma.get(16, 0), 150);
        assert_eq!(pic.chroma.as_ref().unwrap()[0].get(8, 0), 90);
        // The received MB was left alone.
        assert_eq!(pic.luma.get(0, 0), 0);
        assert!(mbs[1].is_decoded());
    }

    #[test]
    fn test_no_concealment_flags_only() {
        let sps = baseline_sps(1, 1);
        let dpb = Dpb::new(0);
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        let mut mbs = vec![Macroblock::new(0, 1)];
        let mut policy = NoConcealment;
        assert!(!policy.conceal(&mut pic, &mut mbs, &dpb));
        assert!(pic.concealed);
        assert_eq!(pic.luma.get(0, 0), 0);
    }
}

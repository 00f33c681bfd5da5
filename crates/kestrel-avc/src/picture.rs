//! Decoded picture storage: sample planes, per-block motion state, and the
//! frame store pairing fields with frames.

use crate::slice::SliceType;
use crate::sps::{ChromaFormat, Sps};

/// Reference-buffer margins for motion compensation reads.
pub const LUMA_PAD_X: usize = 32;
pub const LUMA_PAD_Y: usize = 20;
pub const CHROMA_PAD_X: usize = 16;
pub const CHROMA_PAD_Y: usize = 10;

/// Picture structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PictureStructure {
    Frame,
    TopField,
    BottomField,
}

impl PictureStructure {
    pub fn is_field(&self) -> bool {
        !matches!(self, PictureStructure::Frame)
    }

    pub fn opposite(&self) -> PictureStructure {
        match self {
            PictureStructure::TopField => PictureStructure::BottomField,
            PictureStructure::BottomField => PictureStructure::TopField,
            PictureStructure::Frame => PictureStructure::Frame,
        }
    }
}

/// A quarter-pel motion vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    pub x: i16,
    pub y: i16,
}

impl MotionVector {
    pub const ZERO: MotionVector = MotionVector { x: 0, y: 0 };

    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for MotionVector {
    type Output = MotionVector;
    fn add(self, rhs: MotionVector) -> MotionVector {
        MotionVector {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

/// Per-4x4-block motion state on a decoded picture.
#[derive(Debug, Clone, Copy)]
pub struct MvInfo {
    pub mv: [MotionVector; 2],
    /// Reference index per list; -1 when the list is unused.
    pub ref_idx: [i8; 2],
    /// Unique id of the referenced picture per list; -1 when unused.
    pub ref_id: [i64; 2],
    /// POC of the referenced picture, for temporal direct scaling.
    pub ref_poc: [i32; 2],
    /// Long-term flag of the reference per list.
    pub long_term: [bool; 2],
}

impl Default for MvInfo {
    fn default() -> Self {
        Self {
            mv: [MotionVector::ZERO; 2],
            ref_idx: [-1; 2],
            ref_id: [-1; 2],
            ref_poc: [0; 2],
            long_term: [false; 2],
        }
    }
}

/// One sample plane with edge margins for motion compensation.
#[derive(Debug, Clone)]
pub struct Plane {
    data: Vec<u16>,
    pub width: usize,
    pub height: usize,
    stride: usize,
    pad_x: usize,
    pad_y: usize,
}

impl Plane {
    pub fn new(width: usize, height: usize, pad_x: usize, pad_y: usize) -> Self {
        let stride = width + 2 * pad_x;
        Self {
            data: vec![0; stride * (height + 2 * pad_y)],
            width,
            height,
            stride,
            pad_x,
            pad_y,
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y + self.pad_y) * self.stride + x + self.pad_x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u16) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Clamped fetch: coordinates outside the picture replicate the edge,
    /// matching the padded reference semantics.
    #[inline]
    pub fn fetch(&self, x: i32, y: i32) -> u16 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.get(x, y)
    }

    pub fn fill(&mut self, value: u16) {
        self.data.fill(value);
    }

    /// Replicate the picture edges into the margins.
    pub fn pad(&mut self) {
        for y in 0..self.height {
            let left = self.get(0, y);
            let right = self.get(self.width - 1, y);
            for x in 0..self.pad_x {
                let row = (y + self.pad_y) * self.stride;
                self.data[row + x] = left;
                self.data[row + self.pad_x + self.width + x] = right;
            }
        }
        let top_row = self.pad_y * self.stride;
        let bottom_row = (self.pad_y + self.height - 1) * self.stride;
        for y in 0..self.pad_y {
            let (above, below) = {
                let dst_above = y * self.stride;
                let dst_below = (self.pad_y + self.height + y) * self.stride;
                (dst_above, dst_below)
            };
            self.data.copy_within(top_row..top_row + self.stride, above);
            self.data
                .copy_within(bottom_row..bottom_row + self.stride, below);
        }
    }

    /// Copy one row into a caller buffer (cropped output path).
    pub fn copy_row(&self, y: usize, x0: usize, out: &mut [u16]) {
        let start = self.index(x0, y);
        out.copy_from_slice(&self.data[start..start + out.len()]);
    }
}

/// A decodable/decoded picture: a frame or a single field.
#[derive(Debug, Clone)]
pub struct Picture {
    /// Unique id within the decoder instance.
    pub id: i64,
    pub structure: PictureStructure,
    pub luma: Plane,
    pub chroma: Option<[Plane; 2]>,

    /// Per-4x4 motion state, `(width/4) * (height/4)` entries row-major.
    pub mv_info: Vec<MvInfo>,
    /// Per-MB field decoding flags (MBAFF frames).
    pub mb_field_flags: Vec<bool>,

    pub top_poc: i32,
    pub bottom_poc: i32,
    pub frame_poc: i32,
    pub poc: i32,

    pub frame_num: u32,
    pub pic_num: i32,
    pub long_term_pic_num: i32,
    pub long_term_frame_idx: i32,

    pub coded_frame: bool,
    pub mb_aff_frame_flag: bool,
    pub used_for_reference: bool,
    pub is_long_term: bool,
    pub non_existing: bool,
    pub idr_flag: bool,
    pub concealed: bool,

    pub slice_type: SliceType,
    pub chroma_format: ChromaFormat,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,

    pub frame_cropping_flag: bool,
    pub crop: [u32; 4],

    pub view_id: u16,
    pub inter_view_flag: bool,
    pub anchor_pic_flag: bool,
    pub layer_id: u8,

    /// Tone-mapping LUT carried over from the SEI, applied by the output
    /// writer.
    pub tone_mapping_lut: Option<Vec<u16>>,

    pub qp: i32,
    pub slice_qp_delta: i32,
    pub chroma_qp_offset: [i32; 2],
}

impl Picture {
    /// Allocate a picture sized for the active SPS and the given structure.
    pub fn alloc(id: i64, sps: &Sps, structure: PictureStructure) -> Self {
        let field = structure.is_field();
        let width = sps.pic_width() as usize;
        let height = sps.pic_height() as usize / if field { 2 } else { 1 };
        let chroma = if sps.chroma_array_type() != 0 {
            let width_cr = sps.pic_width_c() as usize;
            let height_cr = sps.pic_height_c() as usize / if field { 2 } else { 1 };
            let (pad_x, pad_y) = match sps.chroma_format_idc {
                ChromaFormat::Yuv444 => (LUMA_PAD_X, LUMA_PAD_Y),
                ChromaFormat::Yuv422 => (CHROMA_PAD_X, CHROMA_PAD_Y * 2),
                _ => (CHROMA_PAD_X, CHROMA_PAD_Y),
            };
            Some([
                Plane::new(width_cr, height_cr, pad_x, pad_y),
                Plane::new(width_cr, height_cr, pad_x, pad_y),
            ])
        } else {
            None
        };

        let blocks = (width / 4) * (height / 4);
        let mbs = (width / 16) * (height / 16);

        Self {
            id,
            structure,
            luma: Plane::new(width, height, LUMA_PAD_X, LUMA_PAD_Y),
            chroma,
            mv_info: vec![MvInfo::default(); blocks],
            mb_field_flags: vec![false; mbs],
            top_poc: 0,
            bottom_poc: 0,
            frame_poc: 0,
            poc: 0,
            frame_num: 0,
            pic_num: 0,
            long_term_pic_num: 0,
            long_term_frame_idx: -1,
            coded_frame: !field,
            mb_aff_frame_flag: false,
            used_for_reference: false,
            is_long_term: false,
            non_existing: false,
            idr_flag: false,
            concealed: false,
            slice_type: SliceType::I,
            chroma_format: sps.chroma_format_idc,
            bit_depth_luma: sps.bit_depth_luma(),
            bit_depth_chroma: sps.bit_depth_chroma(),
            frame_cropping_flag: sps.frame_cropping_flag,
            crop: [
                sps.frame_crop_left_offset,
                sps.frame_crop_right_offset,
                sps.frame_crop_top_offset,
                sps.frame_crop_bottom_offset,
            ],
            view_id: 0,
            inter_view_flag: false,
            anchor_pic_flag: false,
            layer_id: 0,
            tone_mapping_lut: None,
            qp: 0,
            slice_qp_delta: 0,
            chroma_qp_offset: [0; 2],
        }
    }

    pub fn width(&self) -> usize {
        self.luma.width
    }

    pub fn height(&self) -> usize {
        self.luma.height
    }

    pub fn blocks_per_row(&self) -> usize {
        self.width() / 4
    }

    #[inline]
    pub fn mv_info_at(&self, bx: usize, by: usize) -> &MvInfo {
        &self.mv_info[by * self.blocks_per_row() + bx]
    }

    #[inline]
    pub fn mv_info_at_mut(&mut self, bx: usize, by: usize) -> &mut MvInfo {
        let row = self.blocks_per_row();
        &mut self.mv_info[by * row + bx]
    }

    /// Edge-pad all planes (reference pictures only).
    pub fn pad(&mut self) {
        self.luma.pad();
        if let Some(chroma) = self.chroma.as_mut() {
            chroma[0].pad();
            chroma[1].pad();
        }
    }

    /// Extract one parity's rows as a field picture.
    pub fn split_field(&self, structure: PictureStructure, id: i64) -> Picture {
        debug_assert!(self.structure == PictureStructure::Frame);
        let offset = (structure == PictureStructure::BottomField) as usize;

        let mut field = self.clone();
        field.id = id;
        field.structure = structure;
        field.coded_frame = false;

        field.luma = Plane::new(self.luma.width, self.luma.height / 2, LUMA_PAD_X, LUMA_PAD_Y);
        for y in 0..field.luma.height {
            for x in 0..field.luma.width {
                field.luma.set(x, y, self.luma.get(x, 2 * y + offset));
            }
        }
        if let Some(src) = self.chroma.as_ref() {
            let dst = field.chroma.as_mut().unwrap();
            for c in 0..2 {
                dst[c] = Plane::new(src[c].width, src[c].height / 2, CHROMA_PAD_X, CHROMA_PAD_Y);
                for y in 0..dst[c].height {
                    for x in 0..dst[c].width {
                        dst[c].set(x, y, src[c].get(x, 2 * y + offset));
                    }
                }
            }
        }

        // Subsample motion: field block row j comes from frame block row
        // 2j + parity, with vertical vectors halved.
        let bpr = self.blocks_per_row();
        let field_rows = (self.height() / 4) / 2;
        let mut mv_info = Vec::with_capacity(bpr * field_rows);
        for j in 0..field_rows {
            for i in 0..bpr {
                let mut info = self.mv_info[(2 * j + offset) * bpr + i];
                for list in 0..2 {
                    info.mv[list].y /= 2;
                }
                mv_info.push(info);
            }
        }
        field.mv_info = mv_info;
        field.poc = if structure == PictureStructure::TopField {
            self.top_poc
        } else {
            self.bottom_poc
        };
        field
    }

    /// Interleave two fields into a frame picture.
    pub fn combine_fields(top: &Picture, bottom: &Picture, id: i64) -> Picture {
        debug_assert!(top.structure == PictureStructure::TopField);
        debug_assert!(bottom.structure == PictureStructure::BottomField);

        let mut frame = top.clone();
        frame.id = id;
        frame.structure = PictureStructure::Frame;
        frame.coded_frame = false;
        frame.luma = Plane::new(top.luma.width, top.luma.height * 2, LUMA_PAD_X, LUMA_PAD_Y);
        for y in 0..top.luma.height {
            for x in 0..top.luma.width {
                frame.luma.set(x, 2 * y, top.luma.get(x, y));
                frame.luma.set(x, 2 * y + 1, bottom.luma.get(x, y));
            }
        }
        if let (Some(tc), Some(bc)) = (top.chroma.as_ref(), bottom.chroma.as_ref()) {
            let fc = frame.chroma.as_mut().unwrap();
            for c in 0..2 {
                fc[c] = Plane::new(tc[c].width, tc[c].height * 2, CHROMA_PAD_X, CHROMA_PAD_Y);
                for y in 0..tc[c].height {
                    for x in 0..tc[c].width {
                        fc[c].set(x, 2 * y, tc[c].get(x, y));
                        fc[c].set(x, 2 * y + 1, bc[c].get(x, y));
                    }
                }
            }
        }

        let bpr = top.blocks_per_row();
        let rows = top.height() / 4;
        let mut mv_info = Vec::with_capacity(bpr * rows * 2);
        for j in 0..rows {
            for pair in [top, bottom] {
                for i in 0..bpr {
                    let mut info = pair.mv_info[j * bpr + i];
                    for list in 0..2 {
                        info.mv[list].y *= 2;
                    }
                    mv_info.push(info);
                }
            }
        }
        frame.mv_info = mv_info;
        frame.top_poc = top.poc;
        frame.bottom_poc = bottom.poc;
        frame.frame_poc = top.poc.min(bottom.poc);
        frame.poc = frame.frame_poc;
        frame.used_for_reference = top.used_for_reference || bottom.used_for_reference;
        frame.is_long_term = top.is_long_term && bottom.is_long_term;
        frame.concealed = top.concealed || bottom.concealed;
        frame
    }
}

/// Reference state of a frame store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    Unused,
    ShortTerm,
    LongTerm,
}

/// A DPB entry pairing a frame with its top/bottom fields. Any combination
/// may be present while a complementary pair is still open.
#[derive(Debug, Clone)]
pub struct FrameStore {
    pub frame: Option<Picture>,
    pub top_field: Option<Picture>,
    pub bottom_field: Option<Picture>,

    /// Which parts are in use: bit 0 top, bit 1 bottom, 3 frame.
    pub is_used: u8,
    /// Reference state per part, same bit layout.
    pub is_reference: u8,
    pub is_long_term: u8,

    pub is_output: bool,
    pub non_existing: bool,
    pub concealed: bool,

    pub frame_num: u32,
    pub frame_num_wrap: i32,
    pub long_term_frame_idx: i32,
    pub poc: i32,
    pub view_id: u16,
    pub inter_view_flag: bool,
    pub anchor_pic_flag: bool,
}

impl FrameStore {
    pub fn new() -> Self {
        Self {
            frame: None,
            top_field: None,
            bottom_field: None,
            is_used: 0,
            is_reference: 0,
            is_long_term: 0,
            is_output: false,
            non_existing: false,
            concealed: false,
            frame_num: 0,
            frame_num_wrap: 0,
            long_term_frame_idx: -1,
            poc: 0,
            view_id: 0,
            inter_view_flag: false,
            anchor_pic_flag: false,
        }
    }

    pub fn is_short_term_reference(&self) -> bool {
        self.is_reference != 0 && (self.is_long_term & self.is_reference) != self.is_reference
    }

    pub fn is_long_term_reference(&self) -> bool {
        self.is_reference != 0 && (self.is_long_term & self.is_reference) == self.is_reference
    }

    pub fn is_referenced(&self) -> bool {
        self.is_reference != 0
    }

    /// True once both parities (or the frame) have been decoded.
    pub fn is_complete(&self) -> bool {
        self.is_used == 3
    }

    pub fn ref_state(&self) -> RefState {
        if self.is_reference == 0 {
            RefState::Unused
        } else if self.is_long_term_reference() {
            RefState::LongTerm
        } else {
            RefState::ShortTerm
        }
    }

    /// Combine decoded fields into the frame member once both are present.
    pub fn dpb_combine_fields(&mut self, next_id: i64) {
        if let (Some(top), Some(bottom)) = (self.top_field.as_ref(), self.bottom_field.as_ref()) {
            let frame = Picture::combine_fields(top, bottom, next_id);
            self.poc = frame.frame_poc;
            self.frame = Some(frame);
        }
    }

    /// Split a decoded frame into field views used by field references.
    pub fn dpb_split_frame(&mut self, next_id: i64) {
        if let Some(frame) = self.frame.as_ref() {
            if self.top_field.is_none() {
                let mut top = frame.split_field(PictureStructure::TopField, next_id);
                top.used_for_reference = frame.used_for_reference;
                top.is_long_term = frame.is_long_term;
                self.top_field = Some(top);
            }
            if self.bottom_field.is_none() {
                let mut bottom = frame.split_field(PictureStructure::BottomField, next_id + 1);
                bottom.used_for_reference = frame.used_for_reference;
                bottom.is_long_term = frame.is_long_term;
                self.bottom_field = Some(bottom);
            }
        }
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::baseline_sps;

    #[test]
    fn test_plane_fetch_clamps() {
        let mut plane = Plane::new(4, 4, 2, 2);
        plane.set(0, 0, 7);
        plane.set(3, 3, 9);
        assert_eq!(plane.fetch(-5, -5), 7);
        assert_eq!(plane.fetch(10, 10), 9);
        assert_eq!(plane.fetch(0, 0), 7);
    }

    #[test]
    fn test_plane_pad_replicates_edges() {
        let mut plane = Plane::new(2, 2, 2, 2);
        plane.set(0, 0, 1);
        plane.set(1, 0, 2);
        plane.set(0, 1, 3);
        plane.set(1, 1, 4);
        plane.pad();
        // After padding, clamped fetch and the physical margin agree.
        let idx = plane.index(0, 0);
        assert_eq!(plane.data[idx - 1], 1); // left margin
        assert_eq!(plane.data[idx - plane.stride], 1); // top margin
    }

    #[test]
    fn test_alloc_sizes() {
        let sps = baseline_sps(2, 2);
        let pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        assert_eq!(pic.width(), 32);
        assert_eq!(pic.height(), 32);
        assert_eq!(pic.mv_info.len(), 64);
        assert_eq!(pic.mb_field_flags.len(), 4);
        let chroma = pic.chroma.as_ref().unwrap();
        assert_eq!(chroma[0].width, 16);
        assert_eq!(chroma[0].height, 16);
    }

    #[test]
    fn test_field_split_combine_round_trip() {
        let sps = baseline_sps(1, 2);
        let mut frame = Picture::alloc(0, &sps, PictureStructure::Frame);
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                frame.luma.set(x, y, (y * 31 + x) as u16);
            }
        }
        frame.top_poc = 4;
        frame.bottom_poc = 5;

        let top = frame.split_field(PictureStructure::TopField, 1);
        let bottom = frame.split_field(PictureStructure::BottomField, 2);
        assert_eq!(top.height(), frame.height() / 2);
        assert_eq!(top.luma.get(3, 1), frame.luma.get(3, 2));
        assert_eq!(bottom.luma.get(3, 1), frame.luma.get(3, 3));
        assert_eq!(top.poc, 4);
        assert_eq!(bottom.poc, 5);

        let rebuilt = Picture::combine_fields(&top, &bottom, 3);
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                assert_eq!(rebuilt.luma.get(x, y), frame.luma.get(x, y));
            }
        }
    }

    #[test]
    fn test_frame_store_states() {
        let mut fs = FrameStore::new();
        assert_eq!(fs.ref_state(), RefState::Unused);
        fs.is_used = 3;
        fs.is_reference = 3;
        assert_eq!(fs.ref_state(), RefState::ShortTerm);
        assert!(fs.is_short_term_reference());
        fs.is_long_term = 3;
        assert_eq!(fs.ref_state(), RefState::LongTerm);
        assert!(fs.is_long_term_reference());
        assert!(fs.is_complete());
    }
}

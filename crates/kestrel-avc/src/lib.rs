//! H.264/AVC elementary stream decoder for kestrel.
//!
//! This crate decodes a compliant AVC elementary stream into planar YCbCr
//! pictures: NAL/parameter-set parsing, slice decoding over both entropy
//! coders (CAVLC and CABAC), intra/inter prediction, inverse transforms,
//! in-loop deblocking, and a decoded picture buffer with reference marking
//! and POC-ordered output. MBAFF streams and the Stereo/Multiview High
//! profiles' inter-view references are handled; error concealment is a
//! pluggable hook.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_avc::Decoder;
//!
//! let data: &[u8] = &[/* Annex B byte stream */];
//! let mut decoder = Decoder::new();
//! let output = decoder.decode_annex_b(data)?;
//!
//! for picture in &output.pictures {
//!     println!("POC {} {}x{}", picture.poc, picture.width(), picture.height());
//! }
//! ```

pub mod bitreader;
pub mod cabac;
pub mod cabac_tables;
pub mod conceal;
pub mod deblock;
pub mod decoder;
pub mod dpb;
pub mod error;
pub mod inter;
pub mod intra;
pub mod macroblock;
pub mod mb_read;
pub mod nal;
pub mod neighbour;
pub mod picture;
pub mod poc;
pub mod pps;
pub mod refs;
pub mod residual;
pub mod sei;
pub mod slice;
pub mod slice_group;
pub mod sps;
pub mod tables;
pub mod transform;

#[cfg(test)]
pub(crate) mod testutil;

pub use bitreader::BitReader;
pub use conceal::{Concealment, FrameCopyConcealment, NoConcealment};
pub use decoder::{DecodeOutput, Decoder};
pub use dpb::Dpb;
pub use error::{DecodeError, Result};
pub use nal::{
    find_nal_units, parse_annex_b, parse_nal_header, parse_nal_unit, unescape_rbsp, NalUnit,
    NalUnitHeader, NalUnitType,
};
pub use picture::{Picture, PictureStructure};
pub use pps::Pps;
pub use sei::ToneMapping;
pub use slice::{SliceHeader, SliceType};
pub use sps::{ChromaFormat, ProfileIdc, Sps};

impl Picture {
    /// One plane's samples cropped to the display rectangle, row-major
    /// without padding (the output writer's layout).
    pub fn cropped_plane(&self, plane: usize) -> Vec<u16> {
        let (source, sub_x, sub_y): (&picture::Plane, usize, usize) = if plane == 0 {
            (&self.luma, 1, 1)
        } else {
            let chroma = match self.chroma.as_ref() {
                Some(c) => &c[plane - 1],
                None => return Vec::new(),
            };
            (
                chroma,
                self.luma.width / chroma.width,
                self.luma.height / chroma.height,
            )
        };

        let (crop_x, crop_y) = if self.frame_cropping_flag {
            // Crop offsets are in chroma-derived units on the luma plane and
            // direct sample units on the chroma planes.
            let unit_x = match self.chroma_format {
                ChromaFormat::Monochrome => 1,
                f => f.sub_width_c() as usize,
            };
            let unit_y = match self.chroma_format {
                ChromaFormat::Monochrome => 1,
                f => f.sub_height_c() as usize,
            } * if self.coded_frame { 1 } else { 2 };
            if plane == 0 {
                (
                    self.crop[0] as usize * unit_x,
                    self.crop[2] as usize * unit_y,
                )
            } else {
                (
                    self.crop[0] as usize * unit_x / sub_x,
                    self.crop[2] as usize * unit_y / sub_y,
                )
            }
        } else {
            (0, 0)
        };

        let full_w = if plane == 0 {
            self.display_width()
        } else {
            self.display_width() / sub_x
        };
        let full_h = if plane == 0 {
            self.display_height()
        } else {
            self.display_height() / sub_y
        };

        let mut out = vec![0u16; full_w * full_h];
        for (row, chunk) in out.chunks_mut(full_w).enumerate() {
            source.copy_row(crop_y + row, crop_x, chunk);
        }
        out
    }

    /// Display width after cropping.
    pub fn display_width(&self) -> usize {
        if !self.frame_cropping_flag {
            return self.width();
        }
        let unit_x = match self.chroma_format {
            ChromaFormat::Monochrome => 1,
            f => f.sub_width_c() as usize,
        };
        self.width() - unit_x * (self.crop[0] + self.crop[1]) as usize
    }

    /// Display height after cropping.
    pub fn display_height(&self) -> usize {
        if !self.frame_cropping_flag {
            return self.height();
        }
        let unit_y = match self.chroma_format {
            ChromaFormat::Monochrome => 1,
            f => f.sub_height_c() as usize,
        } * if self.coded_frame { 1 } else { 2 };
        self.height() - unit_y * (self.crop[2] + self.crop[3]) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::PictureStructure;
    use crate::testutil::baseline_sps;

    #[test]
    fn test_cropped_plane_identity_without_cropping() {
        let sps = baseline_sps(2, 1);
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        for y in 0..16 {
            for x in 0..32 {
                pic.luma.set(x, y, (y * 32 + x) as u16);
            }
        }
        let plane = pic.cropped_plane(0);
        assert_eq!(plane.len(), 32 * 16);
        assert_eq!(plane[0], 0);
        assert_eq!(plane[33], (32 + 1) as u16);
    }

    #[test]
    fn test_cropped_plane_with_offsets() {
        let mut sps = baseline_sps(2, 1);
        sps.frame_cropping_flag = true;
        sps.frame_crop_left_offset = 1; // 2 luma samples in 4:2:0
        sps.frame_crop_right_offset = 1;
        let mut pic = Picture::alloc(0, &sps, PictureStructure::Frame);
        for y in 0..16 {
            for x in 0..32 {
                pic.luma.set(x, y, x as u16);
            }
        }
        assert_eq!(pic.display_width(), 28);
        let plane = pic.cropped_plane(0);
        assert_eq!(plane.len(), 28 * 16);
        assert_eq!(plane[0], 2);
        assert_eq!(plane[27], 29);
    }
}

//! Per-macroblock syntax parsing and reconstruction: the slice decoder that
//! walks macroblocks in slice-group scan order, driving the entropy coders,
//! prediction, dequantisation and the inverse transforms.

use crate::bitreader::BitReader;
use crate::cabac::{CabacContexts, CabacEngine};
use crate::dpb::Dpb;
use crate::error::{DecodeError, Result};
use crate::inter::{
    bipred_blocks, bipred_offset, mc_chroma, mc_luma, predict_mv, temporal_scale_mv, weight_block,
    MvCandidate,
};
use crate::intra::{intra_16x16, intra_4x4, intra_8x8, intra_chroma, IntraAvail};
use crate::macroblock::{
    cbf_chroma_ac_bit, cbf_chroma_dc_bit, cbf_luma_bit, decode_b_mb_type, decode_b_sub_mb_type,
    decode_cbp_code, decode_i_mb_type, decode_p_mb_type, decode_p_sub_mb_type, max_mb_type,
    MbClass, Macroblock, PredDir, CBF_LUMA_DC_BIT,
};
use crate::neighbour::NeighbourCtx;
use crate::picture::{MotionVector, Picture};
use crate::pps::Pps;
use crate::refs::{RefLists, WeightTables};
use crate::residual::{block_cat, read_residual_block_cabac, read_residual_block_cavlc};
use crate::slice::{SliceHeader, SliceType};
use crate::sps::{ChromaFormat, Sps};
use crate::tables::{
    CHROMA_DC_SCAN_2X2, CHROMA_DC_SCAN_2X4, FIELD_SCAN_4X4, FIELD_SCAN_8X8, ZIGZAG_SCAN_4X4,
    ZIGZAG_SCAN_8X8,
};
use crate::transform::{
    clip_pixel, dequant_4x4, dequant_8x8, ihadamard_2x2, ihadamard_2x4, ihadamard_4x4, itrans_4x4,
    itrans_8x8, scale_chroma_dc_420, scale_chroma_dc_422, scale_luma_dc, EffectiveScalingLists,
    InvLevelScale,
};

/// The entropy decoding state of one slice.
enum Entropy<'a> {
    Cavlc(BitReader<'a>),
    Cabac {
        engine: CabacEngine<'a>,
        ctxs: Box<CabacContexts>,
    },
}

/// Decodes the macroblocks of one slice into the current picture.
pub struct SliceDecoder<'a> {
    pub header: SliceHeader,
    sps: &'a Sps,
    pps: &'a Pps,
    entropy: Entropy<'a>,
    pub lists: RefLists,
    pub weights: WeightTables,
    pub direct_scales: Vec<i32>,
    pub slice_nr: i32,

    qp: i32,
    last_dquant: i32,
    /// Pending CAVLC mb_skip_run (-1 when none is outstanding).
    skip_run: i32,
    mbaff: bool,
    width_mbs: u32,
    pic_size_in_mbs: u32,

    inv_scale_intra: [InvLevelScale; 3],
    inv_scale_inter: [InvLevelScale; 3],

    /// Dequantised coefficients of the current MB per plane.
    cof: [[[i32; 16]; 16]; 3],
}

impl<'a> SliceDecoder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        header: SliceHeader,
        sps: &'a Sps,
        pps: &'a Pps,
        payload: &'a [u8],
        header_end_bits: usize,
        lists: RefLists,
        weights: WeightTables,
        direct_scales: Vec<i32>,
        slice_nr: i32,
        scaling: &EffectiveScalingLists,
    ) -> Result<Self> {
        let qp = header.slice_qp(sps, pps)?;

        let entropy = if pps.entropy_coding_mode_flag {
            // cabac_alignment_one_bit: advance to the next byte boundary.
            let byte_offset = (header_end_bits + 7) / 8;
            let engine = CabacEngine::new(payload, byte_offset)?;
            let mut ctxs = Box::new(CabacContexts::default());
            ctxs.init(header.slice_type, header.cabac_init_idc, qp);
            Entropy::Cabac { engine, ctxs }
        } else {
            let mut reader = BitReader::new(payload);
            reader.skip_bits(header_end_bits)?;
            Entropy::Cavlc(reader)
        };

        let inv_scale_intra = [
            InvLevelScale::new(&scaling.list_4x4[0], &scaling.list_8x8[0]),
            InvLevelScale::new(&scaling.list_4x4[1], &scaling.list_8x8[2]),
            InvLevelScale::new(&scaling.list_4x4[2], &scaling.list_8x8[4]),
        ];
        let inv_scale_inter = [
            InvLevelScale::new(&scaling.list_4x4[3], &scaling.list_8x8[1]),
            InvLevelScale::new(&scaling.list_4x4[4], &scaling.list_8x8[3]),
            InvLevelScale::new(&scaling.list_4x4[5], &scaling.list_8x8[5]),
        ];

        Ok(Self {
            mbaff: header.mbaff_frame_flag(sps),
            width_mbs: sps.pic_width_in_mbs(),
            pic_size_in_mbs: header.pic_size_in_mbs(sps),
            header,
            sps,
            pps,
            entropy,
            lists,
            weights,
            direct_scales,
            slice_nr,
            qp,
            last_dquant: 0,
            skip_run: -1,
            inv_scale_intra,
            inv_scale_inter,
            cof: [[[0; 16]; 16]; 3],
        })
    }

    pub fn qp(&self) -> i32 {
        self.qp
    }

    fn is_cabac(&self) -> bool {
        matches!(self.entropy, Entropy::Cabac { .. })
    }

    fn field_scan(&self, mb: &Macroblock) -> bool {
        self.header.field_pic_flag || mb.mb_field
    }

    // -- small syntax helpers dispatching on the entropy mode ---------------

    fn parse_mb_skip(&mut self, mbs: &[Macroblock], addr: u32) -> Result<bool> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                if self.skip_run < 0 {
                    self.skip_run = reader.read_ue()? as i32;
                }
                if self.skip_run > 0 {
                    self.skip_run -= 1;
                    Ok(true)
                } else {
                    self.skip_run = -1;
                    Ok(false)
                }
            }
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let [a, b, _, _] = nb.mb_neighbours(addr);
                let cond_a = (a.available && !mbs[a.mb_addr as usize].skipped) as usize;
                let cond_b = (b.available && !mbs[b.mb_addr as usize].skipped) as usize;
                let skip = engine.decision(&mut ctxs.mb_skip[cond_a + cond_b])?;
                if skip {
                    self.last_dquant = 0;
                }
                Ok(skip)
            }
        }
    }

    fn parse_mb_field_flag(&mut self, mbs: &[Macroblock], addr: u32) -> Result<bool> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => Ok(reader.read_flag()?),
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let [a, b, _, _] = nb.mb_neighbours(addr);
                let cond_a = (a.available && mbs[a.mb_addr as usize].mb_field) as usize;
                let cond_b = (b.available && mbs[b.mb_addr as usize].mb_field) as usize;
                Ok(engine.decision(&mut ctxs.mb_aff[cond_a + cond_b])?)
            }
        }
    }

    fn parse_mb_type(&mut self, mbs: &[Macroblock], addr: u32) -> Result<u32> {
        let slice_type = self.header.slice_type;
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                let code = reader.read_ue()?;
                if code > max_mb_type(slice_type) {
                    return Err(DecodeError::SyntaxViolation(format!(
                        "mb_type {} exceeds maximum {} for a {} slice",
                        code,
                        max_mb_type(slice_type),
                        slice_type.name()
                    )));
                }
                Ok(code)
            }
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let [a, b, _, _] = nb.mb_neighbours(addr);
                match slice_type {
                    SliceType::I | SliceType::Si => {
                        let cond = |pix: &crate::neighbour::PixelPos| {
                            pix.available && mbs[pix.mb_addr as usize].class != MbClass::INxN
                        };
                        let inc = cond(&a) as usize + cond(&b) as usize;
                        cabac_i_mb_type(engine, ctxs, inc)
                    }
                    SliceType::P | SliceType::Sp => cabac_p_mb_type(engine, ctxs),
                    SliceType::B => {
                        let cond = |pix: &crate::neighbour::PixelPos| {
                            pix.available && !mbs[pix.mb_addr as usize].class.is_direct()
                                && !mbs[pix.mb_addr as usize].skipped
                        };
                        let inc = cond(&a) as usize + cond(&b) as usize;
                        cabac_b_mb_type(engine, ctxs, inc)
                    }
                }
            }
        }
    }

    fn parse_sub_mb_type(&mut self) -> Result<u32> {
        let is_b = self.header.slice_type.is_b();
        match &mut self.entropy {
            Entropy::Cavlc(reader) => Ok(reader.read_ue()?),
            Entropy::Cabac { engine, ctxs } => {
                if is_b {
                    // Prefix tree of the B sub_mb_type binarisation.
                    if !engine.decision(&mut ctxs.sub_mb_type_b[0])? {
                        return Ok(0);
                    }
                    let mut code = 1u32;
                    if engine.decision(&mut ctxs.sub_mb_type_b[1])? {
                        code += 2;
                        if engine.decision(&mut ctxs.sub_mb_type_b[2])? {
                            code += 4;
                            if engine.decision(&mut ctxs.sub_mb_type_b[3])? {
                                code += 4;
                            } else {
                                code += engine.decision(&mut ctxs.sub_mb_type_b[3])? as u32 * 2;
                            }
                        } else {
                            code += engine.decision(&mut ctxs.sub_mb_type_b[3])? as u32 * 2;
                        }
                    }
                    code += engine.decision(&mut ctxs.sub_mb_type_b[3])? as u32;
                    Ok(code)
                } else {
                    // P sub_mb_type tree.
                    if engine.decision(&mut ctxs.sub_mb_type_p[0])? {
                        return Ok(0);
                    }
                    if !engine.decision(&mut ctxs.sub_mb_type_p[1])? {
                        return Ok(1);
                    }
                    if engine.decision(&mut ctxs.sub_mb_type_p[2])? {
                        Ok(2)
                    } else {
                        Ok(3)
                    }
                }
            }
        }
    }

    fn parse_transform_size_flag(&mut self, mbs: &[Macroblock], addr: u32) -> Result<bool> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => Ok(reader.read_flag()?),
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let [a, b, _, _] = nb.mb_neighbours(addr);
                let cond_a = (a.available && mbs[a.mb_addr as usize].transform_size_8x8) as usize;
                let cond_b = (b.available && mbs[b.mb_addr as usize].transform_size_8x8) as usize;
                Ok(engine.decision(&mut ctxs.transform_size[cond_a + cond_b])?)
            }
        }
    }

    fn parse_intra_chroma_pred_mode(&mut self, mbs: &[Macroblock], addr: u32) -> Result<u8> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                let mode = reader.read_ue()?;
                if mode > 3 {
                    return Err(DecodeError::SyntaxViolation(format!(
                        "intra_chroma_pred_mode {} exceeds maximum 3",
                        mode
                    )));
                }
                Ok(mode as u8)
            }
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let [a, b, _, _] = nb.mb_neighbours(addr);
                let cond = |pix: &crate::neighbour::PixelPos| {
                    pix.available
                        && mbs[pix.mb_addr as usize].intra_chroma_pred_mode != 0
                        && mbs[pix.mb_addr as usize].class != MbClass::IPcm
                };
                let inc = cond(&a) as usize + cond(&b) as usize;
                let value = engine.truncated_unary(&mut ctxs.chroma_pred, &[inc, 3, 3], 3)?;
                Ok(value as u8)
            }
        }
    }

    fn parse_ref_idx(
        &mut self,
        mbs: &[Macroblock],
        pic: &Picture,
        addr: u32,
        list: usize,
        bx: usize,
        by: usize,
        num_active: usize,
    ) -> Result<u8> {
        if num_active <= 1 {
            return Ok(0);
        }
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                let value = reader.read_te(num_active as u32 - 1)?;
                if value as usize >= num_active {
                    return Err(DecodeError::SyntaxViolation(format!(
                        "ref_idx {} exceeds active count {}",
                        value, num_active
                    )));
                }
                Ok(value as u8)
            }
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let pix_a = nb.get_4x4_neighbour(addr, bx as i32 * 4 - 1, by as i32 * 4, 16, 16);
                let pix_b = nb.get_4x4_neighbour(addr, bx as i32 * 4, by as i32 * 4 - 1, 16, 16);
                let cond = |pix: &crate::neighbour::PixelPos| -> usize {
                    if !pix.available {
                        return 0;
                    }
                    let nb_mb = &mbs[pix.mb_addr as usize];
                    if nb_mb.class == MbClass::IPcm || nb_mb.class.is_direct() || nb_mb.is_intra()
                    {
                        return 0;
                    }
                    let info = pic.mv_info_at(pix.pos_x as usize, pix.pos_y as usize);
                    let threshold = if self.mbaff
                        && !mbs[addr as usize].mb_field
                        && nb_mb.mb_field
                    {
                        1
                    } else {
                        0
                    };
                    (info.ref_idx[list] as i32 > threshold) as usize
                };
                let inc = cond(&pix_a) + 2 * cond(&pix_b);
                let value = engine.unary(&mut ctxs.ref_idx, &[inc, 4, 5])?;
                if value as usize >= num_active {
                    return Err(DecodeError::SyntaxViolation(format!(
                        "ref_idx {} exceeds active count {}",
                        value, num_active
                    )));
                }
                Ok(value as u8)
            }
        }
    }

    fn parse_mvd(
        &mut self,
        mbs: &[Macroblock],
        addr: u32,
        list: usize,
        bx: usize,
        by: usize,
        comp: usize,
    ) -> Result<i16> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => Ok(reader.read_se()? as i16),
            Entropy::Cabac { engine, ctxs } => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let pix_a = nb.get_4x4_neighbour(addr, bx as i32 * 4 - 1, by as i32 * 4, 16, 16);
                let pix_b = nb.get_4x4_neighbour(addr, bx as i32 * 4, by as i32 * 4 - 1, 16, 16);
                let curr_field = mbs[addr as usize].mb_field;
                let abs_of = |pix: &crate::neighbour::PixelPos| -> i32 {
                    if !pix.available {
                        return 0;
                    }
                    let nb_mb = &mbs[pix.mb_addr as usize];
                    let mut v =
                        nb_mb.mvd[list][pix.y as usize][pix.x as usize][comp].abs() as i32;
                    if self.mbaff && comp == 1 {
                        if !curr_field && nb_mb.mb_field {
                            v *= 2;
                        } else if curr_field && !nb_mb.mb_field {
                            v /= 2;
                        }
                    }
                    v
                };
                let sum = abs_of(&pix_a) + abs_of(&pix_b);
                let inc = if sum < 3 {
                    0
                } else if sum <= 32 {
                    1
                } else {
                    2
                };
                let ctx = if comp == 0 {
                    &mut ctxs.mvd_x
                } else {
                    &mut ctxs.mvd_y
                };
                engine.mvd(ctx, inc)
            }
        }
    }

    fn parse_cbp(&mut self, mbs: &[Macroblock], addr: u32, is_intra: bool) -> Result<u8> {
        let chroma_present = matches!(
            self.sps.chroma_format_idc,
            ChromaFormat::Yuv420 | ChromaFormat::Yuv422
        ) && self.sps.chroma_array_type() != 0;
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                let code = reader.read_ue()?;
                decode_cbp_code(code, is_intra, chroma_present)
            }
            Entropy::Cabac { engine, ctxs } => {
                let mut cbp = 0u8;
                // Four luma 8x8 bits with context from the left/upper 8x8s.
                for mb_y in (0..4).step_by(2) {
                    for mb_x in (0..4).step_by(2) {
                        let nb =
                            NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                        let pix_a =
                            nb.get_4x4_neighbour(addr, (mb_x as i32) * 4 - 1, (mb_y as i32) * 4, 16, 16);
                        let pix_b =
                            nb.get_4x4_neighbour(addr, (mb_x as i32) * 4, (mb_y as i32) * 4 - 1, 16, 16);

                        let cond_a = if mb_x == 0 {
                            if pix_a.available {
                                let nb_mb = &mbs[pix_a.mb_addr as usize];
                                if nb_mb.class == MbClass::IPcm {
                                    0
                                } else {
                                    ((nb_mb.cbp & (1 << (2 * (pix_a.y as usize / 2) + 1))) == 0)
                                        as usize
                                }
                            } else {
                                0
                            }
                        } else {
                            ((cbp & (1 << mb_y)) == 0) as usize
                        };
                        let cond_b = if mb_y == 0 {
                            if pix_b.available {
                                let nb_mb = &mbs[pix_b.mb_addr as usize];
                                if nb_mb.class == MbClass::IPcm {
                                    0
                                } else {
                                    ((nb_mb.cbp & (1 << (2 + mb_x / 2))) == 0) as usize * 2
                                }
                            } else {
                                0
                            }
                        } else {
                            ((cbp & (1 << (mb_x / 2))) == 0) as usize * 2
                        };

                        if engine.decision(&mut ctxs.cbp_luma[cond_a + cond_b])? {
                            cbp |= 1 << (mb_y + (mb_x >> 1));
                        }
                    }
                }

                if chroma_present {
                    let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                    let [a, b, _, _] = nb.mb_neighbours(addr);
                    let cond = |pix: &crate::neighbour::PixelPos| -> usize {
                        if !pix.available {
                            return 0;
                        }
                        let nb_mb = &mbs[pix.mb_addr as usize];
                        (nb_mb.class == MbClass::IPcm || nb_mb.cbp > 15) as usize
                    };
                    let inc = cond(&a) + 2 * cond(&b);
                    if engine.decision(&mut ctxs.cbp_chroma[inc])? {
                        let cond2 = |pix: &crate::neighbour::PixelPos| -> usize {
                            if !pix.available {
                                return 0;
                            }
                            let nb_mb = &mbs[pix.mb_addr as usize];
                            (nb_mb.class == MbClass::IPcm || (nb_mb.cbp >> 4) == 2) as usize
                        };
                        let inc2 = cond2(&a) + 2 * cond2(&b) + 4;
                        cbp |= if engine.decision(&mut ctxs.cbp_chroma[inc2])? {
                            32
                        } else {
                            16
                        };
                    }
                }
                Ok(cbp)
            }
        }
    }

    fn parse_mb_qp_delta(&mut self) -> Result<i32> {
        let delta = match &mut self.entropy {
            Entropy::Cavlc(reader) => reader.read_se()?,
            Entropy::Cabac { engine, ctxs } => {
                let inc = (self.last_dquant != 0) as usize;
                let value = engine.unary(&mut ctxs.delta_qp, &[inc, 2, 3])?;
                if value & 1 != 0 {
                    ((value + 1) >> 1) as i32
                } else {
                    -(((value + 1) >> 1) as i32)
                }
            }
        };
        let bound = 26 + self.sps.qp_bd_offset_y() / 2;
        if delta < -bound || delta > bound - 1 {
            return Err(DecodeError::SyntaxViolation(format!(
                "mb_qp_delta {} out of [{}, {}]",
                delta,
                -bound,
                bound - 1
            )));
        }
        self.last_dquant = delta;
        Ok(delta)
    }

    fn update_qp(&mut self, delta: i32) -> i32 {
        let offset = self.sps.qp_bd_offset_y();
        self.qp = (self.qp + delta + 52 + 2 * offset) % (52 + offset) - offset;
        self.qp
    }

    fn chroma_qps(&self, qp: i32) -> [i32; 2] {
        let offset_c = self.sps.qp_bd_offset_c();
        [
            crate::deblock::chroma_qp(qp, self.pps.chroma_qp_index_offset, offset_c),
            crate::deblock::chroma_qp(qp, self.pps.second_chroma_qp_index_offset, offset_c),
        ]
    }

    /// CABAC end-of-slice flag; CAVLC checks for trailing data instead.
    pub fn end_of_slice(&mut self) -> Result<bool> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                if self.skip_run > 0 {
                    return Ok(false);
                }
                Ok(!reader.more_rbsp_data())
            }
            Entropy::Cabac { engine, .. } => Ok(engine.terminate()?),
        }
    }

    // -- decode driver ------------------------------------------------------

    /// Parse and reconstruct one macroblock.
    pub fn decode_macroblock(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        dpb: &Dpb,
        addr: u32,
    ) -> Result<()> {
        // Mark the MB as belonging to this slice before neighbour queries.
        mbs[addr as usize].slice_nr = self.slice_nr;
        if self.mbaff {
            // A pair shares the field flag; the top MB decides it (a skipped
            // top defers the read to the bottom MB).
            if addr % 2 == 0 {
                mbs[addr as usize].mb_field = false;
            } else {
                mbs[addr as usize].mb_field = mbs[addr as usize - 1].mb_field;
            }
        } else {
            mbs[addr as usize].mb_field = self.header.field_pic_flag;
        }

        let mut skipped = false;
        if !self.header.slice_type.is_intra() {
            skipped = self.parse_mb_skip(mbs, addr)?;
        }

        if self.mbaff {
            let read_field_flag = if addr % 2 == 0 {
                !skipped
            } else {
                mbs[addr as usize - 1].skipped && !skipped
            };
            if read_field_flag {
                let field = self.parse_mb_field_flag(mbs, addr)?;
                mbs[addr as usize].mb_field = field;
                if addr % 2 == 1 {
                    mbs[addr as usize - 1].mb_field = field;
                }
            }
        }

        self.cof = [[[0; 16]; 16]; 3];

        if skipped {
            return self.decode_skip_mb(mbs, pic, dpb, addr);
        }

        let code = self.parse_mb_type(mbs, addr)?;
        let (class, i16_mode, i16_cbp_chroma, i16_cbp_luma, b_dirs) = match self.header.slice_type
        {
            SliceType::I | SliceType::Si => {
                let (c, m, cc, cl) = decode_i_mb_type(code)?;
                (c, m, cc, cl, [PredDir::Direct; 2])
            }
            SliceType::P | SliceType::Sp => {
                let (c, m, cc, cl) = decode_p_mb_type(code)?;
                (c, m, cc, cl, [PredDir::L0; 2])
            }
            SliceType::B => {
                let (c, dirs, m, cc, cl) = decode_b_mb_type(code)?;
                (c, m, cc, cl, dirs)
            }
        };

        {
            let mb = &mut mbs[addr as usize];
            mb.class = class;
            mb.mb_type_code = code;
            mb.skipped = false;
        }

        match class {
            MbClass::IPcm => self.decode_ipcm_mb(mbs, pic, addr),
            MbClass::INxN => self.decode_intra_nxn_mb(mbs, pic, addr),
            MbClass::I16x16 => {
                {
                    let mb = &mut mbs[addr as usize];
                    mb.i16_pred_mode = i16_mode;
                    mb.cbp = (i16_cbp_chroma << 4) | i16_cbp_luma;
                }
                self.decode_intra_16x16_mb(mbs, pic, addr)
            }
            _ => self.decode_inter_mb(mbs, pic, dpb, addr, class, b_dirs),
        }
    }

    // -- I_PCM --------------------------------------------------------------

    fn decode_ipcm_mb(&mut self, mbs: &mut [Macroblock], pic: &mut Picture, addr: u32) -> Result<()> {
        let (mx, my) = self.mb_origin(mbs, addr);
        let bd_y = self.sps.bit_depth_luma();
        let bd_c = self.sps.bit_depth_chroma();
        let chroma_dims = if self.sps.chroma_array_type() != 0 {
            Some((
                self.sps.mb_width_c() as usize,
                self.sps.mb_height_c() as usize,
            ))
        } else {
            None
        };

        // The raw pcm_sample bits sit byte-aligned in the slice data; under
        // CABAC the arithmetic engine restarts right after them.
        let mut read_all = |reader: &mut BitReader| -> Result<()> {
            reader.byte_align();
            for j in 0..16 {
                for i in 0..16 {
                    let v = reader.read_bits(bd_y)? as u16;
                    pic.luma.set(mx + i, my + j, v);
                }
            }
            if let Some((w, h)) = chroma_dims {
                let (cx, cy) = (mx * w / 16, my * h / 16);
                for c in 0..2 {
                    for j in 0..h {
                        for i in 0..w {
                            let v = reader.read_bits(bd_c)? as u16;
                            if let Some(chroma) = pic.chroma.as_mut() {
                                chroma[c].set(cx + i, cy + j, v);
                            }
                        }
                    }
                }
            }
            Ok(())
        };

        match &mut self.entropy {
            Entropy::Cavlc(reader) => read_all(reader)?,
            Entropy::Cabac { engine, .. } => {
                let data = engine.data();
                let mut reader = BitReader::new(data);
                reader.skip_bits(engine.bytes_consumed() * 8)?;
                read_all(&mut reader)?;
                let resume = (reader.bit_position() + 7) / 8;
                engine.reinit_at(resume)?;
            }
        }

        let mb = &mut mbs[addr as usize];
        mb.qp = self.qp;
        mb.qpc = self.chroma_qps(self.qp);
        mb.cbp = 0x3f;
        mb.cbf = u64::MAX;
        mb.nz_coeff = [[[16; 4]; 4]; 3];
        self.last_dquant = 0;
        Ok(())
    }

    // -- intra --------------------------------------------------------------

    fn mb_origin(&self, mbs: &[Macroblock], addr: u32) -> (usize, usize) {
        let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
        let (mx, my) = nb.mb_position(addr);
        (mx as usize * 16, my as usize * 16)
    }

    fn intra_avail(
        &self,
        mbs: &[Macroblock],
        addr: u32,
        xn: i32,
        yn: i32,
        size: i32,
    ) -> IntraAvail {
        let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
        let ok = |pix: crate::neighbour::PixelPos| {
            pix.available
                && (!self.pps.constrained_intra_pred_flag
                    || mbs[pix.mb_addr as usize].is_intra())
        };
        IntraAvail {
            left: ok(nb.get_neighbour(addr, xn - 1, yn, 16, 16)),
            up: ok(nb.get_neighbour(addr, xn, yn - 1, 16, 16)),
            up_left: ok(nb.get_neighbour(addr, xn - 1, yn - 1, 16, 16)),
            up_right: ok(nb.get_neighbour(addr, xn + size, yn - 1, 16, 16)),
        }
    }

    fn predicted_intra_mode(&self, mbs: &[Macroblock], addr: u32, bx: usize, by: usize) -> i8 {
        let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
        let mode_of = |pix: crate::neighbour::PixelPos| -> i8 {
            if !pix.available {
                return -1;
            }
            let nb_mb = &mbs[pix.mb_addr as usize];
            if nb_mb.class != MbClass::INxN {
                if self.pps.constrained_intra_pred_flag && !nb_mb.is_intra() {
                    return -1;
                }
                return 2;
            }
            nb_mb.intra_pred_modes[(pix.y as usize) * 4 + pix.x as usize]
        };
        let a = mode_of(nb.get_4x4_neighbour(addr, bx as i32 * 4 - 1, by as i32 * 4, 16, 16));
        let b = mode_of(nb.get_4x4_neighbour(addr, bx as i32 * 4, by as i32 * 4 - 1, 16, 16));
        if a < 0 || b < 0 {
            2
        } else {
            a.min(b)
        }
    }

    fn decode_intra_nxn_mb(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        addr: u32,
    ) -> Result<()> {
        let transform_8x8 = if self.pps.transform_8x8_mode_flag {
            self.parse_transform_size_flag(mbs, addr)?
        } else {
            false
        };
        mbs[addr as usize].transform_size_8x8 = transform_8x8;

        // Prediction modes.
        let blocks = if transform_8x8 { 4 } else { 16 };
        for blk in 0..blocks {
            let (bx, by) = if transform_8x8 {
                ((blk % 2) * 2, (blk / 2) * 2)
            } else {
                block_scan_to_xy(blk)
            };
            let predicted = self.predicted_intra_mode(mbs, addr, bx, by);
            let rem = self.parse_intra_pred_mode_value()?;
            let mode = if rem < 0 {
                predicted
            } else if rem < predicted {
                rem
            } else {
                rem + 1
            };
            let mb = &mut mbs[addr as usize];
            if transform_8x8 {
                for dy in 0..2 {
                    for dx in 0..2 {
                        mb.intra_pred_modes[(by + dy) * 4 + bx + dx] = mode;
                    }
                }
            } else {
                mb.intra_pred_modes[by * 4 + bx] = mode;
            }
        }

        let chroma_mode = if self.sps.chroma_array_type() == 1 || self.sps.chroma_array_type() == 2
        {
            self.parse_intra_chroma_pred_mode(mbs, addr)?
        } else {
            0
        };
        mbs[addr as usize].intra_chroma_pred_mode = chroma_mode;

        let cbp = self.parse_cbp(mbs, addr, true)?;
        mbs[addr as usize].cbp = cbp;

        if cbp != 0 {
            let delta = self.parse_mb_qp_delta()?;
            mbs[addr as usize].qp_delta = delta;
            self.update_qp(delta);
        } else {
            self.last_dquant = 0;
        }
        let qp = self.qp;
        mbs[addr as usize].qp = qp;
        mbs[addr as usize].qpc = self.chroma_qps(qp);

        // Residual parse first, then blockwise predict + reconstruct in
        // decoding order so later blocks see reconstructed neighbours.
        self.read_luma_residual(mbs, pic, addr, false)?;
        let (mx, my) = self.mb_origin(mbs, addr);
        let max_y = (1i32 << self.sps.bit_depth_luma()) - 1;

        if transform_8x8 {
            for blk in 0..4 {
                let (bx, by) = ((blk % 2) * 8, (blk / 2) * 8);
                let avail = self.intra_avail(mbs, addr, bx as i32, by as i32, 8);
                let mode = mbs[addr as usize].intra_pred_modes[(by / 4) * 4 + bx / 4] as u8;
                let mut pred = [[0u16; 8]; 8];
                intra_8x8(
                    &pic.luma,
                    mx + bx,
                    my + by,
                    mode,
                    &avail,
                    self.sps.bit_depth_luma(),
                    &mut pred,
                )?;
                let mut block = [[0i32; 8]; 8];
                for j in 0..8 {
                    for i in 0..8 {
                        block[j][i] = self.cof[0][by + j][bx + i];
                    }
                }
                itrans_8x8(&mut block);
                for j in 0..8 {
                    for i in 0..8 {
                        let v = pred[j][i] as i32 + block[j][i];
                        pic.luma.set(mx + bx + i, my + by + j, clip_pixel(v, max_y));
                    }
                }
            }
        } else {
            for blk in 0..16 {
                let (bx4, by4) = block_scan_to_xy(blk);
                let (bx, by) = (bx4 * 4, by4 * 4);
                let avail = self.intra_avail(mbs, addr, bx as i32, by as i32, 4);
                // Up-right uses decoded data only: inside the MB, blocks 3,
                // 7, 11, 13 have no reconstructed up-right neighbour.
                let avail = IntraAvail {
                    up_right: avail.up_right && up_right_is_decoded(bx4, by4),
                    ..avail
                };
                let mode = mbs[addr as usize].intra_pred_modes[by4 * 4 + bx4] as u8;
                let mut pred = [[0u16; 4]; 4];
                intra_4x4(
                    &pic.luma,
                    mx + bx,
                    my + by,
                    mode,
                    &avail,
                    self.sps.bit_depth_luma(),
                    &mut pred,
                )?;
                let mut block = [[0i32; 4]; 4];
                for j in 0..4 {
                    for i in 0..4 {
                        block[j][i] = self.cof[0][by + j][bx + i];
                    }
                }
                itrans_4x4(&mut block);
                for j in 0..4 {
                    for i in 0..4 {
                        let v = pred[j][i] as i32 + block[j][i];
                        pic.luma.set(mx + bx + i, my + by + j, clip_pixel(v, max_y));
                    }
                }
            }
        }

        self.decode_chroma(mbs, pic, addr, None)?;
        Ok(())
    }

    fn parse_intra_pred_mode_value(&mut self) -> Result<i8> {
        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                if reader.read_flag()? {
                    Ok(-1)
                } else {
                    Ok(reader.read_bits(3)? as i8)
                }
            }
            Entropy::Cabac { engine, ctxs } => {
                if engine.decision(&mut ctxs.intra_pred[0])? {
                    Ok(-1)
                } else {
                    // rem_intra_pred_mode: three fixed-length bins, LSB
                    // first.
                    let mut value = 0u32;
                    for bit in 0..3 {
                        value |= (engine.decision(&mut ctxs.intra_pred[1])? as u32) << bit;
                    }
                    Ok(value as i8)
                }
            }
        }
    }

    fn decode_intra_16x16_mb(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        addr: u32,
    ) -> Result<()> {
        let chroma_mode = if self.sps.chroma_array_type() == 1 || self.sps.chroma_array_type() == 2
        {
            self.parse_intra_chroma_pred_mode(mbs, addr)?
        } else {
            0
        };
        mbs[addr as usize].intra_chroma_pred_mode = chroma_mode;

        let delta = self.parse_mb_qp_delta()?;
        mbs[addr as usize].qp_delta = delta;
        self.update_qp(delta);
        let qp = self.qp;
        mbs[addr as usize].qp = qp;
        mbs[addr as usize].qpc = self.chroma_qps(qp);

        // Luma DC plane, then AC residual.
        self.read_luma_dc(mbs, addr)?;
        self.read_luma_residual(mbs, pic, addr, true)?;

        let (mx, my) = self.mb_origin(mbs, addr);
        let avail = self.intra_avail(mbs, addr, 0, 0, 16);
        let mut pred = [[0u16; 16]; 16];
        intra_16x16(
            &pic.luma,
            mx,
            my,
            mbs[addr as usize].i16_pred_mode,
            &avail,
            self.sps.bit_depth_luma(),
            &mut pred,
        )?;

        let max_y = (1i32 << self.sps.bit_depth_luma()) - 1;
        for by in 0..4 {
            for bx in 0..4 {
                let mut block = [[0i32; 4]; 4];
                for j in 0..4 {
                    for i in 0..4 {
                        block[j][i] = self.cof[0][by * 4 + j][bx * 4 + i];
                    }
                }
                itrans_4x4(&mut block);
                for j in 0..4 {
                    for i in 0..4 {
                        let y = by * 4 + j;
                        let x = bx * 4 + i;
                        let v = pred[y][x] as i32 + block[j][i];
                        pic.luma.set(mx + x, my + y, clip_pixel(v, max_y));
                    }
                }
            }
        }

        self.decode_chroma(mbs, pic, addr, None)?;
        Ok(())
    }

    // -- inter --------------------------------------------------------------

    fn mv_candidates(
        &self,
        mbs: &[Macroblock],
        pic: &Picture,
        addr: u32,
        list: usize,
        bx: usize,
        by: usize,
        part_w: usize,
    ) -> [MvCandidate; 3] {
        let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
        // Intra neighbours stay "available" with no reference: their zero
        // vectors still feed the median.
        let to_cand = |pix: crate::neighbour::PixelPos| -> MvCandidate {
            if !pix.available {
                return MvCandidate::default();
            }
            let info = pic.mv_info_at(pix.pos_x as usize, pix.pos_y as usize);
            if info.ref_idx[list] < 0 {
                return MvCandidate {
                    available: true,
                    mv: MotionVector::ZERO,
                    ref_idx: -1,
                };
            }
            MvCandidate {
                available: true,
                mv: info.mv[list],
                ref_idx: info.ref_idx[list] as i32,
            }
        };

        let a = to_cand(nb.get_4x4_neighbour(addr, bx as i32 * 4 - 1, by as i32 * 4, 16, 16));
        let b = to_cand(nb.get_4x4_neighbour(addr, bx as i32 * 4, by as i32 * 4 - 1, 16, 16));
        let c_pix = nb.get_4x4_neighbour(
            addr,
            (bx * 4 + part_w) as i32,
            by as i32 * 4 - 1,
            16,
            16,
        );
        let c = if c_pix.available {
            to_cand(c_pix)
        } else {
            to_cand(nb.get_4x4_neighbour(addr, bx as i32 * 4 - 1, by as i32 * 4 - 1, 16, 16))
        };
        [a, b, c]
    }

    fn store_mv(
        &self,
        pic: &mut Picture,
        mbs: &[Macroblock],
        addr: u32,
        list: usize,
        bx: usize,
        by: usize,
        w4: usize,
        h4: usize,
        mv: MotionVector,
        ref_idx: i8,
    ) {
        let (mx, my) = self.mb_origin(mbs, addr);
        let (bx0, by0) = (mx / 4 + bx, my / 4 + by);
        let entry = if ref_idx >= 0 {
            let re = self.lists.list(list)[ref_idx as usize];
            Some(re)
        } else {
            None
        };
        for j in 0..h4 {
            for i in 0..w4 {
                let info = pic.mv_info_at_mut(bx0 + i, by0 + j);
                info.mv[list] = mv;
                info.ref_idx[list] = ref_idx;
                match entry {
                    Some(re) => {
                        info.ref_id[list] = re.id;
                        info.ref_poc[list] = re.poc;
                        info.long_term[list] = re.long_term;
                    }
                    None => {
                        info.ref_id[list] = -1;
                        info.ref_poc[list] = 0;
                        info.long_term[list] = false;
                    }
                }
            }
        }
    }

    fn decode_skip_mb(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        dpb: &Dpb,
        addr: u32,
    ) -> Result<()> {
        {
            let mb = &mut mbs[addr as usize];
            mb.skipped = true;
            mb.class = if self.header.slice_type.is_b() {
                MbClass::BSkip
            } else {
                MbClass::PSkip
            };
            mb.cbp = 0;
            mb.qp = self.qp;
            mb.qpc = self.chroma_qps(self.qp);
        }
        self.last_dquant = 0;

        if self.header.slice_type.is_b() {
            let (mv0, mv1, ref0, ref1) = self.derive_direct_mv(mbs, pic, dpb, addr, 0, 0)?;
            self.store_mv(pic, mbs, addr, 0, 0, 0, 4, 4, mv0, ref0);
            self.store_mv(pic, mbs, addr, 1, 0, 0, 4, 4, mv1, ref1);
            self.predict_inter_partition(mbs, pic, dpb, addr, 0, 0, 16, 16)?;
        } else {
            // P_Skip (8.4.1.1): zero vector when A or B is missing or
            // zero-referenced with a zero vector, else the median predictor.
            let cands = self.mv_candidates(mbs, pic, addr, 0, 0, 0, 16);
            let [a, b, _] = cands;
            let zero_cond = |c: &MvCandidate| {
                !c.available || (c.ref_idx == 0 && c.mv == MotionVector::ZERO)
            };
            let mv = if zero_cond(&a) || zero_cond(&b) {
                MotionVector::ZERO
            } else {
                predict_mv(&cands, 0, 0, 0, (16, 16))
            };
            self.store_mv(pic, mbs, addr, 0, 0, 0, 4, 4, mv, 0);
            self.store_mv(pic, mbs, addr, 1, 0, 0, 4, 4, MotionVector::ZERO, -1);
            self.predict_inter_partition(mbs, pic, dpb, addr, 0, 0, 16, 16)?;
        }
        Ok(())
    }

    /// Spatial or temporal direct motion for one 4x4 block origin.
    fn derive_direct_mv(
        &self,
        mbs: &[Macroblock],
        pic: &Picture,
        dpb: &Dpb,
        addr: u32,
        bx: usize,
        by: usize,
    ) -> Result<(MotionVector, MotionVector, i8, i8)> {
        if self.lists.l1.is_empty() {
            return Err(DecodeError::SliceLoss(
                "direct mode without an L1 reference".to_string(),
            ));
        }

        // Co-located block in the first L1 reference.
        let col_entry = self.lists.l1[0];
        let col_pic = dpb.picture(col_entry.handle).ok_or_else(|| {
            DecodeError::SliceLoss("co-located reference vanished".to_string())
        })?;
        let (mx, my) = self.mb_origin(mbs, addr);
        let col_info = *col_pic.mv_info_at(
            (mx / 4 + bx).min(col_pic.blocks_per_row() - 1),
            (my / 4 + by).min(col_pic.height() / 4 - 1),
        );

        if self.header.direct_spatial_mv_pred_flag {
            // Spatial direct (8.4.1.2.2).
            let mut refs = [-1i8; 2];
            let mut mvs = [MotionVector::ZERO; 2];
            for list in 0..2 {
                let cands = self.mv_candidates(mbs, pic, addr, list, 0, 0, 16);
                let mut min_ref = i32::MAX;
                for c in cands.iter() {
                    if c.available && c.ref_idx >= 0 {
                        min_ref = min_ref.min(c.ref_idx);
                    }
                }
                if min_ref != i32::MAX {
                    refs[list] = min_ref as i8;
                    mvs[list] = predict_mv(&cands, min_ref, 0, 0, (16, 16));
                }
            }
            if refs[0] < 0 && refs[1] < 0 {
                return Ok((MotionVector::ZERO, MotionVector::ZERO, 0, 0));
            }
            // Co-located zero-MV collapse: a static short-term co-located
            // block pulls the matching list to zero motion.
            let col_static = !col_entry.long_term
                && col_info.ref_idx[0] <= 0
                && col_info.mv[0].x.abs() <= 1
                && col_info.mv[0].y.abs() <= 1;
            for list in 0..2 {
                if refs[list] == 0 && col_static {
                    mvs[list] = MotionVector::ZERO;
                }
            }
            Ok((mvs[0], mvs[1], refs[0], refs[1]))
        } else {
            // Temporal direct (8.4.1.2.3): scale the co-located vector.
            let col_list = if col_info.ref_idx[0] >= 0 { 0 } else { 1 };
            let col_mv = col_info.mv[col_list];
            let ref0 = map_col_to_list0(&self.lists, &col_info, col_list).unwrap_or(0);
            let scale = self
                .direct_scales
                .get(ref0 as usize)
                .copied()
                .unwrap_or(9999);
            let (mv0, mv1) = temporal_scale_mv(col_mv, scale);
            Ok((mv0, mv1, ref0, 0))
        }
    }

    fn decode_inter_mb(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        dpb: &Dpb,
        addr: u32,
        class: MbClass,
        b_dirs: [PredDir; 2],
    ) -> Result<()> {
        if class.is_intra() {
            unreachable!("intra classes are handled by the intra paths");
        }
        let (num_l0, num_l1) = self.header.active_refs();
        let is_b = self.header.slice_type.is_b();

        // Partition geometry: per 8x8 block directions and shapes.
        match class {
            MbClass::P8x8 | MbClass::P8x8Ref0 | MbClass::B8x8 => {
                for b8 in 0..4 {
                    let code = self.parse_sub_mb_type()?;
                    let (parts, w, h, dir) = if is_b {
                        decode_b_sub_mb_type(code)?
                    } else {
                        decode_p_sub_mb_type(code)?
                    };
                    let mb = &mut mbs[addr as usize];
                    mb.sub_mb_types[b8] = code;
                    mb.b8_parts[b8] = parts;
                    mb.b8_part_size[b8] = (w, h);
                    mb.b8_dir[b8] = dir;
                }
            }
            MbClass::BDirect16x16 => {
                for b8 in 0..4 {
                    mbs[addr as usize].b8_dir[b8] = PredDir::Direct;
                }
            }
            _ => {
                let parts = class.num_partitions();
                let (w, h) = class.partition_size();
                for b8 in 0..4 {
                    let mb = &mut mbs[addr as usize];
                    mb.b8_part_size[b8] = (w, h);
                    mb.b8_dir[b8] = if is_b {
                        let part = match class {
                            MbClass::B16x8 => b8 / 2,
                            MbClass::B8x16 => b8 % 2,
                            _ => 0,
                        };
                        b_dirs[part.min(parts - 1)]
                    } else {
                        PredDir::L0
                    };
                }
            }
        }

        // Reference indices, then vector differences, in list order.
        let partitions = self.mb_partitions(mbs, addr, class);
        for list in 0..2 {
            let num_active = if list == 0 { num_l0 } else { num_l1 };
            for part in &partitions {
                if !part.dir.uses_list(list) || part.dir == PredDir::Direct {
                    continue;
                }
                // One ref_idx per 8x8 region: only the partition at the
                // region origin carries it.
                let b8_origin = ((part.bx / 2) * 2, (part.by / 2) * 2);
                if (part.bx, part.by) != b8_origin {
                    continue;
                }
                let all_ref0 = class == MbClass::P8x8Ref0;
                let ref_idx = if all_ref0 {
                    0
                } else {
                    self.parse_ref_idx(mbs, pic, addr, list, part.bx, part.by, num_active)?
                };
                let b8 = (part.by / 2) * 2 + part.bx / 2;
                mbs[addr as usize].ref_idx[list][b8] = ref_idx as i8;
                // Store the reference early so the MVP of following
                // partitions sees it.
                let (w4, h4) = if part.w4 * part.h4 < 4 {
                    (2, 2)
                } else {
                    (part.w4, part.h4)
                };
                self.store_mv(
                    pic,
                    mbs,
                    addr,
                    list,
                    b8_origin.0,
                    b8_origin.1,
                    w4.min(4),
                    h4.min(4),
                    MotionVector::ZERO,
                    ref_idx as i8,
                );
            }
        }

        for list in 0..2 {
            for part in &partitions {
                match part.dir {
                    PredDir::Direct => {
                        if list == 0 {
                            let (mv0, mv1, ref0, ref1) =
                                self.derive_direct_mv(mbs, pic, dpb, addr, part.bx, part.by)?;
                            self.store_mv(
                                pic, mbs, addr, 0, part.bx, part.by, part.w4, part.h4, mv0, ref0,
                            );
                            self.store_mv(
                                pic, mbs, addr, 1, part.bx, part.by, part.w4, part.h4, mv1, ref1,
                            );
                        }
                        continue;
                    }
                    dir if !dir.uses_list(list) => continue,
                    _ => {}
                }

                let b8 = (part.by / 2) * 2 + part.bx / 2;
                let ref_idx = mbs[addr as usize].ref_idx[list][b8];
                let mvd_x = self.parse_mvd(mbs, addr, list, part.bx, part.by, 0)?;
                let mvd_y = self.parse_mvd(mbs, addr, list, part.bx, part.by, 1)?;

                let cands =
                    self.mv_candidates(mbs, pic, addr, list, part.bx, part.by, part.w4 * 4);
                let pred = predict_mv(
                    &cands,
                    ref_idx as i32,
                    part.bx * 4,
                    part.by * 4,
                    (part.w4 * 4, part.h4 * 4),
                );
                let mv = MotionVector::new(pred.x + mvd_x, pred.y + mvd_y);

                let mb = &mut mbs[addr as usize];
                for j in 0..part.h4 {
                    for i in 0..part.w4 {
                        mb.mvd[list][part.by + j][part.bx + i] = [mvd_x, mvd_y];
                    }
                }
                self.store_mv(
                    pic, mbs, addr, list, part.bx, part.by, part.w4, part.h4, mv, ref_idx,
                );
            }
        }

        // Coded block pattern and residual.
        let cbp = self.parse_cbp(mbs, addr, false)?;
        mbs[addr as usize].cbp = cbp;

        if cbp != 0 {
            // transform_size_8x8_flag applies only when every partition is
            // at least 8x8 and direct regions can be inferred at 8x8.
            let parts_allow = match class {
                MbClass::P8x8 | MbClass::P8x8Ref0 | MbClass::B8x8 => {
                    mbs[addr as usize]
                        .b8_part_size
                        .iter()
                        .all(|&(w, h)| w == 8 && h == 8)
                        && (!mbs[addr as usize]
                            .b8_dir
                            .iter()
                            .any(|d| *d == PredDir::Direct)
                            || self.sps.direct_8x8_inference_flag)
                }
                MbClass::BDirect16x16 => self.sps.direct_8x8_inference_flag,
                _ => true,
            };
            if (cbp & 15) != 0 && self.pps.transform_8x8_mode_flag && parts_allow {
                let flag = self.parse_transform_size_flag(mbs, addr)?;
                mbs[addr as usize].transform_size_8x8 = flag;
            }
            let delta = self.parse_mb_qp_delta()?;
            mbs[addr as usize].qp_delta = delta;
            self.update_qp(delta);
        } else {
            self.last_dquant = 0;
        }
        let qp = self.qp;
        mbs[addr as usize].qp = qp;
        mbs[addr as usize].qpc = self.chroma_qps(qp);

        self.read_luma_residual(mbs, pic, addr, false)?;

        // Motion compensation plus residual per partition.
        for part in &partitions {
            self.predict_inter_partition(
                mbs,
                pic,
                dpb,
                addr,
                part.bx * 4,
                part.by * 4,
                part.w4 * 4,
                part.h4 * 4,
            )?;
        }
        self.add_luma_residual(mbs, pic, addr)?;
        self.decode_chroma(mbs, pic, addr, Some(()))?;
        Ok(())
    }

    fn mb_partitions(&self, mbs: &[Macroblock], addr: u32, class: MbClass) -> Vec<Partition> {
        let mb = &mbs[addr as usize];
        let mut parts = Vec::new();
        match class {
            MbClass::P16x16 | MbClass::B16x16 | MbClass::BDirect16x16 | MbClass::PSkip
            | MbClass::BSkip => {
                parts.push(Partition {
                    bx: 0,
                    by: 0,
                    w4: 4,
                    h4: 4,
                    dir: mb.b8_dir[0],
                });
            }
            MbClass::P16x8 | MbClass::B16x8 => {
                for p in 0..2 {
                    parts.push(Partition {
                        bx: 0,
                        by: p * 2,
                        w4: 4,
                        h4: 2,
                        dir: mb.b8_dir[p * 2],
                    });
                }
            }
            MbClass::P8x16 | MbClass::B8x16 => {
                for p in 0..2 {
                    parts.push(Partition {
                        bx: p * 2,
                        by: 0,
                        w4: 2,
                        h4: 4,
                        dir: mb.b8_dir[p],
                    });
                }
            }
            _ => {
                for b8 in 0..4 {
                    let (w, h) = mb.b8_part_size[b8];
                    let (w4, h4) = (w / 4, h / 4);
                    let (ox, oy) = ((b8 % 2) * 2, (b8 / 2) * 2);
                    let mut sub = Vec::new();
                    match (w4, h4) {
                        (2, 2) => sub.push((0, 0)),
                        (2, 1) => {
                            sub.push((0, 0));
                            sub.push((0, 1));
                        }
                        (1, 2) => {
                            sub.push((0, 0));
                            sub.push((1, 0));
                        }
                        _ => {
                            for j in 0..2 {
                                for i in 0..2 {
                                    sub.push((i, j));
                                }
                            }
                        }
                    }
                    for (i, j) in sub {
                        parts.push(Partition {
                            bx: ox + i * w4,
                            by: oy + j * h4,
                            w4,
                            h4,
                            dir: mb.b8_dir[b8],
                        });
                    }
                }
            }
        }
        parts
    }

    /// Run motion compensation for one partition using the vectors already
    /// stored in the picture, applying weighted prediction.
    #[allow(clippy::too_many_arguments)]
    fn predict_inter_partition(
        &mut self,
        mbs: &[Macroblock],
        pic: &mut Picture,
        dpb: &Dpb,
        addr: u32,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
    ) -> Result<()> {
        let (mx, my) = self.mb_origin(mbs, addr);
        let (px, py) = (mx + x, my + y);
        let info = *pic.mv_info_at(px / 4, py / 4);

        let max_y = (1i32 << self.sps.bit_depth_luma()) - 1;
        let max_c = (1i32 << self.sps.bit_depth_chroma()) - 1;
        let chroma_type = self.sps.chroma_array_type();
        let (shift_x, shift_y) = match chroma_type {
            1 => (1u32, 1u32),
            2 => (1, 0),
            _ => (0, 0),
        };
        let cw = w >> shift_x;
        let ch = h >> shift_y;
        let cx = px >> shift_x;
        let cy = py >> shift_y;

        let mut blocks_y: [[[u16; 16]; 16]; 2] = [[[0; 16]; 16]; 2];
        let mut blocks_c: [[[[u16; 16]; 16]; 2]; 2] = [[[[0; 16]; 16]; 2]; 2];
        let mut used = [false; 2];

        for list in 0..2 {
            let ref_idx = info.ref_idx[list];
            if ref_idx < 0 {
                continue;
            }
            let entry = self
                .lists
                .list(list)
                .get(ref_idx as usize)
                .copied()
                .ok_or_else(|| {
                    DecodeError::SyntaxViolation(format!(
                        "ref_idx {} outside list {}",
                        ref_idx, list
                    ))
                })?;
            let ref_pic = dpb.picture(entry.handle).ok_or_else(|| {
                DecodeError::SliceLoss("reference picture vanished".to_string())
            })?;

            mc_luma(&ref_pic.luma, px, py, w, h, info.mv[list], max_y, &mut blocks_y[list]);
            if chroma_type != 0 {
                if let Some(ref_chroma) = ref_pic.chroma.as_ref() {
                    for c in 0..2 {
                        if chroma_type == 3 {
                            mc_luma(
                                &ref_chroma[c],
                                px,
                                py,
                                w,
                                h,
                                info.mv[list],
                                max_c,
                                &mut blocks_c[list][c],
                            );
                        } else {
                            mc_chroma(
                                &ref_chroma[c],
                                cx,
                                cy,
                                cw,
                                ch,
                                info.mv[list],
                                shift_x,
                                shift_y,
                                &mut blocks_c[list][c],
                            );
                        }
                    }
                }
            }
            used[list] = true;
        }

        let weights_active = self.weights.explicit
            || (!self.weights.implicit.is_empty() && used[0] && used[1]);

        let write_luma = |pic: &mut Picture, block: &[[u16; 16]; 16]| {
            for j in 0..h {
                for i in 0..w {
                    pic.luma.set(px + i, py + j, block[j][i]);
                }
            }
        };

        match (used[0], used[1]) {
            (true, false) | (false, true) => {
                let list = if used[0] { 0 } else { 1 };
                if self.weights.explicit {
                    let ref_idx = info.ref_idx[list] as usize;
                    let entry = if list == 0 {
                        self.weights.l0.get(ref_idx)
                    } else {
                        self.weights.l1.get(ref_idx)
                    };
                    if let Some(wt) = entry.copied() {
                        weight_block(
                            &mut blocks_y[list],
                            w,
                            h,
                            wt.luma_weight,
                            wt.luma_offset,
                            self.weights.luma_log2_denom,
                            max_y,
                        );
                        for c in 0..2 {
                            weight_block(
                                &mut blocks_c[list][c],
                                cw,
                                ch,
                                wt.chroma_weight[c],
                                wt.chroma_offset[c],
                                self.weights.chroma_log2_denom,
                                max_c,
                            );
                        }
                    }
                }
                write_luma(pic, &blocks_y[list]);
                if chroma_type != 0 {
                    if let Some(chroma) = pic.chroma.as_mut() {
                        let (ww, hh) = if chroma_type == 3 { (w, h) } else { (cw, ch) };
                        for c in 0..2 {
                            for j in 0..hh {
                                for i in 0..ww {
                                    chroma[c].set(cx + i, cy + j, blocks_c[list][c][j][i]);
                                }
                            }
                        }
                    }
                }
            }
            (true, true) => {
                let mut dst = [[0u16; 16]; 16];
                let (r0, r1) = (info.ref_idx[0] as usize, info.ref_idx[1] as usize);
                let luma_weights = if self.weights.explicit {
                    let e0 = self.weights.l0[r0.min(self.weights.l0.len() - 1)];
                    let e1 = self.weights.l1[r1.min(self.weights.l1.len() - 1)];
                    Some((
                        e0.luma_weight,
                        e1.luma_weight,
                        bipred_offset(&e0, &e1, None),
                        self.weights.luma_log2_denom,
                    ))
                } else if weights_active {
                    let (w0, w1) = self.weights.implicit[r0.min(self.weights.implicit.len() - 1)]
                        [r1.min(self.weights.implicit[0].len() - 1)];
                    Some((w0, w1, 0, 5))
                } else {
                    None
                };
                bipred_blocks(&mut dst, &blocks_y[0], &blocks_y[1], w, h, luma_weights, max_y);
                write_luma(pic, &dst);

                if chroma_type != 0 {
                    let (ww, hh) = if chroma_type == 3 { (w, h) } else { (cw, ch) };
                    for c in 0..2 {
                        let chroma_weights = if self.weights.explicit {
                            let e0 = self.weights.l0[r0.min(self.weights.l0.len() - 1)];
                            let e1 = self.weights.l1[r1.min(self.weights.l1.len() - 1)];
                            Some((
                                e0.chroma_weight[c],
                                e1.chroma_weight[c],
                                bipred_offset(&e0, &e1, Some(c)),
                                self.weights.chroma_log2_denom,
                            ))
                        } else if weights_active {
                            let (w0, w1) = self.weights.implicit
                                [r0.min(self.weights.implicit.len() - 1)]
                                [r1.min(self.weights.implicit[0].len() - 1)];
                            Some((w0, w1, 0, 5))
                        } else {
                            None
                        };
                        let mut cdst = [[0u16; 16]; 16];
                        bipred_blocks(
                            &mut cdst,
                            &blocks_c[0][c],
                            &blocks_c[1][c],
                            ww,
                            hh,
                            chroma_weights,
                            max_c,
                        );
                        if let Some(chroma) = pic.chroma.as_mut() {
                            for j in 0..hh {
                                for i in 0..ww {
                                    chroma[c].set(cx + i, cy + j, cdst[j][i]);
                                }
                            }
                        }
                    }
                }
            }
            (false, false) => {
                return Err(DecodeError::SyntaxViolation(
                    "inter partition without any reference".to_string(),
                ))
            }
        }
        Ok(())
    }

    // -- residual -----------------------------------------------------------

    fn cbf_ctx_inc(
        &self,
        mbs: &[Macroblock],
        addr: u32,
        bit: u8,
        bx: i32,
        by: i32,
        chroma_size: Option<(i32, i32)>,
        is_intra: bool,
        cbf_so_far: u64,
    ) -> u8 {
        let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
        let (max_w, max_h) = chroma_size.unwrap_or((16, 16));
        let pix_a = nb.get_4x4_neighbour(addr, bx - 1, by, max_w, max_h);
        let pix_b = nb.get_4x4_neighbour(addr, bx, by - 1, max_w, max_h);

        let bit_of = |pix: &crate::neighbour::PixelPos, base: u8, per_block: bool| -> u8 {
            if !pix.available {
                return is_intra as u8;
            }
            if pix.mb_addr == addr {
                let b = if per_block {
                    base + (4 * pix.y + pix.x) as u8
                } else {
                    base
                };
                return ((cbf_so_far >> b) & 1) as u8;
            }
            let nb_mb = &mbs[pix.mb_addr as usize];
            if nb_mb.class == MbClass::IPcm {
                return 1;
            }
            let b = if per_block {
                base + (4 * pix.y + pix.x) as u8
            } else {
                base
            };
            ((nb_mb.cbf >> b) & 1) as u8
        };

        let per_block = bit != CBF_LUMA_DC_BIT && bit != 17 && bit != 18;
        let base = match bit {
            0 => 0,
            17 | 18 => bit,
            b if b >= 19 => 19 + 16 * ((b - 19) / 16),
            _ => 1,
        };
        let left = bit_of(&pix_a, base, per_block);
        let up = bit_of(&pix_b, base, per_block);
        2 * up + left
    }

    fn read_luma_dc(&mut self, mbs: &mut [Macroblock], addr: u32) -> Result<()> {
        let field = self.field_scan(&mbs[addr as usize]);
        let mut dc = [[0i32; 4]; 4];

        match &mut self.entropy {
            Entropy::Cavlc(reader) => {
                let nb = NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                let nc = nb.predict_nnz(addr, 0, 0, 0);
                let block = read_residual_block_cavlc(reader, nc, 16)?;
                let coeffs = block.to_scan_order(16);
                let scan = if field { &FIELD_SCAN_4X4 } else { &ZIGZAG_SCAN_4X4 };
                for (k, &(x, y)) in scan.iter().enumerate() {
                    dc[y as usize][x as usize] = coeffs[k];
                }
                mbs[addr as usize].nz_coeff[0][0][0] = block.total_coeff;
                if block.total_coeff > 0 {
                    mbs[addr as usize].set_cbf_bit(CBF_LUMA_DC_BIT);
                }
            }
            Entropy::Cabac { .. } => {
                let inc = self.cbf_ctx_inc(mbs, addr, CBF_LUMA_DC_BIT, 0, 0, None, true, 0);
                let mut coeffs = [0i32; 64];
                let coded = match &mut self.entropy {
                    Entropy::Cabac { engine, ctxs } => read_residual_block_cabac(
                        engine,
                        ctxs,
                        block_cat::LUMA_16DC,
                        field,
                        Some(inc),
                        &mut coeffs,
                    )?,
                    _ => unreachable!(),
                };
                if coded {
                    mbs[addr as usize].set_cbf_bit(CBF_LUMA_DC_BIT);
                }
                let scan = if field { &FIELD_SCAN_4X4 } else { &ZIGZAG_SCAN_4X4 };
                for (k, &(x, y)) in scan.iter().enumerate() {
                    dc[y as usize][x as usize] = coeffs[k];
                }
            }
        }

        // Hadamard and DC scaling (8.5.10); bypass keeps the raw levels.
        let qp_scaled = self.qp + self.sps.qp_bd_offset_y();
        let bypass = self.sps.qpprime_y_zero_transform_bypass_flag && qp_scaled == 0;
        if !bypass {
            ihadamard_4x4(&mut dc);
            let scale = &self.inv_scale_intra[0].scale_4x4[(qp_scaled % 6) as usize];
            scale_luma_dc(&mut dc, scale, qp_scaled);
        }
        for j in 0..4 {
            for i in 0..4 {
                self.cof[0][j * 4][i * 4] = dc[j][i];
            }
        }
        Ok(())
    }

    /// Read the luma AC/4x4/8x8 residual for the current MB into `cof`.
    fn read_luma_residual(
        &mut self,
        mbs: &mut [Macroblock],
        _pic: &Picture,
        addr: u32,
        i16x16: bool,
    ) -> Result<()> {
        let cbp = mbs[addr as usize].cbp;
        let is_intra = mbs[addr as usize].is_intra();
        let transform_8x8 = mbs[addr as usize].transform_size_8x8;
        let field = self.field_scan(&mbs[addr as usize]);
        let qp_scaled = self.qp + self.sps.qp_bd_offset_y();
        let qp_per = (qp_scaled / 6) as u8;
        let qp_rem = (qp_scaled % 6) as usize;
        let bypass = self.sps.qpprime_y_zero_transform_bypass_flag && qp_scaled == 0;
        let scale = if is_intra {
            &self.inv_scale_intra[0]
        } else {
            &self.inv_scale_inter[0]
        };
        let scale4 = scale.scale_4x4[qp_rem];
        let scale8 = scale.scale_8x8[qp_rem];
        let start = if i16x16 { 1 } else { 0 };
        let max_coeff = 16 - start;

        for i8x8 in 0..4usize {
            if cbp & (1 << i8x8) == 0 {
                continue;
            }
            let (ox, oy) = ((i8x8 % 2) * 2, (i8x8 / 2) * 2);

            if transform_8x8 && !self.is_cabac() {
                // CAVLC splits the 8x8 into four interleaved 4x4 reads.
                let mut coeffs8 = [0i32; 64];
                for i4 in 0..4usize {
                    let bx = ox + i4 % 2;
                    let by = oy + i4 / 2;
                    let nb =
                        NeighbourCtx::new(self.width_mbs, self.pic_size_in_mbs, self.mbaff, mbs);
                    let nc = nb.predict_nnz(addr, 0, bx, by);
                    let block = match &mut self.entropy {
                        Entropy::Cavlc(reader) => read_residual_block_cavlc(reader, nc, 16)?,
                        _ => unreachable!(),
                    };
                    mbs[addr as usize].nz_coeff[0][by][bx] = block.total_coeff;
                    if block.total_coeff > 0 {
                        mbs[addr as usize].set_cbf_bit(cbf_luma_bit(bx, by));
                    }
                    let coeffs = block.to_scan_order(16);
                    for (k, &c) in coeffs.iter().enumerate() {
                        coeffs8[4 * k + i4] = c;
                    }
                }
                self.place_8x8(&coeffs8, ox, oy, field, &scale8, qp_per, bypass);
            } else if transform_8x8 {
                let inc = None; // LUMA_8x8 has no coded_block_flag
                let mut coeffs = [0i32; 64];
                let coded = match &mut self.entropy {
                    Entropy::Cabac { engine, ctxs } => read_residual_block_cabac(
                        engine,
                        ctxs,
                        block_cat::LUMA_8X8,
                        field,
                        inc,
                        &mut coeffs,
                    )?,
                    _ => unreachable!(),
                };
                if coded {
                    for j in 0..2 {
                        for i in 0..2 {
                            mbs[addr as usize].set_cbf_bit(cbf_luma_bit(ox + i, oy + j));
                            mbs[addr as usize].nz_coeff[0][oy + j][ox + i] = 4;
                        }
                    }
                }
                self.place_8x8(&coeffs, ox, oy, field, &scale8, qp_per, bypass);
            } else {
                for i4 in 0..4usize {
                    let bx = ox + i4 % 2;
                    let by = oy + i4 / 2;
                    let cat = if i16x16 {
                        block_cat::LUMA_16AC
                    } else {
                        block_cat::LUMA_4X4
                    };
                    let coeffs: [i32; 16] = match &mut self.entropy {
                        Entropy::Cavlc(_) => {
                            let nb = NeighbourCtx::new(
                                self.width_mbs,
                                self.pic_size_in_mbs,
                                self.mbaff,
                                mbs,
                            );
                            let nc = nb.predict_nnz(addr, 0, bx, by);
                            let block = match &mut self.entropy {
                                Entropy::Cavlc(reader) => {
                                    read_residual_block_cavlc(reader, nc, max_coeff)?
                                }
                                _ => unreachable!(),
                            };
                            mbs[addr as usize].nz_coeff[0][by][bx] = block.total_coeff;
                            if block.total_coeff > 0 {
                                mbs[addr as usize].set_cbf_bit(cbf_luma_bit(bx, by));
                            }
                            block.to_scan_order(max_coeff)
                        }
                        Entropy::Cabac { .. } => {
                            let bit = cbf_luma_bit(bx, by);
                            let inc = self.cbf_ctx_inc(
                                mbs,
                                addr,
                                bit,
                                bx as i32 * 4,
                                by as i32 * 4,
                                None,
                                is_intra,
                                mbs[addr as usize].cbf,
                            );
                            let mut coeffs64 = [0i32; 64];
                            let coded = match &mut self.entropy {
                                Entropy::Cabac { engine, ctxs } => read_residual_block_cabac(
                                    engine,
                                    ctxs,
                                    cat,
                                    field,
                                    Some(inc),
                                    &mut coeffs64,
                                )?,
                                _ => unreachable!(),
                            };
                            if coded {
                                mbs[addr as usize].set_cbf_bit(bit);
                                mbs[addr as usize].nz_coeff[0][by][bx] = 1;
                            }
                            let mut out = [0i32; 16];
                            out[..max_coeff].copy_from_slice(&coeffs64[..max_coeff]);
                            out
                        }
                    };

                    let scan = if field { &FIELD_SCAN_4X4 } else { &ZIGZAG_SCAN_4X4 };
                    for (k, &c) in coeffs.iter().enumerate().take(max_coeff) {
                        if c == 0 {
                            continue;
                        }
                        let (sx, sy) = scan[k + start];
                        let (sx, sy) = (sx as usize, sy as usize);
                        self.cof[0][by * 4 + sy][bx * 4 + sx] = if bypass {
                            c
                        } else {
                            dequant_4x4(c, &scale4, sy, sx, qp_per)
                        };
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn place_8x8(
        &mut self,
        coeffs: &[i32; 64],
        ox: usize,
        oy: usize,
        field: bool,
        scale8: &[[i32; 8]; 8],
        qp_per: u8,
        bypass: bool,
    ) {
        let scan = if field { &FIELD_SCAN_8X8 } else { &ZIGZAG_SCAN_8X8 };
        for (k, &c) in coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }
            let (sx, sy) = scan[k];
            let (sx, sy) = (sx as usize, sy as usize);
            self.cof[0][oy * 4 + sy][ox * 4 + sx] = if bypass {
                c
            } else {
                dequant_8x8(c, scale8, sy, sx, qp_per)
            };
        }
    }

    /// Add the (already dequantised) luma residual onto the motion-compensated
    /// prediction in the picture.
    fn add_luma_residual(
        &mut self,
        mbs: &[Macroblock],
        pic: &mut Picture,
        addr: u32,
    ) -> Result<()> {
        let (mx, my) = self.mb_origin(mbs, addr);
        let max_y = (1i32 << self.sps.bit_depth_luma()) - 1;
        let transform_8x8 = mbs[addr as usize].transform_size_8x8;
        let cbp = mbs[addr as usize].cbp;

        if transform_8x8 {
            for b8 in 0..4 {
                if cbp & (1 << b8) == 0 {
                    continue;
                }
                let (ox, oy) = ((b8 % 2) * 8, (b8 / 2) * 8);
                let mut block = [[0i32; 8]; 8];
                for j in 0..8 {
                    for i in 0..8 {
                        block[j][i] = self.cof[0][oy + j][ox + i];
                    }
                }
                itrans_8x8(&mut block);
                for j in 0..8 {
                    for i in 0..8 {
                        let v = pic.luma.get(mx + ox + i, my + oy + j) as i32 + block[j][i];
                        pic.luma.set(mx + ox + i, my + oy + j, clip_pixel(v, max_y));
                    }
                }
            }
        } else {
            for by in 0..4 {
                for bx in 0..4 {
                    let b8 = (by / 2) * 2 + bx / 2;
                    if cbp & (1 << b8) == 0 {
                        continue;
                    }
                    let mut block = [[0i32; 4]; 4];
                    for j in 0..4 {
                        for i in 0..4 {
                            block[j][i] = self.cof[0][by * 4 + j][bx * 4 + i];
                        }
                    }
                    itrans_4x4(&mut block);
                    for j in 0..4 {
                        for i in 0..4 {
                            let x = mx + bx * 4 + i;
                            let y = my + by * 4 + j;
                            let v = pic.luma.get(x, y) as i32 + block[j][i];
                            pic.luma.set(x, y, clip_pixel(v, max_y));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse the chroma residual, run intra prediction when `inter` is None
    /// and reconstruct both chroma planes.
    fn decode_chroma(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        addr: u32,
        inter: Option<()>,
    ) -> Result<()> {
        let chroma_type = self.sps.chroma_array_type();
        if chroma_type == 0 {
            return Ok(());
        }
        if chroma_type == 3 {
            // 4:4:4 chroma planes reuse the luma residual machinery; kept to
            // the flat-QP path here.
            return self.decode_chroma_444(mbs, pic, addr, inter);
        }

        let (mx, my) = self.mb_origin(mbs, addr);
        let w = self.sps.mb_width_c() as usize;
        let h = self.sps.mb_height_c() as usize;
        let cx = mx * w / 16;
        let cy = my * h / 16;
        let cbp = mbs[addr as usize].cbp;
        let is_intra = mbs[addr as usize].is_intra();
        let field = self.field_scan(&mbs[addr as usize]);
        let max_c = (1i32 << self.sps.bit_depth_chroma()) - 1;
        let num_dc = if chroma_type == 2 { 8 } else { 4 };
        let dc_cat = if chroma_type == 2 {
            block_cat::CHROMA_DC_2X4
        } else {
            block_cat::CHROMA_DC
        };

        // Intra prediction fills the prediction first.
        if inter.is_none() {
            let avail = self.intra_avail_chroma(mbs, addr);
            let mode = mbs[addr as usize].intra_chroma_pred_mode;
            for c in 0..2 {
                let mut pred = [[0u16; 16]; 16];
                {
                    let chroma = pic.chroma.as_ref().unwrap();
                    intra_chroma(
                        &chroma[c],
                        cx,
                        cy,
                        w,
                        h,
                        mode,
                        &avail,
                        self.sps.bit_depth_chroma(),
                        &mut pred,
                    )?;
                }
                let chroma = pic.chroma.as_mut().unwrap();
                for j in 0..h {
                    for i in 0..w {
                        chroma[c].set(cx + i, cy + j, pred[j][i]);
                    }
                }
            }
        }

        // DC coefficients.
        let mut dc_vals = [[0i32; 8]; 2];
        if cbp > 15 {
            for c in 0..2 {
                let coeffs: [i32; 64] = match &mut self.entropy {
                    Entropy::Cavlc(reader) => {
                        let nc = if chroma_type == 1 { -1 } else { -2 };
                        let block = read_residual_block_cavlc(reader, nc, num_dc)?;
                        let mut out = [0i32; 64];
                        let scanned = block.to_scan_order(num_dc);
                        out[..num_dc].copy_from_slice(&scanned[..num_dc]);
                        if block.total_coeff > 0 {
                            mbs[addr as usize].set_cbf_bit(cbf_chroma_dc_bit(c));
                        }
                        out
                    }
                    Entropy::Cabac { .. } => {
                        let bit = cbf_chroma_dc_bit(c);
                        let inc = self.cbf_ctx_inc(
                            mbs,
                            addr,
                            bit,
                            0,
                            0,
                            Some((w as i32, h as i32)),
                            is_intra,
                            mbs[addr as usize].cbf,
                        );
                        let mut out = [0i32; 64];
                        let coded = match &mut self.entropy {
                            Entropy::Cabac { engine, ctxs } => read_residual_block_cabac(
                                engine,
                                ctxs,
                                dc_cat,
                                field,
                                Some(inc),
                                &mut out,
                            )?,
                            _ => unreachable!(),
                        };
                        if coded {
                            mbs[addr as usize].set_cbf_bit(bit);
                        }
                        out
                    }
                };
                dc_vals[c][..num_dc].copy_from_slice(&coeffs[..num_dc]);
            }
        }

        // Dequantise/transform the chroma DC.
        let qp_bd_c = self.sps.qp_bd_offset_c();
        let qpc = mbs[addr as usize].qpc;
        let mut dc_out = [[0i32; 8]; 2];
        for c in 0..2 {
            let scale = if is_intra {
                &self.inv_scale_intra[c + 1]
            } else {
                &self.inv_scale_inter[c + 1]
            };
            if chroma_type == 1 {
                let qp = qpc[c] + qp_bd_c;
                let mut vals = [0i32; 4];
                // Levels arrive in the 2x2 raster scan.
                for (k, &(x, y)) in CHROMA_DC_SCAN_2X2.iter().enumerate() {
                    vals[(y * 2 + x) as usize] = dc_vals[c][k];
                }
                let mut out = ihadamard_2x2(vals);
                scale_chroma_dc_420(&mut out, &scale.scale_4x4[(qp % 6) as usize], qp);
                dc_out[c][..4].copy_from_slice(&out);
            } else {
                let qp_dc = qpc[c] + 3 + qp_bd_c;
                let mut grid = [[0i32; 4]; 2];
                for (k, &(x, y)) in CHROMA_DC_SCAN_2X4.iter().enumerate() {
                    grid[x as usize][y as usize] = dc_vals[c][k];
                }
                let mut out = ihadamard_2x4(grid);
                scale_chroma_dc_422(&mut out, &scale.scale_4x4[(qp_dc % 6) as usize], qp_dc);
                for y in 0..4 {
                    for x in 0..2 {
                        dc_out[c][y * 2 + x] = out[x][y];
                    }
                }
            }
        }

        // AC blocks.
        let blocks_x = w / 4;
        let blocks_y = h / 4;
        let mut ac = [[[0i32; 16]; 8]; 2];
        if cbp > 31 {
            for c in 0..2 {
                for by in 0..blocks_y {
                    for bx in 0..blocks_x {
                        let blk = by * blocks_x + bx;
                        let coeffs: [i32; 16] = match &mut self.entropy {
                            Entropy::Cavlc(_) => {
                                let nb = NeighbourCtx::new(
                                    self.width_mbs,
                                    self.pic_size_in_mbs,
                                    self.mbaff,
                                    mbs,
                                );
                                let nc = nb.predict_nnz_chroma(
                                    addr,
                                    c,
                                    bx,
                                    by,
                                    w as i32,
                                    h as i32,
                                );
                                let block = match &mut self.entropy {
                                    Entropy::Cavlc(reader) => {
                                        read_residual_block_cavlc(reader, nc, 15)?
                                    }
                                    _ => unreachable!(),
                                };
                                mbs[addr as usize].nz_coeff[c + 1][by][bx] = block.total_coeff;
                                if block.total_coeff > 0 {
                                    mbs[addr as usize]
                                        .set_cbf_bit(cbf_chroma_ac_bit(c, bx, by));
                                }
                                block.to_scan_order(15)
                            }
                            Entropy::Cabac { .. } => {
                                let bit = cbf_chroma_ac_bit(c, bx, by);
                                let inc = self.cbf_ctx_inc(
                                    mbs,
                                    addr,
                                    bit,
                                    bx as i32 * 4,
                                    by as i32 * 4,
                                    Some((w as i32, h as i32)),
                                    is_intra,
                                    mbs[addr as usize].cbf,
                                );
                                let mut out64 = [0i32; 64];
                                let coded = match &mut self.entropy {
                                    Entropy::Cabac { engine, ctxs } => read_residual_block_cabac(
                                        engine,
                                        ctxs,
                                        block_cat::CHROMA_AC,
                                        field,
                                        Some(inc),
                                        &mut out64,
                                    )?,
                                    _ => unreachable!(),
                                };
                                if coded {
                                    mbs[addr as usize].set_cbf_bit(bit);
                                    mbs[addr as usize].nz_coeff[c + 1][by][bx] = 1;
                                }
                                let mut out = [0i32; 16];
                                out[..15].copy_from_slice(&out64[..15]);
                                out
                            }
                        };
                        ac[c][blk][..15].copy_from_slice(&coeffs[..15]);
                    }
                }
            }
        }

        // Reconstruct: per 4x4 chroma block DC + AC -> inverse transform.
        let scan = if field { &FIELD_SCAN_4X4 } else { &ZIGZAG_SCAN_4X4 };
        for c in 0..2 {
            let scale = if is_intra {
                &self.inv_scale_intra[c + 1]
            } else {
                &self.inv_scale_inter[c + 1]
            };
            let qp = qpc[c] + qp_bd_c;
            let qp_per = (qp / 6) as u8;
            let scale4 = scale.scale_4x4[(qp % 6) as usize];
            for by in 0..blocks_y {
                for bx in 0..blocks_x {
                    let blk = by * blocks_x + bx;
                    let mut block = [[0i32; 4]; 4];
                    block[0][0] = dc_out[c][blk];
                    for k in 0..15 {
                        let level = ac[c][blk][k];
                        if level == 0 {
                            continue;
                        }
                        let (sx, sy) = scan[k + 1];
                        block[sy as usize][sx as usize] =
                            dequant_4x4(level, &scale4, sy as usize, sx as usize, qp_per);
                    }
                    itrans_4x4(&mut block);
                    let chroma = pic.chroma.as_mut().unwrap();
                    for j in 0..4 {
                        for i in 0..4 {
                            let x = cx + bx * 4 + i;
                            let y = cy + by * 4 + j;
                            let v = chroma[c].get(x, y) as i32 + block[j][i];
                            chroma[c].set(x, y, clip_pixel(v, max_c));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn decode_chroma_444(
        &mut self,
        mbs: &mut [Macroblock],
        pic: &mut Picture,
        addr: u32,
        inter: Option<()>,
    ) -> Result<()> {
        // High 4:4:4 without separate planes: each chroma plane follows the
        // luma block structure. Intra uses the chroma predictors at 16x16.
        let (mx, my) = self.mb_origin(mbs, addr);
        let cbp = mbs[addr as usize].cbp;
        let is_intra = mbs[addr as usize].is_intra();
        let field = self.field_scan(&mbs[addr as usize]);
        let qp_bd_c = self.sps.qp_bd_offset_c();
        let qpc = mbs[addr as usize].qpc;
        let max_c = (1i32 << self.sps.bit_depth_chroma()) - 1;

        if inter.is_none() {
            let avail = self.intra_avail_chroma(mbs, addr);
            let mode = mbs[addr as usize].intra_chroma_pred_mode;
            for c in 0..2 {
                let mut pred = [[0u16; 16]; 16];
                {
                    let chroma = pic.chroma.as_ref().unwrap();
                    intra_chroma(
                        &chroma[c],
                        mx,
                        my,
                        16,
                        16,
                        mode,
                        &avail,
                        self.sps.bit_depth_chroma(),
                        &mut pred,
                    )?;
                }
                let chroma = pic.chroma.as_mut().unwrap();
                for j in 0..16 {
                    for i in 0..16 {
                        chroma[c].set(mx + i, my + j, pred[j][i]);
                    }
                }
            }
        }

        for c in 0..2 {
            let qp = qpc[c] + qp_bd_c;
            let qp_per = (qp / 6) as u8;
            let qp_rem = (qp % 6) as usize;
            let scale = if is_intra {
                &self.inv_scale_intra[c + 1]
            } else {
                &self.inv_scale_inter[c + 1]
            };
            let scale4 = scale.scale_4x4[qp_rem];
            let cat = if c == 0 {
                block_cat::CB_4X4
            } else {
                block_cat::CR_4X4
            };
            for by in 0..4usize {
                for bx in 0..4usize {
                    let b8 = (by / 2) * 2 + bx / 2;
                    if cbp & (1 << b8) == 0 {
                        continue;
                    }
                    let coeffs: [i32; 16] = match &mut self.entropy {
                        Entropy::Cavlc(_) => {
                            let nb = NeighbourCtx::new(
                                self.width_mbs,
                                self.pic_size_in_mbs,
                                self.mbaff,
                                mbs,
                            );
                            let nc = nb.predict_nnz(addr, c + 1, bx, by);
                            let block = match &mut self.entropy {
                                Entropy::Cavlc(reader) => read_residual_block_cavlc(reader, nc, 16)?,
                                _ => unreachable!(),
                            };
                            mbs[addr as usize].nz_coeff[c + 1][by][bx] = block.total_coeff;
                            block.to_scan_order(16)
                        }
                        Entropy::Cabac { .. } => {
                            let bit = cbf_luma_bit(bx, by);
                            let inc = self.cbf_ctx_inc(
                                mbs,
                                addr,
                                bit,
                                bx as i32 * 4,
                                by as i32 * 4,
                                None,
                                is_intra,
                                mbs[addr as usize].cbf,
                            );
                            let mut out64 = [0i32; 64];
                            match &mut self.entropy {
                                Entropy::Cabac { engine, ctxs } => read_residual_block_cabac(
                                    engine,
                                    ctxs,
                                    cat,
                                    field,
                                    Some(inc),
                                    &mut out64,
                                )?,
                                _ => unreachable!(),
                            };
                            let mut out = [0i32; 16];
                            out.copy_from_slice(&out64[..16]);
                            out
                        }
                    };
                    let scan = if field { &FIELD_SCAN_4X4 } else { &ZIGZAG_SCAN_4X4 };
                    let mut block = [[0i32; 4]; 4];
                    for (k, &level) in coeffs.iter().enumerate() {
                        if level == 0 {
                            continue;
                        }
                        let (sx, sy) = scan[k];
                        block[sy as usize][sx as usize] =
                            dequant_4x4(level, &scale4, sy as usize, sx as usize, qp_per);
                    }
                    itrans_4x4(&mut block);
                    let chroma = pic.chroma.as_mut().unwrap();
                    for j in 0..4 {
                        for i in 0..4 {
                            let x = mx + bx * 4 + i;
                            let y = my + by * 4 + j;
                            let v = chroma[c].get(x, y) as i32 + block[j][i];
                            chroma[c].set(x, y, clip_pixel(v, max_c));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn intra_avail_chroma(&self, mbs: &[Macroblock], addr: u32) -> IntraAvail {
        // Chroma availability mirrors the luma MB neighbours.
        self.intra_avail(mbs, addr, 0, 0, 16)
    }
}

/// One inter partition in 4x4 block units.
struct Partition {
    bx: usize,
    by: usize,
    w4: usize,
    h4: usize,
    dir: PredDir,
}

/// 4x4 luma block decoding order (a..p) to (x, y) block coordinates.
fn block_scan_to_xy(blk: usize) -> (usize, usize) {
    let b8 = blk / 4;
    let b4 = blk % 4;
    ((b8 % 2) * 2 + b4 % 2, (b8 / 2) * 2 + b4 / 2)
}

/// Whether the up-right neighbour of a 4x4 block inside the same MB has been
/// reconstructed yet in decoding order.
fn up_right_is_decoded(bx: usize, by: usize) -> bool {
    !matches!((bx, by), (1, 1) | (3, 1) | (1, 3) | (3, 3) | (3, 2))
}

fn cabac_i_mb_type(
    engine: &mut CabacEngine,
    ctxs: &mut CabacContexts,
    ctx_inc: usize,
) -> Result<u32> {
    let ctx = &mut ctxs.mb_type_i;
    if !engine.decision(&mut ctx[3 + ctx_inc])? {
        return Ok(0);
    }
    if engine.terminate()? {
        return Ok(25);
    }
    let mut mb_type = 1u32;
    mb_type += engine.decision(&mut ctx[3 + 3])? as u32 * 12;
    if engine.decision(&mut ctx[3 + 4])? {
        mb_type += engine.decision(&mut ctx[3 + 5])? as u32 * 4 + 4;
    }
    mb_type += engine.decision(&mut ctx[3 + 6])? as u32 * 2;
    mb_type += engine.decision(&mut ctx[3 + 7])? as u32;
    Ok(mb_type)
}

fn cabac_p_mb_type(engine: &mut CabacEngine, ctxs: &mut CabacContexts) -> Result<u32> {
    // Table 9-37 prefix; values map directly onto the raw code space.
    let p = &mut ctxs.mb_type_p;
    if engine.decision(&mut p[0])? {
        // Intra suffix.
        let suffix = cabac_i_mb_type_suffix(engine, ctxs)?;
        return Ok(5 + suffix);
    }
    if !engine.decision(&mut p[1])? {
        if engine.decision(&mut p[2])? {
            Ok(2) // P8x16
        } else {
            Ok(0) // P16x16
        }
    } else if engine.decision(&mut p[3])? {
        Ok(1) // P16x8
    } else {
        Ok(3) // P8x8
    }
}

fn cabac_i_mb_type_suffix(engine: &mut CabacEngine, ctxs: &mut CabacContexts) -> Result<u32> {
    let ctx = &mut ctxs.mb_type_i;
    if !engine.decision(&mut ctx[3])? {
        return Ok(0);
    }
    if engine.terminate()? {
        return Ok(25);
    }
    let mut mb_type = 1u32;
    mb_type += engine.decision(&mut ctx[4])? as u32 * 12;
    if engine.decision(&mut ctx[5])? {
        mb_type += engine.decision(&mut ctx[6])? as u32 * 4 + 4;
    }
    mb_type += engine.decision(&mut ctx[7])? as u32 * 2;
    mb_type += engine.decision(&mut ctx[8])? as u32;
    Ok(mb_type)
}

fn cabac_b_mb_type(
    engine: &mut CabacEngine,
    ctxs: &mut CabacContexts,
    ctx_inc: usize,
) -> Result<u32> {
    let b = &mut ctxs.mb_type_b;
    if !engine.decision(&mut b[ctx_inc])? {
        return Ok(0); // B_Direct_16x16
    }
    if !engine.decision(&mut b[3])? {
        return Ok(1 + engine.decision(&mut b[5])? as u32);
    }
    let mut mb_type = 3u32;
    if !engine.decision(&mut b[4])? {
        mb_type += engine.decision(&mut b[5])? as u32 * 4;
        mb_type += engine.decision(&mut b[5])? as u32 * 2;
        mb_type += engine.decision(&mut b[5])? as u32;
        return Ok(mb_type);
    }
    mb_type += 9;
    mb_type += engine.decision(&mut b[5])? as u32 * 8;
    mb_type += engine.decision(&mut b[5])? as u32 * 4;
    mb_type += engine.decision(&mut b[5])? as u32 * 2;
    if mb_type < 22 {
        mb_type += engine.decision(&mut b[5])? as u32;
    }
    if mb_type == 22 {
        mb_type = 23;
    } else if mb_type == 24 {
        mb_type = 11;
    } else if mb_type == 26 {
        mb_type = 22;
    }
    if mb_type == 23 {
        // Intra suffix.
        let suffix = cabac_i_mb_type_suffix(engine, ctxs)?;
        return Ok(23 + suffix);
    }
    Ok(mb_type)
}

fn map_col_to_list0(
    lists: &RefLists,
    col_info: &crate::picture::MvInfo,
    col_list: usize,
) -> Option<i8> {
    let target = col_info.ref_id[col_list];
    if target < 0 {
        return Some(0);
    }
    lists
        .l0
        .iter()
        .position(|e| e.id == target)
        .map(|p| p as i8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_scan_order() {
        // Blocks a..p follow the 8x8-then-4x4 order.
        assert_eq!(block_scan_to_xy(0), (0, 0));
        assert_eq!(block_scan_to_xy(1), (1, 0));
        assert_eq!(block_scan_to_xy(2), (0, 1));
        assert_eq!(block_scan_to_xy(3), (1, 1));
        assert_eq!(block_scan_to_xy(4), (2, 0));
        assert_eq!(block_scan_to_xy(15), (3, 3));
    }

    #[test]
    fn test_up_right_rule() {
        assert!(up_right_is_decoded(0, 0));
        assert!(up_right_is_decoded(2, 0));
        assert!(!up_right_is_decoded(1, 1));
        assert!(!up_right_is_decoded(3, 3));
    }
}

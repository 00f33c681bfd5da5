//! CABAC arithmetic decoding engine and context models.

use crate::cabac_tables::*;
use crate::error::{DecodeError, Result};
use crate::slice::SliceType;

/// One binary context: 6-bit probability state plus the MPS value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CabacContext {
    pub state: u8,
    pub mps: bool,
}

impl CabacContext {
    /// Initialize from an (m, n) pair and the slice QP (9.3.1.1).
    pub fn init(&mut self, (m, n): Init, slice_qp: i32) {
        let qp = slice_qp.clamp(0, 51);
        let pre = (((m as i32) * qp) >> 4) + n as i32;
        let pre = pre.clamp(1, 126);
        if pre <= 63 {
            self.state = (63 - pre) as u8;
            self.mps = false;
        } else {
            self.state = (pre - 64) as u8;
            self.mps = true;
        }
    }
}

/// Arithmetic decoding engine over one slice's coded data.
pub struct CabacEngine<'a> {
    data: &'a [u8],
    bit_pos: usize,
    range: u32,
    offset: u32,
    overrun_bits: u32,
}

/// Renormalisation may legitimately consume the trailing alignment bits;
/// anything past this slack is a broken slice.
const MAX_OVERRUN_BITS: u32 = 16;

impl<'a> CabacEngine<'a> {
    /// Initialize at a byte-aligned position inside the slice RBSP:
    /// codIRange = 510 and codIOffset from the first nine bits.
    pub fn new(data: &'a [u8], byte_offset: usize) -> Result<Self> {
        let mut engine = Self {
            data,
            bit_pos: byte_offset * 8,
            range: 510,
            offset: 0,
            overrun_bits: 0,
        };
        for _ in 0..9 {
            engine.offset = (engine.offset << 1) | engine.next_bit()?;
        }
        Ok(engine)
    }

    #[inline]
    fn next_bit(&mut self) -> Result<u32> {
        if self.bit_pos < self.data.len() * 8 {
            let byte = self.data[self.bit_pos >> 3];
            let bit = (byte >> (7 - (self.bit_pos & 7))) & 1;
            self.bit_pos += 1;
            Ok(bit as u32)
        } else {
            self.overrun_bits += 1;
            if self.overrun_bits > MAX_OVERRUN_BITS {
                return Err(DecodeError::BitstreamUnderflow {
                    needed: 1,
                    at: self.bit_pos,
                });
            }
            Ok(0)
        }
    }

    /// Bytes of slice data consumed so far (rounded up).
    pub fn bytes_consumed(&self) -> usize {
        (self.bit_pos + 7) / 8
    }

    /// The slice data this engine reads from (the I_PCM path reads raw
    /// samples directly).
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Restart arithmetic decoding at a byte-aligned offset, as required
    /// after an I_PCM macroblock.
    pub fn reinit_at(&mut self, byte_offset: usize) -> Result<()> {
        self.bit_pos = byte_offset * 8;
        self.range = 510;
        self.offset = 0;
        self.overrun_bits = 0;
        for _ in 0..9 {
            self.offset = (self.offset << 1) | self.next_bit()?;
        }
        Ok(())
    }

    /// Decode one bin with the given context (9.3.3.2.1).
    pub fn decision(&mut self, ctx: &mut CabacContext) -> Result<bool> {
        let state = ctx.state as usize;
        let q = ((self.range >> 6) & 3) as usize;
        let lps = RANGE_TAB_LPS[state][q] as u32;
        self.range -= lps;

        let bit;
        if self.offset >= self.range {
            // LPS path
            self.offset -= self.range;
            self.range = lps;
            bit = !ctx.mps;
            if ctx.state == 0 {
                ctx.mps = !ctx.mps;
            }
            ctx.state = TRANS_IDX_LPS[state];
        } else {
            bit = ctx.mps;
            ctx.state = trans_idx_mps(ctx.state);
        }

        while self.range < 256 {
            self.range <<= 1;
            self.offset = (self.offset << 1) | self.next_bit()?;
        }
        Ok(bit)
    }

    /// Decode one equiprobable bin (9.3.3.2.3).
    pub fn bypass(&mut self) -> Result<bool> {
        self.offset = (self.offset << 1) | self.next_bit()?;
        if self.offset >= self.range {
            self.offset -= self.range;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Decode end_of_slice_flag (9.3.3.2.4). No renormalisation on a
    /// terminate result.
    pub fn terminate(&mut self) -> Result<bool> {
        self.range -= 2;
        if self.offset >= self.range {
            Ok(true)
        } else {
            while self.range < 256 {
                self.range <<= 1;
                self.offset = (self.offset << 1) | self.next_bit()?;
            }
            Ok(false)
        }
    }

    /// Unbounded unary code; bin b selects incs[min(b, incs.len()-1)].
    pub fn unary(&mut self, ctxs: &mut [CabacContext], incs: &[usize]) -> Result<u32> {
        let mut value = 0u32;
        loop {
            let inc = incs[(value as usize).min(incs.len() - 1)];
            if !self.decision(&mut ctxs[inc])? {
                return Ok(value);
            }
            value += 1;
            if value > 128 {
                return Err(DecodeError::SyntaxViolation(
                    "runaway unary binarisation".to_string(),
                ));
            }
        }
    }

    /// Truncated unary code with an upper bound.
    pub fn truncated_unary(
        &mut self,
        ctxs: &mut [CabacContext],
        incs: &[usize],
        c_max: u32,
    ) -> Result<u32> {
        let mut value = 0u32;
        while value < c_max {
            let inc = incs[(value as usize).min(incs.len() - 1)];
            if !self.decision(&mut ctxs[inc])? {
                break;
            }
            value += 1;
        }
        Ok(value)
    }

    /// Fixed-length code of `bits` bins sharing one context.
    pub fn fixed_length(&mut self, ctx: &mut CabacContext, bits: u8) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | self.decision(ctx)? as u32;
        }
        Ok(value)
    }

    /// k-th order Exp-Golomb suffix in bypass mode.
    pub fn exp_golomb_bypass(&mut self, mut k: u32) -> Result<u32> {
        let mut value = 0u32;
        loop {
            if self.bypass()? {
                value += 1 << k;
                k += 1;
                if k > 30 {
                    return Err(DecodeError::SyntaxViolation(
                        "runaway Exp-Golomb suffix".to_string(),
                    ));
                }
            } else {
                break;
            }
        }
        while k > 0 {
            k -= 1;
            if self.bypass()? {
                value += 1 << k;
            }
        }
        Ok(value)
    }

    /// UEG3 binarisation of one motion-vector-difference component: TU prefix
    /// up to 9, Exp-Golomb order-3 escape, sign in bypass.
    pub fn mvd(&mut self, ctxs: &mut [CabacContext; 7], first_inc: usize) -> Result<i16> {
        let mut prefix = 0u32;
        loop {
            let inc = if prefix == 0 {
                first_inc
            } else {
                (prefix as usize + 2).min(6)
            };
            if !self.decision(&mut ctxs[inc])? {
                break;
            }
            prefix += 1;
            if prefix == 9 {
                break;
            }
        }
        let mut value = prefix;
        if prefix == 9 {
            value += self.exp_golomb_bypass(3)?;
        }
        if value != 0 && self.bypass()? {
            Ok(-(value as i16))
        } else {
            Ok(value as i16)
        }
    }

    /// UEG0 binarisation of coeff_abs_level_minus1: first bin with `ctx_one`,
    /// remaining TU bins with `ctx_abs`, Exp-Golomb order-0 escape at 14.
    pub fn coeff_abs_level_minus1(
        &mut self,
        ctx_one: &mut CabacContext,
        ctx_abs: &mut CabacContext,
    ) -> Result<u32> {
        if !self.decision(ctx_one)? {
            return Ok(0);
        }
        let mut value = 1u32;
        while value < 14 {
            if !self.decision(ctx_abs)? {
                return Ok(value);
            }
            value += 1;
        }
        Ok(value + self.exp_golomb_bypass(0)?)
    }
}

/// All per-slice context models, grouped by syntax-element family.
#[derive(Clone)]
pub struct CabacContexts {
    pub mb_skip: [CabacContext; 3],
    pub mb_type_i: [CabacContext; 11],
    pub mb_type_p: [CabacContext; 7],
    pub mb_type_b: [CabacContext; 9],
    pub sub_mb_type_p: [CabacContext; 3],
    pub sub_mb_type_b: [CabacContext; 4],
    pub mvd_x: [CabacContext; 7],
    pub mvd_y: [CabacContext; 7],
    pub ref_idx: [CabacContext; 6],
    pub delta_qp: [CabacContext; 4],
    pub mb_aff: [CabacContext; 3],
    pub chroma_pred: [CabacContext; 4],
    pub intra_pred: [CabacContext; 2],
    pub cbp_luma: [CabacContext; 4],
    pub cbp_chroma: [CabacContext; 8],
    pub transform_size: [CabacContext; 3],
    /// coded_block_flag per block category.
    pub cbf: [[CabacContext; 4]; 22],
    /// significant_coeff_flag, [frame/field][category][position ctx].
    pub sig_map: [[[CabacContext; 15]; 22]; 2],
    /// last_significant_coeff_flag, [frame/field][category][position ctx].
    pub last_map: [[[CabacContext; 15]; 22]; 2],
    /// coeff_abs_level greater-than-1 contexts.
    pub coeff_one: [[CabacContext; 5]; 22],
    /// coeff_abs_level remaining contexts.
    pub coeff_abs: [[CabacContext; 5]; 22],
}

impl Default for CabacContexts {
    fn default() -> Self {
        Self {
            mb_skip: Default::default(),
            mb_type_i: Default::default(),
            mb_type_p: Default::default(),
            mb_type_b: Default::default(),
            sub_mb_type_p: Default::default(),
            sub_mb_type_b: Default::default(),
            mvd_x: Default::default(),
            mvd_y: Default::default(),
            ref_idx: Default::default(),
            delta_qp: Default::default(),
            mb_aff: Default::default(),
            chroma_pred: Default::default(),
            intra_pred: Default::default(),
            cbp_luma: Default::default(),
            cbp_chroma: Default::default(),
            transform_size: Default::default(),
            cbf: [[CabacContext::default(); 4]; 22],
            sig_map: [[[CabacContext::default(); 15]; 22]; 2],
            last_map: [[[CabacContext::default(); 15]; 22]; 2],
            coeff_one: [[CabacContext::default(); 5]; 22],
            coeff_abs: [[CabacContext::default(); 5]; 22],
        }
    }
}

fn init_group<const N: usize>(ctxs: &mut [CabacContext; N], inits: &[[Init; N]; 4], model: usize, qp: i32) {
    for (ctx, &init) in ctxs.iter_mut().zip(inits[model].iter()) {
        ctx.init(init, qp);
    }
}

/// The 22 block categories collapse onto ten initialization rows; the CB and
/// CR families of 4:4:4 reuse the luma rows.
fn category_row(cat: usize) -> usize {
    match cat {
        0..=9 => cat,
        10..=15 => cat - 10,
        _ => cat - 16,
    }
}

impl CabacContexts {
    /// Initialize every context for a slice (9.3.1.1).
    pub fn init(&mut self, slice_type: SliceType, cabac_init_idc: u8, slice_qp: i32) {
        let model = if slice_type.is_intra() {
            0
        } else {
            1 + cabac_init_idc.min(2) as usize
        };
        let skip_inits = if slice_type.is_b() {
            &INIT_MB_SKIP_B
        } else {
            &INIT_MB_SKIP_P
        };

        init_group(&mut self.mb_skip, skip_inits, model, slice_qp);
        init_group(&mut self.mb_type_i, &INIT_MB_TYPE_I, model, slice_qp);
        init_group(&mut self.mb_type_p, &INIT_MB_TYPE_P, model, slice_qp);
        init_group(&mut self.mb_type_b, &INIT_MB_TYPE_B, model, slice_qp);
        init_group(&mut self.sub_mb_type_p, &INIT_SUB_MB_TYPE_P, model, slice_qp);
        init_group(&mut self.sub_mb_type_b, &INIT_SUB_MB_TYPE_B, model, slice_qp);
        init_group(&mut self.mvd_x, &INIT_MVD_X, model, slice_qp);
        init_group(&mut self.mvd_y, &INIT_MVD_Y, model, slice_qp);
        init_group(&mut self.ref_idx, &INIT_REF_IDX, model, slice_qp);
        init_group(&mut self.delta_qp, &INIT_DELTA_QP, model, slice_qp);
        init_group(&mut self.mb_aff, &INIT_MB_AFF, model, slice_qp);
        init_group(&mut self.chroma_pred, &INIT_CHROMA_PRED, model, slice_qp);
        init_group(&mut self.intra_pred, &INIT_INTRA_PRED, model, slice_qp);
        init_group(&mut self.cbp_luma, &INIT_CBP_LUMA, model, slice_qp);
        init_group(&mut self.cbp_chroma, &INIT_CBP_CHROMA, model, slice_qp);
        init_group(&mut self.transform_size, &INIT_TRANSFORM_SIZE, model, slice_qp);

        for cat in 0..22 {
            let row = category_row(cat);
            for i in 0..4 {
                self.cbf[cat][i].init(INIT_CBF[model][row][i], slice_qp);
            }
            for i in 0..15 {
                for fld in 0..2 {
                    self.sig_map[fld][cat][i].init(INIT_SIG_MAP[model][row][i], slice_qp);
                    self.last_map[fld][cat][i].init(INIT_LAST_MAP[model][row][i], slice_qp);
                }
            }
            for i in 0..5 {
                self.coeff_one[cat][i].init(INIT_COEFF_ONE[model][row][i], slice_qp);
                self.coeff_abs[cat][i].init(INIT_COEFF_ABS[model][row][i], slice_qp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_init_ranges() {
        let mut ctx = CabacContext::default();
        for qp in [0, 26, 40, 51] {
            for init in [(20i8, -15i8), (-28, 127), (0, 41), (31, 21)] {
                ctx.init(init, qp);
                assert!(ctx.state < 64);
            }
        }
        // n=63 with m=0 lands just below the MPS boundary.
        ctx.init((0, 63), 30);
        assert!(!ctx.mps);
        assert_eq!(ctx.state, 0);
        // A strongly confident init.
        ctx.init((0, 120), 30);
        assert!(ctx.mps);
        assert_eq!(ctx.state, 56);
    }

    #[test]
    fn test_engine_init_reads_nine_bits() {
        let data = [0xff, 0x80];
        let engine = CabacEngine::new(&data, 0).unwrap();
        assert_eq!(engine.range, 510);
        assert_eq!(engine.offset, 0x1ff);
    }

    #[test]
    fn test_bypass_on_zero_stream() {
        let data = [0x00, 0x00, 0x00, 0x00];
        let mut engine = CabacEngine::new(&data, 0).unwrap();
        for _ in 0..8 {
            assert!(!engine.bypass().unwrap());
        }
    }

    #[test]
    fn test_terminate() {
        // Offset 511 is >= 510 - 2: the slice terminates.
        let data = [0xff, 0x80];
        let mut engine = CabacEngine::new(&data, 0).unwrap();
        assert!(engine.terminate().unwrap());

        // Offset 0 keeps going.
        let data = [0x00, 0x00, 0x00];
        let mut engine = CabacEngine::new(&data, 0).unwrap();
        assert!(!engine.terminate().unwrap());
    }

    #[test]
    fn test_decision_confident_context() {
        // A state-63 MPS=1 context on a zero offset always yields the MPS and
        // stays saturated.
        let data = [0x00, 0x00, 0x00, 0x00];
        let mut engine = CabacEngine::new(&data, 0).unwrap();
        let mut ctx = CabacContext { state: 63, mps: true };
        for _ in 0..16 {
            assert!(engine.decision(&mut ctx).unwrap());
        }
        assert_eq!(ctx.state, 63);
    }

    #[test]
    fn test_overrun_is_bounded() {
        let data = [0x00, 0x00];
        let mut engine = CabacEngine::new(&data, 0).unwrap();
        // Bypass reads one bit each; eventually the slack runs out.
        let mut err = None;
        for _ in 0..64 {
            if let Err(e) = engine.bypass() {
                err = Some(e);
                break;
            }
        }
        assert!(matches!(
            err,
            Some(DecodeError::BitstreamUnderflow { .. })
        ));
    }

    #[test]
    fn test_contexts_init_all_models() {
        let mut ctxs = CabacContexts::default();
        for (ty, idc) in [
            (SliceType::I, 0),
            (SliceType::P, 0),
            (SliceType::P, 2),
            (SliceType::B, 1),
        ] {
            ctxs.init(ty, idc, 26);
            assert!(ctxs.mb_skip.iter().all(|c| c.state < 64));
            assert!(ctxs.sig_map[0][2].iter().all(|c| c.state < 64));
        }
    }
}

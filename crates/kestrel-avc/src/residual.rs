//! Residual coefficient decoding: the CAVLC coeff_token / level / total_zeros
//! / run_before path and the CABAC significance-map path.

use crate::bitreader::BitReader;
use crate::cabac::{CabacContexts, CabacEngine};
use crate::cabac_tables::{
    C1_IS_DC, MAX_C2, MAX_POS, POS2CTX_LAST_8X8, POS2CTX_MAP_8X8, POS2CTX_MAP_8X8_FIELD,
    TYPE2CTX_ABS, TYPE2CTX_CBF, TYPE2CTX_LAST, TYPE2CTX_MAP, TYPE2CTX_ONE,
};
use crate::error::{DecodeError, Result};

/// Block categories shared by both entropy coders (the CABAC context tables
/// and the CAVLC nC selection key off these).
pub mod block_cat {
    pub const LUMA_16DC: usize = 0;
    pub const LUMA_16AC: usize = 1;
    pub const LUMA_8X8: usize = 2;
    pub const LUMA_8X4: usize = 3;
    pub const LUMA_4X8: usize = 4;
    pub const LUMA_4X4: usize = 5;
    pub const CHROMA_DC: usize = 6;
    pub const CHROMA_AC: usize = 7;
    pub const CHROMA_DC_2X4: usize = 8;
    pub const CHROMA_DC_4X4: usize = 9;
    pub const CB_16DC: usize = 10;
    pub const CB_16AC: usize = 11;
    pub const CB_8X8: usize = 12;
    pub const CB_4X4: usize = 15;
    pub const CR_16DC: usize = 16;
    pub const CR_16AC: usize = 17;
    pub const CR_8X8: usize = 18;
    pub const CR_4X4: usize = 21;
}

// ---------------------------------------------------------------------------
// CAVLC
// ---------------------------------------------------------------------------

const COEFF_TOKEN_LEN: [[[u8; 17]; 4]; 5] = [
    // 0 <= nC < 2
    [
        [1, 6, 8, 9, 10, 11, 13, 13, 13, 14, 14, 15, 15, 16, 16, 16, 16],
        [0, 2, 6, 8, 9, 10, 11, 13, 13, 14, 14, 15, 15, 15, 16, 16, 16],
        [0, 0, 3, 7, 8, 9, 10, 11, 13, 13, 14, 14, 15, 15, 16, 16, 16],
        [0, 0, 0, 5, 6, 7, 8, 9, 10, 11, 13, 14, 14, 15, 15, 16, 16],
    ],
    // 2 <= nC < 4
    [
        [2, 6, 6, 7, 8, 8, 9, 11, 11, 12, 12, 12, 13, 13, 13, 14, 14],
        [0, 2, 5, 6, 6, 7, 8, 9, 11, 11, 12, 12, 13, 13, 14, 14, 14],
        [0, 0, 3, 6, 6, 7, 8, 9, 11, 11, 12, 12, 13, 13, 13, 14, 14],
        [0, 0, 0, 4, 4, 5, 6, 6, 7, 9, 11, 11, 12, 13, 13, 13, 14],
    ],
    // 4 <= nC < 8
    [
        [4, 6, 6, 6, 7, 7, 7, 7, 8, 8, 9, 9, 9, 10, 10, 10, 10],
        [0, 4, 5, 5, 5, 5, 6, 6, 7, 8, 8, 9, 9, 9, 10, 10, 10],
        [0, 0, 4, 5, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 10],
        [0, 0, 0, 4, 4, 4, 4, 4, 5, 6, 7, 8, 8, 9, 10, 10, 10],
    ],
    // nC == -1 (chroma DC, 4:2:0)
    [
        [2, 6, 6, 6, 6, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 1, 6, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 3, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 6, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ],
    // nC == -2 (chroma DC, 4:2:2)
    [
        [1, 7, 7, 9, 9, 10, 11, 12, 13, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 2, 7, 7, 9, 10, 11, 12, 12, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 3, 7, 7, 9, 10, 11, 12, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 5, 6, 7, 7, 10, 11, 0, 0, 0, 0, 0, 0, 0, 0],
    ],
];

const COEFF_TOKEN_CODE: [[[u8; 17]; 4]; 5] = [
    [
        [1, 5, 7, 7, 7, 7, 15, 11, 8, 15, 11, 15, 11, 15, 11, 7, 4],
        [0, 1, 4, 6, 6, 6, 6, 14, 10, 14, 10, 14, 10, 1, 14, 10, 6],
        [0, 0, 1, 5, 5, 5, 5, 5, 13, 9, 13, 9, 13, 9, 13, 9, 5],
        [0, 0, 0, 3, 3, 4, 4, 4, 4, 4, 12, 12, 8, 12, 8, 12, 8],
    ],
    [
        [3, 11, 7, 7, 7, 4, 7, 15, 11, 15, 11, 8, 15, 11, 7, 9, 7],
        [0, 2, 7, 10, 6, 6, 6, 6, 14, 10, 14, 10, 14, 10, 11, 8, 6],
        [0, 0, 3, 9, 5, 5, 5, 5, 13, 9, 13, 9, 13, 9, 6, 10, 5],
        [0, 0, 0, 5, 4, 6, 8, 4, 4, 4, 12, 8, 12, 12, 8, 1, 4],
    ],
    [
        [15, 15, 11, 8, 15, 11, 9, 8, 15, 11, 15, 11, 8, 13, 9, 5, 1],
        [0, 14, 15, 12, 10, 8, 14, 10, 14, 14, 10, 14, 10, 7, 12, 8, 4],
        [0, 0, 13, 14, 11, 9, 13, 9, 13, 10, 13, 9, 13, 9, 11, 7, 3],
        [0, 0, 0, 12, 11, 10, 9, 8, 13, 12, 12, 12, 8, 12, 10, 6, 2],
    ],
    [
        [1, 7, 4, 3, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 1, 6, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 1, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ],
    [
        [1, 15, 14, 7, 6, 7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 1, 13, 12, 5, 6, 6, 6, 5, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 1, 11, 10, 4, 5, 5, 4, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 1, 1, 9, 8, 4, 4, 0, 0, 0, 0, 0, 0, 0, 0],
    ],
];

const TOTAL_ZEROS_LEN: [[u8; 16]; 15] = [
    [1, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 9],
    [3, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 6, 6, 6, 6, 0],
    [4, 3, 3, 3, 4, 4, 3, 3, 4, 5, 5, 6, 5, 6, 0, 0],
    [5, 3, 4, 4, 3, 3, 3, 4, 3, 4, 5, 5, 5, 0, 0, 0],
    [4, 4, 4, 3, 3, 3, 3, 3, 4, 5, 4, 5, 0, 0, 0, 0],
    [6, 5, 3, 3, 3, 3, 3, 3, 4, 3, 6, 0, 0, 0, 0, 0],
    [6, 5, 3, 3, 3, 2, 3, 4, 3, 6, 0, 0, 0, 0, 0, 0],
    [6, 4, 5, 3, 2, 2, 3, 3, 6, 0, 0, 0, 0, 0, 0, 0],
    [6, 6, 4, 2, 2, 3, 2, 5, 0, 0, 0, 0, 0, 0, 0, 0],
    [5, 5, 3, 2, 2, 2, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 4, 3, 3, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 4, 2, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
];

const TOTAL_ZEROS_CODE: [[u8; 16]; 15] = [
    [1, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 1],
    [7, 6, 5, 4, 3, 5, 4, 3, 2, 3, 2, 3, 2, 1, 0, 0],
    [5, 7, 6, 5, 4, 3, 4, 3, 2, 3, 2, 1, 1, 0, 0, 0],
    [3, 7, 5, 4, 6, 5, 4, 3, 3, 2, 2, 1, 0, 0, 0, 0],
    [5, 4, 3, 7, 6, 5, 4, 3, 2, 1, 1, 0, 0, 0, 0, 0],
    [1, 1, 7, 6, 5, 4, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0],
    [1, 1, 5, 4, 3, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0],
    [1, 1, 1, 3, 3, 2, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 1, 3, 2, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 1, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 2, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
];

const TOTAL_ZEROS_CHROMA_420_LEN: [[u8; 4]; 3] = [[1, 2, 3, 3], [1, 2, 2, 0], [1, 1, 0, 0]];
const TOTAL_ZEROS_CHROMA_420_CODE: [[u8; 4]; 3] = [[1, 1, 1, 0], [1, 1, 0, 0], [1, 0, 0, 0]];

const TOTAL_ZEROS_CHROMA_422_LEN: [[u8; 8]; 7] = [
    [1, 3, 3, 4, 4, 4, 5, 5],
    [3, 2, 3, 3, 3, 3, 3, 0],
    [3, 3, 2, 2, 3, 3, 0, 0],
    [3, 2, 2, 2, 3, 0, 0, 0],
    [2, 2, 2, 2, 0, 0, 0, 0],
    [2, 2, 1, 0, 0, 0, 0, 0],
    [1, 1, 0, 0, 0, 0, 0, 0],
];
const TOTAL_ZEROS_CHROMA_422_CODE: [[u8; 8]; 7] = [
    [1, 2, 3, 2, 3, 1, 1, 0],
    [0, 1, 1, 4, 5, 6, 7, 0],
    [0, 1, 1, 2, 6, 7, 0, 0],
    [6, 0, 1, 2, 7, 0, 0, 0],
    [0, 1, 2, 3, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 0, 0, 0, 0, 0, 0],
];

const RUN_BEFORE_LEN: [[u8; 16]; 7] = [
    [1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 2, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 2, 2, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 2, 3, 3, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 3, 3, 3, 3, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 3, 3, 3, 3, 3, 3, 4, 5, 6, 7, 8, 9, 10, 11, 0],
];
const RUN_BEFORE_CODE: [[u8; 16]; 7] = [
    [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 2, 3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 1, 3, 2, 5, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [7, 6, 5, 4, 3, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0],
];

fn match_vlc(reader: &mut BitReader, lens: &[u8], codes: &[u8]) -> Result<usize> {
    for (i, (&len, &code)) in lens.iter().zip(codes.iter()).enumerate() {
        if len == 0 || len as usize > reader.remaining_bits() {
            continue;
        }
        if reader.peek_bits(len)? == code as u32 {
            reader.skip_bits(len as usize)?;
            return Ok(i);
        }
    }
    Err(DecodeError::SyntaxViolation(
        "no matching VLC codeword".to_string(),
    ))
}

/// coeff_token: (TotalCoeff, TrailingOnes). `nc` follows 9.2.1 (-1 and -2
/// select the chroma DC tables, >= 8 the fixed-length form).
pub fn read_coeff_token(reader: &mut BitReader, nc: i32) -> Result<(u8, u8)> {
    if nc >= 8 {
        let code = reader.read_bits(6)?;
        let mut total = (code >> 2) as u8;
        let mut ones = (code & 3) as u8;
        if total == 0 && ones == 3 {
            ones = 0;
        } else {
            total += 1;
        }
        return Ok((total, ones));
    }

    let tab = match nc {
        -2 => 4,
        -1 => 3,
        n if n < 2 => 0,
        n if n < 4 => 1,
        _ => 2,
    };

    // The table rows are indexed by TrailingOnes; scan all rows for the
    // first prefix match.
    for total in 0..17usize {
        for ones in 0..4usize {
            let len = COEFF_TOKEN_LEN[tab][ones][total];
            if len == 0 || len as usize > reader.remaining_bits() {
                continue;
            }
            if reader.peek_bits(len)? == COEFF_TOKEN_CODE[tab][ones][total] as u32 {
                reader.skip_bits(len as usize)?;
                return Ok((total as u8, ones as u8));
            }
        }
    }
    Err(DecodeError::SyntaxViolation(
        "no matching coeff_token".to_string(),
    ))
}

/// One level with the adaptive suffix-length code (9.2.2.1).
pub fn read_level(reader: &mut BitReader, suffix_length: u8) -> Result<i32> {
    let mut leading_zeros = 0u32;
    while !reader.read_bit()? {
        leading_zeros += 1;
        if leading_zeros > 32 {
            return Err(DecodeError::SyntaxViolation(
                "level_prefix longer than 32".to_string(),
            ));
        }
    }
    let level_prefix = leading_zeros as i32;

    let suffix_size = if level_prefix == 14 && suffix_length == 0 {
        4
    } else if level_prefix >= 15 {
        level_prefix - 3
    } else {
        suffix_length as i32
    };

    let level_suffix = if suffix_size > 0 {
        reader.read_bits(suffix_size as u8)? as i32
    } else {
        0
    };

    let mut level_code = (level_prefix.min(15) << suffix_length) + level_suffix;
    if level_prefix >= 15 && suffix_length == 0 {
        level_code += 15;
    }
    if level_prefix >= 16 {
        level_code += (1 << (level_prefix - 3)) - 4096;
    }

    Ok(if level_code % 2 == 0 {
        (level_code + 2) >> 1
    } else {
        (-level_code - 1) >> 1
    })
}

fn read_total_zeros(reader: &mut BitReader, total_coeff: usize, max_coeff: usize) -> Result<usize> {
    let tab = total_coeff - 1;
    match max_coeff {
        4 => match_vlc(
            reader,
            &TOTAL_ZEROS_CHROMA_420_LEN[tab],
            &TOTAL_ZEROS_CHROMA_420_CODE[tab],
        ),
        8 => match_vlc(
            reader,
            &TOTAL_ZEROS_CHROMA_422_LEN[tab],
            &TOTAL_ZEROS_CHROMA_422_CODE[tab],
        ),
        _ => match_vlc(reader, &TOTAL_ZEROS_LEN[tab], &TOTAL_ZEROS_CODE[tab]),
    }
}

fn read_run_before(reader: &mut BitReader, zeros_left: usize) -> Result<usize> {
    let tab = zeros_left.min(7) - 1;
    match_vlc(reader, &RUN_BEFORE_LEN[tab], &RUN_BEFORE_CODE[tab])
}

/// A parsed CAVLC residual block: levels and runs in decoding order plus the
/// coefficient count.
#[derive(Debug, Clone, Default)]
pub struct CavlcBlock {
    pub total_coeff: u8,
    pub levels: [i32; 16],
    pub runs: [i32; 16],
}

impl CavlcBlock {
    /// Expand to coefficients indexed by scan position.
    pub fn to_scan_order(&self, max_coeff: usize) -> [i32; 16] {
        let mut out = [0i32; 16];
        let mut pos: i32 = -1;
        for k in 0..self.total_coeff as usize {
            if self.levels[k] != 0 {
                pos += self.runs[k] + 1;
                if pos < max_coeff as i32 {
                    out[pos as usize] = self.levels[k];
                }
            }
        }
        out
    }
}

/// Read one 4x4 (or chroma DC) residual block with CAVLC (9.2).
pub fn read_residual_block_cavlc(
    reader: &mut BitReader,
    nc: i32,
    max_coeff: usize,
) -> Result<CavlcBlock> {
    let (total_coeff, trailing_ones) = read_coeff_token(reader, nc)?;
    if total_coeff as usize > max_coeff {
        return Err(DecodeError::SyntaxViolation(format!(
            "TotalCoeff {} exceeds block size {}",
            total_coeff, max_coeff
        )));
    }

    let mut block = CavlcBlock {
        total_coeff,
        ..Default::default()
    };
    if total_coeff == 0 {
        return Ok(block);
    }

    let total_coeff = total_coeff as usize;
    let trailing_ones = trailing_ones as usize;
    let mut suffix_length = if total_coeff > 10 && trailing_ones < 3 {
        1u8
    } else {
        0
    };

    // Trailing ones carry only sign bits.
    if trailing_ones > 0 {
        let signs = reader.read_bits(trailing_ones as u8)?;
        let mut n = trailing_ones;
        for i in ((total_coeff - trailing_ones)..total_coeff).rev() {
            n -= 1;
            let negative = (signs >> n) & 1 != 0;
            block.levels[i] = if negative { -1 } else { 1 };
        }
    }

    for i in (0..total_coeff - trailing_ones).rev() {
        let mut level = read_level(reader, suffix_length)?;
        if i == total_coeff - 1 - trailing_ones && trailing_ones < 3 {
            level += if level > 0 { 1 } else { -1 };
        }
        block.levels[i] = level;

        if suffix_length == 0 {
            suffix_length = 1;
        }
        if level.unsigned_abs() as i32 > (3 << (suffix_length - 1)) && suffix_length < 6 {
            suffix_length += 1;
        }
    }

    let mut zeros_left = if total_coeff < max_coeff {
        read_total_zeros(reader, total_coeff, max_coeff)?
    } else {
        0
    };

    for i in (1..total_coeff).rev() {
        let run = if zeros_left > 0 {
            read_run_before(reader, zeros_left)?
        } else {
            0
        };
        block.runs[i] = run as i32;
        zeros_left -= run;
    }
    block.runs[0] = zeros_left as i32;

    Ok(block)
}

// ---------------------------------------------------------------------------
// CABAC
// ---------------------------------------------------------------------------

/// Read one residual block with CABAC (9.3.2.5 / 9.3.3.1.1.9): returns the
/// coefficient values indexed by scan position (DC skipping already applied
/// via the category's start index).
pub fn read_residual_block_cabac(
    engine: &mut CabacEngine,
    ctxs: &mut CabacContexts,
    cat: usize,
    field_scan: bool,
    coded_block_flag_ctx_inc: Option<u8>,
    coeffs: &mut [i32; 64],
) -> Result<bool> {
    coeffs.fill(0);

    // coded_block_flag, absent for the always-coded 8x8 luma category.
    if let Some(ctx_inc) = coded_block_flag_ctx_inc {
        let cbf_ctx = TYPE2CTX_CBF[cat];
        if !engine.decision(&mut ctxs.cbf[cbf_ctx][ctx_inc as usize])? {
            return Ok(false);
        }
    }

    let fld = field_scan as usize;
    let max_pos = MAX_POS[cat];
    let map_ctx = TYPE2CTX_MAP[cat];
    let last_ctx = TYPE2CTX_LAST[cat];
    let is_8x8 = max_pos == 63;

    // Significance map, interleaved with last-significant flags.
    let mut sig = [false; 64];
    let mut count = 0usize;
    let mut pos = 0usize;
    while pos < max_pos {
        let (sig_inc, last_inc) = if is_8x8 {
            let map = if field_scan {
                POS2CTX_MAP_8X8_FIELD[pos]
            } else {
                POS2CTX_MAP_8X8[pos]
            };
            (map as usize, POS2CTX_LAST_8X8[pos] as usize)
        } else {
            (pos, pos)
        };
        if engine.decision(&mut ctxs.sig_map[fld][map_ctx][sig_inc])? {
            sig[pos] = true;
            count += 1;
            if engine.decision(&mut ctxs.last_map[fld][last_ctx][last_inc])? {
                break;
            }
        }
        pos += 1;
    }
    if pos == max_pos {
        // The final position is inferred significant when reached.
        sig[max_pos] = true;
        count += 1;
    }
    if count == 0 {
        return Ok(true);
    }

    // Levels in reverse scan order with the c1/c2 adaptation.
    let one_ctx = TYPE2CTX_ONE[cat];
    let abs_ctx = TYPE2CTX_ABS[cat];
    let max_c2 = MAX_C2[cat] as usize;
    let mut c1 = 1usize;
    let mut c2 = 0usize;

    for p in (0..=max_pos).rev() {
        if !sig[p] {
            continue;
        }
        let mut one_ctx_model = ctxs.coeff_one[one_ctx][c1];
        let mut abs_ctx_model = ctxs.coeff_abs[abs_ctx][c2];
        let magnitude =
            engine.coeff_abs_level_minus1(&mut one_ctx_model, &mut abs_ctx_model)? as i32 + 1;
        ctxs.coeff_one[one_ctx][c1] = one_ctx_model;
        ctxs.coeff_abs[abs_ctx][c2] = abs_ctx_model;

        if magnitude > 1 {
            c1 = 0;
            c2 = (c2 + 1).min(max_c2);
        } else if c1 > 0 {
            c1 = (c1 + 1).min(4);
        }

        let value = if engine.bypass()? { -magnitude } else { magnitude };
        coeffs[p] = value;
    }

    Ok(true)
}

/// The start scan index for a category (AC families skip the DC position).
pub fn scan_start(cat: usize) -> usize {
    if C1_IS_DC[cat] {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::SliceType;
    use crate::testutil::BitWriter;

    #[test]
    fn test_coeff_token_zero_coeffs() {
        // nC 0, TotalCoeff 0 is the single bit '1'.
        let data = [0b1000_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(read_coeff_token(&mut reader, 0).unwrap(), (0, 0));
        assert_eq!(reader.bit_position(), 1);
    }

    #[test]
    fn test_coeff_token_one_coeff_no_ones() {
        // nC 0, TotalCoeff 1, TrailingOnes 0: '000101'.
        let data = [0b0001_0100];
        let mut reader = BitReader::new(&data);
        assert_eq!(read_coeff_token(&mut reader, 0).unwrap(), (1, 0));
        assert_eq!(reader.bit_position(), 6);
    }

    #[test]
    fn test_coeff_token_chroma_dc() {
        // nC -1, TotalCoeff 1, TrailingOnes 1: '1'.
        let data = [0b1000_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(read_coeff_token(&mut reader, -1).unwrap(), (1, 1));
    }

    #[test]
    fn test_coeff_token_fixed_length() {
        // nC >= 8: 6-bit code, TotalCoeff = code>>2 (+1), ones = code&3.
        let data = [0b0001_0100];
        let mut reader = BitReader::new(&data);
        assert_eq!(read_coeff_token(&mut reader, 8).unwrap(), (2, 1));
    }

    #[test]
    fn test_read_level_small() {
        // suffix_length 0: prefix 0 -> +1, prefix 1 -> -1, prefix 2 -> +2.
        let data = [0b1010_0100, 0b0000_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(read_level(&mut reader, 0).unwrap(), 1);
        assert_eq!(read_level(&mut reader, 0).unwrap(), -1);
        assert_eq!(read_level(&mut reader, 0).unwrap(), 2);
    }

    #[test]
    fn test_read_level_escape() {
        // suffix_length 0, prefix 15, 12-bit suffix 993 gives level -512.
        let mut w = BitWriter::new();
        w.bits(0, 15);
        w.bit(true);
        w.bits(993, 12);
        w.rbsp_trailing();
        let data = w.into_bytes();
        let mut reader = BitReader::new(&data);
        assert_eq!(read_level(&mut reader, 0).unwrap(), -512);
    }

    #[test]
    fn test_residual_block_single_dc() {
        // The scenario-1 luma DC block: TotalCoeff 1, level -512 via the
        // escape code, total_zeros 0.
        let mut w = BitWriter::new();
        w.bits(0b000101, 6); // coeff_token TC 1, T1 0
        w.bits(0, 15); // level_prefix 15
        w.bit(true);
        w.bits(993, 12); // level_suffix
        w.bit(true); // total_zeros 0 for TC 1 is '1'
        w.rbsp_trailing();
        let data = w.into_bytes();
        let mut reader = BitReader::new(&data);
        let block = read_residual_block_cavlc(&mut reader, 0, 16).unwrap();
        assert_eq!(block.total_coeff, 1);
        let coeffs = block.to_scan_order(16);
        assert_eq!(coeffs[0], -512);
        assert!(coeffs[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_residual_block_trailing_ones() {
        // TotalCoeff 2, TrailingOnes 2 at nC 0: code '01', then two sign
        // bits (+, -), total_zeros for TC 2 ... code '111' is 0 zeros.
        let mut w = BitWriter::new();
        w.bits(1, 3); // coeff_token TC2 T1 2
        w.bit(false); // + sign
        w.bit(true); // - sign
        w.bits(7, 3); // total_zeros 0
        w.rbsp_trailing();
        let data = w.into_bytes();
        let mut reader = BitReader::new(&data);
        let block = read_residual_block_cavlc(&mut reader, 0, 16).unwrap();
        assert_eq!(block.total_coeff, 2);
        let coeffs = block.to_scan_order(16);
        // Decoding order is high-frequency first: levels[1] is the last
        // coefficient in scan order.
        assert_eq!(coeffs[0], -1);
        assert_eq!(coeffs[1], 1);
    }

    #[test]
    fn test_cabac_residual_cbf_zero() {
        let data = [0x00u8; 8];
        let mut engine = CabacEngine::new(&data, 0).unwrap();
        let mut ctxs = CabacContexts::default();
        ctxs.init(SliceType::I, 0, 26);
        // Force the cbf context to a confidently-zero state.
        let cbf_ctx = TYPE2CTX_CBF[block_cat::LUMA_4X4];
        ctxs.cbf[cbf_ctx][0].state = 63;
        ctxs.cbf[cbf_ctx][0].mps = false;
        let mut coeffs = [0i32; 64];
        let coded = read_residual_block_cabac(
            &mut engine,
            &mut ctxs,
            block_cat::LUMA_4X4,
            false,
            Some(0),
            &mut coeffs,
        )
        .unwrap();
        assert!(!coded);
        assert!(coeffs.iter().all(|&c| c == 0));
    }
}

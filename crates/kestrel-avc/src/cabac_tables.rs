//! CABAC constant tables: the LPS range table, state transitions and the
//! context initialization (m, n) pairs grouped per syntax-element family.
//!
//! Initialization values are selected per slice by (slice class,
//! cabac_init_idc); index 0 holds the I/SI values and 1..3 hold
//! cabac_init_idc 0..2 for P/SP/B slices.

/// rangeTabLPS: LPS subinterval width per (probability state, quantised range).
pub const RANGE_TAB_LPS: [[u8; 4]; 64] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
    [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
    [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
    [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
    [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
    [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [28, 35, 41, 48],
    [27, 33, 39, 45], [25, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
    [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
    [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
    [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
    [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
    [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
    [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
    [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];

/// transIdxLPS: next state after decoding the LPS.
pub const TRANS_IDX_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12, 13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21,
    21, 23, 23, 24, 24, 26, 26, 27, 27, 29, 29, 30, 30, 32, 32, 33, 33, 35, 35, 36, 36, 37, 37,
    38, 38, 39, 39, 40, 40, 41, 41, 42, 42, 43, 43, 44, 63,
];

/// transIdxMPS: next state after decoding the MPS.
#[inline]
pub fn trans_idx_mps(state: u8) -> u8 {
    if state < 62 {
        state + 1
    } else {
        state
    }
}

/// An (m, n) initialization pair.
pub type Init = (i8, i8);

// Block-category mappings for the residual context families (the 22 coded
// block kinds collapse onto shared context rows).
pub const TYPE2CTX_CBF: [usize; 22] = [
    0, 1, 2, 3, 3, 4, 5, 6, 5, 5, 10, 11, 12, 13, 13, 14, 16, 17, 18, 19, 19, 20,
];
pub const TYPE2CTX_MAP: [usize; 22] = [
    0, 1, 2, 3, 4, 5, 6, 7, 6, 6, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21,
];
pub const TYPE2CTX_LAST: [usize; 22] = TYPE2CTX_MAP;
pub const TYPE2CTX_ONE: [usize; 22] = [
    0, 1, 2, 3, 3, 4, 5, 6, 5, 5, 10, 11, 12, 13, 13, 14, 16, 17, 18, 19, 19, 20,
];
pub const TYPE2CTX_ABS: [usize; 22] = TYPE2CTX_ONE;
/// Highest context index used by coeff_abs per block category.
pub const MAX_C2: [u8; 22] = [
    4, 4, 4, 4, 4, 4, 3, 4, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
];
/// Number of scan positions per block category (maxNumCoeff - 1).
pub const MAX_POS: [usize; 22] = [
    15, 14, 63, 31, 31, 15, 3, 14, 7, 15, 15, 14, 63, 31, 31, 15, 15, 14, 63, 31, 31, 15,
];
/// Categories whose first scan position is the DC coefficient.
pub const C1_IS_DC: [bool; 22] = [
    true, false, true, true, true, true, true, false, true, true, true, false, true, true, true,
    true, true, false, true, true, true, true,
];

/// Scan-position to context maps for the 8x8 significance families.
pub const POS2CTX_MAP_8X8: [u8; 64] = [
    0, 1, 2, 3, 4, 5, 5, 4, 4, 3, 3, 4, 4, 4, 5, 5, 4, 4, 4, 4, 3, 3, 6, 7, 7, 7, 8, 9, 10, 9, 8,
    7, 7, 6, 11, 12, 13, 11, 6, 7, 8, 9, 14, 10, 9, 8, 6, 11, 12, 13, 11, 6, 9, 14, 10, 9, 11, 12,
    13, 11, 14, 10, 12, 14,
];
pub const POS2CTX_MAP_8X8_FIELD: [u8; 64] = [
    0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 4, 4, 4, 4, 3, 3, 6, 7, 7, 7, 8, 9, 10, 9, 8,
    7, 7, 6, 11, 12, 13, 11, 6, 7, 8, 9, 14, 10, 9, 8, 6, 11, 12, 13, 11, 6, 9, 14, 10, 9, 11, 12,
    13, 11, 14, 10, 12, 14,
];
pub const POS2CTX_LAST_8X8: [u8; 64] = [
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 6, 7, 7,
    8, 8,
];

// ---------------------------------------------------------------------------
// Initialization tables. Row 0: I/SI. Rows 1..3: cabac_init_idc 0..2.
// ---------------------------------------------------------------------------

/// mb_type tree shared by I slices and the intra suffix of P/B mb_type.
pub const INIT_MB_TYPE_I: [[Init; 11]; 4] = [
    [(20, -15), (2, 54), (3, 74), (20, -15), (2, 54), (3, 74), (-28, 127), (-23, 104), (-6, 53), (-1, 54), (7, 51)],
    [(20, -15), (2, 54), (3, 74), (20, -15), (2, 54), (3, 74), (-28, 127), (-23, 104), (-6, 53), (-1, 54), (7, 51)],
    [(20, -15), (2, 54), (3, 74), (20, -15), (2, 54), (3, 74), (-28, 127), (-23, 104), (-6, 53), (-1, 54), (7, 51)],
    [(20, -15), (2, 54), (3, 74), (20, -15), (2, 54), (3, 74), (-28, 127), (-23, 104), (-6, 53), (-1, 54), (7, 51)],
];

/// mb_skip_flag, P/SP slices (ctx 11..13).
pub const INIT_MB_SKIP_P: [[Init; 3]; 4] = [
    [(23, 33), (23, 2), (21, 0)],
    [(23, 33), (23, 2), (21, 0)],
    [(22, 25), (34, 0), (16, 0)],
    [(29, 16), (25, 0), (14, 0)],
];

/// mb_skip_flag, B slices (ctx 24..26).
pub const INIT_MB_SKIP_B: [[Init; 3]; 4] = [
    [(18, 64), (9, 43), (29, 0)],
    [(18, 64), (9, 43), (29, 0)],
    [(26, 34), (19, 22), (40, 0)],
    [(20, 40), (20, 10), (29, 0)],
];

/// P/SP mb_type prefix (ctx 14..20).
pub const INIT_MB_TYPE_P: [[Init; 7]; 4] = [
    [(18, 64), (9, 43), (29, 0), (26, 67), (16, 90), (9, 104), (-46, 127)],
    [(18, 64), (9, 43), (29, 0), (26, 67), (16, 90), (9, 104), (-46, 127)],
    [(26, 34), (19, 22), (40, 0), (57, 2), (41, 36), (26, 69), (-45, 127)],
    [(20, 40), (20, 10), (29, 0), (54, 0), (37, 42), (12, 97), (-32, 127)],
];

/// B mb_type prefix (ctx 27..35).
pub const INIT_MB_TYPE_B: [[Init; 9]; 4] = [
    [(26, -19), (22, -17), (26, -17), (30, -25), (28, -20), (33, -23), (37, -27), (33, -23), (40, -28)],
    [(26, -19), (22, -17), (26, -17), (30, -25), (28, -20), (33, -23), (37, -27), (33, -23), (40, -28)],
    [(57, -2), (41, 36), (26, 69), (-45, 127), (-15, 101), (-4, 76), (-6, 71), (-13, 79), (5, 52)],
    [(54, 0), (37, 42), (12, 97), (-32, 127), (-22, 117), (-2, 74), (-4, 85), (-24, 102), (5, 57)],
];

/// P/SP sub_mb_type (ctx 21..23).
pub const INIT_SUB_MB_TYPE_P: [[Init; 3]; 4] = [
    [(3, 62), (38, -17), (-17, 124)],
    [(3, 62), (38, -17), (-17, 124)],
    [(0, 61), (36, -15), (-20, 127)],
    [(7, 57), (31, -10), (-22, 127)],
];

/// B sub_mb_type (ctx 36..39).
pub const INIT_SUB_MB_TYPE_B: [[Init; 4]; 4] = [
    [(-11, 115), (-12, 63), (-2, 68), (-15, 84)],
    [(-11, 115), (-12, 63), (-2, 68), (-15, 84)],
    [(-13, 108), (-3, 46), (-1, 65), (-1, 57)],
    [(-16, 96), (-7, 59), (-1, 59), (-2, 58)],
];

/// mvd horizontal component (ctx 40..46).
pub const INIT_MVD_X: [[Init; 7]; 4] = [
    [(-3, 69), (-6, 81), (-11, 96), (0, 58), (7, 36), (12, 27), (15, 18)],
    [(-3, 69), (-6, 81), (-11, 96), (0, 58), (7, 36), (12, 27), (15, 18)],
    [(-2, 69), (-5, 82), (-10, 96), (2, 59), (2, 75), (-3, 87), (-3, 100)],
    [(-11, 89), (-15, 103), (-21, 116), (19, 57), (20, 58), (4, 84), (6, 96)],
];

/// mvd vertical component (ctx 47..53).
pub const INIT_MVD_Y: [[Init; 7]; 4] = [
    [(-17, 49), (-10, 60), (5, 64), (12, 50), (22, 41), (24, 32), (31, 22)],
    [(-17, 49), (-10, 60), (5, 64), (12, 50), (22, 41), (24, 32), (31, 22)],
    [(-11, 55), (-12, 65), (-2, 64), (9, 49), (22, 47), (24, 37), (29, 30)],
    [(-19, 57), (-16, 64), (-8, 68), (12, 45), (21, 54), (23, 41), (27, 32)],
];

/// ref_idx (ctx 54..59).
pub const INIT_REF_IDX: [[Init; 6]; 4] = [
    [(-7, 67), (-5, 74), (-4, 74), (-5, 80), (-7, 72), (1, 58)],
    [(-7, 67), (-5, 74), (-4, 74), (-5, 80), (-7, 72), (1, 58)],
    [(-1, 66), (-1, 77), (1, 70), (-2, 86), (-5, 72), (0, 61)],
    [(3, 55), (-4, 79), (-2, 75), (-12, 97), (-7, 50), (1, 60)],
];

/// mb_qp_delta (ctx 60..63).
pub const INIT_DELTA_QP: [[Init; 4]; 4] = [
    [(0, 41), (0, 63), (0, 63), (0, 63)],
    [(0, 41), (0, 63), (0, 63), (0, 63)],
    [(0, 41), (0, 63), (0, 63), (0, 63)],
    [(0, 41), (0, 63), (0, 63), (0, 63)],
];

/// intra_chroma_pred_mode (ctx 64..67).
pub const INIT_CHROMA_PRED: [[Init; 4]; 4] = [
    [(-9, 83), (4, 86), (0, 97), (-7, 72)],
    [(-9, 83), (4, 86), (0, 97), (-7, 72)],
    [(-9, 92), (-17, 101), (-3, 74), (-9, 88)],
    [(-8, 85), (-17, 100), (-4, 73), (-10, 88)],
];

/// prev_intra4x4_pred_mode_flag / rem mode (ctx 68..69).
pub const INIT_INTRA_PRED: [[Init; 2]; 4] = [
    [(13, 41), (3, 62)],
    [(13, 41), (3, 62)],
    [(13, 41), (3, 62)],
    [(13, 41), (3, 62)],
];

/// mb_field_decoding_flag (ctx 70..72).
pub const INIT_MB_AFF: [[Init; 3]; 4] = [
    [(0, 45), (-4, 78), (-3, 96)],
    [(0, 45), (-4, 78), (-3, 96)],
    [(13, 15), (7, 51), (2, 80)],
    [(7, 34), (-9, 88), (-20, 127)],
];

/// coded_block_pattern luma bits (ctx 73..76).
pub const INIT_CBP_LUMA: [[Init; 4]; 4] = [
    [(-27, 126), (-28, 98), (-25, 101), (-23, 67)],
    [(-27, 126), (-28, 98), (-25, 101), (-23, 67)],
    [(-27, 126), (-28, 98), (-25, 101), (-23, 67)],
    [(-27, 126), (-28, 98), (-25, 101), (-23, 67)],
];

/// coded_block_pattern chroma bits (ctx 77..84).
pub const INIT_CBP_CHROMA: [[Init; 8]; 4] = [
    [(-28, 82), (-20, 94), (-16, 83), (-22, 110), (-21, 91), (-18, 102), (-13, 93), (-29, 127)],
    [(-28, 82), (-20, 94), (-16, 83), (-22, 110), (-21, 91), (-18, 102), (-13, 93), (-29, 127)],
    [(-31, 95), (-22, 97), (-19, 91), (-25, 116), (-24, 98), (-20, 108), (-16, 99), (-31, 127)],
    [(-29, 88), (-21, 95), (-17, 88), (-23, 112), (-22, 94), (-19, 104), (-14, 95), (-30, 127)],
];

/// transform_size_8x8_flag (ctx 399..401).
pub const INIT_TRANSFORM_SIZE: [[Init; 3]; 4] = [
    [(31, 21), (31, 31), (25, 50)],
    [(12, 40), (11, 51), (14, 59)],
    [(25, 32), (21, 49), (21, 54)],
    [(21, 33), (19, 50), (17, 61)],
];

// Residual families are initialized per collapsed block-category row
// (0..9 luma/chroma; the CB/CR rows of 4:4:4 reuse the luma values).

/// coded_block_flag (ctx 85..104 and the 8x8 extension).
pub const INIT_CBF: [[[Init; 4]; 10]; 4] = [
    [
        [(-17, 123), (-12, 115), (-16, 122), (-11, 115)],
        [(-12, 63), (-2, 68), (-15, 84), (-13, 104)],
        [(-3, 70), (-8, 93), (-10, 90), (-30, 127)],
        [(-1, 74), (-6, 97), (-7, 91), (-20, 127)],
        [(-4, 56), (-5, 82), (-7, 76), (-22, 125)],
        [(-7, 93), (-11, 87), (-3, 77), (-5, 71)],
        [(-4, 63), (-4, 68), (-12, 84), (-7, 62)],
        [(-7, 65), (-14, 81), (-9, 71), (-8, 60)],
        [(-10, 67), (1, 68), (0, 77), (2, 64)],
        [(0, 68), (-5, 78), (-8, 79), (-9, 83)],
    ],
    [
        [(-17, 123), (-12, 115), (-16, 122), (-11, 115)],
        [(-12, 63), (-2, 68), (-15, 84), (-13, 104)],
        [(-3, 70), (-8, 93), (-10, 90), (-30, 127)],
        [(-1, 74), (-6, 97), (-7, 91), (-20, 127)],
        [(-4, 56), (-5, 82), (-7, 76), (-22, 125)],
        [(-7, 93), (-11, 87), (-3, 77), (-5, 71)],
        [(-4, 63), (-4, 68), (-12, 84), (-7, 62)],
        [(-7, 65), (-14, 81), (-9, 71), (-8, 60)],
        [(-10, 67), (1, 68), (0, 77), (2, 64)],
        [(0, 68), (-5, 78), (-8, 79), (-9, 83)],
    ],
    [
        [(-13, 103), (-13, 91), (-9, 89), (-14, 92)],
        [(-8, 76), (-12, 87), (-23, 110), (-24, 105)],
        [(-10, 78), (-20, 112), (-17, 99), (-78, 127)],
        [(-70, 127), (-50, 127), (-46, 127), (-4, 66)],
        [(-5, 78), (-4, 71), (-8, 72), (2, 59)],
        [(-1, 55), (-7, 70), (-6, 75), (-8, 89)],
        [(-34, 119), (-3, 75), (32, 20), (30, 22)],
        [(-44, 127), (0, 54), (-5, 61), (0, 58)],
        [(-1, 60), (-3, 61), (-8, 67), (-25, 84)],
        [(-14, 74), (-5, 65), (5, 52), (2, 57)],
    ],
    [
        [(-4, 86), (-12, 88), (-5, 82), (-3, 72)],
        [(-4, 67), (-8, 72), (-16, 89), (-9, 69)],
        [(-1, 59), (5, 66), (4, 57), (-4, 71)],
        [(-2, 71), (2, 58), (-1, 74), (-4, 44)],
        [(-1, 69), (0, 62), (-7, 51), (-4, 47)],
        [(-6, 42), (-3, 41), (-6, 53), (8, 76)],
        [(-9, 78), (-11, 83), (9, 52), (0, 67)],
        [(-5, 90), (1, 67), (-15, 72), (-5, 75)],
        [(-8, 80), (-21, 83), (-21, 64), (-13, 31)],
        [(-25, 64), (-29, 94), (9, 75), (17, 63)],
    ],
];

/// significant_coeff_flag (frame scan).
pub const INIT_SIG_MAP: [[[Init; 15]; 10]; 4] = [
    [
        [(-13, 108), (-3, 46), (-1, 65), (-1, 57), (-9, 93), (-3, 74), (-9, 92), (-8, 87), (-23, 126), (5, 54), (6, 60), (6, 59), (6, 69), (-1, 48), (0, 68)],
        [(-4, 69), (0, 73), (0, 64), (-2, 69), (-2, 59), (6, 70), (10, 44), (9, 31), (12, 43), (3, 53), (14, 34), (10, 40), (-1, 63), (0, 0), (0, 0)],
        [(0, 58), (8, 5), (10, 14), (14, 18), (13, 27), (19, 15), (23, 12), (26, 3), (25, 1), (17, 16), (14, 30), (16, 24), (22, 13), (17, 28), (0, 62)],
        [(0, 62), (12, 18), (19, 10), (23, 14), (26, 20), (30, 6), (28, 12), (23, 12), (20, 15), (16, 16), (14, 18), (14, 20), (20, 10), (29, 0), (54, 0)],
        [(7, 34), (-9, 88), (-20, 127), (-36, 127), (-17, 91), (-14, 95), (-25, 84), (-25, 86), (-12, 89), (-17, 91), (-31, 127), (-14, 76), (-18, 103), (-13, 90), (-37, 127)],
        [(11, 80), (5, 76), (2, 84), (5, 78), (-6, 55), (4, 61), (-14, 83), (-37, 127), (-5, 79), (-11, 104), (-11, 91), (-30, 127), (0, 65), (-2, 79), (0, 72)],
        [(-4, 92), (-6, 87), (-4, 84), (-9, 91), (-4, 86), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-4, 71), (-2, 71), (2, 58), (-1, 74), (-4, 44), (-1, 69), (0, 62), (-7, 51), (-4, 47), (0, 58), (7, 36), (12, 27), (15, 18), (0, 0), (0, 0)],
        [(-8, 44), (-3, 45), (-4, 51), (-5, 53), (-7, 46), (-6, 40), (-13, 41), (-1, 62), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-6, 66), (-7, 35), (-7, 42), (-8, 45), (-5, 48), (-12, 56), (-6, 60), (-5, 62), (-8, 66), (-8, 76), (-5, 85), (-6, 81), (-10, 77), (-7, 81), (-17, 80)],
    ],
    [
        [(-13, 108), (-3, 46), (-1, 65), (-1, 57), (-9, 93), (-3, 74), (-9, 92), (-8, 87), (-23, 126), (5, 54), (6, 60), (6, 59), (6, 69), (-1, 48), (0, 68)],
        [(-4, 69), (0, 73), (0, 64), (-2, 69), (-2, 59), (6, 70), (10, 44), (9, 31), (12, 43), (3, 53), (14, 34), (10, 40), (-1, 63), (0, 0), (0, 0)],
        [(0, 58), (8, 5), (10, 14), (14, 18), (13, 27), (19, 15), (23, 12), (26, 3), (25, 1), (17, 16), (14, 30), (16, 24), (22, 13), (17, 28), (0, 62)],
        [(0, 62), (12, 18), (19, 10), (23, 14), (26, 20), (30, 6), (28, 12), (23, 12), (20, 15), (16, 16), (14, 18), (14, 20), (20, 10), (29, 0), (54, 0)],
        [(7, 34), (-9, 88), (-20, 127), (-36, 127), (-17, 91), (-14, 95), (-25, 84), (-25, 86), (-12, 89), (-17, 91), (-31, 127), (-14, 76), (-18, 103), (-13, 90), (-37, 127)],
        [(11, 80), (5, 76), (2, 84), (5, 78), (-6, 55), (4, 61), (-14, 83), (-37, 127), (-5, 79), (-11, 104), (-11, 91), (-30, 127), (0, 65), (-2, 79), (0, 72)],
        [(-4, 92), (-6, 87), (-4, 84), (-9, 91), (-4, 86), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-4, 71), (-2, 71), (2, 58), (-1, 74), (-4, 44), (-1, 69), (0, 62), (-7, 51), (-4, 47), (0, 58), (7, 36), (12, 27), (15, 18), (0, 0), (0, 0)],
        [(-8, 44), (-3, 45), (-4, 51), (-5, 53), (-7, 46), (-6, 40), (-13, 41), (-1, 62), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-6, 66), (-7, 35), (-7, 42), (-8, 45), (-5, 48), (-12, 56), (-6, 60), (-5, 62), (-8, 66), (-8, 76), (-5, 85), (-6, 81), (-10, 77), (-7, 81), (-17, 80)],
    ],
    [
        [(-2, 85), (-6, 78), (-1, 75), (-7, 77), (2, 54), (5, 50), (-3, 68), (1, 50), (6, 42), (-4, 81), (1, 63), (-4, 70), (0, 67), (2, 57), (-2, 76)],
        [(11, 35), (4, 64), (1, 61), (11, 35), (18, 25), (12, 24), (13, 29), (13, 36), (-10, 93), (-7, 73), (-2, 73), (13, 46), (9, 49), (0, 0), (0, 0)],
        [(-7, 100), (9, 53), (2, 53), (5, 53), (-2, 61), (0, 56), (0, 56), (-13, 63), (-5, 60), (-1, 62), (4, 57), (-6, 69), (4, 57), (14, 39), (4, 51)],
        [(13, 68), (3, 64), (1, 61), (9, 63), (7, 50), (16, 39), (5, 44), (4, 52), (11, 48), (-5, 60), (-1, 59), (0, 59), (22, 33), (5, 44), (14, 43)],
        [(-1, 78), (0, 60), (8, 44), (34, 32), (39, 16), (27, 36), (61, -37), (36, 25), (-21, 126), (-23, 124), (-20, 110), (-26, 126), (-25, 124), (-17, 105), (-27, 121)],
        [(-27, 117), (-17, 102), (-26, 117), (-27, 116), (-33, 122), (-10, 95), (-14, 100), (-8, 95), (-17, 111), (-28, 114), (-6, 89), (-2, 80), (-4, 82), (-9, 85), (-8, 81)],
        [(-1, 70), (-9, 71), (-7, 73), (-7, 70), (-9, 88), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-17, 110), (-11, 97), (-20, 103), (-11, 91), (-24, 114), (-18, 110), (-7, 103), (39, -24), (3, 55), (-2, 67), (0, 73), (-8, 89), (3, 52), (0, 0), (0, 0)],
        [(-7, 69), (-5, 66), (-3, 62), (-3, 68), (-13, 73), (-10, 70), (-10, 71), (-10, 82), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-11, 97), (-30, 127), (-11, 105), (-25, 111), (-14, 100), (-16, 96), (-10, 89), (-22, 91), (-8, 59), (-3, 50), (-3, 70), (-8, 74), (-9, 67), (-23, 125), (-12, 104)],
    ],
    [
        [(-13, 101), (-13, 91), (-12, 94), (-10, 88), (-16, 84), (-10, 86), (-7, 83), (-13, 87), (-19, 94), (1, 70), (0, 72), (-5, 74), (18, 59), (-7, 86), (-6, 76)],
        [(-9, 108), (-4, 69), (0, 73), (0, 64), (-2, 69), (-2, 59), (6, 70), (10, 44), (9, 31), (12, 43), (3, 53), (14, 34), (10, 40), (0, 0), (0, 0)],
        [(-14, 106), (-13, 97), (-15, 100), (-13, 101), (-13, 91), (-12, 94), (-10, 88), (-16, 84), (-10, 86), (-7, 83), (-13, 87), (-19, 94), (1, 70), (0, 72), (-5, 74)],
        [(18, 59), (24, 0), (15, 9), (8, 25), (13, 18), (15, 9), (13, 19), (10, 37), (12, 18), (6, 29), (20, 33), (15, 30), (4, 45), (1, 58), (0, 62)],
        [(7, 61), (12, 38), (11, 45), (15, 39), (11, 42), (13, 44), (16, 45), (12, 41), (10, 49), (30, 34), (18, 42), (10, 55), (17, 51), (17, 46), (0, 89)],
        [(26, -19), (22, -17), (26, -17), (30, -25), (28, -20), (33, -23), (37, -27), (33, -23), (40, -28), (38, -17), (33, -11), (40, -15), (41, -6), (38, 1), (41, 17)],
        [(-4, 79), (-7, 71), (-5, 69), (-9, 70), (-8, 66), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-10, 82), (-8, 72), (-8, 80), (-8, 66), (-8, 62), (-9, 58), (-9, 66), (-9, 64), (-5, 58), (2, 59), (2, 75), (-3, 87), (-3, 100), (0, 0), (0, 0)],
        [(-6, 76), (-2, 44), (0, 45), (0, 52), (-3, 64), (-2, 59), (-4, 70), (-4, 75), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(-8, 85), (-6, 81), (-10, 77), (-7, 81), (-17, 80), (-18, 73), (-4, 74), (-10, 83), (-9, 71), (-9, 67), (-1, 61), (-8, 66), (-14, 66), (0, 59), (2, 59)],
    ],
];

/// last_significant_coeff_flag (frame scan).
pub const INIT_LAST_MAP: [[[Init; 15]; 10]; 4] = [
    [
        [(24, 0), (15, 9), (8, 25), (13, 18), (15, 9), (13, 19), (10, 37), (12, 18), (6, 29), (20, 33), (15, 30), (4, 45), (1, 58), (0, 62), (7, 61)],
        [(12, 38), (11, 45), (15, 39), (11, 42), (13, 44), (16, 45), (12, 41), (10, 49), (30, 34), (18, 42), (10, 55), (17, 51), (17, 46), (0, 0), (0, 0)],
        [(0, 89), (26, -19), (22, -17), (26, -17), (30, -25), (28, -20), (33, -23), (37, -27), (33, -23), (40, -28), (38, -17), (33, -11), (40, -15), (41, -6), (38, 1)],
        [(41, 17), (30, -6), (27, 3), (26, 22), (37, -16), (35, -4), (38, -8), (38, -3), (37, 3), (38, 5), (42, 0), (35, 16), (39, 22), (14, 48), (27, 37)],
        [(21, 60), (12, 68), (2, 97), (0, 89), (14, 57), (11, 63), (9, 67), (17, 56), (19, 53), (13, 60), (12, 66), (16, 57), (27, 38), (20, 40), (4, 69)],
        [(14, 57), (11, 63), (9, 67), (17, 56), (19, 53), (13, 60), (12, 66), (16, 57), (27, 38), (20, 40), (4, 69), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(11, 28), (2, 40), (3, 44), (0, 49), (0, 46), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(12, 40), (11, 51), (14, 59), (9, 52), (0, 67), (8, 65), (3, 60), (7, 56), (19, 34), (18, 36), (18, 34), (19, 39), (14, 48), (0, 0), (0, 0)],
        [(4, 45), (1, 58), (0, 62), (7, 61), (12, 38), (11, 45), (15, 39), (11, 42), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(13, 44), (16, 45), (12, 41), (10, 49), (30, 34), (18, 42), (10, 55), (17, 51), (17, 46), (0, 89), (26, -19), (22, -17), (26, -17), (30, -25), (28, -20)],
    ],
    [
        [(24, 0), (15, 9), (8, 25), (13, 18), (15, 9), (13, 19), (10, 37), (12, 18), (6, 29), (20, 33), (15, 30), (4, 45), (1, 58), (0, 62), (7, 61)],
        [(12, 38), (11, 45), (15, 39), (11, 42), (13, 44), (16, 45), (12, 41), (10, 49), (30, 34), (18, 42), (10, 55), (17, 51), (17, 46), (0, 0), (0, 0)],
        [(0, 89), (26, -19), (22, -17), (26, -17), (30, -25), (28, -20), (33, -23), (37, -27), (33, -23), (40, -28), (38, -17), (33, -11), (40, -15), (41, -6), (38, 1)],
        [(41, 17), (30, -6), (27, 3), (26, 22), (37, -16), (35, -4), (38, -8), (38, -3), (37, 3), (38, 5), (42, 0), (35, 16), (39, 22), (14, 48), (27, 37)],
        [(21, 60), (12, 68), (2, 97), (0, 89), (14, 57), (11, 63), (9, 67), (17, 56), (19, 53), (13, 60), (12, 66), (16, 57), (27, 38), (20, 40), (4, 69)],
        [(14, 57), (11, 63), (9, 67), (17, 56), (19, 53), (13, 60), (12, 66), (16, 57), (27, 38), (20, 40), (4, 69), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(11, 28), (2, 40), (3, 44), (0, 49), (0, 46), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(12, 40), (11, 51), (14, 59), (9, 52), (0, 67), (8, 65), (3, 60), (7, 56), (19, 34), (18, 36), (18, 34), (19, 39), (14, 48), (0, 0), (0, 0)],
        [(4, 45), (1, 58), (0, 62), (7, 61), (12, 38), (11, 45), (15, 39), (11, 42), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(13, 44), (16, 45), (12, 41), (10, 49), (30, 34), (18, 42), (10, 55), (17, 51), (17, 46), (0, 89), (26, -19), (22, -17), (26, -17), (30, -25), (28, -20)],
    ],
    [
        [(11, 28), (2, 40), (3, 44), (0, 49), (0, 46), (2, 44), (2, 51), (0, 47), (4, 39), (2, 62), (6, 46), (0, 54), (3, 54), (2, 58), (4, 63)],
        [(6, 51), (6, 57), (7, 53), (6, 52), (6, 55), (11, 45), (14, 36), (8, 53), (-1, 82), (7, 55), (-3, 78), (15, 46), (22, 31), (0, 0), (0, 0)],
        [(-1, 84), (25, 7), (30, -7), (28, 3), (28, 4), (32, 0), (34, -1), (30, 6), (30, 6), (32, 9), (31, 19), (26, 27), (26, 30), (37, 20), (28, 34)],
        [(17, 70), (1, 67), (5, 59), (9, 67), (16, 30), (18, 32), (18, 35), (22, 29), (24, 31), (23, 38), (18, 43), (20, 41), (11, 63), (9, 59), (9, 64)],
        [(-1, 94), (-2, 89), (-9, 108), (-1, 84), (22, 32), (11, 49), (14, 56), (7, 71), (16, 45), (11, 47), (13, 47), (16, 46), (10, 55), (12, 56), (10, 58)],
        [(3, 74), (10, 58), (0, 64), (8, 60), (6, 57), (16, 41), (14, 45), (16, 46), (13, 49), (15, 49), (10, 54), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(2, 58), (0, 54), (3, 54), (2, 58), (4, 63), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(9, 64), (-1, 94), (-2, 89), (-9, 108), (-1, 84), (22, 32), (11, 49), (14, 56), (7, 71), (16, 45), (11, 47), (13, 47), (16, 46), (0, 0), (0, 0)],
        [(0, 54), (3, 54), (2, 58), (4, 63), (6, 51), (6, 57), (7, 53), (6, 52), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(6, 55), (11, 45), (14, 36), (8, 53), (-1, 82), (7, 55), (-3, 78), (15, 46), (22, 31), (-1, 84), (25, 7), (30, -7), (28, 3), (28, 4), (32, 0)],
    ],
    [
        [(4, 39), (0, 42), (7, 34), (11, 29), (8, 31), (6, 37), (7, 42), (3, 40), (8, 33), (13, 43), (13, 36), (4, 47), (3, 55), (2, 58), (6, 60)],
        [(8, 44), (11, 44), (14, 42), (7, 48), (4, 56), (4, 52), (13, 37), (9, 49), (19, 58), (10, 48), (12, 45), (0, 69), (20, 33), (0, 0), (0, 0)],
        [(8, 63), (35, -18), (33, -25), (28, -3), (24, 10), (27, 0), (34, -14), (52, -44), (39, -24), (19, 17), (31, 25), (36, 29), (24, 33), (34, 15), (30, 20)],
        [(22, 73), (20, 34), (19, 31), (27, 44), (19, 16), (15, 36), (15, 36), (21, 28), (25, 21), (30, 20), (31, 12), (27, 16), (24, 42), (0, 93), (14, 56)],
        [(15, 57), (26, 38), (-24, 127), (-24, 115), (-22, 82), (-9, 62), (0, 53), (0, 59), (-14, 85), (-13, 89), (-25, 94), (-64, 127), (-25, 120), (-68, 127), (-18, 88)],
        [(-4, 66), (-16, 84), (-24, 115), (-22, 82), (-9, 62), (0, 53), (0, 59), (-14, 85), (-13, 89), (-25, 94), (-64, 127), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(2, 58), (4, 63), (6, 51), (6, 57), (7, 53), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(14, 56), (15, 57), (26, 38), (-24, 127), (-24, 115), (-22, 82), (-9, 62), (0, 53), (0, 59), (-14, 85), (-13, 89), (-25, 94), (-64, 127), (0, 0), (0, 0)],
        [(4, 47), (3, 55), (2, 58), (6, 60), (8, 44), (11, 44), (14, 42), (7, 48), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
        [(4, 56), (4, 52), (13, 37), (9, 49), (19, 58), (10, 48), (12, 45), (0, 69), (20, 33), (8, 63), (35, -18), (33, -25), (28, -3), (24, 10), (27, 0)],
    ],
];

/// coeff_abs_level_minus1 first bin (greater-than-1 contexts).
pub const INIT_COEFF_ONE: [[[Init; 5]; 10]; 4] = [
    [
        [(-3, 71), (-6, 42), (-5, 50), (-3, 54), (-2, 62)],
        [(-5, 67), (-5, 27), (-3, 39), (-2, 44), (0, 46)],
        [(-3, 75), (-1, 23), (1, 34), (1, 43), (0, 54)],
        [(-12, 92), (-15, 55), (-10, 60), (-6, 62), (-4, 65)],
        [(-6, 64), (-5, 48), (-1, 49), (-2, 49), (-5, 66)],
        [(-11, 97), (-7, 50), (-2, 55), (0, 61), (-4, 64)],
        [(-9, 85), (-13, 36), (-2, 42), (-2, 45), (-6, 48)],
        [(-7, 59), (-5, 41), (-3, 45), (-2, 45), (-3, 52)],
        [(-2, 55), (-4, 39), (-2, 43), (-2, 48), (-4, 55)],
        [(-6, 69), (-8, 43), (-3, 46), (-3, 51), (-4, 58)],
    ],
    [
        [(-3, 71), (-6, 42), (-5, 50), (-3, 54), (-2, 62)],
        [(-5, 67), (-5, 27), (-3, 39), (-2, 44), (0, 46)],
        [(-3, 75), (-1, 23), (1, 34), (1, 43), (0, 54)],
        [(-12, 92), (-15, 55), (-10, 60), (-6, 62), (-4, 65)],
        [(-6, 64), (-5, 48), (-1, 49), (-2, 49), (-5, 66)],
        [(-11, 97), (-7, 50), (-2, 55), (0, 61), (-4, 64)],
        [(-9, 85), (-13, 36), (-2, 42), (-2, 45), (-6, 48)],
        [(-7, 59), (-5, 41), (-3, 45), (-2, 45), (-3, 52)],
        [(-2, 55), (-4, 39), (-2, 43), (-2, 48), (-4, 55)],
        [(-6, 69), (-8, 43), (-3, 46), (-3, 51), (-4, 58)],
    ],
    [
        [(-2, 66), (-9, 34), (1, 32), (11, 31), (15, 22)],
        [(-4, 79), (-8, 44), (-3, 49), (-10, 56), (-4, 53)],
        [(-2, 69), (-5, 32), (-2, 41), (1, 44), (1, 45)],
        [(-9, 83), (-12, 47), (-9, 51), (-6, 52), (-5, 57)],
        [(-8, 74), (-10, 44), (-4, 45), (-3, 47), (-3, 51)],
        [(-14, 106), (-13, 47), (-8, 54), (-5, 56), (-4, 58)],
        [(-10, 87), (-16, 40), (-4, 43), (-3, 46), (-5, 47)],
        [(-8, 66), (-7, 42), (-4, 44), (-3, 45), (-4, 50)],
        [(-3, 59), (-5, 38), (-3, 42), (-2, 46), (-4, 53)],
        [(-7, 72), (-9, 42), (-4, 45), (-3, 49), (-4, 55)],
    ],
    [
        [(-4, 71), (-9, 36), (-1, 36), (7, 34), (13, 24)],
        [(-6, 82), (-9, 46), (-4, 50), (-8, 53), (-3, 50)],
        [(-3, 72), (-6, 34), (-2, 42), (0, 44), (1, 44)],
        [(-10, 86), (-13, 49), (-9, 52), (-6, 53), (-5, 58)],
        [(-9, 77), (-11, 45), (-5, 46), (-4, 48), (-4, 52)],
        [(-13, 102), (-12, 46), (-7, 52), (-5, 55), (-4, 57)],
        [(-10, 86), (-15, 39), (-4, 43), (-3, 45), (-5, 46)],
        [(-8, 64), (-7, 41), (-4, 43), (-3, 44), (-4, 49)],
        [(-3, 58), (-5, 37), (-3, 41), (-2, 45), (-4, 52)],
        [(-7, 71), (-9, 41), (-4, 44), (-3, 48), (-4, 54)],
    ],
];

/// coeff_abs_level_minus1 remaining bins (abs-level contexts).
pub const INIT_COEFF_ABS: [[[Init; 5]; 10]; 4] = [
    [
        [(0, 58), (1, 63), (-2, 72), (-1, 74), (-9, 91)],
        [(-5, 70), (0, 58), (0, 64), (2, 59), (-4, 71)],
        [(0, 55), (5, 56), (4, 61), (8, 61), (1, 70)],
        [(-9, 75), (-3, 74), (-1, 77), (2, 77), (-11, 91)],
        [(-5, 70), (-3, 70), (-1, 70), (2, 67), (-6, 76)],
        [(-7, 82), (-2, 77), (2, 74), (6, 72), (-3, 79)],
        [(-13, 78), (-9, 83), (-4, 81), (-2, 80), (-13, 95)],
        [(-4, 63), (-1, 65), (1, 64), (4, 63), (-3, 70)],
        [(-2, 58), (0, 60), (2, 61), (5, 60), (-1, 66)],
        [(-4, 66), (-1, 68), (1, 69), (4, 68), (-3, 75)],
    ],
    [
        [(0, 58), (1, 63), (-2, 72), (-1, 74), (-9, 91)],
        [(-5, 70), (0, 58), (0, 64), (2, 59), (-4, 71)],
        [(0, 55), (5, 56), (4, 61), (8, 61), (1, 70)],
        [(-9, 75), (-3, 74), (-1, 77), (2, 77), (-11, 91)],
        [(-5, 70), (-3, 70), (-1, 70), (2, 67), (-6, 76)],
        [(-7, 82), (-2, 77), (2, 74), (6, 72), (-3, 79)],
        [(-13, 78), (-9, 83), (-4, 81), (-2, 80), (-13, 95)],
        [(-4, 63), (-1, 65), (1, 64), (4, 63), (-3, 70)],
        [(-2, 58), (0, 60), (2, 61), (5, 60), (-1, 66)],
        [(-4, 66), (-1, 68), (1, 69), (4, 68), (-3, 75)],
    ],
    [
        [(-2, 63), (0, 64), (1, 66), (3, 66), (-5, 77)],
        [(-6, 73), (-2, 66), (0, 67), (2, 64), (-5, 74)],
        [(-1, 60), (3, 60), (4, 63), (7, 62), (0, 69)],
        [(-10, 79), (-4, 76), (-2, 78), (1, 77), (-10, 87)],
        [(-6, 73), (-4, 72), (-2, 71), (1, 68), (-7, 78)],
        [(-8, 85), (-3, 78), (1, 75), (5, 73), (-4, 81)],
        [(-14, 82), (-10, 85), (-5, 82), (-3, 81), (-14, 97)],
        [(-5, 66), (-2, 67), (0, 66), (3, 65), (-4, 72)],
        [(-3, 61), (-1, 62), (1, 63), (4, 62), (-2, 68)],
        [(-5, 69), (-2, 70), (0, 71), (3, 70), (-4, 77)],
    ],
    [
        [(-2, 62), (0, 63), (1, 65), (3, 65), (-5, 76)],
        [(-6, 72), (-2, 65), (0, 66), (2, 63), (-5, 73)],
        [(-1, 59), (3, 59), (4, 62), (7, 61), (0, 68)],
        [(-10, 78), (-4, 75), (-2, 77), (1, 76), (-10, 86)],
        [(-6, 72), (-4, 71), (-2, 70), (1, 67), (-7, 77)],
        [(-8, 84), (-3, 77), (1, 74), (5, 72), (-4, 80)],
        [(-14, 81), (-10, 84), (-5, 81), (-3, 80), (-14, 96)],
        [(-5, 65), (-2, 66), (0, 65), (3, 64), (-4, 71)],
        [(-3, 60), (-1, 61), (1, 62), (4, 61), (-2, 67)],
        [(-5, 68), (-2, 69), (0, 70), (3, 69), (-4, 76)],
    ],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_tab_shape() {
        // Widths shrink as the probability state rises and grow with the
        // quantised range, ending at the fixed state-63 row.
        for state in 0..63 {
            for q in 0..4 {
                assert!(RANGE_TAB_LPS[state][q] >= RANGE_TAB_LPS[state + 1][q]);
            }
            for q in 0..3 {
                assert!(RANGE_TAB_LPS[state][q] <= RANGE_TAB_LPS[state][q + 1]);
            }
        }
        assert_eq!(RANGE_TAB_LPS[63], [2, 2, 2, 2]);
    }

    #[test]
    fn test_trans_idx() {
        assert_eq!(TRANS_IDX_LPS[0], 0);
        assert_eq!(TRANS_IDX_LPS[63], 63);
        assert_eq!(trans_idx_mps(0), 1);
        assert_eq!(trans_idx_mps(62), 62);
        assert_eq!(trans_idx_mps(63), 63);
        for state in 0..64 {
            assert!(TRANS_IDX_LPS[state] as usize <= state.max(1));
        }
    }

    #[test]
    fn test_category_maps() {
        assert_eq!(TYPE2CTX_MAP.len(), 22);
        assert_eq!(MAX_POS[2], 63);
        assert_eq!(MAX_POS[6], 3);
        assert!(POS2CTX_MAP_8X8.iter().all(|&c| c < 15));
        assert!(POS2CTX_LAST_8X8.iter().all(|&c| c < 9));
    }
}

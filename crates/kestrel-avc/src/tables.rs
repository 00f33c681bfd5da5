//! Fixed tables shared by the residual, transform and deblocking paths:
//! coefficient scan orders, dequantisation matrices, chroma QP mapping and
//! deblocking thresholds.

/// 4x4 zig-zag scan (frame), as (x, y) pairs in scan order.
pub const ZIGZAG_SCAN_4X4: [(u8, u8); 16] = [
    (0, 0), (1, 0), (0, 1), (0, 2),
    (1, 1), (2, 0), (3, 0), (2, 1),
    (1, 2), (0, 3), (1, 3), (2, 2),
    (3, 1), (3, 2), (2, 3), (3, 3),
];

/// 4x4 field scan.
pub const FIELD_SCAN_4X4: [(u8, u8); 16] = [
    (0, 0), (0, 1), (1, 0), (0, 2),
    (0, 3), (1, 1), (1, 2), (1, 3),
    (2, 0), (2, 1), (2, 2), (2, 3),
    (3, 0), (3, 1), (3, 2), (3, 3),
];

/// 8x8 zig-zag scan (frame).
pub const ZIGZAG_SCAN_8X8: [(u8, u8); 64] = [
    (0, 0), (1, 0), (0, 1), (0, 2), (1, 1), (2, 0), (3, 0), (2, 1),
    (1, 2), (0, 3), (0, 4), (1, 3), (2, 2), (3, 1), (4, 0), (5, 0),
    (4, 1), (3, 2), (2, 3), (1, 4), (0, 5), (0, 6), (1, 5), (2, 4),
    (3, 3), (4, 2), (5, 1), (6, 0), (7, 0), (6, 1), (5, 2), (4, 3),
    (3, 4), (2, 5), (1, 6), (0, 7), (1, 7), (2, 6), (3, 5), (4, 4),
    (5, 3), (6, 2), (7, 1), (7, 2), (6, 3), (5, 4), (4, 5), (3, 6),
    (2, 7), (3, 7), (4, 6), (5, 5), (6, 4), (7, 3), (7, 4), (6, 5),
    (5, 6), (4, 7), (5, 7), (6, 6), (7, 5), (7, 6), (6, 7), (7, 7),
];

/// 8x8 field scan.
pub const FIELD_SCAN_8X8: [(u8, u8); 64] = [
    (0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (0, 3), (0, 4), (1, 2),
    (2, 0), (1, 3), (0, 5), (0, 6), (0, 7), (1, 4), (2, 1), (3, 0),
    (2, 2), (1, 5), (1, 6), (1, 7), (2, 3), (3, 1), (4, 0), (3, 2),
    (2, 4), (2, 5), (2, 6), (2, 7), (3, 3), (4, 1), (5, 0), (4, 2),
    (3, 4), (3, 5), (3, 6), (3, 7), (4, 3), (5, 1), (6, 0), (5, 2),
    (4, 4), (4, 5), (4, 6), (4, 7), (5, 3), (6, 1), (6, 2), (5, 4),
    (5, 5), (5, 6), (5, 7), (6, 3), (7, 0), (7, 1), (6, 4), (6, 5),
    (6, 6), (6, 7), (7, 2), (7, 3), (7, 4), (7, 5), (7, 6), (7, 7),
];

/// 2x2 chroma DC scan (4:2:0), raster order as (x, y).
pub const CHROMA_DC_SCAN_2X2: [(u8, u8); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// 2x4 chroma DC scan (4:2:2), as (x, y) into the 2-wide, 4-tall DC grid.
pub const CHROMA_DC_SCAN_2X4: [(u8, u8); 8] = [
    (0, 0), (0, 1), (1, 0), (0, 2),
    (0, 3), (1, 1), (1, 2), (1, 3),
];

/// 4x4 dequantisation weights per qp%6, position-dependent (Table derived
/// from the normalisation matrix V).
pub const DEQUANT_COEF_4X4: [[[i32; 4]; 4]; 6] = [
    [[10, 13, 10, 13], [13, 16, 13, 16], [10, 13, 10, 13], [13, 16, 13, 16]],
    [[11, 14, 11, 14], [14, 18, 14, 18], [11, 14, 11, 14], [14, 18, 14, 18]],
    [[13, 16, 13, 16], [16, 20, 16, 20], [13, 16, 13, 16], [16, 20, 16, 20]],
    [[14, 18, 14, 18], [18, 23, 18, 23], [14, 18, 14, 18], [18, 23, 18, 23]],
    [[16, 20, 16, 20], [20, 25, 20, 25], [16, 20, 16, 20], [20, 25, 20, 25]],
    [[18, 23, 18, 23], [23, 29, 23, 29], [18, 23, 18, 23], [23, 29, 23, 29]],
];

/// 8x8 dequantisation base weights per qp%6; six position classes.
const DEQUANT_COEF_8X8_CLASSES: [[i32; 6]; 6] = [
    [20, 18, 32, 19, 25, 24],
    [22, 19, 35, 21, 28, 26],
    [26, 23, 42, 24, 33, 31],
    [28, 25, 45, 26, 35, 33],
    [32, 28, 51, 30, 40, 38],
    [36, 32, 58, 34, 46, 43],
];

/// Dequantisation weight for an 8x8 position (row j, column i).
pub fn dequant_coef_8x8(qp_rem: usize, j: usize, i: usize) -> i32 {
    let class = if j % 4 == 0 && i % 4 == 0 {
        0
    } else if j % 2 == 1 && i % 2 == 1 {
        1
    } else if j % 4 == 2 && i % 4 == 2 {
        2
    } else if (j % 4 == 0 && i % 2 == 1) || (j % 2 == 1 && i % 4 == 0) {
        3
    } else if (j % 4 == 0 && i % 4 == 2) || (j % 4 == 2 && i % 4 == 0) {
        4
    } else {
        5
    };
    DEQUANT_COEF_8X8_CLASSES[qp_rem][class]
}

/// Chroma QP from luma QP + chroma offset (Table 8-15); input already clamped
/// to [0, 51].
pub const QP_SCALE_CR: [u8; 52] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 29, 30, 31, 32, 32, 33, 34, 34, 35, 35, 36, 36, 37, 37, 37, 38, 38, 38, 39,
    39, 39, 39,
];

/// Deblocking alpha threshold per indexA.
pub const ALPHA_TABLE: [u8; 52] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4, 4, 5, 6, 7, 8, 9, 10, 12, 13, 15, 17, 20,
    22, 25, 28, 32, 36, 40, 45, 50, 56, 63, 71, 80, 90, 101, 113, 127, 144, 162, 182, 203, 226,
    255, 255,
];

/// Deblocking beta threshold per indexB.
pub const BETA_TABLE: [u8; 52] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 6, 6, 7, 7, 8,
    8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13, 14, 14, 15, 15, 16, 16, 17, 17, 18, 18,
];

/// Deblocking tC0 per indexA, indexed by boundary strength 0..4.
pub const CLIP_TABLE: [[u8; 5]; 52] = [
    [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0], [0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0],
    [0, 0, 0, 1, 1], [0, 0, 0, 1, 1], [0, 0, 0, 1, 1], [0, 0, 0, 1, 1],
    [0, 0, 1, 1, 1], [0, 0, 1, 1, 1], [0, 1, 1, 1, 1], [0, 1, 1, 1, 1],
    [0, 1, 1, 1, 1], [0, 1, 1, 1, 1], [0, 1, 1, 2, 2], [0, 1, 1, 2, 2],
    [0, 1, 1, 2, 2], [0, 1, 1, 2, 2], [0, 1, 2, 3, 3], [0, 1, 2, 3, 3],
    [0, 2, 2, 3, 3], [0, 2, 2, 4, 4], [0, 2, 3, 4, 4], [0, 2, 3, 4, 4],
    [0, 3, 3, 5, 5], [0, 3, 4, 6, 6], [0, 3, 4, 6, 6], [0, 4, 5, 7, 7],
    [0, 4, 5, 8, 8], [0, 4, 6, 9, 9], [0, 5, 7, 10, 10], [0, 6, 8, 11, 11],
    [0, 6, 8, 13, 13], [0, 7, 10, 14, 14], [0, 8, 11, 16, 16], [0, 9, 12, 18, 18],
    [0, 10, 13, 20, 20], [0, 11, 15, 23, 23], [0, 13, 17, 25, 25],
];

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_is_permutation(scan: &[(u8, u8)], width: u8, height: u8) -> bool {
        let mut seen = vec![false; (width as usize) * (height as usize)];
        for &(x, y) in scan {
            let idx = y as usize * width as usize + x as usize;
            if x >= width || y >= height || seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        seen.iter().all(|&v| v)
    }

    #[test]
    fn test_scans_are_permutations() {
        assert!(scan_is_permutation(&ZIGZAG_SCAN_4X4, 4, 4));
        assert!(scan_is_permutation(&FIELD_SCAN_4X4, 4, 4));
        assert!(scan_is_permutation(&ZIGZAG_SCAN_8X8, 8, 8));
        assert!(scan_is_permutation(&FIELD_SCAN_8X8, 8, 8));
        assert!(scan_is_permutation(&CHROMA_DC_SCAN_2X2, 2, 2));
        assert!(scan_is_permutation(&CHROMA_DC_SCAN_2X4, 2, 4));
    }

    #[test]
    fn test_zigzag_inverse_identity() {
        // Scan then inverse scan yields the original block.
        let block: Vec<i32> = (0..16).collect();
        let mut scanned = [0i32; 16];
        for (k, &(x, y)) in ZIGZAG_SCAN_4X4.iter().enumerate() {
            scanned[k] = block[(y * 4 + x) as usize];
        }
        let mut rebuilt = [0i32; 16];
        for (k, &(x, y)) in ZIGZAG_SCAN_4X4.iter().enumerate() {
            rebuilt[(y * 4 + x) as usize] = scanned[k];
        }
        assert_eq!(&rebuilt[..], &block[..]);
    }

    #[test]
    fn test_dequant_tables() {
        // The DC position weight is the canonical {10,11,13,14,16,18} run.
        let dc: Vec<i32> = (0..6).map(|r| DEQUANT_COEF_4X4[r][0][0]).collect();
        assert_eq!(dc, vec![10, 11, 13, 14, 16, 18]);
        // 8x8 class 0 at (0,0).
        assert_eq!(dequant_coef_8x8(0, 0, 0), 20);
        assert_eq!(dequant_coef_8x8(5, 0, 0), 36);
        // (1,1) is the odd-odd class.
        assert_eq!(dequant_coef_8x8(0, 1, 1), 18);
    }

    #[test]
    fn test_chroma_qp_mapping() {
        assert_eq!(QP_SCALE_CR[29], 29);
        assert_eq!(QP_SCALE_CR[30], 29);
        assert_eq!(QP_SCALE_CR[39], 35);
        assert_eq!(QP_SCALE_CR[51], 39);
    }

    #[test]
    fn test_deblock_tables_monotonic() {
        for w in ALPHA_TABLE.windows(2) {
            assert!(w[1] >= w[0]);
        }
        for w in BETA_TABLE.windows(2) {
            assert!(w[1] >= w[0]);
        }
        for row in CLIP_TABLE.iter() {
            assert_eq!(row[0], 0);
            assert!(row[4] >= row[1]);
        }
    }
}

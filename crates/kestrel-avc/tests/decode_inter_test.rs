//! End-to-end inter decoding: P-slice copies of a black IDR and output
//! ordering.

mod common;

use common::{idr_black_slice_nal, p_copy_slice_nal, p_skip_slice_nal, pps_nal, sps_nal};
use kestrel_avc::Decoder;

#[test]
fn p_copy_reproduces_reference() {
    // IDR (black) followed by a P_L0_16x16 with zero motion and no
    // residual: the second picture is identical to the first.
    let stream = [
        sps_nal(1, 1),
        pps_nal(),
        idr_black_slice_nal(1),
        p_copy_slice_nal(1, 2),
    ]
    .concat();

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pictures.len(), 2);

    let pocs: Vec<i32> = output.pictures.iter().map(|p| p.poc).collect();
    assert_eq!(pocs, vec![0, 2]);

    for pic in &output.pictures {
        let luma = pic.cropped_plane(0);
        assert!(luma.iter().all(|&v| v == 0));
        let cb = pic.cropped_plane(1);
        assert!(cb.iter().all(|&v| v == 128));
    }
}

#[test]
fn skip_run_copies_whole_picture() {
    let stream = [
        sps_nal(2, 2),
        pps_nal(),
        idr_black_slice_nal(4),
        p_skip_slice_nal(1, 2, 4),
    ]
    .concat();

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pictures.len(), 2);

    let luma = output.pictures[1].cropped_plane(0);
    assert_eq!(luma.len(), 32 * 32);
    assert!(luma.iter().all(|&v| v == 0));
}

#[test]
fn output_poc_is_monotonic() {
    let stream = [
        sps_nal(1, 1),
        pps_nal(),
        idr_black_slice_nal(1),
        p_skip_slice_nal(1, 2, 1),
        p_skip_slice_nal(2, 4, 1),
        p_skip_slice_nal(3, 6, 1),
    ]
    .concat();

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pictures.len(), 4);
    let pocs: Vec<i32> = output.pictures.iter().map(|p| p.poc).collect();
    assert_eq!(pocs, vec![0, 2, 4, 6]);
    assert!(pocs.windows(2).all(|w| w[0] <= w[1]));
}

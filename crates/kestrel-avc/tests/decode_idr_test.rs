//! End-to-end IDR decoding: a single-MB all-black picture through the CAVLC
//! path.

mod common;

use common::{idr_black_slice_nal, pps_nal, sps_nal};
use kestrel_avc::Decoder;

fn build_stream(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.concat()
}

#[test]
fn single_idr_decodes_to_black() {
    let stream = build_stream(&[sps_nal(1, 1), pps_nal(), idr_black_slice_nal(1)]);

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pictures.len(), 1);

    let pic = &output.pictures[0];
    assert_eq!(pic.poc, 0);
    assert_eq!(pic.width(), 16);
    assert_eq!(pic.height(), 16);
    assert!(!pic.concealed);

    let luma = pic.cropped_plane(0);
    assert_eq!(luma.len(), 256);
    assert!(luma.iter().all(|&v| v == 0), "luma not black: {:?}", &luma[..16]);

    for plane in 1..3 {
        let chroma = pic.cropped_plane(plane);
        assert_eq!(chroma.len(), 64);
        assert!(
            chroma.iter().all(|&v| v == 128),
            "chroma plane {} not neutral",
            plane
        );
    }
}

#[test]
fn two_mb_idr_propagates_black() {
    // The second MB codes nothing and predicts black from its left
    // neighbour.
    let stream = build_stream(&[sps_nal(2, 1), pps_nal(), idr_black_slice_nal(2)]);

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pictures.len(), 1);

    let pic = &output.pictures[0];
    assert_eq!(pic.width(), 32);
    let luma = pic.cropped_plane(0);
    assert!(luma.iter().all(|&v| v == 0));
}

#[test]
fn decodes_stream_read_back_from_disk() {
    // Same picture, but round-tripped through a file the way the CLI feeds
    // the decoder.
    use std::io::Write;

    let stream = build_stream(&[sps_nal(1, 1), pps_nal(), idr_black_slice_nal(1)]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&stream).unwrap();
    file.flush().unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    assert_eq!(bytes, stream);

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&bytes).unwrap();
    assert_eq!(output.pictures.len(), 1);
    let luma = output.pictures[0].cropped_plane(0);
    assert!(luma.iter().all(|&v| v == 0));
}

#[test]
fn idr_after_idr_flushes_in_order() {
    let stream = build_stream(&[
        sps_nal(1, 1),
        pps_nal(),
        idr_black_slice_nal(1),
        idr_black_slice_nal(1),
    ]);

    let mut decoder = Decoder::new();
    let output = decoder.decode_annex_b(&stream).unwrap();
    assert_eq!(output.pictures.len(), 2);
    // The first picture was flushed by the second IDR.
    assert_eq!(output.pictures[0].poc, 0);
    assert_eq!(output.pictures[1].poc, 0);
}

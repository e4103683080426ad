#[allow(dead_code)]
mod common;

use std::io::Write;

use ndarray::Array2;
use tempfile::{tempdir, NamedTempFile};

use spectherm_core::error::SpectraError;
use spectherm_core::frame::{SampleType, SpectralShape};
use spectherm_core::io::spe::SPE_HEADER_SIZE;
use spectherm_core::io::{RoiRegion, SpeFile, SpeHeader, SpeMetadata, SpeWriter};

use common::*;

#[test]
fn test_read_u16_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(3, 5, 7);
    let frames = indexed_frames(shape);
    write_spe(&path, &frames, SampleType::U16, &linear_wavelengths(7, 600.0, 660.0));

    let spe = SpeFile::open(&path).unwrap();
    assert_eq!(spe.frame_count(), 3);
    assert_eq!(spe.shape(), shape);
    assert_eq!(spe.header.sample_type, SampleType::U16);

    for (i, expected) in frames.iter().enumerate() {
        let frame = spe.read_frame(i).unwrap();
        assert_eq!(&*frame, expected);
    }
    assert!(spe.frames().all(|f| f.is_ok()));
}

#[test]
fn test_write_read_roundtrip_is_bit_exact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(2, 4, 6);
    let frames: Vec<Array2<f64>> = (0..2)
        .map(|f| Array2::from_shape_fn((4, 6), |(p, w)| (f as f64 + 0.1) * (p * 6 + w) as f64 / 7.0))
        .collect();
    write_spe(&path, &frames, SampleType::F32, &linear_wavelengths(6, 500.0, 550.0));

    let before = std::fs::read(&path).unwrap();
    {
        let mut spe = SpeFile::open_rw(&path, 4).unwrap();
        for i in 0..shape.frame_num {
            let frame = spe.read_frame(i).unwrap();
            spe.write_frame(i, frame.view()).unwrap();
        }
    }
    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);

    let spe = SpeFile::open(&path).unwrap();
    let raw = spe.frame_raw(1).unwrap();
    assert_eq!(raw, &before[SPE_HEADER_SIZE + 4 * 6 * 4..SPE_HEADER_SIZE + 2 * 4 * 6 * 4]);
}

#[test]
fn test_write_preserves_sample_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 2, 3);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0, 3.0]);

    let mut spe = SpeFile::open_rw(&path, 4).unwrap();
    let replacement = Array2::from_elem((2, 3), 70_000.0);
    spe.write_frame(0, replacement.view()).unwrap();
    let frame = spe.read_frame(0).unwrap();
    // Saturates at the u16 maximum rather than changing type.
    assert!(frame.iter().all(|v| *v == 65_535.0));
    assert_eq!(spe.header.sample_type, SampleType::U16);
}

#[test]
fn test_cache_invalidated_after_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(2, 3, 4);
    write_spe(&path, &indexed_frames(shape), SampleType::F32, &[1.0, 2.0, 3.0, 4.0]);

    let mut spe = SpeFile::open_rw(&path, 8).unwrap();
    let first = spe.read_frame(1).unwrap();
    assert_eq!(first[[0, 0]], 10_000.0);

    let replacement = Array2::from_elem((3, 4), 42.0);
    spe.write_frame(1, replacement.view()).unwrap();
    let second = spe.read_frame(1).unwrap();
    assert_eq!(&*second, &replacement);
    // The Arc handed out earlier still holds the old decode.
    assert_eq!(first[[0, 0]], 10_000.0);
}

#[test]
fn test_write_on_read_only_handle_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 2, 2);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0]);

    let mut spe = SpeFile::open(&path).unwrap();
    assert!(!spe.is_writable());
    let frame = Array2::zeros((2, 2));
    assert!(matches!(
        spe.write_frame(0, frame.view()),
        Err(SpectraError::ReadOnly)
    ));
}

#[test]
fn test_frame_index_out_of_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(2, 2, 2);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0]);

    let spe = SpeFile::open(&path).unwrap();
    match spe.read_frame(2) {
        Err(SpectraError::FrameIndexOutOfRange { index, total }) => {
            assert_eq!(index, 2);
            assert_eq!(total, 2);
        }
        other => panic!("expected FrameIndexOutOfRange, got {other:?}"),
    }
}

#[test]
fn test_wrong_shape_write_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 2, 3);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0, 3.0]);

    let mut spe = SpeFile::open_rw(&path, 1).unwrap();
    let frame = Array2::zeros((3, 2));
    assert!(matches!(
        spe.write_frame(0, frame.view()),
        Err(SpectraError::ShapeMismatch(_))
    ));
}

#[test]
fn test_unsupported_extension() {
    let mut tmp = NamedTempFile::with_suffix(".txt").unwrap();
    tmp.write_all(&[0u8; SPE_HEADER_SIZE]).unwrap();
    assert!(matches!(
        SpeFile::open(tmp.path()),
        Err(SpectraError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_missing_magic_is_unsupported() {
    let mut tmp = NamedTempFile::with_suffix(".spe").unwrap();
    tmp.write_all(&[0u8; SPE_HEADER_SIZE]).unwrap();
    assert!(matches!(
        SpeFile::open(tmp.path()),
        Err(SpectraError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_truncated_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(2, 4, 4);
    write_spe_without_footer(&path, &indexed_frames(shape), SampleType::U16);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
    assert!(matches!(
        SpeFile::open(&path),
        Err(SpectraError::InvalidSpe(_))
    ));

    std::fs::write(&path, &bytes[..100]).unwrap();
    assert!(matches!(
        SpeFile::open(&path),
        Err(SpectraError::InvalidSpe(_))
    ));
}

#[test]
fn test_metadata_from_footer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 4, 5);
    let meta = SpeMetadata {
        optical_density: Some("OD2".into()),
        frame_rate: Some(1000.0),
        capture_date: Some("2024-05-01T10:00:00".into()),
        calibration_date: Some("2024-04-30T09:00:00".into()),
        roi_list: vec![RoiRegion {
            x: 0,
            y: 10,
            width: 5,
            height: 4,
        }],
        wavelengths: Some(linear_wavelengths(5, 600.0, 640.0)),
    };
    write_spe_with_metadata(&path, &indexed_frames(shape), SampleType::U16, &meta);

    let spe = SpeFile::open(&path).unwrap();
    let parsed = spe.metadata().unwrap();
    assert_eq!(parsed, meta);

    let wl = spe.wavelengths().unwrap();
    assert_eq!(wl.len(), shape.wavelength_pixel_num);
    assert_eq!(wl.to_vec(), linear_wavelengths(5, 600.0, 640.0));
}

#[test]
fn test_metadata_unavailable_without_footer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 2, 3);
    write_spe_without_footer(&path, &indexed_frames(shape), SampleType::U16);

    let spe = SpeFile::open(&path).unwrap();
    assert!(matches!(
        spe.metadata(),
        Err(SpectraError::MetadataUnavailable(_))
    ));
    // Frames stay readable without metadata.
    assert!(spe.read_frame(0).is_ok());
    assert!(matches!(
        spe.wavelengths(),
        Err(SpectraError::MetadataUnavailable(_))
    ));
}

#[test]
fn test_garbage_footer_is_metadata_unavailable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let header = SpeHeader::new(2, 1, 1, SampleType::U16);
    let mut writer = SpeWriter::create(&path, &header, Some("<SpeFormat><unclosed")).unwrap();
    writer.write_frame(Array2::zeros((1, 2)).view()).unwrap();
    writer.finalize().unwrap();

    let spe = SpeFile::open(&path).unwrap();
    assert!(matches!(
        spe.metadata(),
        Err(SpectraError::MetadataUnavailable(_))
    ));
}

#[test]
fn test_polynomial_wavelengths_fallback() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let mut header = SpeHeader::new(4, 1, 1, SampleType::F32);
    header.polynom_order = 2;
    header.polynom_coeffs[0] = 500.0;
    header.polynom_coeffs[1] = 2.0;
    header.polynom_coeffs[2] = 0.5;
    let mut writer = SpeWriter::create(&path, &header, None).unwrap();
    writer.write_frame(Array2::zeros((1, 4)).view()).unwrap();
    writer.finalize().unwrap();

    let spe = SpeFile::open(&path).unwrap();
    let wl = spe.wavelengths().unwrap();
    let expected = [500.0, 502.5, 506.0, 510.5];
    for (a, b) in wl.iter().zip(expected.iter()) {
        approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_writer_rejects_incomplete_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.spe");
    let header = SpeHeader::new(2, 2, 3, SampleType::U16);
    let mut writer = SpeWriter::create(&path, &header, None).unwrap();
    writer.write_frame(Array2::zeros((2, 2)).view()).unwrap();
    assert!(matches!(writer.finalize(), Err(SpectraError::InvalidSpe(_))));
}

#[test]
fn test_writer_rejects_frames_past_header_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("full.spe");
    let wl = linear_wavelengths(2, 500.0, 600.0);
    let meta = SpeMetadata {
        wavelengths: Some(wl.clone()),
        ..Default::default()
    };
    let header = SpeHeader::new(2, 2, 1, SampleType::U16);
    let footer = spectherm_core::io::spe_xml::render_footer(&meta, &header.shape());
    let mut writer = SpeWriter::create(&path, &header, Some(&footer)).unwrap();
    let frame = Array2::from_elem((2, 2), 7.0);
    writer.write_frame(frame.view()).unwrap();
    assert!(matches!(
        writer.write_frame(frame.view()),
        Err(SpectraError::FrameIndexOutOfRange { index: 1, total: 1 })
    ));
    writer.finalize().unwrap();

    // The footer still sits where the header says it does.
    let spe = SpeFile::open(&path).unwrap();
    assert_eq!(spe.frame_count(), 1);
    assert_eq!(spe.metadata().unwrap().wavelengths, Some(wl));
    assert_eq!(*spe.read_frame(0).unwrap(), frame);
}

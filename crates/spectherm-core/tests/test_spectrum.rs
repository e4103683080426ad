#[allow(dead_code)]
mod common;

use std::cell::Cell;

use ndarray::Array2;
use tempfile::tempdir;

use spectherm_core::cancel::CancelToken;
use spectherm_core::config::CoreConfig;
use spectherm_core::error::SpectraError;
use spectherm_core::frame::{SampleType, SpectralShape};
use spectherm_core::io::SpeFile;
use spectherm_core::spectrum::{rotate_into, RotateMode, SpectrumData, SpectrumSource};

use common::*;

fn open(path: &std::path::Path) -> SpectrumData {
    SpectrumData::open(path, &CoreConfig::default()).unwrap()
}

#[test]
fn test_center_pixel_rounds_half_to_even() {
    assert_eq!(SpectralShape::new(1, 9, 1).center_pixel(), 4);
    assert_eq!(SpectralShape::new(1, 11, 1).center_pixel(), 6);
    assert_eq!(SpectralShape::new(1, 255, 1).center_pixel(), 128);
    assert_eq!(SpectralShape::new(1, 10, 1).center_pixel(), 5);
    assert_eq!(SpectralShape::new(1, 1, 1).center_pixel(), 0);
}

#[test]
fn test_shape_invariant_binary_and_tabular() {
    let dir = tempdir().unwrap();
    let shape = SpectralShape::new(2, 4, 6);
    let frames = indexed_frames(shape);
    let wl = linear_wavelengths(6, 600.0, 650.0);

    let spe_path = dir.path().join("raw.spe");
    write_spe(&spe_path, &frames, SampleType::U16, &wl);
    let hdf_path = write_calibrated_dataset(&dir.path().join("raw_calib.hdf"), &frames, &wl);

    for path in [&spe_path, &hdf_path] {
        let data = open(path);
        assert_eq!(data.shape(), shape);
        assert_eq!(data.wavelengths().unwrap().len(), shape.wavelength_pixel_num);
        for i in 0..shape.frame_num {
            let frame = data.frame(i).unwrap();
            assert_eq!(frame.ncols(), shape.wavelength_pixel_num);
            assert_eq!(&*frame, &frames[i]);
        }
    }

    assert!(matches!(open(&spe_path).source(), SpectrumSource::Binary(_)));
    assert!(matches!(open(&hdf_path).source(), SpectrumSource::Tabular(_)));
    assert_eq!(open(&hdf_path).file_stem(), "raw_calib");
}

#[test]
fn test_unsupported_container() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("spectra.csv");
    std::fs::write(&path, "1,2\n").unwrap();
    assert!(matches!(
        SpectrumData::open(&path, &CoreConfig::default()),
        Err(SpectraError::UnsupportedFormat(_))
    ));
    // A plain directory without a calibrated cube is not a container either.
    let plain = dir.path().join("plain");
    std::fs::create_dir(&plain).unwrap();
    assert!(matches!(
        SpectrumData::open(&plain, &CoreConfig::default()),
        Err(SpectraError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_spectrum_and_index_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(2, 3, 4);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0, 3.0, 4.0]);
    let data = open(&path);

    let spectrum = data.spectrum(1, 2).unwrap();
    assert_eq!(spectrum.to_vec(), vec![10_200.0, 10_201.0, 10_202.0, 10_203.0]);

    assert!(matches!(
        data.spectrum(0, 3),
        Err(SpectraError::PositionIndexOutOfRange { index: 3, total: 3 })
    ));
    assert!(matches!(
        data.spectrum(5, 0),
        Err(SpectraError::FrameIndexOutOfRange { index: 5, total: 2 })
    ));
}

#[test]
fn test_max_intensity_per_frame_and_halves() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(3, 9, 5);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &linear_wavelengths(5, 600.0, 640.0));
    let data = open(&path);
    let cancel = CancelToken::new();

    let per_frame = data.max_intensity_per_frame(|_, _| {}, &cancel).unwrap();
    assert_eq!(per_frame.to_vec(), vec![804.0, 10_804.0, 20_804.0]);

    // center_pixel = 4: upper rows 0..3, lower rows 4..8.
    let (upper, lower) = data.max_intensity_per_frame_split(|_, _| {}, &cancel).unwrap();
    assert_eq!(upper.to_vec(), vec![204.0, 10_204.0, 20_204.0]);
    assert_eq!(lower.to_vec(), vec![704.0, 10_704.0, 20_704.0]);
}

#[test]
fn test_split_halves_too_few_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 2, 3);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0, 3.0]);
    let data = open(&path);
    assert!(matches!(
        data.max_intensity_per_frame_split(|_, _| {}, &CancelToken::new()),
        Err(SpectraError::InvalidInput(_))
    ));
}

#[test]
fn test_max_intensity_2d_reports_progress() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(4, 3, 5);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &linear_wavelengths(5, 600.0, 640.0));
    let data = open(&path);

    let mut calls = Vec::new();
    let max_2d = data
        .max_intensity_2d(|done, total| calls.push((done, total)), &CancelToken::new())
        .unwrap();

    assert_eq!(calls, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(max_2d.dim(), shape.grid_dim());
    let expected = Array2::from_shape_fn((4, 3), |(f, p)| (f * 10_000 + p * 100 + 4) as f64);
    assert_eq!(max_2d, expected);
}

#[test]
fn test_cancel_stops_between_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(5, 2, 2);
    write_spe(&path, &indexed_frames(shape), SampleType::U16, &[1.0, 2.0]);
    let data = open(&path);

    let cancel = CancelToken::new();
    let done = Cell::new(0);
    let result = data.max_intensity_2d(
        |d, _| {
            done.set(d);
            if d == 2 {
                cancel.cancel();
            }
        },
        &cancel,
    );
    assert!(matches!(result, Err(SpectraError::Cancelled)));
    assert_eq!(done.get(), 2);
}

#[test]
fn test_rotate_into_creates_copy_and_rotates() {
    let dir = tempdir().unwrap();
    let before = dir.path().join("before.spe");
    let after = dir.path().join("after.spe");
    let shape = SpectralShape::new(2, 5, 7);
    let frames = indexed_frames(shape);
    write_spe(&before, &frames, SampleType::F32, &linear_wavelengths(7, 600.0, 660.0));

    let mut calls = 0;
    rotate_into(&before, &after, 180.0, RotateMode::Whole, 4, |_, _| calls += 1, &CancelToken::new())
        .unwrap();
    assert_eq!(calls, 2);

    let rotated = SpeFile::open(&after).unwrap();
    assert_eq!(rotated.header.sample_type, SampleType::F32);
    for (i, original) in frames.iter().enumerate() {
        let frame = rotated.read_frame(i).unwrap();
        for ((p, w), v) in frame.indexed_iter() {
            let expected = original[[4 - p, 6 - w]];
            assert!((v - expected).abs() < 1e-2, "frame {i} ({p}, {w}): {v} vs {expected}");
        }
    }
    // The footer travels with the byte copy.
    assert_eq!(rotated.wavelengths().unwrap().len(), 7);

    // A second pass overwrites the existing target in place.
    rotate_into(&before, &after, 0.0, RotateMode::Whole, 4, |_, _| {}, &CancelToken::new()).unwrap();
    assert_eq!(std::fs::read(&before).unwrap(), std::fs::read(&after).unwrap());
}

#[test]
fn test_rotate_into_frame_count_mismatch() {
    let dir = tempdir().unwrap();
    let before = dir.path().join("before.spe");
    let after = dir.path().join("after.spe");
    write_spe(&before, &indexed_frames(SpectralShape::new(3, 2, 2)), SampleType::U16, &[1.0, 2.0]);
    write_spe(&after, &indexed_frames(SpectralShape::new(2, 2, 2)), SampleType::U16, &[1.0, 2.0]);

    let result = rotate_into(&before, &after, 90.0, RotateMode::Whole, 4, |_, _| {}, &CancelToken::new());
    assert!(matches!(result, Err(SpectraError::ShapeMismatch(_))));
}

#[test]
fn test_rotated_frame_separate_halves_keeps_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.spe");
    let shape = SpectralShape::new(1, 4, 3);
    let frames = indexed_frames(shape);
    write_spe(&path, &frames, SampleType::F32, &[1.0, 2.0, 3.0]);
    let data = open(&path);

    // 360 degrees is the identity in either mode.
    let same = data.rotated_frame(0, 360.0, RotateMode::SeparateHalves).unwrap();
    assert_eq!(same, frames[0]);

    // center_pixel = 2: each 2-row half flips on its own.
    let flipped = data.rotated_frame(0, 180.0, RotateMode::SeparateHalves).unwrap();
    for ((p, w), v) in flipped.indexed_iter() {
        let source_row = if p < 2 { 1 - p } else { 5 - p };
        let expected = frames[0][[source_row, 2 - w]];
        assert!((v - expected).abs() < 1e-6);
    }
}

#[test]
fn test_rotation_rejects_non_finite_angles() {
    let dir = tempdir().unwrap();
    let before = dir.path().join("before.spe");
    let after = dir.path().join("after.spe");
    let frames = vec![Array2::from_elem((4, 5), 1000.0); 2];
    write_spe(&before, &frames, SampleType::U16, &linear_wavelengths(5, 600.0, 640.0));
    write_spe(&after, &frames, SampleType::U16, &linear_wavelengths(5, 600.0, 640.0));

    for angle in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let result =
            rotate_into(&before, &after, angle, RotateMode::Whole, 4, |_, _| {}, &CancelToken::new());
        assert!(matches!(result, Err(SpectraError::InvalidInput(_))), "{angle}");
        assert!(matches!(
            open(&before).rotated_frame(0, angle, RotateMode::SeparateHalves),
            Err(SpectraError::InvalidInput(_))
        ));
    }

    // The target is untouched.
    let target = SpeFile::open(&after).unwrap();
    for i in 0..2 {
        assert_eq!(target.read_frame(i).unwrap().sum(), 20_000.0);
    }
}

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};

use spectherm_core::frame::{SampleType, SpectralShape};
use spectherm_core::io::dataset::{CALIBRATED_SPECTRA, WAVELENGTH_ARR};
use spectherm_core::io::spe_xml::render_footer;
use spectherm_core::io::{DatasetStore, SpeHeader, SpeMetadata, SpeWriter};
use spectherm_core::planck::planck_radiance;

/// Evenly spaced wavelengths from `start` to `end` inclusive (nm).
pub fn linear_wavelengths(n: usize, start: f64, end: f64) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Frames whose value encodes (frame, position, wavelength) so reads can be checked exactly.
pub fn indexed_frames(shape: SpectralShape) -> Vec<Array2<f64>> {
    (0..shape.frame_num)
        .map(|f| {
            Array2::from_shape_fn(shape.frame_dim(), |(p, w)| {
                (f * 10_000 + p * 100 + w) as f64
            })
        })
        .collect()
}

/// Write an SPE file whose footer carries the given metadata.
pub fn write_spe_with_metadata(
    path: &Path,
    frames: &[Array2<f64>],
    dtype: SampleType,
    meta: &SpeMetadata,
) {
    let (rows, cols) = frames[0].dim();
    let header = SpeHeader::new(cols as u16, rows as u16, frames.len() as u32, dtype);
    let footer = render_footer(meta, &header.shape());
    let mut writer = SpeWriter::create(path, &header, Some(&footer)).unwrap();
    for frame in frames {
        writer.write_frame(frame.view()).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write an SPE file with a wavelength mapping in its footer.
pub fn write_spe(path: &Path, frames: &[Array2<f64>], dtype: SampleType, wavelengths: &[f64]) {
    let meta = SpeMetadata {
        wavelengths: Some(wavelengths.to_vec()),
        ..Default::default()
    };
    write_spe_with_metadata(path, frames, dtype, &meta);
}

/// Write an SPE file with no footer at all.
pub fn write_spe_without_footer(path: &Path, frames: &[Array2<f64>], dtype: SampleType) {
    let (rows, cols) = frames[0].dim();
    let header = SpeHeader::new(cols as u16, rows as u16, frames.len() as u32, dtype);
    let mut writer = SpeWriter::create(path, &header, None).unwrap();
    for frame in frames {
        writer.write_frame(frame.view()).unwrap();
    }
    writer.finalize().unwrap();
}

/// Planck spectra at a single temperature for every (frame, position).
pub fn blackbody_frames(
    frame_num: usize,
    position_pixel_num: usize,
    wavelengths: &[f64],
    temperature: f64,
    scale: f64,
) -> Vec<Array2<f64>> {
    let row: Vec<f64> = wavelengths
        .iter()
        .map(|&wl| planck_radiance(wl, temperature, scale))
        .collect();
    (0..frame_num)
        .map(|_| {
            Array2::from_shape_fn((position_pixel_num, wavelengths.len()), |(_, w)| row[w])
        })
        .collect()
}

/// Write a calibrated container the way calibration does.
pub fn write_calibrated_dataset(path: &Path, frames: &[Array2<f64>], wavelengths: &[f64]) -> PathBuf {
    let (rows, cols) = frames[0].dim();
    let store = DatasetStore::create(path).unwrap();
    store
        .write_array1(WAVELENGTH_ARR, &Array1::from(wavelengths.to_vec()))
        .unwrap();
    store
        .create_dataset(CALIBRATED_SPECTRA, &[frames.len(), rows, cols], SampleType::F64)
        .unwrap();
    for (i, frame) in frames.iter().enumerate() {
        store.write_frame(CALIBRATED_SPECTRA, i, frame.view()).unwrap();
    }
    path.to_path_buf()
}

use std::path::Path;

use ndarray::{s, Array1, Array2};
use tracing::{info, instrument, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, SpectraError};
use crate::frame::SampleType;
use crate::io::dataset::{DatasetStore, CALIBRATED_SPECTRA, WAVELENGTH_ARR};
use crate::io::lamp::LampSpectrum;
use crate::spectrum::SpectrumData;

/// Per-pixel response of one detector half along the wavelength axis.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseCurve(pub Array1<f64>);

impl ResponseCurve {
    /// Row 0 of frame 0 of a filter-response measurement.
    pub fn from_spectrum(data: &SpectrumData) -> Result<Self> {
        Ok(Self(data.spectrum(0, 0)?))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Array1<f64>> for ResponseCurve {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

/// Build `lamp / response`, with the upper response across rows
/// `[0, center_pixel)` and the lower one across the rest.
pub fn calibration_image(
    lamp_on_grid: &Array1<f64>,
    upper: &ResponseCurve,
    lower: &ResponseCurve,
    position_pixel_num: usize,
    center_pixel: usize,
) -> Result<Array2<f64>> {
    let width = lamp_on_grid.len();
    for (name, curve) in [("upper", upper), ("lower", lower)] {
        if curve.len() != width {
            return Err(SpectraError::ShapeMismatch(format!(
                "{name} response has {} samples, wavelength axis has {width}",
                curve.len()
            )));
        }
    }
    let center = center_pixel.min(position_pixel_num);

    let mut image = Array2::zeros((position_pixel_num, width));
    image
        .slice_mut(s![..center, ..])
        .assign(&(lamp_on_grid / &upper.0));
    image
        .slice_mut(s![center.., ..])
        .assign(&(lamp_on_grid / &lower.0));

    let non_finite = image.iter().filter(|v| !v.is_finite()).count();
    if non_finite > 0 {
        warn!(
            pixels = non_finite,
            "Calibration image has non-finite factors (zero response?)"
        );
    }
    Ok(image)
}

/// Calibrate every frame of `raw` and stream the result into a dataset container.
///
/// All shapes are validated before `output` is touched. The native
/// wavelength array is stored unchanged next to the calibrated cube.
/// `progress` is called with `(frames_done, total_frames)`.
#[instrument(skip_all, fields(raw = %raw.path().display(), output = %output.display()))]
pub fn calibrate(
    raw: &SpectrumData,
    lamp: &LampSpectrum,
    upper: &ResponseCurve,
    lower: &ResponseCurve,
    output: &Path,
    mut progress: impl FnMut(usize, usize),
    cancel: &CancelToken,
) -> Result<DatasetStore> {
    let shape = raw.shape();
    let wavelengths = raw.wavelengths()?;
    if wavelengths.len() != shape.wavelength_pixel_num {
        return Err(SpectraError::ShapeMismatch(format!(
            "{} wavelengths for {} wavelength pixels",
            wavelengths.len(),
            shape.wavelength_pixel_num
        )));
    }

    let lamp_on_grid = lamp.interpolate(wavelengths.view());
    let image = calibration_image(
        &lamp_on_grid,
        upper,
        lower,
        shape.position_pixel_num,
        shape.center_pixel(),
    )?;

    info!(
        frames = shape.frame_num,
        positions = shape.position_pixel_num,
        wavelengths = shape.wavelength_pixel_num,
        center_pixel = shape.center_pixel(),
        lamp_samples = lamp.len(),
        "Writing calibrated spectra"
    );

    let store = DatasetStore::create(output)?;
    store.write_array1(WAVELENGTH_ARR, &wavelengths)?;
    store.create_dataset(
        CALIBRATED_SPECTRA,
        &[
            shape.frame_num,
            shape.position_pixel_num,
            shape.wavelength_pixel_num,
        ],
        SampleType::F64,
    )?;

    let total = shape.frame_num;
    for i in 0..total {
        cancel.check()?;
        let frame = raw.frame(i)?;
        let calibrated = &*frame * &image;
        store.write_frame(CALIBRATED_SPECTRA, i, calibrated.view())?;
        progress(i + 1, total);
    }

    info!("Finished writing calibrated spectra");
    Ok(store)
}

//! Batch temperature estimation over a (frame, position) grid.
//!
//! A point that cannot be fitted is recorded as failed and the sweep moves on.
//! Value arrays hold NaN wherever no valid estimate exists, and the parallel
//! `status` array tells "not computed" apart from "failed".

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cancel::CancelToken;
use crate::config::{CoreConfig, PlanckConfig};
use crate::consts::{DEFAULT_WINDOW_LOWER_NM, DEFAULT_WINDOW_UPPER_NM};
use crate::error::{Result, SpectraError};
use crate::frame::{SampleType, SpectralShape};
use crate::histogram::{HistogramFitResult, HistogramFitter};
use crate::io::dataset::{
    DatasetStore, ERROR_SCALE, ERROR_T, ERROR_WIDTH, MASK_STATUS, MAX_INTENSITY_2D, VALUE_SCALE,
    VALUE_T, VALUE_WIDTH,
};
use crate::planck::{FitResult, PlanckFitter};
use crate::pyrometer::{TwoColorPyrometer, TwoColorSolution};
use crate::spectrum::SpectrumData;

/// Inclusive wavelength range (nm) used for fitting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WavelengthWindow {
    pub lower: f64,
    pub upper: f64,
}

impl Default for WavelengthWindow {
    fn default() -> Self {
        Self {
            lower: DEFAULT_WINDOW_LOWER_NM,
            upper: DEFAULT_WINDOW_UPPER_NM,
        }
    }
}

impl WavelengthWindow {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Indices of the wavelengths inside the window.
    pub fn select(&self, wavelengths: &Array1<f64>) -> Result<Vec<usize>> {
        let idx: Vec<usize> = wavelengths
            .iter()
            .enumerate()
            .filter(|(_, w)| **w >= self.lower && **w <= self.upper)
            .map(|(i, _)| i)
            .collect();
        if idx.is_empty() {
            return Err(SpectraError::InvalidInput(format!(
                "no wavelengths inside {}-{} nm",
                self.lower, self.upper
            )));
        }
        Ok(idx)
    }
}

/// Per-point state of a sweep result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PointStatus {
    #[default]
    NotComputed = 0,
    Fitted = 1,
    Warned = 2,
    Failed = 3,
}

impl PointStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NotComputed),
            1 => Some(Self::Fitted),
            2 => Some(Self::Warned),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the value arrays hold an estimate at this point.
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Fitted | Self::Warned)
    }
}

/// A point that produced no estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct PointFailure {
    pub frame: usize,
    pub position: usize,
    pub message: String,
}

/// Every cell whose maximum intensity reaches `threshold`, in row-major order.
pub fn select_targets(max_intensity_2d: &Array2<f64>, threshold: f64) -> Vec<(usize, usize)> {
    max_intensity_2d
        .indexed_iter()
        .filter(|(_, v)| **v >= threshold)
        .map(|(idx, _)| idx)
        .collect()
}

/// Every (frame, position) cell.
pub fn all_targets(shape: &SpectralShape) -> Vec<(usize, usize)> {
    let (frames, positions) = shape.grid_dim();
    (0..frames)
        .flat_map(|f| (0..positions).map(move |p| (f, p)))
        .collect()
}

fn check_targets(shape: &SpectralShape, targets: &[(usize, usize)]) -> Result<()> {
    for &(frame, position) in targets {
        if frame >= shape.frame_num {
            return Err(SpectraError::FrameIndexOutOfRange {
                index: frame,
                total: shape.frame_num,
            });
        }
        if position >= shape.position_pixel_num {
            return Err(SpectraError::PositionIndexOutOfRange {
                index: position,
                total: shape.position_pixel_num,
            });
        }
    }
    Ok(())
}

/// Wavelengths and intensities of one point restricted to `columns`.
fn windowed_spectrum(
    data: &SpectrumData,
    wavelengths: &Array1<f64>,
    columns: &[usize],
    frame: usize,
    position: usize,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let frame_data = data.frame(frame)?;
    if position >= frame_data.nrows() {
        return Err(SpectraError::PositionIndexOutOfRange {
            index: position,
            total: frame_data.nrows(),
        });
    }
    let row = frame_data.row(position);
    Ok((
        columns.iter().map(|&c| wavelengths[c]).collect(),
        columns.iter().map(|&c| row[c]).collect(),
    ))
}

/// Planck fit of a single point. Errors reach the caller.
pub fn planck_point(
    data: &SpectrumData,
    frame: usize,
    position: usize,
    window: &WavelengthWindow,
    config: &PlanckConfig,
) -> Result<FitResult> {
    let wavelengths = data.wavelengths()?;
    let columns = window.select(&wavelengths)?;
    let (wl, intensity) = windowed_spectrum(data, &wavelengths, &columns, frame, position)?;
    PlanckFitter::new(config.clone()).fit(&wl, &intensity)
}

/// Planck fit results over the grid.
#[derive(Clone, Debug)]
pub struct PlanckMap {
    pub temperature: Array2<f64>,
    pub scale: Array2<f64>,
    pub temperature_error: Array2<f64>,
    pub scale_error: Array2<f64>,
    pub status: Array2<PointStatus>,
    pub failures: Vec<PointFailure>,
}

impl PlanckMap {
    fn new(dim: (usize, usize)) -> Self {
        Self {
            temperature: Array2::from_elem(dim, f64::NAN),
            scale: Array2::from_elem(dim, f64::NAN),
            temperature_error: Array2::from_elem(dim, f64::NAN),
            scale_error: Array2::from_elem(dim, f64::NAN),
            status: Array2::default(dim),
            failures: Vec::new(),
        }
    }

    pub fn count(&self, status: PointStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }

    /// Write `value/*`, `error/*` and the status mask.
    pub fn save(&self, store: &DatasetStore) -> Result<()> {
        store.write_array2(VALUE_T, &self.temperature)?;
        store.write_array2(VALUE_SCALE, &self.scale)?;
        store.write_array2(ERROR_T, &self.temperature_error)?;
        store.write_array2(ERROR_SCALE, &self.scale_error)?;
        save_status(store, &self.status)
    }
}

fn save_status(store: &DatasetStore, status: &Array2<PointStatus>) -> Result<()> {
    let codes = status.mapv(|s| s.code() as f64);
    store.write_array(MASK_STATUS, codes.view(), SampleType::U8)
}

/// Read back a status mask written by a sweep.
pub fn load_status(store: &DatasetStore) -> Result<Array2<PointStatus>> {
    let codes = store.read_array2(MASK_STATUS)?;
    let mut out = Array2::default(codes.dim());
    for (dst, &code) in out.iter_mut().zip(codes.iter()) {
        *dst = PointStatus::from_code(code as u8).ok_or_else(|| {
            SpectraError::InvalidDataset(format!("unknown status code {code}"))
        })?;
    }
    Ok(out)
}

/// Save a `(frame, position)` max-intensity map.
pub fn save_max_intensity(store: &DatasetStore, max_intensity_2d: &Array2<f64>) -> Result<()> {
    store.write_array2(MAX_INTENSITY_2D, max_intensity_2d)
}

/// Planck-fit every target point.
///
/// `progress` is called with `(points_done, total_points)`.
#[instrument(skip_all, fields(path = %data.path().display(), targets = targets.len()))]
pub fn planck_sweep(
    data: &SpectrumData,
    targets: &[(usize, usize)],
    window: &WavelengthWindow,
    config: &PlanckConfig,
    mut progress: impl FnMut(usize, usize),
    cancel: &CancelToken,
) -> Result<PlanckMap> {
    let shape = data.shape();
    check_targets(&shape, targets)?;
    let wavelengths = data.wavelengths()?;
    let columns = window.select(&wavelengths)?;
    let fitter = PlanckFitter::new(config.clone());

    info!(
        lower = window.lower,
        upper = window.upper,
        columns = columns.len(),
        "Starting Planck sweep"
    );

    let mut map = PlanckMap::new(shape.grid_dim());
    let total = targets.len();
    for (done, &(frame, position)) in targets.iter().enumerate() {
        cancel.check()?;
        let (wl, intensity) = windowed_spectrum(data, &wavelengths, &columns, frame, position)?;
        let idx = [frame, position];
        match fitter.fit(&wl, &intensity) {
            Ok(fit) => {
                map.temperature[idx] = fit.temperature;
                map.scale[idx] = fit.scale;
                map.temperature_error[idx] = fit.temperature_error;
                map.scale_error[idx] = fit.scale_error;
                map.status[idx] = if fit.temperature_error.is_finite() && fit.scale_error.is_finite() {
                    PointStatus::Fitted
                } else {
                    PointStatus::Warned
                };
            }
            Err(e) => {
                warn!(frame, position, error = %e, "Planck fit failed");
                map.status[idx] = PointStatus::Failed;
                map.failures.push(PointFailure {
                    frame,
                    position,
                    message: e.to_string(),
                });
            }
        }
        progress(done + 1, total);
    }

    info!(
        fitted = map.count(PointStatus::Fitted),
        warned = map.count(PointStatus::Warned),
        failed = map.count(PointStatus::Failed),
        "Planck sweep finished"
    );
    Ok(map)
}

/// Two-color result at one point.
#[derive(Clone, Debug)]
pub struct TwoColorPoint {
    pub frame: usize,
    pub position: usize,
    pub solution: TwoColorSolution,
    /// Solved temperatures inside the plausible window.
    pub plausible: Vec<f64>,
    /// The fitter, left in its fitted state for curve sampling.
    pub fitter: HistogramFitter,
    pub fit: HistogramFitResult,
}

/// Solve every wavelength pair at one point.
pub fn pair_solution(
    data: &SpectrumData,
    frame: usize,
    position: usize,
    window: &WavelengthWindow,
    config: &CoreConfig,
) -> Result<TwoColorSolution> {
    let wavelengths = data.wavelengths()?;
    let columns = window.select(&wavelengths)?;
    let (wl, intensity) = windowed_spectrum(data, &wavelengths, &columns, frame, position)?;
    TwoColorPyrometer::new(config.two_color.clone()).solve_all_pairs(&wl, &intensity)
}

fn fit_pair_histogram(
    solution: &TwoColorSolution,
    config: &CoreConfig,
) -> Result<(Vec<f64>, HistogramFitter, HistogramFitResult)> {
    let plausible = config
        .histogram
        .plausible
        .filter_plausible(&solution.temperatures);
    let mut fitter = HistogramFitter::new(&plausible, config.histogram.bins)?;
    let fit = fitter.fit(config.histogram.model)?.clone();
    Ok((plausible, fitter, fit))
}

/// Pair temperatures at one point, filtered and aggregated by a histogram fit.
pub fn two_color_point(
    data: &SpectrumData,
    frame: usize,
    position: usize,
    window: &WavelengthWindow,
    config: &CoreConfig,
) -> Result<TwoColorPoint> {
    let solution = pair_solution(data, frame, position, window, config)?;
    let (plausible, fitter, fit) = fit_pair_histogram(&solution, config)?;
    Ok(TwoColorPoint {
        frame,
        position,
        solution,
        plausible,
        fitter,
        fit,
    })
}

/// Histogram-aggregated two-color results over the grid.
#[derive(Clone, Debug)]
pub struct TwoColorMap {
    /// Histogram centre.
    pub temperature: Array2<f64>,
    pub temperature_error: Array2<f64>,
    pub width: Array2<f64>,
    pub width_error: Array2<f64>,
    pub status: Array2<PointStatus>,
    pub failures: Vec<PointFailure>,
}

impl TwoColorMap {
    fn new(dim: (usize, usize)) -> Self {
        Self {
            temperature: Array2::from_elem(dim, f64::NAN),
            temperature_error: Array2::from_elem(dim, f64::NAN),
            width: Array2::from_elem(dim, f64::NAN),
            width_error: Array2::from_elem(dim, f64::NAN),
            status: Array2::default(dim),
            failures: Vec::new(),
        }
    }

    pub fn count(&self, status: PointStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }

    /// Write `value/{T,width}`, `error/{T,width}` and the status mask.
    pub fn save(&self, store: &DatasetStore) -> Result<()> {
        store.write_array2(VALUE_T, &self.temperature)?;
        store.write_array2(VALUE_WIDTH, &self.width)?;
        store.write_array2(ERROR_T, &self.temperature_error)?;
        store.write_array2(ERROR_WIDTH, &self.width_error)?;
        save_status(store, &self.status)
    }
}

/// Two-color estimate at every target point.
///
/// A point is `Warned` when any pair warned and `Failed` when no plausible
/// temperature remains or the histogram fit fails.
#[instrument(skip_all, fields(path = %data.path().display(), targets = targets.len()))]
pub fn two_color_sweep(
    data: &SpectrumData,
    targets: &[(usize, usize)],
    window: &WavelengthWindow,
    config: &CoreConfig,
    mut progress: impl FnMut(usize, usize),
    cancel: &CancelToken,
) -> Result<TwoColorMap> {
    let shape = data.shape();
    check_targets(&shape, targets)?;
    let wavelengths = data.wavelengths()?;
    let columns = window.select(&wavelengths)?;
    let pyrometer = TwoColorPyrometer::new(config.two_color.clone());

    info!(
        lower = window.lower,
        upper = window.upper,
        columns = columns.len(),
        model = %config.histogram.model,
        "Starting two-color sweep"
    );

    let mut map = TwoColorMap::new(shape.grid_dim());
    let total = targets.len();
    for (done, &(frame, position)) in targets.iter().enumerate() {
        cancel.check()?;
        let (wl, intensity) = windowed_spectrum(data, &wavelengths, &columns, frame, position)?;
        let solution = pyrometer.solve_all_pairs_cancellable(&wl, &intensity, cancel)?;
        let idx = [frame, position];
        match fit_pair_histogram(&solution, config) {
            Ok((_, _, fit)) => {
                map.temperature[idx] = fit.center;
                map.temperature_error[idx] = fit.center_error;
                map.width[idx] = fit.width;
                map.width_error[idx] = fit.width_error;
                map.status[idx] = if solution.warned.is_empty() {
                    PointStatus::Fitted
                } else {
                    PointStatus::Warned
                };
            }
            Err(e) => {
                warn!(frame, position, error = %e, "Two-color estimate failed");
                map.status[idx] = PointStatus::Failed;
                map.failures.push(PointFailure {
                    frame,
                    position,
                    message: e.to_string(),
                });
            }
        }
        progress(done + 1, total);
    }

    info!(
        fitted = map.count(PointStatus::Fitted),
        warned = map.count(PointStatus::Warned),
        failed = map.count(PointStatus::Failed),
        "Two-color sweep finished"
    );
    Ok(map)
}

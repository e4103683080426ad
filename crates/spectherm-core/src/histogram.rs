use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    DEFAULT_MAX_PLAUSIBLE_TEMPERATURE, DEFAULT_MIN_PLAUSIBLE_TEMPERATURE, DEFAULT_MIXING_SEED,
    DEFAULT_WIDTH_SEED, FITTED_CURVE_POINTS,
};
use crate::error::{Result, SpectraError};
use crate::fit::{levenberg_marquardt, CurveModel, LmConfig};

const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

/// Peak shape fitted to a temperature histogram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakModel {
    Gaussian,
    Lorentzian,
    PseudoVoigt,
}

impl PeakModel {
    pub fn n_params(self) -> usize {
        match self {
            Self::Gaussian | Self::Lorentzian => 3,
            Self::PseudoVoigt => 4,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Gaussian => "Gaussian",
            Self::Lorentzian => "Lorentzian",
            Self::PseudoVoigt => "Pseudo-Voigt",
        }
    }
}

impl fmt::Display for PeakModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gaussian => write!(f, "gaussian"),
            Self::Lorentzian => write!(f, "lorentzian"),
            Self::PseudoVoigt => write!(f, "pseudo_voigt"),
        }
    }
}

impl FromStr for PeakModel {
    type Err = SpectraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gaussian" => Ok(Self::Gaussian),
            "lorentzian" => Ok(Self::Lorentzian),
            "pseudo_voigt" => Ok(Self::PseudoVoigt),
            other => Err(SpectraError::InvalidInput(format!(
                "unsupported model {other:?}; choose gaussian, lorentzian or pseudo_voigt"
            ))),
        }
    }
}

fn gaussian_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / (sigma * SQRT_2PI)
}

fn cauchy_pdf(x: f64, x0: f64, gamma: f64) -> f64 {
    let u = (x - x0) / gamma;
    1.0 / (PI * gamma * (1.0 + u * u))
}

/// Gradient of `A·N(x; μ, σ)` in `[A, μ, σ]`.
fn gaussian_terms(x: f64, a: f64, mu: f64, sigma: f64) -> (f64, [f64; 3]) {
    let z = (x - mu) / sigma;
    let g = gaussian_pdf(x, mu, sigma);
    (a * g, [g, a * g * z / sigma, a * g * (z * z - 1.0) / sigma])
}

/// Gradient of `A·Cauchy(x; x₀, γ)` in `[A, x₀, γ]`.
fn lorentzian_terms(x: f64, a: f64, x0: f64, gamma: f64) -> (f64, [f64; 3]) {
    let u = (x - x0) / gamma;
    let l = cauchy_pdf(x, x0, gamma);
    let q = gamma * (1.0 + u * u);
    (a * l, [l, a * l * 2.0 * u / q, a * l * (u * u - 1.0) / q])
}

impl CurveModel for PeakModel {
    fn n_params(&self) -> usize {
        PeakModel::n_params(*self)
    }

    fn value(&self, x: f64, p: &[f64]) -> f64 {
        if p[2] <= 0.0 {
            return f64::NAN;
        }
        match self {
            Self::Gaussian => p[0] * gaussian_pdf(x, p[1], p[2]),
            Self::Lorentzian => p[0] * cauchy_pdf(x, p[1], p[2]),
            Self::PseudoVoigt => {
                let eta = p[3];
                p[0] * (eta * cauchy_pdf(x, p[1], p[2]) + (1.0 - eta) * gaussian_pdf(x, p[1], p[2]))
            }
        }
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        if p[2] <= 0.0 {
            out.iter_mut().for_each(|v| *v = f64::NAN);
            return;
        }
        match self {
            Self::Gaussian => out.copy_from_slice(&gaussian_terms(x, p[0], p[1], p[2]).1),
            Self::Lorentzian => out.copy_from_slice(&lorentzian_terms(x, p[0], p[1], p[2]).1),
            Self::PseudoVoigt => {
                let eta = p[3];
                let (l, dl) = lorentzian_terms(x, p[0], p[1], p[2]);
                let (g, dg) = gaussian_terms(x, p[0], p[1], p[2]);
                for k in 0..3 {
                    out[k] = eta * dl[k] + (1.0 - eta) * dg[k];
                }
                out[3] = l - g;
            }
        }
    }
}

/// Range of temperatures accepted into a histogram (K).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureWindow {
    pub min: f64,
    pub max: f64,
}

impl Default for TemperatureWindow {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PLAUSIBLE_TEMPERATURE,
            max: DEFAULT_MAX_PLAUSIBLE_TEMPERATURE,
        }
    }
}

impl TemperatureWindow {
    pub fn contains(&self, t: f64) -> bool {
        t.is_finite() && t >= self.min && t <= self.max
    }

    /// Keep the temperatures inside the window.
    pub fn filter_plausible(&self, temperatures: &[f64]) -> Vec<f64> {
        temperatures
            .iter()
            .copied()
            .filter(|t| self.contains(*t))
            .collect()
    }
}

/// Equal-width bin counts, last bin closed on the right.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub counts: Vec<f64>,
    pub edges: Vec<f64>,
    pub centers: Vec<f64>,
}

impl Histogram {
    pub fn compute(data: &[f64], bins: usize) -> Self {
        let (mut lo, mut hi) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins)
            .map(|i| if i == bins { hi } else { lo + width * i as f64 })
            .collect();

        let mut counts = vec![0.0; bins];
        for &v in data {
            let mut idx = (((v - lo) / (hi - lo)) * bins as f64) as usize;
            idx = idx.min(bins - 1);
            // Correct rounding at edges so that membership follows the edge values.
            if idx > 0 && v < edges[idx] {
                idx -= 1;
            } else if idx + 1 < bins && v >= edges[idx + 1] {
                idx += 1;
            }
            counts[idx] += 1.0;
        }

        let centers = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Self {
            counts,
            edges,
            centers,
        }
    }

    pub fn bin_width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    pub fn max_count(&self) -> f64 {
        self.counts.iter().copied().fold(0.0, f64::max)
    }
}

/// Fitted peak parameters with 1-σ errors.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramFitResult {
    pub model: PeakModel,
    pub amplitude: f64,
    pub center: f64,
    pub width: f64,
    /// Lorentzian fraction, pseudo-Voigt only.
    pub mixing_ratio: Option<f64>,
    pub amplitude_error: f64,
    pub center_error: f64,
    pub width_error: f64,
    pub mixing_ratio_error: Option<f64>,
}

impl HistogramFitResult {
    fn from_params(model: PeakModel, params: &[f64], errors: &[f64]) -> Self {
        Self {
            model,
            amplitude: params[0],
            center: params[1],
            width: params[2],
            mixing_ratio: params.get(3).copied(),
            amplitude_error: errors[0],
            center_error: errors[1],
            width_error: errors[2],
            mixing_ratio_error: errors.get(3).copied(),
        }
    }

    pub fn params(&self) -> Vec<f64> {
        let mut p = vec![self.amplitude, self.center, self.width];
        p.extend(self.mixing_ratio);
        p
    }

    /// Width relative to the centre, in percent.
    pub fn relative_width_percent(&self) -> f64 {
        self.width / self.center * 100.0
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.model.value(x, &self.params())
    }
}

impl fmt::Display for HistogramFitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} fit", self.model.label())?;
        writeln!(f, "  x0 = {:.1} ± {:.1} K", self.center, self.center_error)?;
        writeln!(f, "  width = {:.1} ± {:.1} K", self.width, self.width_error)?;
        if let Some(eta) = self.mixing_ratio {
            writeln!(f, "  Lo. ratio = {:.2}", eta)?;
        }
        write!(f, "  (sigma = {:.2} %)", self.relative_width_percent())
    }
}

/// Where a [`HistogramFitter`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitterState {
    Uninitialized,
    HistogramComputed,
    Fitted,
}

/// Aggregates a population of temperatures into one peak estimate.
#[derive(Clone, Debug)]
pub struct HistogramFitter {
    data: Vec<f64>,
    bins: usize,
    histogram: Option<Histogram>,
    fit: Option<HistogramFitResult>,
}

impl HistogramFitter {
    /// Non-finite samples are dropped.
    pub fn new(data: &[f64], bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(SpectraError::InvalidInput("bin count must be positive".into()));
        }
        let data: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
        if data.is_empty() {
            return Err(SpectraError::InvalidInput(
                "no finite samples to histogram".into(),
            ));
        }
        Ok(Self {
            data,
            bins,
            histogram: None,
            fit: None,
        })
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn state(&self) -> FitterState {
        match (&self.histogram, &self.fit) {
            (_, Some(_)) => FitterState::Fitted,
            (Some(_), None) => FitterState::HistogramComputed,
            (None, None) => FitterState::Uninitialized,
        }
    }

    pub fn mean(&self) -> f64 {
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        let mean = self.mean();
        let var = self.data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.data.len() as f64;
        var.sqrt()
    }

    pub fn compute_histogram(&mut self) -> &Histogram {
        self.histogram
            .get_or_insert_with(|| Histogram::compute(&self.data, self.bins))
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    pub fn fit_result(&self) -> Option<&HistogramFitResult> {
        self.fit.as_ref()
    }

    /// Default starting parameters for `model`.
    pub fn initial_guess(&mut self, model: PeakModel) -> Vec<f64> {
        let peak = self.compute_histogram().max_count();
        let mean = self.mean();
        match model {
            PeakModel::Gaussian => vec![peak, mean, self.std_dev()],
            PeakModel::Lorentzian => vec![peak, mean, DEFAULT_WIDTH_SEED],
            PeakModel::PseudoVoigt => vec![peak, mean, DEFAULT_WIDTH_SEED, DEFAULT_MIXING_SEED],
        }
    }

    pub fn fit(&mut self, model: PeakModel) -> Result<&HistogramFitResult> {
        self.fit_with_guess(model, None)
    }

    /// Fit `model` to the bin counts, computing the histogram first if needed.
    ///
    /// A new fit replaces any previous one. Fewer bins than model parameters
    /// is `FitDidNotConverge`.
    pub fn fit_with_guess(
        &mut self,
        model: PeakModel,
        initial_guess: Option<&[f64]>,
    ) -> Result<&HistogramFitResult> {
        let initial = match initial_guess {
            Some(guess) => guess.to_vec(),
            None => self.initial_guess(model),
        };
        let hist = self.compute_histogram();
        if hist.counts.len() < model.n_params() {
            return Err(SpectraError::FitDidNotConverge(format!(
                "{} bins cannot determine the {} parameters of a {model} peak",
                hist.counts.len(),
                model.n_params()
            )));
        }
        let fit = levenberg_marquardt(
            &model,
            &hist.centers,
            &hist.counts,
            &initial,
            &LmConfig::default(),
        )?;
        let result = HistogramFitResult::from_params(model, &fit.params, &fit.errors);
        debug!(%model, center = result.center, width = result.width, "Histogram fit");
        Ok(self.fit.insert(result))
    }

    /// The fitted model sampled at `points` evenly spaced bin-centre positions.
    pub fn fitted_curve(&self, points: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let (hist, fit) = match (&self.histogram, &self.fit) {
            (Some(h), Some(f)) => (h, f),
            _ => {
                return Err(SpectraError::InvalidInput(
                    "fit the histogram before sampling the curve".into(),
                ))
            }
        };
        let lo = hist.centers[0];
        let hi = hist.centers[hist.centers.len() - 1];
        let xs: Vec<f64> = match points {
            0 => Vec::new(),
            1 => vec![lo],
            n => (0..n)
                .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
                .collect(),
        };
        let params = fit.params();
        let ys = xs.iter().map(|&x| fit.model.value(x, &params)).collect();
        Ok((xs, ys))
    }

    pub fn default_fitted_curve(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        self.fitted_curve(FITTED_CURVE_POINTS)
    }
}

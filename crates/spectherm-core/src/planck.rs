use tracing::trace;

use crate::config::PlanckConfig;
use crate::consts::{FIRST_RADIATION_CONSTANT, NM_TO_M, SECOND_RADIATION_CONSTANT};
use crate::error::{Result, SpectraError};
use crate::fit::{levenberg_marquardt, CurveModel, LmConfig};

/// Scaled blackbody spectral radiance `A · 2hc²/λ⁵ / (exp(hc/λkT) − 1)`.
///
/// `wavelength_nm` is in nanometres; the law itself is evaluated in metres.
pub fn planck_radiance(wavelength_nm: f64, temperature: f64, scale: f64) -> f64 {
    let lambda = wavelength_nm * NM_TO_M;
    let x = SECOND_RADIATION_CONSTANT / (lambda * temperature);
    scale * FIRST_RADIATION_CONSTANT / lambda.powi(5) / x.exp_m1()
}

/// Parameters `[temperature, scale]`.
struct PlanckModel;

impl CurveModel for PlanckModel {
    fn n_params(&self) -> usize {
        2
    }

    fn value(&self, wavelength_nm: f64, params: &[f64]) -> f64 {
        planck_radiance(wavelength_nm, params[0], params[1])
    }

    fn gradient(&self, wavelength_nm: f64, params: &[f64], out: &mut [f64]) {
        let (t, a) = (params[0], params[1]);
        let lambda = wavelength_nm * NM_TO_M;
        let x = SECOND_RADIATION_CONSTANT / (lambda * t);
        let b = FIRST_RADIATION_CONSTANT / lambda.powi(5) / x.exp_m1();
        // d/dT [1/(e^x - 1)] = e^x/(e^x - 1)^2 · x/T
        out[0] = a * b * (x / t) / -(-x).exp_m1();
        out[1] = b;
    }
}

/// Result of one Planck fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitResult {
    pub temperature: f64,
    pub scale: f64,
    pub temperature_error: f64,
    pub scale_error: f64,
}

/// Least-squares fit of intensity against wavelength to the Planck law.
#[derive(Clone, Debug, Default)]
pub struct PlanckFitter {
    config: PlanckConfig,
}

impl PlanckFitter {
    pub fn new(config: PlanckConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlanckConfig {
        &self.config
    }

    /// Fit `intensities` measured at `wavelengths` (nm).
    pub fn fit(&self, wavelengths: &[f64], intensities: &[f64]) -> Result<FitResult> {
        if wavelengths.len() != intensities.len() {
            return Err(SpectraError::InvalidInput(format!(
                "{} wavelengths but {} intensities",
                wavelengths.len(),
                intensities.len()
            )));
        }
        if wavelengths.len() < 2 {
            return Err(SpectraError::InvalidInput(
                "a Planck fit needs at least 2 points".into(),
            ));
        }
        if intensities.iter().any(|v| !v.is_finite()) {
            return Err(SpectraError::FitDidNotConverge(
                "intensities contain non-finite values".into(),
            ));
        }
        if intensities.iter().all(|v| *v <= 0.0) {
            return Err(SpectraError::FitDidNotConverge(
                "no positive intensity to fit".into(),
            ));
        }

        let lm = LmConfig {
            max_iterations: self.config.max_iterations,
            ..LmConfig::default()
        };
        let initial = [self.config.initial_temperature, self.config.initial_scale];
        let fit = levenberg_marquardt(&PlanckModel, wavelengths, intensities, &initial, &lm)?;

        let result = FitResult {
            temperature: fit.params[0],
            scale: fit.params[1],
            temperature_error: fit.errors[0],
            scale_error: fit.errors[1],
        };
        if !(result.temperature.is_finite() && result.temperature > 0.0) {
            return Err(SpectraError::FitDidNotConverge(format!(
                "non-physical temperature {}",
                result.temperature
            )));
        }
        trace!(?result, iterations = fit.iterations, "Planck fit");
        Ok(result)
    }
}

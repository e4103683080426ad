use std::fmt;

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::config::TwoColorConfig;
use crate::consts::{
    DEFAULT_XTOL, MAX_STEP_HALVINGS, NM_TO_M, PAIR_RESIDUAL_WARNING, SECOND_RADIATION_CONSTANT,
};
use crate::error::{Result, SpectraError};

/// Quality flag on a pair that still produced a temperature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairWarning {
    /// Iteration cap reached before the step tolerance was met.
    IterationLimit,
    /// A Newton step had to be shortened to stay at positive temperature.
    DampedStep,
    /// Converged in temperature but the ratio equation is not satisfied.
    LargeResidual,
}

/// Why a pair produced no temperature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairFailure {
    InvalidRatio,
    InvalidWavelength,
    SingularDerivative,
    NonFiniteResidual,
    NonPhysical,
}

impl fmt::Display for PairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationLimit => write!(f, "iteration limit reached"),
            Self::DampedStep => write!(f, "step damped"),
            Self::LargeResidual => write!(f, "large residual"),
        }
    }
}

impl fmt::Display for PairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRatio => write!(f, "intensity ratio is not positive and finite"),
            Self::InvalidWavelength => write!(f, "wavelengths are not distinct positive values"),
            Self::SingularDerivative => write!(f, "derivative vanished"),
            Self::NonFiniteResidual => write!(f, "residual is not finite"),
            Self::NonPhysical => write!(f, "temperature is not positive and finite"),
        }
    }
}

/// Outcome of solving the ratio equation for one wavelength pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PairOutcome {
    Solved(f64),
    SolvedWithWarning(f64, PairWarning),
    Failed(PairFailure),
}

impl PairOutcome {
    /// The solved temperature, warned or not.
    pub fn temperature(&self) -> Option<f64> {
        match *self {
            Self::Solved(t) | Self::SolvedWithWarning(t, _) => Some(t),
            Self::Failed(_) => None,
        }
    }
}

/// One solved wavelength pair, `lambda1 < lambda2` in sample order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairRecord {
    pub lambda1: f64,
    pub lambda2: f64,
    /// `I(lambda1) / I(lambda2)`.
    pub ratio: f64,
    pub outcome: PairOutcome,
}

/// Temperatures from every unordered pair of a spectrum.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TwoColorSolution {
    /// Every numeric result, including warned pairs.
    pub temperatures: Vec<f64>,
    pub warned: Vec<(f64, f64)>,
    pub failed: Vec<(f64, f64)>,
    pub pairs: Vec<PairRecord>,
}

impl TwoColorSolution {
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

/// `R_model = λ2⁵(exp(hc/λ2kT) − 1) / (λ1⁵(exp(hc/λ1kT) − 1))`, wavelengths in nm.
pub fn ratio_model(lambda1_nm: f64, lambda2_nm: f64, temperature: f64) -> f64 {
    let (l1, l2) = (lambda1_nm * NM_TO_M, lambda2_nm * NM_TO_M);
    let x1 = SECOND_RADIATION_CONSTANT / (l1 * temperature);
    let x2 = SECOND_RADIATION_CONSTANT / (l2 * temperature);
    (l2 / l1).powi(5) * x2.exp_m1() / x1.exp_m1()
}

/// `ln(exp(x) − 1)` without overflow for large `x`.
fn ln_expm1(x: f64) -> f64 {
    if x > 30.0 {
        x + (-(-x).exp()).ln_1p()
    } else {
        x.exp_m1().ln()
    }
}

/// `d/dx ln(exp(x) − 1) = 1 / (1 − exp(−x))`.
fn d_ln_expm1(x: f64) -> f64 {
    1.0 / -(-x).exp_m1()
}

/// Newton solver for the two-color ratio equation.
///
/// The residual is taken in log space against inverse temperature,
/// `g(u) = ln R_model(1/u) − ln R`, which is close to linear in `u`.
#[derive(Clone, Debug, Default)]
pub struct TwoColorPyrometer {
    config: TwoColorConfig,
}

impl TwoColorPyrometer {
    pub fn new(config: TwoColorConfig) -> Self {
        Self { config }
    }

    /// Solve for the temperature at which `R_model(λ1, λ2, T) == ratio`.
    pub fn solve_pair(&self, lambda1_nm: f64, lambda2_nm: f64, ratio: f64) -> PairOutcome {
        let valid_wavelength = |l: f64| l.is_finite() && l > 0.0;
        if !valid_wavelength(lambda1_nm) || !valid_wavelength(lambda2_nm) || lambda1_nm == lambda2_nm
        {
            return PairOutcome::Failed(PairFailure::InvalidWavelength);
        }
        if !(ratio.is_finite() && ratio > 0.0) {
            return PairOutcome::Failed(PairFailure::InvalidRatio);
        }

        let a1 = SECOND_RADIATION_CONSTANT / (lambda1_nm * NM_TO_M);
        let a2 = SECOND_RADIATION_CONSTANT / (lambda2_nm * NM_TO_M);
        let offset = 5.0 * (lambda2_nm / lambda1_nm).ln() - ratio.ln();
        let residual = |u: f64| offset + ln_expm1(a2 * u) - ln_expm1(a1 * u);
        let derivative = |u: f64| a2 * d_ln_expm1(a2 * u) - a1 * d_ln_expm1(a1 * u);

        let mut u = 1.0 / self.config.initial_temperature;
        let mut g = residual(u);
        if !g.is_finite() {
            return PairOutcome::Failed(PairFailure::NonFiniteResidual);
        }

        let mut damped = false;
        let mut converged = false;
        for _ in 0..self.config.max_iterations {
            let dg = derivative(u);
            if !dg.is_finite() || dg == 0.0 {
                return PairOutcome::Failed(PairFailure::SingularDerivative);
            }

            let mut step = -g / dg;
            let mut next = u + step;
            let mut next_g = residual(next);
            let mut halvings = 0;
            while !(next > 0.0 && next_g.is_finite()) {
                if halvings == MAX_STEP_HALVINGS {
                    return PairOutcome::Failed(PairFailure::NonFiniteResidual);
                }
                step *= 0.5;
                next = u + step;
                next_g = residual(next);
                halvings += 1;
            }
            damped |= halvings > 0;

            u = next;
            g = next_g;
            if step.abs() <= DEFAULT_XTOL * u.abs() {
                converged = true;
                break;
            }
        }

        let temperature = 1.0 / u;
        if !(temperature.is_finite() && temperature > 0.0) {
            return PairOutcome::Failed(PairFailure::NonPhysical);
        }
        if !converged {
            PairOutcome::SolvedWithWarning(temperature, PairWarning::IterationLimit)
        } else if damped {
            PairOutcome::SolvedWithWarning(temperature, PairWarning::DampedStep)
        } else if g.abs() > PAIR_RESIDUAL_WARNING {
            PairOutcome::SolvedWithWarning(temperature, PairWarning::LargeResidual)
        } else {
            PairOutcome::Solved(temperature)
        }
    }

    /// Solve every unordered pair `i < j` once.
    pub fn solve_all_pairs(&self, wavelengths: &[f64], intensities: &[f64]) -> Result<TwoColorSolution> {
        self.solve_all_pairs_cancellable(wavelengths, intensities, &CancelToken::new())
    }

    /// As [`solve_all_pairs`](Self::solve_all_pairs), checking `cancel` between pairs.
    pub fn solve_all_pairs_cancellable(
        &self,
        wavelengths: &[f64],
        intensities: &[f64],
        cancel: &CancelToken,
    ) -> Result<TwoColorSolution> {
        if wavelengths.len() != intensities.len() {
            return Err(SpectraError::InvalidInput(format!(
                "{} wavelengths but {} intensities",
                wavelengths.len(),
                intensities.len()
            )));
        }

        let n = wavelengths.len();
        let mut solution = TwoColorSolution {
            pairs: Vec::with_capacity(n * n.saturating_sub(1) / 2),
            ..TwoColorSolution::default()
        };
        for i in 0..n {
            for j in i + 1..n {
                cancel.check()?;
                let (lambda1, lambda2) = (wavelengths[i], wavelengths[j]);
                let ratio = intensities[i] / intensities[j];
                let outcome = self.solve_pair(lambda1, lambda2, ratio);
                match outcome {
                    PairOutcome::Solved(t) => solution.temperatures.push(t),
                    PairOutcome::SolvedWithWarning(t, warning) => {
                        trace!(lambda1, lambda2, %warning, "Pair solved with warning");
                        solution.temperatures.push(t);
                        solution.warned.push((lambda1, lambda2));
                    }
                    PairOutcome::Failed(failure) => {
                        trace!(lambda1, lambda2, %failure, "Pair failed");
                        solution.failed.push((lambda1, lambda2));
                    }
                }
                solution.pairs.push(PairRecord {
                    lambda1,
                    lambda2,
                    ratio,
                    outcome,
                });
            }
        }

        debug!(
            pairs = solution.pairs.len(),
            solved = solution.temperatures.len(),
            warned = solution.warned.len(),
            failed = solution.failed.len(),
            "Two-color pairs solved"
        );
        Ok(solution)
    }
}

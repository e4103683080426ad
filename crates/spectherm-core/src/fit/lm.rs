use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::consts::{DEFAULT_FIT_MAX_ITERATIONS, DEFAULT_FTOL, DEFAULT_XTOL};
use crate::error::{Result, SpectraError};

const INITIAL_LAMBDA: f64 = 1e-3;
const LAMBDA_FACTOR: f64 = 10.0;
const MAX_DAMPING_RETRIES: usize = 10;

/// A model `y = f(x; params)` with an analytic gradient in its parameters.
pub trait CurveModel {
    fn n_params(&self) -> usize;

    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Write `∂f/∂params` at `x` into `out` (length `n_params`).
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

#[derive(Clone, Debug, PartialEq)]
pub struct LmConfig {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_FIT_MAX_ITERATIONS,
            ftol: DEFAULT_FTOL,
            xtol: DEFAULT_XTOL,
        }
    }
}

/// Parameters and 1-σ errors of a converged least-squares fit.
#[derive(Clone, Debug)]
pub struct LmFit {
    pub params: Vec<f64>,
    /// Square roots of the covariance diagonal; `+∞` when there are no
    /// residual degrees of freedom.
    pub errors: Vec<f64>,
    pub covariance: DMatrix<f64>,
    /// Sum of squared residuals at the solution.
    pub cost: f64,
    pub iterations: usize,
}

fn cost<M: CurveModel>(model: &M, x: &[f64], y: &[f64], params: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = model.value(xi, params) - yi;
            r * r
        })
        .sum()
}

/// Normal equations `JᵀJ` and `Jᵀr` at `params`. `None` if the Jacobian is not finite.
fn normal_equations<M: CurveModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    params: &[f64],
) -> Option<(DMatrix<f64>, DVector<f64>)> {
    let p = params.len();
    let mut jtj = DMatrix::<f64>::zeros(p, p);
    let mut jtr = DVector::<f64>::zeros(p);
    let mut grad = vec![0.0; p];
    for (&xi, &yi) in x.iter().zip(y) {
        model.gradient(xi, params, &mut grad);
        let r = model.value(xi, params) - yi;
        if !r.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return None;
        }
        let g = DVector::from_column_slice(&grad);
        jtr.axpy(r, &g, 1.0);
        jtj.ger(1.0, &g, &g, 1.0);
    }
    Some((jtj, jtr))
}

/// Marquardt scale: square roots of the `JᵀJ` diagonal, 1 where a column vanishes.
fn column_scale(jtj: &DMatrix<f64>) -> DVector<f64> {
    jtj.diagonal()
        .map(|d| if d > 0.0 && d.is_finite() { d.sqrt() } else { 1.0 })
}

/// `JᵀJ` divided by `scale[i] * scale[j]`, elementwise.
fn scaled(jtj: &DMatrix<f64>, scale: &DVector<f64>) -> DMatrix<f64> {
    let outer = scale * scale.transpose();
    jtj.component_div(&outer)
}

/// Solve `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr` in the scaled variables `z = D δ`.
fn damped_step(
    jtj: &DMatrix<f64>,
    jtr: &DVector<f64>,
    scale: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let mut a = scaled(jtj, scale);
    for i in 0..a.nrows() {
        let diag = a[(i, i)];
        a[(i, i)] = diag + lambda * diag.max(f64::EPSILON);
    }
    let rhs = -jtr.component_div(scale);
    let z = a.lu().solve(&rhs)?;
    z.iter()
        .all(|v| v.is_finite())
        .then(|| z.component_div(scale))
}

/// Covariance `(JᵀJ)⁻¹ · SSR / (n − p)` via the scaled normal matrix.
fn covariance(jtj: &DMatrix<f64>, ssr: f64, n: usize) -> Option<DMatrix<f64>> {
    let p = jtj.nrows();
    let scale = column_scale(jtj);
    let inv = scaled(jtj, &scale).try_inverse()?;
    let inv = scaled(&inv, &scale);
    if n > p {
        Some(inv * (ssr / (n - p) as f64))
    } else {
        Some(DMatrix::from_element(p, p, f64::INFINITY))
    }
}

/// Levenberg-Marquardt least squares for `model` against `(x, y)`.
///
/// Terminates when the relative cost reduction falls under `ftol`, the
/// relative scaled step under `xtol`, or no damping level reduces the cost.
/// Hitting `max_iterations` without converging is `FitDidNotConverge`.
pub fn levenberg_marquardt<M: CurveModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    config: &LmConfig,
) -> Result<LmFit> {
    let p = model.n_params();
    if initial.len() != p {
        return Err(SpectraError::InvalidInput(format!(
            "{} initial parameters for a {p}-parameter model",
            initial.len()
        )));
    }
    if x.len() != y.len() {
        return Err(SpectraError::InvalidInput(format!(
            "{} x values but {} y values",
            x.len(),
            y.len()
        )));
    }
    if x.len() < p {
        return Err(SpectraError::InvalidInput(format!(
            "{} points cannot determine {p} parameters",
            x.len()
        )));
    }

    let mut params = initial.to_vec();
    let mut current = cost(model, x, y, &params);
    if !current.is_finite() {
        return Err(SpectraError::FitDidNotConverge(
            "residuals are not finite at the initial guess".into(),
        ));
    }

    let mut lambda = INITIAL_LAMBDA;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;
        let (jtj, jtr) = normal_equations(model, x, y, &params).ok_or_else(|| {
            SpectraError::FitDidNotConverge("Jacobian is not finite".into())
        })?;
        if current == 0.0 || jtr.iter().all(|g| *g == 0.0) {
            converged = true;
            break;
        }
        let scale = column_scale(&jtj);

        let mut accepted = None;
        for _ in 0..MAX_DAMPING_RETRIES {
            if let Some(step) = damped_step(&jtj, &jtr, &scale, lambda) {
                let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
                let trial_cost = cost(model, x, y, &trial);
                if trial_cost.is_finite() && trial_cost < current {
                    accepted = Some((trial, trial_cost, step));
                    lambda = (lambda / LAMBDA_FACTOR).max(1e-12);
                    break;
                }
            }
            lambda *= LAMBDA_FACTOR;
        }

        let Some((trial, trial_cost, step)) = accepted else {
            // No damping level improves the fit: a local minimum.
            converged = true;
            break;
        };

        let reduction = (current - trial_cost) / current;
        let step_norm = step.component_mul(&scale).norm();
        let param_norm = params
            .iter()
            .zip(scale.iter())
            .map(|(a, s)| (a * s).powi(2))
            .sum::<f64>()
            .sqrt();

        params = trial;
        current = trial_cost;

        if reduction <= config.ftol || step_norm <= config.xtol * param_norm {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(SpectraError::FitDidNotConverge(format!(
            "no convergence after {} iterations",
            config.max_iterations
        )));
    }

    let (jtj, _) = normal_equations(model, x, y, &params)
        .ok_or_else(|| SpectraError::FitDidNotConverge("Jacobian is not finite".into()))?;
    let covariance = covariance(&jtj, current, x.len()).ok_or_else(|| {
        SpectraError::FitDidNotConverge("covariance matrix is singular".into())
    })?;
    let errors = covariance.diagonal().iter().map(|v| v.abs().sqrt()).collect();

    debug!(iterations, cost = current, ?params, "Least-squares fit converged");
    Ok(LmFit {
        params,
        errors,
        covariance,
        cost: current,
        iterations,
    })
}

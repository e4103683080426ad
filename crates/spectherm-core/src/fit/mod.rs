//! Nonlinear least squares shared by the Planck and histogram fitters.

mod lm;

pub use lm::{levenberg_marquardt, CurveModel, LmConfig, LmFit};

/// Planck constant (J s), CODATA 2018 exact.
pub const PLANCK_CONSTANT: f64 = 6.626_070_15e-34;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Boltzmann constant (J/K), CODATA 2018 exact.
pub const BOLTZMANN_CONSTANT: f64 = 1.380_649e-23;

/// First radiation constant for spectral radiance, 2hc² (W m² / sr).
pub const FIRST_RADIATION_CONSTANT: f64 = 2.0 * PLANCK_CONSTANT * SPEED_OF_LIGHT * SPEED_OF_LIGHT;

/// Second radiation constant, hc/k (m K).
pub const SECOND_RADIATION_CONSTANT: f64 = PLANCK_CONSTANT * SPEED_OF_LIGHT / BOLTZMANN_CONSTANT;

/// Nanometres to metres.
pub const NM_TO_M: f64 = 1e-9;

/// Initial temperature guess (K) for both the Planck fit and the two-color solver.
pub const DEFAULT_INITIAL_TEMPERATURE: f64 = 3000.0;

/// Initial scale factor guess for the Planck fit.
pub const DEFAULT_INITIAL_SCALE: f64 = 1e-10;

/// Iteration cap for the Levenberg-Marquardt optimizer.
pub const DEFAULT_FIT_MAX_ITERATIONS: usize = 200;

/// Iteration cap for the two-color Newton solver.
pub const DEFAULT_ROOT_MAX_ITERATIONS: usize = 100;

/// Relative tolerance on parameter steps (MINPACK default, sqrt of f64 epsilon).
pub const DEFAULT_XTOL: f64 = 1.490_116_119_384_765_6e-8;

/// Relative tolerance on sum-of-squares reduction (MINPACK default).
pub const DEFAULT_FTOL: f64 = 1.490_116_119_384_765_6e-8;

/// Log-space residual above which a converged two-color root is flagged.
pub const PAIR_RESIDUAL_WARNING: f64 = 1e-6;

/// Maximum number of step halvings in one Newton iteration.
pub const MAX_STEP_HALVINGS: usize = 30;

/// Default number of histogram bins for pair-temperature distributions.
pub const DEFAULT_HISTOGRAM_BINS: usize = 200;

/// Fixed width seed (K) for Lorentzian and pseudo-Voigt fits.
pub const DEFAULT_WIDTH_SEED: f64 = 100.0;

/// Mixing-ratio seed for pseudo-Voigt fits.
pub const DEFAULT_MIXING_SEED: f64 = 0.5;

/// Number of samples used to render a fitted histogram curve.
pub const FITTED_CURVE_POINTS: usize = 1000;

/// Default per-handle frame cache size.
pub const DEFAULT_FRAME_CACHE_CAPACITY: usize = 64;

/// Lower bound of the physically plausible temperature window (K).
pub const DEFAULT_MIN_PLAUSIBLE_TEMPERATURE: f64 = 500.0;

/// Upper bound of the physically plausible temperature window (K).
pub const DEFAULT_MAX_PLAUSIBLE_TEMPERATURE: f64 = 10_000.0;

/// Default lower wavelength bound (nm) of the fit window.
pub const DEFAULT_WINDOW_LOWER_NM: f64 = 600.0;

/// Default upper wavelength bound (nm) of the fit window.
pub const DEFAULT_WINDOW_UPPER_NM: f64 = 800.0;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_FIT_MAX_ITERATIONS, DEFAULT_FRAME_CACHE_CAPACITY, DEFAULT_HISTOGRAM_BINS,
    DEFAULT_INITIAL_SCALE, DEFAULT_INITIAL_TEMPERATURE, DEFAULT_ROOT_MAX_ITERATIONS,
};
use crate::histogram::{PeakModel, TemperatureWindow};
use crate::sweep::WavelengthWindow;

/// Settings passed explicitly into the core's entry points.
///
/// Every section falls back to its defaults, so a partial TOML file is valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub planck: PlanckConfig,
    #[serde(default)]
    pub two_color: TwoColorConfig,
    #[serde(default)]
    pub histogram: HistogramConfig,
    #[serde(default)]
    pub window: WavelengthWindow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Decoded frames kept per open file. 0 disables caching.
    pub frame_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CACHE_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanckConfig {
    pub initial_temperature: f64,
    pub initial_scale: f64,
    pub max_iterations: usize,
}

impl Default for PlanckConfig {
    fn default() -> Self {
        Self {
            initial_temperature: DEFAULT_INITIAL_TEMPERATURE,
            initial_scale: DEFAULT_INITIAL_SCALE,
            max_iterations: DEFAULT_FIT_MAX_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoColorConfig {
    /// Root-finder seed (K).
    pub initial_temperature: f64,
    pub max_iterations: usize,
}

impl Default for TwoColorConfig {
    fn default() -> Self {
        Self {
            initial_temperature: DEFAULT_INITIAL_TEMPERATURE,
            max_iterations: DEFAULT_ROOT_MAX_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub bins: usize,
    pub model: PeakModel,
    /// Pair temperatures outside this window are dropped before histogramming.
    pub plausible: TemperatureWindow,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bins: DEFAULT_HISTOGRAM_BINS,
            model: PeakModel::Lorentzian,
            plausible: TemperatureWindow::default(),
        }
    }
}

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use ndarray::{Array1, ArrayView1};

use crate::error::{Result, SpectraError};

/// Reference lamp spectrum: irregularly sampled (wavelength, intensity) pairs,
/// kept sorted by wavelength.
#[derive(Clone, Debug, PartialEq)]
pub struct LampSpectrum {
    wavelengths: Vec<f64>,
    intensities: Vec<f64>,
}

impl LampSpectrum {
    pub fn new(mut samples: Vec<(f64, f64)>) -> Result<Self> {
        if samples.is_empty() {
            return Err(SpectraError::InvalidInput("lamp spectrum is empty".into()));
        }
        if samples.iter().any(|(w, i)| !w.is_finite() || !i.is_finite()) {
            return Err(SpectraError::InvalidInput(
                "lamp spectrum contains non-finite samples".into(),
            ));
        }
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (wavelengths, intensities) = samples.into_iter().unzip();
        Ok(Self {
            wavelengths,
            intensities,
        })
    }

    /// Read a headerless two-column `wavelength,intensity` file.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let rdr = ReaderBuilder::new()
            .has_headers(false)
            .trim(Trim::All)
            .from_path(path)?;
        Self::from_csv_reader(rdr)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let rdr = ReaderBuilder::new()
            .has_headers(false)
            .trim(Trim::All)
            .from_reader(reader);
        Self::from_csv_reader(rdr)
    }

    fn from_csv_reader<R: Read>(mut rdr: csv::Reader<R>) -> Result<Self> {
        let mut samples = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() < 2 {
                return Err(SpectraError::InvalidInput(format!(
                    "lamp row {} has {} columns, expected 2",
                    line + 1,
                    record.len()
                )));
            }
            let parse = |s: &str| {
                s.parse::<f64>().map_err(|_| {
                    SpectraError::InvalidInput(format!("lamp row {}: {s:?} is not a number", line + 1))
                })
            };
            samples.push((parse(&record[0])?, parse(&record[1])?));
        }
        Self::new(samples)
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Piecewise-linear interpolation onto `grid`, clamped to the end values.
    pub fn interpolate(&self, grid: ArrayView1<f64>) -> Array1<f64> {
        grid.mapv(|x| interp(x, &self.wavelengths, &self.intensities))
    }
}

/// Linear interpolation over sorted `xp`; outside the range the nearest end value.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // First index with xp[i] > x; 1 <= hi <= n-1 here.
    let hi = xp.partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return fp[hi];
    }
    let t = (x - xp[lo]) / span;
    fp[lo] + t * (fp[hi] - fp[lo])
}

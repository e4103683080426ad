mod rotate;

pub use rotate::{rotate_frame, rotate_image, rotate_into, RotateMode};

use rotate::check_angle;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::config::CoreConfig;
use crate::error::{Result, SpectraError};
use crate::frame::{SampleType, SpectralShape};
use crate::io::cache::FrameCache;
use crate::io::dataset::{
    has_dataset_extension, DatasetStore, TabularArray, CALIBRATED_SPECTRA, WAVELENGTH_ARR,
};
use crate::io::spe::{has_spe_extension, SpeFile};
use crate::io::spe_xml::SpeMetadata;

/// Calibrated cube stored in an HDF5 container.
pub struct TabularSpectra {
    store: DatasetStore,
    spectra: TabularArray,
    wavelengths: Array1<f64>,
    cache: RefCell<FrameCache>,
}

impl TabularSpectra {
    pub fn open(store: DatasetStore, cache_capacity: usize) -> Result<Self> {
        let spectra = store.open_array(CALIBRATED_SPECTRA)?;
        if spectra.shape().len() != 3 {
            return Err(SpectraError::InvalidDataset(format!(
                "{CALIBRATED_SPECTRA} must be 3-D, found shape {:?}",
                spectra.shape()
            )));
        }
        let wavelengths = store.read_array1(WAVELENGTH_ARR)?;
        if wavelengths.len() != spectra.shape()[2] {
            return Err(SpectraError::ShapeMismatch(format!(
                "{} wavelengths for {} wavelength pixels",
                wavelengths.len(),
                spectra.shape()[2]
            )));
        }
        Ok(Self {
            store,
            spectra,
            wavelengths,
            cache: RefCell::new(FrameCache::new(cache_capacity)),
        })
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn shape(&self) -> SpectralShape {
        let s = self.spectra.shape();
        SpectralShape::new(s[0], s[1], s[2])
    }

    pub fn read_frame(&self, index: usize) -> Result<Arc<Array2<f64>>> {
        if let Some(frame) = self.cache.borrow_mut().get(index) {
            return Ok(frame);
        }
        let frame = Arc::new(self.spectra.read_frame(index)?);
        self.cache.borrow_mut().insert(index, Arc::clone(&frame));
        Ok(frame)
    }
}

/// The concrete container behind a [`SpectrumData`], resolved once at open.
pub enum SpectrumSource {
    Binary(SpeFile),
    Tabular(TabularSpectra),
}

/// Format-agnostic view over a spectral cube `(frame, position, wavelength)`.
pub struct SpectrumData {
    path: PathBuf,
    source: SpectrumSource,
    shape: SpectralShape,
}

impl SpectrumData {
    /// Open `path`, dispatching on its container type.
    ///
    /// `.spe` files are binary-backed; `.hdf`/`.h5` containers holding a
    /// calibrated cube are tabular-backed. Anything else is `UnsupportedFormat`.
    pub fn open(path: &Path, config: &CoreConfig) -> Result<Self> {
        let capacity = config.cache.frame_capacity;
        let source = if has_spe_extension(path) {
            SpectrumSource::Binary(SpeFile::open_with_cache(path, capacity)?)
        } else if has_dataset_extension(path) {
            SpectrumSource::Tabular(TabularSpectra::open(DatasetStore::open(path)?, capacity)?)
        } else {
            return Err(SpectraError::UnsupportedFormat(format!(
                "{} is neither an .spe file nor an .hdf container",
                path.display()
            )));
        };
        Ok(Self::from_source(path, source))
    }

    pub fn from_source(path: &Path, source: SpectrumSource) -> Self {
        let shape = match &source {
            SpectrumSource::Binary(spe) => spe.shape(),
            SpectrumSource::Tabular(tab) => tab.shape(),
        };
        debug!(path = %path.display(), ?shape, "Opened spectrum data");
        Self {
            path: path.to_path_buf(),
            source,
            shape,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used to derive output names.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn source(&self) -> &SpectrumSource {
        &self.source
    }

    pub fn shape(&self) -> SpectralShape {
        self.shape
    }

    pub fn center_pixel(&self) -> usize {
        self.shape.center_pixel()
    }

    /// Native sample type of the stored frames.
    pub fn sample_type(&self) -> SampleType {
        match &self.source {
            SpectrumSource::Binary(spe) => spe.header.sample_type,
            SpectrumSource::Tabular(tab) => tab.spectra.dtype(),
        }
    }

    /// Wavelength of every pixel along the wavelength axis (nm).
    pub fn wavelengths(&self) -> Result<Array1<f64>> {
        match &self.source {
            SpectrumSource::Binary(spe) => spe.wavelengths(),
            SpectrumSource::Tabular(tab) => Ok(tab.wavelengths.clone()),
        }
    }

    /// One frame as a `(position, wavelength)` array.
    pub fn frame(&self, index: usize) -> Result<Arc<Array2<f64>>> {
        match &self.source {
            SpectrumSource::Binary(spe) => spe.read_frame(index),
            SpectrumSource::Tabular(tab) => tab.read_frame(index),
        }
    }

    /// Intensity along the wavelength axis at one (frame, position).
    pub fn spectrum(&self, frame: usize, position: usize) -> Result<Array1<f64>> {
        if position >= self.shape.position_pixel_num {
            return Err(SpectraError::PositionIndexOutOfRange {
                index: position,
                total: self.shape.position_pixel_num,
            });
        }
        Ok(self.frame(frame)?.row(position).to_owned())
    }

    /// Acquisition metadata. Only binary files carry any.
    pub fn metadata(&self) -> Result<SpeMetadata> {
        match &self.source {
            SpectrumSource::Binary(spe) => spe.metadata(),
            SpectrumSource::Tabular(_) => Err(SpectraError::MetadataUnavailable(
                "dataset containers carry no acquisition metadata".into(),
            )),
        }
    }

    fn for_each_frame(
        &self,
        mut visit: impl FnMut(usize, ArrayView2<f64>),
        mut progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<()> {
        let total = self.shape.frame_num;
        for i in 0..total {
            cancel.check()?;
            let frame = self.frame(i)?;
            visit(i, frame.view());
            progress(i + 1, total);
        }
        Ok(())
    }

    /// Maximum over (position, wavelength) of every frame.
    pub fn max_intensity_per_frame(
        &self,
        progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<Array1<f64>> {
        let mut out = Array1::from_elem(self.shape.frame_num, f64::NAN);
        self.for_each_frame(|i, frame| out[i] = max_of(frame.iter()), progress, cancel)?;
        Ok(out)
    }

    /// Per-frame maxima over the upper and lower detector halves.
    ///
    /// The upper half covers rows `[0, center_pixel - 1)` and the lower half
    /// `[center_pixel, position_pixel_num - 1)`: the row just above the centre
    /// and the last row are left out of both.
    pub fn max_intensity_per_frame_split(
        &self,
        progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let center = self.center_pixel();
        let rows = self.shape.position_pixel_num;
        let upper = 0..center.saturating_sub(1);
        let lower = center..rows.saturating_sub(1);
        if upper.is_empty() || lower.is_empty() {
            return Err(SpectraError::InvalidInput(format!(
                "{rows} position pixels are too few to split into halves"
            )));
        }

        let mut up = Array1::from_elem(self.shape.frame_num, f64::NAN);
        let mut down = Array1::from_elem(self.shape.frame_num, f64::NAN);
        self.for_each_frame(
            |i, frame| {
                up[i] = max_of(frame.slice(s![upper.clone(), ..]).iter());
                down[i] = max_of(frame.slice(s![lower.clone(), ..]).iter());
            },
            progress,
            cancel,
        )?;
        Ok((up, down))
    }

    /// Maximum over wavelength at every (frame, position).
    ///
    /// One sequential read per frame; `progress` is called after each frame.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn max_intensity_2d(
        &self,
        progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<Array2<f64>> {
        info!(frames = self.shape.frame_num, "Computing 2-D max intensity");
        let mut out = Array2::from_elem(self.shape.grid_dim(), f64::NAN);
        self.for_each_frame(
            |i, frame| {
                for (p, row) in frame.axis_iter(Axis(0)).enumerate() {
                    out[[i, p]] = max_of(row.iter());
                }
            },
            progress,
            cancel,
        )?;
        Ok(out)
    }

    /// One frame rotated by `degrees` counter-clockwise.
    pub fn rotated_frame(&self, index: usize, degrees: f64, mode: RotateMode) -> Result<Array2<f64>> {
        check_angle(degrees)?;
        let frame = self.frame(index)?;
        Ok(rotate_frame(frame.view(), degrees, mode, self.center_pixel()))
    }
}

/// NaN-ignoring maximum; NaN when nothing is finite.
fn max_of<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.fold(f64::NAN, |acc, &v| acc.max(v))
}

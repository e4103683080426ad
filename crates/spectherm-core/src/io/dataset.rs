use std::path::{Path, PathBuf};

use hdf5::types::{FloatSize, H5Type, IntSize, TypeDescriptor};
use hdf5::{Dataset, File, Group};
use ndarray::{s, Array1, Array2, ArrayD, ArrayView, ArrayView2, Dimension};
use tracing::debug;

use crate::error::{Result, SpectraError};
use crate::frame::{saturate, SampleType};

/// Extension used for containers this crate writes.
pub const DATASET_EXTENSION: &str = "hdf";

const DATASET_EXTENSIONS: [&str; 3] = ["hdf", "h5", "hdf5"];

pub const CALIBRATED_SPECTRA: &str = "entry/calibrated_spectra";
pub const WAVELENGTH_ARR: &str = "entry/wavelength_arr";
pub const VALUE_T: &str = "entry/value/T";
pub const VALUE_SCALE: &str = "entry/value/scale";
pub const VALUE_WIDTH: &str = "entry/value/width";
pub const ERROR_T: &str = "entry/error/T";
pub const ERROR_SCALE: &str = "entry/error/scale";
pub const ERROR_WIDTH: &str = "entry/error/width";
pub const MAX_INTENSITY_2D: &str = "entry/spe/2d_max_intensity";
pub const MASK_STATUS: &str = "entry/mask/status";

/// Whether `path` carries an HDF5 container extension.
pub fn has_dataset_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DATASET_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Named-dataset container backed by an HDF5 file.
///
/// Dataset names are slash-separated paths (`entry/value/T`); intermediate
/// groups are created on write.
#[derive(Clone, Debug)]
pub struct DatasetStore {
    file: File,
    path: PathBuf,
}

impl DatasetStore {
    /// Open the container at `path` for writing, creating it when absent.
    pub fn create(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Err(SpectraError::InvalidDataset(format!(
                "{} is a directory",
                path.display()
            )));
        }
        let file = File::append(path).map_err(|e| {
            SpectraError::InvalidDataset(format!("{}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Opened dataset store for writing");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing container read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SpectraError::UnsupportedFormat(format!(
                "{} is not a dataset file",
                path.display()
            )));
        }
        let file = File::open(path).map_err(|e| {
            SpectraError::InvalidDataset(format!("{}: {e}", path.display()))
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk to the group holding `name`, returning it with the leaf name.
    fn parent_group<'n>(&self, name: &'n str, create: bool) -> Result<(Group, &'n str)> {
        let parts: Vec<&str> = name.split('/').collect();
        let valid = parts.iter().all(|p| !p.is_empty() && *p != "." && *p != "..");
        if !valid {
            return Err(SpectraError::InvalidInput(format!(
                "invalid dataset name {name:?}"
            )));
        }
        let (leaf, parents) = match parts.split_last() {
            Some((leaf, parents)) => (*leaf, parents),
            None => {
                return Err(SpectraError::InvalidInput("empty dataset name".to_string()));
            }
        };

        let mut group = self.file.group("/")?;
        for part in parents {
            group = if group.link_exists(part) {
                group.group(part)?
            } else if create {
                group.create_group(part)?
            } else {
                return Err(SpectraError::InvalidDataset(format!(
                    "dataset {name} not found in {}",
                    self.path.display()
                )));
            };
        }
        Ok((group, leaf))
    }

    fn dataset(&self, name: &str) -> Result<Dataset> {
        let (group, leaf) = self.parent_group(name, false)?;
        if !group.link_exists(leaf) {
            return Err(SpectraError::InvalidDataset(format!(
                "dataset {name} not found in {}",
                self.path.display()
            )));
        }
        Ok(group.dataset(leaf)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parent_group(name, false)
            .map(|(group, leaf)| group.link_exists(leaf))
            .unwrap_or(false)
    }

    /// Create (or replace) a zero-filled dataset of the given shape and dtype.
    pub fn create_dataset(&self, name: &str, shape: &[usize], dtype: SampleType) -> Result<()> {
        self.new_dataset(name, shape, dtype)?;
        debug!(dataset = name, ?shape, ?dtype, "Created dataset");
        Ok(())
    }

    fn new_dataset(&self, name: &str, shape: &[usize], dtype: SampleType) -> Result<Dataset> {
        let (group, leaf) = self.parent_group(name, true)?;
        if group.link_exists(leaf) {
            group.unlink(leaf)?;
        }
        let shape = shape.to_vec();
        let dataset = match dtype {
            SampleType::F32 => group.new_dataset::<f32>().shape(shape).create(leaf)?,
            SampleType::I32 => group.new_dataset::<i32>().shape(shape).create(leaf)?,
            SampleType::I16 => group.new_dataset::<i16>().shape(shape).create(leaf)?,
            SampleType::U16 => group.new_dataset::<u16>().shape(shape).create(leaf)?,
            SampleType::F64 => group.new_dataset::<f64>().shape(shape).create(leaf)?,
            SampleType::U8 => group.new_dataset::<u8>().shape(shape).create(leaf)?,
            SampleType::U32 => group.new_dataset::<u32>().shape(shape).create(leaf)?,
        };
        Ok(dataset)
    }

    /// Overwrite slice `index` along the leading axis of a 3-D dataset.
    pub fn write_frame(&self, name: &str, index: usize, frame: ArrayView2<f64>) -> Result<()> {
        let array = TabularArray::new(self.dataset(name)?)?;
        let shape = array.shape();
        if shape.len() != 3 {
            return Err(SpectraError::ShapeMismatch(format!(
                "{name} has {} axes, frame writes need 3",
                shape.len()
            )));
        }
        if index >= shape[0] {
            return Err(SpectraError::FrameIndexOutOfRange {
                index,
                total: shape[0],
            });
        }
        if frame.dim() != (shape[1], shape[2]) {
            return Err(SpectraError::ShapeMismatch(format!(
                "frame is {:?}, {name} expects ({}, {})",
                frame.dim(),
                shape[1],
                shape[2]
            )));
        }

        let ds = &array.dataset;
        match array.dtype {
            SampleType::F64 => write_slice(ds, index, frame)?,
            SampleType::F32 => write_slice(ds, index, frame.mapv(|v| v as f32).view())?,
            SampleType::I32 => write_slice(ds, index, frame.mapv(saturate::<i32>).view())?,
            SampleType::I16 => write_slice(ds, index, frame.mapv(saturate::<i16>).view())?,
            SampleType::U16 => write_slice(ds, index, frame.mapv(saturate::<u16>).view())?,
            SampleType::U8 => write_slice(ds, index, frame.mapv(saturate::<u8>).view())?,
            SampleType::U32 => write_slice(ds, index, frame.mapv(saturate::<u32>).view())?,
        }
        Ok(())
    }

    /// Write a whole array, replacing any existing dataset of that name.
    pub fn write_array<D: Dimension>(
        &self,
        name: &str,
        data: ArrayView<f64, D>,
        dtype: SampleType,
    ) -> Result<()> {
        let ds = self.new_dataset(name, data.shape(), dtype)?;
        match dtype {
            SampleType::F64 => ds.write(&data)?,
            SampleType::F32 => ds.write(&data.mapv(|v| v as f32))?,
            SampleType::I32 => ds.write(&data.mapv(saturate::<i32>))?,
            SampleType::I16 => ds.write(&data.mapv(saturate::<i16>))?,
            SampleType::U16 => ds.write(&data.mapv(saturate::<u16>))?,
            SampleType::U8 => ds.write(&data.mapv(saturate::<u8>))?,
            SampleType::U32 => ds.write(&data.mapv(saturate::<u32>))?,
        }
        debug!(dataset = name, shape = ?data.shape(), "Wrote dataset");
        Ok(())
    }

    pub fn write_array1(&self, name: &str, data: &Array1<f64>) -> Result<()> {
        self.write_array(name, data.view(), SampleType::F64)
    }

    pub fn write_array2(&self, name: &str, data: &Array2<f64>) -> Result<()> {
        self.write_array(name, data.view(), SampleType::F64)
    }

    /// Handle on an existing dataset for sliced reads.
    pub fn open_array(&self, name: &str) -> Result<TabularArray> {
        TabularArray::new(self.dataset(name)?)
    }

    pub fn read_array(&self, name: &str) -> Result<ArrayD<f64>> {
        self.open_array(name)?.to_array()
    }

    pub fn read_array1(&self, name: &str) -> Result<Array1<f64>> {
        self.read_array(name)?
            .into_dimensionality()
            .map_err(|_| SpectraError::ShapeMismatch(format!("{name} is not 1-D")))
    }

    pub fn read_array2(&self, name: &str) -> Result<Array2<f64>> {
        self.read_array(name)?
            .into_dimensionality()
            .map_err(|_| SpectraError::ShapeMismatch(format!("{name} is not 2-D")))
    }
}

fn write_slice<T: H5Type>(dataset: &Dataset, index: usize, frame: ArrayView2<T>) -> Result<()> {
    dataset.write_slice(frame, s![index, .., ..])?;
    Ok(())
}

fn sample_type_of(dataset: &Dataset) -> Result<SampleType> {
    let descriptor = dataset.dtype()?.to_descriptor()?;
    match descriptor {
        TypeDescriptor::Float(FloatSize::U4) => Ok(SampleType::F32),
        TypeDescriptor::Float(FloatSize::U8) => Ok(SampleType::F64),
        TypeDescriptor::Integer(IntSize::U2) => Ok(SampleType::I16),
        TypeDescriptor::Integer(IntSize::U4) => Ok(SampleType::I32),
        TypeDescriptor::Unsigned(IntSize::U1) => Ok(SampleType::U8),
        TypeDescriptor::Unsigned(IntSize::U2) => Ok(SampleType::U16),
        TypeDescriptor::Unsigned(IntSize::U4) => Ok(SampleType::U32),
        other => Err(SpectraError::InvalidDataset(format!(
            "{} has unsupported element type {other:?}",
            dataset.name()
        ))),
    }
}

/// An open dataset with its shape and element type resolved.
#[derive(Clone, Debug)]
pub struct TabularArray {
    dataset: Dataset,
    shape: Vec<usize>,
    dtype: SampleType,
}

impl TabularArray {
    fn new(dataset: Dataset) -> Result<Self> {
        let dtype = sample_type_of(&dataset)?;
        Ok(Self {
            shape: dataset.shape(),
            dataset,
            dtype,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> SampleType {
        self.dtype
    }

    /// Read slice `index` of a 3-D dataset as a 2-D array.
    pub fn read_frame(&self, index: usize) -> Result<Array2<f64>> {
        if self.shape.len() != 3 {
            return Err(SpectraError::ShapeMismatch(format!(
                "dataset has {} axes, frame reads need 3",
                self.shape.len()
            )));
        }
        if index >= self.shape[0] {
            return Err(SpectraError::FrameIndexOutOfRange {
                index,
                total: self.shape[0],
            });
        }
        Ok(self.dataset.read_slice_2d::<f64, _>(s![index, .., ..])?)
    }

    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        Ok(self.dataset.read_dyn::<f64>()?)
    }
}

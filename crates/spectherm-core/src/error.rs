use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpectraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid SPE file: {0}")]
    InvalidSpe(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Position index {index} out of range (total: {total})")]
    PositionIndexOutOfRange { index: usize, total: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Fit did not converge: {0}")]
    FitDidNotConverge(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Container opened read-only")]
    ReadOnly,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

pub type Result<T> = std::result::Result<T, SpectraError>;

pub mod cache;
pub mod dataset;
pub mod lamp;
pub mod spe;
pub mod spe_writer;
pub mod spe_xml;

pub use cache::FrameCache;
pub use dataset::{DatasetStore, TabularArray};
pub use lamp::LampSpectrum;
pub use spe::{SpeFile, SpeHeader};
pub use spe_writer::SpeWriter;
pub use spe_xml::{RoiRegion, SpeMetadata};

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapMut};
use ndarray::{Array1, Array2, ArrayView2};
use tracing::{debug, warn};

use crate::consts::DEFAULT_FRAME_CACHE_CAPACITY;
use crate::error::{Result, SpectraError};
use crate::frame::{decode_frame, encode_frame, SampleType, SpectralShape};
use crate::io::cache::FrameCache;
use crate::io::spe_xml::{parse_footer, SpeMetadata};

pub const SPE_HEADER_SIZE: usize = 4100;
pub const SPE_MAGIC: i32 = 0x0123_4567;

pub(crate) const OFFSET_XDIM: usize = 42;
pub(crate) const OFFSET_DATATYPE: usize = 108;
pub(crate) const OFFSET_YDIM: usize = 656;
pub(crate) const OFFSET_XML_FOOTER: usize = 678;
pub(crate) const OFFSET_NUM_FRAMES: usize = 1446;
pub(crate) const OFFSET_HEADER_VERSION: usize = 1992;
pub(crate) const OFFSET_MAGIC: usize = 2996;
pub(crate) const OFFSET_POLYNOM_ORDER: usize = 3101;
pub(crate) const OFFSET_POLYNOM_COEFFS: usize = 3263;
pub(crate) const POLYNOM_COEFF_COUNT: usize = 6;

/// Fields of the 4100-byte SPE header this crate understands.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeHeader {
    /// Pixels along the wavelength axis (`xdim`).
    pub width: u16,
    /// Pixels along the position axis (`ydim`).
    pub height: u16,
    pub frame_count: u32,
    pub sample_type: SampleType,
    pub header_version: f32,
    /// Byte offset of the XML footer, 0 when absent.
    pub xml_offset: u64,
    pub polynom_order: u8,
    pub polynom_coeffs: [f64; POLYNOM_COEFF_COUNT],
}

impl SpeHeader {
    pub fn new(width: u16, height: u16, frame_count: u32, sample_type: SampleType) -> Self {
        Self {
            width,
            height,
            frame_count,
            sample_type,
            header_version: 3.0,
            xml_offset: 0,
            polynom_order: 0,
            polynom_coeffs: [0.0; POLYNOM_COEFF_COUNT],
        }
    }

    /// Total bytes per frame.
    pub fn frame_byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.sample_type.bytes_per_sample()
    }

    /// Byte offset of the first sample of `index`.
    pub fn frame_offset(&self, index: usize) -> usize {
        SPE_HEADER_SIZE + index * self.frame_byte_size()
    }

    /// End of the frame data block.
    pub fn data_end(&self) -> usize {
        self.frame_offset(self.frame_count as usize)
    }

    pub fn shape(&self) -> SpectralShape {
        SpectralShape::new(
            self.frame_count as usize,
            self.height as usize,
            self.width as usize,
        )
    }

    /// Wavelengths from the legacy calibration polynomial, if one is recorded.
    pub fn polynomial_wavelengths(&self) -> Option<Array1<f64>> {
        if self.polynom_coeffs.iter().all(|c| *c == 0.0) {
            return None;
        }
        let order = (self.polynom_order as usize).min(POLYNOM_COEFF_COUNT - 1);
        let coeffs = &self.polynom_coeffs[..=order];
        Some(Array1::from_shape_fn(self.width as usize, |pixel| {
            // Horner evaluation, highest order first.
            coeffs
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * pixel as f64 + c)
        }))
    }
}

enum Storage {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::ReadOnly(m) => &m[..],
            Self::ReadWrite(m) => &m[..],
        }
    }
}

/// Memory-mapped SPE file with random access to frames.
///
/// Decoded frames are memoized in a bounded LRU cache owned by the handle.
/// Writing a frame evicts it from the cache so later reads see the new bytes.
pub struct SpeFile {
    path: PathBuf,
    storage: Storage,
    pub header: SpeHeader,
    cache: RefCell<FrameCache>,
}

impl SpeFile {
    /// Open an SPE file read-only with the default cache size.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_impl(path, false, DEFAULT_FRAME_CACHE_CAPACITY)
    }

    pub fn open_with_cache(path: &Path, cache_capacity: usize) -> Result<Self> {
        Self::open_impl(path, false, cache_capacity)
    }

    /// Open an SPE file for in-place frame overwrites.
    pub fn open_rw(path: &Path, cache_capacity: usize) -> Result<Self> {
        Self::open_impl(path, true, cache_capacity)
    }

    fn open_impl(path: &Path, writable: bool, cache_capacity: usize) -> Result<Self> {
        if !has_spe_extension(path) {
            return Err(SpectraError::UnsupportedFormat(format!(
                "{} is not an .spe file",
                path.display()
            )));
        }

        let len = std::fs::metadata(path)?.len() as usize;
        if len < SPE_HEADER_SIZE {
            return Err(SpectraError::InvalidSpe(
                "File too small for SPE header".into(),
            ));
        }

        let storage = if writable {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            Storage::ReadWrite(unsafe { MmapMut::map_mut(&file)? })
        } else {
            let file = File::open(path)?;
            Storage::ReadOnly(unsafe { Mmap::map(&file)? })
        };

        let header = parse_header(&storage.bytes()[..SPE_HEADER_SIZE])?;

        let expected = header.data_end();
        if storage.bytes().len() < expected {
            return Err(SpectraError::InvalidSpe(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected,
                storage.bytes().len()
            )));
        }

        debug!(
            path = %path.display(),
            frames = header.frame_count,
            width = header.width,
            height = header.height,
            dtype = ?header.sample_type,
            "Opened SPE file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            storage,
            header,
            cache: RefCell::new(FrameCache::new(cache_capacity)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    pub fn shape(&self) -> SpectralShape {
        self.header.shape()
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.storage, Storage::ReadWrite(_))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.frame_count();
        if index >= count {
            return Err(SpectraError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        Ok(())
    }

    /// Raw bytes of one frame (zero-copy from the map).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;
        let offset = self.header.frame_offset(index);
        let end = offset + self.header.frame_byte_size();
        Ok(&self.storage.bytes()[offset..end])
    }

    /// Read one frame as a (position, wavelength) array.
    pub fn read_frame(&self, index: usize) -> Result<Arc<Array2<f64>>> {
        if let Some(frame) = self.cache.borrow_mut().get(index) {
            return Ok(frame);
        }
        let raw = self.frame_raw(index)?;
        let frame = Arc::new(decode_frame(
            raw,
            self.header.height as usize,
            self.header.width as usize,
            self.header.sample_type,
        ));
        self.cache.borrow_mut().insert(index, Arc::clone(&frame));
        Ok(frame)
    }

    /// Overwrite one frame in place, encoded in the file's native sample type.
    pub fn write_frame(&mut self, index: usize, data: ArrayView2<f64>) -> Result<()> {
        self.check_index(index)?;
        let expected = (self.header.height as usize, self.header.width as usize);
        if data.dim() != expected {
            return Err(SpectraError::ShapeMismatch(format!(
                "frame is {:?}, file expects {:?}",
                data.dim(),
                expected
            )));
        }

        let offset = self.header.frame_offset(index);
        let len = self.header.frame_byte_size();
        let dtype = self.header.sample_type;
        match &mut self.storage {
            Storage::ReadOnly(_) => return Err(SpectraError::ReadOnly),
            Storage::ReadWrite(map) => {
                encode_frame(data, dtype, &mut map[offset..offset + len]);
                map.flush_range(offset, len)?;
            }
        }
        self.cache.borrow_mut().invalidate(index);
        Ok(())
    }

    fn footer(&self) -> Option<&str> {
        let bytes = self.storage.bytes();
        let start = self.header.xml_offset as usize;
        if start == 0 || start < self.header.data_end() || start >= bytes.len() {
            return None;
        }
        std::str::from_utf8(&bytes[start..])
            .ok()
            .map(|s| s.trim_end_matches('\0'))
    }

    /// Parse the embedded XML metadata block.
    pub fn metadata(&self) -> Result<SpeMetadata> {
        let xml = self
            .footer()
            .ok_or_else(|| SpectraError::MetadataUnavailable("no XML footer".into()))?;
        parse_footer(xml)
    }

    /// Wavelength of every pixel along the wavelength axis (nm).
    ///
    /// Prefers the footer's wavelength mapping and falls back to the legacy
    /// header polynomial.
    pub fn wavelengths(&self) -> Result<Array1<f64>> {
        let width = self.header.width as usize;
        match self.metadata() {
            Ok(SpeMetadata {
                wavelengths: Some(w),
                ..
            }) if w.len() == width => return Ok(Array1::from(w)),
            Ok(SpeMetadata {
                wavelengths: Some(w),
                ..
            }) => warn!(
                found = w.len(),
                expected = width,
                "Ignoring wavelength mapping of unexpected length"
            ),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "No footer wavelength mapping"),
        }
        self.header.polynomial_wavelengths().ok_or_else(|| {
            SpectraError::MetadataUnavailable("no wavelength calibration in file".into())
        })
    }

    /// Iterator over all frames.
    pub fn frames(&self) -> impl Iterator<Item = Result<Arc<Array2<f64>>>> + '_ {
        (0..self.frame_count()).map(move |i| self.read_frame(i))
    }
}

pub(crate) fn has_spe_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("spe"))
}

fn parse_header(buf: &[u8]) -> Result<SpeHeader> {
    let magic = LittleEndian::read_i32(&buf[OFFSET_MAGIC..]);
    if magic != SPE_MAGIC {
        return Err(SpectraError::UnsupportedFormat(
            "Missing SPE magic number".into(),
        ));
    }

    let width = LittleEndian::read_u16(&buf[OFFSET_XDIM..]);
    let height = LittleEndian::read_u16(&buf[OFFSET_YDIM..]);
    let code = LittleEndian::read_i16(&buf[OFFSET_DATATYPE..]);
    let frame_count = LittleEndian::read_i32(&buf[OFFSET_NUM_FRAMES..]);
    let header_version = LittleEndian::read_f32(&buf[OFFSET_HEADER_VERSION..]);
    let xml_offset = LittleEndian::read_u64(&buf[OFFSET_XML_FOOTER..]);
    let polynom_order = buf[OFFSET_POLYNOM_ORDER];

    let mut polynom_coeffs = [0.0; POLYNOM_COEFF_COUNT];
    LittleEndian::read_f64_into(
        &buf[OFFSET_POLYNOM_COEFFS..OFFSET_POLYNOM_COEFFS + 8 * POLYNOM_COEFF_COUNT],
        &mut polynom_coeffs,
    );

    let sample_type = SampleType::from_spe_code(code).ok_or_else(|| {
        SpectraError::UnsupportedFormat(format!("Unknown SPE datatype code {code}"))
    })?;

    if width == 0 || height == 0 {
        return Err(SpectraError::InvalidSpe(format!(
            "Invalid dimensions: {width}x{height}"
        )));
    }
    if frame_count < 0 {
        return Err(SpectraError::InvalidSpe(format!(
            "Negative frame count {frame_count}"
        )));
    }

    Ok(SpeHeader {
        width,
        height,
        frame_count: frame_count as u32,
        sample_type,
        header_version,
        xml_offset,
        polynom_order,
        polynom_coeffs,
    })
}

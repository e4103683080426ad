use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use ndarray::{Array2, ArrayView2};
use num_traits::{Bounded, NumCast, Zero};
use serde::{Deserialize, Serialize};

/// Native sample type of a stored frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    F32,
    I32,
    I16,
    U16,
    F64,
    U8,
    U32,
}

impl SampleType {
    /// Map an SPE header datatype code to a sample type.
    pub fn from_spe_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::F32),
            1 => Some(Self::I32),
            2 => Some(Self::I16),
            3 => Some(Self::U16),
            5 => Some(Self::F64),
            6 => Some(Self::U8),
            8 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn spe_code(self) -> i16 {
        match self {
            Self::F32 => 0,
            Self::I32 => 1,
            Self::I16 => 2,
            Self::U16 => 3,
            Self::F64 => 5,
            Self::U8 => 6,
            Self::U32 => 8,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 => 8,
        }
    }

    /// Decode one little-endian sample. Every type is exactly representable as f64.
    pub fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            Self::F32 => LittleEndian::read_f32(bytes) as f64,
            Self::I32 => LittleEndian::read_i32(bytes) as f64,
            Self::I16 => LittleEndian::read_i16(bytes) as f64,
            Self::U16 => LittleEndian::read_u16(bytes) as f64,
            Self::F64 => LittleEndian::read_f64(bytes),
            Self::U8 => bytes[0] as f64,
            Self::U32 => LittleEndian::read_u32(bytes) as f64,
        }
    }

    /// Encode one sample. Integer types truncate toward zero and saturate.
    pub fn encode(self, value: f64, out: &mut [u8]) {
        match self {
            Self::F32 => LittleEndian::write_f32(out, value as f32),
            Self::I32 => LittleEndian::write_i32(out, saturate(value)),
            Self::I16 => LittleEndian::write_i16(out, saturate(value)),
            Self::U16 => LittleEndian::write_u16(out, saturate(value)),
            Self::F64 => LittleEndian::write_f64(out, value),
            Self::U8 => out[0] = saturate(value),
            Self::U32 => LittleEndian::write_u32(out, saturate(value)),
        }
    }
}

/// Truncate toward zero and clamp to `T`'s range; NaN maps to zero.
pub(crate) fn saturate<T: NumCast + Bounded + Zero>(value: f64) -> T {
    if value.is_nan() {
        return T::zero();
    }
    let truncated = value.trunc();
    NumCast::from(truncated).unwrap_or_else(|| {
        if truncated < 0.0 {
            T::min_value()
        } else {
            T::max_value()
        }
    })
}

/// Decode a row-major block of samples into a (rows, cols) array.
pub fn decode_frame(raw: &[u8], rows: usize, cols: usize, dtype: SampleType) -> Array2<f64> {
    let bps = dtype.bytes_per_sample();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let offset = (r * cols + c) * bps;
        dtype.decode(&raw[offset..offset + bps])
    })
}

/// Encode a frame into `out` in row-major order.
pub fn encode_frame(data: ArrayView2<f64>, dtype: SampleType, out: &mut [u8]) {
    let bps = dtype.bytes_per_sample();
    for (value, chunk) in data.iter().zip(out.chunks_exact_mut(bps)) {
        dtype.encode(*value, chunk);
    }
}

/// Dimensions of a spectral cube: (frame, position, wavelength).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralShape {
    pub frame_num: usize,
    pub position_pixel_num: usize,
    pub wavelength_pixel_num: usize,
}

impl SpectralShape {
    pub fn new(frame_num: usize, position_pixel_num: usize, wavelength_pixel_num: usize) -> Self {
        Self {
            frame_num,
            position_pixel_num,
            wavelength_pixel_num,
        }
    }

    /// Row splitting the upper and lower detector halves.
    ///
    /// Uses round-half-to-even so that existing calibration files line up:
    /// 9 rows split at 4, 11 rows at 6.
    pub fn center_pixel(&self) -> usize {
        round_half_even(self.position_pixel_num as f64 / 2.0) as usize
    }

    pub fn upper_rows(&self) -> Range<usize> {
        0..self.center_pixel()
    }

    pub fn lower_rows(&self) -> Range<usize> {
        self.center_pixel()..self.position_pixel_num
    }

    /// Samples per frame.
    pub fn frame_len(&self) -> usize {
        self.position_pixel_num * self.wavelength_pixel_num
    }

    pub fn frame_dim(&self) -> (usize, usize) {
        (self.position_pixel_num, self.wavelength_pixel_num)
    }

    pub fn grid_dim(&self) -> (usize, usize) {
        (self.frame_num, self.position_pixel_num)
    }
}

fn round_half_even(x: f64) -> f64 {
    x.round_ties_even()
}

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cancel::CancelToken;
use crate::error::{Result, SpectraError};
use crate::io::spe::SpeFile;

/// How a frame is rotated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotateMode {
    /// Rotate the full image about its centre.
    Whole,
    /// Rotate the upper and lower detector halves independently, then re-stack.
    SeparateHalves,
}

impl fmt::Display for RotateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => write!(f, "whole"),
            Self::SeparateHalves => write!(f, "separate-halves"),
        }
    }
}

impl FromStr for RotateMode {
    type Err = SpectraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whole" => Ok(Self::Whole),
            "separate-halves" | "separate_halves" | "separate_half" => Ok(Self::SeparateHalves),
            other => Err(SpectraError::InvalidInput(format!(
                "unknown rotate mode {other:?} (expected whole or separate-halves)"
            ))),
        }
    }
}

/// Rotate an image counter-clockwise by `degrees` about its centre.
///
/// Bilinear resampling; samples falling outside the source read as 0 and the
/// output keeps the input shape. Files rotated by older tooling used a cubic
/// spline, so pixel values differ slightly from those at the same angle.
pub fn rotate_image(image: ArrayView2<f64>, degrees: f64) -> Array2<f64> {
    let (rows, cols) = image.dim();
    if degrees % 360.0 == 0.0 {
        return image.to_owned();
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cr = (rows as f64 - 1.0) / 2.0;
    let cc = (cols as f64 - 1.0) / 2.0;

    let sample = |r: isize, c: isize| -> f64 {
        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            0.0
        } else {
            image[[r as usize, c as usize]]
        }
    };

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let dr = r as f64 - cr;
        let dc = c as f64 - cc;
        // Inverse map: output pixel back into the source frame.
        let sr = cr + dr * cos + dc * sin;
        let sc = cc + dc * cos - dr * sin;

        let r0 = sr.floor();
        let c0 = sc.floor();
        let fr = sr - r0;
        let fc = sc - c0;
        let (r0, c0) = (r0 as isize, c0 as isize);

        let top = sample(r0, c0) * (1.0 - fc) + sample(r0, c0 + 1) * fc;
        let bottom = sample(r0 + 1, c0) * (1.0 - fc) + sample(r0 + 1, c0 + 1) * fc;
        top * (1.0 - fr) + bottom * fr
    })
}

/// Reject angles that would turn every output pixel into NaN.
pub(crate) fn check_angle(degrees: f64) -> Result<()> {
    if degrees.is_finite() {
        Ok(())
    } else {
        Err(SpectraError::InvalidInput(format!(
            "rotation angle must be finite, got {degrees}"
        )))
    }
}

/// Rotate a frame according to `mode`, splitting halves at `center_pixel`.
pub fn rotate_frame(
    image: ArrayView2<f64>,
    degrees: f64,
    mode: RotateMode,
    center_pixel: usize,
) -> Array2<f64> {
    match mode {
        RotateMode::Whole => rotate_image(image, degrees),
        RotateMode::SeparateHalves => {
            let center = center_pixel.min(image.nrows());
            let mut out = Array2::zeros(image.dim());
            out.slice_mut(s![..center, ..])
                .assign(&rotate_image(image.slice(s![..center, ..]), degrees));
            out.slice_mut(s![center.., ..])
                .assign(&rotate_image(image.slice(s![center.., ..]), degrees));
            out
        }
    }
}

/// Write every rotated frame of `before` into `after` in its native sample type.
///
/// `after` is created as a byte copy of `before` when it does not exist.
/// `progress` is called with `(frames_done, total_frames)`.
pub fn rotate_into(
    before: &Path,
    after: &Path,
    degrees: f64,
    mode: RotateMode,
    cache_capacity: usize,
    mut progress: impl FnMut(usize, usize),
    cancel: &CancelToken,
) -> Result<()> {
    check_angle(degrees)?;
    let source = SpeFile::open_with_cache(before, 0)?;
    if !after.exists() {
        fs::copy(before, after)?;
    }
    let mut target = SpeFile::open_rw(after, cache_capacity)?;

    let total = source.frame_count();
    if target.frame_count() != total {
        return Err(SpectraError::ShapeMismatch(format!(
            "{} has {} frames, {} has {}",
            before.display(),
            total,
            after.display(),
            target.frame_count()
        )));
    }
    if target.shape().frame_dim() != source.shape().frame_dim() {
        return Err(SpectraError::ShapeMismatch(format!(
            "frame shape {:?} differs from {:?}",
            target.shape().frame_dim(),
            source.shape().frame_dim()
        )));
    }

    info!(
        before = %before.display(),
        after = %after.display(),
        degrees,
        %mode,
        frames = total,
        "Rotating frames"
    );

    let center = source.shape().center_pixel();
    for i in 0..total {
        cancel.check()?;
        let frame = source.read_frame(i)?;
        let rotated = rotate_frame(frame.view(), degrees, mode, center);
        target.write_frame(i, rotated.view())?;
        progress(i + 1, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_degrees_is_identity() {
        let img = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(rotate_image(img.view(), 0.0), img);
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() {
        let img = array![[0.0, 0.0, 0.0], [0.0, 0.0, 7.0], [0.0, 0.0, 0.0]];
        let out = rotate_image(img.view(), 90.0);
        // The right-hand pixel moves to the top.
        assert_abs_diff_eq!(out[[0, 1]], 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out[[1, 2]], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.sum(), 7.0, epsilon = 1e-9);
    }

    #[test]
    fn half_turn_reverses() {
        let img = array![[1.0, 2.0], [3.0, 4.0]];
        let out = rotate_image(img.view(), 180.0);
        assert_close(&out, &array![[4.0, 3.0], [2.0, 1.0]]);
    }

    #[test]
    fn halves_rotate_independently() {
        let img = array![
            [1.0, 2.0],
            [3.0, 4.0],
            [5.0, 6.0],
            [7.0, 8.0]
        ];
        let out = rotate_frame(img.view(), 180.0, RotateMode::SeparateHalves, 2);
        assert_close(
            &out,
            &array![[4.0, 3.0], [2.0, 1.0], [8.0, 7.0], [6.0, 5.0]],
        );
    }

    #[test]
    fn parses_modes() {
        assert_eq!("whole".parse::<RotateMode>().unwrap(), RotateMode::Whole);
        assert_eq!(
            "separate_half".parse::<RotateMode>().unwrap(),
            RotateMode::SeparateHalves
        );
        assert!("diagonal".parse::<RotateMode>().is_err());
    }
}

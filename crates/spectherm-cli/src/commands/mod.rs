pub mod calibrate;
pub mod config;
pub mod info;
pub mod max_intensity;
pub mod planck;
pub mod rotate;
pub mod two_color;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar in the shared `{msg} [bar] pos/len` style.
pub fn progress_bar(len: usize, message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message(message);
    Ok(pb)
}

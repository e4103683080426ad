use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use spectherm_core::calibrate::{calibrate, ResponseCurve};
use spectherm_core::cancel::CancelToken;
use spectherm_core::config::CoreConfig;
use spectherm_core::io::dataset::DATASET_EXTENSION;
use spectherm_core::io::LampSpectrum;
use spectherm_core::spectrum::SpectrumData;

use super::progress_bar;

#[derive(Args)]
pub struct CalibrateArgs {
    /// Raw .spe file
    pub file: PathBuf,

    /// Lamp spectral radiance CSV (wavelength, intensity)
    #[arg(long)]
    pub lamp: PathBuf,

    /// Lamp recorded through the upper half of the optics
    #[arg(long)]
    pub upper: PathBuf,

    /// Lamp recorded through the lower half of the optics
    #[arg(long)]
    pub lower: PathBuf,

    /// Output container (default: <stem>_calib.hdf)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn default_output(input: &Path, stem: &str) -> PathBuf {
    input.with_file_name(format!("{stem}_calib.{DATASET_EXTENSION}"))
}

pub fn run(args: &CalibrateArgs, config: &CoreConfig) -> Result<()> {
    let raw = SpectrumData::open(&args.file, config)?;
    let lamp = LampSpectrum::from_csv(&args.lamp)
        .with_context(|| format!("Failed to read lamp spectrum {}", args.lamp.display()))?;
    let upper = ResponseCurve::from_spectrum(&SpectrumData::open(&args.upper, config)?)
        .with_context(|| format!("Failed to read response curve {}", args.upper.display()))?;
    let lower = ResponseCurve::from_spectrum(&SpectrumData::open(&args.lower, config)?)
        .with_context(|| format!("Failed to read response curve {}", args.lower.display()))?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.file, &raw.file_stem()));

    let pb = progress_bar(raw.shape().frame_num, "Calibrating")?;
    calibrate(
        &raw,
        &lamp,
        &upper,
        &lower,
        &output,
        |done, _| pb.set_position(done as u64),
        &CancelToken::new(),
    )?;
    pb.finish();

    println!("Saved {}", output.display());
    Ok(())
}

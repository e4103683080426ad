use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use spectherm_core::cancel::CancelToken;
use spectherm_core::config::CoreConfig;
use spectherm_core::io::DatasetStore;
use spectherm_core::spectrum::SpectrumData;
use spectherm_core::sweep::save_max_intensity;

use super::progress_bar;

#[derive(Args)]
pub struct MaxIntensityArgs {
    /// Input .spe file or .hdf container
    pub file: PathBuf,

    /// Output .hdf container
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run(args: &MaxIntensityArgs, config: &CoreConfig) -> Result<()> {
    let data = SpectrumData::open(&args.file, config)?;
    let shape = data.shape();

    let pb = progress_bar(shape.frame_num, "Frames")?;
    let max_2d = data.max_intensity_2d(
        |done, _| pb.set_position(done as u64),
        &CancelToken::new(),
    )?;
    pb.finish();

    let store = DatasetStore::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    save_max_intensity(&store, &max_2d)?;

    let peak = max_2d
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    crate::summary::print_max_intensity_summary(&args.file, &args.output, shape, peak);
    Ok(())
}

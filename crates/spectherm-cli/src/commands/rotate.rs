use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use spectherm_core::cancel::CancelToken;
use spectherm_core::config::CoreConfig;
use spectherm_core::io::SpeFile;
use spectherm_core::spectrum::{rotate_into, RotateMode};

use super::progress_bar;

#[derive(Clone, ValueEnum)]
pub enum RotateModeArg {
    Whole,
    SeparateHalves,
}

impl From<RotateModeArg> for RotateMode {
    fn from(arg: RotateModeArg) -> Self {
        match arg {
            RotateModeArg::Whole => RotateMode::Whole,
            RotateModeArg::SeparateHalves => RotateMode::SeparateHalves,
        }
    }
}

#[derive(Args)]
pub struct RotateArgs {
    /// Source .spe file
    pub before: PathBuf,

    /// Destination .spe file (copied from the source when missing)
    pub after: PathBuf,

    /// Counter-clockwise rotation in degrees
    #[arg(short, long, allow_hyphen_values = true)]
    pub degrees: f64,

    /// Rotate the whole frame or each detector half about its own centre
    #[arg(short, long, value_enum, default_value = "whole")]
    pub mode: RotateModeArg,
}

pub fn run(args: &RotateArgs, config: &CoreConfig) -> Result<()> {
    let frames = SpeFile::open_with_cache(&args.before, 0)?.frame_count();

    let pb = progress_bar(frames, "Rotating")?;
    rotate_into(
        &args.before,
        &args.after,
        args.degrees,
        args.mode.clone().into(),
        config.cache.frame_capacity,
        |done, _| pb.set_position(done as u64),
        &CancelToken::new(),
    )?;
    pb.finish();

    println!(
        "Rotated {} frames by {} degrees into {}",
        frames,
        args.degrees,
        args.after.display()
    );
    Ok(())
}

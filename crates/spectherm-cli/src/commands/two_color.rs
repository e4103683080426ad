use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use spectherm_core::config::CoreConfig;
use spectherm_core::histogram::PeakModel;
use spectherm_core::spectrum::SpectrumData;
use spectherm_core::sweep::{two_color_point, WavelengthWindow};

#[derive(Clone, ValueEnum)]
pub enum PeakModelArg {
    Gaussian,
    Lorentzian,
    PseudoVoigt,
}

impl From<PeakModelArg> for PeakModel {
    fn from(arg: PeakModelArg) -> Self {
        match arg {
            PeakModelArg::Gaussian => PeakModel::Gaussian,
            PeakModelArg::Lorentzian => PeakModel::Lorentzian,
            PeakModelArg::PseudoVoigt => PeakModel::PseudoVoigt,
        }
    }
}

#[derive(Args)]
pub struct TwoColorArgs {
    /// Calibrated .hdf container (or .spe file)
    pub file: PathBuf,

    /// Frame index
    #[arg(short, long)]
    pub frame: usize,

    /// Position pixel index
    #[arg(short, long)]
    pub position: usize,

    /// Peak model for the temperature histogram
    #[arg(short, long, value_enum)]
    pub model: Option<PeakModelArg>,

    /// Histogram bin count
    #[arg(short, long)]
    pub bins: Option<usize>,

    /// Lower wavelength bound in nm
    #[arg(long)]
    pub lower: Option<f64>,

    /// Upper wavelength bound in nm
    #[arg(long)]
    pub upper: Option<f64>,
}

pub fn run(args: &TwoColorArgs, config: &CoreConfig) -> Result<()> {
    let mut config = config.clone();
    if let Some(ref model) = args.model {
        config.histogram.model = model.clone().into();
    }
    if let Some(bins) = args.bins {
        config.histogram.bins = bins;
    }
    let window = WavelengthWindow::new(
        args.lower.unwrap_or(config.window.lower),
        args.upper.unwrap_or(config.window.upper),
    );

    let data = SpectrumData::open(&args.file, &config)?;
    let point = two_color_point(&data, args.frame, args.position, &window, &config)?;

    crate::summary::print_two_color_summary(&args.file, &window, &point);
    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use spectherm_core::cancel::CancelToken;
use spectherm_core::config::CoreConfig;
use spectherm_core::io::dataset::DATASET_EXTENSION;
use spectherm_core::io::DatasetStore;
use spectherm_core::spectrum::SpectrumData;
use spectherm_core::sweep::{
    all_targets, planck_sweep, save_max_intensity, select_targets, WavelengthWindow,
};

use super::progress_bar;

#[derive(Args)]
pub struct PlanckArgs {
    /// Calibrated .hdf container (or .spe file)
    pub file: PathBuf,

    /// Raw .spe file used to select points by max intensity
    #[arg(long, requires = "threshold")]
    pub reference: Option<PathBuf>,

    /// Minimum raw max intensity for a point to be fitted
    #[arg(long, requires = "reference")]
    pub threshold: Option<f64>,

    /// Lower wavelength bound in nm
    #[arg(long)]
    pub lower: Option<f64>,

    /// Upper wavelength bound in nm
    #[arg(long)]
    pub upper: Option<f64>,

    /// Output container (default: input name with _calib replaced by _dist, as .hdf)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn default_output(input: &Path, stem: &str) -> PathBuf {
    let base = match stem.strip_suffix("_calib") {
        Some(prefix) => format!("{prefix}_dist"),
        None => format!("{stem}_dist"),
    };
    input.with_file_name(format!("{base}.{DATASET_EXTENSION}"))
}

pub fn run(args: &PlanckArgs, config: &CoreConfig) -> Result<()> {
    let data = SpectrumData::open(&args.file, config)?;
    let shape = data.shape();
    let window = WavelengthWindow::new(
        args.lower.unwrap_or(config.window.lower),
        args.upper.unwrap_or(config.window.upper),
    );
    let cancel = CancelToken::new();

    let (targets, reference_max) = match (&args.reference, args.threshold) {
        (Some(reference), Some(threshold)) => {
            let raw = SpectrumData::open(reference, config)
                .with_context(|| format!("Failed to open reference {}", reference.display()))?;
            if raw.shape().grid_dim() != shape.grid_dim() {
                bail!(
                    "Reference grid {:?} does not match dataset grid {:?}",
                    raw.shape().grid_dim(),
                    shape.grid_dim()
                );
            }
            let pb = progress_bar(shape.frame_num, "Max intensity")?;
            let max_2d =
                raw.max_intensity_2d(|done, _| pb.set_position(done as u64), &cancel)?;
            pb.finish();
            (select_targets(&max_2d, threshold), Some(max_2d))
        }
        _ => (all_targets(&shape), None),
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.file, &data.file_stem()));

    let pb = progress_bar(targets.len(), "Planck fit")?;
    let map = planck_sweep(
        &data,
        &targets,
        &window,
        &config.planck,
        |done, _| pb.set_position(done as u64),
        &cancel,
    )?;
    pb.finish();

    let store = DatasetStore::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    map.save(&store)?;
    if let Some(ref max_2d) = reference_max {
        save_max_intensity(&store, max_2d)?;
    }

    crate::summary::print_planck_summary(&args.file, &output, &window, &map);
    Ok(())
}

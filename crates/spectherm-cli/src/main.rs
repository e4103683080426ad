mod commands;
mod summary;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spectherm_core::config::CoreConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spectherm", about = "Temperature estimation from spectral radiance images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Core settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show shape, wavelength range and acquisition metadata
    Info(commands::info::InfoArgs),
    /// Compute the (frame, position) max-intensity map
    MaxIntensity(commands::max_intensity::MaxIntensityArgs),
    /// Calibrate raw spectra against a lamp and response curves
    Calibrate(commands::calibrate::CalibrateArgs),
    /// Rotate every frame of an SPE file into another SPE file
    Rotate(commands::rotate::RotateArgs),
    /// Fit the Planck law at every selected point
    Planck(commands::planck::PlanckArgs),
    /// Two-color pyrometry at one point
    TwoColor(commands::two_color::TwoColorArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
}

fn load_config(path: Option<&Path>) -> Result<CoreConfig> {
    let Some(path) = path else {
        return Ok(CoreConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = toml::from_str(&contents).context("Invalid spectherm config")?;
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Info(args) => commands::info::run(args, &config),
        Commands::MaxIntensity(args) => commands::max_intensity::run(args, &config),
        Commands::Calibrate(args) => commands::calibrate::run(args, &config),
        Commands::Rotate(args) => commands::rotate::run(args, &config),
        Commands::Planck(args) => commands::planck::run(args, &config),
        Commands::TwoColor(args) => commands::two_color::run(args, &config),
        Commands::Config(args) => commands::config::run(args, &config),
    }
}

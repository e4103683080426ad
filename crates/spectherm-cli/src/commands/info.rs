use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use spectherm_core::config::CoreConfig;
use spectherm_core::spectrum::{SpectrumData, SpectrumSource};

#[derive(Args)]
pub struct InfoArgs {
    /// Input .spe file or .hdf container
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs, config: &CoreConfig) -> Result<()> {
    let data = SpectrumData::open(&args.file, config)?;
    let shape = data.shape();

    let kind = match data.source() {
        SpectrumSource::Binary(_) => "SPE",
        SpectrumSource::Tabular(_) => "dataset",
    };

    println!("File:          {}", args.file.display());
    println!("Container:     {}", kind);
    println!("Frames:        {}", shape.frame_num);
    println!("Positions:     {}", shape.position_pixel_num);
    println!("Wavelengths:   {}", shape.wavelength_pixel_num);
    println!("Center pixel:  {}", data.center_pixel());
    println!("Sample type:   {:?}", data.sample_type());

    match data.wavelengths() {
        Ok(wl) if !wl.is_empty() => println!(
            "Range:         {:.2} - {:.2} nm",
            wl[0],
            wl[wl.len() - 1]
        ),
        Ok(_) => {}
        Err(e) => println!("Range:         unavailable ({e})"),
    }

    match data.metadata() {
        Ok(meta) => {
            if let Some(ref od) = meta.optical_density {
                println!("OD:            {}", od);
            }
            if let Some(rate) = meta.frame_rate {
                println!("Frame rate:    {} fps", rate);
            }
            if let Some(ref date) = meta.capture_date {
                println!("Captured:      {}", date);
            }
            if let Some(ref date) = meta.calibration_date {
                println!("Calibrated:    {}", date);
            }
            for (i, roi) in meta.roi_list.iter().enumerate() {
                println!(
                    "ROI {}:         {}x{} at ({}, {})",
                    i, roi.width, roi.height, roi.x, roi.y
                );
            }
        }
        Err(e) => println!("Metadata:      {e}"),
    }

    Ok(())
}

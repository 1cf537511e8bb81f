use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};
use rayon::prelude::*;

use cell_wall_width_lib::config::{Preset, ProcessingConfig};
use cell_wall_width_lib::image_io::load_image;
use cell_wall_width_lib::pipeline::{plan_batch, process_image, BatchItem};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Plant cell area, perimeter and cell wall width measurement")]
struct Args {
    /// Path to input image or directory of images
    #[clap(short, long)]
    input: PathBuf,

    /// Path to output directory
    #[clap(short, long, default_value = "output")]
    output: PathBuf,

    /// Path to a TOML or JSON configuration file
    #[clap(short, long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Built-in parameter set (used when no config file is given)
    #[clap(short, long, value_enum, default_value = "confocal")]
    preset: PresetArg,

    /// Enable debug mode (save intermediate images and log per-region detail)
    #[clap(short, long)]
    debug: bool,

    /// Process directory inputs in parallel
    #[clap(long)]
    parallel: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Confocal,
    ConfocalAvg,
    BrightField,
    DarkField,
    CellCulture,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Confocal => Preset::Confocal,
            PresetArg::ConfocalAvg => Preset::ConfocalAvg,
            PresetArg::BrightField => Preset::BrightField,
            PresetArg::DarkField => Preset::DarkField,
            PresetArg::CellCulture => Preset::CellCulture,
        }
    }
}

fn process_path(path: &Path, config: &ProcessingConfig, output: &Path, debug: bool) -> anyhow::Result<()> {
    info!("Processing: {}", path.display());
    let input_image = load_image(path).with_context(|| format!("loading {}", path.display()))?;
    process_image(input_image, config, output, debug)
        .with_context(|| format!("processing {}", path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => ProcessingConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => {
            let config = ProcessingConfig::from_preset(args.preset.into());
            config.validate()?;
            config
        }
    };
    info!("Threshold: {}", config.threshold);

    let start_time = Instant::now();

    if args.input.is_file() {
        process_path(&args.input, &config, &args.output, args.debug)?;
    } else if args.input.is_dir() {
        let plan = plan_batch(&args.input, &args.output)
            .with_context(|| format!("scanning {}", args.input.display()))?;
        info!("Found {} image files in {}", plan.len(), args.input.display());

        let run_item = |item: &BatchItem| process_path(&item.input, &config, &item.output_dir, args.debug).err();
        let failures = if args.parallel {
            plan.par_iter().filter_map(run_item).collect::<Vec<_>>()
        } else {
            plan.iter().filter_map(run_item).collect::<Vec<_>>()
        };

        for failure in &failures {
            error!("{:#}", failure);
        }
        if !failures.is_empty() {
            bail!("{} of {} images failed", failures.len(), plan.len());
        }
    } else {
        bail!("input path does not exist: {}", args.input.display());
    }

    info!("Processing completed in {:.2} seconds", start_time.elapsed().as_secs_f64());

    Ok(())
}

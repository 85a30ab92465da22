//! kgen - fused GPU kernel generator
//!
//! Reads a pipeline description, links every op into the first one and
//! prints the resulting kernel together with its launch geometry.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use kgen::ops::{OpRegistry, TuningType};
use kgen::{generate, PipelineConfig};
use kgen_core::GpuInfo;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Tuning {
    /// Single least-padded work group
    Fast,
    /// Every power-of-two work group the device allows
    Exhaustive,
}

impl From<Tuning> for TuningType {
    fn from(tuning: Tuning) -> Self {
        match tuning {
            Tuning::Fast => TuningType::Fast,
            Tuning::Exhaustive => TuningType::Exhaustive,
        }
    }
}

/// Generate one fused elementwise kernel from a YAML pipeline
#[derive(Parser)]
#[command(name = "kgen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Pipeline description
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// How many work-group candidates to enumerate
    #[arg(short, long, value_enum, default_value_t = Tuning::Fast)]
    tuning: Tuning,

    /// Use the limits of the local GPU instead of the configured device
    #[arg(long)]
    query_device: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(cli.verbose))).init();

    let config = PipelineConfig::from_path(&cli.config)?;
    let gpu_info = if cli.query_device {
        pollster::block_on(GpuInfo::query())?
    } else {
        config.device.clone().unwrap_or_default()
    };

    let registry = OpRegistry::with_builtins();
    let kernel = generate(&config, &registry, &gpu_info, cli.tuning.into())?;

    println!("{}", kernel.code);
    println!("// grid:              {}", kernel.grid_size);
    println!("// work group:        {}", kernel.work_group_size);
    println!("// work groups count: {}", kernel.work_groups_count);
    println!("// constant bytes:    {}", kernel.const_args_size);
    for dispatch in &kernel.dispatches {
        println!("// dispatch: {} x {}", dispatch.work_group_size, dispatch.work_groups_count);
    }
    Ok(())
}

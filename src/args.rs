use crate::util::bootstrap_size_parser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Phase-aware spike detection for cycled power loads.")]
pub struct Cli {
    /// KDL config file; defaults to config.kdl in the user config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score a stream of power readings, one value per line
    Detect {
        /// Input file, or `-` for stdin
        input: String,
        /// Name attached to emitted events
        #[arg(long, default_value = "default")]
        source: String,
        #[arg(long, value_parser = bootstrap_size_parser)]
        bootstrap_size: Option<usize>,
        /// Also report phase-duration anomalies
        #[arg(long)]
        durations: bool,
    },
    /// Print the effective settings
    Config,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::Mode;
use crate::utils::constants::DEFAULT_ROW_GROUP_SIZE;

#[derive(Parser)]
#[command(name = "station-dataset")]
#[command(about = "Station-level dataset splitting and terrain-tile streaming")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prepare train/test/val splits and print a per-mode summary
    Split {
        #[arg(short, long, help = "Dataset configuration file (TOML, JSON or YAML)")]
        config: PathBuf,

        #[arg(short, long, help = "Write the split report (assignment, statistics) as JSON")]
        report: Option<PathBuf>,

        #[arg(long, help = "Write one Parquet file per prepared mode into this directory")]
        output_dir: Option<PathBuf>,

        #[arg(long, default_value = "snappy")]
        compression: String,

        #[arg(long, default_value_t = DEFAULT_ROW_GROUP_SIZE, help = "Rows per Parquet row group")]
        row_group_size: usize,
    },

    /// Run the stratified station selection only
    Select {
        #[arg(short, long, help = "Dataset configuration file (TOML, JSON or YAML)")]
        config: PathBuf,

        #[arg(short, long, help = "Write the selected stations as JSON")]
        output: Option<PathBuf>,

        #[arg(long, help = "Override the selection seed")]
        seed: Option<u64>,
    },

    /// Prepare, assemble and batch one mode, then iterate it once
    Stream {
        #[arg(short, long, help = "Dataset configuration file (TOML, JSON or YAML)")]
        config: PathBuf,

        #[arg(short, long, default_value = "train", value_parser = parse_mode)]
        mode: Mode,

        #[arg(long, help = "Leave labels out of the stream")]
        no_labels: bool,

        #[arg(long, help = "Override the configured batch size")]
        batch_size: Option<usize>,
    },
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse().map_err(|e: crate::error::DatasetError| e.to_string())
}

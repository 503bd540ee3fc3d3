// src/cli.rs

use crate::config::{DEFAULT_DEVICE_RESOLUTION, DEFAULT_DISPLAY_SIZE, DEFAULT_VIEWING_DISTANCE};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Bitstream feature file (JSON row or array of rows) from the external parser
    #[arg(required = true)]
    pub features: PathBuf,

    /// Model configuration file (coefficients and residual model per device profile)
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Device type: pc, tv or mobile
    #[arg(long, default_value = "pc")]
    pub device_type: String,

    /// Display resolution as WIDTHxHEIGHT
    #[arg(long, default_value = DEFAULT_DEVICE_RESOLUTION)]
    pub device_resolution: String,

    /// Viewing distance in multiples of the display height
    #[arg(long, default_value = DEFAULT_VIEWING_DISTANCE)]
    pub viewing_distance: String,

    /// Display diagonal in inches
    #[arg(long, default_value_t = DEFAULT_DISPLAY_SIZE)]
    pub display_size: f64,

    /// Optional prefix for output files (default: derived from the feature filename)
    #[arg(long)]
    pub output_prefix: Option<String>,

    /// Specify output directory for results (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write a per-second MOS plot next to the JSON result
    #[arg(long)]
    pub plot: bool,

    /// Enable logging to file (e.g., p1204_YYYYMMDD_HHMMSS.log)
    #[arg(long)]
    pub log: bool,
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_a_uhd_pc_display() {
        let args = CliArgs::try_parse_from(["p1204", "features.json", "--config", "model.json"]).unwrap();
        assert_eq!(args.device_type, "pc");
        assert_eq!(args.device_resolution, "3840x2160");
        assert_eq!(args.viewing_distance, "1.5xH");
        assert_eq!(args.display_size, 55.0);
        assert!(!args.plot);
    }

    #[test]
    fn config_is_required() {
        assert!(CliArgs::try_parse_from(["p1204", "features.json"]).is_err());
    }
}

//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Keeps the non-blocking file writer alive for the process lifetime.
pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "soilmon", version, about = "Soil-moisture monitor control")]
pub struct Cli {
    /// Path to the config TOML. Without this flag the default path is used
    /// and may be absent; an explicitly given path must exist.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Config path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "etc/soilmon.toml";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the device loop: connect, calibrate if needed, then measure
    /// periodically until interrupted
    Run,
    /// One-shot interactive calibration (dry phase, wet phase)
    Calibrate,
    /// One-shot measurement; prints the moisture percentage
    Measure,
    /// Delete the stored calibration
    Reset,
    /// Scripted end-to-end pass over simulated hardware
    SelfCheck,
}

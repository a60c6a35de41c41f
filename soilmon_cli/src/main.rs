#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
//! The `soilmon` binary: logging setup, config loading, signal handling and
//! command dispatch. All device behavior lives in `soilmon_core`.

mod cli;
mod device;
mod error_fmt;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use soilmon_config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, DEFAULT_CONFIG_PATH, FILE_GUARD};

fn init_logging(args: &Cli, logging: &soilmon_config::Logging) {
    // RUST_LOG wins over --log-level; the config file only adds the file
    // sink, console verbosity stays a CLI concern.
    let level = logging.level.as_deref().unwrap_or(&args.log_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_owned()));

    let console = if args.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let file = logging.file.as_ref().map(|path| {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path.file_name().unwrap_or_else(|| "soilmon.log".as_ref());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

fn load_config(args: &Cli) -> Result<Config> {
    let (path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (DEFAULT_CONFIG_PATH.into(), false),
    };
    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using built-in defaults");
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    let cfg = soilmon_config::load_toml(&text)
        .wrap_err_with(|| format!("invalid config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn run(args: &Cli, cfg: &Config) -> Result<()> {
    match args.cmd {
        Commands::Run => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::Relaxed);
            })
            .wrap_err("failed to install the Ctrl-C handler")?;
            device::run(cfg, &shutdown)
        }
        Commands::Calibrate => device::calibrate(cfg),
        Commands::Measure => device::measure(cfg),
        Commands::Reset => device::reset(cfg),
        Commands::SelfCheck => device::self_check(cfg),
    }
}

fn main() {
    let args = Cli::parse();
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporting: {e}");
    }

    let result = load_config(&args).and_then(|cfg| {
        init_logging(&args, &cfg.logging);
        run(&args, &cfg)
    });

    if let Err(e) = result {
        tracing::error!(error = ?e, "command failed");
        eprintln!("{}", error_fmt::humanize(&e));
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

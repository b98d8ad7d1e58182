// src/logging.rs

use anyhow::{Context, Result};
use chrono::Local;
use std::{
    fs::{self, File},
    io::IsTerminal,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "nabimfd_pipeline_";
pub const LOG_FILE_SUFFIX: &str = ".log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// `nabimfd_pipeline_YYYYMMDD_HHMMSS.log`
pub fn log_file_name() -> String {
    format!(
        "{}{}{}",
        LOG_FILE_PREFIX,
        Local::now().format("%Y%m%d_%H%M%S"),
        LOG_FILE_SUFFIX
    )
}

/// Console-only logging, for the phase binaries whose output the pipeline captures.
pub fn init_console() {
    fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}

/// Console plus a timestamped log file in `log_dir`. Returns the file path.
pub fn init_with_file(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir).with_context(|| format!("creating log directory {:?}", log_dir))?;
    let path = log_dir.join(log_file_name());
    let file = File::create(&path).with_context(|| format!("creating log file {:?}", path))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(std::io::stdout().is_terminal()),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("installing log subscriber")?;

    Ok(path)
}

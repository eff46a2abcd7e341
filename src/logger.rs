use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::ConfigManager;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Initialize the logging system
///
/// Console logging goes through `env_logger`. `level` comes from
/// `--verbose`/`--quiet`; without it `RUST_LOG` decides, defaulting to `info`:
/// - `RUST_LOG=warn` - Warnings and errors
/// - `RUST_LOG=debug` - Includes every locator probe and capture event
///
/// Run summaries are also appended to a log file in the config directory:
/// - Linux: ~/.config/journal-sync/journal-sync.log or $XDG_CONFIG_HOME/journal-sync/journal-sync.log
/// - macOS: ~/Library/Application Support/journal-sync/journal-sync.log
/// - Windows: %APPDATA%\journal-sync\journal-sync.log
///
/// ```bash
/// RUST_LOG=debug journal-sync run
/// ```
pub fn init_logger(level: Option<LevelFilter>) -> Result<()> {
    ConfigManager::ensure_config_dir()?;
    rotate_log_if_needed()?;

    let level = level.unwrap_or_else(|| {
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| s.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Info)
    });

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        // chromiumoxide logs every unparsed CDP message at debug
        .filter_module("chromiumoxide", LevelFilter::Warn)
        .target(env_logger::Target::Stdout)
        .try_init()
        .ok(); // Ignore error if logger is already initialized

    log_to_file(&format!("Logger initialized with level: {level:?}"))?;

    Ok(())
}

/// Append a line to the persistent log file
pub fn log_to_file(message: &str) -> Result<()> {
    append_line(&ConfigManager::log_file_path()?, message)
}

fn append_line(log_path: &Path, message: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;

    Ok(())
}

/// Rotate the log file once it exceeds 10MB, keeping one `.old` copy
pub fn rotate_log_if_needed() -> Result<()> {
    rotate_at(&ConfigManager::log_file_path()?, MAX_LOG_SIZE)
}

fn rotate_at(log_path: &Path, max_size: u64) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    if std::fs::metadata(log_path)?.len() > max_size {
        let old_log_path = log_path.with_extension("log.old");

        if old_log_path.exists() {
            std::fs::remove_file(&old_log_path)?;
        }
        std::fs::rename(log_path, &old_log_path)?;

        log::info!("Log file rotated to {}", old_log_path.display());
    }

    Ok(())
}

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR_NAME: &str = "journal-sync";

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - Linux: $XDG_CONFIG_HOME/journal-sync or ~/.config/journal-sync
    /// - macOS: ~/Library/Application Support/journal-sync
    /// - Windows: %APPDATA%\journal-sync
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join(APP_DIR_NAME))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join(APP_DIR_NAME))
            }
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home
                .join("Library")
                .join("Application Support")
                .join(APP_DIR_NAME))
        }

        #[cfg(target_os = "windows")]
        {
            Ok(dirs::config_dir()
                .context("Failed to get Windows config directory")?
                .join(APP_DIR_NAME))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join(".journal-sync"))
        }
    }

    /// Get the settings file path (config.toml)
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the run history file path
    pub fn run_history_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("run-history.json"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("journal-sync.log"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;
        Ok(config_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_paths() {
        let config_dir = ConfigManager::config_dir().unwrap();
        assert!(config_dir.to_string_lossy().contains("journal-sync"));

        let settings = ConfigManager::settings_path().unwrap();
        assert!(settings.to_string_lossy().ends_with("config.toml"));

        let history = ConfigManager::run_history_path().unwrap();
        assert!(history.to_string_lossy().contains("run-history.json"));

        let log = ConfigManager::log_file_path().unwrap();
        assert!(log.to_string_lossy().contains("journal-sync.log"));
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_xdg_config_home_respected() {
        let previous = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-xdg-config");
        let config_dir = ConfigManager::config_dir().unwrap();
        assert!(config_dir
            .to_string_lossy()
            .contains("/tmp/test-xdg-config/journal-sync"));
        match previous {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}

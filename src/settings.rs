use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::selector::{ResolveOptions, StepSelectors};

/// Settings loaded from `config.toml`; every field has a default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Journal entries move to once live; overridden by `DAYONE_PUBLISHED_JOURNAL`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_journal: Option<String>,

    pub paths: PathSettings,

    pub automation: AutomationSettings,

    pub selectors: StepSelectors,
}

/// Locations relative to the site root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub state_file: PathBuf,
    pub snapshot_file: PathBuf,
    pub posts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("data/processed.json"),
            snapshot_file: PathBuf::from("data/journal-snapshots.json"),
            posts_dir: PathBuf::from("posts"),
            reports_dir: PathBuf::from("data/migrations"),
            scratch_dir: PathBuf::from("temp"),
            diagnostics_dir: PathBuf::from("temp/diagnostics"),
        }
    }
}

/// Absolute paths for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub state_file: PathBuf,
    pub snapshot_file: PathBuf,
    pub posts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
}

impl PathSettings {
    pub fn resolve(&self, root: &Path) -> SitePaths {
        SitePaths {
            root: root.to_path_buf(),
            state_file: root.join(&self.state_file),
            snapshot_file: root.join(&self.snapshot_file),
            posts_dir: root.join(&self.posts_dir),
            reports_dir: root.join(&self.reports_dir),
            scratch_dir: root.join(&self.scratch_dir),
            diagnostics_dir: root.join(&self.diagnostics_dir),
        }
    }
}

/// Browser automation timing and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    pub login_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<PathBuf>,

    pub locator_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub navigation_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub capture_deadline_secs: u64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            login_url: "https://dayone.me/login".to_string(),
            chrome_executable: None,
            locator_timeout_ms: 2_000,
            poll_interval_ms: 250,
            navigation_timeout_secs: 15,
            settle_delay_ms: 1_500,
            capture_deadline_secs: 30,
        }
    }
}

impl AutomationSettings {
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            per_candidate_timeout: Duration::from_millis(self.locator_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&crate::config::ConfigManager::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join("config.toml")).unwrap();
        assert_eq!(settings.automation.capture_deadline_secs, 30);
        assert_eq!(settings.paths.state_file, PathBuf::from("data/processed.json"));
        assert!(settings.published_journal.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
published_journal = "Blog Published"

[automation]
capture_deadline_secs = 60
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.published_journal.as_deref(), Some("Blog Published"));
        assert_eq!(settings.automation.capture_deadline_secs, 60);
        assert_eq!(settings.automation.locator_timeout_ms, 2_000);
        assert_eq!(settings.selectors, StepSelectors::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let mut settings = Settings::default();
        settings.paths.posts_dir = PathBuf::from("content/posts");
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.paths.posts_dir, PathBuf::from("content/posts"));
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let paths = PathSettings::default().resolve(Path::new("/site"));
        assert_eq!(paths.state_file, PathBuf::from("/site/data/processed.json"));
        assert_eq!(paths.diagnostics_dir, PathBuf::from("/site/temp/diagnostics"));
    }
}

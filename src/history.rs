//! Run history tracking and persistence.
//!
//! Each completed or failed run leaves a record with its counts and the
//! migration report it wrote, if any. A rolling window of recent runs is kept
//! in the config directory and shown by `journal-sync history`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Maximum number of run records to keep in history
pub const MAX_HISTORY_SIZE: usize = 10;

/// How a run obtained its archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Exported through the browser
    Export,
    /// Processed an archive already on disk
    Offline,
}

impl RunKind {
    pub fn as_str(&self) -> &str {
        match self {
            RunKind::Export => "export",
            RunKind::Offline => "offline",
        }
    }
}

/// Entry counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RunCounts {
    pub fn total(&self) -> usize {
        self.new + self.changed + self.unchanged + self.failed
    }
}

/// Record of a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub kind: RunKind,

    pub timestamp: DateTime<Utc>,

    pub journal: String,

    pub counts: RunCounts,

    /// Phase the run stopped in; `None` for a successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_report: Option<PathBuf>,
}

impl RunRecord {
    pub fn succeeded(
        kind: RunKind,
        journal: &str,
        counts: RunCounts,
        migration_report: Option<PathBuf>,
    ) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            journal: journal.to_string(),
            counts,
            failed_phase: None,
            migration_report,
        }
    }

    pub fn failed(kind: RunKind, journal: &str, phase: &str) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            journal: journal.to_string(),
            counts: RunCounts::default(),
            failed_phase: Some(phase.to_string()),
            migration_report: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_phase.is_none()
    }

    /// One-line description for the history listing
    pub fn summary(&self) -> String {
        let when = self.timestamp.format("%Y-%m-%d %H:%M:%S UTC");
        match &self.failed_phase {
            Some(phase) => format!(
                "{} run of '{}' at {} {}",
                self.kind.as_str(),
                self.journal,
                when,
                format!("failed during {phase}").red()
            ),
            None => format!(
                "{} run of '{}' at {} ({} new, {} changed, {} unchanged, {} failed)",
                self.kind.as_str(),
                self.journal,
                when,
                self.counts.new.to_string().green(),
                self.counts.changed.to_string().yellow(),
                self.counts.unchanged,
                self.counts.failed.to_string().red()
            ),
        }
    }
}

/// Manages run history with persistence to disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunHistory {
    /// List of run records, most recent first
    pub runs: Vec<RunRecord>,
}

impl RunHistory {
    fn history_file_path() -> Result<PathBuf> {
        crate::config::ConfigManager::run_history_path()
    }

    /// Load run history from a custom path
    /// Creates a new empty history if the file doesn't exist
    ///
    /// # Arguments
    /// * `path` - Optional custom path to load from. If None, uses default location.
    pub fn from_path(path: Option<PathBuf>) -> Result<Self> {
        let file_path = match path {
            Some(p) => p,
            None => Self::history_file_path()?,
        };

        if !file_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&file_path).with_context(|| {
            format!("Failed to read run history file from: {}", file_path.display())
        })?;

        serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse run history JSON from: {}", file_path.display())
        })
    }

    pub fn load() -> Result<Self> {
        Self::from_path(None)
    }

    /// Save run history to a custom path
    ///
    /// # Arguments
    /// * `path` - Optional custom path to save to. If None, uses default location.
    pub fn save_to(&self, path: Option<PathBuf>) -> Result<()> {
        let file_path = match path {
            Some(p) => p,
            None => Self::history_file_path()?,
        };

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize run history")?;

        fs::write(&file_path, content).with_context(|| {
            format!("Failed to write run history file to: {}", file_path.display())
        })?;

        Ok(())
    }

    /// Add a run record, dropping the oldest beyond MAX_HISTORY_SIZE
    pub fn add_run(&mut self, record: RunRecord) {
        self.runs.insert(0, record);
        self.runs.truncate(MAX_HISTORY_SIZE);
    }

    /// Load, append and save in one step
    pub fn append(path: Option<PathBuf>, record: RunRecord) -> Result<()> {
        let mut history = Self::from_path(path.clone())?;
        history.add_run(record);
        history.save_to(path)
    }

    pub fn last_run(&self) -> Option<&RunRecord> {
        self.runs.first()
    }

    pub fn last_successful_run(&self) -> Option<&RunRecord> {
        self.runs.iter().find(|r| r.is_success())
    }

    pub fn list_runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

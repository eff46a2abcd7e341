use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::entry::JournalEntry;

/// Marker that an entry has been turned into output content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    /// Entry's last-modified timestamp when it was processed
    pub last_modified: DateTime<Utc>,

    /// Post written for the entry, relative to the site root
    pub post_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub processed_at: DateTime<Utc>,
}

impl ProcessingRecord {
    pub fn for_entry(entry: &JournalEntry, post_path: PathBuf) -> Self {
        Self {
            last_modified: entry.modified_date,
            post_path,
            title: entry.title.clone(),
            processed_at: Utc::now(),
        }
    }
}

/// Outcome of comparing an entry against its processing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// No record exists for the entry
    New,
    /// A record exists but predates the entry's last modification
    Changed,
    /// The record is at least as recent as the entry
    Unchanged,
}

impl Classification {
    pub fn as_str(&self) -> &str {
        match self {
            Classification::New => "new",
            Classification::Changed => "changed",
            Classification::Unchanged => "unchanged",
        }
    }

    /// Whether the entry has to go through the content transform
    pub fn needs_processing(&self) -> bool {
        !matches!(self, Classification::Unchanged)
    }
}

/// Classify `entry` against the record left by a previous run
pub fn classify(entry: &JournalEntry, prior: Option<&ProcessingRecord>) -> Classification {
    match prior {
        None => Classification::New,
        Some(record) if record.last_modified >= entry.modified_date => Classification::Unchanged,
        Some(_) => Classification::Changed,
    }
}

/// Processing records keyed by entry identifier
///
/// Read once when a run starts and written at most once when it ends.
/// Records staged with [`ProcessedState::record`] mark the state dirty;
/// [`ProcessedState::save_if_dirty`] leaves the file alone otherwise, so a
/// run that changed nothing leaves it byte-for-byte intact.
#[derive(Debug, Clone, Default)]
pub struct ProcessedState {
    records: BTreeMap<String, ProcessingRecord>,
    dirty: bool,
}

impl ProcessedState {
    /// Load the state file, starting empty when it does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No processed state at {}, starting fresh", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read processed state from: {}", path.display()))?;

        let records: BTreeMap<String, ProcessingRecord> = serde_json::from_str(&content)
            .with_context(|| {
                format!("Failed to parse processed state JSON from: {}", path.display())
            })?;

        Ok(Self {
            records,
            dirty: false,
        })
    }

    /// Write the whole collection, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize processed state")?;
        write_atomic(path, &content)
    }

    /// Save only when records were staged since loading; returns whether it wrote
    pub fn save_if_dirty(&mut self, path: &Path) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.save(path)?;
        self.dirty = false;
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&ProcessingRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn classify(&self, entry: &JournalEntry) -> Classification {
        classify(entry, self.get(&entry.uuid))
    }

    /// Create or overwrite the record for `id`
    pub fn record(&mut self, id: impl Into<String>, record: ProcessingRecord) {
        self.records.insert(id.into(), record);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessingRecord)> {
        self.records.iter()
    }

    /// Most recent processing time across all records
    pub fn last_processed_at(&self) -> Option<DateTime<Utc>> {
        self.records.values().map(|r| r.processed_at).max()
    }
}

/// Write `content` next to `path` and rename it into place
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

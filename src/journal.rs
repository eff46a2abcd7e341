use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::entry::JournalEntry;
use crate::state::{write_atomic, ProcessedState};

/// Entry identifiers observed in one journal at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalSnapshot {
    pub journal: String,
    pub entry_ids: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

impl JournalSnapshot {
    pub fn from_entries(journal: &str, entries: &[JournalEntry]) -> Self {
        let mut seen = HashSet::new();
        let entry_ids = entries
            .iter()
            .filter(|e| seen.insert(e.uuid.as_str()))
            .map(|e| e.uuid.clone())
            .collect();

        Self {
            journal: journal.to_string(),
            entry_ids,
            captured_at: Utc::now(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entry_ids.iter().any(|e| e == id)
    }

    pub fn len(&self) -> usize {
        self.entry_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_ids.is_empty()
    }

    fn same_entries(&self, other: &JournalSnapshot) -> bool {
        let mine: HashSet<&String> = self.entry_ids.iter().collect();
        let theirs: HashSet<&String> = other.entry_ids.iter().collect();
        mine == theirs
    }
}

/// One entry that should be moved from the draft to the published journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationCandidate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl MigrationCandidate {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled")
    }
}

/// Batch of already-published entries still sitting in the draft journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<MigrationCandidate>,
}

impl MigrationRequest {
    fn new(entries: Vec<MigrationCandidate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            entries,
        }
    }

    pub fn entry_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the published-journal snapshot used for a pass came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishedSource {
    /// Observed in this run's export
    Live,
    /// Last snapshot persisted by an earlier run
    Persisted,
    /// No published snapshot at all
    Unavailable,
}

impl PublishedSource {
    pub fn as_str(&self) -> &str {
        match self {
            PublishedSource::Live => "live",
            PublishedSource::Persisted => "persisted",
            PublishedSource::Unavailable => "unavailable",
        }
    }
}

/// Everything one synchronization pass produced
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub draft: JournalSnapshot,
    pub published: Option<JournalSnapshot>,
    pub published_source: PublishedSource,
    /// `None` when no entry qualified
    pub migration: Option<MigrationRequest>,
}

/// Work out which processed entries still need to leave the draft journal
///
/// An entry qualifies when it is in the draft journal, has a processing
/// record, and is not in the published snapshot. Without a published
/// snapshot the last condition is skipped, which on a fresh setup can flag
/// entries that were never published through this tool.
pub fn synchronize(
    draft_journal: &str,
    draft_entries: &[JournalEntry],
    published: Option<(JournalSnapshot, PublishedSource)>,
    records: &ProcessedState,
) -> SyncResult {
    let draft = JournalSnapshot::from_entries(draft_journal, draft_entries);
    let (published, published_source) = match published {
        Some((snapshot, source)) => (Some(snapshot), source),
        None => (None, PublishedSource::Unavailable),
    };

    if published.is_none() {
        log::warn!(
            "Published journal snapshot unavailable, migration check relies on processing records only"
        );
    }

    let mut seen = HashSet::new();
    let candidates: Vec<MigrationCandidate> = draft_entries
        .iter()
        .filter(|e| seen.insert(e.uuid.as_str()))
        .filter(|e| records.contains(&e.uuid))
        .filter(|e| published.as_ref().map_or(true, |p| !p.contains(&e.uuid)))
        .map(|e| MigrationCandidate {
            id: e.uuid.clone(),
            title: e
                .title
                .clone()
                .or_else(|| records.get(&e.uuid).and_then(|r| r.title.clone())),
        })
        .collect();

    let migration = if candidates.is_empty() {
        None
    } else {
        log::info!("{} entries should move to the published journal", candidates.len());
        Some(MigrationRequest::new(candidates))
    };

    SyncResult {
        draft,
        published,
        published_source,
        migration,
    }
}

/// Last snapshot per journal plus the last reported migration, kept across runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStore {
    #[serde(default)]
    pub snapshots: BTreeMap<String, JournalSnapshot>,

    /// Entry ids of the most recently written migration report
    #[serde(default)]
    pub last_reported: Vec<String>,

    #[serde(skip)]
    dirty: bool,
}

impl SnapshotStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read journal snapshots from: {}", path.display()))?;

        serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse journal snapshots JSON from: {}", path.display())
        })
    }

    pub fn save_if_dirty(&mut self, path: &Path) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize journal snapshots")?;
        write_atomic(path, &content)?;
        self.dirty = false;
        Ok(true)
    }

    pub fn latest(&self, journal: &str) -> Option<&JournalSnapshot> {
        self.snapshots.get(&journal.to_lowercase())
    }

    /// Remember `snapshot` unless the stored one already has the same entries
    pub fn remember(&mut self, snapshot: &JournalSnapshot) {
        let key = snapshot.journal.to_lowercase();
        if self
            .snapshots
            .get(&key)
            .is_some_and(|stored| stored.same_entries(snapshot))
        {
            return;
        }
        self.snapshots.insert(key, snapshot.clone());
        self.dirty = true;
    }

    /// Whether the last written report covered exactly these entries
    pub fn already_reported(&self, request: &MigrationRequest) -> bool {
        let mut ids: Vec<&str> = request.entry_ids();
        ids.sort_unstable();
        let mut last: Vec<&str> = self.last_reported.iter().map(String::as_str).collect();
        last.sort_unstable();
        !last.is_empty() && ids == last
    }

    pub fn mark_reported(&mut self, request: &MigrationRequest) {
        self.last_reported = request.entries.iter().map(|e| e.id.clone()).collect();
        self.dirty = true;
    }

    /// Forget the last report once nothing is waiting to migrate
    pub fn clear_reported(&mut self) {
        if !self.last_reported.is_empty() {
            self.last_reported.clear();
            self.dirty = true;
        }
    }
}

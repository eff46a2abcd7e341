use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A photo or other attachment referenced by an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub identifier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// One journal entry ingested from an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// Identifier assigned by the journaling service, stable across exports
    pub uuid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub creation_date: DateTime<Utc>,

    /// Falls back to `creation_date` when the export omits it
    pub modified_date: DateTime<Utc>,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Journal the entry came from (empty when unknown)
    #[serde(default)]
    pub journal: String,
}

impl JournalEntry {
    /// Title if present, otherwise the identifier
    pub fn display_name(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.uuid,
        }
    }

    /// Whether this entry belongs to `journal_name`
    ///
    /// Case-insensitive substring match, since the label shown in the web
    /// interface and the exported field do not always agree.
    pub fn belongs_to(&self, journal_name: &str) -> bool {
        journal_matches(&self.journal, journal_name)
    }
}

/// Entry as it appears in the export's JSON document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEntry {
    uuid: String,
    #[serde(default)]
    title: Option<String>,
    creation_date: DateTime<Utc>,
    #[serde(default)]
    modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    rich_text: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    photos: Vec<RawPhoto>,
    #[serde(default)]
    journal: Option<String>,
    #[serde(default)]
    journal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    identifier: String,
    #[serde(default)]
    caption: Option<String>,
}

/// Top-level export document
///
/// Entries stay untyped here so one unreadable entry does not sink the
/// whole document.
#[derive(Debug, Deserialize)]
pub(crate) struct ExportDocument {
    #[serde(default)]
    pub entries: Vec<Value>,
}

/// An entry of the export that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// The entry's `uuid`, or its position in the document when it has none
    pub id: String,
    pub title: Option<String>,
    pub journal: String,
    pub reason: String,
}

impl RejectedEntry {
    pub fn display_name(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.id,
        }
    }

    pub fn belongs_to(&self, journal_name: &str) -> bool {
        journal_matches(&self.journal, journal_name)
    }
}

/// Read one entry of the export document
///
/// `index` is the entry's position, used to name entries without a `uuid`.
pub(crate) fn read_entry(
    value: Value,
    index: usize,
    member_journal: Option<&str>,
) -> Result<JournalEntry, RejectedEntry> {
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    let id = field("uuid").unwrap_or_else(|| format!("entry #{}", index + 1));
    let title = field("title");
    let journal = pick_journal(field("journal"), field("journalName"), member_journal);

    serde_json::from_value::<RawEntry>(value)
        .map(|raw| raw.into_entry(member_journal))
        .map_err(|e| RejectedEntry {
            id,
            title,
            journal,
            reason: e.to_string(),
        })
}

fn pick_journal(journal: Option<String>, journal_name: Option<String>, member: Option<&str>) -> String {
    journal
        .or(journal_name)
        .filter(|j| !j.is_empty())
        .or_else(|| member.map(str::to_string))
        .unwrap_or_default()
}

fn journal_matches(journal: &str, wanted: &str) -> bool {
    journal.to_lowercase().contains(&wanted.to_lowercase())
}

impl RawEntry {
    /// Convert into a `JournalEntry`, using `member_journal` when the entry
    /// carries no journal attribute of its own
    pub(crate) fn into_entry(self, member_journal: Option<&str>) -> JournalEntry {
        let journal = pick_journal(self.journal, self.journal_name, member_journal);

        JournalEntry {
            uuid: self.uuid,
            title: self.title,
            creation_date: self.creation_date,
            modified_date: self.modified_date.unwrap_or(self.creation_date),
            text: self.text.or(self.rich_text).unwrap_or_default(),
            tags: self.tags,
            attachments: self
                .photos
                .into_iter()
                .map(|p| Attachment {
                    identifier: p.identifier,
                    caption: p.caption,
                })
                .collect(),
            journal,
        }
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Phase;
use crate::journal::{MigrationCandidate, MigrationRequest};

const REPORT_PREFIX: &str = "migration-";
const ISSUE_SUFFIX: &str = ".issue.json";

const INSTRUCTIONS: &str = "These entries are already live on the site but still sit in the draft journal.\n\
Move each one to the published journal by hand:\n\n\
1. Open the entry in the journaling app.\n\
2. Use \"Move to Journal\" and pick the published journal.\n\
3. Close this notification once every entry has been moved.\n";

/// Durable record of one migration event
///
/// Built from a [`MigrationRequest`] and written once to its own file.
/// Reports are never merged or overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Identifier of the request the report was built from
    pub request_id: Uuid,

    pub generated_at: DateTime<Utc>,

    pub draft_journal: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_journal: Option<String>,

    /// Always the length of `entries`
    pub total_entries: usize,

    pub entries: Vec<MigrationCandidate>,
}

impl MigrationReport {
    pub fn generate(
        request: &MigrationRequest,
        draft_journal: &str,
        published_journal: Option<&str>,
    ) -> Self {
        Self {
            request_id: request.id,
            generated_at: Utc::now(),
            draft_journal: draft_journal.to_string(),
            published_journal: published_journal.map(str::to_string),
            total_entries: request.entries.len(),
            entries: request.entries.clone(),
        }
    }

    /// Human-facing rendering, one entry per line plus move instructions
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Journal Migration Required\n\n");
        output.push_str(&format!("**Request:** `{}`\n", self.request_id));
        output.push_str(&format!("**Generated:** {}\n", self.generated_at.to_rfc3339()));
        output.push_str(&format!(
            "**From:** {} **To:** {}\n",
            self.draft_journal,
            self.published_journal.as_deref().unwrap_or("published journal")
        ));
        output.push_str(&format!("**Entries:** {}\n\n", self.total_entries));

        output.push_str("## Entries\n\n");
        for entry in &self.entries {
            output.push_str(&format!("- {} (`{}`)\n", entry.display_title(), entry.id));
        }

        output.push_str("\n## Instructions\n\n");
        output.push_str(INSTRUCTIONS);
        output
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize migration report to JSON")
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=== Migration Report ===".bold().cyan());
        println!("{}: {}", "Request".bold(), self.request_id);
        println!("{}: {}", "Generated".bold(), self.generated_at.to_rfc3339());
        println!(
            "{}: {}",
            "Entries to move".bold(),
            self.total_entries.to_string().yellow()
        );

        for (i, entry) in self.entries.iter().enumerate() {
            println!(
                "  {}. {} {}",
                (i + 1).to_string().cyan(),
                entry.display_title(),
                format!("({})", entry.id).dimmed()
            );
        }
        println!();
    }

    /// Whether the report lists exactly the entries of `request`
    pub fn covers(&self, request: &MigrationRequest) -> bool {
        let mut listed: Vec<&str> = self.entries.iter().map(|e| e.id.as_str()).collect();
        let mut wanted = request.entry_ids();
        listed.sort_unstable();
        wanted.sort_unstable();
        listed == wanted
    }

    /// File stem shared by the report and its notification payload
    fn file_stem(&self) -> String {
        format!(
            "{}{}-{}",
            REPORT_PREFIX,
            self.generated_at.format("%Y%m%d-%H%M%S"),
            &self.request_id.simple().to_string()[..8]
        )
    }

    /// Write the report as a new file under `dir`
    ///
    /// Fails rather than overwrite when a file with the same name exists.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.json", self.file_stem()));
        create_new(&path, &self.to_json()?)?;
        Ok(path)
    }
}

/// Notification handed to an external issue tracker
///
/// Only the payload is built here; delivery happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl IssuePayload {
    pub fn migration(report: &MigrationReport) -> Self {
        Self {
            title: format!(
                "Move {} {} to the published journal",
                report.total_entries,
                if report.total_entries == 1 { "entry" } else { "entries" }
            ),
            body: report.to_markdown(),
            labels: vec!["journal-migration".to_string(), "automated".to_string()],
        }
    }

    pub fn entry_failure(entry_id: &str, title: &str, error: &anyhow::Error) -> Self {
        Self {
            title: format!("Processing error for entry: {title}"),
            body: format!(
                "Entry `{entry_id}` could not be processed and will be retried on the next run.\n\n```\n{error:#}\n```\n"
            ),
            labels: vec!["bug".to_string(), "automated".to_string()],
        }
    }

    pub fn run_failure(phase: Phase, error: &anyhow::Error) -> Self {
        Self {
            title: format!("Journal sync failed during {phase}"),
            body: format!(
                "The run stopped in the `{phase}` phase. Processed state was left untouched.\n\n```\n{error:#}\n```\n"
            ),
            labels: vec!["bug".to_string(), "automated".to_string()],
        }
    }

    /// Write the payload as `<stem>.issue.json` under `dir`
    pub fn save(&self, dir: &Path, stem: &str) -> Result<PathBuf> {
        let path = dir.join(format!("{stem}{ISSUE_SUFFIX}"));
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize issue payload")?;
        create_new(&path, &content)?;
        Ok(path)
    }

    /// Payload for a migration report, stored next to it
    pub fn save_for_report(&self, report: &MigrationReport, dir: &Path) -> Result<PathBuf> {
        self.save(dir, &report.file_stem())
    }

    /// Stem for a failure payload that does not belong to a report
    pub fn failure_stem(kind: &str) -> String {
        format!(
            "{}-{}-{}",
            kind,
            Utc::now().format("%Y%m%d-%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        )
    }
}

fn create_new(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}

/// Migration reports under `dir`, newest first
pub fn list_reports(dir: &Path) -> Result<Vec<(PathBuf, MigrationReport)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut reports = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read report directory: {}", dir.display()))?
    {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(REPORT_PREFIX) || !name.ends_with(".json") || name.ends_with(ISSUE_SUFFIX)
        {
            continue;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read report from {}", path.display()))?;
        match serde_json::from_str::<MigrationReport>(&content) {
            Ok(report) => reports.push((path, report)),
            Err(e) => log::warn!("Skipping unreadable report {}: {}", path.display(), e),
        }
    }

    reports.sort_by(|a, b| b.1.generated_at.cmp(&a.1.generated_at));
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request() -> MigrationRequest {
        MigrationRequest {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            entries: vec![
                MigrationCandidate {
                    id: "A1".to_string(),
                    title: Some("First post".to_string()),
                },
                MigrationCandidate {
                    id: "B2".to_string(),
                    title: None,
                },
            ],
        }
    }

    #[test]
    fn test_generate_copies_request() {
        let request = request();
        let report = MigrationReport::generate(&request, "Blog Public", Some("Blog Published"));
        assert_eq!(report.request_id, request.id);
        assert_eq!(report.total_entries, 2);
        assert_eq!(report.entries, request.entries);
    }

    #[test]
    fn test_markdown_lists_title_and_id_per_line() {
        let report = MigrationReport::generate(&request(), "Blog Public", None);
        let markdown = report.to_markdown();

        assert!(markdown.contains("# Journal Migration Required"));
        assert!(markdown.contains("- First post (`A1`)"));
        assert!(markdown.contains("- Untitled (`B2`)"));
        assert!(markdown.contains("**Entries:** 2"));
        assert!(markdown.contains("Move to Journal"));
    }

    #[test]
    fn test_save_is_append_only() {
        let temp = TempDir::new().unwrap();
        let report = MigrationReport::generate(&request(), "Blog Public", None);

        let path = report.save(temp.path()).unwrap();
        assert!(path.exists());
        assert!(report.save(temp.path()).is_err());

        let second = MigrationReport::generate(&request(), "Blog Public", None);
        let other = second.save(temp.path()).unwrap();
        assert_ne!(path, other);
        assert_eq!(list_reports(temp.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_payload_is_saved_next_to_report() {
        let temp = TempDir::new().unwrap();
        let report = MigrationReport::generate(&request(), "Blog Public", None);
        report.save(temp.path()).unwrap();

        let payload = IssuePayload::migration(&report);
        assert_eq!(payload.title, "Move 2 entries to the published journal");
        let path = payload.save_for_report(&report, temp.path()).unwrap();
        assert!(path.to_string_lossy().ends_with(".issue.json"));

        // Payload files are not reports
        let reports = list_reports(temp.path()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1.request_id, report.request_id);
    }

    #[test]
    fn test_failure_payloads() {
        let err = anyhow::anyhow!("disk full");
        let entry = IssuePayload::entry_failure("A1", "First post", &err);
        assert_eq!(entry.title, "Processing error for entry: First post");
        assert!(entry.body.contains("disk full"));

        let run = IssuePayload::run_failure(Phase::Extract, &err);
        assert!(run.title.contains("extract"));
        assert!(IssuePayload::failure_stem("run-failure").starts_with("run-failure-"));
    }

    #[test]
    fn test_list_reports_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(list_reports(&temp.path().join("none")).unwrap().is_empty());
    }
}

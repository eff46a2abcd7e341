use anyhow::{anyhow, Context};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::archive;
use crate::browser::BrowserSession;
use crate::credentials::{Credentials, RunConfig};
use crate::error::{ExportError, Phase};
use crate::export::{self, ExportOptions};
use crate::history::RunCounts;
use crate::journal::{
    self, JournalSnapshot, MigrationRequest, PublishedSource, SnapshotStore, SyncResult,
};
use crate::report::{list_reports, IssuePayload, MigrationReport};
use crate::settings::{SitePaths, Settings};
use crate::state::{Classification, ProcessedState, ProcessingRecord};
use crate::transform::EntryTransformer;

/// What a run works on, resolved once at startup
#[derive(Debug, Clone)]
pub struct RunContext {
    pub paths: SitePaths,
    pub draft_journal: String,
    pub published_journal: Option<String>,
}

impl RunContext {
    /// The environment's published journal wins over the config file's
    pub fn new(paths: SitePaths, config: &RunConfig, settings: &Settings) -> Self {
        Self {
            paths,
            draft_journal: config.draft_journal.clone(),
            published_journal: config
                .published_journal
                .clone()
                .or_else(|| settings.published_journal.clone()),
        }
    }
}

/// A run that stopped before committing any state
#[derive(Debug, Error)]
#[error("Run failed during {phase}")]
pub struct RunError {
    pub phase: Phase,
    #[source]
    pub source: anyhow::Error,
}

impl RunError {
    pub fn new(phase: Phase, source: impl Into<anyhow::Error>) -> Self {
        Self {
            phase,
            source: source.into(),
        }
    }

    /// Whether re-running may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        self.source
            .downcast_ref::<ExportError>()
            .map_or(true, ExportError::is_retryable)
    }
}

/// One entry that failed to process; the rest of the run carries on
pub struct EntryFailure {
    pub id: String,
    pub title: String,
    pub error: anyhow::Error,
}

impl fmt::Debug for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryFailure")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("error", &format!("{:#}", self.error))
            .finish()
    }
}

/// An entry written during the run
#[derive(Debug, Clone)]
pub struct ProcessedEntry {
    pub id: String,
    pub title: String,
    pub classification: Classification,
    pub post_path: PathBuf,
}

/// Outcome of a successful run
#[derive(Debug)]
pub struct RunSummary {
    pub archive: PathBuf,
    pub counts: RunCounts,
    pub processed: Vec<ProcessedEntry>,
    pub failures: Vec<EntryFailure>,
    pub sync: SyncResult,
    /// Report written this run
    pub report: Option<PathBuf>,
    /// A migration was due but the last report already covers it
    pub report_suppressed: bool,
    pub state_written: bool,
}

/// Export the draft journal through `session`, then process the archive
///
/// The captured archive is removed from the scratch directory once the run
/// succeeds. On failure it stays for inspection.
pub async fn run_pipeline<S>(
    session: &S,
    options: &ExportOptions,
    credentials: &Credentials,
    ctx: &RunContext,
    transformer: &dyn EntryTransformer,
) -> Result<RunSummary, RunError>
where
    S: BrowserSession + ?Sized,
{
    log::info!("Exporting journal '{}'", ctx.draft_journal);
    let archive = export::export_journal(session, options, credentials, &ctx.draft_journal)
        .await
        .map_err(|e| RunError::new(Phase::Export, e))?;

    let summary = process_archive(&archive, ctx, transformer)?;

    if export::is_scratch_artifact(&archive, &ctx.paths.scratch_dir) {
        match export::clean_scratch_dir(&ctx.paths.scratch_dir) {
            Ok(removed) => log::debug!("Removed {removed} scratch files"),
            Err(e) => log::warn!("Could not clean scratch directory: {e:#}"),
        }
    }

    Ok(summary)
}

/// Classify, transform, synchronize and report on an archive already on disk
///
/// Processed state and journal snapshots are written once, at the end, and
/// only when something changed. Any error before that leaves both files as
/// they were. A migration report is written before either, and a later run
/// recognises it when the snapshots recording it were never saved.
pub fn process_archive(
    archive_path: &Path,
    ctx: &RunContext,
    transformer: &dyn EntryTransformer,
) -> Result<RunSummary, RunError> {
    let paths = &ctx.paths;

    let extraction = archive::read_journal(archive_path, &ctx.draft_journal)
        .map_err(|e| RunError::new(Phase::Extract, e))?;
    let entries = extraction.entries;

    let mut state = ProcessedState::load(&paths.state_file)
        .map_err(|e| RunError::new(Phase::Process, e))?;
    let mut store = SnapshotStore::load(&paths.snapshot_file)
        .map_err(|e| RunError::new(Phase::Synchronize, e))?;

    let mut counts = RunCounts::default();
    let mut processed = Vec::new();
    let mut failures = Vec::new();

    for rejected in &extraction.rejected {
        counts.failed += 1;
        let error = anyhow!("unreadable entry: {}", rejected.reason);
        failures.push(report_entry_failure(
            &rejected.id,
            rejected.display_name(),
            error,
            &paths.reports_dir,
        ));
    }

    for entry in &entries {
        let classification = state.classify(entry);
        if !classification.needs_processing() {
            log::debug!("Skipping unchanged entry: {}", entry.display_name());
            counts.unchanged += 1;
            continue;
        }

        log::info!(
            "Processing {} entry: {}",
            classification.as_str(),
            entry.display_name()
        );
        match transformer.transform(entry) {
            Ok(post_path) => {
                state.record(
                    entry.uuid.clone(),
                    ProcessingRecord::for_entry(entry, post_path.clone()),
                );
                match classification {
                    Classification::New => counts.new += 1,
                    _ => counts.changed += 1,
                }
                processed.push(ProcessedEntry {
                    id: entry.uuid.clone(),
                    title: entry.display_name().to_string(),
                    classification,
                    post_path,
                });
            }
            Err(error) => {
                log::error!("Failed to process {}: {:#}", entry.display_name(), error);
                counts.failed += 1;
                failures.push(report_entry_failure(
                    &entry.uuid,
                    entry.display_name(),
                    error,
                    &paths.reports_dir,
                ));
            }
        }
    }

    // Entries published by this run count as live for migration
    let published = published_snapshot(archive_path, ctx, &store);
    let sync = journal::synchronize(&ctx.draft_journal, &entries, published, &state);

    let mut report = None;
    let mut report_suppressed = false;
    match &sync.migration {
        Some(request) if store.already_reported(request) => {
            log::info!(
                "Migration of {} entries was already reported, not writing a new report",
                request.len()
            );
            report_suppressed = true;
        }
        Some(request) if latest_report_covers(&paths.reports_dir, request) => {
            // Written by a run that failed before saving its snapshots
            log::info!(
                "Latest migration report already lists these {} entries",
                request.len()
            );
            store.mark_reported(request);
            report_suppressed = true;
        }
        Some(request) => {
            let generated = MigrationReport::generate(
                request,
                &ctx.draft_journal,
                ctx.published_journal.as_deref(),
            );
            let path = generated
                .save(&paths.reports_dir)
                .map_err(|e| RunError::new(Phase::Report, e))?;
            IssuePayload::migration(&generated)
                .save_for_report(&generated, &paths.reports_dir)
                .map_err(|e| RunError::new(Phase::Report, e))?;
            log::info!("Migration report written to {}", path.display());
            store.mark_reported(request);
            report = Some(path);
        }
        None => store.clear_reported(),
    }

    store.remember(&sync.draft);
    if let (Some(published), PublishedSource::Live) = (&sync.published, sync.published_source) {
        store.remember(published);
    }

    let state_written = state
        .save_if_dirty(&paths.state_file)
        .map_err(|e| RunError::new(Phase::Process, e))?;
    store
        .save_if_dirty(&paths.snapshot_file)
        .map_err(|e| RunError::new(Phase::Synchronize, e))?;

    Ok(RunSummary {
        archive: archive_path.to_path_buf(),
        counts,
        processed,
        failures,
        sync,
        report,
        report_suppressed,
        state_written,
    })
}

/// Published journal as seen in this archive, else as last persisted
fn published_snapshot(
    archive_path: &Path,
    ctx: &RunContext,
    store: &SnapshotStore,
) -> Option<(JournalSnapshot, PublishedSource)> {
    let name = ctx.published_journal.as_deref()?;

    match archive::extract(archive_path, name) {
        Ok(entries) if !entries.is_empty() => {
            return Some((JournalSnapshot::from_entries(name, &entries), PublishedSource::Live));
        }
        Ok(_) => log::debug!("Archive holds no entries from '{name}'"),
        Err(e) => log::debug!("Could not read '{name}' from the archive: {e}"),
    }

    store.latest(name).map(|snapshot| {
        log::info!(
            "Using published snapshot of '{}' from {}",
            name,
            snapshot.captured_at.format("%Y-%m-%d %H:%M")
        );
        (snapshot.clone(), PublishedSource::Persisted)
    })
}

/// Whether the newest report on disk lists exactly `request`'s entries
fn latest_report_covers(reports_dir: &Path, request: &MigrationRequest) -> bool {
    match list_reports(reports_dir) {
        Ok(reports) => reports
            .first()
            .is_some_and(|(_, report)| report.covers(request)),
        Err(e) => {
            log::warn!("Could not read earlier migration reports: {e:#}");
            false
        }
    }
}

fn report_entry_failure(
    id: &str,
    title: &str,
    error: anyhow::Error,
    reports_dir: &Path,
) -> EntryFailure {
    let payload = IssuePayload::entry_failure(id, title, &error);
    if let Err(e) = payload.save(reports_dir, &IssuePayload::failure_stem("entry-failure")) {
        log::warn!("Could not write failure notification: {e:#}");
    }

    EntryFailure {
        id: id.to_string(),
        title: title.to_string(),
        error,
    }
}

/// Write a notification payload for a failed run; best-effort
pub fn report_run_failure(paths: &SitePaths, error: &RunError) -> Option<PathBuf> {
    let source = anyhow!("{:#}", error.source);
    let payload = IssuePayload::run_failure(error.phase, &source);
    payload
        .save(&paths.reports_dir, &IssuePayload::failure_stem("run-failure"))
        .context("Failed to write run failure notification")
        .map_err(|e| log::warn!("{e:#}"))
        .ok()
}

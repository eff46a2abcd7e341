//! Run, export and process command handlers
//!
//! These drive the pipeline, print what happened, and leave a record in the
//! run history and the persistent log whether the run succeeds or not.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use journal_sync::browser::{ChromiumSession, LaunchOptions};
use journal_sync::credentials::RunConfig;
use journal_sync::error::Phase;
use journal_sync::export::{self, ExportOptions};
use journal_sync::history::{RunCounts, RunHistory, RunKind, RunRecord};
use journal_sync::logger;
use journal_sync::pipeline::{self, RunContext, RunError, RunSummary};
use journal_sync::settings::Settings;
use journal_sync::transform::MarkdownPostWriter;

/// Handle the full export-and-process run
pub async fn handle_run(site_root: &Path) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let config = RunConfig::from_env();
    let credentials = config.require_credentials()?;
    let ctx = RunContext::new(settings.paths.resolve(site_root), &config, &settings);
    let options = ExportOptions::new(&settings.automation, &settings.selectors, &ctx.paths);
    let writer = MarkdownPostWriter::new(&ctx.paths.root, &ctx.paths.posts_dir);

    println!(
        "{} {}",
        "Syncing journal".cyan().bold(),
        ctx.draft_journal.bold()
    );

    let session = match ChromiumSession::launch(&launch_options(&settings, &config)).await {
        Ok(session) => session,
        Err(e) => return finish(RunKind::Export, &ctx, Err(RunError::new(Phase::Export, e))),
    };

    let result = pipeline::run_pipeline(&session, &options, credentials, &ctx, &writer).await;

    if let Err(e) = session.close().await {
        log::warn!("{e:#}");
    }

    finish(RunKind::Export, &ctx, result)
}

/// Handle export only; the archive is left in the scratch directory
pub async fn handle_export(site_root: &Path) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let config = RunConfig::from_env();
    let credentials = config.require_credentials()?;
    let paths = settings.paths.resolve(site_root);
    let options = ExportOptions::new(&settings.automation, &settings.selectors, &paths);

    println!(
        "{} {}",
        "Exporting journal".cyan().bold(),
        config.draft_journal.bold()
    );

    let session = ChromiumSession::launch(&launch_options(&settings, &config)).await?;
    let result =
        export::export_journal(&session, &options, credentials, &config.draft_journal).await;

    if let Err(e) = session.close().await {
        log::warn!("{e:#}");
    }

    let archive = result.with_context(|| format!("Export of '{}' failed", config.draft_journal))?;
    println!(
        "{} {}",
        "Archive saved to:".green().bold(),
        archive.display().to_string().cyan()
    );
    println!(
        "  Process it with: journal-sync process --archive {}",
        archive.display()
    );

    Ok(())
}

/// Handle processing of an archive already on disk
pub fn handle_process(site_root: &Path, archive: &Path) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let config = RunConfig::from_env();
    let ctx = RunContext::new(settings.paths.resolve(site_root), &config, &settings);
    let writer = MarkdownPostWriter::new(&ctx.paths.root, &ctx.paths.posts_dir);

    if !archive.exists() {
        anyhow::bail!("Archive not found: {}", archive.display());
    }

    println!(
        "{} {} {}",
        "Processing".cyan().bold(),
        archive.display(),
        format!("(journal '{}')", ctx.draft_journal).dimmed()
    );

    let result = pipeline::process_archive(archive, &ctx, &writer);
    finish(RunKind::Offline, &ctx, result)
}

fn launch_options(settings: &Settings, config: &RunConfig) -> LaunchOptions {
    LaunchOptions {
        executable: config
            .chrome_executable
            .clone()
            .or_else(|| settings.automation.chrome_executable.clone()),
    }
}

/// Print the outcome and record it in history and the log file
fn finish(kind: RunKind, ctx: &RunContext, result: Result<RunSummary, RunError>) -> Result<()> {
    match result {
        Ok(summary) => {
            print_summary(&summary);
            let counts = summary.counts;
            logger::log_to_file(&format!(
                "{} run of '{}' completed: {}",
                kind.as_str(),
                ctx.draft_journal,
                describe_counts(&counts)
            ))
            .unwrap_or_else(|e| log::warn!("{e:#}"));
            record_history(RunRecord::succeeded(
                kind,
                &ctx.draft_journal,
                counts,
                summary.report,
            ));
            Ok(())
        }
        Err(err) => {
            println!(
                "\n{} {}",
                "✗".red().bold(),
                format!("Run failed during {}: {:#}", err.phase, err.source).red()
            );
            if err.is_retryable() {
                println!("  {}", "Re-running may succeed; state was left untouched.".yellow());
            } else {
                println!("  {}", "Needs investigation before re-running.".yellow());
            }
            if let Some(payload) = pipeline::report_run_failure(&ctx.paths, &err) {
                println!("  Notification payload: {}", payload.display());
            }

            logger::log_to_file(&format!(
                "{} run of '{}' failed during {}: {:#}",
                kind.as_str(),
                ctx.draft_journal,
                err.phase,
                err.source
            ))
            .unwrap_or_else(|e| log::warn!("{e:#}"));
            record_history(RunRecord::failed(kind, &ctx.draft_journal, err.phase.as_str()));

            Err(err.into())
        }
    }
}

fn record_history(record: RunRecord) {
    if let Err(e) = RunHistory::append(None, record) {
        log::warn!("Could not update run history: {e:#}");
    }
}

fn describe_counts(counts: &RunCounts) -> String {
    format!(
        "{} new, {} changed, {} unchanged, {} failed",
        counts.new, counts.changed, counts.unchanged, counts.failed
    )
}

fn print_summary(summary: &RunSummary) {
    let counts = &summary.counts;

    println!("\n{}", "✓ Run complete".green().bold());
    println!(
        "  {} {}  {} {}  {} {}  {} {}",
        "New:".bold(),
        counts.new.to_string().green(),
        "Changed:".bold(),
        counts.changed.to_string().yellow(),
        "Unchanged:".bold(),
        counts.unchanged,
        "Failed:".bold(),
        counts.failed.to_string().red()
    );

    for entry in &summary.processed {
        println!(
            "    {} {} → {}",
            format!("[{}]", entry.classification.as_str()).dimmed(),
            entry.title,
            entry.post_path.display()
        );
    }

    if !summary.failures.is_empty() {
        println!("\n{}", "Failed entries (retried next run):".red().bold());
        for failure in &summary.failures {
            println!("  - {} ({}): {:#}", failure.title, failure.id, failure.error);
        }
    }

    match (&summary.sync.migration, &summary.report) {
        (Some(request), Some(path)) => {
            println!(
                "\n{} {} entries should move to the published journal",
                "Migration:".yellow().bold(),
                request.len()
            );
            for entry in &request.entries {
                println!("  - {} ({})", entry.display_title(), entry.id);
            }
            println!("  Report: {}", path.display().to_string().cyan());
        }
        (Some(request), None) if summary.report_suppressed => {
            println!(
                "\n{} {} entries still waiting to move (already reported)",
                "Migration:".yellow().bold(),
                request.len()
            );
        }
        _ => println!("\n{}", "No entries need to move journals.".green()),
    }

    if !summary.state_written {
        println!("{}", "Processed state unchanged.".dimmed());
    }
}

//! Status command handler

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use journal_sync::credentials::RunConfig;
use journal_sync::history::RunHistory;
use journal_sync::journal::SnapshotStore;
use journal_sync::report;
use journal_sync::settings::Settings;
use journal_sync::state::ProcessedState;

/// Show processed entries, journal snapshots, pending migrations and the last run
pub fn handle_status(site_root: &Path) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let config = RunConfig::from_env();
    let paths = settings.paths.resolve(site_root);

    println!("{}", "Journal Sync Status".cyan().bold());
    println!("{}", "=".repeat(80).cyan());

    println!("\n{}", "Configuration:".bold());
    println!("  {} {}", "Site root:".dimmed(), paths.root.display());
    println!("  {} {}", "Draft journal:".dimmed(), config.draft_journal);
    println!(
        "  {} {}",
        "Published journal:".dimmed(),
        config
            .published_journal
            .as_deref()
            .or(settings.published_journal.as_deref())
            .unwrap_or("(not set)")
    );
    println!(
        "  {} {}",
        "Credentials:".dimmed(),
        if config.credentials.is_some() {
            "set".green()
        } else {
            "missing".red()
        }
    );

    let state = ProcessedState::load(&paths.state_file)?;
    println!("\n{}", "Processed entries:".bold());
    println!("  {} {}", "Count:".dimmed(), state.len());
    match state.last_processed_at() {
        Some(at) => println!(
            "  {} {}",
            "Last processed:".dimmed(),
            at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("  {}", "Nothing processed yet".yellow()),
    }

    let store = SnapshotStore::load(&paths.snapshot_file)?;
    if !store.snapshots.is_empty() {
        println!("\n{}", "Journal snapshots:".bold());
        for snapshot in store.snapshots.values() {
            println!(
                "  {} {} entries, captured {}",
                format!("{}:", snapshot.journal).dimmed(),
                snapshot.len(),
                snapshot.captured_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    let reports = report::list_reports(&paths.reports_dir)?;
    println!("\n{}", "Migration reports:".bold());
    println!("  {} {}", "Written:".dimmed(), reports.len());
    if store.last_reported.is_empty() {
        println!("  {}", "No migration pending".green());
    } else {
        println!(
            "  {} {} entries",
            "Pending:".yellow(),
            store.last_reported.len()
        );
        if let Some((path, _)) = reports.first() {
            println!("  {} {}", "Latest report:".dimmed(), path.display());
        }
    }

    match RunHistory::load() {
        Ok(history) => {
            if let Some(run) = history.last_run() {
                println!("\n{}", "Last run:".bold());
                println!("  {}", run.summary());
            }
        }
        Err(e) => log::warn!("Could not read run history: {e:#}"),
    }

    Ok(())
}

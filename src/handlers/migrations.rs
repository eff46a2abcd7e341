//! Migration report command handler

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use journal_sync::report;
use journal_sync::settings::Settings;

/// List migration reports, newest first, or print the latest one in full
pub fn handle_migrations(site_root: &Path, limit: usize, show_latest: bool) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let paths = settings.paths.resolve(site_root);
    let reports = report::list_reports(&paths.reports_dir)?;

    if reports.is_empty() {
        println!("{}", "No migration reports.".yellow());
        return Ok(());
    }

    if show_latest {
        let (path, latest) = &reports[0];
        latest.print_summary();
        println!("{} {}", "Report file:".dimmed(), path.display());
        return Ok(());
    }

    println!("{}", "Migration Reports".cyan().bold());
    println!("{}", "=".repeat(80).cyan());

    let display_count = reports.len().min(limit);
    for (idx, (path, report)) in reports.iter().take(display_count).enumerate() {
        println!(
            "\n{} {} {}",
            format!("{}.", idx + 1).bold(),
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            format!("({} entries)", report.total_entries).yellow()
        );
        for entry in &report.entries {
            println!("   - {} {}", entry.display_title(), format!("({})", entry.id).dimmed());
        }
        println!("   {} {}", "File:".dimmed(), path.display());
    }

    if reports.len() > display_count {
        println!(
            "\n{} Showing {} of {} reports",
            "Note:".yellow(),
            display_count,
            reports.len()
        );
    }

    Ok(())
}

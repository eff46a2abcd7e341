//! History command handler
//!
//! Lists recent runs with their entry counts and any migration report they wrote.

use anyhow::{Context, Result};
use colored::Colorize;

use journal_sync::history::RunHistory;

/// Handle history list command
pub fn handle_history_list(limit: usize) -> Result<()> {
    let history = RunHistory::load().context("Failed to load run history")?;

    if history.is_empty() {
        println!("{}", "No runs in history.".yellow());
        return Ok(());
    }

    println!("{}", "Run History".cyan().bold());
    println!("{}", "=".repeat(80).cyan());

    let runs = history.list_runs();
    let display_count = runs.len().min(limit);

    for (idx, run) in runs.iter().take(display_count).enumerate() {
        let status = if run.is_success() {
            "OK".green()
        } else {
            "FAILED".red()
        };

        println!(
            "\n{} {} {}",
            format!("{}.", idx + 1).bold(),
            status.bold(),
            run.kind.as_str().to_uppercase().blue()
        );
        println!("   {}", run.summary());

        if let Some(report) = &run.migration_report {
            println!("   {} {}", "Migration report:".dimmed(), report.display());
        }
    }

    if runs.len() > display_count {
        println!(
            "\n{} Showing {} of {} runs",
            "Note:".yellow(),
            display_count,
            runs.len()
        );
    }

    Ok(())
}

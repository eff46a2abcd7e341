//! Configuration command handlers

use anyhow::{Context, Result};
use colored::Colorize;

use journal_sync::config::ConfigManager;
use journal_sync::credentials::{self, RunConfig};
use journal_sync::settings::Settings;

/// Print the effective settings and which environment variables are set
pub fn handle_config_show() -> Result<()> {
    let path = ConfigManager::settings_path()?;
    let settings = Settings::load_from(&path)?;
    let config = RunConfig::from_env();

    println!("{}", "Current Configuration".cyan().bold());
    println!("{}", "=".repeat(80).cyan());
    println!(
        "{} {} {}",
        "Config file:".bold(),
        path.display(),
        if path.exists() {
            "".normal()
        } else {
            "(not created, using defaults)".dimmed()
        }
    );

    println!("\n{}", "Environment:".bold());
    let set = |present: bool| if present { "set".green() } else { "not set".yellow() };
    let has_credentials = config.credentials.is_some();
    println!("  {} {}", credentials::EMAIL_VAR.dimmed(), set(has_credentials));
    println!("  {} {}", credentials::PASSWORD_VAR.dimmed(), set(has_credentials));
    println!("  {} {}", credentials::JOURNAL_VAR.dimmed(), config.draft_journal);
    println!(
        "  {} {}",
        credentials::PUBLISHED_JOURNAL_VAR.dimmed(),
        config.published_journal.as_deref().unwrap_or("(not set)")
    );

    println!("\n{}", "Settings:".bold());
    let rendered = toml::to_string_pretty(&settings).context("Failed to render settings")?;
    println!("{rendered}");

    Ok(())
}

/// Write the default settings file so selectors and timeouts can be edited
pub fn handle_config_init() -> Result<()> {
    let path = ConfigManager::settings_path()?;
    if path.exists() {
        println!(
            "{} {}",
            "Config file already exists:".yellow(),
            path.display()
        );
        return Ok(());
    }

    ConfigManager::ensure_config_dir()?;
    Settings::default().save_to(&path)?;
    println!(
        "{} {}",
        "Wrote default configuration to".green().bold(),
        path.display().to_string().cyan()
    );

    Ok(())
}

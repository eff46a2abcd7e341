mod handlers;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "journal-sync")]
#[command(about = "Export journal entries, publish new ones as posts, and track journal migrations", long_about = None)]
#[command(version)]
struct Cli {
    /// Site root holding posts/, data/ and temp/ (default: current directory)
    #[arg(long, global = true)]
    site_root: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the draft journal, process new and changed entries, and report migrations
    Run,

    /// Export the draft journal and keep the archive without processing it
    Export,

    /// Process an archive that is already on disk
    Process {
        /// Export archive (.zip or .json)
        #[arg(short, long)]
        archive: PathBuf,
    },

    /// Show processed entries, journal snapshots and pending migrations
    Status,

    /// List migration reports
    Migrations {
        /// Maximum number of reports to list
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print the latest report in full
        #[arg(long)]
        latest: bool,
    },

    /// Show recent runs
    History {
        /// Maximum number of runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Write the default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    let level = if cli.verbose {
        Some(LevelFilter::Debug)
    } else if cli.quiet {
        Some(LevelFilter::Warn)
    } else {
        None
    };
    journal_sync::logger::init_logger(level)?;

    let site_root = match cli.site_root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    match cli.command {
        Commands::Run => handlers::handle_run(&site_root).await?,
        Commands::Export => handlers::handle_export(&site_root).await?,
        Commands::Process { archive } => handlers::handle_process(&site_root, &archive)?,
        Commands::Status => handlers::handle_status(&site_root)?,
        Commands::Migrations { limit, latest } => {
            handlers::handle_migrations(&site_root, limit, latest)?
        }
        Commands::History { limit } => handlers::handle_history_list(limit)?,
        Commands::Config { show, init } => {
            if init {
                handlers::handle_config_init()?;
            }
            if show || !init {
                handlers::handle_config_show()?;
            }
        }
    }

    Ok(())
}

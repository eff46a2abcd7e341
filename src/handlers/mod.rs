//! Command handler modules
//!
//! This module contains the command handler functions called from main.rs,
//! organized by functionality area.

pub mod config;
pub mod history;
pub mod migrations;
pub mod run;
pub mod status;

pub use config::{handle_config_init, handle_config_show};
pub use history::handle_history_list;
pub use migrations::handle_migrations;
pub use run::{handle_export, handle_process, handle_run};
pub use status::handle_status;

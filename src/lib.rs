//! # journal-sync
//!
//! A command-line tool that turns a journaling service's export into blog posts,
//! incrementally, and keeps track of which published entries still need to be
//! moved from the draft journal to the published one.
//!
//! ## Overview
//!
//! Each run logs in to the service with a headless browser, exports the draft
//! journal, and reads the entries out of the captured archive. Entries that are
//! new or were modified since they were last processed are written as Markdown
//! posts; everything else is skipped. Entries that already became posts but
//! still sit in the draft journal are collected into a migration report, since
//! moving an entry between journals can only be done by hand.
//!
//! ## Key Features
//!
//! - **Resilient automation**: every UI step is a ranked list of fallback locators
//! - **Incremental processing**: only new or changed entries are transformed
//! - **Crash safety**: processed state is written once per run, atomically
//! - **Migration tracking**: append-only reports with ready-to-file issue payloads
//! - **Offline mode**: process an archive that is already on disk
//!
//! ## Architecture
//!
//! - Configuration ([`config`], [`settings`], [`credentials`])
//! - Browser automation ([`selector`], [`browser`], [`export`])
//! - Archive reading ([`archive`], [`entry`])
//! - Incremental processing ([`state`], [`transform`])
//! - Journal synchronization and reporting ([`journal`], [`report`])
//! - Run orchestration and bookkeeping ([`pipeline`], [`history`], [`logger`])

/// Reading journal entries out of an export archive.
///
/// Accepts either a bare JSON document or a zip holding one, and keeps only
/// the entries whose journal name contains the requested journal.
pub mod archive;

/// Browser session port and its Chromium adapter.
///
/// The export driver talks to the browser only through the [`browser::BrowserSession`]
/// trait, so it can be exercised against a scripted session in tests.
pub mod browser;

/// Platform-agnostic configuration directory management.
///
/// Locates the config file, run history, and log file following platform
/// conventions (XDG on Linux, Application Support on macOS, AppData on Windows).
pub mod config;

/// Credentials and journal names taken from the process environment.
pub mod credentials;

/// Journal entry model and the export's JSON document format.
pub mod entry;

/// Typed failures of the export and extraction phases.
pub mod error;

/// Browser-driven export of a journal.
///
/// Logs in, selects the journal, opens the export surface and captures the
/// resulting archive, either from the network response or from the download
/// directory. Every failed step leaves a page snapshot for offline debugging.
pub mod export;

/// Rolling history of recent runs.
pub mod history;

/// Three-journal synchronization.
///
/// Compares the draft journal against processing records and the published
/// journal to decide which entries should be moved, and remembers the last
/// snapshot of each journal across runs.
pub mod journal;

/// Logging configuration and utilities.
///
/// Sets up console logging (configurable via `RUST_LOG` or `--verbose`) and a
/// persistent log file in the config directory with size-based rotation.
pub mod logger;

/// Run orchestration: export, extract, process, synchronize and report.
pub mod pipeline;

/// Migration reports and notification payloads.
///
/// Reports are written append-only, one file per migration event, with an
/// issue payload next to each for an external tracker to pick up.
pub mod report;

/// Ranked fallback locators for UI steps.
///
/// Locator lists are plain data with built-in defaults that the config file
/// can override per step.
pub mod selector;

/// Settings loaded from `config.toml`.
pub mod settings;

/// Processing records and the new/changed/unchanged classification.
pub mod state;

/// Content transform that writes entries as Markdown posts.
pub mod transform;

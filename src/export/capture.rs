use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use crate::browser::{BrowserSession, ResponseEvent};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Files modified this long before the export was triggered are still accepted
const SCAN_CLOCK_SLACK: Duration = Duration::from_secs(2);

/// Why the network-capture path produced nothing
#[derive(Debug)]
pub(crate) enum CaptureFailure {
    TimedOut,
    StreamClosed,
    Body(anyhow::Error),
}

/// Wait for the first export-like response and buffer its body to `dir`
pub(crate) async fn await_export_response<S>(
    session: &S,
    mut responses: BoxStream<'static, ResponseEvent>,
    dir: &Path,
    deadline: Duration,
) -> Result<PathBuf, CaptureFailure>
where
    S: BrowserSession + ?Sized,
{
    let capture = async {
        let mut last_error = None;

        while let Some(event) = responses.next().await {
            if !event.is_export() {
                continue;
            }
            log::info!("Observed export response: {}", event.url);

            let body = match session.response_body(&event.request_id).await {
                Ok(body) if !body.is_empty() => body,
                Ok(_) => {
                    log::debug!("Skipping empty export response {}", event.url);
                    continue;
                }
                Err(e) => {
                    log::warn!("Could not read body of {}: {:#}", event.url, e);
                    last_error = Some(e);
                    continue;
                }
            };

            return write_artifact(dir, &body).map_err(CaptureFailure::Body);
        }

        Err(last_error.map_or(CaptureFailure::StreamClosed, CaptureFailure::Body))
    };

    match tokio::time::timeout(deadline, capture).await {
        Ok(result) => result,
        Err(_) => Err(CaptureFailure::TimedOut),
    }
}

/// Write a captured body under a unique name, picking the extension from its content
pub(crate) fn write_artifact(dir: &Path, body: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create scratch directory: {}", dir.display()))?;

    let extension = if body.starts_with(ZIP_MAGIC) { "zip" } else { "json" };
    let stem = format!(
        "export-{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );

    let partial = dir.join(format!("{stem}.part"));
    let path = dir.join(format!("{stem}.{extension}"));

    fs::write(&partial, body)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    fs::rename(&partial, &path)
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    Ok(path)
}

/// Whether a file name looks like a journal export
pub(crate) fn looks_like_export(file_name: &str) -> bool {
    let name = file_name.to_lowercase();
    if name.ends_with(".part") || name.ends_with(".crdownload") {
        return false;
    }
    name.contains("export")
        || name.contains("journal")
        || name.ends_with(".json")
        || name.ends_with(".zip")
}

/// Newest export-looking file directly under `dir` modified since `since`
pub(crate) fn newest_export_file(dir: &Path, since: SystemTime) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }

    let threshold = since.checked_sub(SCAN_CLOCK_SLACK).unwrap_or(since);
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !looks_like_export(name) {
            continue;
        }

        let modified = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .modified()?;
        if modified < threshold {
            continue;
        }

        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path().to_path_buf()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Remove captured artifacts from the scratch directory, keeping subdirectories
pub fn clean_scratch_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read scratch directory: {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }

    Ok(removed)
}

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::browser::BrowserSession;

/// Write a snapshot of the current page for offline debugging
///
/// Best-effort: failures are logged and `None` is returned.
pub(crate) async fn capture<S>(session: &S, dir: &Path, step: &str) -> Option<PathBuf>
where
    S: BrowserSession + ?Sized,
{
    match write_snapshot(session, dir, step).await {
        Ok(path) => {
            log::warn!("Saved diagnostics for failed step '{}' to {}", step, path.display());
            Some(path)
        }
        Err(e) => {
            log::warn!("Could not capture diagnostics for '{}': {:#}", step, e);
            None
        }
    }
}

async fn write_snapshot<S>(session: &S, dir: &Path, step: &str) -> Result<PathBuf>
where
    S: BrowserSession + ?Sized,
{
    let snapshot = session.snapshot().await?;

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create diagnostics directory: {}", dir.display()))?;

    let stem = format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S%3f"),
        slug(step)
    );

    let html_path = dir.join(format!("{stem}.html"));
    let html = format!("<!-- url: {} -->\n{}", snapshot.url, snapshot.html);
    fs::write(&html_path, html)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;

    if let Some(png) = snapshot.screenshot_png {
        let png_path = dir.join(format!("{stem}.png"));
        fs::write(&png_path, png)
            .with_context(|| format!("Failed to write {}", png_path.display()))?;
    }

    Ok(html_path)
}

fn slug(step: &str) -> String {
    step.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeSession;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_capture_writes_html_with_url() {
        let temp = TempDir::new().unwrap();
        let session = FakeSession::new("https://example.test/login");

        let path = capture(&session, temp.path(), "open export").await.unwrap();
        assert!(path.to_string_lossy().ends_with("open-export.html"));

        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("https://example.test/login"));
        assert_eq!(session.snapshot_count(), 1);
    }
}

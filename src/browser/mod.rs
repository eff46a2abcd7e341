//! Port between the export driver and an automated browser.
//!
//! The driver only speaks [`BrowserSession`]; the Chromium adapter in
//! [`chromium`] is the production implementation.

mod chromium;
#[cfg(test)]
pub(crate) mod fake;

pub use chromium::{ChromiumSession, LaunchOptions};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

use crate::selector::Locator;

/// A network response observed by the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEvent {
    pub request_id: String,
    pub url: String,
    pub mime_type: Option<String>,
}

impl ResponseEvent {
    /// Whether the URL denotes a download or export operation
    pub fn is_export(&self) -> bool {
        let url = self.url.to_lowercase();
        url.contains("download") || url.contains("export")
    }
}

/// Point-in-time view of the page, written out when a step fails
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    pub screenshot_png: Option<Vec<u8>>,
}

/// Operations the export driver needs from a browser tab
#[async_trait]
pub trait BrowserSession: Send + Sync {
    type Element: Send + Sync;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Look up an element right now; `Ok(None)` when nothing matches yet
    async fn query(&self, locator: &Locator) -> Result<Option<Self::Element>>;

    async fn click(&self, element: &Self::Element) -> Result<()>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<()>;

    /// Choose the first option of a `<select>` whose value or label contains
    /// `wanted`; `Ok(false)` when no option matches
    async fn select_option(&self, element: &Self::Element, wanted: &str) -> Result<bool>;

    async fn wait_for_navigation(&self) -> Result<()>;

    /// Let native downloads land in `dir`
    async fn allow_downloads(&self, dir: &Path) -> Result<()>;

    /// Subscribe to responses received from now on
    async fn watch_responses(&self) -> Result<BoxStream<'static, ResponseEvent>>;

    async fn response_body(&self, request_id: &str) -> Result<Vec<u8>>;

    async fn snapshot(&self) -> Result<PageSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_response_detection() {
        let event = |url: &str| ResponseEvent {
            request_id: "1".to_string(),
            url: url.to_string(),
            mime_type: None,
        };
        assert!(event("https://api.example.test/v2/export/123").is_export());
        assert!(event("https://cdn.example.test/Download?id=9").is_export());
        assert!(!event("https://example.test/journals").is_export());
    }
}

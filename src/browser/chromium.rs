use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserSession, PageSnapshot, ResponseEvent};
use crate::selector::Locator;

/// How to start the headless browser
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Chrome/Chromium binary; autodetected when `None`
    pub executable: Option<PathBuf>,
}

/// A single headless Chromium tab driven over the DevTools protocol
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run");

        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch headless browser")?;

        // The handler drives the CDP connection and must be polled for the
        // browser's whole lifetime.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Browser handler error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
        })
    }

    pub async fn close(self) -> Result<()> {
        let mut browser = self.browser.into_inner();
        browser.close().await.context("Failed to close browser")?;
        self.handler_task.abort();
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = Element;

    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to open {url}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("Failed to read page URL")?
            .unwrap_or_default())
    }

    async fn query(&self, locator: &Locator) -> Result<Option<Element>> {
        let elements = self
            .page
            .find_elements(locator.css.as_str())
            .await
            .with_context(|| format!("Query failed for {locator}"))?;

        let Some(wanted) = locator.text.as_deref().map(str::to_lowercase) else {
            return Ok(elements.into_iter().next());
        };

        for element in elements {
            let text = element.inner_text().await?.unwrap_or_default();
            if text.to_lowercase().contains(&wanted) {
                return Ok(Some(element));
            }
        }

        Ok(None)
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await.context("Click failed")?;
        Ok(())
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<()> {
        element.click().await.context("Failed to focus input")?;
        element.type_str(text).await.context("Typing failed")?;
        Ok(())
    }

    async fn select_option(&self, element: &Element, wanted: &str) -> Result<bool> {
        let wanted = serde_json::to_string(&wanted.to_lowercase())?;
        let function = format!(
            "function() {{
                const wanted = {wanted};
                const option = Array.from(this.options || []).find(o =>
                    o.value.toLowerCase().includes(wanted) || o.text.toLowerCase().includes(wanted));
                if (!option) return false;
                this.value = option.value;
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }}"
        );
        let returns = element
            .call_js_fn(function, false)
            .await
            .context("Failed to choose select option")?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        self.page
            .wait_for_navigation()
            .await
            .context("Navigation did not complete")?;
        Ok(())
    }

    async fn allow_downloads(&self, dir: &Path) -> Result<()> {
        let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
        params.download_path = Some(dir.to_string_lossy().to_string());
        self.page
            .execute(params)
            .await
            .context("Failed to set download behaviour")?;
        Ok(())
    }

    async fn watch_responses(&self) -> Result<BoxStream<'static, ResponseEvent>> {
        let events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to subscribe to network responses")?;

        let stream = events.map(|event| ResponseEvent {
            request_id: event.request_id.inner().clone(),
            url: event.response.url.clone(),
            mime_type: Some(event.response.mime_type.clone()),
        });

        Ok(stream.boxed())
    }

    async fn response_body(&self, request_id: &str) -> Result<Vec<u8>> {
        let params = GetResponseBodyParams::new(RequestId::new(request_id));
        let response = self
            .page
            .execute(params)
            .await
            .with_context(|| format!("Failed to fetch body for request {request_id}"))?;

        let body = &response.result;
        if body.base64_encoded {
            STANDARD
                .decode(&body.body)
                .context("Response body is not valid base64")
        } else {
            Ok(body.body.clone().into_bytes())
        }
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        let url = self.current_url().await.unwrap_or_default();
        let html = self
            .page
            .content()
            .await
            .context("Failed to read page content")?;
        let screenshot_png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| log::debug!("Screenshot failed: {e}"))
            .ok();

        Ok(PageSnapshot {
            url,
            html,
            screenshot_png,
        })
    }
}

//! Browser-driven export of a journal from the journaling service.
//!
//! The flow is strictly sequential: authenticate, select the journal, open
//! the export surface, then trigger the export while watching network
//! responses for the archive. Each step writes a page snapshot on failure.
//! Nothing here retries a whole run; the caller decides whether to re-run.

mod capture;
mod diagnostics;

pub use capture::clean_scratch_dir;

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::browser::BrowserSession;
use crate::credentials::Credentials;
use crate::error::ExportError;
use crate::selector::{resolve, resolve_optional, ResolveOptions, StepSelectors};
use crate::settings::{AutomationSettings, SitePaths};
use capture::CaptureFailure;

const MIN_URL_POLL: Duration = Duration::from_millis(10);

/// Everything the driver needs besides the browser and credentials
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub login_url: String,
    pub selectors: StepSelectors,
    pub resolve: ResolveOptions,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub capture_deadline: Duration,
    pub scratch_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
}

impl ExportOptions {
    pub fn new(automation: &AutomationSettings, selectors: &StepSelectors, paths: &SitePaths) -> Self {
        Self {
            login_url: automation.login_url.clone(),
            selectors: selectors.clone(),
            resolve: automation.resolve_options(),
            navigation_timeout: Duration::from_secs(automation.navigation_timeout_secs),
            settle_delay: Duration::from_millis(automation.settle_delay_ms),
            capture_deadline: Duration::from_secs(automation.capture_deadline_secs),
            scratch_dir: paths.scratch_dir.clone(),
            diagnostics_dir: paths.diagnostics_dir.clone(),
        }
    }
}

/// Drives one browser session through a single export
pub struct ExportDriver<'a, S: BrowserSession + ?Sized> {
    session: &'a S,
    options: &'a ExportOptions,
}

impl<'a, S: BrowserSession + ?Sized> ExportDriver<'a, S> {
    pub fn new(session: &'a S, options: &'a ExportOptions) -> Self {
        Self { session, options }
    }

    /// Export `journal` and return the location of the captured archive
    pub async fn export_journal(
        &self,
        credentials: &Credentials,
        journal: &str,
    ) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.options.scratch_dir)?;

        self.step("authenticate", self.authenticate(credentials))
            .await?;
        if !self.select_journal(journal).await {
            log::debug!("Continuing with the active journal; entries are filtered by name after extraction");
        }
        self.step("open export", self.open_export_surface()).await?;
        let archive = self
            .step("capture export", self.trigger_and_capture(journal))
            .await?;

        log::info!("Export captured: {}", archive.display());
        Ok(archive)
    }

    async fn step<T, F>(&self, name: &str, work: F) -> Result<T, ExportError>
    where
        F: Future<Output = Result<T, ExportError>>,
    {
        log::debug!("Starting step '{name}'");
        match work.await {
            Ok(value) => Ok(value),
            Err(e) => {
                log::error!("Step '{name}' failed: {e}");
                diagnostics::capture(self.session, &self.options.diagnostics_dir, name).await;
                Err(e)
            }
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(self.options.settle_delay).await;
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<(), ExportError> {
        let selectors = &self.options.selectors;
        let resolve_opts = &self.options.resolve;

        log::info!("Logging in to {}", self.options.login_url);
        self.session.goto(&self.options.login_url).await?;

        let email = resolve(self.session, &selectors.email_field, resolve_opts).await?;
        self.session
            .type_text(&email.element, &credentials.email)
            .await?;

        let password = resolve(self.session, &selectors.password_field, resolve_opts).await?;
        self.session
            .type_text(&password.element, &credentials.password)
            .await?;

        let submit = resolve(self.session, &selectors.login_submit, resolve_opts).await?;
        let deadline = Instant::now() + self.options.navigation_timeout;
        self.session.click(&submit.element).await?;

        match tokio::time::timeout_at(deadline, self.session.wait_for_navigation()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::debug!("Navigation after login did not report: {e:#}"),
            Err(_) => log::debug!("No navigation within {:?} after login", self.options.navigation_timeout),
        }

        // Client-side routing may leave the login URL in place for a while
        // after the navigation event, so keep reading it until the deadline.
        let poll = resolve_opts.poll_interval.max(MIN_URL_POLL);
        loop {
            let url = self.session.current_url().await?;
            if !url.to_lowercase().contains("login") {
                break;
            }
            if Instant::now() >= deadline {
                log::debug!("Still on {url} after {:?}", self.options.navigation_timeout);
                return Err(ExportError::AuthenticationFailed);
            }
            tokio::time::sleep(poll).await;
        }

        log::info!("Login successful");
        Ok(())
    }

    /// Select `journal` in the side panel; a miss only degrades the run
    ///
    /// Returns whether the journal was selected. When it was not, whatever
    /// journal is active gets exported and entries are filtered by name later.
    async fn select_journal(&self, journal: &str) -> bool {
        let selectors = &self.options.selectors;
        let resolve_opts = &self.options.resolve;
        let journal_set = selectors.journal_item.for_journal(journal);

        let mut item = resolve_optional(self.session, &journal_set, resolve_opts).await;

        if item.is_none() {
            if let Some(toggle) =
                resolve_optional(self.session, &selectors.sidebar_toggle, resolve_opts).await
            {
                log::debug!("Opening journal side panel");
                if let Err(e) = self.session.click(&toggle.element).await {
                    log::debug!("Side panel toggle failed: {e:#}");
                }
                self.settle().await;
                item = resolve_optional(self.session, &journal_set, resolve_opts).await;
            }
        }

        let Some(item) = item else {
            log::warn!(
                "Journal '{journal}' not found in the side panel; exporting the active journal instead"
            );
            return false;
        };

        if let Err(e) = self.session.click(&item.element).await {
            log::warn!("Could not select journal '{journal}': {e:#}; exporting the active journal instead");
            return false;
        }
        self.settle().await;
        log::info!("Selected journal '{journal}'");
        true
    }

    async fn open_export_surface(&self) -> Result<(), ExportError> {
        let selectors = &self.options.selectors;
        let resolve_opts = &self.options.resolve;

        if let Some(export) =
            resolve_optional(self.session, &selectors.export_action, resolve_opts).await
        {
            self.session.click(&export.element).await?;
            self.settle().await;
            return Ok(());
        }

        if let Some(menu) =
            resolve_optional(self.session, &selectors.menu_button, resolve_opts).await
        {
            log::debug!("Export not visible; opening menu via {}", menu.locator);
            self.session.click(&menu.element).await?;
            self.settle().await;

            if let Some(export) =
                resolve_optional(self.session, &selectors.export_action, resolve_opts).await
            {
                self.session.click(&export.element).await?;
                self.settle().await;
                return Ok(());
            }
        }

        let mut attempted = selectors.export_action.describe();
        attempted.extend(selectors.menu_button.describe());
        Err(ExportError::ExportSurfaceUnreachable { attempted })
    }

    /// Pick `journal` in the export dialog's journal list, when it has one
    async fn select_export_journal(&self, journal: &str) {
        let Some(list) = resolve_optional(
            self.session,
            &self.options.selectors.export_journal,
            &self.options.resolve,
        )
        .await
        else {
            log::debug!("No journal list in the export dialog, using its default");
            return;
        };

        match self.session.select_option(&list.element, journal).await {
            Ok(true) => log::debug!("Picked '{journal}' in the export dialog"),
            Ok(false) => log::warn!("Export dialog does not offer '{journal}', using its default"),
            Err(e) => log::warn!("Could not pick '{journal}' in the export dialog: {e:#}"),
        }
    }

    async fn trigger_and_capture(&self, journal: &str) -> Result<PathBuf, ExportError> {
        let selectors = &self.options.selectors;
        let resolve_opts = &self.options.resolve;
        let scratch = &self.options.scratch_dir;

        if let Err(e) = self.session.allow_downloads(scratch).await {
            log::warn!("Could not route downloads to {}: {e:#}", scratch.display());
        }

        self.select_export_journal(journal).await;

        if let Some(format) =
            resolve_optional(self.session, &selectors.format_json, resolve_opts).await
        {
            if let Err(e) = self.session.click(&format.element).await {
                log::debug!("Could not pick JSON format: {e:#}");
            }
        }

        let submit = resolve(self.session, &selectors.export_submit, resolve_opts).await?;

        // The observer must be in place before the click so the response is not missed
        let responses = self.session.watch_responses().await?;
        let triggered_at = SystemTime::now();
        self.session.click(&submit.element).await?;
        log::info!("Export triggered; waiting for download...");

        let failure = match capture::await_export_response(
            self.session,
            responses,
            scratch,
            self.options.capture_deadline,
        )
        .await
        {
            Ok(path) => return Ok(path),
            Err(failure) => failure,
        };

        log::warn!(
            "Network capture failed ({}); scanning {}",
            describe_failure(&failure),
            scratch.display()
        );

        match capture::newest_export_file(scratch, triggered_at)? {
            Some(path) => {
                log::info!("Using downloaded file {}", path.display());
                Ok(path)
            }
            None => Err(match failure {
                CaptureFailure::TimedOut => ExportError::DownloadTimeout {
                    seconds: self.options.capture_deadline.as_secs(),
                },
                CaptureFailure::StreamClosed | CaptureFailure::Body(_) => {
                    ExportError::ExportArtifactNotFound {
                        dir: scratch.to_path_buf(),
                    }
                }
            }),
        }
    }
}

fn describe_failure(failure: &CaptureFailure) -> String {
    match failure {
        CaptureFailure::TimedOut => "deadline reached".to_string(),
        CaptureFailure::StreamClosed => "response stream closed".to_string(),
        CaptureFailure::Body(e) => format!("{e:#}"),
    }
}

/// Export `journal` through `session`
pub async fn export_journal<S>(
    session: &S,
    options: &ExportOptions,
    credentials: &Credentials,
    journal: &str,
) -> Result<PathBuf, ExportError>
where
    S: BrowserSession + ?Sized,
{
    ExportDriver::new(session, options)
        .export_journal(credentials, journal)
        .await
}

/// Whether `path` sits inside the scratch directory
pub fn is_scratch_artifact(path: &Path, scratch_dir: &Path) -> bool {
    path.parent() == Some(scratch_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeSession;
    use tempfile::TempDir;

    const LOGIN: &str = "https://dayone.me/login";
    const HOME: &str = "https://dayone.me/journals";

    fn options(temp: &TempDir) -> ExportOptions {
        ExportOptions {
            login_url: LOGIN.to_string(),
            selectors: StepSelectors::default(),
            resolve: ResolveOptions {
                per_candidate_timeout: Duration::ZERO,
                poll_interval: Duration::from_millis(1),
            },
            navigation_timeout: Duration::from_secs(1),
            settle_delay: Duration::ZERO,
            capture_deadline: Duration::from_secs(30),
            scratch_dir: temp.path().join("temp"),
            diagnostics_dir: temp.path().join("temp").join("diagnostics"),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "me@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    /// Login form that navigates away on submit
    fn logged_in_session() -> FakeSession {
        let session = FakeSession::new("about:blank");
        session.add_element("input[type=\"email\"]", "");
        session.add_element("input[type=\"password\"]", "");
        session.add_element("button[type=\"submit\"]", "Sign In");
        session.on_click_navigate("button[type=\"submit\"]", HOME);
        session
    }

    fn add_export_flow(session: &FakeSession) {
        session.add_element("a[href*=\"export\"]", "Export");
        session.add_element("button", "Export");
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_captured_from_network_response() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        session.add_element("nav a, nav button", "Blog Public");
        add_export_flow(&session);
        session.on_click_respond("button", "https://dayone.me/api/images/1", b"png");
        session.on_click_respond("button", "https://dayone.me/api/export/42", br#"{"entries":[]}"#);

        let archive = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap();

        assert!(is_scratch_artifact(&archive, &opts.scratch_dir));
        assert_eq!(fs::read_to_string(&archive).unwrap(), r#"{"entries":[]}"#);
        assert_eq!(
            session.typed(),
            vec![
                ("input[type=\"email\"]".to_string(), "me@example.com".to_string()),
                ("input[type=\"password\"]".to_string(), "secret".to_string()),
            ]
        );
        assert!(session.clicks().contains(&"nav a, nav button".to_string()));
        assert_eq!(session.download_dir(), Some(opts.scratch_dir.clone()));
        assert_eq!(session.snapshot_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_page_after_submit_is_authentication_failure() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = FakeSession::new("about:blank");
        session.add_element("input[type=\"email\"]", "");
        session.add_element("input[type=\"password\"]", "");
        session.add_element("button[type=\"submit\"]", "");

        let err = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::AuthenticationFailed));
        assert!(!err.is_retryable());
        assert_eq!(session.snapshot_count(), 1);
        assert!(opts.diagnostics_dir.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_waits_for_client_side_route_change() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = FakeSession::new("about:blank");
        session.add_element("input[type=\"email\"]", "");
        session.add_element("input[type=\"password\"]", "");
        session.add_element("button[type=\"submit\"]", "Sign In");
        session.on_click_navigate_after("button[type=\"submit\"]", HOME, 5);
        add_export_flow(&session);
        session.on_click_respond("button", "https://dayone.me/api/export/7", b"{}");

        let archive = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap();

        assert!(archive.exists());
        assert_eq!(session.snapshot_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_journal_picked_in_export_dialog() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        add_export_flow(&session);
        session.add_select("select[name*=\"journal\" i]", &["Private", "Blog Public"]);
        session.on_click_respond("button", "https://dayone.me/api/export/8", b"{}");

        export_journal(&session, &opts, &credentials(), "blog public")
            .await
            .unwrap();

        assert_eq!(
            session.selected(),
            vec![(
                "select[name*=\"journal\" i]".to_string(),
                "Blog Public".to_string()
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_journal_is_soft_failure() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        add_export_flow(&session);
        session.on_click_respond("button", "https://dayone.me/download/1", b"{}");

        let archive = export_journal(&session, &opts, &credentials(), "Nowhere")
            .await
            .unwrap();
        assert!(archive.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_side_panel_opened_when_journal_hidden() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        session.add_element("button[aria-label*=\"sidebar\" i]", "");
        session.add_hidden_element("nav a, nav button", "Blog Public");
        session.on_click_reveal("button[aria-label*=\"sidebar\" i]", "nav a, nav button");
        add_export_flow(&session);
        session.on_click_respond("button", "https://dayone.me/export", b"{}");

        export_journal(&session, &opts, &credentials(), "blog public")
            .await
            .unwrap();

        let clicks = session.clicks();
        let toggle = clicks
            .iter()
            .position(|c| c == "button[aria-label*=\"sidebar\" i]")
            .unwrap();
        let journal = clicks.iter().position(|c| c == "nav a, nav button").unwrap();
        assert!(toggle < journal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_reached_through_menu() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        session.add_element(".menu-button", "");
        session.add_hidden_element(".export-button", "Export");
        session.on_click_reveal(".menu-button", ".export-button");
        session.add_element("button", "Export");
        session.on_click_respond("button", "https://dayone.me/export", b"{}");

        export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap();

        let clicks = session.clicks();
        assert!(clicks.contains(&".menu-button".to_string()));
        assert!(clicks.contains(&".export-button".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_export_surface() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();

        let err = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap_err();

        match err {
            ExportError::ExportSurfaceUnreachable { attempted } => {
                assert!(attempted.contains(&".export-button".to_string()));
                assert!(attempted.contains(&".menu-button".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.snapshot_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_submit_exhausts_locators() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = FakeSession::new("about:blank");
        session.add_element("input[type=\"email\"]", "");
        session.add_element("input[type=\"password\"]", "");
        session.add_element("input[type=\"submit\"]", "");
        session.on_click_navigate("input[type=\"submit\"]", HOME);
        session.add_element(".export-button", "Export");

        let err = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::StepLocatorExhausted { ref action, .. } if action == "export submit"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_response_and_no_file_times_out() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        add_export_flow(&session);

        let err = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::DownloadTimeout { seconds: 30 }));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_download_found_by_directory_scan() {
        let temp = TempDir::new().unwrap();
        let opts = options(&temp);
        let session = logged_in_session();
        add_export_flow(&session);
        session.on_click_download("button", "Export - Blog Public.zip", b"PK\x03\x04");

        let archive = export_journal(&session, &opts, &credentials(), "Blog Public")
            .await
            .unwrap();
        assert_eq!(archive.file_name().unwrap(), "Export - Blog Public.zip");
    }
}

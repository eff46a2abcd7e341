//! Preference-ordered element locators for each automation step.
//!
//! The journaling service's web markup changes without notice, so no step
//! relies on a single selector. Each step owns a [`LocatorSet`] whose
//! candidates are probed in order; the lists live in [`StepSelectors`] and can
//! be overridden from `config.toml` without touching the driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::browser::BrowserSession;
use crate::error::ExportError;

/// Placeholder replaced by the configured journal name
pub const JOURNAL_PLACEHOLDER: &str = "{journal}";

/// A single way of locating an element
///
/// `css` selects candidate elements; when `text` is set, the first candidate
/// whose visible text contains it (case-insensitively) is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Locator {
    pub fn css(css: &str) -> Self {
        Self {
            css: css.to_string(),
            text: None,
        }
    }

    pub fn with_text(css: &str, text: &str) -> Self {
        Self {
            css: css.to_string(),
            text: Some(text.to_string()),
        }
    }

    /// Substitute the journal name into any `{journal}` placeholder
    pub fn for_journal(&self, journal: &str) -> Self {
        Self {
            css: self.css.replace(JOURNAL_PLACEHOLDER, journal),
            text: self
                .text
                .as_ref()
                .map(|t| t.replace(JOURNAL_PLACEHOLDER, journal)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{}:has-text(\"{}\")", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

/// Ordered candidates for the element performing one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSet {
    pub action: String,
    pub candidates: Vec<Locator>,
}

impl LocatorSet {
    pub fn new(action: &str, candidates: Vec<Locator>) -> Self {
        Self {
            action: action.to_string(),
            candidates,
        }
    }

    pub fn for_journal(&self, journal: &str) -> Self {
        Self {
            action: self.action.clone(),
            candidates: self
                .candidates
                .iter()
                .map(|c| c.for_journal(journal))
                .collect(),
        }
    }

    pub fn describe(&self) -> Vec<String> {
        self.candidates.iter().map(ToString::to_string).collect()
    }

    fn exhausted(&self) -> ExportError {
        ExportError::StepLocatorExhausted {
            action: self.action.clone(),
            candidates: self.describe(),
        }
    }
}

/// Locator lists for every step of the export flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSelectors {
    pub email_field: LocatorSet,
    pub password_field: LocatorSet,
    pub login_submit: LocatorSet,
    pub sidebar_toggle: LocatorSet,
    pub journal_item: LocatorSet,
    pub menu_button: LocatorSet,
    pub export_action: LocatorSet,
    pub export_journal: LocatorSet,
    pub format_json: LocatorSet,
    pub export_submit: LocatorSet,
}

impl Default for StepSelectors {
    fn default() -> Self {
        Self {
            email_field: LocatorSet::new(
                "email field",
                vec![
                    Locator::css("input[type=\"email\"]"),
                    Locator::css("input[name=\"email\"]"),
                    Locator::css("input[autocomplete=\"username\"]"),
                ],
            ),
            password_field: LocatorSet::new(
                "password field",
                vec![
                    Locator::css("input[type=\"password\"]"),
                    Locator::css("input[name=\"password\"]"),
                ],
            ),
            login_submit: LocatorSet::new(
                "login submit",
                vec![
                    Locator::css("button[type=\"submit\"]"),
                    Locator::css("input[type=\"submit\"]"),
                    Locator::with_text("button", "Sign In"),
                    Locator::with_text("button", "Log In"),
                ],
            ),
            sidebar_toggle: LocatorSet::new(
                "sidebar toggle",
                vec![
                    Locator::css("button[aria-label*=\"sidebar\" i]"),
                    Locator::css("button[aria-label*=\"journals\" i]"),
                    Locator::css("[data-testid*=\"sidebar-toggle\"]"),
                ],
            ),
            journal_item: LocatorSet::new(
                "journal selection",
                vec![
                    Locator::with_text("[data-testid*=\"journal\"]", JOURNAL_PLACEHOLDER),
                    Locator::with_text("nav a, nav button", JOURNAL_PLACEHOLDER),
                    Locator::with_text("[role=\"menuitem\"], li, span", JOURNAL_PLACEHOLDER),
                ],
            ),
            menu_button: LocatorSet::new(
                "journal menu",
                vec![
                    Locator::css("button[aria-label*=\"edit\" i]"),
                    Locator::css("button[aria-label*=\"settings\" i]"),
                    Locator::css("button[aria-label*=\"menu\" i]"),
                    Locator::css(".menu-button"),
                    Locator::css("[data-testid*=\"menu\"]"),
                ],
            ),
            export_action: LocatorSet::new(
                "export action",
                vec![
                    Locator::css("a[href*=\"export\"]"),
                    Locator::css("button[aria-label*=\"export\" i]"),
                    Locator::css(".export-button"),
                    Locator::css("[data-testid*=\"export\"]"),
                    Locator::with_text("[role=\"menuitem\"], button, a", "Export"),
                ],
            ),
            export_journal: LocatorSet::new(
                "export journal list",
                vec![
                    Locator::css("select[name*=\"journal\" i]"),
                    Locator::css("select[id*=\"journal\" i]"),
                    Locator::css("select"),
                ],
            ),
            format_json: LocatorSet::new(
                "json format",
                vec![
                    Locator::css("input[value=\"json\"]"),
                    Locator::css("option[value=\"json\"]"),
                    Locator::css("button[data-format=\"json\"]"),
                ],
            ),
            export_submit: LocatorSet::new(
                "export submit",
                vec![
                    Locator::with_text("button", "Export"),
                    Locator::css("input[value*=\"Export\"]"),
                    Locator::css(".export-submit"),
                    Locator::css("button[type=\"submit\"]"),
                ],
            ),
        }
    }
}

/// Timing for probing a single candidate
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub per_candidate_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            per_candidate_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// A located element and which candidate found it
#[derive(Debug)]
pub struct Resolved<E> {
    pub element: E,
    pub index: usize,
    pub locator: Locator,
}

/// Try every candidate of `set` in order and return the first element found
///
/// Each candidate is polled until `per_candidate_timeout` elapses. Probe
/// errors count as "not found" for that candidate. Nothing is clicked.
pub async fn resolve<S>(
    session: &S,
    set: &LocatorSet,
    options: &ResolveOptions,
) -> Result<Resolved<S::Element>, ExportError>
where
    S: BrowserSession + ?Sized,
{
    for (index, locator) in set.candidates.iter().enumerate() {
        if let Some(element) = probe(session, locator, options).await {
            log::debug!("Step '{}' resolved with {}", set.action, locator);
            return Ok(Resolved {
                element,
                index,
                locator: locator.clone(),
            });
        }
        log::debug!("Step '{}': no match for {}", set.action, locator);
    }

    Err(set.exhausted())
}

/// Like [`resolve`], for steps whose element may legitimately be absent
pub async fn resolve_optional<S>(
    session: &S,
    set: &LocatorSet,
    options: &ResolveOptions,
) -> Option<Resolved<S::Element>>
where
    S: BrowserSession + ?Sized,
{
    resolve(session, set, options).await.ok()
}

async fn probe<S>(session: &S, locator: &Locator, options: &ResolveOptions) -> Option<S::Element>
where
    S: BrowserSession + ?Sized,
{
    let deadline = Instant::now() + options.per_candidate_timeout;

    loop {
        match session.query(locator).await {
            Ok(Some(element)) => return Some(element),
            Ok(None) => {}
            Err(e) => log::debug!("Probe for {} failed: {:#}", locator, e),
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(options.poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeSession;

    fn instant() -> ResolveOptions {
        ResolveOptions {
            per_candidate_timeout: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_last_candidate_is_selected_when_others_fail() {
        let session = FakeSession::new("https://example.test/");
        session.add_element(".third", "Third");

        let set = LocatorSet::new(
            "export",
            vec![
                Locator::css(".first"),
                Locator::css(".second"),
                Locator::css(".third"),
            ],
        );

        let resolved = resolve(&session, &set, &instant()).await.unwrap();
        assert_eq!(resolved.index, 2);
        assert_eq!(resolved.locator, Locator::css(".third"));
        assert_eq!(resolved.element.css, ".third");
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let session = FakeSession::new("https://example.test/");
        session.add_element(".first", "");
        session.add_element(".second", "");

        let set = LocatorSet::new(
            "export",
            vec![Locator::css(".first"), Locator::css(".second")],
        );
        let resolved = resolve(&session, &set, &instant()).await.unwrap();
        assert_eq!(resolved.index, 0);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_action_and_candidates() {
        let session = FakeSession::new("https://example.test/");
        let set = LocatorSet::new(
            "export submit",
            vec![Locator::css(".a"), Locator::with_text("button", "Export")],
        );

        match resolve(&session, &set, &instant()).await {
            Err(ExportError::StepLocatorExhausted { action, candidates }) => {
                assert_eq!(action, "export submit");
                assert_eq!(
                    candidates,
                    vec![".a".to_string(), "button:has-text(\"Export\")".to_string()]
                );
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_errors_fall_through_to_next_candidate() {
        let session = FakeSession::new("https://example.test/");
        session.fail_queries_for(".broken");
        session.add_element(".ok", "");

        let set = LocatorSet::new("menu", vec![Locator::css(".broken"), Locator::css(".ok")]);
        let resolved = resolve(&session, &set, &instant()).await.unwrap();
        assert_eq!(resolved.index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_candidate_is_polled_until_it_appears() {
        let session = FakeSession::new("https://example.test/");
        session.add_element_after(".late", "", 3);

        let options = ResolveOptions {
            per_candidate_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        };
        let set = LocatorSet::new("late", vec![Locator::css(".late")]);
        let resolved = resolve(&session, &set, &options).await.unwrap();
        assert_eq!(resolved.index, 0);
        assert!(session.query_count(".late") >= 4);
    }

    #[test]
    fn test_journal_placeholder_substitution() {
        let set = StepSelectors::default().journal_item.for_journal("Blog Public");
        assert!(set
            .candidates
            .iter()
            .all(|c| c.text.as_deref() == Some("Blog Public")));
    }

    #[test]
    fn test_selectors_override_from_toml() {
        let toml_src = r#"
            [export_submit]
            action = "export submit"
            candidates = [{ css = ".new-export" }, { css = "button", text = "Download" }]
        "#;
        let selectors: StepSelectors = toml::from_str(toml_src).unwrap();
        assert_eq!(selectors.export_submit.candidates.len(), 2);
        assert_eq!(
            selectors.export_submit.candidates[1].text.as_deref(),
            Some("Download")
        );
        // Untouched steps keep the built-in lists
        assert_eq!(selectors.email_field, StepSelectors::default().email_field);
    }
}

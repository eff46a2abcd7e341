//! Scripted in-memory browser used by the driver and selector tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{BrowserSession, PageSnapshot, ResponseEvent};
use crate::selector::Locator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeElement {
    pub css: String,
    pub text: String,
}

#[derive(Debug, Clone)]
struct FakeNode {
    element: FakeElement,
    /// Queries for this selector that must miss before the node shows up
    appear_after: usize,
    hidden: bool,
}

#[derive(Debug, Clone, Default)]
struct ClickEffect {
    navigate_to: Option<String>,
    /// URL reads that still see the old page after the click
    navigate_after: usize,
    reveal: Vec<String>,
    responses: Vec<(ResponseEvent, Vec<u8>)>,
    write_file: Option<(PathBuf, Vec<u8>)>,
}

#[derive(Default)]
struct State {
    url: String,
    pending_navigation: Option<(String, usize)>,
    nodes: Vec<FakeNode>,
    selects: HashMap<String, Vec<String>>,
    selected: Vec<(String, String)>,
    failing: HashSet<String>,
    query_counts: HashMap<String, usize>,
    effects: HashMap<String, ClickEffect>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    bodies: HashMap<String, Vec<u8>>,
    watchers: Vec<UnboundedSender<ResponseEvent>>,
    download_dir: Option<PathBuf>,
    snapshots: usize,
}

pub(crate) struct FakeSession {
    state: Mutex<State>,
}

impl FakeSession {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(State {
                url: url.to_string(),
                ..Default::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_element(&self, css: &str, text: &str) {
        self.push_node(css, text, 0, false);
    }

    pub fn add_element_after(&self, css: &str, text: &str, misses: usize) {
        self.push_node(css, text, misses, false);
    }

    /// Element that only becomes visible once something reveals it
    pub fn add_hidden_element(&self, css: &str, text: &str) {
        self.push_node(css, text, 0, true);
    }

    fn push_node(&self, css: &str, text: &str, appear_after: usize, hidden: bool) {
        self.with(|s| {
            s.nodes.push(FakeNode {
                element: FakeElement {
                    css: css.to_string(),
                    text: text.to_string(),
                },
                appear_after,
                hidden,
            })
        });
    }

    pub fn fail_queries_for(&self, css: &str) {
        self.with(|s| s.failing.insert(css.to_string()));
    }

    pub fn on_click_navigate(&self, css: &str, url: &str) {
        self.with(|s| s.effects.entry(css.to_string()).or_default().navigate_to = Some(url.to_string()));
    }

    /// Navigation that only shows in `current_url` after `url_reads` reads
    pub fn on_click_navigate_after(&self, css: &str, url: &str, url_reads: usize) {
        self.with(|s| {
            let effect = s.effects.entry(css.to_string()).or_default();
            effect.navigate_to = Some(url.to_string());
            effect.navigate_after = url_reads;
        });
    }

    /// A `<select>` element offering `options`
    pub fn add_select(&self, css: &str, options: &[&str]) {
        self.add_element(css, "");
        self.with(|s| {
            s.selects
                .insert(css.to_string(), options.iter().map(|o| o.to_string()).collect())
        });
    }

    pub fn selected(&self) -> Vec<(String, String)> {
        self.with(|s| s.selected.clone())
    }

    pub fn on_click_reveal(&self, css: &str, revealed: &str) {
        self.with(|s| {
            s.effects
                .entry(css.to_string())
                .or_default()
                .reveal
                .push(revealed.to_string())
        });
    }

    pub fn on_click_respond(&self, css: &str, url: &str, body: &[u8]) {
        self.with(|s| {
            let effect = s.effects.entry(css.to_string()).or_default();
            let event = ResponseEvent {
                request_id: format!("req-{}", effect.responses.len() + 1),
                url: url.to_string(),
                mime_type: None,
            };
            effect.responses.push((event, body.to_vec()));
        });
    }

    /// Simulate a native download landing in the configured download dir
    pub fn on_click_download(&self, css: &str, file_name: &str, body: &[u8]) {
        self.with(|s| {
            s.effects.entry(css.to_string()).or_default().write_file =
                Some((PathBuf::from(file_name), body.to_vec()))
        });
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with(|s| s.clicks.clone())
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.with(|s| s.typed.clone())
    }

    pub fn query_count(&self, css: &str) -> usize {
        self.with(|s| s.query_counts.get(css).copied().unwrap_or(0))
    }

    pub fn snapshot_count(&self) -> usize {
        self.with(|s| s.snapshots)
    }

    pub fn download_dir(&self) -> Option<PathBuf> {
        self.with(|s| s.download_dir.clone())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> Result<()> {
        self.with(|s| s.url = url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.with(|s| {
            match s.pending_navigation.take() {
                Some((url, 0)) => s.url = url,
                Some((url, reads)) => s.pending_navigation = Some((url, reads - 1)),
                None => {}
            }
            s.url.clone()
        }))
    }

    async fn query(&self, locator: &Locator) -> Result<Option<FakeElement>> {
        self.with(|s| {
            let count = s.query_counts.entry(locator.css.clone()).or_insert(0);
            *count += 1;
            let seen = *count;

            if s.failing.contains(&locator.css) {
                return Err(anyhow!("invalid selector {}", locator.css));
            }

            let wanted = locator.text.as_deref().map(str::to_lowercase);
            Ok(s.nodes
                .iter()
                .filter(|n| n.element.css == locator.css && !n.hidden && seen > n.appear_after)
                .find(|n| match &wanted {
                    Some(text) => n.element.text.to_lowercase().contains(text),
                    None => true,
                })
                .map(|n| n.element.clone()))
        })
    }

    async fn click(&self, element: &FakeElement) -> Result<()> {
        self.with(|s| {
            s.clicks.push(element.css.clone());
            let Some(effect) = s.effects.get(&element.css).cloned() else {
                return Ok(());
            };

            if let Some(url) = effect.navigate_to {
                if effect.navigate_after == 0 {
                    s.url = url;
                } else {
                    s.pending_navigation = Some((url, effect.navigate_after));
                }
            }
            for css in &effect.reveal {
                for node in s.nodes.iter_mut().filter(|n| &n.element.css == css) {
                    node.hidden = false;
                }
            }
            for (event, body) in effect.responses {
                s.bodies.insert(event.request_id.clone(), body);
                s.watchers
                    .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
            }
            if let Some((name, body)) = effect.write_file {
                let dir = s
                    .download_dir
                    .clone()
                    .ok_or_else(|| anyhow!("downloads not enabled"))?;
                std::fs::write(dir.join(name), body)?;
            }
            Ok(())
        })
    }

    async fn type_text(&self, element: &FakeElement, text: &str) -> Result<()> {
        self.with(|s| s.typed.push((element.css.clone(), text.to_string())));
        Ok(())
    }

    async fn select_option(&self, element: &FakeElement, wanted: &str) -> Result<bool> {
        self.with(|s| {
            let wanted = wanted.to_lowercase();
            let option = s
                .selects
                .get(&element.css)
                .and_then(|options| options.iter().find(|o| o.to_lowercase().contains(&wanted)))
                .cloned();
            match option {
                Some(option) => {
                    s.selected.push((element.css.clone(), option));
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        Ok(())
    }

    async fn allow_downloads(&self, dir: &Path) -> Result<()> {
        self.with(|s| s.download_dir = Some(dir.to_path_buf()));
        Ok(())
    }

    async fn watch_responses(&self) -> Result<BoxStream<'static, ResponseEvent>> {
        let (tx, rx) = unbounded();
        self.with(|s| s.watchers.push(tx));
        Ok(rx.boxed())
    }

    async fn response_body(&self, request_id: &str) -> Result<Vec<u8>> {
        self.with(|s| {
            s.bodies
                .get(request_id)
                .cloned()
                .ok_or_else(|| anyhow!("no body for {request_id}"))
        })
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        self.with(|s| {
            s.snapshots += 1;
            Ok(PageSnapshot {
                url: s.url.clone(),
                html: "<html><body>fake</body></html>".to_string(),
                screenshot_png: None,
            })
        })
    }
}

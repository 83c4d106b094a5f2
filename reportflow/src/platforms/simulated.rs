//! Scripted in-memory browser.
//!
//! A [`SimulatedSite`] is a flat list of elements, each addressed by the
//! exact selector the automation uses to find it, living either in the top
//! document or in a named iframe document. Clicking an element applies its
//! [`Effect`]s, which is enough to model menus that reveal cards, widgets
//! that flip attributes and buttons that start downloads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{BrowserEngine, Download, FrameDriver, PageDriver};
use crate::element::{ElementHandle, ElementImpl};
use crate::errors::AutomationError;
use crate::selector::Selector;

/// What clicking an element does to the site
#[derive(Debug, Clone)]
pub enum Effect {
    Reveal {
        frame: Option<String>,
        selector: Selector,
    },
    Hide {
        frame: Option<String>,
        selector: Selector,
    },
    SetAttribute {
        frame: Option<String>,
        selector: Selector,
        name: String,
        value: String,
    },
    /// Signal a completed navigation to the next `wait_for_navigation`
    Navigate,
    /// Arm a download for the next `expect_download`
    Download { filename: String, contents: Vec<u8> },
}

impl Effect {
    pub fn reveal(frame: Option<&str>, selector: impl Into<Selector>) -> Self {
        Effect::Reveal {
            frame: frame.map(str::to_string),
            selector: selector.into(),
        }
    }

    pub fn hide(frame: Option<&str>, selector: impl Into<Selector>) -> Self {
        Effect::Hide {
            frame: frame.map(str::to_string),
            selector: selector.into(),
        }
    }

    pub fn set_attribute(
        frame: Option<&str>,
        selector: impl Into<Selector>,
        name: &str,
        value: &str,
    ) -> Self {
        Effect::SetAttribute {
            frame: frame.map(str::to_string),
            selector: selector.into(),
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn download(filename: &str, contents: &[u8]) -> Self {
        Effect::Download {
            filename: filename.to_string(),
            contents: contents.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimElement {
    pub frame: Option<String>,
    pub selector: Selector,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    /// Displayed on the page. Hidden elements stay in the document.
    pub visible: bool,
    /// Name of the iframe document this element hosts, if any
    pub hosts_frame: Option<String>,
    pub on_click: Vec<Effect>,
}

impl SimElement {
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            frame: None,
            selector: selector.into(),
            text: String::new(),
            attributes: BTreeMap::new(),
            visible: true,
            hosts_frame: None,
            on_click: Vec::new(),
        }
    }

    pub fn in_frame(mut self, frame: &str) -> Self {
        self.frame = Some(frame.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hosting_frame(mut self, frame: &str) -> Self {
        self.hosts_frame = Some(frame.to_string());
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn is_disabled(&self) -> bool {
        self.attributes
            .get("aria-disabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
            || self.attributes.contains_key("disabled")
    }
}

/// Something the automation did to the site, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimAction {
    Goto(String),
    Click {
        frame: Option<String>,
        selector: String,
        forced: bool,
    },
    Fill {
        frame: Option<String>,
        selector: String,
        value: String,
    },
    Screenshot(PathBuf),
    Download(String),
}

#[derive(Debug, Default)]
struct SiteState {
    elements: Vec<SimElement>,
    pending_navigations: usize,
    pending_download: Option<(String, Vec<u8>)>,
    actions: Vec<SimAction>,
    pages_opened: usize,
    pages_closed: usize,
    open_pages: usize,
    max_open_pages: usize,
    shutdowns: usize,
    fail_new_page: Option<String>,
    fail_goto: Option<String>,
    fail_screenshots: bool,
}

/// Shared, scriptable state of the simulated web application
#[derive(Debug, Clone, Default)]
pub struct SimulatedSite {
    state: Arc<Mutex<SiteState>>,
}

impl SimulatedSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, element: SimElement) -> &Self {
        self.state().elements.push(element);
        self
    }

    /// Apply `f` to every element registered under exactly `selector` in `frame`.
    /// Returns how many elements were touched.
    pub fn modify(
        &self,
        frame: Option<&str>,
        selector: impl Into<Selector>,
        mut f: impl FnMut(&mut SimElement),
    ) -> usize {
        let selector = selector.into();
        let mut state = self.state();
        let mut touched = 0;
        for element in state
            .elements
            .iter_mut()
            .filter(|e| e.frame.as_deref() == frame && e.selector == selector)
        {
            f(element);
            touched += 1;
        }
        touched
    }

    pub fn fail_new_pages(&self, reason: &str) {
        self.state().fail_new_page = Some(reason.to_string());
    }

    pub fn fail_navigation(&self, reason: &str) {
        self.state().fail_goto = Some(reason.to_string());
    }

    pub fn fail_screenshots(&self, fail: bool) {
        self.state().fail_screenshots = fail;
    }

    pub fn engine(&self) -> SimulatedEngine {
        SimulatedEngine {
            site: self.clone(),
            downloads_dir: std::env::temp_dir()
                .join("reportflow-simulated")
                .join(Uuid::new_v4().to_string()),
        }
    }

    pub fn actions(&self) -> Vec<SimAction> {
        self.state().actions.clone()
    }

    /// Canonical selectors of every click, in order
    pub fn clicks(&self) -> Vec<String> {
        self.state()
            .actions
            .iter()
            .filter_map(|a| match a {
                SimAction::Click { selector, .. } => Some(selector.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn click_count(&self, selector: &str) -> usize {
        let wanted = Selector::from(selector).to_string();
        self.clicks().iter().filter(|s| **s == wanted).count()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state()
            .actions
            .iter()
            .filter_map(|a| match a {
                SimAction::Fill {
                    selector, value, ..
                } => Some((selector.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state()
            .actions
            .iter()
            .filter_map(|a| match a {
                SimAction::Screenshot(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn attribute(&self, frame: Option<&str>, selector: &str, name: &str) -> Option<String> {
        let selector = Selector::from(selector);
        self.state()
            .elements
            .iter()
            .find(|e| e.frame.as_deref() == frame && e.selector == selector)
            .and_then(|e| e.attributes.get(name).cloned())
    }

    pub fn pages_opened(&self) -> usize {
        self.state().pages_opened
    }

    pub fn pages_closed(&self) -> usize {
        self.state().pages_closed
    }

    pub fn open_pages(&self) -> usize {
        self.state().open_pages
    }

    /// Highest number of pages that were open at the same time
    pub fn max_open_pages(&self) -> usize {
        self.state().max_open_pages
    }

    pub fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }

    fn query(
        &self,
        frame: &Option<String>,
        query: &Selector,
        displayed_only: bool,
    ) -> Vec<usize> {
        let state = self.state();
        let matching = |selector: &Selector| -> Vec<usize> {
            state
                .elements
                .iter()
                .enumerate()
                .filter(|(_, e)| {
                    (e.visible || !displayed_only)
                        && &e.frame == frame
                        && selector_matches(&e.selector, selector)
                })
                .map(|(i, _)| i)
                .collect()
        };

        let exact = matching(query);
        if !exact.is_empty() {
            return exact;
        }
        match split_trailing_nth(query) {
            Some((base, n)) => {
                let found = matching(&base);
                let index = if n < 0 {
                    found.len() as i64 + n as i64
                } else {
                    n as i64
                };
                usize::try_from(index)
                    .ok()
                    .and_then(|i| found.get(i).copied())
                    .into_iter()
                    .collect()
            }
            None => Vec::new(),
        }
    }

    fn apply(&self, effect: &Effect) {
        let mut state = self.state();
        match effect {
            Effect::Reveal { frame, selector } | Effect::Hide { frame, selector } => {
                let visible = matches!(effect, Effect::Reveal { .. });
                for e in state
                    .elements
                    .iter_mut()
                    .filter(|e| &e.frame == frame && &e.selector == selector)
                {
                    e.visible = visible;
                }
            }
            Effect::SetAttribute {
                frame,
                selector,
                name,
                value,
            } => {
                for e in state
                    .elements
                    .iter_mut()
                    .filter(|e| &e.frame == frame && &e.selector == selector)
                {
                    e.attributes.insert(name.clone(), value.clone());
                }
            }
            Effect::Navigate => state.pending_navigations += 1,
            Effect::Download { filename, contents } => {
                state.pending_download = Some((filename.clone(), contents.clone()));
            }
        }
    }
}

/// An element registered with a `:has-text()` qualifier also matches its bare CSS.
fn selector_matches(registered: &Selector, query: &Selector) -> bool {
    if registered == query {
        return true;
    }
    matches!((registered, query), (Selector::HasText { css, .. }, Selector::Css(q)) if css == q)
}

fn split_trailing_nth(query: &Selector) -> Option<(Selector, i32)> {
    let Selector::Chain(parts) = query else {
        return None;
    };
    match parts.as_slice() {
        [single, Selector::Nth(n)] => Some((single.clone(), *n)),
        [head @ .., Selector::Nth(n)] if !head.is_empty() => {
            Some((Selector::Chain(head.to_vec()), *n))
        }
        _ => None,
    }
}

pub struct SimulatedEngine {
    site: SimulatedSite,
    downloads_dir: PathBuf,
}

#[async_trait]
impl BrowserEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, AutomationError> {
        {
            let mut state = self.site.state();
            if let Some(reason) = &state.fail_new_page {
                return Err(AutomationError::LaunchFailed(reason.clone()));
            }
            state.pages_opened += 1;
            state.open_pages += 1;
            state.max_open_pages = state.max_open_pages.max(state.open_pages);
        }
        Ok(Arc::new(SimPage {
            id: Uuid::new_v4().to_string(),
            site: self.site.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            downloads_dir: self.downloads_dir.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<(), AutomationError> {
        self.site.state().shutdowns += 1;
        Ok(())
    }
}

struct SimPage {
    id: String,
    site: SimulatedSite,
    closed: Arc<AtomicBool>,
    downloads_dir: PathBuf,
}

impl SimPage {
    fn ensure_open(&self) -> Result<(), AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionClosed(self.id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for SimPage {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), AutomationError> {
        self.ensure_open()?;
        let mut state = self.site.state();
        if let Some(reason) = &state.fail_goto {
            return Err(AutomationError::Navigation(format!("{url}: {reason}")));
        }
        state.actions.push(SimAction::Goto(url.to_string()));
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), AutomationError> {
        self.ensure_open()?;
        let take = |site: &SimulatedSite| {
            let mut state = site.state();
            if state.pending_navigations > 0 {
                state.pending_navigations -= 1;
                true
            } else {
                false
            }
        };
        if take(&self.site) {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        if take(&self.site) {
            return Ok(());
        }
        Err(AutomationError::Timeout(format!(
            "no navigation within {timeout:?}"
        )))
    }

    fn main_frame(&self) -> Arc<dyn FrameDriver> {
        Arc::new(SimFrame {
            site: self.site.clone(),
            name: None,
            closed: self.closed.clone(),
        })
    }

    async fn expect_download(
        &self,
        trigger: &ElementHandle,
        timeout: Duration,
    ) -> Result<Download, AutomationError> {
        self.ensure_open()?;
        trigger.click(false).await?;
        let pending = self.site.state().pending_download.take();
        let Some((filename, contents)) = pending else {
            tokio::time::sleep(timeout).await;
            return Err(AutomationError::Timeout(format!(
                "no download started by {} within {timeout:?}",
                trigger.describe()
            )));
        };
        tokio::fs::create_dir_all(&self.downloads_dir).await?;
        let staged = self.downloads_dir.join(Uuid::new_v4().to_string());
        tokio::fs::write(&staged, &contents).await?;
        self.site
            .state()
            .actions
            .push(SimAction::Download(filename.clone()));
        Ok(Download::new(staged, Some(filename)))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.ensure_open()?;
        let unavailable = self.site.state().fail_screenshots;
        if unavailable {
            return Err(AutomationError::PlatformError(
                "screenshot capture unavailable".to_string(),
            ));
        }
        tokio::fs::write(path, format!("simulated snapshot of page {}", self.id)).await?;
        self.site
            .state()
            .actions
            .push(SimAction::Screenshot(path.to_path_buf()));
        Ok(())
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut state = self.site.state();
            state.pages_closed += 1;
            state.open_pages = state.open_pages.saturating_sub(1);
            debug!("closed simulated page {}", self.id);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct SimFrame {
    site: SimulatedSite,
    name: Option<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameDriver for SimFrame {
    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("frame '{name}'"),
            None => "main frame".to_string(),
        }
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, AutomationError> {
        self.handles(selector, true)
    }

    async fn query_attached(
        &self,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, AutomationError> {
        self.handles(selector, false)
    }
}

impl SimFrame {
    fn handles(
        &self,
        selector: &Selector,
        displayed_only: bool,
    ) -> Result<Vec<ElementHandle>, AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionClosed(self.describe()));
        }
        Ok(self
            .site
            .query(&self.name, selector, displayed_only)
            .into_iter()
            .map(|index| {
                ElementHandle::new(Box::new(SimElementRef {
                    site: self.site.clone(),
                    index,
                    closed: self.closed.clone(),
                }))
            })
            .collect())
    }
}

#[derive(Clone)]
struct SimElementRef {
    site: SimulatedSite,
    index: usize,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for SimElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimElementRef")
            .field("index", &self.index)
            .finish()
    }
}

impl SimElementRef {
    /// Current state of the element. Interactions need it displayed,
    /// reads only need it in the document.
    fn snapshot(&self, displayed: bool) -> Result<SimElement, AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionClosed(self.describe()));
        }
        let state = self.site.state();
        match state.elements.get(self.index) {
            Some(e) if e.visible || !displayed => Ok(e.clone()),
            _ => Err(AutomationError::ElementNotFound(format!(
                "element #{} is no longer rendered",
                self.index
            ))),
        }
    }

    fn update(&self, f: impl FnOnce(&mut SimElement)) {
        if let Some(e) = self.site.state().elements.get_mut(self.index) {
            f(e);
        }
    }
}

#[async_trait]
impl ElementImpl for SimElementRef {
    fn describe(&self) -> String {
        self.site
            .state()
            .elements
            .get(self.index)
            .map(|e| e.selector.to_string())
            .unwrap_or_else(|| format!("element #{}", self.index))
    }

    async fn click(&self, force: bool) -> Result<(), AutomationError> {
        let element = self.snapshot(true)?;
        self.site.state().actions.push(SimAction::Click {
            frame: element.frame.clone(),
            selector: element.selector.to_string(),
            forced: force,
        });
        // Disabled controls swallow clicks
        if element.is_disabled() {
            return Ok(());
        }
        for effect in &element.on_click {
            self.site.apply(effect);
        }
        Ok(())
    }

    async fn fill(&self, value: &str) -> Result<(), AutomationError> {
        let element = self.snapshot(true)?;
        self.site.state().actions.push(SimAction::Fill {
            frame: element.frame.clone(),
            selector: element.selector.to_string(),
            value: value.to_string(),
        });
        self.update(|e| {
            e.attributes.insert("value".to_string(), value.to_string());
        });
        Ok(())
    }

    async fn clear(&self) -> Result<(), AutomationError> {
        self.snapshot(true)?;
        self.update(|e| {
            e.attributes.insert("value".to_string(), String::new());
        });
        Ok(())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        Ok(self.snapshot(false)?.attributes.get(name).cloned())
    }

    async fn text(&self) -> Result<String, AutomationError> {
        Ok(self.snapshot(false)?.text)
    }

    async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.snapshot(true).map(|_| ())
    }

    async fn content_frame(&self) -> Result<Option<Arc<dyn FrameDriver>>, AutomationError> {
        let element = self.snapshot(false)?;
        Ok(element.hosts_frame.map(|name| {
            Arc::new(SimFrame {
                site: self.site.clone(),
                name: Some(name),
                closed: self.closed.clone(),
            }) as Arc<dyn FrameDriver>
        }))
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trailing_nth_picks_from_base_matches() {
        let site = SimulatedSite::new();
        site.add(SimElement::new("li.option").with_text("a"))
            .add(SimElement::new("li.option").with_text("b"));
        let page = site.engine().new_page().await.unwrap();
        let frame = page.main_frame();

        let last = frame
            .query_all(&Selector::from("li.option >> nth=-1"))
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].text().await.unwrap(), "b");
        assert!(frame
            .query_all(&Selector::from("li.option >> nth=5"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_has_text_element_matches_bare_css() {
        let site = SimulatedSite::new();
        site.add(SimElement::new("span.p-button-label:has-text(\"Add\")"));
        let page = site.engine().new_page().await.unwrap();
        let found = page
            .main_frame()
            .query_all(&Selector::from("span.p-button-label"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_click_applies_effects_unless_disabled() {
        let site = SimulatedSite::new();
        site.add(SimElement::new("#menu").on_click(Effect::reveal(None, "#card")))
            .add(SimElement::new("#card").hidden());
        let page = site.engine().new_page().await.unwrap();
        let frame = page.main_frame();

        assert!(frame.query_all(&"#card".into()).await.unwrap().is_empty());
        site.modify(None, "#menu", |e| {
            e.attributes.insert("disabled".to_string(), String::new());
        });
        frame.query_all(&"#menu".into()).await.unwrap()[0]
            .click(false)
            .await
            .unwrap();
        assert!(frame.query_all(&"#card".into()).await.unwrap().is_empty());

        site.modify(None, "#menu", |e| {
            e.attributes.remove("disabled");
        });
        frame.query_all(&"#menu".into()).await.unwrap()[0]
            .click(false)
            .await
            .unwrap();
        assert_eq!(frame.query_all(&"#card".into()).await.unwrap().len(), 1);
        assert_eq!(site.click_count("#menu"), 2);
    }

    #[tokio::test]
    async fn test_closed_page_rejects_queries() {
        let site = SimulatedSite::new();
        site.add(SimElement::new("body"));
        let page = site.engine().new_page().await.unwrap();
        let frame = page.main_frame();
        page.close().await.unwrap();
        page.close().await.unwrap();

        assert!(matches!(
            frame.query_all(&"body".into()).await,
            Err(AutomationError::SessionClosed(_))
        ));
        assert_eq!(site.pages_closed(), 1);
        assert_eq!(site.open_pages(), 0);
    }
}

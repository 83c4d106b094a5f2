//! Chrome DevTools Protocol backend.
//!
//! Element handles are (frame path, selector, index) triples that are
//! re-resolved inside the page on every operation, so a handle never pins
//! a remote object that the application may have re-rendered.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BrowserEngine, Download, FrameDriver, PageDriver};
use crate::config::Settings;
use crate::element::{ElementHandle, ElementImpl};
use crate::errors::AutomationError;
use crate::selector::Selector;

const SCRIPT_TEMPLATE: &str = r#"(() => {
  const payload = __PAYLOAD__;
  const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  const unique = (items) => Array.from(new Set(items));
  const resolve = (sel, scopes) => {
    switch (sel.type) {
      case 'css':
        return unique(scopes.flatMap((s) => Array.from(s.querySelectorAll(sel.value))));
      case 'text':
        return unique(scopes.flatMap((s) =>
          Array.from(s.querySelectorAll('*')).filter((el) =>
            (el.textContent || '').includes(sel.value) &&
            !Array.from(el.children).some((c) => (c.textContent || '').includes(sel.value)))));
      case 'has_text':
        return unique(scopes.flatMap((s) =>
          Array.from(s.querySelectorAll(sel.value.css)).filter((el) =>
            (el.textContent || '').includes(sel.value.text))));
      case 'nth': {
        const i = sel.value < 0 ? scopes.length + sel.value : sel.value;
        return i >= 0 && i < scopes.length ? [scopes[i]] : [];
      }
      case 'chain':
        return sel.value.reduce((acc, part) => resolve(part, acc), scopes);
      default:
        throw new Error('unsupported selector type ' + sel.type);
    }
  };
  try {
    let doc = document;
    for (const hop of payload.frames) {
      const host = resolve(hop.selector, [doc])[hop.index];
      const inner = host && host.contentDocument;
      if (!inner) return { ok: false, reason: 'frame', detail: JSON.stringify(hop.selector) };
      doc = inner;
    }
    const arg = payload.arg;
    const matches = resolve(payload.selector, [doc]);
    if (payload.index === null) {
      const wanted = (el) => arg.attached || visible(el);
      const found = matches.map((el, i) => (wanted(el) ? i : -1));
      return { ok: true, value: found.filter((i) => i >= 0) };
    }
    const el = matches[payload.index];
    if (!el) return { ok: false, reason: 'missing' };
    const value = (() => { __ACTION__ })();
    return { ok: true, value: value === undefined ? null : value };
  } catch (e) {
    return { ok: false, reason: 'error', detail: String((e && e.message) || e) };
  }
})()"#;

const CLICK_JS: &str = r#"
  if (!arg.force && !visible(el)) throw new Error('element is not visible');
  el.scrollIntoView({ block: 'center', inline: 'center' });
  if (typeof el.click === 'function') {
    el.click();
  } else {
    el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true }));
  }
  return null;"#;

// Native setter so framework bindings observe the change
const FILL_JS: &str = r#"
  const win = el.ownerDocument.defaultView;
  const proto = el.tagName === 'TEXTAREA'
    ? win.HTMLTextAreaElement.prototype
    : win.HTMLInputElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
  el.focus();
  setter.call(el, arg.value);
  el.dispatchEvent(new win.Event('input', { bubbles: true }));
  el.dispatchEvent(new win.Event('change', { bubbles: true }));
  return null;"#;

const ATTRIBUTE_JS: &str = "return el.getAttribute(arg.name);";
const TEXT_JS: &str = "return el.textContent || '';";
const SCROLL_JS: &str = "el.scrollIntoView({ block: 'center', inline: 'center' }); return null;";
const IS_FRAME_JS: &str = "return el.tagName === 'IFRAME' && !!el.contentDocument;";

#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct FrameHop {
    selector: Selector,
    index: usize,
}

fn cdp_error(context: &str, e: impl std::fmt::Display) -> AutomationError {
    AutomationError::PlatformError(format!("{context}: {e}"))
}

async fn run_script(
    page: &Page,
    frames: &[FrameHop],
    selector: &Selector,
    index: Option<usize>,
    action: &str,
    arg: Value,
) -> Result<Value, AutomationError> {
    let payload = json!({
        "frames": frames,
        "selector": selector,
        "index": index,
        "arg": arg,
    });
    let script = SCRIPT_TEMPLATE
        .replace("__ACTION__", action)
        .replace("__PAYLOAD__", &payload.to_string());

    // An expression, not a function declaration: the template is an IIFE
    let params = EvaluateParams::builder()
        .expression(script)
        .return_by_value(true)
        .build()
        .map_err(AutomationError::PlatformError)?;
    let outcome: ScriptOutcome = page
        .evaluate_expression(params)
        .await
        .map_err(|e| cdp_error("script evaluation failed", e))?
        .into_value()
        .map_err(|e| cdp_error("unexpected script result", e))?;

    if outcome.ok {
        return Ok(outcome.value);
    }
    let detail = outcome.detail.unwrap_or_default();
    match outcome.reason.as_deref() {
        Some("missing") => Err(AutomationError::ElementNotFound(format!(
            "'{selector}' match #{} is no longer in the document",
            index.unwrap_or_default()
        ))),
        Some("frame") => Err(AutomationError::FrameNotFound(detail)),
        _ => Err(AutomationError::PlatformError(detail)),
    }
}

/// Stage downloads of `page` under `staging`, named by their GUID.
async fn enable_downloads(page: &Page, staging: &Path) -> Result<(), AutomationError> {
    tokio::fs::create_dir_all(staging).await?;
    let behavior = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::AllowAndName)
        .download_path(staging.to_string_lossy().into_owned())
        .events_enabled(true)
        .build()
        .map_err(AutomationError::PlatformError)?;
    page.execute(behavior)
        .await
        .map_err(|e| cdp_error("could not enable downloads", e))?;
    Ok(())
}

pub struct ChromiumEngine {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    staging_root: PathBuf,
}

impl ChromiumEngine {
    pub async fn launch(settings: &Settings) -> Result<Self, AutomationError> {
        let mut builder = BrowserConfig::builder().request_timeout(settings.timeouts.navigation);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(AutomationError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AutomationError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {}", e);
                }
            }
        });

        info!(headless = settings.headless, "browser launched");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            staging_root: std::env::temp_dir()
                .join("reportflow-downloads")
                .join(Uuid::new_v4().to_string()),
        })
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, AutomationError> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or_else(|| {
                AutomationError::LaunchFailed("browser has been shut down".to_string())
            })?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| AutomationError::LaunchFailed(format!("could not open page: {e}")))?
        };

        let id = Uuid::new_v4().to_string();
        let staging = self.staging_root.join(&id);
        if let Err(e) = enable_downloads(&page, &staging).await {
            // Tab is already open
            if let Err(close_err) = page.close().await {
                warn!("could not close half-initialised page: {}", close_err);
            }
            return Err(e);
        }

        debug!(page_id = %id, "opened page");
        Ok(Arc::new(ChromiumPage {
            id,
            page,
            staging,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }

    async fn shutdown(&self) -> Result<(), AutomationError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = browser.close().await {
            warn!("browser did not close cleanly: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("waiting for browser exit failed: {}", e);
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        let _ = tokio::fs::remove_dir_all(&self.staging_root).await;
        info!("browser stopped");
        Ok(())
    }
}

struct ChromiumPage {
    id: String,
    page: Page,
    staging: PathBuf,
    closed: Arc<AtomicBool>,
}

impl ChromiumPage {
    fn ensure_open(&self) -> Result<(), AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionClosed(self.id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        self.ensure_open()?;
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| AutomationError::Timeout(format!("loading {url} took over {timeout:?}")))?
            .map_err(|e| AutomationError::Navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), AutomationError> {
        self.ensure_open()?;
        tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| AutomationError::Timeout(format!("no navigation within {timeout:?}")))?
            .map_err(|e| AutomationError::Navigation(e.to_string()))?;
        Ok(())
    }

    fn main_frame(&self) -> Arc<dyn FrameDriver> {
        Arc::new(ChromiumFrame {
            page: self.page.clone(),
            path: Vec::new(),
            closed: self.closed.clone(),
        })
    }

    async fn expect_download(
        &self,
        trigger: &ElementHandle,
        timeout: Duration,
    ) -> Result<Download, AutomationError> {
        self.ensure_open()?;
        // Subscribe before clicking so no event is missed
        let mut begins = self
            .page
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(|e| cdp_error("download listener", e))?;
        let mut progress = self
            .page
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(|e| cdp_error("download listener", e))?;

        trigger.click(false).await?;

        let staging = self.staging.clone();
        let completed = async move {
            let begin = begins.next().await.ok_or_else(|| {
                AutomationError::Download("download event stream ended".to_string())
            })?;
            debug!(guid = %begin.guid, file = %begin.suggested_filename, "download started");
            while let Some(event) = progress.next().await {
                if event.guid != begin.guid {
                    continue;
                }
                match event.state {
                    DownloadProgressState::Completed => {
                        return Ok(Download::new(
                            staging.join(&begin.guid),
                            Some(begin.suggested_filename.clone()),
                        ));
                    }
                    DownloadProgressState::Canceled => {
                        return Err(AutomationError::Download(format!(
                            "{} was canceled",
                            begin.suggested_filename
                        )));
                    }
                    _ => {}
                }
            }
            Err(AutomationError::Download(
                "download progress stream ended".to_string(),
            ))
        };

        tokio::time::timeout(timeout, completed).await.map_err(|_| {
            AutomationError::Timeout(format!(
                "no download from {} completed within {timeout:?}",
                trigger.describe()
            ))
        })?
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.ensure_open()?;
        let bytes = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| cdp_error("screenshot failed", e))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self
            .page
            .clone()
            .close()
            .await
            .map_err(|e| cdp_error("closing page", e));
        let _ = tokio::fs::remove_dir_all(&self.staging).await;
        result
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ChromiumFrame {
    page: Page,
    path: Vec<FrameHop>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameDriver for ChromiumFrame {
    fn describe(&self) -> String {
        match self.path.last() {
            Some(hop) => format!("frame '{}'", hop.selector),
            None => "main frame".to_string(),
        }
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, AutomationError> {
        self.handles(selector, false).await
    }

    async fn query_attached(
        &self,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, AutomationError> {
        self.handles(selector, true).await
    }
}

impl ChromiumFrame {
    async fn handles(
        &self,
        selector: &Selector,
        attached: bool,
    ) -> Result<Vec<ElementHandle>, AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionClosed(self.describe()));
        }
        let arg = json!({ "attached": attached });
        let value = run_script(&self.page, &self.path, selector, None, "return null;", arg).await?;
        let indices: Vec<usize> = serde_json::from_value(value)
            .map_err(|e| cdp_error("unexpected query result", e))?;
        Ok(indices
            .into_iter()
            .map(|index| {
                ElementHandle::new(Box::new(ChromiumElement {
                    page: self.page.clone(),
                    frames: self.path.clone(),
                    selector: selector.clone(),
                    index,
                    closed: self.closed.clone(),
                }))
            })
            .collect())
    }
}

#[derive(Clone)]
struct ChromiumElement {
    page: Page,
    frames: Vec<FrameHop>,
    selector: Selector,
    index: usize,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChromiumElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumElement")
            .field("selector", &self.selector.to_string())
            .field("index", &self.index)
            .field("frame_depth", &self.frames.len())
            .finish()
    }
}

impl ChromiumElement {
    async fn run(&self, action: &str, arg: Value) -> Result<Value, AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionClosed(self.describe()));
        }
        run_script(
            &self.page,
            &self.frames,
            &self.selector,
            Some(self.index),
            action,
            arg,
        )
        .await
    }
}

#[async_trait]
impl ElementImpl for ChromiumElement {
    fn describe(&self) -> String {
        format!("'{}' #{}", self.selector, self.index)
    }

    async fn click(&self, force: bool) -> Result<(), AutomationError> {
        self.run(CLICK_JS, json!({ "force": force })).await.map(|_| ())
    }

    async fn fill(&self, value: &str) -> Result<(), AutomationError> {
        self.run(FILL_JS, json!({ "value": value })).await.map(|_| ())
    }

    async fn clear(&self) -> Result<(), AutomationError> {
        self.fill("").await
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        let value = self.run(ATTRIBUTE_JS, json!({ "name": name })).await?;
        serde_json::from_value(value).map_err(|e| cdp_error("unexpected attribute value", e))
    }

    async fn text(&self) -> Result<String, AutomationError> {
        let value = self.run(TEXT_JS, Value::Null).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.run(SCROLL_JS, Value::Null).await.map(|_| ())
    }

    async fn content_frame(&self) -> Result<Option<Arc<dyn FrameDriver>>, AutomationError> {
        let is_frame = self.run(IS_FRAME_JS, Value::Null).await?;
        if !is_frame.as_bool().unwrap_or(false) {
            return Ok(None);
        }
        let mut path = self.frames.clone();
        path.push(FrameHop {
            selector: self.selector.clone(),
            index: self.index,
        });
        Ok(Some(Arc::new(ChromiumFrame {
            page: self.page.clone(),
            path,
            closed: self.closed.clone(),
        })))
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }
}

//! Reusable interaction primitives.
//!
//! Every primitive waits for a bounded time and turns engine errors into a
//! `bool`/`Option`, logging what went wrong. Workflows decide which failures
//! are fatal for their phase.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::artifact::{ArtifactTemplate, DownloadArtifact};
use crate::config::Settings;
use crate::element::ElementHandle;
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::platforms::{FrameDriver, PageDriver};
use crate::selector::Selector;
use crate::session::Session;

const OVERLAY_DISMISS_TIMEOUT: Duration = Duration::from_secs(2);

/// A multi-select dropdown made of checkbox options
#[derive(Debug, Clone)]
pub struct Multiselect {
    /// Clicking this opens the option panel
    pub container: Selector,
    pub options: Selector,
    /// Preferred over ticking options one by one when present
    pub select_all: Option<Selector>,
    pub max_items: usize,
    /// How long to wait for the container to render
    pub timeout: Duration,
}

/// Step primitives bound to one page and one document of that page
#[derive(Clone)]
pub struct Steps {
    page: Arc<dyn PageDriver>,
    frame: Arc<dyn FrameDriver>,
    default_timeout: Duration,
    settings: Arc<Settings>,
}

impl Steps {
    pub fn new(session: &Session, settings: Arc<Settings>) -> Self {
        Self {
            page: session.page().clone(),
            frame: session.page().main_frame(),
            default_timeout: session.default_timeout(),
            settings,
        }
    }

    fn scoped(&self, frame: Arc<dyn FrameDriver>) -> Self {
        Self {
            page: self.page.clone(),
            frame,
            default_timeout: self.default_timeout,
            settings: self.settings.clone(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The session's bound for waits that have no dedicated timeout
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Which document these steps act on
    pub fn frame_description(&self) -> String {
        self.frame.describe()
    }

    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.frame.clone(), selector).set_default_timeout(self.default_timeout)
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> bool {
        match self.page.goto(url, timeout).await {
            Ok(()) => {
                debug!("navigated to {}", url);
                true
            }
            Err(e) => {
                error!("navigation to {} failed: {}", url, e);
                false
            }
        }
    }

    /// Wait for the navigation started by a previous action.
    pub async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), AutomationError> {
        self.page.wait_for_navigation(timeout).await
    }

    pub async fn wait_for(
        &self,
        selector: impl Into<Selector>,
        timeout: Duration,
    ) -> Option<ElementHandle> {
        let locator = self.locator(selector);
        match locator.wait(Some(timeout)).await {
            Ok(element) => Some(element),
            Err(e) if e.is_timeout() => {
                warn!(selector = %locator.selector(), "{}", e);
                None
            }
            Err(e) => {
                error!(selector = %locator.selector(), "waiting for element failed: {}", e);
                None
            }
        }
    }

    /// Wait for the element, then click it without visibility checks.
    pub async fn wait_and_click(&self, selector: impl Into<Selector>, timeout: Duration) -> bool {
        let selector = selector.into();
        let Some(element) = self.wait_for(selector.clone(), timeout).await else {
            return false;
        };
        match element.click(true).await {
            Ok(()) => {
                debug!(selector = %selector, "clicked");
                true
            }
            Err(e) => {
                error!(selector = %selector, "click failed: {}", e);
                false
            }
        }
    }

    pub async fn fill(
        &self,
        selector: impl Into<Selector>,
        value: &str,
        timeout: Duration,
    ) -> bool {
        let selector = selector.into();
        let Some(element) = self.wait_for(selector.clone(), timeout).await else {
            return false;
        };
        let filled = async {
            element.clear().await?;
            element.fill(value).await
        };
        match filled.await {
            Ok(()) => true,
            Err(e) => {
                error!(selector = %selector, "fill failed: {}", e);
                false
            }
        }
    }

    /// Read an attribute of the first match attached right now, displayed
    /// or not. Checkbox widgets keep their native input hidden.
    pub async fn attribute(&self, selector: impl Into<Selector>, name: &str) -> Option<String> {
        let locator = self.locator(selector);
        let element = match locator.attached().await {
            Ok(found) => found.into_iter().next()?,
            Err(e) => {
                debug!(selector = %locator.selector(), "attribute lookup failed: {}", e);
                return None;
            }
        };
        element.attribute(name).await.ok().flatten()
    }

    /// Open a multiselect, tick options, close it again.
    ///
    /// Returns `false` only when the widget itself never rendered; trouble
    /// with individual options is logged.
    pub async fn select_from_multiselect(&self, widget: &Multiselect) -> bool {
        if !self.wait_and_click(widget.container.clone(), widget.timeout).await {
            warn!(widget = %widget.container, "multiselect not found");
            return false;
        }
        self.settle("multiselect panel", self.settings.settle.widget_open)
            .await;

        let mut picked_all = false;
        if let Some(select_all) = &widget.select_all {
            if self.wait_and_click(select_all.clone(), widget.timeout).await {
                info!(widget = %widget.container, "selected all options");
                picked_all = true;
            }
        }

        if !picked_all {
            let options = self.locator(widget.options.clone());
            match options.wait_all(Some(widget.timeout)).await {
                Ok(options) => {
                    let available = options.len();
                    let mut ticked = 0;
                    for option in options.iter().take(widget.max_items) {
                        match option.click(true).await {
                            Ok(()) => ticked += 1,
                            Err(e) => warn!("could not tick {}: {}", option.describe(), e),
                        }
                        self.settle("option click", self.settings.settle.option_click)
                            .await;
                    }
                    info!(
                        widget = %widget.container,
                        "ticked {} of {} options (limit {})",
                        ticked,
                        available,
                        widget.max_items
                    );
                }
                Err(e) => warn!(widget = %widget.container, "no options to select: {}", e),
            }
        }

        self.dismiss_overlay().await;
        true
    }

    /// Click the document body to close any open dropdown panel.
    async fn dismiss_overlay(&self) {
        match self.locator("body").wait(Some(OVERLAY_DISMISS_TIMEOUT)).await {
            Ok(body) => {
                if let Err(e) = body.click(true).await {
                    debug!("clicking outside the widget failed: {}", e);
                }
            }
            Err(e) => debug!("no body to click in {}: {}", self.frame.describe(), e),
        }
    }

    /// Run `body` against the document of the iframe matching `iframe`.
    /// `None` when the iframe never shows up or is not a frame.
    pub async fn within_iframe<T, F, Fut>(
        &self,
        iframe: impl Into<Selector>,
        timeout: Duration,
        body: F,
    ) -> Option<T>
    where
        F: FnOnce(Steps) -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        let iframe = iframe.into();
        let host = self.wait_for(iframe.clone(), timeout).await?;
        let frame = match host.content_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                error!(selector = %iframe, "element does not host a document");
                return None;
            }
            Err(e) => {
                error!(selector = %iframe, "could not enter frame: {}", e);
                return None;
            }
        };
        debug!("entering {}", frame.describe());
        Some(body(self.scoped(frame)).await)
    }

    /// Click `trigger` and save the file it downloads under `destination`.
    ///
    /// A disabled trigger is never clicked: it yields `None` straight away.
    pub async fn expect_download(
        &self,
        trigger: impl Into<Selector>,
        destination: &ArtifactTemplate,
        timeout: Duration,
    ) -> Option<PathBuf> {
        let trigger = trigger.into();
        let element = self.wait_for(trigger.clone(), timeout).await?;
        match element.is_disabled().await {
            Ok(false) => {}
            Ok(true) => {
                warn!(selector = %trigger, "download control is disabled, nothing to export");
                return None;
            }
            Err(e) => {
                error!(selector = %trigger, "could not inspect download control: {}", e);
                return None;
            }
        }

        let mut artifact = DownloadArtifact::pending(trigger, destination);
        match self
            .page
            .expect_download(&element, self.settings.timeouts.download)
            .await
        {
            Ok(download) => artifact.save(download).await.ok().map(|p| p.to_path_buf()),
            Err(e) => {
                artifact.fail(&e.to_string());
                None
            }
        }
    }

    /// Fixed pause for UI that gives no readiness signal.
    pub async fn settle(&self, what: &str, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        debug!("settling {:?} for {}", delay, what);
        tokio::time::sleep(delay).await;
    }

    /// Wait until `selector` renders, at most `max`. Soft: `false` on timeout.
    pub async fn settle_until(&self, selector: impl Into<Selector>, max: Duration) -> bool {
        let locator = self.locator(selector);
        match locator.wait(Some(max)).await {
            Ok(_) => true,
            Err(e) => {
                debug!(selector = %locator.selector(), "still not ready after {:?}: {}", max, e);
                false
            }
        }
    }
}

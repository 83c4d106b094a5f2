use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::errors::AutomationError;
use crate::platforms::FrameDriver;

/// Interface for platform-specific element implementations
#[async_trait]
pub trait ElementImpl: Send + Sync + Debug {
    /// Short human-readable description used in logs and errors
    fn describe(&self) -> String;
    async fn click(&self, force: bool) -> Result<(), AutomationError>;
    async fn fill(&self, value: &str) -> Result<(), AutomationError>;
    async fn clear(&self) -> Result<(), AutomationError>;
    async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError>;
    async fn text(&self) -> Result<String, AutomationError>;
    async fn scroll_into_view(&self) -> Result<(), AutomationError>;
    /// The document hosted by this element, when it is an iframe
    async fn content_frame(&self) -> Result<Option<Arc<dyn FrameDriver>>, AutomationError>;
    fn clone_box(&self) -> Box<dyn ElementImpl>;
}

/// An element resolved inside a page or frame document
#[derive(Debug)]
pub struct ElementHandle {
    inner: Box<dyn ElementImpl>,
}

impl Clone for ElementHandle {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl ElementHandle {
    /// Create a new element handle from a platform-specific implementation
    pub fn new(impl_: Box<dyn ElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    /// Click on this element. A forced click skips the visibility check and
    /// dispatches the click straight to the element.
    #[instrument(level = "debug", skip(self), fields(element = %self.describe()))]
    pub async fn click(&self, force: bool) -> Result<(), AutomationError> {
        self.inner.click(force).await
    }

    /// Replace the element's value with `value`
    #[instrument(level = "debug", skip(self, value), fields(element = %self.describe()))]
    pub async fn fill(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.fill(value).await
    }

    pub async fn clear(&self) -> Result<(), AutomationError> {
        self.inner.clear().await
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        self.inner.attribute(name).await
    }

    pub async fn text(&self) -> Result<String, AutomationError> {
        self.inner.text().await
    }

    pub async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.inner.scroll_into_view().await
    }

    pub async fn content_frame(&self) -> Result<Option<Arc<dyn FrameDriver>>, AutomationError> {
        self.inner.content_frame().await
    }

    /// Whether the element reports itself as disabled, either through
    /// `aria-disabled="true"` or a bare `disabled` attribute.
    pub async fn is_disabled(&self) -> Result<bool, AutomationError> {
        if let Some(aria) = self.attribute("aria-disabled").await? {
            if aria.trim().eq_ignore_ascii_case("true") {
                return Ok(true);
            }
        }
        Ok(self.attribute("disabled").await?.is_some())
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::element::ElementHandle;
use crate::errors::AutomationError;
use crate::platforms::FrameDriver;
use crate::selector::Selector;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A high-level API for finding elements inside one document
///
/// Queries are re-run until they match or the timeout runs out, so a locator
/// can be created before the element it targets has rendered.
#[derive(Clone)]
pub struct Locator {
    frame: Arc<dyn FrameDriver>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
}

impl Locator {
    /// Create a new locator with the given selector
    pub fn new(frame: Arc<dyn FrameDriver>, selector: impl Into<Selector>) -> Self {
        Self {
            frame,
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to wait methods.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Scope a further selector to the matches of this one
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator {
            frame: self.frame.clone(),
            selector: self.selector.clone().then(selector),
            timeout: self.timeout,
        }
    }

    /// Current matches, without waiting
    pub async fn all(&self) -> Result<Vec<ElementHandle>, AutomationError> {
        self.selector.validate()?;
        self.frame.query_all(&self.selector).await
    }

    /// Current matches including hidden ones, without waiting
    pub async fn attached(&self) -> Result<Vec<ElementHandle>, AutomationError> {
        self.selector.validate()?;
        self.frame.query_attached(&self.selector).await
    }

    pub async fn count(&self) -> Result<usize, AutomationError> {
        Ok(self.all().await?.len())
    }

    pub async fn first(&self, timeout: Option<Duration>) -> Result<ElementHandle, AutomationError> {
        let element = self.wait(timeout).await?;
        Ok(element)
    }

    /// Wait for an element matching the locator to appear, up to the specified timeout.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<ElementHandle, AutomationError> {
        let mut matches = self.wait_all(timeout).await?;
        Ok(matches.swap_remove(0))
    }

    /// Wait until at least one element matches, then return every match.
    pub async fn wait_all(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<ElementHandle>, AutomationError> {
        self.selector.validate()?;
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;
        let mut last_error: Option<AutomationError> = None;

        loop {
            match self.frame.query_all(&self.selector).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => {}
                // Terminal: retrying cannot make these succeed
                Err(e @ AutomationError::InvalidSelector(_))
                | Err(e @ AutomationError::SessionClosed(_)) => return Err(e),
                Err(e) => {
                    debug!("query for '{}' failed, retrying: {}", self.selector, e);
                    last_error = Some(e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }

        let detail = match last_error {
            Some(e) => format!(" (last error: {e})"),
            None => String::new(),
        };
        Err(AutomationError::Timeout(format!(
            "No element matched '{}' in {} within {:?}{}",
            self.selector,
            self.frame.describe(),
            effective_timeout,
            detail
        )))
    }
}

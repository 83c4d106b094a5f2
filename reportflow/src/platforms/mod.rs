use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Settings;
use crate::element::ElementHandle;
use crate::errors::AutomationError;
use crate::selector::Selector;

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod simulated;

/// A running browser that hands out isolated pages
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, AutomationError>;
    /// Stop the browser process. Calling this more than once is harmless.
    async fn shutdown(&self) -> Result<(), AutomationError>;
}

/// One browser page (tab) with its own navigation state and downloads
#[async_trait]
pub trait PageDriver: Send + Sync {
    fn id(&self) -> String;
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError>;
    /// Wait for the navigation triggered by a previous action to settle
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), AutomationError>;
    fn main_frame(&self) -> Arc<dyn FrameDriver>;
    /// Click `trigger` and wait for the download it starts to complete
    async fn expect_download(
        &self,
        trigger: &ElementHandle,
        timeout: Duration,
    ) -> Result<Download, AutomationError>;
    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError>;
    async fn close(&self) -> Result<(), AutomationError>;
    fn is_closed(&self) -> bool;
}

/// A document: the page's top frame or the content of an iframe
#[async_trait]
pub trait FrameDriver: Send + Sync {
    fn describe(&self) -> String;
    /// Matches currently displayed, in document order
    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, AutomationError>;
    /// Every match attached to the document, displayed or not
    async fn query_attached(
        &self,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, AutomationError>;
}

/// A completed download sitting in the browser's staging area
#[derive(Debug)]
pub struct Download {
    suggested_filename: Option<String>,
    staged_at: PathBuf,
}

impl Download {
    pub fn new(staged_at: PathBuf, suggested_filename: Option<String>) -> Self {
        Self {
            suggested_filename,
            staged_at,
        }
    }

    pub fn suggested_filename(&self) -> Option<&str> {
        self.suggested_filename.as_deref()
    }

    pub fn staged_at(&self) -> &Path {
        &self.staged_at
    }

    /// Move the downloaded file to `destination`, creating parent directories.
    pub async fn save_as(self, destination: &Path) -> Result<(), AutomationError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if tokio::fs::rename(&self.staged_at, destination).await.is_ok() {
            return Ok(());
        }
        // Staging dir may live on another filesystem
        debug!(
            "rename of {} failed, copying instead",
            self.staged_at.display()
        );
        tokio::fs::copy(&self.staged_at, destination)
            .await
            .map_err(|e| {
                AutomationError::Download(format!(
                    "could not save {} to {}: {e}",
                    self.staged_at.display(),
                    destination.display()
                ))
            })?;
        let _ = tokio::fs::remove_file(&self.staged_at).await;
        Ok(())
    }
}

/// Launch the browser engine configured for this build
pub async fn create_engine(settings: &Settings) -> Result<Arc<dyn BrowserEngine>, AutomationError> {
    #[cfg(feature = "chromium")]
    {
        Ok(Arc::new(chromium::ChromiumEngine::launch(settings).await?))
    }
    #[cfg(not(feature = "chromium"))]
    {
        let _ = settings;
        Err(AutomationError::LaunchFailed(
            "no browser backend compiled in; enable the `chromium` feature".to_string(),
        ))
    }
}

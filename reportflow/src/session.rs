use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::diagnostics;
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::platforms::{create_engine, BrowserEngine, PageDriver};
use crate::selector::Selector;

/// Owns the process-wide browser. Start once, share, stop at shutdown.
pub struct BrowserHost {
    engine: Arc<dyn BrowserEngine>,
    stopped: AtomicBool,
}

impl BrowserHost {
    pub fn new(engine: Arc<dyn BrowserEngine>) -> Self {
        Self {
            engine,
            stopped: AtomicBool::new(false),
        }
    }

    /// Launch the configured browser backend
    pub async fn launch(settings: &Settings) -> Result<Self, AutomationError> {
        Ok(Self::new(create_engine(settings).await?))
    }

    pub fn engine(&self) -> Arc<dyn BrowserEngine> {
        self.engine.clone()
    }

    /// Stop the browser. Only the first call has an effect.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.engine.shutdown().await {
            Ok(()) => info!("{} browser host stopped", self.engine.name()),
            Err(e) => warn!("browser shutdown failed: {}", e),
        }
    }
}

/// Hands out one fresh page per run, with at most `max_concurrent_runs`
/// pages open at a time.
pub struct SessionProvider {
    engine: Arc<dyn BrowserEngine>,
    limiter: Arc<Semaphore>,
    page_timeout: Duration,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl SessionProvider {
    pub fn new(engine: Arc<dyn BrowserEngine>, settings: &Settings) -> Self {
        Self {
            engine,
            limiter: Arc::new(Semaphore::new(settings.max_concurrent_runs.max(1))),
            page_timeout: settings.page_timeout,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Open an isolated page. Waits for a free slot when the concurrency
    /// limit is reached. Failure to open the page is fatal for the run.
    #[instrument(skip(self))]
    pub async fn acquire_session(&self) -> Result<Session, AutomationError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| {
                AutomationError::SessionClosed("session provider is shut down".to_string())
            })?;

        let page = self.engine.new_page().await.map_err(|e| match e {
            AutomationError::LaunchFailed(_) => e,
            other => AutomationError::LaunchFailed(other.to_string()),
        })?;

        let session = Session {
            id: Uuid::new_v4(),
            page,
            default_timeout: self.page_timeout,
            authenticated: AtomicBool::new(false),
            diagnostics: Mutex::new(Vec::new()),
            released: false,
            _permit: permit,
        };
        self.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(session = %session.id, page = %session.page.id(), "session acquired");
        Ok(session)
    }

    /// Close the session's page. Best effort: a failing close is logged and
    /// the session still counts as released.
    #[instrument(skip(self, session), fields(session = %session.id))]
    pub async fn release_session(&self, mut session: Session) {
        session.released = true;
        if !session.page.is_closed() {
            if let Err(e) = session.page.close().await {
                warn!("closing page failed during release: {}", e);
            }
        }
        self.released.fetch_add(1, Ordering::SeqCst);
        debug!("session released");
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Free run slots right now
    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }
}

/// One isolated page, exclusively owned by one run
pub struct Session {
    id: Uuid,
    page: Arc<dyn PageDriver>,
    default_timeout: Duration,
    authenticated: AtomicBool,
    diagnostics: Mutex<Vec<PathBuf>>,
    released: bool,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn page(&self) -> &Arc<dyn PageDriver> {
        &self.page
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_authenticated(&self) {
        self.authenticated.store(true, Ordering::SeqCst);
    }

    /// Locator on the page's top document, using the session's default timeout
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.page.main_frame(), selector).set_default_timeout(self.default_timeout)
    }

    /// Snapshot the page and remember where it went
    pub async fn capture_diagnostic(&self, dir: &Path, label: &str) -> Option<PathBuf> {
        let path = diagnostics::capture(self.page.as_ref(), dir, label).await?;
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path.clone());
        Some(path)
    }

    pub fn last_diagnostic(&self) -> Option<PathBuf> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(session = %self.id, "session dropped without release, closing its page");
        let page = self.page.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("background page close failed: {}", e);
                }
            });
        }
    }
}

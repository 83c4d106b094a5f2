//! Browser-driven report extraction
//!
//! Drives a real browser through login, navigation, filter selection, report
//! generation and file download for web applications that offer no API,
//! and hands back the path of the saved report.

use std::sync::Arc;

use tracing::instrument;

pub mod artifact;
pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod element;
pub mod errors;
pub mod locator;
pub mod orchestrator;
pub mod platforms;
pub mod rehearsal;
pub mod selector;
pub mod session;
pub mod steps;
#[cfg(test)]
mod tests;
pub mod workflows;

pub use artifact::{ArtifactState, ArtifactTemplate, DownloadArtifact};
pub use auth::Authenticator;
pub use config::{SettleDelays, Settings, Timeouts};
pub use element::ElementHandle;
pub use errors::{AutomationError, ConfigError};
pub use locator::Locator;
pub use orchestrator::{Orchestrator, RunResult, RunStatus};
pub use platforms::{BrowserEngine, FrameDriver, PageDriver};
pub use selector::Selector;
pub use session::{BrowserHost, Session, SessionProvider};
pub use steps::{Multiselect, Steps};
pub use workflows::{Phase, PhaseOutcome, ReportKind, ReportWorkflow};

/// The main entry point: one browser host plus the orchestrator that runs
/// extractions against it.
pub struct ReportFlow {
    host: BrowserHost,
    orchestrator: Orchestrator,
}

impl ReportFlow {
    /// Launch the configured browser backend
    pub async fn launch(settings: Settings) -> Result<Self, AutomationError> {
        let host = BrowserHost::launch(&settings).await?;
        Ok(Self::with_host(host, settings))
    }

    /// Use an already running engine, e.g. the simulated one
    pub fn with_engine(engine: Arc<dyn BrowserEngine>, settings: Settings) -> Self {
        Self::with_host(BrowserHost::new(engine), settings)
    }

    fn with_host(host: BrowserHost, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let provider = Arc::new(SessionProvider::new(host.engine(), &settings));
        Self {
            orchestrator: Orchestrator::new(provider, settings),
            host,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, kind: ReportKind) -> Result<RunResult, AutomationError> {
        self.orchestrator.run_report_extraction(kind).await
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &Arc<SessionProvider> {
        self.orchestrator.provider()
    }

    pub async fn shutdown(&self) {
        self.host.stop().await;
    }
}

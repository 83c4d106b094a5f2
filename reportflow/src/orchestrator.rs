use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::errors::AutomationError;
use crate::session::{Session, SessionProvider};
use crate::steps::Steps;
use crate::workflows::{workflow_for, Phase, PhaseOutcome, ReportKind, ReportWorkflow};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    AuthenticationFailed,
    FailedAt { phase: Phase },
}

/// Terminal outcome of one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    run_id: Uuid,
    kind: ReportKind,
    #[serde(flatten)]
    status: RunStatus,
    artifact: Option<PathBuf>,
    diagnostic: Option<PathBuf>,
    phases_executed: Vec<Phase>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        match self.status {
            RunStatus::FailedAt { phase } => Some(phase),
            _ => None,
        }
    }

    /// Saved report, present only on success
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub fn diagnostic(&self) -> Option<&Path> {
        self.diagnostic.as_deref()
    }

    pub fn phases_executed(&self) -> &[Phase] {
        &self.phases_executed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn message(&self) -> String {
        match (&self.status, &self.artifact) {
            (RunStatus::Succeeded, Some(path)) => {
                format!("{} report saved to {}", self.kind, path.display())
            }
            (RunStatus::Succeeded, None) => format!("{} run succeeded", self.kind),
            (RunStatus::AuthenticationFailed, _) => {
                "login to the target application failed".to_string()
            }
            (RunStatus::FailedAt { phase }, _) => {
                format!("{} run failed during {}", self.kind, phase)
            }
        }
    }
}

/// Drives one report extraction from session acquisition to release
pub struct Orchestrator {
    provider: Arc<SessionProvider>,
    authenticator: Authenticator,
    settings: Arc<Settings>,
}

impl Orchestrator {
    pub fn new(provider: Arc<SessionProvider>, settings: Arc<Settings>) -> Self {
        Self {
            provider,
            authenticator: Authenticator::new(settings.clone()),
            settings,
        }
    }

    pub fn provider(&self) -> &Arc<SessionProvider> {
        &self.provider
    }

    /// Run the workflow for `kind`.
    ///
    /// `Err` only when no session could be opened; every other failure is
    /// described by the returned [`RunResult`].
    #[instrument(skip(self, kind), fields(kind = %kind))]
    pub async fn run_report_extraction(
        &self,
        kind: ReportKind,
    ) -> Result<RunResult, AutomationError> {
        let workflow = workflow_for(kind, self.settings.clone());
        self.run_workflow(workflow.as_ref()).await
    }

    pub async fn run_workflow(
        &self,
        workflow: &dyn ReportWorkflow,
    ) -> Result<RunResult, AutomationError> {
        let started_at = Utc::now();
        let session = self.provider.acquire_session().await.map_err(|e| {
            error!("could not open a browser session: {}", e);
            e
        })?;
        let run_id = session.id();
        let span = info_span!("run", run_id = %run_id, kind = %workflow.kind());

        let (status, artifact, phases_executed) =
            self.drive(&session, workflow).instrument(span.clone()).await;
        let diagnostic = session.last_diagnostic();
        self.provider.release_session(session).await;

        let result = RunResult {
            run_id,
            kind: workflow.kind(),
            status,
            artifact,
            diagnostic,
            phases_executed,
            started_at,
            finished_at: Utc::now(),
        };
        span.in_scope(|| match result.status {
            RunStatus::Succeeded => info!("{}", result.message()),
            _ => warn!("{}", result.message()),
        });
        Ok(result)
    }

    async fn drive(
        &self,
        session: &Session,
        workflow: &dyn ReportWorkflow,
    ) -> (RunStatus, Option<PathBuf>, Vec<Phase>) {
        if !self.authenticator.login(session).await {
            return (RunStatus::AuthenticationFailed, None, Vec::new());
        }

        let steps = Steps::new(session, self.settings.clone());
        let mut executed = Vec::new();
        let mut artifact = None;

        for &phase in workflow.phases() {
            executed.push(phase);
            info!(phase = %phase, "starting phase");
            match workflow.run_phase(phase, &steps).await {
                PhaseOutcome::Completed => {}
                PhaseOutcome::Downloaded(path) => artifact = Some(path),
                PhaseOutcome::Failed => {
                    error!(phase = %phase, "phase failed, skipping the rest of the run");
                    session
                        .capture_diagnostic(
                            &self.settings.diagnostics_dir,
                            &workflow.failure_label(phase),
                        )
                        .await;
                    return (RunStatus::FailedAt { phase }, None, executed);
                }
            }
        }

        match (artifact, executed.last().copied()) {
            (Some(path), _) => (RunStatus::Succeeded, Some(path), executed),
            (None, last) => {
                let phase = last.unwrap_or(Phase::DownloadReport);
                error!(phase = %phase, "workflow finished without producing a report");
                (RunStatus::FailedAt { phase }, None, executed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_json_shape() {
        let now = Utc::now();
        let result = RunResult {
            run_id: Uuid::nil(),
            kind: ReportKind::ItemWiseGrn,
            status: RunStatus::FailedAt {
                phase: Phase::ConfigureDelivery,
            },
            artifact: None,
            diagnostic: Some(PathBuf::from(
                "diag/item_wise_grn_configure_delivery_error.png",
            )),
            phases_executed: vec![
                Phase::NavigateToReport,
                Phase::ConfigureFilters,
                Phase::ConfigureDelivery,
            ],
            started_at: now,
            finished_at: now,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed_at");
        assert_eq!(json["phase"], "configure_delivery");
        assert_eq!(json["kind"], "item_wise_grn");
        assert!(json["artifact"].is_null());

        let back: RunResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.failed_phase(), Some(Phase::ConfigureDelivery));
        assert_eq!(back.message(), "item_wise_grn run failed during configure_delivery");
    }
}

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{init_tracing, orchestrator, test_settings};
use reportflow::platforms::simulated::SimulatedSite;
use reportflow::rehearsal::rehearsal_site;
use reportflow::{
    AutomationError, BrowserHost, Phase, PhaseOutcome, ReportFlow, ReportKind, ReportWorkflow,
    RunStatus, SessionProvider, Steps,
};

/// Records which phases ran and fails on the configured one
struct ScriptedWorkflow {
    fail_on: Phase,
    ran: Mutex<Vec<Phase>>,
}

#[async_trait]
impl ReportWorkflow for ScriptedWorkflow {
    fn kind(&self) -> ReportKind {
        ReportKind::ItemWiseGrn
    }

    fn phases(&self) -> &'static [Phase] {
        &[
            Phase::NavigateToReport,
            Phase::ConfigureFilters,
            Phase::ConfigureDelivery,
            Phase::GenerateReport,
            Phase::DownloadReport,
        ]
    }

    async fn run_phase(&self, phase: Phase, _steps: &Steps) -> PhaseOutcome {
        self.ran.lock().unwrap().push(phase);
        if phase == self.fail_on {
            PhaseOutcome::Failed
        } else {
            PhaseOutcome::Completed
        }
    }
}

#[tokio::test]
async fn test_failed_phase_stops_the_run() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let orchestrator = orchestrator(&site, test_settings(dir.path()));
    let workflow = ScriptedWorkflow {
        fail_on: Phase::ConfigureFilters,
        ran: Mutex::new(Vec::new()),
    };

    let result = orchestrator.run_workflow(&workflow).await.unwrap();

    assert_eq!(
        result.status(),
        RunStatus::FailedAt {
            phase: Phase::ConfigureFilters
        }
    );
    assert_eq!(
        *workflow.ran.lock().unwrap(),
        vec![Phase::NavigateToReport, Phase::ConfigureFilters]
    );
    assert_eq!(result.phases_executed(), workflow.ran.lock().unwrap().as_slice());
    assert!(result.diagnostic().is_some());
    assert_eq!(orchestrator.provider().acquired(), orchestrator.provider().released());
}

/// Completes every phase without ever producing a file
struct NoDownload;

#[async_trait]
impl ReportWorkflow for NoDownload {
    fn kind(&self) -> ReportKind {
        ReportKind::VendorList
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::NavigateToReport, Phase::DownloadReport]
    }

    async fn run_phase(&self, _phase: Phase, _steps: &Steps) -> PhaseOutcome {
        PhaseOutcome::Completed
    }
}

#[tokio::test]
async fn test_run_without_artifact_is_not_success() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator.run_workflow(&NoDownload).await.unwrap();

    assert_eq!(result.failed_phase(), Some(Phase::DownloadReport));
    assert!(result.artifact().is_none());
    assert_eq!(orchestrator.provider().released(), 1);
}

#[tokio::test]
async fn test_launch_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let site = SimulatedSite::new();
    site.fail_new_pages("chrome executable not found");
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let err = orchestrator
        .run_report_extraction(ReportKind::PurchaseOrder)
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::LaunchFailed(_)), "{err}");
    assert_eq!(orchestrator.provider().acquired(), 0);
    assert_eq!(orchestrator.provider().released(), 0);
    // The slot is handed back for the next attempt
    assert_eq!(orchestrator.provider().available_slots(), 2);
}

#[tokio::test]
async fn test_admission_control_bounds_open_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let mut settings = test_settings(dir.path()).with_max_concurrent_runs(2);
    settings.settle.po_generation = Duration::from_millis(80);
    let orchestrator = Arc::new(orchestrator(&site, settings));

    let runs: Vec<_> = (0..5)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .run_report_extraction(ReportKind::PurchaseOrder)
                    .await
            })
        })
        .collect();

    let mut artifacts = Vec::new();
    for run in runs {
        let result = run.await.unwrap().unwrap();
        assert!(result.is_success(), "{}", result.message());
        artifacts.push(result.artifact().unwrap().to_path_buf());
    }

    assert!(site.max_open_pages() <= 2, "saw {} pages", site.max_open_pages());
    assert_eq!(site.pages_opened(), 5);
    assert_eq!(site.open_pages(), 0);
    assert_eq!(orchestrator.provider().acquired(), 5);
    assert_eq!(orchestrator.provider().released(), 5);

    artifacts.sort();
    artifacts.dedup();
    assert_eq!(artifacts.len(), 5, "artifact paths must be unique");
}

#[tokio::test]
async fn test_unreleased_session_closes_its_page() {
    let dir = tempfile::tempdir().unwrap();
    let site = SimulatedSite::new();
    let settings = test_settings(dir.path());
    let provider = SessionProvider::new(Arc::new(site.engine()), &settings);

    let session = provider.acquire_session().await.unwrap();
    assert!(!session.is_authenticated());
    assert_eq!(provider.available_slots(), 1);
    drop(session);

    for _ in 0..50 {
        if site.pages_closed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(site.pages_closed(), 1);
    assert_eq!(provider.available_slots(), 2);
}

#[tokio::test]
async fn test_release_tolerates_closed_page() {
    let dir = tempfile::tempdir().unwrap();
    let site = SimulatedSite::new();
    let settings = test_settings(dir.path());
    let provider = SessionProvider::new(Arc::new(site.engine()), &settings);

    let session = provider.acquire_session().await.unwrap();
    session.page().close().await.unwrap();
    provider.release_session(session).await;

    assert_eq!(provider.released(), 1);
    assert_eq!(site.pages_closed(), 1);
}

#[tokio::test]
async fn test_host_stop_is_idempotent() {
    let site = SimulatedSite::new();
    let host = BrowserHost::new(Arc::new(site.engine()));
    host.stop().await;
    host.stop().await;
    assert_eq!(site.shutdowns(), 1);
}

#[tokio::test]
async fn test_report_flow_facade_runs_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let flow = ReportFlow::with_engine(Arc::new(site.engine()), test_settings(dir.path()));

    let result = flow.run(ReportKind::VendorList).await.unwrap();
    assert!(result.is_success(), "{}", result.message());
    assert_eq!(flow.sessions().released(), 1);

    flow.shutdown().await;
    assert_eq!(site.shutdowns(), 1);
}

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use super::{Phase, PhaseOutcome, ReportKind, ReportWorkflow};
use crate::config::Settings;
use crate::steps::Steps;

pub const MY_SUPPLIERS: &str = r#"button:has-text("My Suppliers")"#;
pub const CREATE_CSV: &str = r#"button[ng-click="vm.createCsv()"]"#;

const PHASES: &[Phase] = &[Phase::NavigateToReport, Phase::DownloadReport];

const SUPPLIERS_NAV_ERROR_LABEL: &str = "my_suppliers_nav_error";
const VENDORS_DOWNLOAD_ERROR_LABEL: &str = "vendors_download_error";

/// CSV export of the "My Suppliers" list
pub struct VendorListWorkflow {
    settings: Arc<Settings>,
}

impl VendorListWorkflow {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    async fn navigate(&self, steps: &Steps) -> bool {
        if !steps.wait_and_click(MY_SUPPLIERS, steps.default_timeout()).await {
            return false;
        }
        steps
            .settle("suppliers page", self.settings.settle.suppliers_page)
            .await;
        steps.wait_for(CREATE_CSV, steps.default_timeout()).await.is_some()
    }
}

#[async_trait]
impl ReportWorkflow for VendorListWorkflow {
    fn kind(&self) -> ReportKind {
        ReportKind::VendorList
    }

    fn phases(&self) -> &'static [Phase] {
        PHASES
    }

    fn failure_label(&self, phase: Phase) -> String {
        match phase {
            Phase::NavigateToReport => SUPPLIERS_NAV_ERROR_LABEL,
            _ => VENDORS_DOWNLOAD_ERROR_LABEL,
        }
        .to_string()
    }

    #[instrument(skip(self, steps), fields(kind = "vendor_list"))]
    async fn run_phase(&self, phase: Phase, steps: &Steps) -> PhaseOutcome {
        match phase {
            Phase::NavigateToReport => self.navigate(steps).await.into(),
            // A disabled export button means there is nothing to export
            Phase::DownloadReport => steps
                .expect_download(
                    CREATE_CSV,
                    &self.kind().artifact_template(&self.settings),
                    steps.default_timeout(),
                )
                .await
                .into(),
            other => {
                warn!("phase {} is not part of this report", other);
                PhaseOutcome::Failed
            }
        }
    }
}

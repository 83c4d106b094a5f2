use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{Phase, PhaseOutcome, ReportKind, ReportWorkflow};
use crate::config::Settings;
use crate::selector::Selector;
use crate::steps::{Multiselect, Steps};

pub const REPORTS_MENU: &str = "text=Reports";
pub const REPORT_CARD: &str = "text=PO-GRN Docs Report";
pub const VENDOR_MULTISELECT: &str = r#"p-multiselect[formcontrolname="vendors"]"#;
pub const VENDOR_OPTIONS: &str = r#"p-multiselect[formcontrolname="vendors"] .p-checkbox"#;
pub const SHOW_REPORT: &str = r#"button:has-text("Show Report")"#;
pub const EXPORT_CSV: &str = r#"button:has-text("Export CSV")"#;

pub const MAX_VENDORS: usize = 3;

const PHASES: &[Phase] = &[
    Phase::NavigateToReport,
    Phase::ConfigureFilters,
    Phase::GenerateReport,
    Phase::DownloadReport,
];

/// The "PO-GRN Docs Report" export
pub struct PurchaseOrderWorkflow {
    settings: Arc<Settings>,
}

impl PurchaseOrderWorkflow {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    async fn navigate(&self, steps: &Steps) -> bool {
        let timeouts = &self.settings.timeouts;
        if !steps.wait_and_click(REPORTS_MENU, steps.default_timeout()).await {
            return false;
        }
        steps.settle("reports menu", self.settings.settle.reports_menu).await;
        if !steps.wait_and_click(REPORT_CARD, timeouts.report_card).await {
            return false;
        }
        if !steps
            .settle_until(SHOW_REPORT, self.settings.settle.report_page)
            .await
        {
            info!("report page still loading, continuing");
        }
        true
    }

    /// Date range stays at the application's default. Vendor narrowing is
    /// optional: without the widget the report covers all vendors.
    async fn configure_filters(&self, steps: &Steps) -> bool {
        let vendors = Multiselect {
            container: Selector::from(VENDOR_MULTISELECT),
            options: Selector::from(VENDOR_OPTIONS),
            select_all: None,
            max_items: MAX_VENDORS,
            timeout: steps.default_timeout(),
        };
        if !steps.select_from_multiselect(&vendors).await {
            warn!("vendor filter unavailable, exporting unfiltered report");
        }
        true
    }

    async fn generate(&self, steps: &Steps) -> bool {
        if !steps
            .wait_and_click(SHOW_REPORT, self.settings.timeouts.generate_button)
            .await
        {
            return false;
        }
        steps
            .settle("report generation", self.settings.settle.po_generation)
            .await;
        true
    }
}

#[async_trait]
impl ReportWorkflow for PurchaseOrderWorkflow {
    fn kind(&self) -> ReportKind {
        ReportKind::PurchaseOrder
    }

    fn phases(&self) -> &'static [Phase] {
        PHASES
    }

    #[instrument(skip(self, steps), fields(kind = "purchase_order"))]
    async fn run_phase(&self, phase: Phase, steps: &Steps) -> PhaseOutcome {
        match phase {
            Phase::NavigateToReport => self.navigate(steps).await.into(),
            Phase::ConfigureFilters => self.configure_filters(steps).await.into(),
            Phase::GenerateReport => self.generate(steps).await.into(),
            Phase::DownloadReport => steps
                .expect_download(
                    EXPORT_CSV,
                    &self.kind().artifact_template(&self.settings),
                    steps.default_timeout(),
                )
                .await
                .into(),
            Phase::ConfigureDelivery => {
                warn!("phase {} is not part of this report", phase);
                PhaseOutcome::Failed
            }
        }
    }
}

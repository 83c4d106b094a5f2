use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use super::{Phase, PhaseOutcome, ReportKind, ReportWorkflow};
use crate::config::{Settings, ENV_EMAIL};
use crate::selector::Selector;
use crate::steps::{Multiselect, Steps};

pub const REPORTS_MENU: &str = r#"button:has-text("Reports")"#;
pub const REPORT_CARD: &str = r#"[ui-sref="reports.itemWiseGRN"]"#;
/// The report panel is a legacy page embedded in an iframe
pub const REPORT_FRAME: &str = "iframe.ng-isolate-scope";

pub const OUTLET_MULTISELECT: &str = r#"p-multiselect[formcontrolname="outlets"]"#;
pub const OUTLET_OPTIONS: &str = "li.p-multiselect-item div.p-checkbox-box";
pub const SELECT_ALL_OUTLETS: &str = r#"div[role="checkbox"].p-checkbox-box >> nth=0"#;
/// Used only when the panel has no "select all" control
pub const MAX_OUTLETS: usize = 25;

pub const EMAIL_TOGGLE: &str = "div.p-checkbox-box >> nth=0";
pub const SEND_MAIL_INPUT: &str = "input#sendMail";
pub const REMOVE_RECIPIENT: &str = "timescircleicon >> nth=0";
pub const RECIPIENT_INPUT: &str = r#"input[placeholder="Enter e-mail ids"]"#;
pub const ADD_RECIPIENT: &str = r#"span.p-button-label:has-text("Add")"#;

pub const BUTTON_LABELS: &str = "span.p-button-label";
pub const GENERATE_REPORT: &str = r#"span.p-button-label:has-text("Generate Report")"#;
pub const RESULTS_TABLE: &str = "tbody.p-datatable-tbody";
pub const LATEST_DOWNLOAD: &str =
    r#"tbody.p-datatable-tbody tr >> nth=0 >> span.p-button-label:has-text("Download")"#;

const PHASES: &[Phase] = &[
    Phase::NavigateToReport,
    Phase::ConfigureFilters,
    Phase::ConfigureDelivery,
    Phase::GenerateReport,
    Phase::DownloadReport,
];

/// Item-wise goods receipt notes. Everything after navigation happens
/// inside the embedded report frame.
pub struct ItemWiseGrnWorkflow {
    settings: Arc<Settings>,
}

impl ItemWiseGrnWorkflow {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    async fn navigate(&self, steps: &Steps) -> bool {
        if !steps.wait_and_click(REPORTS_MENU, steps.default_timeout()).await {
            return false;
        }
        steps.settle("reports menu", self.settings.settle.reports_menu).await;
        if !steps.wait_and_click(REPORT_CARD, steps.default_timeout()).await {
            return false;
        }
        if !steps
            .settle_until(REPORT_FRAME, self.settings.settle.report_page)
            .await
        {
            info!("report frame still loading, continuing");
        }
        true
    }

    /// Missing frame is fatal; trouble inside it is not, the report then
    /// uses the panel's default outlets.
    async fn configure_filters(&self, steps: &Steps) -> bool {
        let outlets = Multiselect {
            container: Selector::from(OUTLET_MULTISELECT),
            options: Selector::from(OUTLET_OPTIONS),
            select_all: Some(Selector::from(SELECT_ALL_OUTLETS)),
            max_items: MAX_OUTLETS,
            timeout: self.settings.timeouts.frame_widget,
        };
        let entered = steps
            .within_iframe(REPORT_FRAME, steps.default_timeout(), |frame| async move {
                if !frame.select_from_multiselect(&outlets).await {
                    warn!("outlet filter unavailable, keeping the default selection");
                }
            })
            .await;
        entered.is_some()
    }

    async fn configure_delivery(&self, steps: &Steps) -> bool {
        let settings = self.settings.clone();
        steps
            .within_iframe(REPORT_FRAME, steps.default_timeout(), |frame| async move {
                configure_email(&frame, &settings).await
            })
            .await
            .unwrap_or(false)
    }

    async fn generate(&self, steps: &Steps) -> bool {
        let settings = self.settings.clone();
        steps
            .within_iframe(REPORT_FRAME, steps.default_timeout(), |frame| async move {
                if frame
                    .wait_for(BUTTON_LABELS, settings.timeouts.generate_panel)
                    .await
                    .is_none()
                {
                    return false;
                }
                if !frame
                    .wait_and_click(GENERATE_REPORT, frame.default_timeout())
                    .await
                {
                    return false;
                }
                frame
                    .settle("report generation", settings.settle.grn_generation)
                    .await;
                true
            })
            .await
            .unwrap_or(false)
    }

    async fn download(&self, steps: &Steps) -> PhaseOutcome {
        let settings = self.settings.clone();
        let template = self.kind().artifact_template(&self.settings);
        steps
            .within_iframe(REPORT_FRAME, steps.default_timeout(), |frame| async move {
                if frame
                    .wait_for(RESULTS_TABLE, settings.timeouts.frame_widget)
                    .await
                    .is_none()
                {
                    return None;
                }
                frame
                    .settle("results table", settings.settle.results_table)
                    .await;
                frame
                    .expect_download(LATEST_DOWNLOAD, &template, frame.default_timeout())
                    .await
            })
            .await
            .flatten()
            .into()
    }
}

/// Turn on "send by e-mail" and replace the recipient list with the
/// configured address.
async fn configure_email(frame: &Steps, settings: &Settings) -> bool {
    if settings.email.trim().is_empty() {
        error!("no report recipient configured, set {}", ENV_EMAIL);
        return false;
    }
    let timeouts = &settings.timeouts;
    let mut checked = false;
    for attempt in 1..=2 {
        if !frame.wait_and_click(EMAIL_TOGGLE, timeouts.frame_widget).await {
            return false;
        }
        frame.settle("email toggle", settings.settle.frame_action).await;
        checked = frame
            .attribute(SEND_MAIL_INPUT, "aria-checked")
            .await
            .is_some_and(|v| v == "true");
        if checked {
            break;
        }
        warn!(attempt, "send-mail checkbox did not register the click");
    }
    if !checked {
        error!("could not enable e-mail delivery");
        return false;
    }

    if !frame
        .wait_and_click(REMOVE_RECIPIENT, timeouts.frame_widget)
        .await
    {
        info!("no pre-filled recipient to remove");
    }
    frame.settle("recipient removal", settings.settle.frame_action).await;

    if !frame
        .fill(RECIPIENT_INPUT, &settings.email, timeouts.frame_widget)
        .await
    {
        return false;
    }
    frame.settle("recipient entry", settings.settle.frame_action).await;

    if !frame.wait_and_click(ADD_RECIPIENT, timeouts.frame_widget).await {
        return false;
    }
    info!("report will also be mailed to {}", settings.email);
    true
}

#[async_trait]
impl ReportWorkflow for ItemWiseGrnWorkflow {
    fn kind(&self) -> ReportKind {
        ReportKind::ItemWiseGrn
    }

    fn phases(&self) -> &'static [Phase] {
        PHASES
    }

    #[instrument(skip(self, steps), fields(kind = "item_wise_grn"))]
    async fn run_phase(&self, phase: Phase, steps: &Steps) -> PhaseOutcome {
        match phase {
            Phase::NavigateToReport => self.navigate(steps).await.into(),
            Phase::ConfigureFilters => self.configure_filters(steps).await.into(),
            Phase::ConfigureDelivery => self.configure_delivery(steps).await.into(),
            Phase::GenerateReport => self.generate(steps).await.into(),
            Phase::DownloadReport => self.download(steps).await,
        }
    }
}

//! Report workflows: ordered phases built from step primitives.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactTemplate;
use crate::config::Settings;
use crate::steps::Steps;

pub mod item_wise_grn;
pub mod purchase_order;
pub mod vendor_list;

pub use item_wise_grn::ItemWiseGrnWorkflow;
pub use purchase_order::PurchaseOrderWorkflow;
pub use vendor_list::VendorListWorkflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    PurchaseOrder,
    ItemWiseGrn,
    VendorList,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [
        ReportKind::PurchaseOrder,
        ReportKind::ItemWiseGrn,
        ReportKind::VendorList,
    ];

    /// File name stem of the saved report
    pub fn slug(self) -> &'static str {
        match self {
            ReportKind::PurchaseOrder => "purchase_order_report",
            ReportKind::ItemWiseGrn => "item_wise_grn_report",
            ReportKind::VendorList => "vendors_list",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportKind::PurchaseOrder => "xlsx",
            ReportKind::ItemWiseGrn | ReportKind::VendorList => "csv",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::PurchaseOrder => "purchase_order",
            ReportKind::ItemWiseGrn => "item_wise_grn",
            ReportKind::VendorList => "vendor_list",
        }
    }

    pub fn artifact_template(self, settings: &Settings) -> ArtifactTemplate {
        ArtifactTemplate::new(&settings.downloads_dir, self.slug(), self.extension())
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "purchase_order" | "po" => Ok(ReportKind::PurchaseOrder),
            "item_wise_grn" | "grn" => Ok(ReportKind::ItemWiseGrn),
            "vendor_list" | "vendors" => Ok(ReportKind::VendorList),
            other => Err(format!(
                "unknown report kind '{other}', expected one of: \
                 purchase_order, item_wise_grn, vendor_list"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NavigateToReport,
    ConfigureFilters,
    ConfigureDelivery,
    GenerateReport,
    DownloadReport,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::NavigateToReport => "navigate_to_report",
            Phase::ConfigureFilters => "configure_filters",
            Phase::ConfigureDelivery => "configure_delivery",
            Phase::GenerateReport => "generate_report",
            Phase::DownloadReport => "download_report",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Failed,
    /// The phase produced the report file
    Downloaded(PathBuf),
}

impl PhaseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PhaseOutcome::Failed)
    }
}

impl From<bool> for PhaseOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            PhaseOutcome::Completed
        } else {
            PhaseOutcome::Failed
        }
    }
}

impl From<Option<PathBuf>> for PhaseOutcome {
    fn from(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => PhaseOutcome::Downloaded(path),
            None => PhaseOutcome::Failed,
        }
    }
}

/// One report's extraction, as an ordered list of independent phases
#[async_trait]
pub trait ReportWorkflow: Send + Sync {
    fn kind(&self) -> ReportKind;

    fn phases(&self) -> &'static [Phase];

    /// Label of the diagnostic snapshot taken when `phase` fails
    fn failure_label(&self, phase: Phase) -> String {
        format!("{}_{}_error", self.kind(), phase)
    }

    /// Run one of the phases listed by [`ReportWorkflow::phases`].
    async fn run_phase(&self, phase: Phase, steps: &Steps) -> PhaseOutcome;
}

pub fn workflow_for(kind: ReportKind, settings: Arc<Settings>) -> Box<dyn ReportWorkflow> {
    match kind {
        ReportKind::PurchaseOrder => Box::new(PurchaseOrderWorkflow::new(settings)),
        ReportKind::ItemWiseGrn => Box::new(ItemWiseGrnWorkflow::new(settings)),
        ReportKind::VendorList => Box::new(VendorListWorkflow::new(settings)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_kind_parsing() {
        assert_eq!("purchase_order".parse::<ReportKind>(), Ok(ReportKind::PurchaseOrder));
        assert_eq!("item-wise-grn".parse::<ReportKind>(), Ok(ReportKind::ItemWiseGrn));
        assert_eq!(" Vendor_List ".parse::<ReportKind>(), Ok(ReportKind::VendorList));
        assert!("invoices".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_kind_and_phase_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReportKind::ItemWiseGrn).unwrap(),
            "\"item_wise_grn\""
        );
        assert_eq!(
            serde_json::to_string(&Phase::ConfigureDelivery).unwrap(),
            "\"configure_delivery\""
        );
        assert_eq!(Phase::DownloadReport.to_string(), "download_report");
    }

    #[test]
    fn test_every_workflow_ends_with_download() {
        let settings = Arc::new(Settings::for_target("http://localhost"));
        for kind in ReportKind::ALL {
            let workflow = workflow_for(kind, settings.clone());
            assert_eq!(workflow.kind(), kind);
            assert_eq!(workflow.phases().first(), Some(&Phase::NavigateToReport));
            assert_eq!(workflow.phases().last(), Some(&Phase::DownloadReport));
        }
    }
}

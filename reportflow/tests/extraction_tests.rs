mod common;

use common::{init_tracing, is_artifact_name, orchestrator, test_settings};
use reportflow::auth::{LOGIN_BUTTON, LOGIN_FORM, PASSWORD_FIELD, USERNAME_FIELD};
use reportflow::platforms::simulated::{Effect, SimAction};
use reportflow::rehearsal::{base_selector, rehearsal_site, GRN_FRAME};
use reportflow::workflows::{item_wise_grn as grn, purchase_order as po, vendor_list as vendors};
use reportflow::{Phase, ReportKind, RunStatus};

#[tokio::test]
async fn test_every_report_kind_yields_named_artifact() {
    init_tracing();
    for kind in ReportKind::ALL {
        let dir = tempfile::tempdir().unwrap();
        let site = rehearsal_site();
        let orchestrator = orchestrator(&site, test_settings(dir.path()));

        let result = orchestrator.run_report_extraction(kind).await.unwrap();

        assert_eq!(result.status(), RunStatus::Succeeded, "{kind}: {}", result.message());
        let artifact = result.artifact().expect("artifact path");
        assert!(artifact.starts_with(dir.path().join("downloads")));
        assert!(artifact.exists());
        let name = artifact.file_name().unwrap().to_string_lossy();
        assert!(
            is_artifact_name(&name, kind.slug(), kind.extension()),
            "unexpected file name {name}"
        );
        assert_eq!(result.phases_executed().last(), Some(&Phase::DownloadReport));
        assert!(result.diagnostic().is_none());
        assert_eq!(orchestrator.provider().acquired(), 1);
        assert_eq!(orchestrator.provider().released(), 1);
        assert_eq!(site.open_pages(), 0);
    }
}

#[tokio::test]
async fn test_purchase_order_after_report_card_renders() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::PurchaseOrder)
        .await
        .unwrap();

    assert!(result.is_success());
    let artifact = result.artifact().unwrap();
    assert_eq!(artifact.extension().unwrap(), "xlsx");
    assert_eq!(
        result.phases_executed(),
        &[
            Phase::NavigateToReport,
            Phase::ConfigureFilters,
            Phase::GenerateReport,
            Phase::DownloadReport
        ]
    );
    assert_eq!(site.click_count(po::VENDOR_OPTIONS), po::MAX_VENDORS);
    assert_eq!(
        site.fills(),
        vec![
            (USERNAME_FIELD.to_string(), "ops".to_string()),
            (PASSWORD_FIELD.to_string(), "secret".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_purchase_order_without_vendor_filter_still_exports() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.modify(None, po::REPORT_CARD, |card| {
        card.on_click.retain(|effect| {
            !matches!(effect, Effect::Reveal { selector, .. }
                if selector.to_string() == po::VENDOR_MULTISELECT)
        })
    });
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::PurchaseOrder)
        .await
        .unwrap();

    assert!(result.is_success(), "{}", result.message());
    assert_eq!(site.click_count(po::VENDOR_OPTIONS), 0);
}

#[tokio::test]
async fn test_item_wise_grn_email_toggle_never_checks() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.modify(Some(GRN_FRAME), base_selector(grn::EMAIL_TOGGLE), |toggle| {
        toggle.on_click.clear()
    });
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::ItemWiseGrn)
        .await
        .unwrap();

    assert_eq!(
        result.status(),
        RunStatus::FailedAt {
            phase: Phase::ConfigureDelivery
        }
    );
    assert_eq!(result.failed_phase(), Some(Phase::ConfigureDelivery));
    assert!(result.artifact().is_none());
    // One click plus one retry, then give up
    assert_eq!(site.click_count(grn::EMAIL_TOGGLE), 0);
    assert_eq!(
        site.click_count(&base_selector(grn::EMAIL_TOGGLE).to_string()),
        2
    );
    assert_eq!(site.click_count(grn::GENERATE_REPORT), 0);
    assert!(!site
        .actions()
        .iter()
        .any(|a| matches!(a, SimAction::Download(_))));
    let diagnostic = result.diagnostic().expect("failure snapshot");
    assert!(diagnostic.exists());
    assert!(diagnostic
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("item_wise_grn_configure_delivery_error_"));
    assert_eq!(orchestrator.provider().released(), 1);
}

#[tokio::test]
async fn test_item_wise_grn_without_recipient_fails_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let settings = test_settings(dir.path()).with_email("  ");
    let orchestrator = orchestrator(&site, settings);

    let result = orchestrator
        .run_report_extraction(ReportKind::ItemWiseGrn)
        .await
        .unwrap();

    assert_eq!(result.failed_phase(), Some(Phase::ConfigureDelivery));
    assert_eq!(
        site.click_count(&base_selector(grn::EMAIL_TOGGLE).to_string()),
        0
    );
    assert!(!site
        .fills()
        .iter()
        .any(|(selector, _)| selector == grn::RECIPIENT_INPUT));
    assert_eq!(site.click_count(grn::ADD_RECIPIENT), 0);
    assert_eq!(site.click_count(grn::GENERATE_REPORT), 0);
}

#[tokio::test]
async fn test_item_wise_grn_replaces_recipient_inside_frame() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::ItemWiseGrn)
        .await
        .unwrap();

    assert!(result.is_success(), "{}", result.message());
    assert_eq!(
        site.attribute(Some(GRN_FRAME), grn::SEND_MAIL_INPUT, "aria-checked")
            .as_deref(),
        Some("true")
    );
    assert_eq!(
        site.attribute(Some(GRN_FRAME), grn::RECIPIENT_INPUT, "value")
            .as_deref(),
        Some("reports@example.com")
    );
    assert_eq!(site.click_count(grn::ADD_RECIPIENT), 1);
    assert!(site.actions().iter().any(|a| matches!(
        a,
        SimAction::Click { frame: Some(f), .. } if f == GRN_FRAME
    )));
}

#[tokio::test]
async fn test_item_wise_grn_without_report_frame() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.modify(None, grn::REPORT_FRAME, |frame| frame.hosts_frame = None);
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::ItemWiseGrn)
        .await
        .unwrap();

    assert_eq!(result.failed_phase(), Some(Phase::ConfigureFilters));
    assert_eq!(
        result.phases_executed(),
        &[Phase::NavigateToReport, Phase::ConfigureFilters]
    );
}

#[tokio::test]
async fn test_vendor_list_with_disabled_export() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.modify(None, vendors::CREATE_CSV, |button| {
        button
            .attributes
            .insert("aria-disabled".to_string(), "true".to_string());
    });
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::VendorList)
        .await
        .unwrap();

    assert_eq!(
        result.status(),
        RunStatus::FailedAt {
            phase: Phase::DownloadReport
        }
    );
    assert_eq!(site.click_count(vendors::CREATE_CSV), 0);
    assert!(result.artifact().is_none());
    let diagnostic = result.diagnostic().expect("failure snapshot");
    assert!(diagnostic
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("vendors_download_error_"));
    assert_eq!(
        std::fs::read_dir(dir.path().join("downloads"))
            .map(|entries| entries.count())
            .unwrap_or(0),
        0
    );
}

#[tokio::test]
async fn test_login_failure_runs_no_phase() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.modify(None, LOGIN_FORM, |form| form.visible = false);
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::VendorList)
        .await
        .unwrap();

    assert_eq!(result.status(), RunStatus::AuthenticationFailed);
    assert!(result.phases_executed().is_empty());
    assert!(site.clicks().is_empty());
    let diagnostic = result.diagnostic().expect("login snapshot");
    assert!(diagnostic
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("login_error_"));
    assert_eq!(orchestrator.provider().acquired(), 1);
    assert_eq!(orchestrator.provider().released(), 1);
    assert_eq!(site.pages_closed(), 1);
}

#[tokio::test]
async fn test_failed_snapshot_does_not_change_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.fail_navigation("connection refused");
    site.fail_screenshots(true);
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::PurchaseOrder)
        .await
        .unwrap();

    assert_eq!(result.status(), RunStatus::AuthenticationFailed);
    assert!(result.diagnostic().is_none());
    assert_eq!(orchestrator.provider().released(), 1);
}

#[tokio::test]
async fn test_login_continues_without_navigation_signal() {
    let dir = tempfile::tempdir().unwrap();
    let site = rehearsal_site();
    site.modify(None, LOGIN_BUTTON, |button| {
        button
            .on_click
            .retain(|e| !matches!(e, Effect::Navigate))
    });
    let orchestrator = orchestrator(&site, test_settings(dir.path()));

    let result = orchestrator
        .run_report_extraction(ReportKind::VendorList)
        .await
        .unwrap();

    assert!(result.is_success(), "{}", result.message());
}

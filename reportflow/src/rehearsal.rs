//! A simulated copy of the target application's happy path.
//!
//! Built from the same selector constants the workflows use, so a rehearsal
//! run exercises every phase end to end without a real browser or site.
//! Tests start from it and break individual controls.

use crate::auth::{LOGIN_BUTTON, LOGIN_FORM, PASSWORD_FIELD, USERNAME_FIELD};
use crate::platforms::simulated::{Effect, SimElement, SimulatedSite};
use crate::selector::Selector;
use crate::workflows::{item_wise_grn as grn, purchase_order as po, vendor_list as vendors};

/// Name of the simulated document behind the Item-Wise GRN iframe
pub const GRN_FRAME: &str = "item-wise-grn";

const PO_FILE: &[u8] = b"PK\x03\x04 simulated purchase order workbook";
const GRN_FILE: &[u8] = b"item,qty,outlet\nRICE-25KG,40,Central Kitchen\n";
const VENDORS_FILE: &[u8] = b"vendor,city\nAcme Foods,Pune\nGreen Farms,Nashik\n";

const VENDOR_COUNT: usize = 5;
const OUTLET_COUNT: usize = 4;

/// The part of a selector before any trailing `nth=` step
pub fn base_selector(selector: &str) -> Selector {
    match Selector::from(selector) {
        Selector::Chain(mut parts) if matches!(parts.last(), Some(Selector::Nth(_))) => {
            parts.pop();
            if parts.len() == 1 {
                parts.remove(0)
            } else {
                Selector::Chain(parts)
            }
        }
        other => other,
    }
}

pub fn rehearsal_site() -> SimulatedSite {
    let site = SimulatedSite::new();
    let frame = Some(GRN_FRAME);

    // Login page
    site.add(SimElement::new("body"))
        .add(SimElement::new(LOGIN_FORM))
        .add(SimElement::new(USERNAME_FIELD))
        .add(SimElement::new(PASSWORD_FIELD))
        .add(
            SimElement::new(LOGIN_BUTTON)
                .with_text("LOG IN")
                .on_click(Effect::Navigate)
                .on_click(Effect::reveal(None, po::REPORTS_MENU))
                .on_click(Effect::reveal(None, grn::REPORTS_MENU))
                .on_click(Effect::reveal(None, vendors::MY_SUPPLIERS)),
        );

    // PO-GRN Docs Report
    site.add(
        SimElement::new(po::REPORTS_MENU)
            .hidden()
            .with_text("Reports")
            .on_click(Effect::reveal(None, po::REPORT_CARD)),
    )
    .add(
        SimElement::new(po::REPORT_CARD)
            .hidden()
            .on_click(Effect::reveal(None, po::SHOW_REPORT))
            .on_click(Effect::reveal(None, po::VENDOR_MULTISELECT)),
    )
    .add(
        SimElement::new(po::VENDOR_MULTISELECT)
            .hidden()
            .on_click(Effect::reveal(None, po::VENDOR_OPTIONS)),
    );
    for i in 0..VENDOR_COUNT {
        site.add(
            SimElement::new(po::VENDOR_OPTIONS)
                .hidden()
                .with_text(&format!("Vendor {}", i + 1)),
        );
    }
    site.add(
        SimElement::new(po::SHOW_REPORT)
            .hidden()
            .on_click(Effect::reveal(None, po::EXPORT_CSV)),
    )
    .add(
        SimElement::new(po::EXPORT_CSV)
            .hidden()
            .on_click(Effect::download("PO-GRN Docs Report.xlsx", PO_FILE)),
    );

    // Item-Wise GRN, shell page
    site.add(
        SimElement::new(grn::REPORTS_MENU)
            .hidden()
            .on_click(Effect::reveal(None, grn::REPORT_CARD)),
    )
    .add(
        SimElement::new(grn::REPORT_CARD)
            .hidden()
            .on_click(Effect::reveal(None, grn::REPORT_FRAME)),
    )
    .add(
        SimElement::new(grn::REPORT_FRAME)
            .hidden()
            .hosting_frame(GRN_FRAME),
    );

    // Item-Wise GRN, embedded report panel
    site.add(SimElement::new("body").in_frame(GRN_FRAME))
        .add(
            SimElement::new(grn::OUTLET_MULTISELECT)
                .in_frame(GRN_FRAME)
                .on_click(Effect::reveal(frame, base_selector(grn::SELECT_ALL_OUTLETS)))
                .on_click(Effect::reveal(frame, grn::OUTLET_OPTIONS)),
        )
        .add(
            SimElement::new(base_selector(grn::SELECT_ALL_OUTLETS))
                .in_frame(GRN_FRAME)
                .hidden(),
        );
    for i in 0..OUTLET_COUNT {
        site.add(
            SimElement::new(grn::OUTLET_OPTIONS)
                .in_frame(GRN_FRAME)
                .hidden()
                .with_text(&format!("Outlet {}", i + 1)),
        );
    }
    site.add(
        SimElement::new(base_selector(grn::EMAIL_TOGGLE))
            .in_frame(GRN_FRAME)
            .on_click(Effect::set_attribute(
                frame,
                grn::SEND_MAIL_INPUT,
                "aria-checked",
                "true",
            )),
    )
    .add(
        // Native input stays hidden behind the styled checkbox
        SimElement::new(grn::SEND_MAIL_INPUT)
            .in_frame(GRN_FRAME)
            .hidden()
            .with_attribute("aria-checked", "false"),
    )
    .add(
        SimElement::new(base_selector(grn::REMOVE_RECIPIENT))
            .in_frame(GRN_FRAME)
            .on_click(Effect::hide(frame, base_selector(grn::REMOVE_RECIPIENT))),
    )
    .add(SimElement::new(grn::RECIPIENT_INPUT).in_frame(GRN_FRAME))
    .add(
        SimElement::new(grn::ADD_RECIPIENT)
            .in_frame(GRN_FRAME)
            .with_text("Add"),
    )
    .add(
        SimElement::new(grn::GENERATE_REPORT)
            .in_frame(GRN_FRAME)
            .with_text("Generate Report")
            .on_click(Effect::reveal(frame, grn::RESULTS_TABLE))
            .on_click(Effect::reveal(frame, grn::LATEST_DOWNLOAD)),
    )
    .add(
        SimElement::new(grn::RESULTS_TABLE)
            .in_frame(GRN_FRAME)
            .hidden(),
    )
    .add(
        SimElement::new(grn::LATEST_DOWNLOAD)
            .in_frame(GRN_FRAME)
            .hidden()
            .on_click(Effect::download("ItemWiseGRN.csv", GRN_FILE)),
    );

    // My Suppliers
    site.add(
        SimElement::new(vendors::MY_SUPPLIERS)
            .hidden()
            .on_click(Effect::reveal(None, vendors::CREATE_CSV)),
    )
    .add(
        SimElement::new(vendors::CREATE_CSV)
            .hidden()
            .with_attribute("aria-disabled", "false")
            .on_click(Effect::download("vendors.csv", VENDORS_FILE)),
    );

    site
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_selector_strips_trailing_nth() {
        assert_eq!(
            base_selector("div.p-checkbox-box >> nth=0"),
            Selector::Css("div.p-checkbox-box".to_string())
        );
        assert_eq!(
            base_selector("input#sendMail"),
            Selector::Css("input#sendMail".to_string())
        );
        assert!(matches!(
            base_selector(grn::LATEST_DOWNLOAD),
            Selector::Chain(parts) if parts.len() == 3
        ));
    }
}

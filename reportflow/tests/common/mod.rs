#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reportflow::platforms::simulated::SimulatedSite;
use reportflow::{Orchestrator, SessionProvider, SettleDelays, Settings, Timeouts};

pub const SHORT: Duration = Duration::from_millis(300);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_settings(dir: &Path) -> Settings {
    Settings::for_target("https://erp.simulated.local/login")
        .with_credentials("ops", "secret")
        .with_email("reports@example.com")
        .with_output_dirs(dir.join("downloads"), dir.join("diagnostics"))
        .with_page_timeout(SHORT)
        .with_timeouts(Timeouts::uniform(SHORT))
        .with_settle_delays(SettleDelays::none())
}

pub fn orchestrator(site: &SimulatedSite, settings: Settings) -> Orchestrator {
    let settings = Arc::new(settings);
    let provider = Arc::new(SessionProvider::new(Arc::new(site.engine()), &settings));
    Orchestrator::new(provider, settings)
}

/// `<stem>_YYYYMMDD_HHMMSS[_N].<ext>`
pub fn is_artifact_name(name: &str, stem: &str, ext: &str) -> bool {
    let Some(rest) = name.strip_prefix(stem).and_then(|r| r.strip_prefix('_')) else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(ext).and_then(|r| r.strip_suffix('.')) else {
        return false;
    };
    let parts: Vec<&str> = rest.split('_').collect();
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    match parts.as_slice() {
        [date, time] => digits(date, 8) && digits(time, 6),
        [date, time, n] => digits(date, 8) && digits(time, 6) && n.parse::<u32>().is_ok(),
        _ => false,
    }
}

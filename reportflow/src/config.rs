//! Runtime configuration with environment variable support.
//!
//! Values are read from the process environment after loading an optional
//! `.env` file from the working directory.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `REPORTFLOW_BASE_URL` | Login entry point of the target application | required |
//! | `REPORTFLOW_USERNAME` | Login user name | required |
//! | `REPORTFLOW_PASSWORD` | Login password | required |
//! | `REPORTFLOW_EMAIL` | Recipient for e-mailed reports | empty |
//! | `REPORTFLOW_DOWNLOADS_DIR` | Where artifacts are written | `./downloads` |
//! | `REPORTFLOW_DIAGNOSTICS_DIR` | Where failure snapshots are written | `.` |
//! | `REPORTFLOW_HEADLESS` | Run the browser without a window | `true` |
//! | `REPORTFLOW_PAGE_TIMEOUT_MS` | Default per-operation timeout | `30000` |
//! | `REPORTFLOW_MAX_CONCURRENT_RUNS` | Sessions allowed open at once | `2` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

pub const ENV_BASE_URL: &str = "REPORTFLOW_BASE_URL";
pub const ENV_USERNAME: &str = "REPORTFLOW_USERNAME";
pub const ENV_PASSWORD: &str = "REPORTFLOW_PASSWORD";
pub const ENV_EMAIL: &str = "REPORTFLOW_EMAIL";
pub const ENV_DOWNLOADS_DIR: &str = "REPORTFLOW_DOWNLOADS_DIR";
pub const ENV_DIAGNOSTICS_DIR: &str = "REPORTFLOW_DIAGNOSTICS_DIR";
pub const ENV_HEADLESS: &str = "REPORTFLOW_HEADLESS";
pub const ENV_PAGE_TIMEOUT_MS: &str = "REPORTFLOW_PAGE_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT_RUNS: &str = "REPORTFLOW_MAX_CONCURRENT_RUNS";

pub const DEFAULT_DOWNLOADS_DIR: &str = "./downloads";
pub const DEFAULT_DIAGNOSTICS_DIR: &str = ".";
pub const DEFAULT_PAGE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 2;

/// Everything a run needs to know about the target application and the host.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Recipient entered in the e-mail delivery panel.
    pub email: String,
    pub downloads_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub headless: bool,
    /// Default bound for waits without a dedicated entry in `timeouts`,
    /// such as sidebar buttons and form fields.
    pub page_timeout: Duration,
    pub max_concurrent_runs: usize,
    pub timeouts: Timeouts,
    pub settle: SettleDelays,
}

impl Settings {
    /// Load `.env` (if present) and read the `REPORTFLOW_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal in deployments that inject variables directly.
        let _ = dotenvy::dotenv();

        let page_timeout_ms: u64 = parse_or(ENV_PAGE_TIMEOUT_MS, DEFAULT_PAGE_TIMEOUT_MS)?;
        let max_concurrent_runs: usize =
            parse_or(ENV_MAX_CONCURRENT_RUNS, DEFAULT_MAX_CONCURRENT_RUNS)?;
        if max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid {
                var: ENV_MAX_CONCURRENT_RUNS,
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            base_url: required(ENV_BASE_URL)?,
            username: required(ENV_USERNAME)?,
            password: required(ENV_PASSWORD)?,
            email: env::var(ENV_EMAIL).unwrap_or_default(),
            downloads_dir: env::var(ENV_DOWNLOADS_DIR)
                .unwrap_or_else(|_| DEFAULT_DOWNLOADS_DIR.to_string())
                .into(),
            diagnostics_dir: env::var(ENV_DIAGNOSTICS_DIR)
                .unwrap_or_else(|_| DEFAULT_DIAGNOSTICS_DIR.to_string())
                .into(),
            headless: parse_bool_or(ENV_HEADLESS, true)?,
            page_timeout: Duration::from_millis(page_timeout_ms),
            max_concurrent_runs,
            timeouts: Timeouts::default(),
            settle: SettleDelays::default(),
        })
    }

    /// Defaults pointed at `base_url` with placeholder credentials.
    pub fn for_target(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: String::new(),
            password: String::new(),
            email: String::new(),
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            diagnostics_dir: PathBuf::from(DEFAULT_DIAGNOSTICS_DIR),
            headless: true,
            page_timeout: Duration::from_millis(DEFAULT_PAGE_TIMEOUT_MS),
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
            timeouts: Timeouts::default(),
            settle: SettleDelays::default(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn with_output_dirs(
        mut self,
        downloads: impl Into<PathBuf>,
        diagnostics: impl Into<PathBuf>,
    ) -> Self {
        self.downloads_dir = downloads.into();
        self.diagnostics_dir = diagnostics.into();
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_settle_delays(mut self, settle: SettleDelays) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_max_concurrent_runs(mut self, n: usize) -> Self {
        self.max_concurrent_runs = n.max(1);
        self
    }
}

/// Upper bounds for the waits performed while driving the target application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Page load after `goto`.
    pub navigation: Duration,
    /// Credential form rendering after the login page loads.
    pub login_form: Duration,
    /// Navigation event fired after submitting credentials.
    pub post_login_navigation: Duration,
    /// Report cards, which render late on the reports page.
    pub report_card: Duration,
    /// Generation trigger on the top-level page.
    pub generate_button: Duration,
    /// Widgets inside embedded frames.
    pub frame_widget: Duration,
    /// The generation panel of the item-wise GRN frame, which loads slowly.
    pub generate_panel: Duration,
    /// A file transfer after its trigger was clicked.
    pub download: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            login_form: Duration::from_secs(60),
            post_login_navigation: Duration::from_secs(60),
            report_card: Duration::from_secs(60),
            generate_button: Duration::from_secs(15),
            frame_widget: Duration::from_secs(10),
            generate_panel: Duration::from_secs(180),
            download: Duration::from_secs(60),
        }
    }
}

impl Timeouts {
    /// Every bound set to `d`. Used by tests against the simulated engine.
    pub fn uniform(d: Duration) -> Self {
        Self {
            navigation: d,
            login_form: d,
            post_login_navigation: d,
            report_card: d,
            generate_button: d,
            frame_widget: d,
            generate_panel: d,
            download: d,
        }
    }
}

/// Fixed waits inserted where the target application exposes no completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    /// Between filling individual form fields.
    pub field_entry: Duration,
    /// After a post-login navigation that was never observed.
    pub post_login: Duration,
    /// After opening the reports section.
    pub reports_menu: Duration,
    /// Upper bound for client-side rendering of a report page.
    pub report_page: Duration,
    /// Upper bound for client-side rendering of the suppliers page.
    pub suppliers_page: Duration,
    /// After opening a multiselect widget.
    pub widget_open: Duration,
    /// Between ticking individual multiselect options.
    pub option_click: Duration,
    /// Between interactions inside embedded frames.
    pub frame_action: Duration,
    /// Server-side processing of purchase order reports.
    pub po_generation: Duration,
    /// Server-side processing of item-wise GRN reports.
    pub grn_generation: Duration,
    /// After the results table of generated reports appears.
    pub results_table: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            field_entry: Duration::from_secs(1),
            post_login: Duration::from_secs(3),
            reports_menu: Duration::from_secs(3),
            report_page: Duration::from_secs(10),
            suppliers_page: Duration::from_secs(5),
            widget_open: Duration::from_secs(2),
            option_click: Duration::from_millis(500),
            frame_action: Duration::from_secs(1),
            po_generation: Duration::from_secs(10),
            grn_generation: Duration::from_secs(60),
            results_table: Duration::from_secs(2),
        }
    }
}

impl SettleDelays {
    /// No settling at all.
    pub fn none() -> Self {
        Self {
            field_entry: Duration::ZERO,
            post_login: Duration::ZERO,
            reports_menu: Duration::ZERO,
            report_page: Duration::ZERO,
            suppliers_page: Duration::ZERO,
            widget_open: Duration::ZERO,
            option_click: Duration::ZERO,
            frame_action: Duration::ZERO,
            po_generation: Duration::ZERO,
            grn_generation: Duration::ZERO,
            results_table: Duration::ZERO,
        }
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parse_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool_or(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::Invalid {
                var,
                reason: format!("expected a boolean, got {other:?}"),
            }),
        },
        Err(_) => Ok(default),
    }
}

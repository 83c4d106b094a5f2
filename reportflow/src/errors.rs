use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    /// Whether this error is the normal outcome of a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AutomationError::Timeout(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

//! Failure snapshots.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::platforms::PageDriver;

/// `<dir>/<label>_<YYYYMMDD_HHMMSS>.png`
pub fn snapshot_path(dir: &Path, label: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}.png", label, at.format("%Y%m%d_%H%M%S")))
}

/// Capture a screenshot of `page` for post-mortem inspection.
///
/// Never fails: a snapshot that cannot be taken is logged at debug level and
/// `None` is returned.
pub async fn capture(page: &dyn PageDriver, dir: &Path, label: &str) -> Option<PathBuf> {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        debug!("cannot create diagnostics dir {}: {}", dir.display(), e);
        return None;
    }
    let path = snapshot_path(dir, label, Local::now());
    match page.screenshot(&path).await {
        Ok(()) => {
            info!("diagnostic snapshot saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            debug!("diagnostic snapshot '{}' failed: {}", label, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_path_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            snapshot_path(Path::new("/tmp/diag"), "login_error", at),
            PathBuf::from("/tmp/diag/login_error_20240309_070501.png")
        );
    }
}

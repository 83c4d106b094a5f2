//! Where downloaded reports land.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AutomationError;
use crate::platforms::Download;
use crate::selector::Selector;

/// Naming pattern for a report file: `<dir>/<stem>_<YYYYMMDD_HHMMSS>.<extension>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTemplate {
    pub dir: PathBuf,
    pub stem: String,
    pub extension: String,
}

impl ArtifactTemplate {
    pub fn new(dir: impl Into<PathBuf>, stem: &str, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn path_at(&self, at: DateTime<Local>) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            self.stem,
            at.format("%Y%m%d_%H%M%S"),
            self.extension
        ))
    }

    /// Claim a destination nobody else holds. Runs finishing within the same
    /// second get `_2`, `_3`, ... appended to the timestamp. The claim is an
    /// empty placeholder file, replaced when the download is saved.
    pub fn reserve(&self, at: DateTime<Local>) -> PathBuf {
        let first = self.path_at(at);
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            debug!("cannot create {}: {}", self.dir.display(), e);
            return first;
        }
        let base = first.with_extension("");
        let numbered = (2u32..).map(|n| {
            let mut name = base.as_os_str().to_owned();
            name.push(format!("_{n}.{}", self.extension));
            PathBuf::from(name)
        });
        for candidate in std::iter::once(first.clone()).chain(numbered) {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => return candidate,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    debug!("cannot claim {}: {}", candidate.display(), e);
                    return candidate;
                }
            }
        }
        first
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum ArtifactState {
    Pending,
    Saved,
    Failed(String),
}

/// A file expected from a download trigger
#[derive(Debug, Clone, Serialize)]
pub struct DownloadArtifact {
    pub trigger: Selector,
    pub destination: PathBuf,
    pub state: ArtifactState,
}

impl DownloadArtifact {
    pub fn pending(trigger: Selector, template: &ArtifactTemplate) -> Self {
        Self {
            trigger,
            destination: template.reserve(Local::now()),
            state: ArtifactState::Pending,
        }
    }

    /// Persist a completed download. Returns the saved path.
    pub async fn save(&mut self, download: Download) -> Result<&Path, AutomationError> {
        debug!(
            suggested = download.suggested_filename().unwrap_or("<none>"),
            "saving download triggered by '{}'", self.trigger
        );
        match download.save_as(&self.destination).await {
            Ok(()) => {
                self.state = ArtifactState::Saved;
                info!("report saved to {}", self.destination.display());
                Ok(&self.destination)
            }
            Err(e) => {
                self.fail(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn fail(&mut self, reason: &str) {
        warn!(
            "no file saved to {}: {}",
            self.destination.display(),
            reason
        );
        // Drop the placeholder left by `reserve`
        let _ = std::fs::remove_file(&self.destination);
        self.state = ArtifactState::Failed(reason.to_string());
    }
}

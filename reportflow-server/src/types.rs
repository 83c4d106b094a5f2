use chrono::{DateTime, Utc};
use reportflow::{ReportKind, RunResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub running: usize,
}

/// Optional body of a trigger request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    /// Caller's own correlation id, echoed back in the run record
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub status: String,
    pub run_id: Uuid,
    pub message: String,
}

// ============================================================================
// Run Registry
// ============================================================================

/// What the server knows about a triggered run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunRecord {
    Running {
        run_id: Uuid,
        kind: ReportKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference_id: Option<String>,
        accepted_at: DateTime<Utc>,
    },
    Finished {
        run_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference_id: Option<String>,
        result: RunResult,
    },
    /// No browser session could be opened
    Aborted {
        run_id: Uuid,
        kind: ReportKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference_id: Option<String>,
        error: String,
    },
}

impl RunRecord {
    pub fn is_running(&self) -> bool {
        matches!(self, RunRecord::Running { .. })
    }
}

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reportflow::ReportKind;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::run_manager::RunManager;
use crate::types::{AcceptedResponse, HealthResponse, ReportRequest, RunRecord};

pub fn router(manager: Arc<RunManager>, cors: bool) -> Router {
    let app = Router::new()
        // Health check
        .route("/api/health", get(health))
        // Extraction triggers
        .route("/api/reports/{kind}", post(trigger_report))
        .route("/download-vendors-csv", post(download_vendors_csv))
        // Run status
        .route("/api/runs/{run_id}", get(get_run))
        .with_state(manager)
        .layer(TraceLayer::new_for_http());

    if cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

// ============================================================================
// Error Handling
// ============================================================================

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health(State(manager): State<Arc<RunManager>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        running: manager.running().await,
    })
}

// ============================================================================
// Trigger Runs
// ============================================================================

pub async fn trigger_report(
    State(manager): State<Arc<RunManager>>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    info!("📥 POST /api/reports/{}", kind);
    let kind: ReportKind = kind.parse().map_err(ApiError::BadRequest)?;
    let request = parse_request(&body)?;
    Ok(accept(&manager, kind, request).await)
}

/// Vendor list trigger kept at its historical route
pub async fn download_vendors_csv(
    State(manager): State<Arc<RunManager>>,
) -> (StatusCode, Json<AcceptedResponse>) {
    info!("📥 POST /download-vendors-csv");
    accept(&manager, ReportKind::VendorList, ReportRequest::default()).await
}

async fn accept(
    manager: &RunManager,
    kind: ReportKind,
    request: ReportRequest,
) -> (StatusCode, Json<AcceptedResponse>) {
    let run_id = manager.start(kind, request.reference_id).await;
    info!("✅ Accepted {} run {}", kind, run_id);
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "processing".to_string(),
            run_id,
            message: format!("{kind} extraction started in background"),
        }),
    )
}

fn parse_request(body: &[u8]) -> Result<ReportRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReportRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

// ============================================================================
// Run Status
// ============================================================================

pub async fn get_run(
    State(manager): State<Arc<RunManager>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    let run_id = Uuid::parse_str(&run_id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid run id: {run_id}")))?;
    manager
        .get(run_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown run: {run_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use reportflow::rehearsal::rehearsal_site;
    use reportflow::{ReportFlow, SettleDelays, Settings, Timeouts};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> Router {
        let settings = Settings::for_target("https://erp.example.test/login")
            .with_credentials("ops", "secret")
            .with_email("ops@example.test")
            .with_output_dirs(dir.join("downloads"), dir.join("diagnostics"))
            .with_page_timeout(Duration::from_millis(300))
            .with_timeouts(Timeouts::uniform(Duration::from_millis(300)))
            .with_settle_delays(SettleDelays::none());
        let flow = ReportFlow::with_engine(Arc::new(rehearsal_site().engine()), settings);
        router(Arc::new(RunManager::new(Arc::new(flow))), false)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn wait_until_done(app: &Router, run_id: &str) -> Value {
        for _ in 0..200 {
            let uri = format!("/api/runs/{run_id}");
            let (status, body) = send(app, "GET", &uri, Body::empty()).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "running" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("run {run_id} never finished");
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let (status, body) = send(&app, "GET", "/api/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["running"], 0);
    }

    #[tokio::test]
    async fn test_trigger_report_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, body) = send(
            &app,
            "POST",
            "/api/reports/purchase_order",
            Body::from(r#"{"reference_id":"nightly-42"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");

        let run_id = body["run_id"].as_str().unwrap().to_string();
        let record = wait_until_done(&app, &run_id).await;
        assert_eq!(record["status"], "finished");
        assert_eq!(record["run_id"], run_id.as_str());
        assert_eq!(record["reference_id"], "nightly-42");
        assert_eq!(record["result"]["status"], "succeeded");
        let artifact = record["result"]["artifact"].as_str().unwrap();
        assert!(std::path::Path::new(artifact).exists());
    }

    #[tokio::test]
    async fn test_vendor_csv_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, body) = send(&app, "POST", "/download-vendors-csv", Body::empty()).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let record = wait_until_done(&app, body["run_id"].as_str().unwrap()).await;
        assert_eq!(record["result"]["kind"], "vendor_list");
        assert_eq!(record["result"]["status"], "succeeded");
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, body) = send(&app, "POST", "/api/reports/balance_sheet", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());

        let (status, _) = send(&app, "POST", "/api/reports/grn", Body::from("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/runs/not-a-uuid", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = Uuid::new_v4();
        let (status, _) = send(&app, "GET", &format!("/api/runs/{unknown}"), Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use market_types::ModeProfile;
use pipeline_orchestrator::{Job, ScanParams};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiResponse, AppError, AppState};

/// Body for `POST /scans`. Everything is optional: an empty body scans the
/// adapter's top symbols under the server's default mode and leverage.
#[derive(Debug, Default, Deserialize)]
pub struct CreateScanRequest {
    pub symbols: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub mode: Option<ModeProfile>,
    pub leverage: Option<f64>,
    pub exchange: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct CreateScanResponse {
    pub run_id: Uuid,
    pub job: Job,
}

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scans", post(create_scan))
        .route("/scans/:run_id", get(get_scan))
        .route("/scans/:run_id/cancel", post(cancel_scan))
}

async fn create_scan(
    State(state): State<AppState>,
    Json(req): Json<CreateScanRequest>,
) -> Result<Json<ApiResponse<CreateScanResponse>>, AppError> {
    let params = ScanParams {
        symbols: req.symbols,
        limit: req.limit,
        min_score: req.min_score,
        mode_profile: req.mode.unwrap_or(state.default_mode),
        leverage: req.leverage.unwrap_or(state.default_leverage),
        exchange: req.exchange,
    };

    let (run_id, job) = state.orchestrator.create_scan(params);

    Ok(Json(ApiResponse::success(CreateScanResponse { run_id, job })))
}

async fn get_scan(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Job>>, AppError> {
    let job = state
        .orchestrator
        .get_job(run_id)
        .ok_or_else(|| AppError::NotFound(format!("no scan with run_id {run_id}")))?;

    Ok(Json(ApiResponse::success(job)))
}

async fn cancel_scan(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    if state.orchestrator.get_job(run_id).is_none() {
        return Err(AppError::NotFound(format!("no scan with run_id {run_id}")));
    }

    let cancelled = state.orchestrator.cancel(run_id);

    Ok(Json(ApiResponse::success(serde_json::json!({ "cancelled": cancelled }))))
}

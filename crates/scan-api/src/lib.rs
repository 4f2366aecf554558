//! HTTP facade over the scan pipeline (§6). Exposes job creation, polling and
//! cancellation as a small axum surface; wraps startup wiring of the
//! analysis crates into a [`pipeline_orchestrator::ScanOrchestrator`].

mod request_id;
mod scan_routes;
mod security_headers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use market_types::{ModeProfile, ScanConfig, ScanError};
use pipeline_orchestrator::{OrchestratorConfig, ScanOrchestrator};
use position_sizer::PositionSizer;
use risk_manager::{RiskLimits, RiskManager};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use request_id::RequestId;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub default_mode: ModeProfile,
    pub default_leverage: f64,
}

/// Uniform response envelope, mirroring the `{success, data, error}` shape
/// every handler in this surface returns.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

/// Application error boundary. Stage-specific error kinds stop mattering
/// once they cross into the HTTP surface; only the status code and message
/// the caller sees still do.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::InvalidConfig(_) | ScanError::InvalidArgument(_) => {
                AppError::BadRequest(err.to_string())
            }
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(err) => {
                tracing::error!("request failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .merge(scan_routes::scan_routes())
        .layer(axum::middleware::from_fn(security_headers::security_headers_middleware))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Builds the orchestrator from environment configuration and serves the
/// HTTP surface until the process is signalled to stop.
///
/// No concrete exchange adapter ships (§4.1 is an interface-only contract),
/// so startup wires in [`exchange_adapter::FakeAdapter`] seeded with nothing;
/// every scan against it rejects every symbol with `DataUnavailable` until a
/// real adapter is plugged in here.
pub async fn run_server() -> anyhow::Result<()> {
    let config = ScanConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    let account_balance = 10_000.0;
    let adapter = Arc::new(exchange_adapter::FakeAdapter::new(
        config.exchange.clone().unwrap_or_else(|| "unconfigured".to_string()),
    ));
    let risk_manager = Arc::new(RiskManager::new(account_balance, RiskLimits::default())?);
    let position_sizer = PositionSizer::default_for_balance(account_balance)?;
    let cooldown_path = config.cache_dir.join("cooldowns.json");
    let cooldown_store = Arc::new(cooldown_store::CooldownStore::load(cooldown_path)?);

    let orchestrator_config = OrchestratorConfig {
        max_workers: config.max_workers,
        dominance_cache_path: config.cache_dir.join("dominance_cache.json"),
        ..Default::default()
    };

    let orchestrator = Arc::new(ScanOrchestrator::new(
        adapter,
        risk_manager,
        cooldown_store,
        position_sizer,
        orchestrator_config,
    ));

    let state = AppState {
        orchestrator,
        default_mode: ModeProfile::StealthBalanced,
        default_leverage: 1.0,
    };

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(%port, "scan-api listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

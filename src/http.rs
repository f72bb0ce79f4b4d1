//! JSON HTTP surface: webhook intake plus read-only query endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use error_stack::Report;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::{IngestError, QueryError};
use crate::ingest::{IngestOutcome, IngestService, TickInput};
use crate::query::{DEFAULT_HISTORY_DAYS, QueryService};

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub query: Arc<QueryService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/prices", get(prices))
        .route("/indicators", get(indicators))
        .route("/tick", get(latest_tick))
        .route("/history", get(history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Handler error. Reports are logged here and never sent to the client.
pub enum ApiError {
    Ingest(Report<IngestError>),
    Query(Report<QueryError>),
    NotFound(&'static str),
}

impl From<Report<IngestError>> for ApiError {
    fn from(report: Report<IngestError>) -> Self {
        Self::Ingest(report)
    }
}

impl From<Report<QueryError>> for ApiError {
    fn from(report: Report<QueryError>) -> Self {
        Self::Query(report)
    }
}

const STORAGE_FAILURE: (StatusCode, &str) = (StatusCode::INTERNAL_SERVER_ERROR, "storage error");

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Ingest(report) => match report.current_context() {
                IngestError::InvalidPayload { reason } => {
                    warn!(reason = %reason, "rejected webhook payload");
                    (StatusCode::BAD_REQUEST, "invalid payload")
                }
                IngestError::Storage => {
                    error!(error = ?report, "ingestion failed");
                    STORAGE_FAILURE
                }
            },
            Self::Query(report) => match report.current_context() {
                QueryError::MissingParameter { .. } => (StatusCode::BAD_REQUEST, "symbol required"),
                QueryError::InvalidParameter { name } => {
                    warn!(parameter = %name, "rejected query parameter");
                    (StatusCode::BAD_REQUEST, "invalid parameter")
                }
                QueryError::Storage => {
                    error!(error = ?report, "query failed");
                    STORAGE_FAILURE
                }
            },
            Self::NotFound(message) => (StatusCode::NOT_FOUND, *message),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SymbolParams {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    symbol: Option<String>,
    days: Option<u32>,
}

async fn home() -> impl IntoResponse {
    Json(json!({ "message": "tick ingestion service is running" }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /webhook` with `{symbol, price}`.
async fn webhook(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let input = TickInput::parse(&body)?;
    let response = match state.ingest.ingest(input).await? {
        IngestOutcome::SavedPriceOnly => {
            Json(json!({ "status": "saved price only" })).into_response()
        }
        IngestOutcome::Snapshot(snapshot) => Json(snapshot).into_response(),
    };
    Ok(response)
}

async fn prices(
    State(state): State<AppState>,
    Query(params): Query<SymbolParams>,
) -> Result<Response, ApiError> {
    let ticks = state.query.get_prices(params.symbol.as_deref()).await?;
    Ok(Json(ticks).into_response())
}

async fn indicators(
    State(state): State<AppState>,
    Query(params): Query<SymbolParams>,
) -> Result<Response, ApiError> {
    let samples = state.query.get_indicators(params.symbol.as_deref()).await?;
    Ok(Json(samples).into_response())
}

async fn latest_tick(
    State(state): State<AppState>,
    Query(params): Query<SymbolParams>,
) -> Result<Response, ApiError> {
    match state.query.get_latest(params.symbol.as_deref()).await? {
        Some(tick) => Ok(Json(tick).into_response()),
        None => Err(ApiError::NotFound("no ticks for symbol")),
    }
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let ticks = state
        .query
        .get_history(params.symbol.as_deref(), days, Utc::now())
        .await?;
    Ok(Json(ticks).into_response())
}

//! Trading trigger routes
//!
//! Manual execute, scheduled execute, portfolio reset and a status snapshot.
//! All execute and reset calls go through the engine's run lease, so a manual
//! request that overlaps a scheduled one gets a 409.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use trading_engine::{LiquidationSummary, RunSummary, StatusSnapshot, Trigger};

use crate::auth::{self, ValidatedApiKey};
use crate::request_id::RequestId;
use crate::{ApiResponse, AppError, AppState};

pub const DEFAULT_ORDER_LIMIT: usize = 20;
pub const MAX_ORDER_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct StatusQuery {
    pub limit: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Deserialize)]
pub struct LiquidateRequest {
    #[serde(default)]
    pub confirm: bool,
}

/// Routes behind API key auth. The scheduled trigger is mounted separately
/// because it authenticates with the cron secret instead.
pub fn trading_routes() -> Router<AppState> {
    Router::new()
        .route("/api/trading/status", get(get_status))
        .route("/api/trading/execute", post(execute_manual))
        .route("/api/trading/liquidate", post(liquidate))
}

/// Request id and masked caller key for the audit line of a mutating call.
fn audit(
    request_id: Option<Extension<RequestId>>,
    key: Option<Extension<ValidatedApiKey>>,
) -> (String, String) {
    (
        request_id.map(|Extension(RequestId(id))| id).unwrap_or_else(|| "-".to_string()),
        key.map(|Extension(k)| k.masked).unwrap_or_else(|| "anonymous".to_string()),
    )
}

pub(crate) fn parse_limit(raw: Option<&str>) -> Result<usize, AppError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_ORDER_LIMIT);
    };
    match raw.trim().parse::<usize>() {
        Ok(limit) if (1..=MAX_ORDER_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(AppError::bad_request(format!(
            "limit must be an integer between 1 and {}",
            MAX_ORDER_LIMIT
        ))),
    }
}

async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<StatusSnapshot>>, AppError> {
    let limit = parse_limit(query.limit.as_deref())?;
    let snapshot = state.engine.status(limit).await;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// Manual scan-and-trade. The body is optional.
async fn execute_manual(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    key: Option<Extension<ValidatedApiKey>>,
    body: Option<Json<ExecuteRequest>>,
) -> Result<Json<ApiResponse<RunSummary>>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let (request_id, caller) = audit(request_id, key);
    tracing::info!(
        request_id = %request_id,
        caller = %caller,
        "Manual run requested (force_refresh={})",
        request.force_refresh
    );

    let summary = state
        .engine
        .execute(Trigger::Manual, request.force_refresh)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Timer-driven run for an external cron caller.
pub async fn execute_scheduled(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<RunSummary>>, AppError> {
    auth::authorize_scheduled(state.cron_secret.as_deref(), &state.api_key_hashes, &headers)?;

    let summary = state.engine.execute(Trigger::Scheduled, false).await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Cancel all open orders, then close all positions if the market is open.
async fn liquidate(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    key: Option<Extension<ValidatedApiKey>>,
    body: Option<Json<LiquidateRequest>>,
) -> Result<Json<ApiResponse<LiquidationSummary>>, AppError> {
    let confirmed = body.map(|Json(r)| r.confirm).unwrap_or(false);
    if !confirmed {
        return Err(AppError::bad_request(
            "portfolio reset requires {\"confirm\": true}",
        ));
    }
    let (request_id, caller) = audit(request_id, key);
    tracing::warn!(request_id = %request_id, caller = %caller, "Portfolio reset confirmed");

    let summary = state.engine.liquidate().await?;
    Ok(Json(ApiResponse::success(summary)))
}

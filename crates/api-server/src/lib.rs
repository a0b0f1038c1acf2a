pub mod auth;
pub mod request_id;
pub mod scheduler;
pub mod trading_routes;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use trading_engine::{EngineConfig, EngineError, TradingEngine};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TradingEngine>,
    /// SHA-256 hashes of accepted API keys. Empty means development mode.
    pub api_key_hashes: Arc<HashSet<String>>,
    /// Bearer secret for the scheduled trigger. `None` disables that endpoint.
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(engine: Arc<TradingEngine>) -> Self {
        Self {
            cron_secret: engine.config().cron_secret.clone(),
            engine,
            api_key_hashes: Arc::new(auth::load_api_keys()),
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error rendered as `{ "success": false, "error": ... }`.
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        }
        (
            self.status,
            Json(json!({
                "success": false,
                "error": format!("{:#}", self.error),
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error: anyhow::Error = err.into();
        if let Some(auth) = error.downcast_ref::<auth::AuthError>() {
            return Self {
                status: auth.status(),
                error,
            };
        }
        let status = match error.downcast_ref::<EngineError>() {
            Some(EngineError::RunInProgress(_)) => StatusCode::CONFLICT,
            Some(EngineError::AccountUnavailable)
            | Some(EngineError::PositionsUnavailable)
            | Some(EngineError::SignalSource(_)) => StatusCode::BAD_GATEWAY,
            Some(EngineError::InvalidConfig(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "paper": state.engine.config().is_paper(),
        "auto_trading_enabled": state.engine.config().auto_trading_enabled,
    }))
}

pub fn build_router(state: AppState) -> Router {
    let protected = trading_routes::trading_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::auth_middleware,
    ));

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/trading/scheduled",
            post(trading_routes::execute_scheduled),
        )
        .merge(protected)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Refuse a live brokerage URL unless it was explicitly approved.
pub fn check_live_trading(config: &EngineConfig) -> anyhow::Result<()> {
    if config.is_paper() {
        return Ok(());
    }
    if !config.live_trading_approved {
        anyhow::bail!(
            "ALPACA_BASE_URL points at a live account ({}); set LIVE_TRADING_APPROVED=yes to allow it",
            config.alpaca_base_url
        );
    }
    tracing::warn!("LIVE TRADING enabled against {}", config.alpaca_base_url);
    Ok(())
}

fn bind_addr() -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = std::env::var("BIND_ADDR") {
        return Ok(addr.parse()?);
    }
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl-C");
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env()?;
    check_live_trading(&config)?;

    let scheduler_enabled = config.scheduler_enabled;
    let scan_interval = config.scan_interval;
    let engine = Arc::new(TradingEngine::from_config(config)?);
    let state = AppState::new(engine.clone());

    if state.api_key_hashes.is_empty() {
        tracing::warn!("API_KEYS not set, trading endpoints are unauthenticated (development mode)");
    }
    if state.cron_secret.is_none() {
        tracing::info!("CRON_SECRET not set, /api/trading/scheduled is disabled");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let ticker = if scheduler_enabled {
        Some(scheduler::spawn_scheduler(engine, scan_interval, shutdown_rx))
    } else {
        tracing::info!("Interval scheduler disabled (SCHEDULER_ENABLED=false)");
        None
    };

    let addr = bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(ticker) = ticker {
        if let Err(e) = ticker.await {
            tracing::warn!("Scheduler task ended abnormally: {}", e);
        }
    }

    tracing::info!("API server shut down.");
    Ok(())
}

use std::collections::HashSet;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::AppState;

/// Hash a key with SHA-256 so lookups and comparisons run over fixed-length
/// hex digests instead of the raw secret.
pub(crate) fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;

/// API key authentication middleware.
///
/// Checks for an API key in:
/// 1. X-API-Key header (recommended)
/// 2. Authorization: Bearer <token> header
///
/// If no API keys are configured, authentication is skipped (development mode).
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if request.uri().path() == "/health" || state.api_key_hashes.is_empty() {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&headers)?;
    if !state.api_key_hashes.contains(&hash_key(&api_key)) {
        tracing::warn!("Invalid API key attempted: {}", mask_api_key(&api_key));
        return Err(AuthError::InvalidApiKey);
    }

    tracing::debug!("Valid API key: {}", mask_api_key(&api_key));
    request.extensions_mut().insert(ValidatedApiKey {
        masked: mask_api_key(&api_key),
    });

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extract the API key from request headers. Query parameters are not
/// accepted.
pub(crate) fn extract_api_key(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(key) = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
    {
        return Ok(key.to_string());
    }

    bearer_token(headers)
        .map(str::to_string)
        .ok_or(AuthError::MissingApiKey)
}

/// Authorize the scheduled trigger against `CRON_SECRET`.
///
/// An unset secret disables the endpoint entirely.
pub fn check_cron_secret(expected: Option<&str>, headers: &HeaderMap) -> Result<(), AuthError> {
    let expected = expected.ok_or(AuthError::CronNotConfigured)?;
    let provided = bearer_token(headers).ok_or(AuthError::MissingCronSecret)?;

    if hash_key(provided) != hash_key(expected) {
        tracing::warn!("Invalid cron secret attempted");
        return Err(AuthError::InvalidCronSecret);
    }
    Ok(())
}

/// Authorize the scheduled trigger: a matching cron secret, or an API key
/// the server was configured with. Open development mode (no `API_KEYS`)
/// does not count as a valid key here.
pub fn authorize_scheduled(
    cron_secret: Option<&str>,
    api_key_hashes: &HashSet<String>,
    headers: &HeaderMap,
) -> Result<(), AuthError> {
    let key_ok = !api_key_hashes.is_empty()
        && extract_api_key(headers)
            .map(|key| api_key_hashes.contains(&hash_key(&key)))
            .unwrap_or(false);
    if key_ok {
        tracing::debug!("Scheduled trigger authorized by API key");
        return Ok(());
    }
    check_cron_secret(cron_secret, headers)
}

/// Load API keys from `API_KEYS` (comma-separated) as SHA-256 hashes.
pub(crate) fn load_api_keys() -> HashSet<String> {
    parse_api_keys(&std::env::var("API_KEYS").unwrap_or_default())
}

pub(crate) fn parse_api_keys(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(hash_key)
        .collect()
}

/// Mask API key for logging (show first 4 and last 4 characters)
pub(crate) fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 || !key.is_ascii() {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

/// Inserted into request extensions once a key is accepted.
#[derive(Clone, Debug)]
pub struct ValidatedApiKey {
    pub masked: String,
}

#[derive(Debug)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
    CronNotConfigured,
    MissingCronSecret,
    InvalidCronSecret,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingApiKey => write!(f, "Missing API key"),
            AuthError::InvalidApiKey => write!(f, "Invalid API key"),
            AuthError::CronNotConfigured => write!(f, "Scheduled trigger not configured"),
            AuthError::MissingCronSecret => write!(f, "Missing cron secret"),
            AuthError::InvalidCronSecret => write!(f, "Invalid cron secret"),
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingApiKey
            | AuthError::InvalidApiKey
            | AuthError::MissingCronSecret
            | AuthError::InvalidCronSecret => StatusCode::UNAUTHORIZED,
            AuthError::CronNotConfigured => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingApiKey => {
                "Missing API key. Provide via X-API-Key header or Authorization: Bearer header."
                    .to_string()
            }
            AuthError::CronNotConfigured => {
                "Scheduled trigger disabled. Set CRON_SECRET to enable it.".to_string()
            }
            AuthError::MissingCronSecret => {
                "Missing cron secret. Provide via Authorization: Bearer header.".to_string()
            }
            ref other => format!("{}.", other),
        };

        (
            self.status(),
            Json(json!({
                "success": false,
                "error": message,
            })),
        )
            .into_response()
    }
}

use super::*;
use axum::http::HeaderValue;

fn bearer(token: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Authorization", HeaderValue::from_static(token));
    headers
}

#[test]
fn test_mask_api_key() {
    assert_eq!(mask_api_key("abcd1234efgh5678"), "abcd...5678");
}

#[test]
fn test_mask_short_api_key() {
    assert_eq!(mask_api_key("short"), "****");
}

#[test]
fn test_extract_api_key_from_x_api_key_header() {
    let mut headers = HeaderMap::new();
    headers.insert("X-API-Key", HeaderValue::from_static("test_key_123"));

    assert_eq!(extract_api_key(&headers).unwrap(), "test_key_123");
}

#[test]
fn test_extract_api_key_from_bearer_token() {
    let headers = bearer("Bearer test_token_456");
    assert_eq!(extract_api_key(&headers).unwrap(), "test_token_456");
}

#[test]
fn test_x_api_key_wins_over_bearer() {
    let mut headers = bearer("Bearer other");
    headers.insert("X-API-Key", HeaderValue::from_static("primary"));
    assert_eq!(extract_api_key(&headers).unwrap(), "primary");
}

#[test]
fn test_extract_api_key_missing() {
    let result = extract_api_key(&HeaderMap::new());
    assert!(matches!(result, Err(AuthError::MissingApiKey)));

    let result = extract_api_key(&bearer("Bearer "));
    assert!(matches!(result, Err(AuthError::MissingApiKey)));

    let result = extract_api_key(&bearer("Basic dXNlcjpwYXNz"));
    assert!(matches!(result, Err(AuthError::MissingApiKey)));
}

#[test]
fn test_parse_api_keys_hashes_entries() {
    let keys = parse_api_keys(" key-one , ,key-two");
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&hash_key("key-one")));
    assert!(keys.contains(&hash_key("key-two")));
    assert!(!keys.contains("key-one"));
}

#[test]
fn test_hash_key_is_stable_hex() {
    let hash = hash_key("secret");
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, hash_key("secret"));
    assert_ne!(hash, hash_key("Secret"));
}

#[test]
fn test_cron_secret_accepts_exact_match() {
    let headers = bearer("Bearer s3cret");
    assert!(check_cron_secret(Some("s3cret"), &headers).is_ok());
}

#[test]
fn test_cron_secret_rejects_mismatch_and_missing() {
    let result = check_cron_secret(Some("s3cret"), &bearer("Bearer s3cret2"));
    assert!(matches!(result, Err(AuthError::InvalidCronSecret)));

    let result = check_cron_secret(Some("s3cret"), &HeaderMap::new());
    assert!(matches!(result, Err(AuthError::MissingCronSecret)));
}

#[test]
fn test_cron_secret_unset_refuses_everything() {
    let result = check_cron_secret(None, &bearer("Bearer anything"));
    assert!(matches!(result, Err(AuthError::CronNotConfigured)));
    assert_eq!(AuthError::CronNotConfigured.status(), StatusCode::FORBIDDEN);
    assert_eq!(AuthError::InvalidCronSecret.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_scheduled_accepts_cron_secret_or_configured_key() {
    let keys: HashSet<String> = [hash_key("desk-key-0001")].into_iter().collect();

    assert!(authorize_scheduled(Some("s3cret"), &keys, &bearer("Bearer s3cret")).is_ok());
    assert!(authorize_scheduled(None, &keys, &bearer("Bearer desk-key-0001")).is_ok());

    let result = authorize_scheduled(Some("s3cret"), &keys, &bearer("Bearer desk-key-0002"));
    assert!(matches!(result, Err(AuthError::InvalidCronSecret)));
}

#[test]
fn test_scheduled_open_mode_is_not_a_key() {
    let result = authorize_scheduled(None, &HashSet::new(), &bearer("Bearer anything"));
    assert!(matches!(result, Err(AuthError::CronNotConfigured)));
}

//! Request middleware: the ingestion secret and body limit constant

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::server::AppStateArc;

/// Maximum body size: 64 KiB, streamed or not
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Header carrying the ingestion secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject telemetry pushes without the configured shared secret.
///
/// Runs before the body is read, so a bad key is a 401 even when the
/// payload is also malformed.
pub async fn require_ingestion_key(
    State(state): State<AppStateArc>,
    request: Request,
    next: Next,
) -> Response {
    let presented = extract_api_key(request.headers());

    if !keys_match(state.ingestion_key.as_deref(), presented.as_deref()) {
        match &presented {
            Some(key) => warn!("Rejected telemetry push with key {}", mask_secret(key)),
            None => warn!("Rejected telemetry push without {}", API_KEY_HEADER),
        }
        state.metrics.record_ingest("unauthorized");
        return ApiError::Unauthorized.into_response();
    }

    debug!("Ingestion key accepted");
    next.run(request).await
}

/// Value of the `x-api-key` header, if present and printable
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)?
        .to_str()
        .ok()
        .map(|s| s.trim().to_string())
}

/// Compare without short-circuiting on the first differing byte.
/// No configured key means nothing matches.
pub fn keys_match(expected: Option<&str>, presented: Option<&str>) -> bool {
    let (Some(expected), Some(presented)) = (expected, presented) else {
        return false;
    };
    if expected.is_empty() || expected.len() != presented.len() {
        return false;
    }
    expected
        .bytes()
        .zip(presented.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Mask secret for logging (show first 8 chars only)
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() > 8 {
        format!("{}...", secret.chars().take(8).collect::<String>())
    } else {
        "***".to_string()
    }
}

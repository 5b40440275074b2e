use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use tracing::error;

use crate::config::mask_key;
use crate::error::GatewayError;
use crate::AppState;

/// `X-API-Key` wins; otherwise `Authorization` with its `Bearer ` prefix removed.
pub fn provided_api_key(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let key = from_header.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.replacen("Bearer ", "", 1))
    })?;
    let key = key.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let provided = provided_api_key(req.headers()).ok_or(GatewayError::MissingApiKey)?;

    let Some(expected) = state.config.expected_api_key() else {
        error!("API_KEY environment variable is not set");
        return Err(GatewayError::ServerMisconfigured);
    };

    if provided != expected {
        error!(
            "API key mismatch: received {} (length {}), expected {} (length {})",
            mask_key(&provided),
            provided.chars().count(),
            mask_key(expected),
            expected.chars().count()
        );
        return Err(GatewayError::InvalidApiKey);
    }

    Ok(next.run(req).await)
}

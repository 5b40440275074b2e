use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: recipientEmail, recipientName, recipientDateNaissance, recipientFiliere, recipientCodeMassar, recipientUserCode";

/// Every non-2xx answer the gateway gives.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API key is required. Please provide it in the X-API-Key header or Authorization header.")]
    MissingApiKey,
    #[error("Server configuration error")]
    ServerMisconfigured,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("{0}")]
    BadRequest(String),
    #[error("{error}")]
    Mail { error: String, details: String },
    #[error("Route not found")]
    NotFound,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingApiKey => StatusCode::UNAUTHORIZED,
            Self::ServerMisconfigured | Self::Mail { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidApiKey => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::NotFound => json!({ "error": self.to_string() }),
            Self::Mail { error, details } => json!({
                "success": false,
                "error": error,
                "details": details,
            }),
            _ => json!({ "success": false, "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

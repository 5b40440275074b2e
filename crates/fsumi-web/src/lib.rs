//! CSC API gateway: health check, API-key protected email routes, CORS, security headers, rate limiting.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod rate_limit;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

pub use config::{mask_key, parse_origins, GatewayConfig, GatewayConfigError};
pub use email::{Mailer, MailError, SentMail, SmtpMailer, WelcomeEmail, WelcomeEmailRequest};
pub use error::GatewayError;
pub use rate_limit::{RateDecision, RateLimiter};

pub const CRATE_NAME: &str = "fsumi-web";
pub const SERVICE_NAME: &str = "CSC API Server";

const JSON_BODY_LIMIT: usize = 100 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: GatewayConfig, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self {
            config: Arc::new(config),
            mailer,
            limiter: Arc::new(RateLimiter::default()),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    /// SMTP mailer when both Yahoo credentials are present.
    pub fn from_config(config: GatewayConfig) -> Self {
        let mailer = match (&config.yahoo_email, &config.yahoo_app_password) {
            (Some(email), Some(password)) => match SmtpMailer::yahoo(email, password) {
                Ok(mailer) => Some(Arc::new(mailer) as Arc<dyn Mailer>),
                Err(err) => {
                    warn!("email transport unavailable: {err}");
                    None
                }
            },
            _ => None,
        };
        Self::new(config, mailer)
    }
}

pub fn app(state: AppState) -> Router {
    let email_routes = Router::new()
        .route("/welcome", post(email::send_welcome_handler))
        .route("/status", get(email::email_status_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/email", email_routes)
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_api_requests,
        ))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("off"),
        ))
        .with_state(state)
}

/// Any origin when the list is empty; otherwise only the listed ones, with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid origin {origin:?}");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
}

async fn health_handler() -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "service": SERVICE_NAME,
    }))
}

async fn not_found_handler() -> GatewayError {
    GatewayError::NotFound
}

pub async fn serve<F>(state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let port = state.config.port;

    info!("{SERVICE_NAME} is running on {addr}");
    info!("environment: {}", state.config.app_env);
    info!("health: http://localhost:{port}/health");
    info!("email:  http://localhost:{port}/api/email");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("serving http")
}

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use fsumi_web::{
    app, AppState, GatewayConfig, MailError, Mailer, RateLimiter, SentMail, WelcomeEmail,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "csc-test-key-0123456789";

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<WelcomeEmail>>,
    fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_welcome(&self, welcome: &WelcomeEmail) -> Result<SentMail, MailError> {
        if self.fail {
            return Err(MailError::Smtp("535 authentication failed".into()));
        }
        self.sent.lock().unwrap().push(welcome.clone());
        Ok(SentMail {
            message_id: "<test-1@yahoo.com>".into(),
        })
    }
}

fn config() -> GatewayConfig {
    GatewayConfig {
        api_key: Some(API_KEY.to_string()),
        host: "127.0.0.1".into(),
        port: 3001,
        allowed_origins: Vec::new(),
        yahoo_email: Some("csc@yahoo.com".into()),
        yahoo_app_password: Some("app-password".into()),
        app_env: "test".into(),
    }
}

fn router_with(mailer: Option<Arc<RecordingMailer>>, config: GatewayConfig) -> Router {
    let mailer = mailer.map(|m| m as Arc<dyn Mailer>);
    app(AppState::new(config, mailer))
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn welcome_body() -> Value {
    json!({
        "recipientEmail": "etudiant@edu.umi.ac.ma",
        "recipientName": "Salma",
        "recipientDateNaissance": "2003-05-14",
        "recipientFiliere": "SMI",
        "recipientCodeMassar": "D130245678",
        "recipientUserCode": "CSC-0042"
    })
}

fn post_welcome(body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/email/welcome")
        .header("x-api-key", API_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_reports_service_and_security_headers() {
    let resp = router_with(None, config())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(resp.headers()["referrer-policy"], "no-referrer");
    assert!(resp.headers().get("ratelimit-limit").is_none());
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "CSC API Server");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let resp = router_with(None, config())
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await, json!({"error": "Route not found"}));
}

#[tokio::test]
async fn api_key_is_enforced() {
    let router = router_with(None, config());

    let missing = router
        .clone()
        .oneshot(Request::builder().uri("/api/email/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(missing).await["success"], false);

    let wrong = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/email/status")
                .header("x-api-key", "another-key-entirely")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(wrong).await["error"], "Invalid API key");

    let bearer = router
        .oneshot(
            Request::builder()
                .uri("/api/email/status")
                .header(header::AUTHORIZATION, format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bearer.status(), StatusCode::OK);
    let body = body_json(bearer).await;
    assert_eq!(body["service"], "email");
    assert_eq!(body["configured"], true);
}

#[tokio::test]
async fn unset_server_key_is_a_configuration_error() {
    let mut config = config();
    config.api_key = Some("   ".into());
    let resp = router_with(None, config)
        .oneshot(
            Request::builder()
                .uri("/api/email/status")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"], "Server configuration error");
}

#[tokio::test]
async fn welcome_email_is_sent_through_the_mailer() {
    let mailer = Arc::new(RecordingMailer::default());
    let resp = router_with(Some(mailer.clone()), config())
        .oneshot(post_welcome(welcome_body().to_string()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        json!({"success": true, "message": "Email sent successfully", "messageId": "<test-1@yahoo.com>"})
    );
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].code_massar, "D130245678");
}

#[tokio::test]
async fn welcome_validation_errors_are_400() {
    let mailer = Arc::new(RecordingMailer::default());
    let router = router_with(Some(mailer.clone()), config());

    let mut missing = welcome_body();
    missing["recipientUserCode"] = json!("");
    let resp = router.clone().oneshot(post_welcome(missing.to_string())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["error"]
        .as_str()
        .unwrap()
        .starts_with("Missing required fields"));

    let mut bad_email = welcome_body();
    bad_email["recipientEmail"] = json!("etudiant@umi");
    let resp = router.clone().oneshot(post_welcome(bad_email.to_string())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Invalid email format");

    let resp = router.oneshot(post_welcome("{not json".into())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["success"], false);

    assert!(mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn mail_failures_are_500_with_details() {
    let failing = Arc::new(RecordingMailer {
        fail: true,
        ..Default::default()
    });
    let resp = router_with(Some(failing), config())
        .oneshot(post_welcome(welcome_body().to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Failed to send email");
    assert!(body["details"].as_str().unwrap().contains("535"));

    let resp = router_with(None, config())
        .oneshot(post_welcome(welcome_body().to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(resp).await["details"],
        "email service is not configured"
    );
}

fn from_client(uri: &str, addr: SocketAddr) -> Request<Body> {
    let mut req = Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

#[tokio::test]
async fn api_requests_are_rate_limited_per_client() {
    let state = AppState::new(config(), None)
        .with_limiter(RateLimiter::new(2, Duration::from_secs(15 * 60)));
    let router = app(state);
    let client: SocketAddr = "203.0.113.5:50000".parse().unwrap();
    let other: SocketAddr = "203.0.113.6:50000".parse().unwrap();

    for _ in 0..2 {
        let resp = router
            .clone()
            .oneshot(from_client("/api/email/status", client))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let limited = router
        .clone()
        .oneshot(from_client("/api/email/status", client))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()["ratelimit-remaining"], "0");
    let text = limited.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(
        std::str::from_utf8(&text).unwrap(),
        "Too many requests from this IP, please try again later."
    );

    let health = router
        .clone()
        .oneshot(from_client("/health", client))
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let resp = router
        .oneshot(from_client("/api/email/status", other))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn cors_allows_any_origin_when_unconfigured() {
    let resp = router_with(None, config())
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://example.org")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn cors_echoes_configured_origins_with_credentials() {
    let mut config = config();
    config.allowed_origins = vec!["https://csc.fs-umi.ac.ma".into()];
    let router = router_with(None, config);

    let allowed = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/email/welcome")
                .header(header::ORIGIN, "https://csc.fs-umi.ac.ma")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://csc.fs-umi.ac.ma"
    );
    assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let denied = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(denied
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

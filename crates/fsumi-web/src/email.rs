//! Welcome email route and the mail transport behind it.

use std::sync::LazyLock;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use html_escape::encode_text;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{GatewayError, MISSING_FIELDS_MESSAGE};
use crate::AppState;

pub const YAHOO_SMTP_RELAY: &str = "smtp.mail.yahoo.com";
pub const SENDER_NAME: &str = "CSC FS-UMI";
pub const WELCOME_SUBJECT: &str = "Bienvenue au CSC - FS-UMI";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeEmailRequest {
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_date_naissance: Option<String>,
    #[serde(default)]
    pub recipient_filiere: Option<String>,
    #[serde(default)]
    pub recipient_code_massar: Option<String>,
    #[serde(default)]
    pub recipient_user_code: Option<String>,
}

/// A validated welcome request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WelcomeEmail {
    pub email: String,
    pub name: String,
    pub date_naissance: String,
    pub filiere: String,
    pub code_massar: String,
    pub user_code: String,
}

impl WelcomeEmailRequest {
    pub fn validate(self) -> Result<WelcomeEmail, GatewayError> {
        fn required(value: Option<String>) -> Result<String, GatewayError> {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GatewayError::BadRequest(MISSING_FIELDS_MESSAGE.to_string()))
        }

        let welcome = WelcomeEmail {
            email: required(self.recipient_email)?,
            name: required(self.recipient_name)?,
            date_naissance: required(self.recipient_date_naissance)?,
            filiere: required(self.recipient_filiere)?,
            code_massar: required(self.recipient_code_massar)?,
            user_code: required(self.recipient_user_code)?,
        };
        if !is_valid_email(&welcome.email) {
            return Err(GatewayError::BadRequest("Invalid email format".to_string()));
        }
        Ok(welcome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub message_id: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email service is not configured")]
    NotConfigured,
    #[error("invalid address {address:?}: {message}")]
    Address { address: String, message: String },
    #[error("building message: {0}")]
    Build(String),
    #[error("smtp delivery failed: {0}")]
    Smtp(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, welcome: &WelcomeEmail) -> Result<SentMail, MailError>;
}

/// Sends through an authenticated SMTP relay over TLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(relay: &str, username: &str, password: &str) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
            .map_err(|e| MailError::Smtp(e.to_string()))?
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();
        let from = format!("{SENDER_NAME} <{username}>")
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address {
                address: username.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { transport, from })
    }

    pub fn yahoo(email: &str, app_password: &str) -> Result<Self, MailError> {
        Self::new(YAHOO_SMTP_RELAY, email, app_password)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_welcome(&self, welcome: &WelcomeEmail) -> Result<SentMail, MailError> {
        let to = format!("{} <{}>", welcome.name, welcome.email)
            .parse::<Mailbox>()
            .or_else(|_| welcome.email.parse::<Mailbox>())
            .map_err(|e| MailError::Address {
                address: welcome.email.clone(),
                message: e.to_string(),
            })?;

        let domain = self.from.email.domain().to_string();
        let message_id = format!("<{}@{domain}>", Uuid::new_v4());
        let body = MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(welcome_text(welcome)),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(welcome_html(welcome)),
            );
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(WELCOME_SUBJECT)
            .message_id(Some(message_id.clone()))
            .multipart(body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        Ok(SentMail { message_id })
    }
}

pub fn welcome_text(w: &WelcomeEmail) -> String {
    format!(
        "Bonjour {name},\n\n\
         Bienvenue au CSC de la Faculté des Sciences de Meknès.\n\n\
         Vos informations :\n\
         - Date de naissance : {date}\n\
         - Filière : {filiere}\n\
         - Code Massar : {massar}\n\
         - Code utilisateur : {user_code}\n\n\
         Conservez votre code utilisateur, il vous sera demandé pour accéder à votre espace.\n",
        name = w.name,
        date = w.date_naissance,
        filiere = w.filiere,
        massar = w.code_massar,
        user_code = w.user_code,
    )
}

pub fn welcome_html(w: &WelcomeEmail) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<body style="font-family: Arial, sans-serif; color: #1f2937;">
  <h2>Bonjour {name},</h2>
  <p>Bienvenue au CSC de la Faculté des Sciences de Meknès.</p>
  <table cellpadding="6">
    <tr><td><strong>Date de naissance</strong></td><td>{date}</td></tr>
    <tr><td><strong>Filière</strong></td><td>{filiere}</td></tr>
    <tr><td><strong>Code Massar</strong></td><td>{massar}</td></tr>
    <tr><td><strong>Code utilisateur</strong></td><td>{user_code}</td></tr>
  </table>
  <p>Conservez votre code utilisateur, il vous sera demandé pour accéder à votre espace.</p>
</body>
</html>
"#,
        name = encode_text(&w.name),
        date = encode_text(&w.date_naissance),
        filiere = encode_text(&w.filiere),
        massar = encode_text(&w.code_massar),
        user_code = encode_text(&w.user_code),
    )
}

pub async fn send_welcome_handler(
    State(state): State<AppState>,
    payload: Result<Json<WelcomeEmailRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, GatewayError> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            GatewayError::BadRequest(MISSING_FIELDS_MESSAGE.to_string())
        }
        other => GatewayError::BadRequest(other.body_text()),
    })?;
    let welcome = request.validate()?;

    info!("sending welcome email to {}", welcome.email);
    let sent = match state.mailer.as_deref() {
        Some(mailer) => mailer.send_welcome(&welcome).await,
        None => Err(MailError::NotConfigured),
    };

    match sent {
        Ok(sent) => Ok(Json(json!({
            "success": true,
            "message": "Email sent successfully",
            "messageId": sent.message_id,
        }))),
        Err(err) => {
            error!("error sending welcome email to {}: {err}", welcome.email);
            Err(GatewayError::Mail {
                error: "Failed to send email".to_string(),
                details: err.to_string(),
            })
        }
    }
}

pub async fn email_status_handler(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({
        "success": true,
        "service": "email",
        "configured": state.config.email_configured(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

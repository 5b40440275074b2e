//! Remote tabular store: the Google Sheets v4 REST surface the pipeline needs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

pub const GOOGLE_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/spreadsheets",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned http {status}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("spreadsheet has no sheets")]
    NoSheets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInputOption {
    Raw,
    /// Values are parsed as if typed into the UI.
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::UserEntered => "USER_ENTERED",
        }
    }
}

/// The four spreadsheet operations the record store relies on.
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn sheet_names(&self) -> Result<Vec<String>, StoreError>;

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, StoreError>;

    async fn clear_range(&self, range: &str) -> Result<(), StoreError>;

    /// Returns the number of rows the store reports as written.
    async fn append_rows(
        &self,
        range: &str,
        rows: Vec<Vec<String>>,
        input: ValueInputOption,
    ) -> Result<usize, StoreError>;
}

/// Builds an A1 range, quoting the sheet name when it is not a bare identifier.
pub fn a1_range(sheet: &str, cells: &str) -> String {
    let bare = !sheet.is_empty()
        && sheet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if bare {
        format!("{sheet}!{cells}")
    } else {
        format!("'{}'!{cells}", sheet.replace('\'', "''"))
    }
}

#[derive(Debug, Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub token_url: String,
    pub sheets_base: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            sheets_base: "https://sheets.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
struct AppendUpdates {
    #[serde(rename = "updatedRows", default)]
    updated_rows: usize,
}

/// Sheets client authenticated as a service account (OAuth2 JWT bearer grant).
#[derive(Debug)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    endpoints: GoogleEndpoints,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsClient {
    pub fn new(
        http: reqwest::Client,
        key: ServiceAccountKey,
        spreadsheet_id: impl Into<String>,
        endpoints: GoogleEndpoints,
    ) -> Self {
        Self {
            http,
            key,
            spreadsheet_id: spreadsheet_id.into(),
            endpoints,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.request_token().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = fresh.access_token.clone();
        *cached = Some(CachedToken {
            value: fresh.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn request_token(&self) -> Result<TokenResponse, StoreError> {
        // A malformed key surfaces here as StoreError::Auth, never at construction.
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| StoreError::Auth(format!("invalid private key: {e}")))?;
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: GOOGLE_SCOPES.join(" "),
            aud: &self.endpoints.token_url,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| StoreError::Auth(format!("signing assertion: {e}")))?;

        let endpoint = self.endpoints.token_url.as_str();
        debug!(endpoint, client_email = %self.key.client_email, "requesting access token");
        let resp = self
            .http
            .post(endpoint)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!(
                "token endpoint returned http {}: {}",
                status.as_u16(),
                body
            )));
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|e| StoreError::Decode {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.endpoints.sheets_base).map_err(|e| StoreError::Decode {
            endpoint: self.endpoints.sheets_base.clone(),
            message: format!("invalid base url: {e}"),
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Decode {
                endpoint: self.endpoints.sheets_base.clone(),
                message: "base url cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &Url,
    ) -> Result<T, StoreError> {
        let token = self.access_token().await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>().await.map_err(|e| StoreError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TabularStore for GoogleSheetsClient {
    async fn sheet_names(&self) -> Result<Vec<String>, StoreError> {
        let mut url = self.spreadsheet_url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let meta: SpreadsheetMeta = self.send_json(self.http.get(url.clone()), &url).await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.spreadsheet_url(&["values", range])?;
        let body: ValueRange = self.send_json(self.http.get(url.clone()), &url).await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn clear_range(&self, range: &str) -> Result<(), StoreError> {
        let url = self.spreadsheet_url(&["values", &format!("{range}:clear")])?;
        let _: IgnoredAny = self
            .send_json(self.http.post(url.clone()).json(&serde_json::json!({})), &url)
            .await?;
        Ok(())
    }

    async fn append_rows(
        &self,
        range: &str,
        rows: Vec<Vec<String>>,
        input: ValueInputOption,
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let row_count = rows.len();
        let mut url = self.spreadsheet_url(&["values", &format!("{range}:append")])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", input.as_str());
        let body = serde_json::json!({ "values": rows });
        let resp: AppendResponse = self
            .send_json(self.http.post(url.clone()).json(&body), &url)
            .await?;
        Ok(resp
            .updates
            .map(|u| u.updated_rows)
            .unwrap_or(row_count))
    }
}

fn cell_to_string(cell: JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

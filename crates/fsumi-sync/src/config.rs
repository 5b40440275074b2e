use std::path::PathBuf;
use std::time::Duration;

use fsumi_adapters::{FS_UMI_LISTING_URL, FS_UMI_ORIGIN};
use fsumi_storage::{GoogleEndpoints, ServiceAccountKey};
use thiserror::Error;

pub const ENV_SERVICE_ACCOUNT_EMAIL: &str = "GOOGLE_SERVICE_ACCOUNT_EMAIL";
pub const ENV_PRIVATE_KEY: &str = "GOOGLE_PRIVATE_KEY";
pub const ENV_SPREADSHEET_ID: &str = "GOOGLE_SPREADSHEET_6ID";
pub const ENV_INTERVAL_MINUTES: &str = "SCRAPER_INTERVAL";

pub const REQUIRED_VARS: [&str; 3] = [ENV_SERVICE_ACCOUNT_EMAIL, ENV_PRIVATE_KEY, ENV_SPREADSHEET_ID];

pub const DEFAULT_INTERVAL_MINUTES: u64 = 30;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BACKUP_FILE: &str = "news.json";
pub const DEFAULT_LOG_FILE: &str = "scraper.log";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<&'static str>),
}

/// Immutable scraper settings, built once at startup.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub service_account_email: String,
    pub private_key: String,
    pub spreadsheet_id: String,
    pub interval: Duration,
    pub listing_url: String,
    pub site_origin: String,
    pub pages: u32,
    pub request_delay: Duration,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub default_sheet_name: String,
    pub data_dir: PathBuf,
    pub backup_file: String,
    pub log_file: String,
    pub google: GoogleEndpoints,
}

impl ScraperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = missing_vars(&lookup);
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }
        let required = |key: &str| lookup(key).unwrap_or_default();

        Ok(Self {
            service_account_email: required(ENV_SERVICE_ACCOUNT_EMAIL),
            private_key: required(ENV_PRIVATE_KEY).replace("\\n", "\n"),
            spreadsheet_id: required(ENV_SPREADSHEET_ID),
            interval: parse_interval(lookup(ENV_INTERVAL_MINUTES).as_deref()),
            listing_url: FS_UMI_LISTING_URL.to_string(),
            site_origin: FS_UMI_ORIGIN.to_string(),
            pages: 3,
            request_delay: Duration::from_millis(1000),
            http_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_sheet_name: "Sheet1".to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            backup_file: DEFAULT_BACKUP_FILE.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
            google: GoogleEndpoints::default(),
        })
    }

    pub fn backup_path(&self) -> PathBuf {
        self.data_dir.join(&self.backup_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn service_account_key(&self) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: self.service_account_email.clone(),
            private_key: self.private_key.clone(),
        }
    }

    pub fn interval_minutes(&self) -> u64 {
        self.interval.as_secs() / 60
    }
}

/// Required variables that are unset or empty, in declaration order.
pub fn missing_vars<F>(lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_VARS
        .into_iter()
        .filter(|key| lookup(*key).map_or(true, |v| v.is_empty()))
        .collect()
}

fn parse_interval(raw: Option<&str>) -> Duration {
    let minutes = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|m| *m > 0)
        .unwrap_or(DEFAULT_INTERVAL_MINUTES);
    Duration::from_secs(minutes * 60)
}

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayConfigError {
    #[error("PORT must be a number between 1 and 65535, got {0:?}")]
    InvalidPort(String),
}

/// Gateway settings read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    /// As given in the environment, untrimmed.
    pub api_key: Option<String>,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub yahoo_email: Option<String>,
    pub yahoo_app_password: Option<String>,
    pub app_env: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let port = match present("PORT") {
            None => DEFAULT_PORT,
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or(GatewayConfigError::InvalidPort(raw))?,
        };

        Ok(Self {
            api_key: present("API_KEY"),
            host: present("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            allowed_origins: present("ALLOWED_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
            yahoo_email: present("YAHOO_EMAIL"),
            yahoo_app_password: present("YAHOO_APP_PASSWORD"),
            app_env: present("APP_ENV").unwrap_or_else(|| "development".to_string()),
        })
    }

    /// The key requests are compared against: trimmed, `None` when blank.
    pub fn expected_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn email_configured(&self) -> bool {
        self.yahoo_email.is_some() && self.yahoo_app_password.is_some()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// `abcd...wxyz` for keys longer than 8 characters, otherwise `****`.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

use secrecy::SecretString;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;
pub const MAX_URL_LENGTH: usize = 2048;

pub const ENV_API_URL: &str = "ACTIVITIES_API_URL";
pub const ENV_TIMEOUT_MS: &str = "ACTIVITIES_API_TIMEOUT_MS";
pub const ENV_TOKEN: &str = "ACTIVITIES_API_TOKEN";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("HTTP client could not be built: {0}")]
    Client(String),
}

/// An `http`/`https` URL with a host and no embedded credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid_url(raw, "URL cannot be empty"));
        }
        if trimmed.len() > MAX_URL_LENGTH {
            return Err(invalid_url(
                raw,
                &format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            ));
        }

        let parsed = Url::parse(trimmed).map_err(|e| invalid_url(raw, &e.to_string()))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(invalid_url(
                raw,
                &format!("invalid scheme '{scheme}', only 'http' and 'https' are allowed"),
            ));
        }
        if parsed.host_str().is_none() {
            return Err(invalid_url(raw, "URL must have a host"));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid_url(raw, "credentials in URL are not allowed"));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid_url(raw, "base URL cannot carry a query or fragment"));
        }

        Ok(Self(parsed))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn invalid_url(url: &str, reason: &str) -> ConfigError {
    let url = if url.len() <= 100 {
        url.to_string()
    } else {
        let cut = (0..=100).rev().find(|i| url.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &url[..cut])
    };
    ConfigError::InvalidUrl {
        url,
        reason: reason.to_string(),
    }
}

/// Where the activity API lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// JWT issued by the account endpoints; sent as a bearer token.
    pub token: Option<SecretString>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            token: None,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into()));
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.base_url = url;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(format!("{ENV_TIMEOUT_MS}={raw}")))?;
        }

        if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.trim().is_empty()) {
            config.token = Some(SecretString::new(token));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::parse(&self.base_url)?;
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("timeout cannot be zero".into()));
        }
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidTimeout(format!(
                "timeout exceeds maximum of {MAX_TIMEOUT_MS}ms"
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:5000/api/";
const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/socket";
const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_LOG_FILTER: &str = "smokefree_lib=info";
const SESSION_STORE_FILE: &str = "session.json";

pub const ENV_API_URL: &str = "SMOKEFREE_API_URL";
pub const ENV_SOCKET_URL: &str = "SMOKEFREE_SOCKET_URL";
pub const ENV_TIMEOUT_SECONDS: &str = "SMOKEFREE_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "SMOKEFREE_DATA_DIR";
pub const ENV_LOG: &str = "SMOKEFREE_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid url: {source}")]
    Url {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    Timeout { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub socket_url: Url,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
    pub log_filter: String,
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::Url { name, source })
}

fn env_value(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ClientConfig {
    /// Built-in defaults, before any environment override.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_url(ENV_API_URL, DEFAULT_API_URL)?,
            socket_url: parse_url(ENV_SOCKET_URL, DEFAULT_SOCKET_URL)?,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            data_dir: PathBuf::from("."),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_value)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new()?;

        if let Some(raw) = lookup(ENV_API_URL) {
            config.api_url = Self::normalize_api_url(&raw).map_err(|source| ConfigError::Url {
                name: ENV_API_URL,
                source,
            })?;
        }
        if let Some(raw) = lookup(ENV_SOCKET_URL) {
            config.socket_url = parse_url(ENV_SOCKET_URL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECONDS) {
            let seconds = raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::Timeout {
                    name: ENV_TIMEOUT_SECONDS,
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_secs(seconds);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }

        Ok(config)
    }

    /// Relative paths are joined onto the api url, so it must end with `/`.
    pub fn normalize_api_url(raw: &str) -> Result<Url, url::ParseError> {
        let raw = raw.trim();
        if raw.ends_with('/') {
            Url::parse(raw)
        } else {
            Url::parse(&format!("{raw}/"))
        }
    }

    pub fn with_api_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_url = Self::normalize_api_url(raw).map_err(|source| ConfigError::Url {
            name: ENV_API_URL,
            source,
        })?;
        Ok(self)
    }

    pub fn session_store_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_STORE_FILE)
    }
}

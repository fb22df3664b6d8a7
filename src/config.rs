use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_ENDPOINT: &str = "/api/chat";
const DEFAULT_MODEL: &str = "deepseek-r1";
const DEFAULT_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_MODELS_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_ENVIRONMENT: &str = "production";
const TAGS_PATH: &str = "/api/tags";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid backend base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Optional values read from `gateway.toml`. Environment variables take precedence.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub default_model: Option<String>,
    pub timeout_ms: Option<u64>,
    pub models_timeout_ms: Option<u64>,
    pub api_key: Option<String>,
    pub environment: Option<String>,
    pub cancel_on_disconnect: Option<bool>,
}

/// Where and how the inference backend is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub endpoint: String,
    pub default_model: String,
    /// Bound on a single chat call. Inference is slow, so this is minutes, not seconds.
    pub timeout: Duration,
    pub models_timeout: Duration,
}

impl UpstreamConfig {
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint)
    }

    pub fn tags_url(&self) -> String {
        format!("{}{}", self.base_url, TAGS_PATH)
    }
}

/// Process-wide settings, resolved once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub upstream: UpstreamConfig,
    /// Shared secret clients must present. `None` rejects every credential.
    pub api_key: Option<String>,
    pub environment: String,
    /// Abort the backend call when the inbound client goes away.
    pub cancel_on_disconnect: bool,
}

impl GatewayConfig {
    /// Loads the optional TOML file and layers the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = read_file_config(path)?;
        Self::resolve(file, |key| env::var(key).ok())
    }

    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST")
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_var(&lookup, "PORT")?
            .or(file.port)
            .unwrap_or(DEFAULT_PORT);
        let base_url = lookup("BASE_URL")
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let endpoint = lookup("ENDPOINT")
            .or(file.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let default_model = lookup("DEFAULT_MODEL")
            .or(file.default_model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // A zero timeout would fail every call at once; treat it as unset.
        let timeout_ms = parse_var(&lookup, "OLLAMA_TIMEOUT")?
            .or(file.timeout_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let models_timeout_ms = parse_var(&lookup, "MODELS_TIMEOUT")?
            .or(file.models_timeout_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_MODELS_TIMEOUT_MS);
        let api_key = lookup("API_KEY")
            .or(file.api_key)
            .filter(|key| !key.is_empty());
        let environment = lookup("NODE_ENV")
            .or(file.environment)
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let cancel_on_disconnect = match lookup("CANCEL_ON_DISCONNECT") {
            Some(raw) => parse_bool("CANCEL_ON_DISCONNECT", &raw)?,
            None => file.cancel_on_disconnect.unwrap_or(false),
        };

        Ok(GatewayConfig {
            host,
            port,
            upstream: UpstreamConfig {
                base_url: normalize_base_url(&base_url)?,
                endpoint: normalize_endpoint(&endpoint),
                default_model,
                timeout: Duration::from_millis(timeout_ms),
                models_timeout: Duration::from_millis(models_timeout_ms),
            },
            api_key,
            environment,
            cancel_on_disconnect,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// File form of the effective settings with the secret masked.
    pub fn redacted(&self) -> FileConfig {
        FileConfig {
            host: Some(self.host.clone()),
            port: Some(self.port),
            base_url: Some(self.upstream.base_url.clone()),
            endpoint: Some(self.upstream.endpoint.clone()),
            default_model: Some(self.upstream.default_model.clone()),
            timeout_ms: Some(self.upstream.timeout.as_millis() as u64),
            models_timeout_ms: Some(self.upstream.models_timeout.as_millis() as u64),
            api_key: self.api_key.as_ref().map(|_| "********".to_string()),
            environment: Some(self.environment.clone()),
            cancel_on_disconnect: Some(self.cancel_on_disconnect),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("ollama-gateway").join("gateway.toml"))
}

/// An explicit path must exist; the default location is only read when present.
fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|source| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })?;
    Ok(trimmed.to_string())
}

fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

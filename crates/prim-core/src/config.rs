use std::env;
use url::Url;

use crate::feedback::{FeedbackChannel, DEFAULT_FEEDBACK_URL};
use crate::pipeline::AllowlistDenial;

const DEFAULT_SERVICE_NAME: &str = "prim";
const DEFAULT_PORT: u16 = 4030;
const DEFAULT_DB_PATH: &str = "./allowlist.db";

#[derive(Clone)]
pub struct PrimConfig {
    /// Service name reported by /health
    pub service_name: String,
    /// Server port
    pub port: u16,
    /// Feedback URL stamped on every response
    pub feedback_url: String,
    /// SQLite allowlist path
    pub allowlist_db_path: String,
    /// Whether gated routes check the allowlist
    pub allowlist_enabled: bool,
    /// Status for verified callers missing from the allowlist
    pub allowlist_denial: AllowlistDenial,
    /// Bearer token for the admin allowlist routes (None = routes answer 501)
    pub admin_token: Option<String>,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for PrimConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimConfig")
            .field("service_name", &self.service_name)
            .field("port", &self.port)
            .field("feedback_url", &self.feedback_url)
            .field("allowlist_db_path", &self.allowlist_db_path)
            .field("allowlist_enabled", &self.allowlist_enabled)
            .field("allowlist_denial", &self.allowlist_denial)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field("allowed_origins", &self.allowed_origins)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for PrimConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            port: DEFAULT_PORT,
            feedback_url: DEFAULT_FEEDBACK_URL.to_string(),
            allowlist_db_path: DEFAULT_DB_PATH.to_string(),
            allowlist_enabled: true,
            allowlist_denial: AllowlistDenial::default(),
            admin_token: None,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            metrics_token: None,
        }
    }
}

impl PrimConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let service_name = var("PRIM_SERVICE").unwrap_or(defaults.service_name);

        let port = match var("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue("PORT", s))?,
            None => defaults.port,
        };

        // The URL goes out verbatim in a header, so it must be both a URL and a header value
        let feedback_url = var("FEEDBACK_URL").unwrap_or(defaults.feedback_url);
        Url::parse(&feedback_url).map_err(|_| ConfigError::InvalidUrl(feedback_url.clone()))?;
        FeedbackChannel::new(&feedback_url)
            .map_err(|_| ConfigError::InvalidUrl(feedback_url.clone()))?;

        let allowlist_db_path = var("ALLOWLIST_DB_PATH").unwrap_or(defaults.allowlist_db_path);

        let allowlist_enabled = match var("ALLOWLIST_ENABLED") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue("ALLOWLIST_ENABLED", v))?,
            None => defaults.allowlist_enabled,
        };

        let allowlist_denial = match var("ALLOWLIST_DENIAL") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ALLOWLIST_DENIAL", v))?,
            None => defaults.allowlist_denial,
        };

        let admin_token = var("ADMIN_TOKEN");
        if let Some(ref token) = admin_token {
            if token.len() < 32 {
                tracing::warn!(
                    "ADMIN_TOKEN is short ({} bytes); use `openssl rand -hex 32` to generate one",
                    token.len()
                );
            }
        } else {
            tracing::warn!("ADMIN_TOKEN not set; admin allowlist routes will answer 501");
        }

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        let metrics_token = var("METRICS_TOKEN");
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set; /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            service_name,
            port,
            feedback_url,
            allowlist_db_path,
            allowlist_enabled,
            allowlist_denial,
            admin_token,
            allowed_origins,
            metrics_token,
        })
    }

    pub fn feedback_channel(&self) -> Result<FeedbackChannel, ConfigError> {
        FeedbackChannel::new(&self.feedback_url)
            .map_err(|_| ConfigError::InvalidUrl(self.feedback_url.clone()))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

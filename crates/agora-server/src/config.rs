//! Server configuration, read from `AGORA_*` environment variables (a `.env`
//! file is loaded first when present).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use agora_gateway::{AnonymousPolicy, GatewayConfig};

/// Secrets that ship in examples and must never reach a running server.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "change-me",
    "changeme",
    "secret",
    "your-secret-here",
];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("AGORA_JWT_SECRET is a placeholder value; set a real secret")]
    PlaceholderSecret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys fall back to defaults,
    /// except the JWT secret, which is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &'static str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("AGORA_JWT_SECRET")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("AGORA_JWT_SECRET"))?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::PlaceholderSecret);
        }

        let token_ttl_days: i64 = parse("AGORA_TOKEN_TTL_DAYS", var("AGORA_TOKEN_TTL_DAYS", "7"))?;
        if token_ttl_days <= 0 {
            return Err(invalid("AGORA_TOKEN_TTL_DAYS", token_ttl_days.to_string(), "must be positive"));
        }

        let max_content_len: usize = parse("AGORA_MAX_MESSAGE_LEN", var("AGORA_MAX_MESSAGE_LEN", "2000"))?;
        if max_content_len == 0 {
            return Err(invalid("AGORA_MAX_MESSAGE_LEN", "0".into(), "must be positive"));
        }

        let heartbeat_secs: u64 = parse("AGORA_HEARTBEAT_SECS", var("AGORA_HEARTBEAT_SECS", "15"))?;
        if heartbeat_secs == 0 {
            return Err(invalid("AGORA_HEARTBEAT_SECS", "0".into(), "must be positive"));
        }

        let policy_raw = var("AGORA_ANONYMOUS_POLICY", "allow");
        let anonymous_policy = policy_raw
            .parse::<AnonymousPolicy>()
            .map_err(|reason| invalid("AGORA_ANONYMOUS_POLICY", policy_raw.clone(), &reason))?;

        Ok(Self {
            host: var("AGORA_HOST", "0.0.0.0"),
            port: parse("AGORA_PORT", var("AGORA_PORT", "3001"))?,
            db_path: PathBuf::from(var("AGORA_DB_PATH", "agora.db")),
            jwt_secret,
            token_ttl_days,
            gateway: GatewayConfig {
                max_content_len,
                anonymous_policy,
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse()
            .map_err(|e: std::net::AddrParseError| invalid("AGORA_HOST", self.host.clone(), &e.to_string()))
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value.clone(), &e.to_string()))
}

fn invalid(key: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value,
        reason: reason.to_string(),
    }
}

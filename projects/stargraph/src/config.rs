use std::time::Duration;

use interfaces_github_stargazers::GITHUB_API_URL;
use thiserror::Error;

use crate::aggregator::DEFAULT_PAGE_SIZE;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_WORKERS: usize = 8;
/// Queue slots per worker when no capacity is configured.
const DEFAULT_QUEUE_SLOTS_PER_WORKER: usize = 64;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";
const GITHUB_ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// OAuth application credentials used by the callback endpoint.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token_url: String,
}

// Keeps the secret out of logs.
impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("access_token_url", &self.access_token_url)
            .finish_non_exhaustive()
    }
}

/// Service settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub log_level: String,
    pub github_api_url: String,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("MissingVariable: {name} is not set")]
    MissingVariable { name: &'static str },

    #[error("InvalidVariable: {name}={value:?}: {reason}")]
    InvalidVariable {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    /// Reads the process environment after loading `.env`, if present.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        // A missing .env file is normal outside development.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigLoadError> {
        let worker_count = parse_or(&lookup, "STARGRAPH_WORKERS", DEFAULT_WORKERS)?;
        if worker_count == 0 {
            return Err(invalid("STARGRAPH_WORKERS", "0", "must be at least 1"));
        }

        let queue_capacity = parse_or(
            &lookup,
            "STARGRAPH_QUEUE_CAPACITY",
            worker_count.saturating_mul(DEFAULT_QUEUE_SLOTS_PER_WORKER),
        )?;
        if queue_capacity == 0 {
            return Err(invalid("STARGRAPH_QUEUE_CAPACITY", "0", "must be at least 1"));
        }

        let page_size = parse_or(&lookup, "STARGRAPH_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if !(1..=DEFAULT_PAGE_SIZE).contains(&page_size) {
            return Err(invalid(
                "STARGRAPH_PAGE_SIZE",
                &page_size.to_string(),
                "must be between 1 and 100",
            ));
        }

        let timeout_secs = parse_or(
            &lookup,
            "STARGRAPH_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(invalid(
                "STARGRAPH_REQUEST_TIMEOUT_SECS",
                "0",
                "must be at least 1",
            ));
        }

        Ok(Self {
            host: lookup("STARGRAPH_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_or(&lookup, "STARGRAPH_PORT", DEFAULT_PORT)?,
            worker_count,
            queue_capacity,
            page_size,
            request_timeout: Duration::from_secs(timeout_secs),
            log_level: lookup("STARGRAPH_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
            github_api_url: lookup("GITHUB_API_URL").unwrap_or_else(|| GITHUB_API_URL.to_owned()),
            oauth: OAuthConfig {
                client_id: required(&lookup, "GITHUB_CLIENT_ID")?,
                client_secret: required(&lookup, "GITHUB_CLIENT_SECRET")?,
                access_token_url: lookup("GITHUB_ACCESS_TOKEN_URL")
                    .unwrap_or_else(|| GITHUB_ACCESS_TOKEN_URL.to_owned()),
            },
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigLoadError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigLoadError::MissingVariable { name })
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigLoadError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err: T::Err| invalid(name, &value, &err.to_string())),
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigLoadError {
    ConfigLoadError::InvalidVariable {
        name,
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

//! RelayConfig - 環境変数からの設定読み込み
//!
//! 読み込みは `from_lookup` に閉じ込めてあるので、テストはプロセスの環境変数を
//! 触らずにクロージャで値を渡せます。

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::queue::RetryPolicy;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_HISTORY_CAP: usize = 21;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 1.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Durable records and decoded uploads live here.
    pub upload_dir: PathBuf,
    pub pool_size: usize,
    /// How many finished tasks `get_tasks` shows.
    pub history_cap: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub event_capacity: usize,
    pub subscriber_capacity: usize,
    /// 0 = do not wait for in-flight workers on shutdown.
    pub shutdown_grace: Duration,
    /// Relative endpoints are joined onto this.
    pub downstream_base_url: Option<Url>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            pool_size: DEFAULT_POOL_SIZE,
            history_cap: DEFAULT_HISTORY_CAP,
            retry: RetryPolicy::exponential(
                Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
                DEFAULT_RETRY_MULTIPLIER,
            ),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            downstream_base_url: None,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset (or blank) variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let upload_dir = get("RELAY_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);
        let pool_size = parse_or(&get, "RELAY_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        let history_cap = parse_or(&get, "RELAY_HISTORY_CAP", DEFAULT_HISTORY_CAP)?;
        let retry_delay = parse_or(&get, "RELAY_RETRY_DELAY_SECS", DEFAULT_RETRY_DELAY_SECS)?;
        let multiplier: f64 = parse_or(&get, "RELAY_RETRY_MULTIPLIER", DEFAULT_RETRY_MULTIPLIER)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "RELAY_RETRY_MULTIPLIER",
                value: multiplier.to_string(),
                reason: "must be a finite number >= 1.0".into(),
            });
        }
        let request_timeout = parse_or(
            &get,
            "RELAY_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let event_capacity = parse_or(&get, "RELAY_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?;
        let subscriber_capacity = parse_or(
            &get,
            "RELAY_SUBSCRIBER_CAPACITY",
            DEFAULT_SUBSCRIBER_CAPACITY,
        )?;
        let shutdown_grace = parse_or(
            &get,
            "RELAY_SHUTDOWN_GRACE_SECS",
            DEFAULT_SHUTDOWN_GRACE_SECS,
        )?;
        let downstream_base_url = match get("RELAY_DOWNSTREAM_BASE_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                key: "RELAY_DOWNSTREAM_BASE_URL",
                value: raw.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            upload_dir,
            pool_size,
            history_cap,
            retry: RetryPolicy::exponential(Duration::from_secs(retry_delay), multiplier),
            request_timeout: Duration::from_secs(request_timeout),
            event_capacity,
            subscriber_capacity,
            shutdown_grace: Duration::from_secs(shutdown_grace),
            downstream_base_url,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

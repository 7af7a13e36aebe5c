use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Listener configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: IpAddr,
    /// Bind port (default: `5000`).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// | Env Var | Default     |
    /// |---------|-------------|
    /// | `HOST`  | `127.0.0.1` |
    /// | `PORT`  | `5000`      |
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let host = match lookup("HOST") {
            Some(raw) => raw.trim().parse().map_err(|_| ServerConfigError::Invalid {
                key: "HOST",
                value: raw,
            })?,
            None => defaults.host,
        };
        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ServerConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => defaults.port,
        };
        Ok(Self { host, port })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

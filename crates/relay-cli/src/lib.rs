//! relay-cli
//!
//! HTTP and websocket adapters around `relay_core::Relay`.
//!
//! - `POST /forward/{*endpoint}`: admit a `{method, params}` body
//! - `GET /ws`: push channel (task updates, task list, ping)

pub mod config;
pub mod http;
pub mod ws;

pub use http::{AppState, router};

//! Errors - ドメインエラーと分類
//!
//! - ValidationError: ingress で弾く（タスクは作られない、リトライしない）
//! - TransportError: downstream 呼び出しの失敗（固定ディレイで無制限リトライ）
//! - StateError: 状態遷移の不正

use thiserror::Error;

use super::state::TaskStatus;

/// Malformed admission payload. Surfaced to the caller as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No data provided.")]
    NoData,

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameters for {0}.")]
    InvalidParams(&'static str),

    #[error("Invalid base64 content: {0}")]
    InvalidBase64(String),

    #[error("Endpoint must not be empty.")]
    EmptyEndpoint,
}

/// Anything that went wrong between "start the call" and "have a result field".
///
/// Always retried; never a terminal failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("cannot resolve endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("malformed downstream response: {0}")]
    MalformedResponse(String),

    #[error("cannot load payload {path}: {message}")]
    Payload { path: String, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: TaskStatus, to: TaskStatus },
}

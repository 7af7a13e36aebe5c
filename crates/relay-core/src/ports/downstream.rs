//! Downstream port - JSON-RPC を受ける外部サービス

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{RpcRequest, TransportError};

/// Issues exactly one call per invocation and returns the raw response body.
///
/// Interpreting `result` is the worker's job; anything that prevents getting
/// a JSON body at all is a `TransportError`.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, endpoint: &str, request: &RpcRequest) -> Result<Value, TransportError>;
}

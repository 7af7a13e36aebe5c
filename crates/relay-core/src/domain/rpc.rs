//! JSON-RPC envelope sent to the downstream endpoint.

use serde::Serialize;
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: &'static str,
    pub params: Vec<Value>,
    pub jsonrpc: &'static str,
    pub id: u64,
}

impl RpcRequest {
    fn new(method: &'static str, params: Vec<Value>) -> Self {
        Self {
            method,
            params,
            jsonrpc: JSONRPC_VERSION,
            id: 0,
        }
    }

    pub fn post_gif(url: &str) -> Self {
        Self::new("post_gif", vec![json!(url)])
    }

    /// `is_base64 = false`: `content` is a URL. `true`: base64 image bytes.
    pub fn post_photo(content: &str, is_base64: bool) -> Self {
        Self::new("post_photo", vec![json!(content), json!(is_base64)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_by_url_envelope() {
        let v = serde_json::to_value(RpcRequest::post_photo("http://x/img.jpg", false)).unwrap();
        assert_eq!(
            v,
            json!({"method": "post_photo", "params": ["http://x/img.jpg", false], "jsonrpc": "2.0", "id": 0})
        );
    }

    #[test]
    fn gif_envelope_has_single_param() {
        let v = serde_json::to_value(RpcRequest::post_gif("http://x/a.gif")).unwrap();
        assert_eq!(v["method"], "post_gif");
        assert_eq!(v["params"], json!(["http://x/a.gif"]));
    }
}

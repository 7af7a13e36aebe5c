//! HttpDownstream - reqwest で JSON-RPC を POST する
//!
//! endpoint の解決:
//! - 絶対 URL ならそのまま使う
//! - 相対なら `base_url` に join する（先頭の `/` は落として base のパスを残す）

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::domain::{RpcRequest, TransportError};
use crate::ports::Downstream;

pub struct HttpDownstream {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpDownstream {
    /// `timeout` bounds the whole call (connect + response body).
    pub fn new(timeout: Duration, base_url: Option<Url>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.map(as_directory),
        })
    }

    pub fn resolve(&self, endpoint: &str) -> Result<Url, TransportError> {
        match Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
            Ok(_) => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .base_url
                    .as_ref()
                    .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;
                base.join(endpoint.trim_start_matches('/'))
                    .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))
            }
            Err(_) => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
        }
    }

    fn map_error(endpoint: &Url, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            TransportError::Request {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// `join` replaces the last segment unless the path ends in `/`.
fn as_directory(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(&self, endpoint: &str, request: &RpcRequest) -> Result<Value, TransportError> {
        let url = self.resolve(endpoint)?;
        tracing::debug!(%url, method = request.method, "calling downstream");

        // HTTP status は見ない: body の result だけで判定する
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_error(&url, e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(&url, e))?;

        serde_json::from_slice(&body)
            .map_err(|e| TransportError::MalformedResponse(format!("non-JSON body from {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downstream(base: Option<&str>) -> HttpDownstream {
        HttpDownstream::new(
            Duration::from_secs(5),
            base.map(|b| Url::parse(b).unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_the_rpc_envelope_and_returns_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot1"))
            .and(body_json(json!({
                "method": "post_photo",
                "params": ["http://x/img.jpg", false],
                "jsonrpc": "2.0",
                "id": 0,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = downstream(Some(&server.uri()));
        let body = client
            .call("/bot1", &RpcRequest::post_photo("http://x/img.jpg", false))
            .await
            .unwrap();
        assert_eq!(body, json!({"result": true}));
    }

    #[tokio::test]
    async fn absolute_endpoint_ignores_base() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "duplicate"})))
            .mount(&server)
            .await;

        let client = downstream(Some("http://unused.invalid/"));
        let body = client
            .call(&format!("{}/rpc", server.uri()), &RpcRequest::post_gif("http://x/a.gif"))
            .await
            .unwrap();
        assert_eq!(body["result"], "duplicate");
    }

    #[tokio::test]
    async fn error_status_with_json_body_is_still_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"result": false})))
            .mount(&server)
            .await;

        let body = downstream(Some(&server.uri()))
            .call("bot", &RpcRequest::post_gif("u"))
            .await
            .unwrap();
        assert_eq!(body["result"], false);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = downstream(Some(&server.uri()))
            .call("bot", &RpcRequest::post_gif("u"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn slow_downstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = HttpDownstream::new(
            Duration::from_millis(100),
            Some(Url::parse(&server.uri()).unwrap()),
        )
        .unwrap();
        let err = client.call("bot", &RpcRequest::post_gif("u")).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[test]
    fn relative_endpoint_keeps_base_path() {
        let client = downstream(Some("http://bots.local/api/"));
        assert_eq!(
            client.resolve("/bot1").unwrap().as_str(),
            "http://bots.local/api/bot1"
        );
    }

    #[test]
    fn base_without_trailing_slash_keeps_its_last_segment() {
        let client = downstream(Some("http://bots.local/api"));
        assert_eq!(
            client.resolve("/bot1").unwrap().as_str(),
            "http://bots.local/api/bot1"
        );
        assert_eq!(
            client.resolve("group/bot2").unwrap().as_str(),
            "http://bots.local/api/group/bot2"
        );
    }

    #[test]
    fn relative_endpoint_without_base_is_rejected() {
        let client = downstream(None);
        assert!(matches!(
            client.resolve("bot1"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            client.resolve("ftp://host/x"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }
}

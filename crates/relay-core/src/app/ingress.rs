//! Ingress - `{method, params}` の検証
//!
//! ここで弾かれたリクエストはタスクになりません（id も振られない）。
//!
//! - `post_gif`: `params[0]` が文字列
//! - `post_photo`: ちょうど `[string, bool]`。bool が true なら string は base64

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;

use crate::domain::ValidationError;

const POST_GIF: &str = "post_gif";
const POST_PHOTO: &str = "post_photo";

/// Standard alphabet; padding optional.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A validated forward request, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Gif { url: String },
    PhotoUrl { url: String },
    /// Decoded upload; written to the artifact store on admission.
    PhotoBytes { bytes: Vec<u8> },
}

impl Submission {
    pub fn parse(body: &Value) -> Result<Self, ValidationError> {
        let object = match body.as_object() {
            Some(object) if !object.is_empty() => object,
            _ => return Err(ValidationError::NoData),
        };

        let method = object.get("method").unwrap_or(&Value::Null);
        let params = object.get("params").unwrap_or(&Value::Null);
        match method.as_str() {
            Some(POST_GIF) => parse_gif(params),
            Some(POST_PHOTO) => parse_photo(params),
            Some(other) => Err(ValidationError::UnknownMethod(other.to_string())),
            None => Err(ValidationError::UnknownMethod(method.to_string())),
        }
    }

    /// Parse raw request bytes. An empty or non-JSON body is "no data".
    pub fn parse_slice(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::NoData);
        }
        let value: Value = serde_json::from_slice(body).map_err(|_| ValidationError::NoData)?;
        Self::parse(&value)
    }
}

fn parse_gif(params: &Value) -> Result<Submission, ValidationError> {
    match params.as_array().and_then(|p| p.first()).and_then(Value::as_str) {
        Some(url) => Ok(Submission::Gif {
            url: url.to_string(),
        }),
        None => Err(ValidationError::InvalidParams(POST_GIF)),
    }
}

fn parse_photo(params: &Value) -> Result<Submission, ValidationError> {
    let (content, is_base64) = match params.as_array().map(Vec::as_slice) {
        Some([content, flag]) => match (content.as_str(), flag.as_bool()) {
            (Some(content), Some(flag)) => (content, flag),
            _ => return Err(ValidationError::InvalidParams(POST_PHOTO)),
        },
        _ => return Err(ValidationError::InvalidParams(POST_PHOTO)),
    };

    if !is_base64 {
        return Ok(Submission::PhotoUrl {
            url: content.to_string(),
        });
    }

    // 改行入りの base64 もそのまま受ける
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_STANDARD
        .decode(compact.as_bytes())
        .map(|bytes| Submission::PhotoBytes { bytes })
        .map_err(|e| ValidationError::InvalidBase64(e.to_string()))
}

/// Reject an endpoint that cannot name a downstream at all.
pub fn validate_endpoint(endpoint: &str) -> Result<&str, ValidationError> {
    let trimmed = endpoint.trim();
    if trimmed.trim_matches('/').is_empty() {
        return Err(ValidationError::EmptyEndpoint);
    }
    Ok(trimmed)
}

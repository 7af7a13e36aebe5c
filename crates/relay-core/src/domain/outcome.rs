//! Outcome model: how a downstream answer maps onto a task status.

use serde_json::Value;

use super::errors::TransportError;
use super::state::TaskStatus;

/// The three recognized shapes of the downstream `result` field.
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamResult {
    /// `result: true`
    Accepted,
    /// `result: "duplicate"`
    Duplicate,
    /// Anything else. Kept for logging.
    Unrecognized(Value),
}

impl DownstreamResult {
    /// Interpret a full JSON-RPC response body.
    ///
    /// No `result` key (or a non-object body) is a processing error, which the
    /// worker retries like a transport failure.
    pub fn from_response(response: &Value) -> Result<Self, TransportError> {
        let result = response
            .as_object()
            .and_then(|obj| obj.get("result"))
            .ok_or_else(|| TransportError::MalformedResponse(format!("no result field in {response}")))?;
        Ok(Self::from_result(result))
    }

    pub fn from_result(result: &Value) -> Self {
        match result {
            Value::Bool(true) => DownstreamResult::Accepted,
            Value::String(s) if s == "duplicate" => DownstreamResult::Duplicate,
            other => DownstreamResult::Unrecognized(other.clone()),
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            DownstreamResult::Accepted => TaskStatus::Completed,
            DownstreamResult::Duplicate => TaskStatus::Duplicate,
            DownstreamResult::Unrecognized(_) => TaskStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::accepted(json!({"result": true}), TaskStatus::Completed)]
    #[case::duplicate(json!({"result": "duplicate"}), TaskStatus::Duplicate)]
    #[case::false_is_failure(json!({"result": false}), TaskStatus::Failed)]
    #[case::other_string(json!({"result": "Duplicate"}), TaskStatus::Failed)]
    #[case::null(json!({"result": null}), TaskStatus::Failed)]
    #[case::error_object(json!({"result": {"error": "boom"}}), TaskStatus::Failed)]
    fn result_maps_to_status(#[case] body: Value, #[case] expected: TaskStatus) {
        let result = DownstreamResult::from_response(&body).unwrap();
        assert_eq!(result.status(), expected);
    }

    #[rstest]
    #[case::no_result(json!({"error": {"code": -32601}}))]
    #[case::not_an_object(json!([true]))]
    #[case::bare_true(json!(true))]
    fn missing_result_is_a_processing_error(#[case] body: Value) {
        let err = DownstreamResult::from_response(&body).unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)));
    }

    #[test]
    fn unrecognized_keeps_the_value() {
        let r = DownstreamResult::from_result(&json!(42));
        assert_eq!(r, DownstreamResult::Unrecognized(json!(42)));
    }
}

//! HTTP ingress: `POST /forward/{*endpoint}` plus the router.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use relay_core::{Relay, RelayError};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/forward/{*endpoint}", post(forward))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error answered to the submitter as `{status: "error", message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Relay(RelayError::Validation(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Relay(other) => {
                tracing::error!(error = %other, "cannot admit task");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Task could not be stored.".to_string(),
                )
            }
        };
        (status, Json(json!({"status": "error", "message": message}))).into_response()
    }
}

async fn forward(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let id = state.relay.admit_body(&endpoint, &body).await?;
    Ok(Json(json!({
        "status": "queued",
        "id": id,
        "endpoint": endpoint,
        "result": true,
    })))
}

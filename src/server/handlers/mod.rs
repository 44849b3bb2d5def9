// src/server/handlers/mod.rs
//! HTTP request handlers for the registry server

pub mod packages;
pub mod tarballs;

use crate::auth::{self, Action};
use crate::error::RegistryError;
use crate::publish::PublishOutcome;
use crate::server::ServerState;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Registry error: {}", self);
        } else {
            tracing::debug!("Registry error: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared success envelope; `id` is set on publish responses
pub(crate) fn success(outcome: &PublishOutcome, id: Option<&str>) -> Response {
    let status = StatusCode::from_u16(outcome.http_status).unwrap_or(StatusCode::CREATED);
    let mut body = serde_json::json!({ "ok": outcome.message, "success": true });
    if let Some(id) = id
        && let Some(map) = body.as_object_mut()
    {
        map.insert(
            "id".to_string(),
            serde_json::Value::String(id.to_string()),
        );
    }
    (status, Json(body)).into_response()
}

/// Run the access gate; `Some(response)` means the request was denied
pub(crate) fn check_access(
    state: &ServerState,
    headers: &HeaderMap,
    package: &str,
    action: Action,
) -> Option<Response> {
    let token = auth::bearer_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );

    if state.gate.allows(token, package, action) {
        return None;
    }

    tracing::warn!("Denied {} of {}", action.as_str(), package);
    Some(
        (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": format!("must supply a valid token to {}", action.as_str())
            })),
        )
            .into_response(),
    )
}

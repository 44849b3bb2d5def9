// src/server/handlers/packages.rs
//! Manifest publish, package removal, and add-version endpoints
//!
//! These are thin adapters: gate the request, hand the raw body to the
//! publisher, and wrap the outcome in the response envelope. All flow
//! decisions live in `publish::Publisher`.

use crate::auth::Action;
use crate::server::handlers::{check_access, success};
use crate::server::ServerState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// PUT /:package
///
/// Publish a package manifest, optionally carrying an inline base64
/// tarball attachment.
pub async fn publish(
    State(state): State<Arc<ServerState>>,
    Path(package): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_access(&state, &headers, &package, Action::Publish) {
        return denied;
    }

    match state.publisher.publish(&package, &body, None).await {
        Ok(outcome) => success(&outcome, Some(&package)),
        Err(e) => e.into_response(),
    }
}

/// PUT /:package/-rev/:revision
///
/// Publish an update against a known package revision.
pub async fn publish_with_revision(
    State(state): State<Arc<ServerState>>,
    Path((package, revision)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_access(&state, &headers, &package, Action::Publish) {
        return denied;
    }

    match state
        .publisher
        .publish(&package, &body, Some(&revision))
        .await
    {
        Ok(outcome) => success(&outcome, Some(&package)),
        Err(e) => e.into_response(),
    }
}

/// DELETE /:package/-rev/:revision
///
/// Remove an entire package record. The revision is part of the route
/// clients send but removal applies to the whole package.
pub async fn remove_package(
    State(state): State<Arc<ServerState>>,
    Path((package, _revision)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = check_access(&state, &headers, &package, Action::Unpublish) {
        return denied;
    }

    match state.publisher.remove_package(&package).await {
        Ok(outcome) => success(&outcome, None),
        Err(e) => e.into_response(),
    }
}

/// PUT /:package/:version/-tag/:tag
///
/// Record a single version from a bare version-record body and point the
/// tag at it, without a full manifest round-trip.
pub async fn add_version(
    State(state): State<Arc<ServerState>>,
    Path((package, version, tag)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_access(&state, &headers, &package, Action::Tag) {
        return denied;
    }

    match state
        .publisher
        .add_version_with_tag(&package, &version, &body, &tag)
        .await
    {
        Ok(outcome) => success(&outcome, Some(&package)),
        Err(e) => e.into_response(),
    }
}

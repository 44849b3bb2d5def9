// src/server/handlers/tarballs.rs
//! Direct tarball upload and removal endpoints
//!
//! Uploads stream the request body straight into the backend sink frame
//! by frame; nothing is buffered. A client that disconnects mid-upload
//! produces an error frame on the stream, which the ingest layer turns
//! into an abort of the partial write.

use crate::auth::Action;
use crate::server::handlers::{check_access, success};
use crate::server::ServerState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// PUT /:package/-/:filename
pub async fn upload(
    State(state): State<Arc<ServerState>>,
    Path((package, filename)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    store(state, package, filename, headers, body).await
}

/// PUT /:package/-/:filename/-rev/:revision
///
/// Some clients append the revision tail on upload; the bytes land the
/// same way.
pub async fn upload_with_revision(
    State(state): State<Arc<ServerState>>,
    Path((package, filename, _revision)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    store(state, package, filename, headers, body).await
}

async fn store(
    state: Arc<ServerState>,
    package: String,
    filename: String,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if let Some(denied) = check_access(&state, &headers, &package, Action::Upload) {
        return denied;
    }

    let stream = body.into_data_stream();
    match state
        .publisher
        .upload_tarball(&package, &filename, stream)
        .await
    {
        Ok(outcome) => success(&outcome, None),
        Err(e) => e.into_response(),
    }
}

/// DELETE /:package/-/:filename/-rev/:revision
pub async fn remove(
    State(state): State<Arc<ServerState>>,
    Path((package, filename, revision)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = check_access(&state, &headers, &package, Action::Unpublish) {
        return denied;
    }

    match state
        .publisher
        .remove_tarball(&package, &filename, &revision)
        .await
    {
        Ok(outcome) => success(&outcome, None),
        Err(e) => e.into_response(),
    }
}

// src/server/routes.rs
//! Axum router configuration for the registry server
//!
//! The route set mirrors what npm-compatible clients actually send. The
//! optional URL segments those clients use are spelled out as their
//! concrete forms, so each route below is one shape a client request can
//! take:
//! - publish with and without a `-rev/:revision` tail
//! - tarball upload with and without a `-rev/:revision` tail

use crate::server::handlers::{packages, tarballs};
use crate::server::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    // CORS configuration - permissive, npm clients send no credentials
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_body = state.config.max_body_bytes;

    Router::new()
        // Liveness check
        .route("/-/ping", get(ping))
        // Manifest publish (optionally carrying an inline tarball)
        .route("/:package", put(packages::publish))
        .route(
            "/:package/-rev/:revision",
            put(packages::publish_with_revision).delete(packages::remove_package),
        )
        // Direct tarball upload and removal
        .route("/:package/-/:filename", put(tarballs::upload))
        .route(
            "/:package/-/:filename/-rev/:revision",
            put(tarballs::upload_with_revision).delete(tarballs::remove),
        )
        // Add a version and point a tag at it
        .route("/:package/:version/-tag/:tag", put(packages::add_version))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

/// Liveness check endpoint, npm ping expects an empty JSON object
async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions for the read API.

use super::handlers;
use crate::context::AppContext;
use axum::{routing::get, Router};

/// Read API routes
pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(handlers::health))
        .route("/api/raw/latest", get(handlers::raw_latest))
        .route("/api/avg/latest", get(handlers::avg_latest))
        .route("/api/security/latest", get(handlers::security_latest))
        .route("/api/commands/latest", get(handlers::commands_latest))
}

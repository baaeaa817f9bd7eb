// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read API
//!
//! # Endpoints
//!
//! - `GET /` - Liveness (`{"status":"ok"}`)
//! - `GET /api/raw/latest` - Raw readings, newest `ts_server` first
//! - `GET /api/avg/latest` - Aggregate windows, newest `t_end` first
//! - `GET /api/security/latest` - Security events, newest `ts_server` first
//! - `GET /api/commands/latest` - Commands, newest `ts_server` first
//!
//! Query parameters: `limit`, `sensor_name` (or `sensor`), `house_id`
//! (or `house`). Commands accept `limit` only.

pub mod handlers;
pub mod routes;

use crate::context::AppContext;
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn build_router(ctx: AppContext) -> Router {
    routes::api_routes()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve the read API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP server: http://{}", addr);
    }

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

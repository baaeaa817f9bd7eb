// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers for the read API.

use crate::context::AppContext;
use crate::query::QueryParams;
use crate::store::{FindSpec, Partition, StoreError};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

/// Error body returned for every failed read. Causes stay in the logs.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!("Query failed: {}", err);
        Self {
            error: "Internal server error".to_string(),
            code: 500,
        }
    }
}

/// GET /
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/raw/latest
pub async fn raw_latest(
    State(ctx): State<AppContext>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    latest(&ctx, Partition::Raw, params(query)).await
}

/// GET /api/avg/latest
pub async fn avg_latest(
    State(ctx): State<AppContext>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    latest(&ctx, Partition::Average, params(query)).await
}

/// GET /api/security/latest
pub async fn security_latest(
    State(ctx): State<AppContext>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    latest(&ctx, Partition::Security, params(query)).await
}

/// GET /api/commands/latest - only `limit` is honored
pub async fn commands_latest(
    State(ctx): State<AppContext>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    latest(&ctx, Partition::Commands, params(query)).await
}

/// Newest-first page of `partition` shaped by `params`.
pub async fn latest(
    ctx: &AppContext,
    partition: Partition,
    params: QueryParams,
) -> Result<Json<Vec<Value>>, ApiError> {
    let spec = FindSpec::for_partition(partition, &params);
    debug!(
        "[{}] find filter={:?} limit={}",
        partition, spec.filter, spec.limit
    );

    let docs = ctx.find(partition, spec).await?;
    Ok(Json(docs))
}

/// A malformed query string reads as "no parameters".
fn params(query: Result<Query<QueryParams>, QueryRejection>) -> QueryParams {
    match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            debug!("Ignoring malformed query string: {}", rejection);
            QueryParams::new()
        }
    }
}

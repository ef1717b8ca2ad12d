//! Axum handlers for the block upload API.
//!
//! Each handler runs inside a span carrying the operation, the block and a
//! fresh request ID, which is also what a client sees on internal errors.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Json;
use blockgate_upload::{
    request_id, BlockUploadService, BlockUploadStateResponse, TenantUploadStats, UploadError,
    MAX_META_SIZE_BYTES,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument, Span};

use crate::error::ApiError;

/// Header carrying the tenant ID.
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn stats_handler(
    State(service): State<BlockUploadService>,
) -> Json<BTreeMap<String, TenantUploadStats>> {
    Json(service.metrics().snapshot())
}

/// `POST /api/v1/upload/block/:block/start`
pub async fn start_block_upload(
    State(service): State<BlockUploadService>,
    Path(block): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let request_id = request_id();
    let span = operation_span("start block upload", &block, &request_id);
    async {
        // One byte past the limit is enough to tell an oversized body apart.
        let meta = read_capped(body, MAX_META_SIZE_BYTES + 1)
            .await
            .map_err(|e| UploadError::Internal(format!("failed reading request body: {e}")))?;
        service.start(tenant(&headers), &block, &meta).await?;
        Ok::<_, UploadError>(StatusCode::OK)
    }
    .instrument(span)
    .await
    .map_err(|e| ApiError::new(e, request_id))
}

/// `POST /api/v1/upload/block/:block/files?path=<relpath>`
pub async fn upload_block_file(
    State(service): State<BlockUploadService>,
    Path(block): Path<String>,
    Query(params): Query<FileParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let request_id = request_id();
    let span = operation_span("block file upload", &block, &request_id);
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    service
        .put_file(
            tenant(&headers),
            &block,
            params.path.as_deref(),
            content_length,
            body.into_data_stream(),
        )
        .instrument(span)
        .await
        .map(|()| StatusCode::OK)
        .map_err(|e| ApiError::new(e, request_id))
}

/// `POST /api/v1/upload/block/:block/finish`
pub async fn finish_block_upload(
    State(service): State<BlockUploadService>,
    Path(block): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let request_id = request_id();
    let span = operation_span("complete block upload", &block, &request_id);
    service
        .finish(tenant(&headers), &block)
        .instrument(span)
        .await
        .map(|()| StatusCode::OK)
        .map_err(|e| ApiError::new(e, request_id))
}

/// `GET /api/v1/upload/block/:block/check`
pub async fn get_block_upload_state(
    State(service): State<BlockUploadService>,
    Path(block): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BlockUploadStateResponse>, ApiError> {
    let request_id = request_id();
    let span = operation_span("get block upload state", &block, &request_id);
    service
        .query(tenant(&headers), &block)
        .instrument(span)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, request_id))
}

fn tenant(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
}

fn operation_span(operation: &'static str, block: &str, request_id: &str) -> Span {
    info_span!("block_upload", feature = "block upload", operation, block, request_id)
}

/// Read at most `cap` bytes of `body`; the rest is left unread.
async fn read_capped(body: Body, cap: usize) -> Result<Bytes, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = cap - buf.len();
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() == cap {
            break;
        }
    }
    Ok(buf.freeze())
}

use axum::routing::{get, post};
use axum::Router;
use blockgate_upload::BlockUploadService;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router with all blockgate endpoints.
pub fn build_router(service: BlockUploadService) -> Router {
    Router::new()
        .route("/api/v1/health", get(handler::health_handler))
        .route("/api/v1/upload/stats", get(handler::stats_handler))
        .route(
            "/api/v1/upload/block/:block/start",
            post(handler::start_block_upload),
        )
        .route(
            "/api/v1/upload/block/:block/files",
            post(handler::upload_block_file),
        )
        .route(
            "/api/v1/upload/block/:block/finish",
            post(handler::finish_block_upload),
        )
        .route(
            "/api/v1/upload/block/:block/check",
            get(handler::get_block_upload_state),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

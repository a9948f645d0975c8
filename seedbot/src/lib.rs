pub mod a2s;
pub mod binding;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod helpers;
pub mod monitor;
pub mod notifier;
pub mod presence;
pub mod query;
pub mod restart;
mod routes;
pub mod status;

use axum::{Router, http::StatusCode, routing::get};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::status::StatusBoard;

/// Create the read-only status router over the given board
pub fn create_app(board: StatusBoard, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/status", get(routes::statuses))
        .route("/status/{name}", get(routes::server_status))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(board)
}

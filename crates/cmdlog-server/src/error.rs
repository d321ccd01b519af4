//! Error types for cmdlog-server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cmdlog_store::StoreError;
use thiserror::Error;
use tracing::{debug, error};

/// Errors surfaced by request handlers and the serve loop
#[derive(Debug, Error)]
pub enum ServerError {
    /// A store transaction failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A blocking store task panicked or was cancelled
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A blocking store task went away before reporting back
    #[error("store task ended before responding")]
    TaskAborted,

    /// The request body or parameters were malformed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The listener or connection handling failed
    #[error("serve error: {0}")]
    Serve(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::BadRequest(reason) = &self {
            debug!(%reason, "Rejected request");
            return (StatusCode::BAD_REQUEST, reason.clone()).into_response();
        }
        // Details stay in the server log, clients only learn that it failed
        error!(error = %self, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "error").into_response()
    }
}

//! HTTP front end for the cmdlog history store
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /session` | allocate a session, body is the decimal id |
//! | `POST /log` | form fields `command`, `session`; empty body on success |
//! | `GET /last` | query `count`, `session`; body is `<command>\0` chunks, newest first |
//! | `GET /health` | liveness probe |
//!
//! Store calls run on tokio's blocking pool, one transaction per request.

pub mod config;
pub mod error;
pub mod handlers;

pub use config::{ServerArgs, ServerConfig};
pub use error::ServerError;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use cmdlog_store::{EventLog, OrderedStore, RangeReader, SessionRegistrar};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{append_command, create_session, health_check, last_commands};

/// Handles shared by every request
#[derive(Clone)]
pub struct AppState {
    pub registrar: SessionRegistrar,
    pub log: EventLog,
    pub reader: RangeReader,
}

impl AppState {
    pub fn new(store: Arc<OrderedStore>) -> Self {
        Self {
            registrar: SessionRegistrar::new(store.clone()),
            log: EventLog::new(store.clone()),
            reader: RangeReader::new(store),
        }
    }
}

/// Build the router; callers must provide `ConnectInfo<SocketAddr>`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session", get(create_session))
        .route("/log", post(append_command))
        .route("/last", get(last_commands))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("cmdlog server listening on {}", addr);
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

use std::net::SocketAddr;
use std::ops::ControlFlow;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use cmdlog_store::{LastQuery, RangeReader, SessionId, StoreError};
use percent_encoding::percent_decode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::{AppState, error::ServerError};

/// Frames buffered between the scan and the response body
const STREAM_BUFFER: usize = 64;

/// Decoded `/log` form
///
/// The command stays raw bytes: `%XX` escapes are decoded without any
/// UTF-8 validation, so whatever the shell recorded is what gets stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogForm {
    pub command: Vec<u8>,
    pub session: u64,
}

impl LogForm {
    /// Parse an `application/x-www-form-urlencoded` body
    ///
    /// The first occurrence of each field wins; unknown fields are ignored.
    pub fn parse(body: &[u8]) -> Result<Self, ServerError> {
        let mut command = None;
        let mut session = None;

        for pair in body.split(|b| *b == b'&').filter(|pair| !pair.is_empty()) {
            let (name, value) = match pair.iter().position(|b| *b == b'=') {
                Some(at) => (&pair[..at], &pair[at + 1..]),
                None => (pair, &[][..]),
            };
            match decode_component(name).as_slice() {
                b"command" if command.is_none() => command = Some(decode_component(value)),
                b"session" if session.is_none() => session = Some(decode_component(value)),
                _ => {}
            }
        }

        let command = command.ok_or_else(|| ServerError::BadRequest("missing command".into()))?;
        let session = session.ok_or_else(|| ServerError::BadRequest("missing session".into()))?;
        let session = std::str::from_utf8(&session)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| ServerError::BadRequest("session is not a decimal id".into()))?;

        Ok(Self { command, session })
    }
}

/// `+` is a space in form encoding, everything else is plain percent-decoding
fn decode_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw.iter().map(|b| if *b == b'+' { b' ' } else { *b }).collect();
    percent_decode(&spaced).collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct LastParams {
    pub count: Option<u64>,
    pub session: Option<u64>,
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Allocate a session for the calling host; the body is the decimal id
pub async fn create_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<String, ServerError> {
    let source_host = addr.ip().to_string();
    let registrar = state.registrar.clone();
    let id = run_blocking(move || registrar.create_session(&source_host)).await?;

    info!(session = %id, source = %addr.ip(), "Session created");
    Ok(id.to_string())
}

/// Record one command; success carries an empty body
pub async fn append_command(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ServerError> {
    let form = LogForm::parse(&body)?;
    info!(
        session = form.session,
        command = %String::from_utf8_lossy(&form.command),
        "Command received"
    );

    let log = state.log.clone();
    let session = SessionId(form.session);
    run_blocking(move || log.append(session, &form.command)).await?;

    Ok(StatusCode::OK)
}

/// Stream the most recent commands as `<command>\0` chunks, newest first
pub async fn last_commands(
    State(state): State<AppState>,
    Query(params): Query<LastParams>,
) -> Result<Response, ServerError> {
    let query = LastQuery::from_params(params.count, params.session);
    let reader = state.reader.clone();

    let (frames_tx, mut frames_rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(STREAM_BUFFER);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), StoreError>>();

    tokio::task::spawn_blocking(move || {
        let snapshot = match reader.snapshot() {
            Ok(snapshot) => {
                let _ = ready_tx.send(Ok(()));
                snapshot
            }
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return;
            }
        };

        let result = RangeReader::last_n(&snapshot, query, |command| {
            let mut frame = Vec::with_capacity(command.len() + 1);
            frame.extend_from_slice(command);
            frame.push(0);
            // A closed channel means the client hung up
            match frames_tx.blocking_send(Ok(Bytes::from(frame))) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            }
        });

        match result {
            Ok(emitted) => debug!(emitted, ?query, "Served last commands"),
            Err(err) => {
                error!(error = %err, "Range scan failed mid-stream");
                let _ = frames_tx.blocking_send(Err(std::io::Error::other(err.to_string())));
            }
        }
    });

    // Opening the snapshot is the only failure that can still change the status
    ready_rx.await.map_err(|_| ServerError::TaskAborted)??;

    let body = Body::from_stream(futures::stream::poll_fn(move |cx| frames_rx.poll_recv(cx)));
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response())
}

async fn run_blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

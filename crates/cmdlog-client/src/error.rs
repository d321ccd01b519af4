//! Error types for cmdlog-client

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to the history server
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the response not read
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    /// The session endpoint returned something other than a decimal id
    #[error("invalid session id from server: {0:?}")]
    InvalidSession(String),
}

/// Failures of one upload-agent invocation
#[derive(Debug, Error)]
pub enum AgentError {
    /// The buffer file could not be opened, read or rewritten
    #[error("buffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another invocation held the buffer lock for too long
    #[error("timed out after {timeout:?} waiting for lock on {}", .path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// NUL separates buffer fields and cannot appear in a command
    #[error("command contains a NUL byte")]
    InvalidCommand,

    /// An append failed; the failing entry and everything after it stay queued
    #[error("upload stopped after {acknowledged} commands, {remaining} still queued: {source}")]
    Flush {
        acknowledged: usize,
        remaining: usize,
        #[source]
        source: ClientError,
    },
}

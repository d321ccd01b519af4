//! Crash-safe upload of shell commands
//!
//! One invocation runs under the buffer lock:
//!
//! 1. queue the new command behind whatever earlier invocations left behind
//! 2. reuse the cached session id, or bootstrap one from the server
//! 3. append every queued command in order
//! 4. rewrite the buffer to hold only what the server has not acknowledged
//!
//! If the process dies anywhere in between, the buffer still holds a state
//! from which the next invocation resumes. An acknowledged command is never
//! left in the buffer once the invocation returns.

use tracing::{debug, info, warn};

use crate::buffer::{BufferState, LocalLogBuffer};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::service::HistoryService;

/// Result of a successful invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No buffer is configured; nothing was recorded
    Disabled,
    /// Nothing to record or upload
    Empty,
    /// The server could not issue a session; commands stay queued
    Deferred { queued: usize },
    /// Every queued command was acknowledged
    Flushed { session: u64, uploaded: usize },
}

/// Extract the command text from a shell `history 1` line
///
/// The leading history index is dropped. Returns `None` when nothing
/// remains. Bytes other than surrounding ASCII whitespace pass through.
pub fn parse_history_line(line: &[u8]) -> Option<&[u8]> {
    let line = line.trim_ascii();
    let space = line.iter().position(|b| *b == b' ')?;
    let command = line[space + 1..].trim_ascii();
    (!command.is_empty()).then_some(command)
}

pub struct UploadAgent<S> {
    service: S,
    config: AgentConfig,
}

impl<S: HistoryService> UploadAgent<S> {
    pub fn new(service: S, config: AgentConfig) -> Self {
        Self { service, config }
    }

    /// Record one raw history line and flush the buffer
    pub async fn record(&self, raw_line: &[u8]) -> Result<UploadOutcome, AgentError> {
        match parse_history_line(raw_line) {
            Some(command) => self.record_command(command).await,
            None => {
                debug!("History line carries no command");
                Ok(UploadOutcome::Empty)
            }
        }
    }

    /// Queue `command` and flush the buffer
    pub async fn record_command(&self, command: &[u8]) -> Result<UploadOutcome, AgentError> {
        let Some(path) = self.config.buffer_path.as_deref() else {
            debug!("No buffer configured, not recording");
            return Ok(UploadOutcome::Disabled);
        };
        if command.is_empty() {
            return Ok(UploadOutcome::Empty);
        }
        if command.contains(&0) {
            return Err(AgentError::InvalidCommand);
        }

        let mut buffer = LocalLogBuffer::acquire(path, self.config.lock_timeout).await?;
        let mut state = buffer.read()?;
        state.pending.push(command.to_vec());
        self.drain(&mut buffer, state).await
    }

    /// Retry uploading whatever is queued, without adding a command
    pub async fn flush(&self) -> Result<UploadOutcome, AgentError> {
        let Some(path) = self.config.buffer_path.as_deref() else {
            return Ok(UploadOutcome::Disabled);
        };

        let mut buffer = LocalLogBuffer::acquire(path, self.config.lock_timeout).await?;
        let state = buffer.read()?;
        if state.pending.is_empty() {
            debug!("Buffer has nothing queued");
            return Ok(UploadOutcome::Empty);
        }
        self.drain(&mut buffer, state).await
    }

    async fn drain(&self, buffer: &mut LocalLogBuffer, state: BufferState) -> Result<UploadOutcome, AgentError> {
        let session = match state.session {
            Some(session) => session,
            None => match self.service.create_session().await {
                Ok(session) => {
                    info!(session, "Started new history session");
                    session
                }
                Err(err) => {
                    // Field 0 stays empty so the next invocation retries the bootstrap
                    warn!(error = %err, queued = state.pending.len(), "Could not obtain a session");
                    buffer.persist(&state)?;
                    return Ok(UploadOutcome::Deferred {
                        queued: state.pending.len(),
                    });
                }
            },
        };

        let BufferState { pending, .. } = state;
        for (acknowledged, command) in pending.iter().enumerate() {
            if let Err(source) = self.service.append(session, command).await {
                let remaining = pending[acknowledged..].to_vec();
                warn!(
                    error = %source,
                    acknowledged,
                    remaining = remaining.len(),
                    "Upload interrupted"
                );
                let remaining_len = remaining.len();
                buffer.persist(&BufferState {
                    session: Some(session),
                    pending: remaining,
                })?;
                return Err(AgentError::Flush {
                    acknowledged,
                    remaining: remaining_len,
                    source,
                });
            }
        }

        buffer.persist(&BufferState {
            session: Some(session),
            pending: Vec::new(),
        })?;
        debug!(session, uploaded = pending.len(), path = %buffer.path().display(), "Buffer flushed");

        Ok(UploadOutcome::Flushed {
            session,
            uploaded: pending.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_line() {
        assert_eq!(parse_history_line(b"  42  ls -la  \n"), Some(&b"ls -la"[..]));
        assert_eq!(
            parse_history_line(b"7 git commit -m 'x y'"),
            Some(&b"git commit -m 'x y'"[..])
        );
        assert_eq!(parse_history_line(b"8 cat caf\xe9.txt"), Some(&b"cat caf\xe9.txt"[..]));
    }

    #[test]
    fn test_parse_history_line_without_command() {
        assert_eq!(parse_history_line(b""), None);
        assert_eq!(parse_history_line(b"   \n"), None);
        assert_eq!(parse_history_line(b"42"), None);
        assert_eq!(parse_history_line(b"42    "), None);
    }
}

//! Local durable queue of unacknowledged commands
//!
//! The buffer is a single file of NUL-separated fields:
//!
//! ```text
//! [session id or empty] \0 [command 1] \0 [command 2] ...
//! ```
//!
//! Field 0 caches the session id as decimal text; the remaining fields are
//! commands not yet acknowledged by the server, oldest first. At every
//! quiescent point the file holds exactly the unacknowledged state.
//! Command fields are opaque bytes and are never re-encoded.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::fs_std::FileExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::AgentError;

const SEPARATOR: u8 = 0;

/// Decoded contents of the buffer file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferState {
    /// Cached session id, if one was obtained earlier
    pub session: Option<u64>,
    /// Commands waiting for upload, oldest first
    pub pending: Vec<Vec<u8>>,
}

impl BufferState {
    /// Parse raw buffer bytes
    ///
    /// An unparseable session field is dropped so the next flush bootstraps a
    /// fresh session; empty command fields are ignored.
    pub fn decode(data: &[u8]) -> Self {
        let mut fields = data.split(|b| *b == SEPARATOR);

        let session = match fields.next() {
            Some(field) if !field.is_empty() => {
                let text = String::from_utf8_lossy(field);
                match text.trim().parse() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!(field = %text, "Discarding unparseable cached session");
                        None
                    }
                }
            }
            _ => None,
        };

        let pending = fields
            .filter(|field| !field.is_empty())
            .map(<[u8]>::to_vec)
            .collect();

        Self { session, pending }
    }

    /// Serialize to the on-disk layout
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.session.map(|s| s.to_string()).unwrap_or_default().into_bytes();
        for command in &self.pending {
            out.push(SEPARATOR);
            out.extend_from_slice(command);
        }
        out
    }
}

/// Exclusive handle on the buffer file
///
/// The advisory lock is held until the handle is dropped.
#[derive(Debug)]
pub struct LocalLogBuffer {
    file: File,
    path: PathBuf,
}

impl LocalLogBuffer {
    /// Open (creating if needed) and exclusively lock the buffer at `path`
    ///
    /// Waits at most `timeout` for a concurrent holder to finish.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self, AgentError> {
        let file = open_buffer_file(path)?;

        // The blocking lock call runs on its own thread. If we give up
        // waiting, that thread drops the file (and the lock) as soon as it
        // is granted.
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let result = file.lock_exclusive().map(|()| file);
            let _ = tx.send(result);
        });

        let file = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(AgentError::Io(std::io::Error::other("lock thread exited")));
            }
            Err(_) => {
                warn!(path = %path.display(), ?timeout, "Gave up waiting for buffer lock");
                return Err(AgentError::LockTimeout {
                    path: path.to_path_buf(),
                    timeout,
                });
            }
        };

        debug!(path = %path.display(), "Acquired buffer lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Read and decode the whole buffer
    pub fn read(&mut self) -> Result<BufferState, AgentError> {
        let mut data = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut data)?;
        Ok(BufferState::decode(&data))
    }

    /// Replace the buffer contents with `state`
    ///
    /// Truncates, rewrites in full and syncs before returning.
    pub fn persist(&mut self, state: &BufferState) -> Result<(), AgentError> {
        let data = state.encode();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(&data)?;
        self.file.sync_data()?;

        debug!(
            path = %self.path.display(),
            pending = state.pending.len(),
            bytes = data.len(),
            "Rewrote buffer"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_buffer_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

//! Append-only command log
//!
//! Every accepted command becomes one immutable record in `commands`, keyed
//! by the server's wall clock in nanoseconds. Two writes that read the same
//! clock value would collide, so the key is bumped past the current
//! greatest key inside the write transaction. Keys therefore stay unique and
//! strictly increasing while keeping the 8-byte timestamp layout.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::records::{COMMANDS, CommandKey, CommandRecord, SessionId, now_nanos};
use crate::store::{OrderedStore, WriteTx};

/// Writer side of the command history
#[derive(Clone)]
pub struct EventLog {
    store: Arc<OrderedStore>,
}

impl EventLog {
    /// Create a new event log over a shared store
    pub fn new(store: Arc<OrderedStore>) -> Self {
        Self { store }
    }

    /// Record one command for a session
    ///
    /// At-least-once sink: the log does not deduplicate, callers must not
    /// resend commands that were already acknowledged.
    #[instrument(skip(self, command), fields(len = command.len()))]
    pub fn append(&self, session: SessionId, command: &[u8]) -> Result<CommandKey, StoreError> {
        let key = self.store.update(|tx| {
            let key = next_command_key(tx, now_nanos())?;
            tx.put(COMMANDS, &key.to_be_bytes(), &CommandRecord::encode_value(session, command))?;
            Ok(key)
        })?;

        debug!(session = %session, key = key.0, "Appended command");
        Ok(key)
    }
}

/// Pick a key no smaller than `now` and greater than every existing key
fn next_command_key(tx: &WriteTx, now: u64) -> Result<CommandKey, StoreError> {
    let floor = match tx.last_key(COMMANDS)? {
        Some(last) => {
            let last = CommandKey::from_key(COMMANDS.name(), &last)?;
            last.0
                .checked_add(1)
                .ok_or_else(|| StoreError::corrupt(COMMANDS.name(), "command key space exhausted"))?
        }
        None => 0,
    };
    Ok(CommandKey(now.max(floor)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use tempfile::TempDir;

    fn create_test_log() -> (EventLog, Arc<OrderedStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            db_path: temp_dir.path().join("test.redb"),
        };
        let store = Arc::new(OrderedStore::open(config).unwrap());
        (EventLog::new(store.clone()), store, temp_dir)
    }

    #[test]
    fn test_append_writes_session_prefixed_value() {
        let (log, store, _temp) = create_test_log();

        let key = log.append(SessionId(5), b"git status").unwrap();

        let tx = store.begin_read().unwrap();
        let value = tx.get(COMMANDS, &key.to_be_bytes()).unwrap().unwrap();
        let record = CommandRecord::decode(&value).unwrap();
        assert_eq!(record.session, SessionId(5));
        assert_eq!(record.command, b"git status");
    }

    #[test]
    fn test_keys_strictly_increase() {
        let (log, _store, _temp) = create_test_log();

        let mut previous = log.append(SessionId(1), b"first").unwrap();
        for i in 0..100 {
            let key = log.append(SessionId(1), format!("cmd {i}").as_bytes()).unwrap();
            assert!(key > previous);
            previous = key;
        }
    }

    #[test]
    fn test_same_clock_reading_does_not_collide() {
        let (_log, store, _temp) = create_test_log();

        let frozen = 1_700_000_000_000_000_000;
        let keys: Vec<CommandKey> = (0..3)
            .map(|_| {
                store
                    .update(|tx| {
                        let key = next_command_key(tx, frozen)?;
                        tx.put(COMMANDS, &key.to_be_bytes(), &CommandRecord::encode_value(SessionId(1), b"x"))?;
                        Ok(key)
                    })
                    .unwrap()
            })
            .collect();

        assert_eq!(keys, vec![CommandKey(frozen), CommandKey(frozen + 1), CommandKey(frozen + 2)]);
    }
}

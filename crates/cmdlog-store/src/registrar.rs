//! Session allocation
//!
//! Hands out session ids from the `sessions` collection's sequence and
//! records where each session came from.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::records::{SESSIONS, SessionId, SessionRecord, now_nanos};
use crate::store::OrderedStore;

/// Creates and looks up sessions
#[derive(Clone)]
pub struct SessionRegistrar {
    store: Arc<OrderedStore>,
}

impl SessionRegistrar {
    /// Create a new registrar over a shared store
    pub fn new(store: Arc<OrderedStore>) -> Self {
        Self { store }
    }

    /// Allocate a new session for a client at `source_host`
    ///
    /// Writes exactly one immutable record. Ids are strictly increasing,
    /// also across concurrent callers, because allocation and insert share
    /// one write transaction.
    #[instrument(skip(self))]
    pub fn create_session(&self, source_host: &str) -> Result<SessionId, StoreError> {
        let record = self.store.update(|tx| {
            let id = SessionId(tx.next_sequence(SESSIONS)?);
            let record = SessionRecord {
                id,
                created_at_nanos: now_nanos(),
                source_host: source_host.to_string(),
            };
            tx.put(SESSIONS, &id.to_be_bytes(), &record.encode_value())?;
            Ok(record)
        })?;

        debug!(session = %record.id, "Created session");
        Ok(record.id)
    }

    /// Look up a session record
    pub fn session(&self, id: SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let tx = self.store.begin_read()?;
        match tx.get(SESSIONS, &id.to_be_bytes())? {
            Some(value) => SessionRecord::decode(id, &value).map(Some),
            None => Ok(None),
        }
    }
}

//! # cmdlog Store
//!
//! Durable, append-only storage for shell command history.
//!
//! ## Features
//!
//! - **OrderedStore**: transactional, byte-ordered key-value collections on
//!   redb with persistent per-collection sequences
//! - **SessionRegistrar**: allocates strictly increasing session ids
//! - **EventLog**: appends session-tagged commands under time-ordered keys
//! - **RangeReader**: "last N commands" via a reverse scan, optionally
//!   filtered to one session
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cmdlog_store::{EventLog, LastQuery, OrderedStore, RangeReader, SessionRegistrar, StoreConfig};
//!
//! let store = Arc::new(OrderedStore::open(StoreConfig::default())?);
//! let session = SessionRegistrar::new(store.clone()).create_session("127.0.0.1")?;
//!
//! let log = EventLog::new(store.clone());
//! log.append(session, b"cargo build")?;
//!
//! let reader = RangeReader::new(store);
//! let recent = reader.collect_last_n(LastQuery::from_params(Some(10), Some(session.as_u64())))?;
//! assert_eq!(recent, vec![b"cargo build".to_vec()]);
//! ```

pub mod error;
pub mod event_log;
pub mod range;
pub mod records;
pub mod registrar;
pub mod store;

// Re-exports
pub use error::StoreError;
pub use event_log::EventLog;
pub use range::{DEFAULT_LAST_COUNT, LastQuery, RangeReader};
pub use records::{COMMANDS, CommandKey, CommandRecord, SESSIONS, SessionId, SessionRecord};
pub use registrar::SessionRegistrar;
pub use store::{Collection, Direction, OrderedStore, ReadTx, StoreConfig, WriteTx};

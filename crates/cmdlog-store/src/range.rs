//! Reverse-chronological range reads over `commands`

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::StoreError;
use crate::records::{COMMANDS, CommandRecord, SessionId};
use crate::store::{Direction, OrderedStore, ReadTx};

/// Budget used when a query asks for zero (or no) commands
pub const DEFAULT_LAST_COUNT: u64 = 10_000;

/// Parameters of a "last N commands" query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastQuery {
    /// Maximum number of matching commands to return
    pub count: u64,
    /// Restrict to one session; `None` returns every session
    pub session: Option<SessionId>,
}

impl LastQuery {
    /// Build a query from raw request parameters
    ///
    /// A zero or missing count becomes [`DEFAULT_LAST_COUNT`] and a zero
    /// session means "all sessions".
    pub fn from_params(count: Option<u64>, session: Option<u64>) -> Self {
        let count = match count {
            Some(0) | None => DEFAULT_LAST_COUNT,
            Some(n) => n,
        };
        let session = session.filter(|s| *s != 0).map(SessionId);
        Self { count, session }
    }
}

impl Default for LastQuery {
    fn default() -> Self {
        Self::from_params(None, None)
    }
}

/// Reader side of the command history
#[derive(Clone)]
pub struct RangeReader {
    store: Arc<OrderedStore>,
}

impl RangeReader {
    /// Create a new reader over a shared store
    pub fn new(store: Arc<OrderedStore>) -> Self {
        Self { store }
    }

    /// Open the snapshot a query will run against
    ///
    /// Split from [`RangeReader::last_n`] so callers can report an open
    /// failure before they start emitting output.
    pub fn snapshot(&self) -> Result<ReadTx, StoreError> {
        self.store.begin_read()
    }

    /// Walk commands newest first, handing each match to `sink`
    ///
    /// Commands of other sessions are skipped without consuming the budget.
    /// The walk ends when the budget is spent, the log is exhausted, or
    /// `sink` breaks. Returns the number of commands emitted.
    #[instrument(skip(tx, sink))]
    pub fn last_n<F>(tx: &ReadTx, query: LastQuery, mut sink: F) -> Result<u64, StoreError>
    where
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        let mut remaining = query.count;
        let mut emitted = 0;
        if remaining == 0 {
            return Ok(emitted);
        }

        tx.scan(COMMANDS, Direction::Backward, |key, value| {
            let record = match CommandRecord::decode(value) {
                Ok(record) => record,
                Err(err) => {
                    warn!(key = ?key, error = %err, "Skipping malformed command record");
                    return ControlFlow::Continue(());
                }
            };

            if query.session.is_some_and(|s| s != record.session) {
                return ControlFlow::Continue(());
            }

            emitted += 1;
            remaining -= 1;
            if sink(record.command).is_break() || remaining == 0 {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;

        Ok(emitted)
    }

    /// Run a query and collect the command texts, newest first
    pub fn collect_last_n(&self, query: LastQuery) -> Result<Vec<Vec<u8>>, StoreError> {
        let tx = self.snapshot()?;
        let mut commands = Vec::new();
        Self::last_n(&tx, query, |command| {
            commands.push(command.to_vec());
            ControlFlow::Continue(())
        })?;
        Ok(commands)
    }
}

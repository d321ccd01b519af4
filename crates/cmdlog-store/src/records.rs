//! Record layouts for the `sessions` and `commands` collections
//!
//! ```text
//! sessions: key = session id (u64 BE)     value = created_at nanos (u64 BE) ++ source host
//! commands: key = timestamp nanos (u64 BE) value = session id (u64 BE) ++ command bytes
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::store::Collection;

pub const SESSIONS: Collection = Collection::new("sessions");
pub const COMMANDS: Collection = Collection::new("commands");

/// Server-assigned session identity
///
/// Ids start at 1. Zero never names a session; range queries use it to mean
/// "every session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(SessionId)
    }
}

/// Key of a command record: nanoseconds since the Unix epoch at write time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandKey(pub u64);

impl CommandKey {
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(collection: &'static str, key: &[u8]) -> Result<Self, StoreError> {
        read_u64(collection, key).map(CommandKey)
    }
}

/// Metadata recorded when a session is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub created_at_nanos: u64,
    pub source_host: String,
}

impl SessionRecord {
    pub fn encode_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(8 + self.source_host.len());
        value.extend_from_slice(&self.created_at_nanos.to_be_bytes());
        value.extend_from_slice(self.source_host.as_bytes());
        value
    }

    pub fn decode(id: SessionId, value: &[u8]) -> Result<Self, StoreError> {
        let created_at_nanos = read_u64(SESSIONS.name(), value)?;
        let source_host = String::from_utf8_lossy(&value[8..]).into_owned();
        Ok(Self {
            id,
            created_at_nanos,
            source_host,
        })
    }
}

/// A single command as stored in the `commands` collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord<'a> {
    pub session: SessionId,
    pub command: &'a [u8],
}

impl<'a> CommandRecord<'a> {
    pub fn encode_value(session: SessionId, command: &[u8]) -> Vec<u8> {
        let mut value = Vec::with_capacity(8 + command.len());
        value.extend_from_slice(&session.to_be_bytes());
        value.extend_from_slice(command);
        value
    }

    pub fn decode(value: &'a [u8]) -> Result<Self, StoreError> {
        let session = SessionId(read_u64(COMMANDS.name(), value)?);
        Ok(Self {
            session,
            command: &value[8..],
        })
    }
}

/// Wall-clock nanoseconds since the Unix epoch
pub(crate) fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(0)
}

fn read_u64(collection: &'static str, bytes: &[u8]) -> Result<u64, StoreError> {
    let prefix: [u8; 8] = bytes
        .get(..8)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(|| StoreError::corrupt(collection, format!("expected at least 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(prefix))
}

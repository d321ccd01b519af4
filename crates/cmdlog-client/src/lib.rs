//! # cmdlog Client
//!
//! Shell-side half of cmdlog. Each prompt hook runs one [`UploadAgent`]
//! invocation, which queues the last command in a locked local buffer and
//! ships everything queued to the history server.
//!
//! Commands survive server outages and killed processes: anything the server
//! has not acknowledged stays in the buffer and is retried, in order, by the
//! next invocation.
//!
//! ```rust,ignore
//! use cmdlog_client::{AgentConfig, HttpHistoryService, UploadAgent};
//!
//! let config = AgentConfig::default().with_buffer("/tmp/cmdlog-buffer");
//! let service = HttpHistoryService::new(&config.server_url, config.request_timeout)?;
//! let agent = UploadAgent::new(service, config);
//! agent.record(b"  101  cargo test\n").await?;
//! ```

pub mod agent;
pub mod buffer;
pub mod config;
pub mod error;
pub mod service;

pub use agent::{UploadAgent, UploadOutcome, parse_history_line};
pub use buffer::{BufferState, LocalLogBuffer};
pub use config::{AgentConfig, Cli, Command};
pub use error::{AgentError, ClientError};
pub use service::{HistoryService, HttpHistoryService};

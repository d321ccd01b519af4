use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

#[derive(Debug, Parser)]
#[command(name = "cmdlog", about = "Ship shell command history to a cmdlog server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Base URL of the history server
    #[arg(long, global = true, env = "CMDLOG_SERVER", default_value = DEFAULT_SERVER_URL)]
    pub server: String,
    /// Local buffer file; tracking is disabled when unset
    #[arg(long, global = true, env = "HISTORY_SESSION")]
    pub buffer: Option<String>,
    /// How long to wait for another invocation to release the buffer
    #[arg(long, global = true, env = "CMDLOG_LOCK_TIMEOUT_MS", default_value_t = 5000)]
    pub lock_timeout_ms: u64,
    /// Per-request HTTP timeout
    #[arg(long, global = true, env = "CMDLOG_REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CMDLOG_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a session and print its id
    Session,
    /// Read one history line from stdin and upload it
    Track,
    /// Upload whatever is still queued in the buffer
    Flush,
    /// Print the most recent commands, NUL-terminated, newest first
    Last {
        /// Maximum number of commands
        #[arg(short, long, default_value_t = 10_000)]
        count: u64,
        /// Only this session (0 for all)
        #[arg(short, long, default_value_t = 0)]
        session: u64,
    },
}

/// Settings for one upload-agent invocation
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub buffer_path: Option<PathBuf>,
    pub server_url: String,
    pub lock_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            buffer_path: None,
            server_url: DEFAULT_SERVER_URL.to_string(),
            lock_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    pub fn with_buffer(mut self, path: impl Into<PathBuf>) -> Self {
        self.buffer_path = Some(path.into());
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl From<&Cli> for AgentConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            buffer_path: cli
                .buffer
                .as_deref()
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            server_url: cli.server.clone(),
            lock_timeout: Duration::from_millis(cli.lock_timeout_ms),
            request_timeout: Duration::from_millis(cli.request_timeout_ms),
        }
    }
}

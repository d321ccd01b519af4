use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use cmdlog_logging::LogConfig;
use cmdlog_store::StoreConfig;

#[derive(Debug, Parser)]
#[command(name = "cmdlog-server", about = "Durable store for shell command history")]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "CMDLOG_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
    /// Path to the history database file
    #[arg(long, env = "CMDLOG_DB", default_value = "history.db")]
    pub db: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CMDLOG_LOG", default_value = "info")]
    pub log_level: String,
    /// Emit console logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, env = "CMDLOG_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreConfig::default(),
            log: LogConfig::server(),
        }
    }
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        let mut log = LogConfig::server()
            .with_level(args.log_level)
            .with_json_console(args.json_logs);
        if let Some(dir) = args.log_dir {
            log = log.with_file(dir);
        }

        Self {
            listen_addr: args.listen,
            store: StoreConfig { db_path: args.db },
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_args_defaults() {
        let args = ServerArgs::parse_from(["cmdlog-server"]);
        let config = ServerConfig::from(args);
        let default = ServerConfig::default();

        assert_eq!(config.listen_addr, default.listen_addr);
        assert_eq!(config.store.db_path, default.store.db_path);
        assert_eq!(config.log.default_level, "info");
        assert!(config.log.file.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = ServerArgs::parse_from([
            "cmdlog-server",
            "--listen",
            "127.0.0.1:9000",
            "--db",
            "/tmp/h.db",
            "--json-logs",
            "--log-dir",
            "/tmp/logs",
        ]);
        let config = ServerConfig::from(args);

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/h.db"));
        assert!(config.log.console.json);
        assert!(config.log.file.is_some());
    }
}

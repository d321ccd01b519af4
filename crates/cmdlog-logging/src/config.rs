//! Where log output goes and at what level

use std::path::PathBuf;

/// Subscriber settings shared by the server and client binaries
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub default_level: String,

    pub console: ConsoleConfig,

    /// Rolling JSON file, off unless configured
    pub file: Option<FileConfig>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
        }
    }
}

impl LogConfig {
    /// Long-running server: human-readable console output at info
    pub fn server() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig {
                enabled: true,
                json: false,
                ansi: true,
                stderr: false,
            },
            file: None,
        }
    }

    /// Shell hook: warnings only, on stderr, so stdout carries only
    /// command output
    pub fn client() -> Self {
        Self {
            default_level: "warn".to_string(),
            console: ConsoleConfig {
                enabled: true,
                json: false,
                ansi: false,
                stderr: true,
            },
            file: None,
        }
    }

    /// Override the default level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Switch console output to JSON lines
    pub fn with_json_console(mut self, json: bool) -> Self {
        self.console.json = json;
        if json {
            self.console.ansi = false;
        }
        self
    }

    /// Also write JSON lines to a rolling file in `directory`
    pub fn with_file(mut self, directory: impl Into<PathBuf>) -> Self {
        self.file = Some(FileConfig {
            directory: directory.into(),
            ..FileConfig::default()
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
    /// Colorize output
    pub ansi: bool,
    /// Write to stderr instead of stdout
    pub stderr: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            json: false,
            ansi: false,
            stderr: false,
        }
    }
}

/// Daily (or hourly) rolling file sink
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Created on startup if missing
    pub directory: PathBuf,
    /// Rolled files are named `<prefix>.<date>`
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "cmdlog".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

/// How often the file sink starts a new file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single file, never rolled
    Never,
}

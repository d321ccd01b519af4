//! Shared tracing setup for cmdlog binaries
//!
//! Both the history server and the shell-side client log through `tracing`.
//! This crate owns the subscriber wiring so the two agree on filtering and
//! formats: an `EnvFilter` (with `RUST_LOG` taking precedence over the
//! configured level), a console layer, and an optional rolling JSON file.
//!
//! # Quick Start
//!
//! ```ignore
//! use cmdlog_logging::{LogConfig, SubscriberBuilder};
//!
//! let _guard = SubscriberBuilder::new()
//!     .with_config(LogConfig::server())
//!     .try_init()?;
//! tracing::info!("ready");
//! ```

pub mod config;

pub use config::{ConsoleConfig, FileConfig, LogConfig, RotationStrategy};
pub use tracing_appender::non_blocking::WorkerGuard;

use thiserror::Error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created
    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    /// A global subscriber was already installed
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Builder for configuring and initializing the global subscriber
pub struct SubscriberBuilder {
    config: LogConfig,
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes the file writer on drop and must be kept
    /// alive for the lifetime of the program when file output is enabled.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let (layers, guard) = build_layers(&self.config)?;

        Registry::default()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;

        Ok(guard)
    }
}

fn build_layers(config: &LogConfig) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LoggingError> {
    let mut layers = Vec::new();
    let mut guard = None;

    if config.console.enabled {
        layers.push(console_layer(&config.console));
    }

    if let Some(file) = &config.file {
        std::fs::create_dir_all(&file.directory)?;
        let rotation = match file.rotation {
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Never => Rotation::NEVER,
        };
        let appender = RollingFileAppender::new(rotation, &file.directory, &file.prefix);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        layers.push(
            fmt::layer()
                .json()
                .with_current_span(true)
                .flatten_event(true)
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    Ok((layers, guard))
}

fn console_layer(console: &ConsoleConfig) -> BoxedLayer {
    // Separate arms because each writer/format pair is its own type
    match (console.json, console.stderr) {
        (true, true) => fmt::layer()
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (true, false) => fmt::layer()
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .boxed(),
        (false, true) => fmt::layer()
            .with_ansi(console.ansi)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (false, false) => fmt::layer()
            .with_ansi(console.ansi)
            .with_target(true)
            .boxed(),
    }
}

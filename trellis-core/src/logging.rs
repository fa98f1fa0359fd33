//! Logging for the trellis kernel
//!
//! Two concerns live here:
//!
//! - **Diagnostics:** the kernel logs through `tracing` macros, re-exported
//!   from this module. [`LogConfig`] installs a subscriber for them.
//! - **Fault reporting:** the kernel hands every fault it converts into a
//!   response to an optional [`Logger`]. [`TracingLogger`] forwards those
//!   to `tracing::error!`.
//!
//! # Examples
//!
//! ```no_run
//! use trellis_core::logging::*;
//!
//! let _guard = LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .expect("logging");
//!
//! info!("Kernel starting");
//! ```

use crate::error::{Error, Result};
use http::StatusCode;
use std::io;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!("unknown log level `{other}`"))),
        }
    }
}

/// Output format for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    Plain,
    /// Multi-line, for development
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" | "text" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!("unknown log format `{other}`"))),
        }
    }
}

/// Output destination for logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// Default: stdout may carry the CGI response.
    Stderr,
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    fn to_tracing_rotation(self) -> tracing_appender::rolling::Rotation {
        match self {
            Rotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
            Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
            Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    pub targets: bool,
    pub file_line: bool,
    pub colors: bool,
    /// Overrides `level` and `RUST_LOG` when set.
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `TRELLIS_LOG_LEVEL` and `TRELLIS_LOG_FORMAT` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`LogConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(level) = lookup("TRELLIS_LOG_LEVEL") {
            config.level = level.parse()?;
        }
        if let Some(format) = lookup("TRELLIS_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_file_line(mut self, enable: bool) -> Self {
        self.file_line = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    /// Set a filter directive such as `"trellis_core=debug"`.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Install the global subscriber.
    ///
    /// Keep the returned guard alive; dropping it flushes pending records.
    /// Fails if a global subscriber is already installed.
    pub fn init(self) -> Result<WorkerGuard> {
        let env_filter = match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter)
                .map_err(|e| Error::Config(format!("invalid log filter `{filter}`: {e}")))?,
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        };

        let (writer, guard) = match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(tracing_appender::rolling::RollingFileAppender::new(
                rotation.to_tracing_rotation(),
                directory,
                prefix,
            )),
        };

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(self.targets)
                .with_thread_ids(self.thread_ids)
                .with_file(self.file_line)
                .with_line_number(self.file_line)
                .boxed(),
            LogFormat::Plain => fmt::layer()
                .with_writer(writer)
                .with_target(self.targets)
                .with_thread_ids(self.thread_ids)
                .with_file(self.file_line)
                .with_line_number(self.file_line)
                .with_ansi(self.colors)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_writer(writer)
                .with_target(self.targets)
                .with_thread_ids(self.thread_ids)
                .with_ansi(self.colors)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_writer(writer)
                .with_target(self.targets)
                .with_thread_ids(self.thread_ids)
                .with_ansi(self.colors)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(env_filter)
            .try_init()
            .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

        Ok(guard)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stderr,
            thread_ids: false,
            targets: true,
            file_line: false,
            colors: false,
            env_filter: None,
        }
    }
}

/// A fault as handed to a [`Logger`].
#[derive(Debug, Clone, Copy)]
pub struct FaultRecord<'a> {
    pub fault: &'a Error,
    pub status: StatusCode,
}

impl<'a> FaultRecord<'a> {
    pub fn new(fault: &'a Error, status: StatusCode) -> Self {
        Self { fault, status }
    }

    pub fn kind(&self) -> &'static str {
        self.fault.kind()
    }

    /// Messages of the fault's source chain, outermost first, excluding the
    /// fault itself.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(self.fault);
        while let Some(error) = source {
            chain.push(error.to_string());
            source = error.source();
        }
        chain
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log sink unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Receives faults the kernel converted into responses.
pub trait Logger: Send + Sync {
    fn error(&self, message: &str, record: &FaultRecord<'_>) -> std::result::Result<(), LogError>;
}

/// Forwards faults to `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, message: &str, record: &FaultRecord<'_>) -> std::result::Result<(), LogError> {
        error!(
            status = record.status.as_u16(),
            kind = record.kind(),
            chain = ?record.chain(),
            "{message}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_error::HttpError;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Trace.to_tracing_level(), Level::TRACE);
        assert_eq!(LogLevel::Error.to_tracing_level(), Level::ERROR);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.targets);
    }

    #[test]
    fn test_from_lookup() {
        let config = LogConfig::from_lookup(|key| match key {
            "TRELLIS_LOG_LEVEL" => Some("debug".into()),
            "TRELLIS_LOG_FORMAT" => Some("compact".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);

        let bad = LogConfig::from_lookup(|key| (key == "TRELLIS_LOG_FORMAT").then(|| "xml".into()));
        assert!(matches!(bad, Err(Error::Config(_))));
    }

    #[test]
    fn test_fault_record_chain() {
        let fault: Error = HttpError::bad_request()
            .with_source(std::io::Error::other("disk on fire"))
            .into();
        let record = FaultRecord::new(&fault, fault.status_code());
        assert_eq!(record.kind(), "http");
        assert_eq!(record.chain(), vec!["disk on fire".to_string()]);
    }
}

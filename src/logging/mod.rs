//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events. Binaries and tests that want
//! to see them call one of the `init_*` functions once; later calls are no-ops.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: full tracing filter, wins over everything else
//! - `FORGE_ALLOC_LOG_LEVEL`: level for this crate's events (error, warn, info, debug, trace)
//! - `FORGE_ALLOC_LOG_FORMAT`: "human" or "json"

use std::str::FromStr;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "FORGE_ALLOC_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "FORGE_ALLOC_LOG_FORMAT";

/// Filter target for this crate's events
const CRATE_TARGET: &str = "forge_alloc";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("invalid filter directive: {0}")]
    InvalidFilter(String),

    /// Another subscriber was installed outside this module
    #[error("failed to install subscriber: {0}")]
    SubscriberInstallFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    /// Arena OOM and leaked blocks at drop land here
    #[default]
    Warn,
    Info,
    Debug,
    /// One event per alloc and free
    Trace,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLogLevel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" | "console" => Ok(LogFormat::Human),
            "json" | "structured" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidLogFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source file and line in each event
    pub with_file_info: bool,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    /// Read `FORGE_ALLOC_LOG_LEVEL` and `FORGE_ALLOC_LOG_FORMAT`
    ///
    /// Unset variables keep the defaults; set but unparseable ones are errors.
    pub fn from_env() -> Result<Self, LoggingError> {
        let mut config = Self::new();
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.level = level.parse()?;
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.format = format.parse()?;
        }
        Ok(config)
    }
}

/// Initialize from the environment, ignoring any error
///
/// # Example
///
/// ```ignore
/// forge_alloc::logging::init_logging_default();
/// tracing::info!("allocators ready");
/// ```
pub fn init_logging_default() {
    if let Err(e) = init_logging_from_env() {
        eprintln!("forge_alloc: logging not initialized: {}", e);
    }
}

/// Initialize from `RUST_LOG` and the `FORGE_ALLOC_*` variables
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    if is_initialized() {
        return Ok(());
    }
    let config = LoggingConfig::from_env()?;
    init_with_config(&config)
}

/// Initialize with an explicit configuration
///
/// Idempotent: only the first successful call installs a subscriber.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    TRACING_INITIALIZED
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| ())
}

fn install_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(config.with_file_info)
                    .with_line_number(config.with_file_info),
            )
            .try_init(),
        LogFormat::Human => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(config.with_file_info)
                    .with_line_number(config.with_file_info),
            )
            .try_init(),
    };

    result.map_err(|e| LoggingError::SubscriberInstallFailed(e.to_string()))
}

/// `RUST_LOG` if set, otherwise `warn` globally and `level` for this crate
fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(rust_log).map_err(|e| LoggingError::InvalidFilter(e.to_string()));
    }
    EnvFilter::try_new(filter_directive(level))
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

fn filter_directive(level: LogLevel) -> String {
    format!("warn,{}={}", CRATE_TARGET, level.as_filter_str())
}

pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

//! Logging Initialisation
//!
//! `TigerStyle`: Opt-in subscriber setup. The library only emits `tracing`
//! events; binaries and tests decide whether anything is printed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use forage::telemetry::{init_logging, LoggingConfig};
//!
//! // Filter from FORAGE_LOG, default "info"
//! init_logging(LoggingConfig::default()).expect("logging init");
//!
//! // Or configure explicitly
//! let config = LoggingConfig::builder()
//!     .filter("forage=debug")
//!     .with_target(false)
//!     .build();
//! # let _ = config;
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::constants::{ENV_LOG_FILTER, LOG_FILTER_DEFAULT};

/// Logging setup errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Filter directive could not be parsed
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter {
        /// The rejected directive
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Result type for logging setup.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive (e.g. `forage=debug,info`)
    pub filter: String,
    /// Include the event target in output
    pub with_target: bool,
    /// Use ANSI colours
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var(ENV_LOG_FILTER).unwrap_or_else(|_| LOG_FILTER_DEFAULT.to_string()),
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Create a new builder for `LoggingConfig`.
    #[must_use]
    pub fn builder() -> LoggingConfigBuilder {
        LoggingConfigBuilder::default()
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            directive: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Builder for `LoggingConfig`.
#[derive(Default)]
pub struct LoggingConfigBuilder {
    filter: Option<String>,
    with_target: Option<bool>,
    ansi: Option<bool>,
}

impl LoggingConfigBuilder {
    /// Set the filter directive.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Include or omit event targets.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = Some(with_target);
        self
    }

    /// Enable or disable ANSI colours.
    #[must_use]
    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = Some(ansi);
        self
    }

    /// Build the `LoggingConfig`.
    #[must_use]
    pub fn build(self) -> LoggingConfig {
        let default = LoggingConfig::default();
        LoggingConfig {
            filter: self.filter.unwrap_or(default.filter),
            with_target: self.with_target.unwrap_or(default.with_target),
            ansi: self.ansi.unwrap_or(default.ansi),
        }
    }
}

/// Install a global fmt subscriber.
///
/// # Errors
///
/// Returns `InvalidFilter` for an unparsable directive and
/// `AlreadyInitialized` when a global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialized)?;

    tracing::debug!(filter = %config.filter, "logging initialized");
    Ok(())
}

//! Errors
//!
//! `TigerStyle`: Explicit error types with context.
//!
//! Two layers: [`StoreError`] is what drivers report, [`ForageError`] is what
//! the façade reports. Backend errors pass through the façade unchanged inside
//! [`ForageError::Store`]. Both are `Clone` because one readiness outcome is
//! handed to every caller waiting on it.

use thiserror::Error;

use crate::driver::Method;

/// Errors from driver storage operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Write would exceed the store's quota
    #[error("quota exceeded: {used} of {quota} bytes in use")]
    QuotaExceeded {
        /// Bytes the store would hold after the write
        used: usize,
        /// Quota in bytes
        quota: usize,
    },

    /// An open connection prevents a version change
    #[error("connection blocked: {database} has {open} open connection(s)")]
    ConnectionBlocked {
        /// Database whose upgrade was blocked
        database: String,
        /// Number of other open connections
        open: usize,
    },

    /// The connection was closed underneath the operation
    #[error("connection closed: {database}")]
    ConnectionClosed {
        /// Database whose connection closed
        database: String,
    },

    /// Requested version is lower than the stored one
    #[error("version error: {database} is at version {current}, requested {requested}")]
    VersionError {
        /// Database name
        database: String,
        /// Version on disk
        current: u64,
        /// Version requested by the opener
        requested: u64,
    },

    /// Constraint violation inside the backend
    #[error("constraint error: {message}")]
    Constraint {
        /// Error message
        message: String,
    },

    /// Store or database does not exist
    #[error("not found: {what}")]
    NotFound {
        /// The missing object
        what: String,
    },

    /// Read failed
    #[error("read failed: {0}")]
    Read(String),

    /// Write failed
    #[error("write failed: {0}")]
    Write(String),

    /// Value could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data could not be deserialized
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Simulated fault (for DST)
    #[error("simulated fault: {fault_type}")]
    SimulatedFault {
        /// Type of simulated fault
        fault_type: String,
    },

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a connection closed error.
    #[must_use]
    pub fn connection_closed(database: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            database: database.into(),
        }
    }

    /// Create a constraint error.
    #[must_use]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Create a read error.
    #[must_use]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }

    /// Create a write error.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    /// Create a backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a simulated fault error.
    #[must_use]
    pub fn simulated(fault_type: impl Into<String>) -> Self {
        Self::SimulatedFault {
            fault_type: fault_type.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Backend(err.to_string())
        } else {
            Self::Deserialization(err.to_string())
        }
    }
}

/// Result type for driver storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the façade, registry and selector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForageError {
    /// Custom driver is missing its name or one of the library methods
    #[error("custom driver not compliant: {reason}")]
    NotCompliantDriver {
        /// What is missing
        reason: String,
        /// The library methods the driver does not implement
        missing: Vec<Method>,
    },

    /// Custom driver name collides with a built-in driver
    #[error("custom driver name already in use: {name}")]
    DriverNameInUse {
        /// The reserved name
        name: String,
    },

    /// No driver registered under the name
    #[error("driver not found: {name}")]
    DriverNotFound {
        /// The unknown name
        name: String,
    },

    /// Every candidate was unsupported or failed to initialise
    #[error("no available storage method found")]
    NoAvailableStorageMethod,

    /// Configuration change after the instance served a storage call
    #[error("can't call config() after forage has been used")]
    ConfigLocked,

    /// Option value rejected by validation
    #[error("invalid config: {field}: {message}")]
    InvalidConfig {
        /// Option name (camelCase)
        field: String,
        /// Why it was rejected
        message: String,
    },

    /// Caller value could not be converted to a storable value
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend error, passed through unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ForageError {
    /// Create a not compliant error listing the missing methods.
    #[must_use]
    pub fn not_compliant(reason: impl Into<String>, missing: Vec<Method>) -> Self {
        Self::NotCompliantDriver {
            reason: reason.into(),
            missing,
        }
    }

    /// Create a name in use error.
    #[must_use]
    pub fn name_in_use(name: impl Into<String>) -> Self {
        Self::DriverNameInUse { name: name.into() }
    }

    /// Create a driver not found error.
    #[must_use]
    pub fn driver_not_found(name: impl Into<String>) -> Self {
        Self::DriverNotFound { name: name.into() }
    }

    /// Create an invalid config error.
    #[must_use]
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for façade operations.
pub type ForageResult<T> = Result<T, ForageError>;

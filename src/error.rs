//! # Error Types
//!
//! All fallible operations in this crate return [`StorageResult`]. The
//! [`StorageError`] enum groups failures into three kinds, exposed through
//! [`StorageError::kind`]:
//!
//! - **Storage**: driver-side failures (connect, prepare, execute, commit,
//!   rollback, metadata). Always carry the originating message and, where
//!   available, the driver error as source.
//! - **Mapping**: programmer errors such as unknown storage keys, missing
//!   mappings, unsupported predicates or value type mismatches.
//! - **Unsupported**: optional operations a driver or dialect does not
//!   provide (cursor positioning on forward-only results, window functions).
//!   Callers may treat these as non-fatal.

use crate::types::DataType;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Broad error categories for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Driver-side failure.
    Storage,
    /// Mapping or argument error.
    Mapping,
    /// Optional operation not supported by the driver or dialect.
    Unsupported,
}

/// The error type for all storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A failure reported by the underlying database driver.
    #[error("storage error: {message}")]
    Driver {
        /// Description of the failed operation.
        message: String,
        /// The driver error, if one was surfaced.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No storage definition is registered for a lookup key.
    #[error("no storage definition registered for key '{0}'")]
    UnknownKey(String),

    /// No mapping is registered for a queried or stored type.
    #[error("no storage mapping registered for type '{0}'")]
    NoMapping(String),

    /// An update or delete requires an id value but none is set.
    #[error("no identity value for object of type '{0}'")]
    NoIdentity(String),

    /// A child query requires a parent attribute the child mapping lacks.
    #[error("no parent attribute for '{parent}' in '{child}'")]
    NoParentAttribute {
        /// The parent type name.
        parent: String,
        /// The child type name.
        child: String,
    },

    /// A criteria node cannot be lowered to SQL.
    #[error("unsupported query predicate: {0}")]
    UnsupportedPredicate(String),

    /// A value failed the final datatype check after conversion.
    #[error("attribute type mismatch: {actual} (expected: {expected})")]
    TypeMismatch {
        /// The declared attribute datatype.
        expected: DataType,
        /// Description of the offending value.
        actual: String,
    },

    /// A string value could not be parsed into the declared datatype.
    #[error("invalid {datatype} value: '{value}'")]
    InvalidValue {
        /// The declared attribute datatype.
        datatype: DataType,
        /// The unparseable input.
        value: String,
    },

    /// An attribute has no SQL datatype mapping.
    #[error("no SQL datatype mapping for attribute '{0}'")]
    UnmappedDatatype(String),

    /// The mapping of the deleted type forbids deletes.
    #[error("delete not allowed for type '{0}'")]
    DeleteNotAllowed(String),

    /// Deletes are disabled process-wide.
    #[error("delete globally disabled")]
    DeleteDisabled,

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not supported by the driver or dialect.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl StorageError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Driver { .. } => ErrorKind::Storage,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            _ => ErrorKind::Mapping,
        }
    }

    /// Creates a driver error from a message only.
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a driver error wrapping the originating driver failure.
    #[must_use]
    pub fn driver_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Driver {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

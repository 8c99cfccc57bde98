//! Error types for the Quarry engine.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of engine failures.
///
/// Callers that render errors across a language boundary use this instead of
/// matching on every [`CoreError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The engine could not be constructed.
    Construction,
    /// A script failed to parse or execute.
    Script,
    /// A payload did not have the expected shape.
    Serialization,
    /// A filesystem operation failed.
    Io,
}

impl ErrorKind {
    /// Stable name used in rendered error envelopes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Construction => "EngineConstructionError",
            Self::Script => "ScriptError",
            Self::Serialization => "SerializationError",
            Self::Io => "IOError",
        }
    }
}

/// Errors that can occur in Quarry engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON payload could not be decoded.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested engine kind is not available.
    #[error("unknown engine '{kind}', supported engines: {supported}")]
    UnknownEngine {
        /// Requested kind.
        kind: String,
        /// Comma-separated list of kinds compiled in.
        supported: String,
    },

    /// The engine options were rejected.
    #[error("invalid engine options: {message}")]
    InvalidOptions {
        /// Description of the problem.
        message: String,
    },

    /// The database directory is held by another handle or process.
    #[error("database locked: another handle has exclusive access to {path}")]
    DatabaseLocked {
        /// Locked directory.
        path: String,
    },

    /// Script text could not be parsed.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset into the script.
        offset: usize,
        /// Description of the problem.
        message: String,
    },

    /// Script was well-formed but could not be evaluated.
    #[error("evaluation error: {message}")]
    Eval {
        /// Description of the problem.
        message: String,
    },

    /// A mutation was attempted by an immutable query.
    #[error("write operation '{op}' is not allowed in an immutable query")]
    ReadOnlyViolation {
        /// Offending operation.
        op: String,
    },

    /// Stored relation not found.
    #[error("relation not found: {name}")]
    RelationNotFound {
        /// Relation name.
        name: String,
    },

    /// Stored relation already exists.
    #[error("relation already exists: {name}")]
    RelationExists {
        /// Relation name.
        name: String,
    },

    /// Payload had the wrong shape.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the problem.
        message: String,
    },

    /// Backup or snapshot data is malformed.
    #[error("invalid backup format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a parse error.
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    /// Creates an evaluation error.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval {
            message: message.into(),
        }
    }

    /// Creates an invalid options error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a relation not found error.
    pub fn relation_not_found(name: impl Into<String>) -> Self {
        Self::RelationNotFound { name: name.into() }
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::InvalidPayload { .. } | Self::InvalidFormat { .. } => {
                ErrorKind::Serialization
            }
            Self::UnknownEngine { .. } | Self::InvalidOptions { .. } | Self::DatabaseLocked { .. } => {
                ErrorKind::Construction
            }
            Self::Parse { .. }
            | Self::Eval { .. }
            | Self::ReadOnlyViolation { .. }
            | Self::RelationNotFound { .. }
            | Self::RelationExists { .. }
            | Self::InvalidOperation { .. } => ErrorKind::Script,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(CoreError::parse(0, "x").kind(), ErrorKind::Script);
        assert_eq!(
            CoreError::invalid_payload("x").kind(),
            ErrorKind::Serialization
        );
        assert_eq!(
            CoreError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            CoreError::invalid_options("x").kind(),
            ErrorKind::Construction
        );
    }

    #[test]
    fn messages_are_descriptive() {
        let err = CoreError::ReadOnlyViolation { op: ":put".into() };
        assert_eq!(
            err.to_string(),
            "write operation ':put' is not allowed in an immutable query"
        );
        assert_eq!(ErrorKind::Io.as_str(), "IOError");
    }
}

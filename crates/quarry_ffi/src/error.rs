//! Boundary errors and their taxonomy names.

use quarry_core::CoreError;
use thiserror::Error;

/// Result type for boundary operations.
pub type FfiResult<T> = Result<T, FfiError>;

/// Errors surfaced across the C boundary.
#[derive(Debug, Error)]
pub enum FfiError {
    /// Caller-supplied bytes were null, not UTF-8, or held an embedded NUL.
    #[error("invalid {arg}: {reason}")]
    Encoding {
        /// Name of the offending argument.
        arg: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The id does not name an open database.
    #[error("database handle {0} not found")]
    HandleNotFound(i32),

    /// Every handle id has been handed out.
    #[error("no database handle ids left")]
    HandlesExhausted,

    /// The engine reported a failure.
    #[error(transparent)]
    Engine(#[from] CoreError),

    /// The engine panicked; the panic was stopped at the boundary.
    #[error("internal error: {0}")]
    Panic(String),
}

impl FfiError {
    pub(crate) fn encoding(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::Encoding {
            arg,
            reason: reason.into(),
        }
    }

    /// Taxonomy name rendered as the `kind` of a failure envelope.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Encoding { .. } => "EncodingError",
            Self::HandleNotFound(_) => "HandleNotFoundError",
            Self::HandlesExhausted => "EngineConstructionError",
            Self::Engine(e) => e.kind().as_str(),
            Self::Panic(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(FfiError::encoding("script", "null").kind_name(), "EncodingError");
        assert_eq!(FfiError::HandleNotFound(3).kind_name(), "HandleNotFoundError");
        assert_eq!(
            FfiError::from(CoreError::eval("boom")).kind_name(),
            "ScriptError"
        );
        assert_eq!(
            FfiError::from(CoreError::invalid_payload("bad")).kind_name(),
            "SerializationError"
        );
    }

    #[test]
    fn messages() {
        assert_eq!(
            FfiError::HandleNotFound(7).to_string(),
            "database handle 7 not found"
        );
        assert_eq!(
            FfiError::encoding("path", "invalid UTF-8").to_string(),
            "invalid path: invalid UTF-8"
        );
    }
}

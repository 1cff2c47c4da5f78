//! Error types for sqlbridge translation.

use std::fmt;

/// Convenient result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for translation operations.
///
/// A source query either fully translates to a consistent tree or the
/// attempt aborts with one of these; there is no partial-failure mode and
/// nothing here is retryable.
#[derive(Debug)]
pub enum Error {
    /// The source query uses a construct with no SQL translation
    Translation(TranslationError),
    /// An engine invariant was violated (driver/engine desynchronization)
    Internal(InternalError),
}

/// An unsupported source-query shape.
#[derive(Debug)]
pub struct TranslationError {
    pub kind: TranslationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationErrorKind {
    /// Binary operator outside the supported set (bitwise, shift, power)
    UnsupportedBinaryOperator,
    /// Unary operator outside the supported set
    UnsupportedUnaryOperator,
}

/// A bug-class failure: the translation driver and the engine disagree
/// about the state of the query under construction.
#[derive(Debug)]
pub struct InternalError {
    pub kind: InternalErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalErrorKind {
    /// A projection member was requested that was never registered
    UnmappedProjectionMember,
    /// A property was bound against an entity that does not declare it
    UnknownProperty,
    /// A property binding targeted a scalar (non-entity) mapping entry
    ScalarProjectionBinding,
}

impl Error {
    /// Build a translation error for an operator outside the allow-list.
    pub fn unsupported_operator(
        kind: TranslationErrorKind,
        operator: impl fmt::Display,
    ) -> Self {
        Error::Translation(TranslationError {
            kind,
            message: format!("operator {operator} cannot be translated to SQL"),
        })
    }

    /// Build an internal error with the given kind and message.
    pub fn internal(kind: InternalErrorKind, message: impl Into<String>) -> Self {
        Error::Internal(InternalError {
            kind,
            message: message.into(),
        })
    }

    /// Is this an unsupported-query-shape error (as opposed to an engine bug)?
    pub const fn is_translation(&self) -> bool {
        matches!(self, Error::Translation(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Translation(e) => write!(f, "Translation error: {}", e.message),
            Error::Internal(e) => write!(f, "Internal error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_operator_is_translation() {
        let err = Error::unsupported_operator(
            TranslationErrorKind::UnsupportedBinaryOperator,
            "LeftShift",
        );
        assert!(err.is_translation());
        assert!(err.to_string().contains("LeftShift"));
    }

    #[test]
    fn test_internal_error_display() {
        let err = Error::internal(
            InternalErrorKind::UnmappedProjectionMember,
            "no mapping entry for outer.Name",
        );
        assert!(!err.is_translation());
        assert_eq!(
            err.to_string(),
            "Internal error: no mapping entry for outer.Name"
        );
    }
}

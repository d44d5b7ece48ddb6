//! Errors raised while building domain values from untrusted input.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejected input. The message is shown to the API caller as-is, so it
/// names request fields the way clients spell them (`gradeBand`, `score`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    /// A path or body identifier is not a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg) | Self::InvalidId(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_displays_bare_message() {
        let err = DomainError::validation("name is required");
        assert_eq!(err.to_string(), "name is required");
        assert_eq!(err.message(), "name is required");
    }

    #[test]
    fn invalid_id_keeps_offending_input() {
        let err = DomainError::invalid_id("abc");
        assert_eq!(err.to_string(), "invalid identifier: abc");
        assert_eq!(err.message(), "abc");
    }
}

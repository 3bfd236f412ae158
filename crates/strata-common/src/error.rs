//! Strata Error - Unified Error Types
//!
//! Error handling for the sequence format and the expression engine.
//! Separates decode failures (mis-sized or corrupted storage) from user
//! errors (malformed expressions, bad configuration) so the storage and
//! query layers can decide whether to fail a query or skip a row.
//!
//! Key Features:
//! - Decode errors carrying expected vs actual buffer sizes
//! - Parse errors carrying the offending token and its position
//! - User vs storage error classification
//! - Seamless integration with std::io::Error
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    // Decode errors
    #[error("buffer too short: need {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    // Expression errors
    #[error("parse error at position {position} near '{token}': {message}")]
    Parse {
        position: usize,
        token: String,
        message: String,
    },

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

// =============================================================================
// Error Classification
// =============================================================================

impl StrataError {
    /// Build a parse error pointing at `token`.
    pub fn parse(position: usize, token: impl Into<String>, message: impl Into<String>) -> Self {
        StrataError::Parse {
            position,
            token: token.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error signals corrupted or mis-sized storage.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            StrataError::BufferTooShort { .. } | StrataError::InvalidSequence(_)
        )
    }

    /// Returns true if this is a user error (vs storage/system error).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StrataError::Parse { .. }
                | StrataError::InvalidExpression(_)
                | StrataError::Configuration(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = StrataError::BufferTooShort {
            expected: 9,
            actual: 4,
        };
        assert!(err.is_decode_error());
        assert!(!err.is_user_error());

        let err = StrataError::parse(4, ")", "unexpected token");
        assert!(err.is_user_error());
        assert!(!err.is_decode_error());
    }

    #[test]
    fn test_parse_error_display() {
        let err = StrataError::parse(7, "SUMM", "unknown function");
        assert_eq!(
            err.to_string(),
            "parse error at position 7 near 'SUMM': unknown function"
        );
    }
}

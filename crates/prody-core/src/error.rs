//! # Error Types
//!
//! Domain-specific error types for prody-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  prody-core errors (this file)                                         │
//! │  ├── CoreError        - Payload and model errors                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  prody-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  prody-sync errors (separate crate)                                    │
//! │  ├── SyncError        - Config / storage / engine failures             │
//! │  └── ExecutionError   - What an executor reports for one attempt       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core sync model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A typed payload could not be encoded or decoded.
    ///
    /// ## When This Occurs
    /// - `SyncOperation::with_payload` given a value serde cannot encode
    /// - `payload_as::<T>()` called with the wrong target type
    #[error("Invalid payload for {operation_type}: {reason}")]
    InvalidPayload {
        operation_type: String,
        reason: String,
    },

    /// Unknown operation type name.
    #[error("Unknown operation type: {0}")]
    UnknownOperationType(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before an operation is admitted into the queue.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Payload exceeds the size limit.
    #[error("{field} is {size} bytes, limit is {max}")]
    TooLarge {
        field: String,
        size: usize,
        max: usize,
    },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidPayload {
            operation_type: "JOURNAL_CREATE".to_string(),
            reason: "expected struct".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid payload for JOURNAL_CREATE: expected struct"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "idempotency_key".to_string(),
        };
        assert_eq!(err.to_string(), "idempotency_key is required");

        let err = ValidationError::TooLarge {
            field: "data".to_string(),
            size: 10,
            max: 5,
        };
        assert_eq!(err.to_string(), "data is 10 bytes, limit is 5");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}

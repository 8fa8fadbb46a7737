//! # Validation Module
//!
//! Admission checks for operations entering the sync queue.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Domain repository                                            │
//! │  └── Builds the payload for its own entity                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Sync engine enqueue                                          │
//! │  └── THIS MODULE: ids, key, entity reference, payload size             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Executor / remote store                                      │
//! │  └── Business validation of the payload contents                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The payload itself is never parsed here; only its size is bounded.

use crate::error::ValidationError;
use crate::types::SyncOperation;
use crate::{MAX_ENTITY_ID_LEN, MAX_PAYLOAD_BYTES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a UUID string (operation id or idempotency key).
///
/// ## Example
/// ```rust
/// use prody_core::validation::validate_uuid;
///
/// assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(value).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates an optional entity reference.
///
/// ## Rules
/// - Absent is fine (payload-only operations)
/// - When present: non-blank, at most [`MAX_ENTITY_ID_LEN`] characters
pub fn validate_entity_id(entity_id: Option<&str>) -> ValidationResult<()> {
    let Some(entity_id) = entity_id else {
        return Ok(());
    };

    if entity_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "entity_id".to_string(),
        });
    }

    if entity_id.chars().count() > MAX_ENTITY_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "entity_id".to_string(),
            max: MAX_ENTITY_ID_LEN,
        });
    }

    Ok(())
}

/// Validates the payload size.
pub fn validate_payload(data: &str) -> ValidationResult<()> {
    if data.len() > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            field: "data".to_string(),
            size: data.len(),
            max: MAX_PAYLOAD_BYTES,
        });
    }

    Ok(())
}

// =============================================================================
// Operation Validator
// =============================================================================

/// Validates an operation before it is admitted into the queue.
pub fn validate_operation(operation: &SyncOperation) -> ValidationResult<()> {
    validate_uuid("id", &operation.id)?;
    validate_uuid("idempotency_key", &operation.idempotency_key)?;
    validate_entity_id(operation.entity_id.as_deref())?;
    validate_payload(&operation.data)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationType;

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }

    #[test]
    fn test_validate_entity_id() {
        assert!(validate_entity_id(None).is_ok());
        assert!(validate_entity_id(Some("journal-42")).is_ok());
        assert!(validate_entity_id(Some("  ")).is_err());
        assert!(validate_entity_id(Some(&"x".repeat(MAX_ENTITY_ID_LEN + 1))).is_err());
    }

    #[test]
    fn test_validate_payload_size() {
        assert!(validate_payload("").is_ok());
        assert!(validate_payload(&"a".repeat(MAX_PAYLOAD_BYTES)).is_ok());
        assert!(matches!(
            validate_payload(&"a".repeat(MAX_PAYLOAD_BYTES + 1)),
            Err(ValidationError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_operation() {
        let op = SyncOperation::new(OperationType::SettingsUpdate, None, "{}", 0);
        assert!(validate_operation(&op).is_ok());

        let mut keyless = op.clone();
        keyless.idempotency_key = String::new();
        assert!(validate_operation(&keyless).is_err());
    }
}

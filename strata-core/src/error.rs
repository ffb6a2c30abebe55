//! Error types for STRATA operations

use crate::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: EntityId },

    #[error("Version conflict on {entity} {id}: expected {expected}, stored {actual}")]
    OptimisticConflict {
        entity: String,
        id: EntityId,
        expected: i64,
        actual: i64,
    },

    #[error("Duplicate id {id} in batch for {entity}")]
    DuplicateId { entity: String, id: EntityId },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },
}

// ============================================================================
// VALIDATION
// ============================================================================

/// A single field-level constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Field the violation applies to
    pub field: String,
    /// Human readable message
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Entity-level validation failure carrying one or more field messages.
#[derive(Debug, Clone, Default, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Validation failed: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an error holding a single violation.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, message)],
        }
    }

    /// Record a violation.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, message));
    }

    /// Add a violation when `condition` does not hold.
    pub fn require(&mut self, condition: bool, field: &str, message: &str) {
        if !condition {
            self.push(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// `Ok(())` when nothing was collected, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Cache collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization failed for {cache}: {reason}")]
    Serialization { cache: String, reason: String },
}

/// Audit sink errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("Audit snapshot serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate {kind}: {value}")]
    Duplicate { kind: String, value: String },
}

// ============================================================================
// MASTER ERROR
// ============================================================================

/// Master error type returned by every engine operation.
#[derive(Debug, Clone, Error)]
pub enum StrataError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Access denied: missing permission '{permission}'")]
    AccessDenied { permission: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Optimistic conflict on {entity} {id}")]
    OptimisticConflict { entity: String, id: EntityId },

    #[error("Hook '{hook}' failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal fault: {reason}")]
    Internal { reason: String },
}

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;

impl StrataError {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn hook(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::OptimisticConflict { .. } => ErrorCode::Conflict,
            Self::Hook { .. } | Self::Config(_) | Self::Internal { .. } => ErrorCode::ServerError,
        }
    }

    /// Fold any error raised while preparing an entity for validation into
    /// a validation failure. Validation errors pass through unchanged.
    pub fn into_validation(self) -> Self {
        match self {
            Self::Validation(_) => self,
            other => Self::Validation(ValidationError::field("entity", other.to_string())),
        }
    }
}

impl From<StorageError> for StrataError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound {
                entity,
                id: id.to_string(),
            },
            StorageError::OptimisticConflict { entity, id, .. } => {
                Self::OptimisticConflict { entity, id }
            }
            other => Self::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl From<CacheError> for StrataError {
    fn from(err: CacheError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<AuditError> for StrataError {
    fn from(err: AuditError) -> Self {
        Self::internal(err.to_string())
    }
}

// ============================================================================
// CLIENT-FACING ERROR SHAPE
// ============================================================================

/// Stable, client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Caller lacks the permission for the operation
    AccessDenied,
    /// Entity does not exist or is hidden by tenant or soft-delete filters
    NotFound,
    /// Entity failed constraint checks
    ValidationError,
    /// Concurrent modification detected
    Conflict,
    /// Unexpected collaborator failure
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::NotFound => "not_found",
            Self::ValidationError => "validation_error",
            Self::Conflict => "conflict",
            Self::ServerError => "server_error",
        }
    }

    /// HTTP status a transport layer should use for this code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AccessDenied => 403,
            Self::NotFound => 404,
            Self::ValidationError => 400,
            Self::Conflict => 409,
            Self::ServerError => 500,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "You don't have permission to access this resource",
            Self::NotFound => "The requested resource was not found",
            Self::ValidationError => "Validation failed",
            Self::Conflict => "The resource was modified concurrently",
            Self::ServerError => "An unexpected error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable error body handed to transport layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldViolation>,
}

impl From<&StrataError> for ErrorResponse {
    fn from(err: &StrataError) -> Self {
        let code = err.code();
        let (message, details) = match err {
            StrataError::Validation(v) => (code.default_message().to_string(), v.violations.clone()),
            // Internal details stay in the logs.
            StrataError::Hook { .. } | StrataError::Config(_) | StrataError::Internal { .. } => {
                (code.default_message().to_string(), Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };
        Self {
            code,
            message,
            details,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_storage_error_display_conflict() {
        let err = StorageError::OptimisticConflict {
            entity: "Invoice".to_string(),
            id: Uuid::nil(),
            expected: 1,
            actual: 2,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Version conflict"));
        assert!(msg.contains("Invoice"));
        assert!(msg.contains("expected 1"));
    }

    #[test]
    fn test_validation_error_joins_violations() {
        let mut err = ValidationError::new();
        err.push("name", "must not be blank");
        err.push("amount", "must be positive");
        let msg = err.to_string();
        assert_eq!(
            msg,
            "Validation failed: name: must not be blank, amount: must be positive"
        );
    }

    #[test]
    fn test_validation_into_result() {
        assert!(ValidationError::new().into_result().is_ok());

        let mut err = ValidationError::new();
        err.require(false, "email", "required");
        err.require(true, "name", "required");
        let failed = err.into_result().unwrap_err();
        assert_eq!(failed.violations.len(), 1);
        assert_eq!(failed.violations[0].field, "email");
    }

    #[test]
    fn test_storage_conflict_maps_to_optimistic_conflict() {
        let err = StrataError::from(StorageError::OptimisticConflict {
            entity: "Invoice".to_string(),
            id: Uuid::nil(),
            expected: 0,
            actual: 1,
        });
        assert!(matches!(err, StrataError::OptimisticConflict { .. }));
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_storage_backend_maps_to_internal() {
        let err = StrataError::from(StorageError::Backend {
            reason: "disk".to_string(),
        });
        assert!(matches!(err, StrataError::Internal { .. }));
        assert_eq!(err.code().status_code(), 500);
    }

    #[test]
    fn test_into_validation_wraps_other_errors() {
        let err = StrataError::hook("normalize", "boom").into_validation();
        match err {
            StrataError::Validation(v) => assert!(v.violations[0].message.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }

        let original = StrataError::Validation(ValidationError::field("name", "blank"));
        match original.into_validation() {
            StrataError::Validation(v) => assert_eq!(v.violations[0].field, "name"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_response_hides_internal_reason() {
        let err = StrataError::internal("connection refused to 10.0.0.3");
        let body = ErrorResponse::from(&err);
        assert_eq!(body.code, ErrorCode::ServerError);
        assert!(!body.message.contains("10.0.0.3"));
    }

    #[test]
    fn test_error_response_carries_validation_details() {
        let err = StrataError::from(ValidationError::field("amount", "must be positive"));
        let body = ErrorResponse::from(&err);
        assert_eq!(body.code.as_str(), "validation_error");
        assert_eq!(body.details.len(), 1);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "validation_error");
    }

    #[test]
    fn test_access_denied_code() {
        let err = StrataError::AccessDenied {
            permission: "invoice:delete".to_string(),
        };
        assert_eq!(err.code().status_code(), 403);
        assert!(err.to_string().contains("invoice:delete"));
    }
}

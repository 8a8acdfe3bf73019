use thiserror::Error;

use crate::model::EntityKind;

/// Main error type for praxis
#[derive(Error, Debug)]
pub enum PraxisError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Attribute (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored data that no longer parses (timestamps, enums)
    #[error("Parse error: {0}")]
    Parse(String),

    /// The blocking task running a database closure panicked or was cancelled
    #[error("Database task failed: {0}")]
    Task(String),

    /// An entity with this (kind, name) already exists
    #[error("Duplicate name: {kind} \"{name}\" already exists")]
    DuplicateName { kind: EntityKind, name: String },

    /// No entity with this (kind, name)
    #[error("Not found: {kind} \"{name}\"")]
    NotFound { kind: EntityKind, name: String },

    /// An enum, range or length invariant was violated
    #[error("Invalid attribute \"{field}\": {message}")]
    InvalidAttribute { field: String, message: String },

    /// Embedding vector length does not match the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl PraxisError {
    /// Shorthand for the invalid-attribute variant, used all over validation.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        PraxisError::InvalidAttribute {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        PraxisError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Convenient Result type using PraxisError
pub type Result<T> = std::result::Result<T, PraxisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PraxisError::Config("missing db_path".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing db_path"));
    }

    #[test]
    fn test_duplicate_name_display() {
        let err = PraxisError::DuplicateName {
            kind: EntityKind::Methodology,
            name: "Scrum".to_string(),
        };
        assert!(err.to_string().contains("Methodology"));
        assert!(err.to_string().contains("Scrum"));
    }

    #[test]
    fn test_invalid_attribute_display() {
        let err = PraxisError::invalid("priority", "expected one of low, medium, high, critical");
        let msg = err.to_string();
        assert!(msg.contains("priority"));
        assert!(msg.contains("critical"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = PraxisError::DimensionMismatch {
            expected: 1536,
            actual: 3,
        };
        assert!(err.to_string().contains("1536"));
        assert!(err.to_string().contains("3"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: PraxisError = rusqlite_err.into();
        assert!(matches!(err, PraxisError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PraxisError = io_err.into();
        assert!(matches!(err, PraxisError::Io(_)));
    }
}

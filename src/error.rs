//! Error types for the schema store

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Boxed cause carried by wrapped errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Schema store errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema not found: {name}")]
    NotFound { name: String },

    #[error("Schema version not found: {name} v{version}")]
    VersionNotFound { name: String, version: u32 },

    #[error("No schema registered with id {0}")]
    IdNotFound(u32),

    #[error("Metadata not found for schema: {0}")]
    MetadataNotFound(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Compatibility error: {0}")]
    Compatibility(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SchemaError {
    /// A validation failure with no underlying cause
    pub fn validation(message: impl Into<String>) -> Self {
        SchemaError::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// A validation failure wrapping the error that caused it
    pub fn validation_caused_by(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        SchemaError::Validation {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this error means the requested name, version or metadata is absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchemaError::NotFound { .. }
                | SchemaError::VersionNotFound { .. }
                | SchemaError::IdNotFound(_)
                | SchemaError::MetadataNotFound(_)
        )
    }

    /// Whether this error is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchemaError::Validation { .. } | SchemaError::Json(_) | SchemaError::Yaml(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_kinds() {
        assert!(SchemaError::NotFound { name: "a".into() }.is_not_found());
        assert!(SchemaError::VersionNotFound { name: "a".into(), version: 2 }.is_not_found());
        assert!(SchemaError::MetadataNotFound("a".into()).is_not_found());
        assert!(!SchemaError::validation("bad").is_not_found());
    }

    #[test]
    fn test_validation_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SchemaError::validation_caused_by("cannot write v1.avsc", cause);
        assert!(err.is_validation());
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Validation error: cannot write v1.avsc");
    }
}

//! Error types for cosmograph.

use thiserror::Error;

/// Result type alias using cosmograph's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cosmograph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity not found in its per-type table
    #[error("Entity not found: {0}/{1}")]
    EntityNotFound(crate::models::EntityType, uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Dimension-reduction service call failed
    #[error("Reduction error: {0}")]
    Reduction(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("matrix for user".to_string());
        assert_eq!(err.to_string(), "Not found: matrix for user");
    }

    #[test]
    fn test_error_display_entity_not_found() {
        let id = Uuid::nil();
        let err = Error::EntityNotFound(EntityType::Concept, id);
        assert_eq!(err.to_string(), format!("Entity not found: concept/{}", id));
    }

    #[test]
    fn test_error_display_embedding() {
        let err = Error::Embedding("backend returned 500".to_string());
        assert_eq!(err.to_string(), "Embedding error: backend returned 500");
    }

    #[test]
    fn test_error_display_reduction() {
        let err = Error::Reduction("fit timed out".to_string());
        assert_eq!(err.to_string(), "Reduction error: fit timed out");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("empty text".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty text");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}

//! Error taxonomy shared by every service
//!
//! Each variant is terminal for the operation that raised it; nothing here is
//! retried automatically. Clients distinguish failures through [`ErrorKind`].

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Permission,
    NotFound,
    StateConflict,
    ExternalService,
    Timeout,
    Storage,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Permission(_) => ErrorKind::Permission,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::StateConflict(_) => ErrorKind::StateConflict,
            Error::ExternalService(_) => ErrorKind::ExternalService,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            Error::StateConflict("version not published".into()).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            Error::Storage(sqlx::Error::RowNotFound).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("workflow 7");
        assert_eq!(err.to_string(), "workflow 7 not found");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let encoded = serde_json::to_string(&ErrorKind::ExternalService).unwrap();
        assert_eq!(encoded, "\"external_service\"");
    }
}

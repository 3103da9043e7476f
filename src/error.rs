//! Error types for the time-series engine.
//!
//! The query path returns these as typed results; the boundary layer maps
//! them to caller-visible status through the `tonic::Status` conversion at
//! the bottom of this module.

use std::fmt;
use std::result;
use thiserror::Error;
use tonic::Status;

/// A specialized Result type for engine operations.
pub type Result<T> = result::Result<T, Error>;

/// Entity kinds that can be reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Dataset,
    Channel,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Dataset => write!(f, "Dataset"),
            Entity::Channel => write!(f, "Channel"),
        }
    }
}

/// The error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced dataset or channel does not exist
    #[error("{0} {1} not found")]
    NotFound(Entity, String),

    /// Caller does not own the dataset behind the requested entity
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// A channel could not be normalized (empty, unconvertible, malformed)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A chunk write failed; earlier chunks of the channel stay committed
    #[error("Ingestion failed for channel {channel} at row offset {row_offset}: {reason}")]
    Ingestion {
        channel: String,
        row_offset: u64,
        reason: String,
    },

    /// Storage engine unreachable
    #[error("Storage connection failed: {0}")]
    Connection(String),

    /// Request parameters out of bounds or unparsable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage engine rejected a statement
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn channel_not_found(id: impl fmt::Display) -> Self {
        Error::NotFound(Entity::Channel, id.to_string())
    }

    pub fn dataset_not_found(id: impl fmt::Display) -> Self {
        Error::NotFound(Entity::Dataset, id.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(..))
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Error::Arrow(err.to_string())
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(..) => Status::not_found(err.to_string()),
            Error::Forbidden(msg) => Status::permission_denied(msg),
            Error::InvalidData(msg) => Status::invalid_argument(msg),
            Error::Validation(msg) => Status::invalid_argument(msg),
            Error::Connection(msg) => Status::unavailable(msg),
            Error::Config(msg) => Status::failed_precondition(format!("Config error: {}", msg)),
            other => Status::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_error_messages() {
        let err = Error::channel_not_found("abc");
        assert_eq!(err.to_string(), "Channel abc not found");

        let err = Error::Ingestion {
            channel: "g/c".into(),
            row_offset: 2_000_000,
            reason: "disk full".into(),
        };
        assert_eq!(
            err.to_string(),
            "Ingestion failed for channel g/c at row offset 2000000: disk full"
        );
    }

    #[test]
    fn test_status_mapping() {
        let status: Status = Error::dataset_not_found("d1").into();
        assert_eq!(status.code(), Code::NotFound);

        let status: Status = Error::Forbidden("nope".into()).into();
        assert_eq!(status.code(), Code::PermissionDenied);

        let status: Status = Error::Validation("points".into()).into();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status: Status = Error::Connection("down".into()).into();
        assert_eq!(status.code(), Code::Unavailable);

        let status: Status = Error::Storage("boom".into()).into();
        assert_eq!(status.code(), Code::Internal);
    }
}

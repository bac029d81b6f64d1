//! Centralized error types for mailblast using thiserror.
//!
//! Per-record delivery outcomes are not errors: they are terminal
//! [`Status`](crate::campaign::Status) values. The types here cover
//! configuration, data loading, transport sessions, and run admission.

use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("invalid placeholder mapping: {0}")]
    InvalidMapping(String),
    #[error("invalid sender: {0}")]
    InvalidSender(String),
}

/// Errors related to loading recipient records.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to read recipients from {path}: {message}")]
    ReadError { path: String, message: String },
    #[error("malformed CSV record: {0}")]
    MalformedRecord(String),
    #[error("no recipient records found")]
    Empty,
    #[error("address list contained no syntactically valid address")]
    NoValidAddresses,
}

/// Errors from one transport session (connect, authenticate, submit, quit).
///
/// Classification drives the retry policy: authentication rejections are
/// never retried (credentials are invariant across attempts), everything
/// else is treated as transient.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("submission failed: {0}")]
    Submit(String),
    #[error("could not build message: {0}")]
    BuildMessage(String),
}

impl TransportError {
    /// Whether another attempt with the same inputs could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Auth(_))
    }
}

/// Reasons a run start command is rejected, with no state change.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("campaign has no records")]
    NoRecords,
    #[error("body template is empty")]
    EmptyTemplate,
    #[error("no recipient column selected")]
    NoRecipientColumn,
    #[error("transport not verified: run a connectivity pre-check first")]
    NotVerified,
    #[error("a run is already in progress")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::LoadError("file not found".to_string());
        assert_eq!(
            err.to_string(),
            "failed to load config file: file not found"
        );

        let err = ConfigError::InvalidMapping("placeholder 'a b' is not an identifier".to_string());
        assert_eq!(
            err.to_string(),
            "invalid placeholder mapping: placeholder 'a b' is not an identifier"
        );
    }

    #[test]
    fn data_error_display() {
        let err = DataError::ReadError {
            path: "list.csv".to_string(),
            message: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to read recipients from list.csv: permission denied"
        );

        assert_eq!(DataError::Empty.to_string(), "no recipient records found");
    }

    #[test]
    fn transport_error_retryability() {
        assert!(!TransportError::Auth("535".to_string()).is_retryable());
        assert!(TransportError::Connection("timeout".to_string()).is_retryable());
        assert!(TransportError::Submit("451 try later".to_string()).is_retryable());
        assert!(TransportError::BuildMessage("bad header".to_string()).is_retryable());
    }

    #[test]
    fn start_error_display() {
        assert_eq!(
            StartError::AlreadyRunning.to_string(),
            "a run is already in progress"
        );
        assert_eq!(
            StartError::NotVerified.to_string(),
            "transport not verified: run a connectivity pre-check first"
        );
    }
}

//! Error handling for LX200R
//!
//! This module provides the structured error types that can escape a test run
//! or a single-command probe. Per-command anomalies (timeouts, format
//! mismatches) are not errors; they are recorded as [`FailureReason`] on the
//! command's outcome and never propagate.

use std::fmt;
use std::io;
use std::error::Error as StdError;

use serde::Serialize;

/// Top-level error type for LX200R operations
#[derive(Debug, Clone, PartialEq)]
pub enum LX200Error {
    /// Transport open/write/read failures
    Connection(ConnectionError),
    /// Command catalog lookups
    Catalog(CatalogError),
    /// The link is held by an active run
    Busy,
    /// Configuration errors
    Config(ConfigError),
}

/// Transport level failures. Fatal to the current run.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// The transport could not be opened
    OpenFailed { address: String, reason: String },
    /// Writing the command bytes failed
    WriteFailed { reason: String },
    /// Reading or polling the transport failed
    ReadFailed { reason: String },
    /// The remote side closed the stream
    Closed,
}

/// Command catalog errors
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// No command with this name exists
    NotFound { name: String },
    /// A second definition reused an existing name
    DuplicateName { name: String },
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid configuration parameter
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Configuration file error
    FileError { path: String, error: String },
}

/// Why a single command failed. Localized to one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// Nothing was received before the deadline
    Timeout,
    /// Something was received but it did not match the expected format
    FormatMismatch,
}

impl fmt::Display for LX200Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LX200Error::Connection(err) => write!(f, "Connection error: {err}"),
            LX200Error::Catalog(err) => write!(f, "Catalog error: {err}"),
            LX200Error::Busy => write!(f, "Link busy: a test run currently owns the transport"),
            LX200Error::Config(err) => write!(f, "Configuration error: {err}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::OpenFailed { address, reason } =>
                write!(f, "Failed to open {address}: {reason}"),
            ConnectionError::WriteFailed { reason } =>
                write!(f, "Write failed: {reason}"),
            ConnectionError::ReadFailed { reason } =>
                write!(f, "Read failed: {reason}"),
            ConnectionError::Closed =>
                write!(f, "Connection closed by remote device"),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound { name } =>
                write!(f, "Command '{name}' not found in catalog"),
            CatalogError::DuplicateName { name } =>
                write!(f, "Command '{name}' is defined more than once"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } =>
                write!(f, "Invalid configuration parameter '{parameter}' = '{value}': {reason}"),
            ConfigError::FileError { path, error } =>
                write!(f, "Configuration file error '{path}': {error}"),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "no response received (timeout)"),
            FailureReason::FormatMismatch => write!(f, "response does not match expected format"),
        }
    }
}

impl StdError for LX200Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            LX200Error::Connection(err) => Some(err),
            LX200Error::Catalog(err) => Some(err),
            LX200Error::Busy => None,
            LX200Error::Config(err) => Some(err),
        }
    }
}

impl StdError for ConnectionError {}
impl StdError for CatalogError {}
impl StdError for ConfigError {}

impl From<ConnectionError> for LX200Error {
    fn from(err: ConnectionError) -> Self {
        LX200Error::Connection(err)
    }
}

impl From<CatalogError> for LX200Error {
    fn from(err: CatalogError) -> Self {
        LX200Error::Catalog(err)
    }
}

impl From<ConfigError> for LX200Error {
    fn from(err: ConfigError) -> Self {
        LX200Error::Config(err)
    }
}

// Convert from standard IO errors
impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ConnectionError::Closed,
            io::ErrorKind::WriteZero => ConnectionError::WriteFailed {
                reason: err.to_string(),
            },
            _ => ConnectionError::ReadFailed {
                reason: format!("IO Error: {err}"),
            },
        }
    }
}

impl From<io::Error> for LX200Error {
    fn from(err: io::Error) -> Self {
        LX200Error::Connection(err.into())
    }
}

/// Result type alias for LX200R operations
pub type LX200Result<T> = Result<T, LX200Error>;

/// Specialized result types for different components
pub type ConnectionResult<T> = Result<T, ConnectionError>;
pub type CatalogResult<T> = Result<T, CatalogError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_display() {
        let msg = LX200Error::Busy.to_string();
        assert!(msg.contains("busy"));
    }

    #[test]
    fn test_io_error_mapping() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(ConnectionError::from(reset), ConnectionError::Closed);

        let other = io::Error::new(io::ErrorKind::Other, "boom");
        match ConnectionError::from(other) {
            ConnectionError::ReadFailed { reason } => assert!(reason.contains("boom")),
            e => panic!("unexpected mapping: {e:?}"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        let err: LX200Error = CatalogError::NotFound { name: "Nope".to_string() }.into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("Nope"));
    }
}

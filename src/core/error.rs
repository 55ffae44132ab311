/// Data Helper Error Module
///
/// This module defines the error taxonomy shared by every data access
/// operation. A missing record is never an error: single-row reads and
/// existence checks report it as a structured "no result".
use thiserror::Error;

/// Error type for every fallible data helper operation.
///
/// The variants follow the failure classes a caller needs to tell apart:
/// - Configuration lookups (unknown connection id, missing sequence templates)
/// - Connection open and ping failures
/// - Transaction state violations
/// - Empty required arguments
/// - Statement failures reported by a driver
#[derive(Error, Debug)]
pub enum DataHelperError {
    /// Missing or invalid connection configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening or pinging the database failed; wraps the driver's message
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation requires a transaction that is not open, or opens one that already is
    #[error("State error: {0}")]
    State(String),

    /// An argument required by the operation was empty
    #[error("Validation error: {0}")]
    Validation(String),

    /// A statement failed at the driver
    #[error("Execution error: {0}")]
    Execution(String),

    /// Statement failures raised by the bundled SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system errors while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration files
    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Type alias for Result to use DataHelperError as the error type.
pub type Result<T> = std::result::Result<T, DataHelperError>;

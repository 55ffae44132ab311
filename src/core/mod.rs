/// Core Module for the data helper
///
/// This module contains the execution context and its statement-issuing
/// operations, plus the error type shared across the crate.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DataHelperError, Result};

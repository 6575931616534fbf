//! Common error types for scanpipe

use thiserror::Error;

/// Common result type for scanpipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the scanpipe processes
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Layout document serialization error
    #[error("Layout document error: {0}")]
    Layout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<quick_xml::de::DeError> for Error {
    fn from(e: quick_xml::de::DeError) -> Self {
        Error::Layout(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Layout(e.to_string())
    }
}

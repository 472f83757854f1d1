//! Error types for the audio core

use thiserror::Error;

/// Reasons a source could not be opened for a deck
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO failure: {0}")]
    IoFailure(String),
}

/// Errors raised by deck parameter setters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("Invalid {parameter}: {value}")]
    InvalidArgument {
        parameter: &'static str,
        value: f64,
    },
}

impl AudioError {
    pub(crate) fn invalid(parameter: &'static str, value: f64) -> Self {
        Self::InvalidArgument { parameter, value }
    }
}

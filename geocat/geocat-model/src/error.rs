//! Error types for parsing resource names, tile keys and service responses.

use std::fmt;

/// Errors that can occur while parsing model values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A resource name did not follow the `hrn:` scheme.
    InvalidHrn { input: String, detail: &'static str },
    /// A quadkey string or tile coordinate was out of range.
    InvalidTileKey { input: String, detail: &'static str },
    /// A service response could not be deserialized.
    InvalidResponse {
        context: &'static str,
        detail: String,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHrn { input, detail } => {
                write!(f, "invalid resource name {input:?}: {detail}")
            }
            Self::InvalidTileKey { input, detail } => {
                write!(f, "invalid tile key {input:?}: {detail}")
            }
            Self::InvalidResponse { context, detail } => {
                write!(f, "invalid {context} response: {detail}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

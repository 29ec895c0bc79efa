use thiserror::Error;

use super::types::TransformParams;

/// Transform errors, reported per event and never fatal to the process
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("input is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
    #[error("malformed content: {0}")]
    MalformedContent(String),
    #[error("invalid transform option '{option}': {message}")]
    InvalidOption { option: String, message: String },
}

impl From<csv::Error> for TransformError {
    fn from(value: csv::Error) -> Self {
        TransformError::MalformedContent(value.to_string())
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(value: serde_json::Error) -> Self {
        TransformError::MalformedContent(value.to_string())
    }
}

/// Pure content transform
///
/// Implementations receive the full input in memory and return the full
/// output. They must not perform I/O: reading the input object and writing
/// the result belong to the event handler.
pub trait Transform: Send + Sync {
    fn apply(&self, input: &[u8], params: &TransformParams) -> Result<Vec<u8>, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(&[u8], &TransformParams) -> Result<Vec<u8>, TransformError> + Send + Sync,
{
    fn apply(&self, input: &[u8], params: &TransformParams) -> Result<Vec<u8>, TransformError> {
        self(input, params)
    }
}

use serde_json::Value;

use super::traits::TransformError;

/// Rule parameters handed to a transform alongside the content
#[derive(Debug, Clone, Default)]
pub struct TransformParams {
    pub file_type: String,
    /// Rule-specific options from the rule document (arbitrary JSON)
    pub options: Value,
}

impl TransformParams {
    pub fn new(file_type: impl Into<String>, options: Value) -> Self {
        Self {
            file_type: file_type.into(),
            options,
        }
    }

    pub fn bool_option(&self, name: &str, default: bool) -> Result<bool, TransformError> {
        match self.options.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(value)) => Ok(*value),
            Some(other) => Err(TransformError::InvalidOption {
                option: name.to_string(),
                message: format!("expected a boolean, got {other}"),
            }),
        }
    }

    pub fn usize_option(&self, name: &str, default: usize) -> Result<usize, TransformError> {
        match self.options.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| TransformError::InvalidOption {
                    option: name.to_string(),
                    message: format!("expected a non-negative integer, got {value}"),
                }),
        }
    }
}

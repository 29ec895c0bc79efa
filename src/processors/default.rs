use super::traits::{Transform, TransformError};
use super::types::TransformParams;

/// Copies the input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn apply(&self, input: &[u8], _params: &TransformParams) -> Result<Vec<u8>, TransformError> {
        Ok(input.to_vec())
    }
}

/// Re-serializes a JSON document without insignificant whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompact;

impl Transform for JsonCompact {
    fn apply(&self, input: &[u8], _params: &TransformParams) -> Result<Vec<u8>, TransformError> {
        let document: serde_json::Value = serde_json::from_slice(input)?;
        Ok(serde_json::to_vec(&document)?)
    }
}

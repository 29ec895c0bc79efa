//! Content transforms keyed by transform id
//!
//! ## Key Components
//!
//! - [`Transform`] - Pure `bytes -> bytes` strategy, free of I/O
//! - [`ProcessorRegistry`] - Maps transform ids to transforms, populated at startup
//! - [`TransformParams`] - Rule options passed to a transform
//!
//! ## Example
//!
//! ```rust
//! use filegate::processors::{ProcessorRegistry, TransformParams};
//!
//! let registry = ProcessorRegistry::with_defaults();
//! let params = TransformParams::new("csv", serde_json::Value::Null);
//! let output = registry.process("csv_normalize", b" a , b \n", &params).unwrap();
//! assert_eq!(output, b"a,b\n");
//! ```

mod default;
mod registry;
mod tabular;
mod traits;
mod types;

pub use default::{JsonCompact, Passthrough};
pub use registry::{ProcessorRegistry, RegistryError};
pub use tabular::{CsvDedupe, CsvNormalize};
pub use traits::{Transform, TransformError};
pub use types::TransformParams;

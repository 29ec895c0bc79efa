//! Object-created event handling
//!
//! [`EventHandler`] turns one trigger payload into exactly one
//! [`ProcessingResult`]: resolve the rule for the file type, consult the
//! blacklist, run the transform, write the output.

mod event;
mod outcome;
mod runner;

pub use event::{DecodeError, Event};
pub use outcome::{ErrorInfo, ErrorKind, ProcessError, ProcessingResult, SkipReason, Status};
pub use runner::{EventHandler, HandlerOptions, HandlerState, SOURCE_MARKER_SUFFIX, output_key};

//! HTTP push endpoint
//!
//! The hosting platform delivers each trigger payload as `POST /`. The status
//! code is the acknowledgement: 200 acks the message (success, skip or
//! permanent failure) and 503 asks for redelivery.

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;

pub use error::ApiError;
pub use server::{router, run};
pub use state::AppState;

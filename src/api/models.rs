//! Response bodies for the push endpoint's auxiliary routes
//!
//! `POST /` answers with the event's
//! [`ProcessingResult`](crate::worker::ProcessingResult) directly.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub rules: usize,
    pub rule_source: String,
}

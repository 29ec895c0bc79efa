use axum::{Json, body::Body, extract::State, http::StatusCode, response::IntoResponse};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use super::{
    error::ApiError,
    models::HealthResponse,
    state::AppState,
};

/// Push delivery endpoint (POST /)
///
/// The body is a trigger payload in any supported shape. Decoding problems
/// are part of the event outcome, not request errors, so a malformed payload
/// is acked instead of being redelivered forever.
pub async fn push(
    State(state): State<AppState>,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    // Decompression already handled by RequestDecompressionLayer middleware
    let payload = read_body(body, state.max_payload_bytes).await?;

    let result = state.handler.handle(&payload).await;

    let status = if result.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    Ok((status, Json(result)))
}

async fn read_body(body: Body, limit: usize) -> Result<bytes::Bytes, ApiError> {
    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::Body(err.to_string())
        }
    })?;

    Ok(collected.to_bytes())
}

/// Liveness plus a summary of the active rules (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let rules = state.resolver.current();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        rules: rules.len(),
        rule_source: state.resolver.source().to_string(),
    })
}

/// Outcome counters (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

use super::ApiError;
use crate::server::SharedState;
use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};

pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::internal("Failed to encode metrics", e))?;

    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer))
}

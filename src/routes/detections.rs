use super::ApiError;
use crate::{bounding_box::DetectionResponse, normalizer::normalize, server::SharedState};
use axum::{
    extract::{Path, State},
    response::Json,
};
use std::time::Instant;
use tracing::instrument;

const DETECTION_FAILED: &str = "Object detection failed due to an unexpected error";

/// Runs object detection on a previously uploaded image.
#[instrument(skip(state))]
pub async fn detect_objects(
    State(state): State<SharedState>,
    Path(image_id): Path<String>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let image_path = state
        .file_store
        .find_by_substring(&image_id)
        .await
        .map_err(|e| ApiError::internal(DETECTION_FAILED, e))?
        .ok_or_else(|| ApiError::NotFound(format!("Image with ID '{}' not found", image_id)))?;

    let image_data = state
        .file_store
        .read(&image_path)
        .await
        .map_err(|e| ApiError::internal("Failed to read image file", e))?;

    let started = Instant::now();
    let result = state.vision_client.analyze(image_data).await;
    state
        .metrics
        .record_detection_duration(started.elapsed().as_millis() as u64);

    let response = result.inspect_err(|e| state.metrics.record_upstream_failure(e.kind()))?;
    let boxes = normalize(&response);

    tracing::info!(
        "Successfully detected {} objects in image {}",
        boxes.len(),
        image_id
    );
    state.metrics.record_detection(boxes.len());

    Ok(Json(DetectionResponse { boxes }))
}

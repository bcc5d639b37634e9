mod detections;
mod error;
mod health;
mod metrics;
mod upload;


use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use error::{ApiError, ErrorBody, INTERNAL_ERROR_DETAIL};

pub fn api_routes() -> Router<SharedState> {
    let api = Router::new()
        .route("/health", get(health::healthcheck))
        .route("/upload", post(upload::upload_files))
        .route("/detections/{image_id}", get(detections::detect_objects));

    Router::new()
        .route("/", get(health::root))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api", api)
}

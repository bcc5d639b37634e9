use serde::{Deserialize, Serialize};

/// One detected object. Coordinates are absolute pixel offsets of the
/// top-left corner plus width and height, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub boxes: Vec<BoundingBox>,
}

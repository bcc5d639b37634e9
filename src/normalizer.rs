use crate::bounding_box::BoundingBox;
use serde_json::{Map, Value};
use thiserror::Error;

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug, PartialEq)]
enum EntryError {
    #[error("entry is not an object")]
    NotAnObject,
    #[error("`rectangle` is not an object")]
    RectangleNotAnObject,
    #[error("`{0}` is not numeric: {1}")]
    NotNumeric(&'static str, Value),
    #[error("`object` label is not a string: {0}")]
    LabelNotAString(Value),
}

/// Maps a provider analyze response onto bounding boxes.
///
/// A response without an `objects` array yields no boxes. Entries that
/// cannot be read are skipped and the rest are kept in their original order.
pub fn normalize(response: &Value) -> Vec<BoundingBox> {
    let Some(objects) = response.get("objects").and_then(Value::as_array) else {
        tracing::warn!("No 'objects' field in vision API response");
        return Vec::new();
    };

    objects
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| match parse_entry(entry) {
            Ok(bbox) => Some(bbox),
            Err(e) => {
                tracing::warn!("Failed to parse object detection result {}: {}", i, e);
                None
            }
        })
        .collect()
}

fn parse_entry(entry: &Value) -> Result<BoundingBox, EntryError> {
    let entry = entry.as_object().ok_or(EntryError::NotAnObject)?;

    let empty = Map::new();
    let rect = match entry.get("rectangle") {
        None => &empty,
        Some(value) => value.as_object().ok_or(EntryError::RectangleNotAnObject)?,
    };

    let label = match entry.get("object") {
        None => UNKNOWN_LABEL.to_string(),
        Some(Value::String(label)) => label.clone(),
        Some(other) => return Err(EntryError::LabelNotAString(other.clone())),
    };

    Ok(BoundingBox {
        label,
        x: number_or_zero(rect, "x")?,
        y: number_or_zero(rect, "y")?,
        w: number_or_zero(rect, "w")?,
        h: number_or_zero(rect, "h")?,
        score: number_or_zero(entry, "confidence")?,
    })
}

fn number_or_zero(fields: &Map<String, Value>, key: &'static str) -> Result<f64, EntryError> {
    match fields.get(key) {
        None => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| EntryError::NotNumeric(key, Value::Number(n.clone()))),
        // "NaN" and "inf" parse as f64 but cannot be serialized back to JSON.
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| EntryError::NotNumeric(key, Value::String(s.clone()))),
        Some(other) => Err(EntryError::NotNumeric(key, other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_provider_objects() {
        let response = json!({
            "objects": [
                {
                    "rectangle": {"x": 25, "y": 43, "w": 172, "h": 140},
                    "object": "cat",
                    "confidence": 0.931
                },
                {
                    "rectangle": {"x": 0, "y": 10, "w": 50.5, "h": 20},
                    "object": "laptop",
                    "confidence": 0.5,
                    "parent": {"object": "computer", "confidence": 0.6}
                }
            ],
            "requestId": "8e3c9c1a",
            "metadata": {"width": 400, "height": 300, "format": "Jpeg"}
        });

        let boxes = normalize(&response);

        assert_eq!(
            boxes,
            vec![
                BoundingBox {
                    label: "cat".into(),
                    x: 25.0,
                    y: 43.0,
                    w: 172.0,
                    h: 140.0,
                    score: 0.931,
                },
                BoundingBox {
                    label: "laptop".into(),
                    x: 0.0,
                    y: 10.0,
                    w: 50.5,
                    h: 20.0,
                    score: 0.5,
                },
            ]
        );
    }

    #[test]
    fn test_missing_objects_yields_no_boxes() {
        assert!(normalize(&json!({"requestId": "abc"})).is_empty());
        assert!(normalize(&json!({"objects": null})).is_empty());
        assert!(normalize(&json!([])).is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let boxes = normalize(&json!({"objects": [{}, {"rectangle": {"x": 3}}]}));

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].label, "unknown");
        assert_eq!(boxes[0].score, 0.0);
        assert_eq!((boxes[0].x, boxes[0].y, boxes[0].w, boxes[0].h), (0.0, 0.0, 0.0, 0.0));
        assert_eq!(boxes[1].x, 3.0);
    }

    #[test]
    fn test_malformed_entries_are_skipped_in_order() {
        let response = json!({
            "objects": [
                {"object": "first", "rectangle": {"x": 1, "y": 1, "w": 1, "h": 1}},
                {"object": "bad-x", "rectangle": {"x": "left", "y": 1, "w": 1, "h": 1}},
                {"object": "second", "rectangle": {"x": "2.5", "y": 2, "w": 2, "h": 2}},
                "not an object",
                {"object": "bad-rect", "rectangle": [1, 2, 3, 4]},
                {"object": 42},
                {"object": "bad-score", "confidence": null},
                {"object": "third", "confidence": 0.25}
            ]
        });

        let labels: Vec<String> = normalize(&response).into_iter().map(|b| b.label).collect();

        assert_eq!(labels, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let boxes = normalize(&json!({"objects": [{"confidence": " 0.75 "}]}));
        assert_eq!(boxes[0].score, 0.75);
    }

    #[test]
    fn test_non_finite_strings_skip_the_entry() {
        let response = json!({
            "objects": [
                {"object": "nan", "confidence": "NaN"},
                {"object": "cat", "confidence": 0.5},
                {"object": "inf", "rectangle": {"x": "inf", "y": 1}},
                {"object": "neg", "rectangle": {"w": "-infinity"}},
                {"object": "dog", "confidence": "0.25"}
            ]
        });

        let boxes = normalize(&response);

        let labels: Vec<&str> = boxes.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["cat", "dog"]);
        assert!(boxes.iter().all(|b| b.score.is_finite()));
        assert!(serde_json::to_string(&boxes).is_ok());
    }
}

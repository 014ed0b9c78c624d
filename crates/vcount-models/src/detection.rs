//! Per-frame detection output.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One labeled object instance found in a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedObject {
    /// Class label (e.g. "person", "car")
    #[serde(rename = "type")]
    pub label: String,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_label_as_type() {
        let obj = DetectedObject::new("car", 0.75);
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "car");
        assert!(json.get("label").is_none());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(DetectedObject::new("person", 1.4).confidence, 1.0);
        assert_eq!(DetectedObject::new("person", -0.2).confidence, 0.0);
    }
}

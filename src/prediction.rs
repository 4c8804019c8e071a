use crate::{catalog::ClassCatalog, detection::Detection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NO_OBJECT_DETECTED: &str = "no_object_detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

fn round4(value: f32) -> f64 {
    (f64::from(value).clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

impl PredictionResponse {
    pub fn no_object(catalog: &ClassCatalog) -> Self {
        Self {
            prediction: NO_OBJECT_DETECTED.to_string(),
            confidence: 0.0,
            probabilities: zeroed_probabilities(catalog),
        }
    }

    /// Reduces detections to the single most confident one. Ties keep the
    /// first one seen; detections with a class id outside the catalog or a
    /// non-finite confidence are skipped.
    pub fn from_detections(catalog: &ClassCatalog, detections: &[Detection]) -> Self {
        let mut best: Option<(&str, f32)> = None;
        for detection in detections {
            if !detection.confidence.is_finite() {
                tracing::warn!("Ignoring detection with non-finite confidence");
                continue;
            }
            let Some(name) = catalog.name(detection.class_id) else {
                tracing::warn!(
                    "Ignoring detection with unknown class id {}",
                    detection.class_id
                );
                continue;
            };
            match best {
                Some((_, confidence)) if detection.confidence <= confidence => {}
                _ => best = Some((name, detection.confidence)),
            }
        }

        let Some((name, confidence)) = best else {
            return Self::no_object(catalog);
        };

        let confidence = round4(confidence);
        let mut probabilities = zeroed_probabilities(catalog);
        probabilities.insert(name.to_string(), confidence);

        Self {
            prediction: name.to_string(),
            confidence,
            probabilities,
        }
    }
}

fn zeroed_probabilities(catalog: &ClassCatalog) -> BTreeMap<String, f64> {
    catalog
        .names()
        .iter()
        .map(|name| (name.clone(), 0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn catalog() -> ClassCatalog {
        ClassCatalog::from_names(["paregi", "pelise"]).unwrap()
    }

    fn det(class_id: usize, confidence: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox: BoundingBox {
                x1: 0.,
                y1: 0.,
                x2: 1.,
                y2: 1.,
            },
        }
    }

    #[test]
    fn test_no_detections() {
        let response = PredictionResponse::from_detections(&catalog(), &[]);

        assert_eq!(response.prediction, NO_OBJECT_DETECTED);
        assert_eq!(response.confidence, 0.0);
        assert_eq!(response.probabilities.len(), 2);
        assert!(response.probabilities.values().all(|p| *p == 0.0));
    }

    #[test]
    fn test_best_detection_wins() {
        let detections = [det(0, 0.41), det(1, 0.876_543)];

        let response = PredictionResponse::from_detections(&catalog(), &detections);

        assert_eq!(response.prediction, "pelise");
        assert_eq!(response.confidence, 0.8765);
        assert_eq!(response.probabilities["pelise"], 0.8765);
        assert_eq!(response.probabilities["paregi"], 0.0);
        let sum: f64 = response.probabilities.values().sum();
        assert_eq!(sum, response.confidence);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let detections = [det(1, 0.5), det(0, 0.5)];

        let response = PredictionResponse::from_detections(&catalog(), &detections);

        assert_eq!(response.prediction, "pelise");
    }

    #[test]
    fn test_unknown_class_ids_are_skipped() {
        let detections = [det(7, 0.99), det(0, 0.3)];
        let response = PredictionResponse::from_detections(&catalog(), &detections);
        assert_eq!(response.prediction, "paregi");
        assert_eq!(response.confidence, 0.3);

        let response = PredictionResponse::from_detections(&catalog(), &[det(7, 0.99)]);
        assert_eq!(response, PredictionResponse::no_object(&catalog()));
    }

    #[test]
    fn test_non_finite_confidences_are_skipped() {
        let detections = [det(1, f32::NAN), det(0, 0.6), det(1, f32::INFINITY)];

        let response = PredictionResponse::from_detections(&catalog(), &detections);

        assert_eq!(response.prediction, "paregi");
        assert_eq!(response.confidence, 0.6);
        assert!(response.probabilities.values().all(|p| p.is_finite()));
    }

    #[test]
    fn test_serialized_shape() {
        let response = PredictionResponse::from_detections(&catalog(), &[det(0, 0.25)]);

        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "prediction": "paregi",
                "confidence": 0.25,
                "probabilities": { "paregi": 0.25, "pelise": 0.0 }
            })
        );
    }
}

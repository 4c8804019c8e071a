#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_center(xc: f32, yc: f32, w: f32, h: f32) -> Self {
        Self {
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.) * (self.y2 - self.y1).max(0.)
    }

    fn intersection(&self, other: &BoundingBox) -> f32 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        w.max(0.) * h.max(0.)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0. {
            return 0.;
        }
        intersection / union
    }
}

/// One object instance reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Greedy non-maximum suppression. Returns the kept detections ordered by
/// descending confidence; equal scores keep their input order.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) < iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox: BoundingBox { x1, y1, x2, y2 },
        }
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::from_center(5., 5., 10., 10.);
        let b = BoundingBox::from_center(10., 5., 10., 10.);
        let far = BoundingBox::from_center(55., 55., 10., 10.);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&far), 0.);
    }

    #[test]
    fn test_from_center() {
        let bbox = BoundingBox::from_center(10., 20., 4., 6.);

        let expected = BoundingBox {
            x1: 8.,
            y1: 17.,
            x2: 12.,
            y2: 23.,
        };
        assert_eq!(bbox, expected);
    }

    #[test]
    fn test_non_max_suppression_drops_overlaps() {
        let detections = vec![
            det(0, 0.6, 0., 0., 10., 10.),
            det(1, 0.9, 1., 1., 10., 10.),
            det(0, 0.4, 100., 100., 120., 120.),
        ];

        let kept = non_max_suppression(detections, 0.7);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].class_id, 1);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.4);
    }

    #[test]
    fn test_non_max_suppression_empty() {
        assert!(non_max_suppression(vec![], 0.7).is_empty());
    }
}

use opencv::core::{Mat, Size};
use serde::Serialize;
use std::path::PathBuf;

pub use crate::run_artifacts::BBox;

/// Raw network outputs for one frame, laid out cell-major:
/// `boxes` is `[cells, rnn_len, 4]`, `confidences` is `[cells, rnn_len, num_classes]`.
#[derive(Debug, Clone, Default)]
pub struct RawPrediction {
    pub boxes: Vec<f32>,
    pub confidences: Vec<f32>,
}

/// A candidate box in model-input pixel space, center form.
///
/// `confidence` is what thresholds compare against. Stitching replaces it
/// with the score of the pass that admitted the box, `true_confidence`
/// keeps the network's own score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub true_confidence: f32,
}

impl Rect {
    pub fn new(cx: f32, cy: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
            confidence,
            true_confidence: confidence,
        }
    }

    pub fn x1(&self) -> f32 {
        self.cx - self.width / 2.0
    }

    pub fn y1(&self) -> f32 {
        self.cy - self.height / 2.0
    }

    pub fn x2(&self) -> f32 {
        self.cx + self.width / 2.0
    }

    pub fn y2(&self) -> f32 {
        self.cy + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn intersection(&self, other: &Rect) -> f32 {
        let w = (self.x2().min(other.x2()) - self.x1().max(other.x1())).max(0.0);
        let h = (self.y2().min(other.y2()) - self.y1().max(other.y1())).max(0.0);
        w * h
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Cheap center-distance gate followed by an IoU test against `tau`.
    pub fn overlaps(&self, other: &Rect, tau: f32) -> bool {
        if (self.cx - other.cx).abs() > (self.width + other.width) / 1.5 {
            false
        } else if (self.cy - other.cy).abs() > (self.height + other.height) / 2.0 {
            false
        } else {
            self.iou(other) > tau
        }
    }

    /// Clips the box to `[0, width) x [0, height)`, returning `None` when
    /// nothing is left.
    pub fn clipped(&self, width: f32, height: f32) -> Option<Rect> {
        let x1 = self.x1().clamp(0.0, width);
        let y1 = self.y1().clamp(0.0, height);
        let x2 = self.x2().clamp(0.0, width);
        let y2 = self.y2().clamp(0.0, height);
        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }
        Some(Rect {
            cx: (x1 + x2) / 2.0,
            cy: (y1 + y2) / 2.0,
            width: x2 - x1,
            height: y2 - y1,
            ..*self
        })
    }
}

/// Final detection in original-frame pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
}

impl Detection {
    /// Maps a model-space rect to a frame that is `rw` / `rh` times
    /// wider / taller than the model input.
    pub fn from_rect(rect: &Rect, rw: f32, rh: f32) -> Self {
        Self {
            bbox: BBox {
                x: rect.x1() * rw,
                y: rect.y1() * rh,
                w: rect.width * rw,
                h: rect.height * rh,
            },
            confidence: rect.true_confidence,
        }
    }
}

/// A decoded input frame plus its model-sized copy.
pub struct RawFrame {
    pub id: usize,
    pub path: PathBuf,
    pub original_size: Size,
    pub resized: Mat,
}

/// A fully processed frame ready to be encoded.
pub struct AnnotatedFrame {
    pub id: usize,
    pub image: Mat,
    pub detections: Vec<Detection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Rect::new(50.0, 50.0, 20.0, 20.0, 0.9);
        let b = Rect::new(200.0, 200.0, 20.0, 20.0, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_overlaps_uses_center_gate() {
        let a = Rect::new(50.0, 50.0, 40.0, 40.0, 0.9);
        let shifted = Rect::new(55.0, 52.0, 40.0, 40.0, 0.8);
        assert!(a.overlaps(&shifted, 0.25));
        assert!(!a.overlaps(&shifted, 0.95));

        let far = Rect::new(150.0, 50.0, 40.0, 40.0, 0.8);
        assert!(!a.overlaps(&far, 0.0));
    }

    #[test]
    fn test_clipped() {
        let r = Rect::new(5.0, 5.0, 20.0, 20.0, 0.7);
        let c = r.clipped(100.0, 100.0).unwrap();
        assert_eq!(c.x1(), 0.0);
        assert_eq!(c.x2(), 15.0);
        assert_eq!(c.confidence, 0.7);

        let outside = Rect::new(-50.0, -50.0, 10.0, 10.0, 0.7);
        assert!(outside.clipped(100.0, 100.0).is_none());
    }

    #[test]
    fn test_detection_scaling() {
        let r = Rect {
            confidence: 0.9,
            ..Rect::new(20.0, 10.0, 10.0, 4.0, 0.6)
        };
        let d = Detection::from_rect(&r, 2.0, 3.0);
        assert_eq!(d.bbox.x, 30.0);
        assert_eq!(d.bbox.y, 24.0);
        assert_eq!(d.bbox.w, 20.0);
        assert_eq!(d.bbox.h, 12.0);
        assert_eq!(d.confidence, 0.6);
    }
}

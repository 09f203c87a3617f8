// src/collaborators.rs
//
// Injection seams for the external detectors the engine consumes but does
// not implement: plate OCR, traffic-light color, helmet classification and
// violation-line auto-detection. The engine is handed these at construction
// and must behave correctly whatever they report.

use crate::types::{BBox, Frame, LightState, Point, ViolationLine};

/// License-plate OCR over one vehicle box. `None`/empty means unreadable;
/// the engine then records "N/A" and never flags a repeat offender.
pub trait PlateReader {
    fn read_plate(&mut self, frame: &Frame, bbox: &BBox) -> Option<String>;
}

/// Traffic-light color over one light box.
pub trait LightClassifier {
    fn classify(&self, frame: &Frame, bbox: &BBox) -> LightState;

    /// Frame-level verdict: first box whose color classifies as known.
    /// Classifiers that know the light state out of band (replay feeds
    /// carrying recorded ground truth) override this and may answer even
    /// when no light box was detected in the frame.
    fn frame_light(&self, frame: &Frame, lights: &[BBox]) -> LightState {
        lights
            .iter()
            .map(|bbox| self.classify(frame, bbox))
            .find(|state| *state != LightState::Unknown)
            .unwrap_or(LightState::Unknown)
    }
}

/// Helmet presence for one person box.
pub trait HelmetClassifier {
    fn has_helmet(&self, frame: &Frame, bbox: &BBox) -> bool;
}

/// One-shot road-marking heuristic proposing a violation line.
pub trait LineDetector {
    fn detect(&self, frame: &Frame) -> Option<ViolationLine>;
}

/// OCR stand-in for runs with plate detection disabled.
pub struct NullPlateReader;

impl PlateReader for NullPlateReader {
    fn read_plate(&mut self, _frame: &Frame, _bbox: &BBox) -> Option<String> {
        None
    }
}

/// Classifier stand-in when no color heuristic is wired up; an unknown
/// light means no red-light check is performed.
pub struct UnknownLightClassifier;

impl LightClassifier for UnknownLightClassifier {
    fn classify(&self, _frame: &Frame, _bbox: &BBox) -> LightState {
        LightState::Unknown
    }
}

/// Assumes every rider wears a helmet — the safe default when no helmet
/// model is wired up (no false accusations).
pub struct AssumeHelmet;

impl HelmetClassifier for AssumeHelmet {
    fn has_helmet(&self, _frame: &Frame, _bbox: &BBox) -> bool {
        true
    }
}

/// Last-resort line placement when no road-marking heuristic is available:
/// a horizontal line at 75% of frame height, inset 50 px from each edge.
pub struct FallbackLineDetector;

impl LineDetector for FallbackLineDetector {
    fn detect(&self, frame: &Frame) -> Option<ViolationLine> {
        if frame.width <= 100 || frame.height == 0 {
            return None;
        }
        let y = (frame.height as f32 * 0.75).floor();
        Some(ViolationLine::new(
            Point::new(50.0, y),
            Point::new(frame.width as f32 - 50.0, y),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLight(LightState);

    impl LightClassifier for FixedLight {
        fn classify(&self, _frame: &Frame, _bbox: &BBox) -> LightState {
            self.0
        }
    }

    fn frame() -> Frame {
        Frame {
            width: 1280,
            height: 720,
            timestamp: 0.0,
        }
    }

    fn bbox() -> BBox {
        BBox {
            x1: 10.0,
            y1: 10.0,
            x2: 30.0,
            y2: 60.0,
        }
    }

    #[test]
    fn test_frame_light_skips_unknown() {
        let boxes = [bbox(), bbox()];
        assert_eq!(
            FixedLight(LightState::Red).frame_light(&frame(), &boxes),
            LightState::Red
        );
        assert_eq!(
            FixedLight(LightState::Unknown).frame_light(&frame(), &boxes),
            LightState::Unknown
        );
        assert_eq!(
            UnknownLightClassifier.frame_light(&frame(), &[]),
            LightState::Unknown
        );
    }

    #[test]
    fn test_fallback_line_at_three_quarters_height() {
        let line = FallbackLineDetector.detect(&frame()).unwrap();
        assert_eq!(line.p1.y, 540.0);
        assert_eq!(line.p1.x, 50.0);
        assert_eq!(line.p2.x, 1230.0);
    }

    #[test]
    fn test_fallback_line_rejects_tiny_frame() {
        let tiny = Frame {
            width: 80,
            height: 60,
            timestamp: 0.0,
        };
        assert!(FallbackLineDetector.detect(&tiny).is_none());
    }
}

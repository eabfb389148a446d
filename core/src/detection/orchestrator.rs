//! Per-frame detection fan-out
//!
//! Distinct ability keys for the current and next step are detected in
//! parallel on a bounded pool against the same frame, then reassembled in
//! request order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::detector::{DetectionResult, TemplateDetector};
use super::error::DetectionError;
use super::frame::Frame;

/// Which step an ability is required for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPlacement {
    Current,
    Next,
}

/// One ability the orchestrator must look for this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredAbility {
    pub key: String,
    pub is_alternative: bool,
    pub placement: StepPlacement,
}

/// Detection results for one frame, split by step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub current: Vec<DetectionResult>,
    pub next: Vec<DetectionResult>,
    pub elapsed: Duration,
}

impl FrameDetections {
    pub fn iter(&self) -> impl Iterator<Item = &DetectionResult> {
        self.current.iter().chain(self.next.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.next.is_empty()
    }
}

pub struct DetectionOrchestrator {
    detector: Arc<TemplateDetector>,
    pool: ThreadPool,
}

impl DetectionOrchestrator {
    /// `worker_threads == 0` sizes the pool to the machine.
    pub fn new(detector: Arc<TemplateDetector>, worker_threads: usize) -> Result<Self, DetectionError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("rotascope-detect-{i}"))
            .build()
            .map_err(|e| DetectionError::WorkerPool {
                reason: e.to_string(),
            })?;
        Ok(Self { detector, pool })
    }

    pub fn detector(&self) -> &Arc<TemplateDetector> {
        &self.detector
    }

    /// Detect every required ability once per distinct key.
    pub fn detect_all(&self, frame: &Frame, required: &[RequiredAbility]) -> FrameDetections {
        let started = Instant::now();

        let mut keys: Vec<&str> = Vec::new();
        for ability in required {
            if !keys.contains(&ability.key.as_str()) {
                keys.push(&ability.key);
            }
        }

        let detector = &self.detector;
        let results: Vec<DetectionResult> = self.pool.install(|| {
            keys.par_iter()
                .map(|key| detector.detect(frame, key, false))
                .collect()
        });

        let mut detections = FrameDetections::default();
        for ability in required {
            let Some(index) = keys.iter().position(|k| *k == ability.key) else {
                continue;
            };
            let result = DetectionResult {
                is_alternative: ability.is_alternative,
                ..results[index].clone()
            };
            match ability.placement {
                StepPlacement::Current => detections.current.push(result),
                StepPlacement::Next => detections.next.push(result),
            }
        }
        detections.elapsed = started.elapsed();
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityCatalog;
    use crate::detection::geometry::Rect;
    use crate::detection::matcher::CpuMatcher;
    use crate::detection::template::MemoryTemplateStore;
    use image::{DynamicImage, Rgb, RgbImage};
    use rotascope_types::DetectionSettings;

    fn make_orchestrator() -> DetectionOrchestrator {
        let mut store = MemoryTemplateStore::new();
        store.insert(
            "fireball",
            DynamicImage::ImageRgb8(RgbImage::from_fn(4, 4, |x, y| Rgb([250, (x * 50) as u8, (y * 50) as u8]))),
        );
        store.insert(
            "heal",
            DynamicImage::ImageRgb8(RgbImage::from_fn(4, 4, |x, y| Rgb([(y * 50) as u8, 250, (x * 50) as u8]))),
        );
        let detector = TemplateDetector::new(
            Arc::new(store),
            Arc::new(AbilityCatalog::new()),
            Box::new(CpuMatcher),
            DetectionSettings::default(),
        );
        DetectionOrchestrator::new(Arc::new(detector), 2).unwrap()
    }

    fn required(key: &str, is_alternative: bool, placement: StepPlacement) -> RequiredAbility {
        RequiredAbility {
            key: key.to_string(),
            is_alternative,
            placement,
        }
    }

    #[test]
    fn test_results_keep_request_order_and_flags() {
        let orchestrator = make_orchestrator();
        let mut img = RgbImage::from_pixel(32, 32, Rgb([5, 5, 5]));
        let fireball = RgbImage::from_fn(4, 4, |x, y| Rgb([250, (x * 50) as u8, (y * 50) as u8]));
        image::imageops::replace(&mut img, &fireball, 10, 10);
        let frame = Frame::from_capture(DynamicImage::ImageRgb8(img), Rect::sized(32, 32));

        let detections = orchestrator.detect_all(
            &frame,
            &[
                required("heal", true, StepPlacement::Current),
                required("fireball", false, StepPlacement::Current),
                required("heal", false, StepPlacement::Next),
                required("missing", false, StepPlacement::Next),
            ],
        );

        let current: Vec<(&str, bool, bool)> = detections
            .current
            .iter()
            .map(|r| (r.ability_key.as_str(), r.found, r.is_alternative))
            .collect();
        assert_eq!(current, vec![("heal", false, true), ("fireball", true, false)]);

        let next: Vec<(&str, bool)> = detections
            .next
            .iter()
            .map(|r| (r.ability_key.as_str(), r.is_alternative))
            .collect();
        assert_eq!(next, vec![("heal", false), ("missing", false)]);
        assert!(!detections.next[1].found);
    }

    #[test]
    fn test_empty_request() {
        let orchestrator = make_orchestrator();
        let frame = Frame::from_capture(DynamicImage::ImageRgb8(RgbImage::new(8, 8)), Rect::sized(8, 8));
        assert!(orchestrator.detect_all(&frame, &[]).is_empty());
    }
}

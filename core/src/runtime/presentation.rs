//! What the presentation layer receives each frame

use std::time::Instant;

use tracing::{debug, info};

use super::event::SequenceEvent;
use crate::detection::{ConfidenceGrade, DetectionResult};
use crate::modification::RuntimeTooltip;

/// A detection result with its diagnostic grade.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedDetection {
    pub result: DetectionResult,
    pub threshold: f32,
    pub grade: ConfidenceGrade,
}

/// Snapshot handed to the sink after every processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUpdate {
    pub at: Instant,
    pub step_index: usize,
    pub step_count: usize,
    pub current: Vec<GradedDetection>,
    pub next: Vec<GradedDetection>,
    pub tooltips: Vec<RuntimeTooltip>,
    /// Events raised while processing this frame, heartbeat first
    pub events: Vec<SequenceEvent>,
}

impl FrameUpdate {
    pub fn is_complete(&self) -> bool {
        self.step_index >= self.step_count
    }
}

/// Receives frame updates; rendering is up to the implementation.
pub trait PresentationSink: Send {
    fn present(&mut self, update: &FrameUpdate);
}

/// Writes ability sightings at info and everything else at debug.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl PresentationSink for LoggingSink {
    fn present(&mut self, update: &FrameUpdate) {
        for event in &update.events {
            match event {
                SequenceEvent::Heartbeat { .. } => {}
                SequenceEvent::AbilityUsed { ability, step_index, .. }
                | SequenceEvent::AbilityDetected { ability, step_index, .. } => {
                    info!(event = event.name(), ability = %ability, step_index, "Ability seen");
                }
                _ => debug!(event = event.name(), "Sequence event"),
            }
        }
        for graded in update.current.iter().chain(&update.next) {
            debug!(
                key = %graded.result.ability_key,
                found = graded.result.found,
                confidence = graded.result.confidence,
                grade = %graded.grade,
                "Detection"
            );
        }
        for tooltip in &update.tooltips {
            debug!(id = %tooltip.id, text = %tooltip.text, "Tooltip");
        }
    }
}

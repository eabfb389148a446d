//! Frame-processing loop
//!
//! One cycle: heartbeat, capture, detect what the current and next step
//! need, turn detections into events, let the modification rules react,
//! apply their directives, advance, then present. Cycles never overlap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rotascope_types::EngineConfig;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::error::EngineError;
use super::event::{AbilityRef, SequenceEvent};
use super::presentation::{FrameUpdate, GradedDetection, PresentationSink};
use super::sequence::ActiveSequence;
use super::step_timer::TimingSource;
use crate::abilities::{AbilityRegistry, TimingProfile, resolve_ability};
use crate::detection::{
    ConfidenceGrader, DetectionOrchestrator, DetectionResult, Frame, FrameDetections, FrameSource,
    TemplateDetector,
};
use crate::dsl::{Rotation, RotationSettings, Step};
use crate::modification::{AbilityContext, AbilityModificationEngine, AbilityModificationRule, RuntimeContext};

/// Registry config, rotation overrides, then live rule patches.
struct RotationTiming<'a> {
    registry: &'a dyn AbilityRegistry,
    settings: &'a RotationSettings,
    modification: &'a AbilityModificationEngine,
    runtime: RuntimeContext,
}

impl TimingSource for RotationTiming<'_> {
    fn timing_profile(&self, ability: &AbilityRef) -> TimingProfile {
        let config = resolve_ability(self.registry, self.settings, &ability.key, ability.label.as_deref());
        let context = AbilityContext {
            ability,
            config: &config,
            runtime: &self.runtime,
        };
        self.modification
            .apply_timing_overrides(&context, config.timing_profile())
    }
}

fn runtime_context(sequence: &ActiveSequence, now: Instant) -> RuntimeContext {
    let keys = |step: Option<&Step>| -> Vec<String> {
        step.map(|s| s.ability_keys().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    };
    RuntimeContext {
        now,
        current_step: sequence.current_step_index(),
        step_count: sequence.step_count(),
        current_keys: keys(sequence.current_step()),
        next_keys: keys(sequence.next_step()),
        paused: sequence.is_paused(),
    }
}

pub struct RotationEngine {
    config: EngineConfig,
    rotation: Rotation,
    sequence: ActiveSequence,
    orchestrator: DetectionOrchestrator,
    abilities: Arc<dyn AbilityRegistry>,
    modification: AbilityModificationEngine,
    grader: ConfidenceGrader,
    source: Box<dyn FrameSource>,
    sink: Box<dyn PresentationSink>,
    started: bool,
}

impl RotationEngine {
    pub fn new(
        config: EngineConfig,
        rotation: Rotation,
        detector: Arc<TemplateDetector>,
        abilities: Arc<dyn AbilityRegistry>,
        source: Box<dyn FrameSource>,
        sink: Box<dyn PresentationSink>,
    ) -> Result<Self, EngineError> {
        detector.set_rotation_settings(rotation.settings.clone());
        let orchestrator = DetectionOrchestrator::new(detector, config.detection.worker_threads)?;
        Ok(Self {
            sequence: ActiveSequence::new(rotation.definition.clone(), &config),
            modification: AbilityModificationEngine::new(config.tick_duration_ms),
            grader: ConfidenceGrader::new(&config.grading),
            config,
            rotation,
            orchestrator,
            abilities,
            source,
            sink,
            started: false,
        })
    }

    pub fn add_rule(&mut self, rule: Box<dyn AbilityModificationRule>) {
        self.modification.add_rule(rule);
    }

    pub fn sequence(&self) -> &ActiveSequence {
        &self.sequence
    }

    pub fn modification(&self) -> &AbilityModificationEngine {
        &self.modification
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn is_source_exhausted(&self) -> bool {
        self.source.is_exhausted()
    }

    // ─── Control ───────────────────────────────────────────────────────────

    /// Initialize at step 0. Called implicitly by the first frame.
    pub fn start(&mut self, now: Instant) -> Vec<SequenceEvent> {
        self.started = true;
        let (sequence, timing) = self.split(now);
        let events = sequence.initialize(&timing, now);
        self.dispatch(&events);
        self.apply_directives();
        events
    }

    pub fn reset(&mut self, now: Instant) -> Vec<SequenceEvent> {
        self.started = true;
        self.orchestrator.detector().forget_locations();
        let (sequence, timing) = self.split(now);
        let events = sequence.reset(&timing, now);
        self.dispatch(&events);
        self.apply_directives();
        events
    }

    pub fn pause(&mut self, now: Instant) -> Vec<SequenceEvent> {
        let events = self.sequence.pause(now);
        self.dispatch(&events);
        self.apply_directives();
        events
    }

    pub fn resume(&mut self, now: Instant) -> Vec<SequenceEvent> {
        let events = self.sequence.resume(now);
        self.dispatch(&events);
        self.apply_directives();
        events
    }

    // ─── Frame cycle ───────────────────────────────────────────────────────

    /// Run one full cycle and return every event it raised.
    pub fn process_frame(&mut self, now: Instant) -> Vec<SequenceEvent> {
        let started = Instant::now();
        let mut events = Vec::new();
        if !self.started {
            events.extend(self.start(now));
        }

        let heartbeat = [SequenceEvent::Heartbeat { at: now }];
        self.dispatch(&heartbeat);
        events.extend(heartbeat);

        // A paused sequence keeps its last visibility so resuming raises no
        // stale edges
        let detections = if self.sequence.is_paused() {
            FrameDetections::default()
        } else {
            let detections = self.detect_frame();
            let detected = self.sequence.process_detections(&detections, now);
            self.dispatch(&detected);
            events.extend(detected);
            self.apply_directives();
            detections
        };

        let (sequence, timing) = self.split(now);
        let advanced = sequence.try_advance(&timing, now);
        self.dispatch(&advanced);
        events.extend(advanced);
        self.apply_directives();

        self.present(now, &detections, &events);

        let elapsed = started.elapsed();
        let budget = Duration::from_millis(self.config.frame_budget_ms);
        if elapsed > budget {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.frame_budget_ms,
                "Frame budget exceeded"
            );
        }
        events
    }

    /// Drive frames on a fixed interval until `stop` flips to true, the
    /// sender goes away, or the frame source runs dry. A frame in flight
    /// always completes.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<Self, EngineError> {
        let period = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = period.as_millis() as u64, steps = self.sequence.step_count(), "Rotation engine started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *stop.borrow() {
                break;
            }

            self = tokio::task::spawn_blocking(move || {
                self.process_frame(Instant::now());
                self
            })
            .await?;

            if self.source.is_exhausted() {
                info!("Frame source exhausted");
                break;
            }
        }

        info!(step = self.sequence.current_step_index(), "Rotation engine stopped");
        Ok(self)
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    fn split(&mut self, now: Instant) -> (&mut ActiveSequence, RotationTiming<'_>) {
        let runtime = runtime_context(&self.sequence, now);
        (
            &mut self.sequence,
            RotationTiming {
                registry: self.abilities.as_ref(),
                settings: &self.rotation.settings,
                modification: &self.modification,
                runtime,
            },
        )
    }

    fn detect_frame(&mut self) -> FrameDetections {
        let Some(image) = self.source.capture_frame() else {
            debug!("No frame captured");
            return FrameDetections::default();
        };
        let frame = Frame::from_capture(image, self.source.region());
        let required = self
            .sequence
            .required_abilities(self.orchestrator.detector().templates().as_ref());
        self.orchestrator.detect_all(&frame, &required)
    }

    fn dispatch(&mut self, events: &[SequenceEvent]) {
        for event in events {
            let runtime = runtime_context(&self.sequence, event.at());
            self.modification
                .on_event(event, &runtime, self.abilities.as_ref());
        }
    }

    fn apply_directives(&mut self) {
        for directive in self.modification.drain_directives() {
            debug!(?directive, "Applying timing directive");
            self.sequence.apply_directive(&directive);
        }
    }

    fn present(&mut self, now: Instant, detections: &FrameDetections, events: &[SequenceEvent]) {
        let update = FrameUpdate {
            at: now,
            step_index: self.sequence.current_step_index(),
            step_count: self.sequence.step_count(),
            current: self.grade_all(&detections.current),
            next: self.grade_all(&detections.next),
            tooltips: self.modification.active_tooltips(now),
            events: events.to_vec(),
        };
        self.sink.present(&update);
    }

    fn grade_all(&self, results: &[DetectionResult]) -> Vec<GradedDetection> {
        let detector = self.orchestrator.detector();
        results
            .iter()
            .map(|result| {
                let threshold = detector.threshold_for(&result.ability_key);
                GradedDetection {
                    result: result.clone(),
                    threshold,
                    grade: self.grader.grade(threshold, result.confidence),
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

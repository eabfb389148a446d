//! The running rotation: AST cursor, detections and step timing
//!
//! States are step indices `0..=N`; `N` means complete. The index only moves
//! forward, one step at a time, except on an explicit reset to 0.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rotascope_types::EngineConfig;
use tracing::info;

use super::event::{AbilityRef, SequenceEvent, TimingDirective};
use super::step_timer::{StepTimer, TimingSource};
use crate::detection::{DetectionResult, FrameDetections, RequiredAbility, StepPlacement, TemplateStore};
use crate::dsl::{Alternative, LinearItem, SequenceDefinition, Step, Term};

#[derive(Debug, Clone)]
pub struct ActiveSequence {
    definition: SequenceDefinition,
    current_step: usize,
    timer: StepTimer,
    require_detection: bool,
    paused: bool,

    // ─── Detection state ───────────────────────────────────────────────────
    last_detections: HashMap<String, DetectionResult>,
    /// Keys found in the previous frame, for rising edges
    visible: HashSet<String>,
    /// Keys found at any point during the current step
    seen_this_step: HashSet<String>,
    latched: bool,
}

impl ActiveSequence {
    pub fn new(definition: SequenceDefinition, config: &EngineConfig) -> Self {
        Self {
            definition,
            current_step: 0,
            timer: StepTimer::new(config.tick_duration_ms, config.gcd_ticks),
            require_detection: config.runtime.require_detection_to_advance,
            paused: false,
            last_detections: HashMap::new(),
            visible: HashSet::new(),
            seen_this_step: HashSet::new(),
            latched: false,
        }
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    pub fn definition(&self) -> &SequenceDefinition {
        &self.definition
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step
    }

    pub fn step_count(&self) -> usize {
        self.definition.len()
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.definition.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.definition.step(self.current_step)
    }

    pub fn next_step(&self) -> Option<&Step> {
        self.definition.step(self.current_step + 1)
    }

    pub fn timer(&self) -> &StepTimer {
        &self.timer
    }

    pub fn last_detection(&self, key: &str) -> Option<&DetectionResult> {
        self.last_detections.get(key)
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Start at step 0.
    pub fn initialize(&mut self, timing: &dyn TimingSource, now: Instant) -> Vec<SequenceEvent> {
        self.rewind();
        let mut events = vec![SequenceEvent::SequenceInitialized {
            at: now,
            step_count: self.step_count(),
        }];
        events.extend(self.start_current(timing, now));
        events
    }

    /// Back to step 0 with all timing and detection state cleared.
    pub fn reset(&mut self, timing: &dyn TimingSource, now: Instant) -> Vec<SequenceEvent> {
        info!(from = self.current_step, "Sequence reset");
        self.rewind();
        let mut events = vec![SequenceEvent::SequenceReset { at: now }];
        events.extend(self.start_current(timing, now));
        events
    }

    pub fn pause(&mut self, now: Instant) -> Vec<SequenceEvent> {
        if self.paused {
            return Vec::new();
        }
        self.paused = true;
        self.timer.hold_by_user(now);
        vec![SequenceEvent::SequencePaused { at: now }]
    }

    pub fn resume(&mut self, now: Instant) -> Vec<SequenceEvent> {
        if !self.paused {
            return Vec::new();
        }
        self.paused = false;
        self.timer.release_by_user(now);
        vec![SequenceEvent::SequenceResumed { at: now }]
    }

    fn rewind(&mut self) {
        self.current_step = 0;
        self.paused = false;
        self.timer.reset();
        self.last_detections.clear();
        self.visible.clear();
        self.clear_step_state();
    }

    fn clear_step_state(&mut self) {
        self.seen_this_step.clear();
        self.latched = false;
    }

    fn start_current(&mut self, timing: &dyn TimingSource, now: Instant) -> Vec<SequenceEvent> {
        match self.definition.step(self.current_step) {
            Some(step) => {
                self.timer.start_step(step, timing, now);
                vec![SequenceEvent::StepStarted {
                    at: now,
                    step_index: self.current_step,
                }]
            }
            None => {
                self.timer.end_step();
                Vec::new()
            }
        }
    }

    // ─── Per-frame work ────────────────────────────────────────────────────

    /// Abilities to look for this frame: the current step, then the next,
    /// each key once per step, skipping keys without a template.
    pub fn required_abilities(&self, templates: &dyn TemplateStore) -> Vec<RequiredAbility> {
        let mut required: Vec<RequiredAbility> = Vec::new();
        let steps = [
            (self.current_step(), StepPlacement::Current),
            (self.next_step(), StepPlacement::Next),
        ];
        for (step, placement) in steps {
            let Some(step) = step else { continue };
            for item in step.linearize() {
                let LinearItem::Ability { token, in_choice } = item else {
                    continue;
                };
                let duplicate = required
                    .iter()
                    .any(|r| r.placement == placement && r.key == token.key);
                if duplicate || !templates.has_template(&token.key) {
                    continue;
                }
                required.push(RequiredAbility {
                    key: token.key.clone(),
                    is_alternative: in_choice,
                    placement,
                });
            }
        }
        required
    }

    /// Record one frame of results and report rising edges. An ability
    /// that appears in both steps counts as used, not as upcoming.
    pub fn process_detections(&mut self, detections: &FrameDetections, now: Instant) -> Vec<SequenceEvent> {
        for result in detections.iter() {
            self.last_detections
                .insert(result.ability_key.clone(), result.clone());
        }
        let found: HashSet<String> = detections
            .iter()
            .filter(|r| r.found)
            .map(|r| r.ability_key.clone())
            .collect();

        let mut events = Vec::new();
        let mut announced: HashSet<&str> = HashSet::new();
        let current = self.current_step;

        if let Some(step) = self.definition.step(current) {
            for token in step.abilities() {
                if found.contains(&token.key)
                    && !self.visible.contains(&token.key)
                    && announced.insert(&token.key)
                {
                    events.push(SequenceEvent::AbilityUsed {
                        at: now,
                        ability: AbilityRef::from(token),
                        step_index: current,
                    });
                }
            }
        }
        if let Some(step) = self.definition.step(current + 1) {
            for token in step.abilities() {
                if found.contains(&token.key)
                    && !self.visible.contains(&token.key)
                    && announced.insert(&token.key)
                {
                    events.push(SequenceEvent::AbilityDetected {
                        at: now,
                        ability: AbilityRef::from(token),
                        step_index: current + 1,
                    });
                }
            }
        }

        self.seen_this_step.extend(found.iter().cloned());
        if !self.latched {
            if let Some(step) = self.definition.step(current) {
                if step_seen(step, &self.seen_this_step) {
                    self.latched = true;
                    events.push(SequenceEvent::LatchStarted {
                        at: now,
                        step_index: current,
                    });
                }
            }
        }

        self.visible = found;
        events
    }

    /// Dwell elapsed (and latched, when detection is required), or forced.
    pub fn is_step_satisfied(&self, now: Instant) -> bool {
        if self.is_complete() {
            return false;
        }
        if self.timer.is_forced(now) {
            return true;
        }
        self.timer.is_dwell_elapsed(now) && (!self.require_detection || self.latched)
    }

    /// Move to the next step when the current one is satisfied.
    pub fn try_advance(&mut self, timing: &dyn TimingSource, now: Instant) -> Vec<SequenceEvent> {
        if self.paused || !self.is_step_satisfied(now) {
            return Vec::new();
        }
        let from = self.current_step;
        let to = (from + 1).min(self.definition.len());
        self.current_step = to;
        self.clear_step_state();
        info!(from, to, step_count = self.definition.len(), "Step advanced");

        let mut events = vec![SequenceEvent::StepAdvanced { at: now, from, to }];
        events.extend(self.start_current(timing, now));
        events
    }

    pub fn apply_directive(&mut self, directive: &TimingDirective) {
        self.timer.apply(directive);
    }
}

fn step_seen(step: &Step, seen: &HashSet<String>) -> bool {
    step.terms.iter().all(|term| term_seen(term, seen))
}

fn term_seen(term: &Term, seen: &HashSet<String>) -> bool {
    term.alternatives.iter().any(|alternative| match alternative {
        Alternative::Ability(token) => seen.contains(&token.key),
        Alternative::Group(inner) => inner.steps.iter().all(|step| step_seen(step, seen)),
    })
}

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod tests;

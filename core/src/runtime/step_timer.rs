//! Step dwell timing
//!
//! A step must stay current for at least the longest dwell of any ability
//! it references, measured in game ticks. Rule directives can pause the
//! clock, restart it, change the required dwell, or force the step done.
//!
//! The user and the rules hold the clock independently. It runs only while
//! neither holds it, and each side can only release its own hold.

use std::time::{Duration, Instant};

use super::clock::PausableSpan;
use super::event::{AbilityRef, TimingDirective};
use crate::abilities::TimingProfile;
use crate::dsl::Step;

/// Resolves the effective timing of an ability occurrence.
pub trait TimingSource {
    fn timing_profile(&self, ability: &AbilityRef) -> TimingProfile;
}

#[derive(Debug, Clone)]
pub struct StepTimer {
    tick: Duration,
    gcd_ticks: u32,

    // ─── Current step ──────────────────────────────────────────────────────
    span: Option<PausableSpan>,
    required: Duration,
    forced_at: Option<Instant>,
    /// Rule hold, dropped when the step ends
    rule_hold: bool,

    /// User hold, kept across steps
    user_hold: bool,
}

impl StepTimer {
    pub fn new(tick_duration_ms: u64, gcd_ticks: u32) -> Self {
        Self {
            tick: Duration::from_millis(tick_duration_ms),
            gcd_ticks,
            span: None,
            required: Duration::ZERO,
            forced_at: None,
            rule_hold: false,
            user_hold: false,
        }
    }

    /// Start timing `step` at `now`.
    pub fn start_step(&mut self, step: &Step, timing: &dyn TimingSource, now: Instant) {
        let ticks = step
            .abilities()
            .into_iter()
            .map(|token| {
                timing
                    .timing_profile(&AbilityRef::from(token))
                    .dwell_ticks(self.gcd_ticks)
            })
            .max()
            .unwrap_or(0);
        self.required = self.tick.saturating_mul(ticks);
        self.span = Some(PausableSpan::new(now));
        self.forced_at = None;
        self.rule_hold = false;
        self.sync_hold(now);
    }

    /// Stop timing the current step. A user hold stays in place.
    pub fn end_step(&mut self) {
        self.span = None;
        self.required = Duration::ZERO;
        self.forced_at = None;
        self.rule_hold = false;
    }

    /// Forget everything, user hold included.
    pub fn reset(&mut self) {
        self.end_step();
        self.user_hold = false;
    }

    pub fn hold_by_user(&mut self, now: Instant) {
        self.user_hold = true;
        self.sync_hold(now);
    }

    pub fn release_by_user(&mut self, now: Instant) {
        self.user_hold = false;
        self.sync_hold(now);
    }

    pub fn is_held_by_user(&self) -> bool {
        self.user_hold
    }

    pub fn is_held_by_rule(&self) -> bool {
        self.rule_hold
    }

    fn sync_hold(&mut self, now: Instant) {
        let held = self.user_hold || self.rule_hold;
        if let Some(span) = &mut self.span {
            if held {
                span.pause(now);
            } else {
                span.resume(now);
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.span.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.span.is_some_and(|s| s.is_paused())
    }

    pub fn required_duration(&self) -> Duration {
        self.required
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.span.map_or(Duration::ZERO, |s| s.elapsed(now))
    }

    /// Remaining dwell, zero once elapsed.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.required.saturating_sub(self.elapsed(now))
    }

    pub fn is_forced(&self, now: Instant) -> bool {
        self.forced_at.is_some_and(|at| now >= at)
    }

    /// The minimum dwell has passed (pauses excluded).
    pub fn is_dwell_elapsed(&self, now: Instant) -> bool {
        self.span.is_some() && self.elapsed(now) >= self.required
    }

    /// Elapsed-dwell satisfaction; forcing always wins.
    pub fn is_satisfied(&self, now: Instant) -> bool {
        self.is_forced(now) || self.is_dwell_elapsed(now)
    }

    pub fn apply(&mut self, directive: &TimingDirective) {
        match *directive {
            TimingDirective::RestartStepAt { at } => match &mut self.span {
                Some(span) => span.restart(at),
                None => self.span = Some(PausableSpan::new(at)),
            },
            TimingDirective::SetStepDurationMs { duration_ms } => {
                self.required = Duration::from_millis(duration_ms);
            }
            TimingDirective::ForceStepSatisfiedAt { at } => {
                self.forced_at = Some(self.forced_at.map_or(at, |prev| prev.min(at)));
            }
            TimingDirective::PauseStepTimer { at } => {
                self.rule_hold = true;
                self.sync_hold(at);
            }
            TimingDirective::ResumeStepTimer { at } => {
                self.rule_hold = false;
                self.sync_hold(at);
            }
        }
    }
}

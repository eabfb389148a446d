//! Gated-ability rule
//!
//! Some abilities can only be used when the game allows it, so elapsed
//! dwell says nothing about them. When the gated ability is up next, the
//! step timer is held: a warning tooltip shows for a few ticks, then a
//! waiting tooltip stays until the ability is actually seen. Seeing it
//! releases the timer, forces the step through, and for a short window
//! zeroes the cast time of the first follow-up ability used.

use std::time::Duration;

use super::error::RuleError;
use super::patch::{OverrideSpec, TimingPatch};
use super::rule::{AbilityModificationRule, RuleHandle, TooltipSpec};
use super::selector::AbilitySelector;
use crate::runtime::{SequenceEvent, TimingDirective};

const WARNING_TOOLTIP: &str = "warning";
const WAITING_TOOLTIP: &str = "waiting";
const WARNING_COUNTER: &str = "warning";
const FOLLOW_UP_WINDOW: &str = "follow_up";
const FOLLOW_UP_OVERRIDE: &str = "follow_up_cast";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedAbilityConfig {
    pub gated_key: String,
    pub warning_text: String,
    pub warning_ticks: u32,
    pub waiting_text: String,
    pub follow_up_keys: Vec<String>,
    pub follow_up_window: Duration,
}

impl GatedAbilityConfig {
    pub fn new(gated_key: impl Into<String>) -> Self {
        let gated_key = gated_key.into();
        Self {
            warning_text: format!("{gated_key} is next"),
            warning_ticks: 2,
            waiting_text: format!("Waiting for {gated_key}"),
            follow_up_keys: Vec::new(),
            follow_up_window: Duration::from_millis(3000),
            gated_key,
        }
    }

    pub fn with_follow_ups<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.follow_up_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    /// Timer held, warning tooltip counting down
    Warning,
    /// Timer held until the gated ability is seen
    Waiting,
}

#[derive(Debug, Clone)]
pub struct GatedAbilityRule {
    id: String,
    config: GatedAbilityConfig,
    phase: GatePhase,
}

impl GatedAbilityRule {
    pub fn new(config: GatedAbilityConfig) -> Result<Self, RuleError> {
        let id = format!("gated_{}", config.gated_key);
        if config.gated_key.trim().is_empty() {
            return Err(RuleError::InvalidConfig {
                rule: id,
                reason: "gated ability key is empty".to_string(),
            });
        }
        Ok(Self {
            id,
            config,
            phase: GatePhase::Idle,
        })
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    fn hold(&mut self, handle: &mut RuleHandle<'_>) {
        handle.emit(TimingDirective::PauseStepTimer { at: handle.now() });
        handle.show_tooltip(
            WARNING_TOOLTIP,
            TooltipSpec::new(&self.config.warning_text).anchored_to(&self.config.gated_key),
        );
        handle.start_counter(WARNING_COUNTER, self.config.warning_ticks);
        self.phase = GatePhase::Warning;
    }

    fn wait(&mut self, handle: &mut RuleHandle<'_>) {
        handle.hide_tooltip(WARNING_TOOLTIP);
        handle.show_tooltip(
            WAITING_TOOLTIP,
            TooltipSpec::new(&self.config.waiting_text).anchored_to(&self.config.gated_key),
        );
        self.phase = GatePhase::Waiting;
    }

    fn release(&mut self, handle: &mut RuleHandle<'_>) {
        let now = handle.now();
        handle.emit(TimingDirective::ResumeStepTimer { at: now });
        handle.emit(TimingDirective::ForceStepSatisfiedAt { at: now });
        self.clear(handle);

        if !self.config.follow_up_keys.is_empty() {
            handle.open_window(FOLLOW_UP_WINDOW, Some(self.config.follow_up_window));
            handle.add_override(
                FOLLOW_UP_OVERRIDE,
                OverrideSpec::new(
                    AbilitySelector::keys(self.config.follow_up_keys.iter().cloned()),
                    TimingPatch::zero_cast(),
                )
                .in_window(FOLLOW_UP_WINDOW)
                .uses(1)
                .consume_on_match(),
            );
        }
    }

    fn clear(&mut self, handle: &mut RuleHandle<'_>) {
        handle.hide_tooltip(WARNING_TOOLTIP);
        handle.hide_tooltip(WAITING_TOOLTIP);
        handle.cancel_counter(WARNING_COUNTER);
        self.phase = GatePhase::Idle;
    }
}

impl AbilityModificationRule for GatedAbilityRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_event(&mut self, event: &SequenceEvent, handle: &mut RuleHandle<'_>) -> Result<(), RuleError> {
        match event {
            SequenceEvent::StepStarted { .. } => {
                if self.phase == GatePhase::Idle && handle.runtime().is_next(&self.config.gated_key) {
                    self.hold(handle);
                }
            }
            SequenceEvent::Heartbeat { .. } => {
                if self.phase == GatePhase::Warning && handle.counter_remaining(WARNING_COUNTER).is_none() {
                    self.wait(handle);
                }
            }
            SequenceEvent::AbilityDetected { ability, .. } | SequenceEvent::AbilityUsed { ability, .. } => {
                if self.phase != GatePhase::Idle && ability.key == self.config.gated_key {
                    self.release(handle);
                }
            }
            SequenceEvent::SequenceReset { .. } | SequenceEvent::SequenceInitialized { .. } => {
                if self.phase != GatePhase::Idle {
                    self.clear(handle);
                }
            }
            SequenceEvent::SequencePaused { .. }
            | SequenceEvent::SequenceResumed { .. }
            | SequenceEvent::StepAdvanced { .. }
            | SequenceEvent::LatchStarted { .. } => {}
        }
        Ok(())
    }
}

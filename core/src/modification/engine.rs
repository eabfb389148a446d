//! Ability modification engine
//!
//! Owns rule state (windows, counters, overrides, tooltips) and turns
//! runtime events into timing patches and step-timer directives. It is
//! driven from the single frame-processing call site, so nothing here is
//! synchronized.

use std::time::{Duration, Instant};

use tracing::{debug, error};

use super::rule::{AbilityModificationRule, ModificationState, RuleHandle, RuntimeTooltip};
use super::selector::{AbilityContext, RuntimeContext};
use crate::abilities::{AbilityConfig, AbilityRegistry, TimingProfile};
use crate::runtime::{SequenceEvent, TimingDirective};

pub struct AbilityModificationEngine {
    tick: Duration,
    rules: Vec<Box<dyn AbilityModificationRule>>,
    state: ModificationState,
}

impl AbilityModificationEngine {
    pub fn new(tick_duration_ms: u64) -> Self {
        Self {
            tick: Duration::from_millis(tick_duration_ms),
            rules: Vec::new(),
            state: ModificationState::default(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn AbilityModificationRule>) {
        debug!(rule = rule.id(), "Registered modification rule");
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Dispatch one event: collect garbage, pause or resume timers, run
    /// every rule, then spend uses of consume-on-match overrides.
    pub fn on_event(&mut self, event: &SequenceEvent, runtime: &RuntimeContext, registry: &dyn AbilityRegistry) {
        let now = event.at();
        self.state.collect_garbage(now);

        match event {
            SequenceEvent::SequencePaused { .. } => self.state.pause_all(now),
            SequenceEvent::SequenceResumed { .. } => self.state.resume_all(now),
            _ => {}
        }

        for rule in &mut self.rules {
            let rule_id = rule.id().to_string();
            let mut handle = RuleHandle::new(&rule_id, now, self.tick, runtime, &mut self.state);
            if let Err(e) = rule.on_event(event, &mut handle) {
                error!(rule = %rule_id, event = event.name(), error = %e, "Modification rule failed");
            }
        }

        if let Some(ability) = event.ability() {
            let config = registry
                .get_ability(&ability.key)
                .cloned()
                .unwrap_or_else(|| AbilityConfig::new(&ability.key));
            let context = AbilityContext {
                ability,
                config: &config,
                runtime,
            };
            let windows = &self.state.windows;
            for entry in self.state.overrides.iter_mut() {
                if !entry.consume_on_match || !entry.is_live(now, windows) || !entry.matches(&context) {
                    continue;
                }
                if let Some(uses) = entry.uses_remaining.as_mut() {
                    *uses = uses.saturating_sub(1);
                    debug!(id = %entry.id, remaining = *uses, "Consumed override use");
                }
            }
            self.state.overrides.retain(|o| o.uses_remaining != Some(0));
        }
    }

    /// Fold every live, matching override onto `base`, lowest priority
    /// first, creation order breaking ties.
    pub fn apply_timing_overrides(&self, context: &AbilityContext<'_>, base: TimingProfile) -> TimingProfile {
        let now = context.runtime.now;
        let mut active: Vec<_> = self
            .state
            .overrides
            .iter()
            .filter(|o| o.is_live(now, &self.state.windows) && o.matches(context))
            .collect();
        active.sort_by_key(|o| (o.priority, o.sequence));
        active.into_iter().fold(base, |profile, o| o.patch.apply(profile))
    }

    /// Take every queued directive, in emission order.
    pub fn drain_directives(&mut self) -> Vec<TimingDirective> {
        std::mem::take(&mut self.state.directives)
    }

    /// Tooltips that are live at `now`, sorted by id.
    pub fn active_tooltips(&self, now: Instant) -> Vec<RuntimeTooltip> {
        let mut tooltips: Vec<RuntimeTooltip> = self
            .state
            .tooltips
            .values()
            .filter(|t| t.is_live(now, &self.state.windows))
            .map(|t| t.tooltip.clone())
            .collect();
        tooltips.sort_by(|a, b| a.id.cmp(&b.id));
        tooltips
    }

    pub fn active_override_count(&self, now: Instant) -> usize {
        self.state
            .overrides
            .iter()
            .filter(|o| o.is_live(now, &self.state.windows))
            .count()
    }

    /// Forget all rule state; rules themselves stay registered.
    pub fn clear(&mut self) {
        self.state = ModificationState::default();
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

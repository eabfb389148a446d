//! Rule capability and the rule-scoped handle onto engine state

use std::time::{Duration, Instant};

use hashbrown::HashMap;

use super::error::RuleError;
use super::patch::{OverrideEntry, OverrideSpec};
use super::selector::RuntimeContext;
use super::window::{TickCounter, TimingWindow};
use crate::runtime::{SequenceEvent, TimingDirective};

/// Event-driven timing logic. Rules never touch the step timer directly;
/// they queue directives through the handle.
pub trait AbilityModificationRule: Send {
    /// Stable id; namespaces everything the rule creates.
    fn id(&self) -> &str;

    fn on_event(&mut self, event: &SequenceEvent, handle: &mut RuleHandle<'_>) -> Result<(), RuleError>;
}

/// A message for the presentation layer, owned by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeTooltip {
    /// Namespaced id (`rule::name`)
    pub id: String,
    pub text: String,
    /// Ability key the tooltip belongs next to, if any
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipSpec {
    pub text: String,
    pub anchor: Option<String>,
    pub window: Option<String>,
    pub expires_after: Option<Duration>,
}

impl TooltipSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            anchor: None,
            window: None,
            expires_after: None,
        }
    }

    pub fn anchored_to(mut self, key: impl Into<String>) -> Self {
        self.anchor = Some(key.into());
        self
    }

    pub fn in_window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    pub fn expires_after(mut self, duration: Duration) -> Self {
        self.expires_after = Some(duration);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TooltipEntry {
    pub tooltip: RuntimeTooltip,
    pub window: Option<String>,
    pub expires_at: Option<Instant>,
}

impl TooltipEntry {
    pub fn is_live(&self, now: Instant, windows: &HashMap<String, TimingWindow>) -> bool {
        if self.expires_at.is_some_and(|at| now >= at) {
            return false;
        }
        match &self.window {
            Some(id) => windows.get(id).is_some_and(|w| w.is_active(now)),
            None => true,
        }
    }
}

/// Everything the engine keeps on behalf of its rules.
#[derive(Debug, Default)]
pub(crate) struct ModificationState {
    pub windows: HashMap<String, TimingWindow>,
    pub counters: HashMap<String, TickCounter>,
    pub overrides: Vec<OverrideEntry>,
    pub tooltips: HashMap<String, TooltipEntry>,
    pub directives: Vec<TimingDirective>,
    pub next_sequence: u64,
}

impl ModificationState {
    /// Drop every expired window, counter, override and tooltip.
    pub fn collect_garbage(&mut self, now: Instant) {
        self.windows.retain(|_, w| w.is_active(now));
        self.counters.retain(|_, c| !c.is_expired(now));
        let windows = &self.windows;
        self.overrides.retain(|o| o.is_live(now, windows));
        self.tooltips.retain(|_, t| t.is_live(now, windows));
    }

    pub fn pause_all(&mut self, now: Instant) {
        self.windows.values_mut().for_each(|w| w.pause(now));
        self.counters.values_mut().for_each(|c| c.pause(now));
    }

    pub fn resume_all(&mut self, now: Instant) {
        self.windows.values_mut().for_each(|w| w.resume(now));
        self.counters.values_mut().for_each(|c| c.resume(now));
    }
}

pub(crate) fn scoped_id(rule: &str, name: &str) -> String {
    format!("{rule}::{name}")
}

/// A rule's view of engine state for one event. Every name passed in is
/// scoped to the calling rule.
pub struct RuleHandle<'a> {
    rule_id: &'a str,
    now: Instant,
    tick: Duration,
    runtime: &'a RuntimeContext,
    state: &'a mut ModificationState,
}

impl<'a> RuleHandle<'a> {
    pub(crate) fn new(
        rule_id: &'a str,
        now: Instant,
        tick: Duration,
        runtime: &'a RuntimeContext,
        state: &'a mut ModificationState,
    ) -> Self {
        Self {
            rule_id,
            now,
            tick,
            runtime,
            state,
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn runtime(&self) -> &RuntimeContext {
        self.runtime
    }

    fn id(&self, name: &str) -> String {
        scoped_id(self.rule_id, name)
    }

    // ─── Windows ───────────────────────────────────────────────────────────

    /// Open (or reopen) a window starting now.
    pub fn open_window(&mut self, name: &str, duration: Option<Duration>) {
        let id = self.id(name);
        self.state
            .windows
            .insert(id, TimingWindow::open(self.now, duration));
    }

    pub fn close_window(&mut self, name: &str) {
        if let Some(window) = self.state.windows.get_mut(&self.id(name)) {
            window.close();
        }
    }

    pub fn is_window_active(&self, name: &str) -> bool {
        self.state
            .windows
            .get(&self.id(name))
            .is_some_and(|w| w.is_active(self.now))
    }

    // ─── Counters ──────────────────────────────────────────────────────────

    /// Start (or restart) a countdown of `ticks` game ticks.
    pub fn start_counter(&mut self, name: &str, ticks: u32) {
        let id = self.id(name);
        self.state
            .counters
            .insert(id, TickCounter::start(self.now, self.tick, ticks));
    }

    pub fn cancel_counter(&mut self, name: &str) {
        self.state.counters.remove(&self.id(name));
    }

    /// Remaining ticks, or `None` once the counter is gone or expired.
    pub fn counter_remaining(&self, name: &str) -> Option<u32> {
        self.state
            .counters
            .get(&self.id(name))
            .map(|c| c.remaining_ticks(self.now))
            .filter(|remaining| *remaining > 0)
    }

    // ─── Overrides ─────────────────────────────────────────────────────────

    /// Add (or replace) a named override.
    pub fn add_override(&mut self, name: &str, spec: OverrideSpec) {
        let id = self.id(name);
        let window = spec.window.as_deref().map(|w| self.id(w));
        let sequence = self.state.next_sequence;
        self.state.next_sequence += 1;

        self.state.overrides.retain(|o| o.id != id);
        self.state.overrides.push(OverrideEntry {
            id,
            selector: spec.selector,
            patch: spec.patch,
            window,
            expires_at: spec.expires_after.map(|d| self.now + d),
            uses_remaining: spec.uses,
            consume_on_match: spec.consume_on_match,
            priority: spec.priority,
            sequence,
        });
    }

    pub fn remove_override(&mut self, name: &str) {
        let id = self.id(name);
        self.state.overrides.retain(|o| o.id != id);
    }

    pub fn has_override(&self, name: &str) -> bool {
        let id = self.id(name);
        self.state.overrides.iter().any(|o| o.id == id)
    }

    // ─── Tooltips ──────────────────────────────────────────────────────────

    pub fn show_tooltip(&mut self, name: &str, spec: TooltipSpec) {
        let id = self.id(name);
        let window = spec.window.as_deref().map(|w| self.id(w));
        let entry = TooltipEntry {
            tooltip: RuntimeTooltip {
                id: id.clone(),
                text: spec.text,
                anchor: spec.anchor,
            },
            window,
            expires_at: spec.expires_after.map(|d| self.now + d),
        };
        self.state.tooltips.insert(id, entry);
    }

    pub fn hide_tooltip(&mut self, name: &str) {
        self.state.tooltips.remove(&self.id(name));
    }

    // ─── Directives ────────────────────────────────────────────────────────

    pub fn emit(&mut self, directive: TimingDirective) {
        self.state.directives.push(directive);
    }
}

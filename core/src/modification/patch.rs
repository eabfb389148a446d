//! Timing patches and the override entries that carry them

use std::time::{Duration, Instant};

use hashbrown::HashMap;

use super::selector::{AbilityContext, AbilitySelector};
use super::window::TimingWindow;
use crate::abilities::TimingProfile;

/// Field-wise optional changes to a [`TimingProfile`]. Negative tick
/// values clamp to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingPatch {
    pub triggers_gcd: Option<bool>,
    pub cast_duration_ticks: Option<i64>,
    pub cooldown_ticks: Option<i64>,
    pub gcd_ticks: Option<i64>,
}

impl TimingPatch {
    pub fn zero_cast() -> Self {
        Self {
            cast_duration_ticks: Some(0),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, mut profile: TimingProfile) -> TimingProfile {
        if let Some(v) = self.triggers_gcd {
            profile.triggers_gcd = v;
        }
        if let Some(v) = self.cast_duration_ticks {
            profile.cast_duration_ticks = clamp_ticks(v);
        }
        if let Some(v) = self.cooldown_ticks {
            profile.cooldown_ticks = clamp_ticks(v);
        }
        if let Some(v) = self.gcd_ticks {
            profile.gcd_ticks = Some(clamp_ticks(v));
        }
        profile
    }
}

fn clamp_ticks(ticks: i64) -> u32 {
    u32::try_from(ticks.max(0)).unwrap_or(u32::MAX)
}

/// What a rule asks for when it adds an override. Window names are the
/// rule's own; the engine namespaces them.
#[derive(Debug, Clone)]
pub struct OverrideSpec {
    pub selector: AbilitySelector,
    pub patch: TimingPatch,
    pub window: Option<String>,
    pub expires_after: Option<Duration>,
    pub uses: Option<u32>,
    pub consume_on_match: bool,
    pub priority: i32,
}

impl OverrideSpec {
    pub fn new(selector: AbilitySelector, patch: TimingPatch) -> Self {
        Self {
            selector,
            patch,
            window: None,
            expires_after: None,
            uses: None,
            consume_on_match: false,
            priority: 0,
        }
    }

    /// Only active while the named window is.
    pub fn in_window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    pub fn expires_after(mut self, duration: Duration) -> Self {
        self.expires_after = Some(duration);
        self
    }

    pub fn uses(mut self, uses: u32) -> Self {
        self.uses = Some(uses);
        self
    }

    /// Spend a use whenever a matching ability is detected or used.
    pub fn consume_on_match(mut self) -> Self {
        self.consume_on_match = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A live override owned by the engine.
#[derive(Debug, Clone)]
pub struct OverrideEntry {
    pub id: String,
    pub selector: AbilitySelector,
    pub patch: TimingPatch,
    /// Namespaced window id
    pub window: Option<String>,
    pub expires_at: Option<Instant>,
    pub uses_remaining: Option<u32>,
    pub consume_on_match: bool,
    pub priority: i32,
    /// Creation order, tie-breaker after priority
    pub sequence: u64,
}

impl OverrideEntry {
    pub fn is_live(&self, now: Instant, windows: &HashMap<String, TimingWindow>) -> bool {
        if self.expires_at.is_some_and(|at| now >= at) || self.uses_remaining == Some(0) {
            return false;
        }
        match &self.window {
            Some(id) => windows.get(id).is_some_and(|w| w.is_active(now)),
            None => true,
        }
    }

    pub fn matches(&self, context: &AbilityContext<'_>) -> bool {
        self.selector.matches(context)
    }
}

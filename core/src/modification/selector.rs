//! Ability selectors: predicates over an ability and the runtime state

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::abilities::AbilityConfig;
use crate::runtime::AbilityRef;

/// Snapshot of where the sequence is, handed to rules and selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    pub now: Instant,
    pub current_step: usize,
    pub step_count: usize,
    /// Distinct ability keys of the current step
    pub current_keys: Vec<String>,
    /// Distinct ability keys of the next step
    pub next_keys: Vec<String>,
    pub paused: bool,
}

impl RuntimeContext {
    pub fn idle(now: Instant) -> Self {
        Self {
            now,
            current_step: 0,
            step_count: 0,
            current_keys: Vec::new(),
            next_keys: Vec::new(),
            paused: false,
        }
    }

    pub fn is_next(&self, key: &str) -> bool {
        self.next_keys.iter().any(|k| k == key)
    }

    pub fn is_current(&self, key: &str) -> bool {
        self.current_keys.iter().any(|k| k == key)
    }
}

/// What a selector gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct AbilityContext<'a> {
    pub ability: &'a AbilityRef,
    pub config: &'a AbilityConfig,
    pub runtime: &'a RuntimeContext,
}

type Predicate = dyn Fn(&AbilityContext<'_>) -> bool + Send + Sync;

/// Composable ability predicate.
#[derive(Clone)]
pub struct AbilitySelector(Arc<Predicate>);

impl fmt::Debug for AbilitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbilitySelector(..)")
    }
}

impl AbilitySelector {
    pub fn new(predicate: impl Fn(&AbilityContext<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, context: &AbilityContext<'_>) -> bool {
        (self.0)(context)
    }

    pub fn any() -> Self {
        Self::new(|_| true)
    }

    pub fn key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(move |ctx| ctx.ability.key == key)
    }

    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        Self::new(move |ctx| keys.iter().any(|k| *k == ctx.ability.key))
    }

    /// Matches the configured ability type, case-insensitively.
    pub fn ability_type(ability_type: impl Into<String>) -> Self {
        let ability_type = ability_type.into();
        Self::new(move |ctx| ctx.config.ability_type.eq_ignore_ascii_case(&ability_type))
    }

    pub fn and(self, other: Self) -> Self {
        Self::new(move |ctx| self.matches(ctx) && other.matches(ctx))
    }

    pub fn or(self, other: Self) -> Self {
        Self::new(move |ctx| self.matches(ctx) || other.matches(ctx))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::new(move |ctx| !self.matches(ctx))
    }
}

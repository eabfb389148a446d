//! Runtime vocabulary: sequence events and step-timing directives

use std::fmt;
use std::time::Instant;

use crate::dsl::AbilityToken;

/// An ability occurrence as seen by the runtime: key plus optional instance label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbilityRef {
    pub key: String,
    pub label: Option<String>,
}

impl AbilityRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
        }
    }

    pub fn labeled(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: Some(label.into()),
        }
    }
}

impl From<&AbilityToken> for AbilityRef {
    fn from(token: &AbilityToken) -> Self {
        Self {
            key: token.key.clone(),
            label: token.label.clone(),
        }
    }
}

impl fmt::Display for AbilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}[*{}]", self.key, label),
            None => f.write_str(&self.key),
        }
    }
}

/// Something that happened to the running sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    /// Emitted once per processed frame, before anything else
    Heartbeat { at: Instant },

    SequenceInitialized { at: Instant, step_count: usize },
    SequenceReset { at: Instant },
    SequencePaused { at: Instant },
    SequenceResumed { at: Instant },

    StepStarted { at: Instant, step_index: usize },
    StepAdvanced { at: Instant, from: usize, to: usize },

    /// Every term of the step has been seen at least once
    LatchStarted { at: Instant, step_index: usize },

    /// An ability of the upcoming step became visible
    AbilityDetected {
        at: Instant,
        ability: AbilityRef,
        step_index: usize,
    },

    /// An ability of the current step became visible
    AbilityUsed {
        at: Instant,
        ability: AbilityRef,
        step_index: usize,
    },
}

impl SequenceEvent {
    pub fn at(&self) -> Instant {
        match self {
            Self::Heartbeat { at }
            | Self::SequenceInitialized { at, .. }
            | Self::SequenceReset { at }
            | Self::SequencePaused { at }
            | Self::SequenceResumed { at }
            | Self::StepStarted { at, .. }
            | Self::StepAdvanced { at, .. }
            | Self::LatchStarted { at, .. }
            | Self::AbilityDetected { at, .. }
            | Self::AbilityUsed { at, .. } => *at,
        }
    }

    /// The ability the event is about, for detection events.
    pub fn ability(&self) -> Option<&AbilityRef> {
        match self {
            Self::AbilityDetected { ability, .. } | Self::AbilityUsed { ability, .. } => Some(ability),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Heartbeat { .. } => "heartbeat",
            Self::SequenceInitialized { .. } => "sequence_initialized",
            Self::SequenceReset { .. } => "sequence_reset",
            Self::SequencePaused { .. } => "sequence_paused",
            Self::SequenceResumed { .. } => "sequence_resumed",
            Self::StepStarted { .. } => "step_started",
            Self::StepAdvanced { .. } => "step_advanced",
            Self::LatchStarted { .. } => "latch_started",
            Self::AbilityDetected { .. } => "ability_detected",
            Self::AbilityUsed { .. } => "ability_used",
        }
    }
}

/// A command for the step timer. Rules queue these; the owner of the
/// active sequence drains and applies them once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingDirective {
    /// Restart the current step's dwell as if it began at `at`
    RestartStepAt { at: Instant },
    /// Replace the current step's required dwell
    SetStepDurationMs { duration_ms: u64 },
    /// Treat the current step as satisfied from `at` on
    ForceStepSatisfiedAt { at: Instant },
    PauseStepTimer { at: Instant },
    ResumeStepTimer { at: Instant },
}

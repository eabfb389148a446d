//! Ability modification engine
//!
//! Rules react to [`SequenceEvent`](crate::runtime::SequenceEvent)s and
//! temporarily change ability timing without the step timer or detector
//! knowing about any particular ability.
//!
//! - **window**: Pausable timing windows and tick counters
//! - **selector**: Predicates choosing which abilities an override touches
//! - **patch**: Timing patches and override entries
//! - **rule**: The rule trait and its scoped handle
//! - **engine**: Event dispatch, override resolution, directive queue
//! - **gated**: Hold the sequence until a gated ability is actually used

mod engine;
mod error;
mod gated;
mod patch;
mod rule;
mod selector;
mod window;

pub use engine::*;
pub use error::*;
pub use gated::*;
pub use patch::*;
pub use rule::{AbilityModificationRule, RuleHandle, RuntimeTooltip, TooltipSpec};
pub use selector::*;
pub use window::*;

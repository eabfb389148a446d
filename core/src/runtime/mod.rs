//! Runtime execution
//!
//! - **clock**: Pausable elapsed-time span
//! - **event**: Sequence events and timing directives
//! - **step_timer**: Per-step minimum dwell
//! - **sequence**: The AST cursor and its state machine
//! - **presentation**: Per-frame updates for the presentation layer
//! - **engine**: The frame loop tying detection, sequence and rules together

mod clock;
mod engine;
mod error;
mod event;
mod presentation;
mod sequence;
mod step_timer;

pub use clock::*;
pub use engine::*;
pub use error::*;
pub use event::*;
pub use presentation::*;
pub use sequence::*;
pub use step_timer::*;

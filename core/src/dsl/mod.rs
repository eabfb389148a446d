//! Rotation description language
//!
//! Rotations are written as text and parsed into a [`SequenceDefinition`]:
//!
//! - **token / tokenizer**: Raw text to tokens, tooltip extraction
//! - **parser**: Recursive descent over tokens, validation
//! - **ast**: Step/Term/Alternative tree and its linear view
//! - **overrides**: `#*label` / `#@key` ability setting overrides
//! - **codec**: Whole rotation files (expression + annotations) in and out

mod ast;
mod codec;
mod error;
mod overrides;
mod parser;
mod token;
mod tokenizer;

pub use ast::*;
pub use codec::*;
pub use error::*;
pub use overrides::*;
pub use parser::*;
pub use token::*;
pub use tokenizer::*;

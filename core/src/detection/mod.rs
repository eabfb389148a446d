//! Template detection engine
//!
//! - **geometry**: Points and rectangles
//! - **frame**: Captured frames and frame sources
//! - **template**: Template stores and mask-cropped templates
//! - **matcher**: Matching backends (CPU)
//! - **accelerator**: Optional device backend with CPU fallback
//! - **gpu**: wgpu compute device (`gpu` feature)
//! - **detector**: Per-ability detection with ROI caching
//! - **grading**: Diagnostic confidence grades
//! - **orchestrator**: Parallel per-frame fan-out

mod accelerator;
mod detector;
mod error;
mod frame;
mod geometry;
#[cfg(feature = "gpu")]
mod gpu;
mod grading;
mod matcher;
mod orchestrator;
mod template;

pub use accelerator::*;
pub use detector::*;
pub use error::*;
pub use frame::{Frame, FrameSource, ImageSequenceSource};
pub use geometry::*;
#[cfg(feature = "gpu")]
pub use gpu::{GpuTemplate, WgpuDevice};
pub use grading::*;
pub use matcher::*;
pub use orchestrator::*;
pub use template::*;

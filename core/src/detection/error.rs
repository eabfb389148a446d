//! Error types for template detection

use thiserror::Error;

use super::geometry::Rect;

/// Per-ability detection faults. The detector turns these into a
/// not-found result; they never escape a `detect` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("no template for '{key}'")]
    TemplateMissing { key: String },

    #[error("template for '{key}' is fully transparent")]
    EmptyTemplate { key: String },

    #[error("search region {region:?} is outside the {frame_width}x{frame_height} frame")]
    RoiOutOfBounds {
        region: Rect,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("template {template_width}x{template_height} does not fit search region {region:?}")]
    TemplateTooLarge {
        template_width: u32,
        template_height: u32,
        region: Rect,
    },

    #[error("failed to start detection workers: {reason}")]
    WorkerPool { reason: String },

    #[error("{backend} backend failed: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },
}

/// Faults of an optional matching accelerator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcceleratorError {
    #[error("accelerator unavailable: {0}")]
    Unavailable(String),

    #[error("accelerator call failed: {0}")]
    CallFailed(String),

    #[error("accelerator linkage failed: {0}")]
    Linkage(String),
}

//! Shared configuration types for rotascope
//!
//! This crate contains serializable configuration types that are shared between
//! the engine (rotascope-core) and its front-ends (rotascope-cli).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Engine Config
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level engine configuration, persisted with confy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between frame-processing ticks of the scheduler
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Wall-clock budget for one frame; overruns are logged only
    #[serde(default = "default_frame_budget_ms")]
    pub frame_budget_ms: u64,

    /// Length of one game tick (cooldown arithmetic unit)
    #[serde(default = "default_tick_duration_ms")]
    pub tick_duration_ms: u64,

    /// Minimum dwell in ticks for abilities that trigger the global cooldown
    #[serde(default = "default_gcd_ticks")]
    pub gcd_ticks: u32,

    #[serde(default)]
    pub detection: DetectionSettings,

    #[serde(default)]
    pub grading: GradingSettings,

    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub tokenizer: TokenizerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            frame_budget_ms: default_frame_budget_ms(),
            tick_duration_ms: default_tick_duration_ms(),
            gcd_ticks: default_gcd_ticks(),
            detection: DetectionSettings::default(),
            grading: GradingSettings::default(),
            runtime: RuntimeSettings::default(),
            tokenizer: TokenizerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_frame_budget_ms() -> u64 {
    1300
}

fn default_tick_duration_ms() -> u64 {
    600
}

fn default_gcd_ticks() -> u32 {
    3
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Default match threshold when an ability does not configure its own.
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Confidence required for `found` when the ability has no threshold
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,

    /// Padding (pixels) around a known bounding box for the ROI search
    #[serde(default = "default_roi_padding")]
    pub roi_padding_px: u32,

    /// Detection fan-out pool size (0 = one thread per core)
    #[serde(default)]
    pub worker_threads: usize,

    /// Match on the GPU before the CPU matcher. Needs a build with the
    /// `gpu` feature; ignored otherwise.
    #[serde(default = "default_true")]
    pub use_accelerator: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_DETECTION_THRESHOLD,
            roi_padding_px: default_roi_padding(),
            worker_threads: 0,
            use_accelerator: true,
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_DETECTION_THRESHOLD
}

fn default_roi_padding() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Grading
// ─────────────────────────────────────────────────────────────────────────────

/// Tolerances for diagnostic confidence grading, as ratios of the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradingSettings {
    /// Below threshold but within this ratio grades YELLOW
    #[serde(default = "default_yellow_tolerance")]
    pub yellow_tolerance: f32,

    /// Below YELLOW but within this ratio grades RED
    #[serde(default = "default_red_tolerance")]
    pub red_tolerance: f32,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            yellow_tolerance: default_yellow_tolerance(),
            red_tolerance: default_red_tolerance(),
        }
    }
}

impl GradingSettings {
    /// Tolerances ordered (yellow, red), swapping them if configured inverted.
    pub fn ordered(&self) -> (f32, f32) {
        let yellow = self.yellow_tolerance.max(0.0);
        let red = self.red_tolerance.max(0.0);
        if yellow > red { (red, yellow) } else { (yellow, red) }
    }
}

fn default_yellow_tolerance() -> f32 {
    0.02
}

fn default_red_tolerance() -> f32 {
    0.10
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Also require every term of the current step to have been seen
    /// before the step counts as satisfied (elapsed dwell alone otherwise)
    #[serde(default)]
    pub require_detection_to_advance: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log output of the front-end binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Also write a size-rotated log file
    #[serde(default = "default_true")]
    pub file: bool,

    /// Log file directory (platform config dir when unset)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,

    /// Rotated files kept next to the live one
    #[serde(default = "default_keep_files")]
    pub keep_files: usize,

    /// Debug output for the rotascope crates, same as `DEBUG_LOGGING=1`
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: true,
            directory: None,
            max_file_mb: default_max_file_mb(),
            keep_files: default_keep_files(),
            debug: false,
        }
    }
}

fn default_max_file_mb() -> u64 {
    10
}

fn default_keep_files() -> usize {
    1
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokenizer
// ─────────────────────────────────────────────────────────────────────────────

/// Word-level rewrite rules applied while tokenizing rotation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizerSettings {
    /// Trailing words that are abilities in their own right
    /// ("tsunami eof" → "tsunami + eof")
    #[serde(default = "default_suffix_qualifiers")]
    pub suffix_qualifiers: Vec<String>,

    /// Adjacent-word pairs that are two abilities used together
    #[serde(default = "default_ability_pairs")]
    pub ability_pairs: Vec<(String, String)>,
}

impl Default for TokenizerSettings {
    fn default() -> Self {
        Self {
            suffix_qualifiers: default_suffix_qualifiers(),
            ability_pairs: default_ability_pairs(),
        }
    }
}

fn default_suffix_qualifiers() -> Vec<String> {
    vec!["eof".to_string(), "spec".to_string()]
}

fn default_ability_pairs() -> Vec<(String, String)> {
    vec![("vuln".to_string(), "bomb".to_string())]
}

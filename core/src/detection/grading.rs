//! Diagnostic confidence grades
//!
//! Grades never gate detection; `found` is decided by the threshold alone.
//! They tell a rotation author how close a miss was.

use std::fmt;

use rotascope_types::GradingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfidenceGrade {
    /// At or above the threshold
    Green,
    /// Just below the threshold
    Yellow,
    /// Well below, but plausibly the right icon
    Red,
    NotFound,
}

impl fmt::Display for ConfidenceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
            Self::NotFound => "not found",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGrader {
    yellow_tolerance: f32,
    red_tolerance: f32,
}

impl Default for ConfidenceGrader {
    fn default() -> Self {
        Self::new(&GradingSettings::default())
    }
}

impl ConfidenceGrader {
    /// Tolerances are ratios of the threshold; an inverted pair is swapped.
    pub fn new(settings: &GradingSettings) -> Self {
        let (yellow_tolerance, red_tolerance) = settings.ordered();
        Self {
            yellow_tolerance,
            red_tolerance,
        }
    }

    pub fn grade(&self, threshold: f32, confidence: f32) -> ConfidenceGrade {
        if confidence >= threshold {
            ConfidenceGrade::Green
        } else if confidence >= threshold * (1.0 - self.yellow_tolerance) {
            ConfidenceGrade::Yellow
        } else if confidence >= threshold * (1.0 - self.red_tolerance) {
            ConfidenceGrade::Red
        } else {
            ConfidenceGrade::NotFound
        }
    }
}

//! Template matching backends
//!
//! The score is masked normalized squared difference:
//!
//! ```text
//! R(x,y) = Σ (w·T − w·I)² / sqrt(Σ (w·T)² · Σ (w·I)²)
//! ```
//!
//! with `w` the template mask weight, summed over the template's pixels and
//! colour channels. Confidence is `1 − min R`, clamped to `0..=1`.

use rayon::prelude::*;

use super::error::DetectionError;
use super::frame::Frame;
use super::geometry::{Point, Rect};
use super::template::PreparedTemplate;

/// Best placement of a template inside a search area, frame-local.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    /// Top-left of the best placement
    pub location: Point,
    pub confidence: f32,
}

/// A matching implementation. All coordinates are frame-local.
pub trait MatchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn best_match(
        &self,
        frame: &Frame,
        template: &PreparedTemplate,
        search: Rect,
    ) -> Result<MatchScore, DetectionError>;

    /// Drop anything cached per template. Called when templates are
    /// re-prepared, e.g. after a mask override changes.
    fn invalidate(&self) {}
}

/// Validate that `search` lies in the frame and can hold the template.
pub fn check_search_area(
    frame: &Frame,
    template: &PreparedTemplate,
    search: Rect,
) -> Result<(), DetectionError> {
    if search.is_empty() || !frame.bounds().contains_rect(&search) {
        return Err(DetectionError::RoiOutOfBounds {
            region: search,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }
    if template.width() > search.width || template.height() > search.height {
        return Err(DetectionError::TemplateTooLarge {
            template_width: template.width(),
            template_height: template.height(),
            region: search,
        });
    }
    Ok(())
}

/// Plain CPU matcher. Candidate rows are scored in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuMatcher;

impl CpuMatcher {
    pub fn new() -> Self {
        Self
    }

    fn score_at(frame: &Frame, template: &PreparedTemplate, fx: u32, fy: u32) -> f64 {
        let image = frame.image();
        let pixels = template.pixels();
        let mut diff = 0.0f64;
        let mut sum_t = 0.0f64;
        let mut sum_i = 0.0f64;

        for ty in 0..template.height() {
            for tx in 0..template.width() {
                let w = f64::from(template.weight(tx, ty));
                if w == 0.0 {
                    continue;
                }
                let t = pixels.get_pixel(tx, ty);
                let i = image.get_pixel(fx + tx, fy + ty);
                for c in 0..3 {
                    let tv = w * f64::from(t[c]) / 255.0;
                    let iv = w * f64::from(i[c]) / 255.0;
                    diff += (tv - iv) * (tv - iv);
                    sum_t += tv * tv;
                    sum_i += iv * iv;
                }
            }
        }

        let denom = (sum_t * sum_i).sqrt();
        if denom > f64::EPSILON {
            diff / denom
        } else if diff <= f64::EPSILON {
            // Both black under the mask
            0.0
        } else {
            1.0
        }
    }
}

impl MatchBackend for CpuMatcher {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn best_match(
        &self,
        frame: &Frame,
        template: &PreparedTemplate,
        search: Rect,
    ) -> Result<MatchScore, DetectionError> {
        check_search_area(frame, template, search)?;

        let x0 = search.x as u32;
        let y0 = search.y as u32;
        let cols = search.width - template.width() + 1;
        let rows = search.height - template.height() + 1;

        let best = (0..rows)
            .into_par_iter()
            .map(|dy| {
                let fy = y0 + dy;
                (0..cols)
                    .map(|dx| (Self::score_at(frame, template, x0 + dx, fy), x0 + dx, fy))
                    .fold((f64::INFINITY, x0, fy), |best, cur| if cur.0 < best.0 { cur } else { best })
            })
            // Lowest score, ties to the top-left-most placement
            .reduce(
                || (f64::INFINITY, x0, y0),
                |a, b| {
                    if b.0 < a.0 || (b.0 == a.0 && (b.2, b.1) < (a.2, a.1)) {
                        b
                    } else {
                        a
                    }
                },
            );

        let (score, x, y) = best;
        if !score.is_finite() {
            return Err(DetectionError::Backend {
                backend: self.name(),
                reason: "no candidate placement scored".to_string(),
            });
        }
        Ok(MatchScore {
            location: Point::new(x as i32, y as i32),
            confidence: (1.0 - score).clamp(0.0, 1.0) as f32,
        })
    }
}

//! Per-ability template detection with region-of-interest caching
//!
//! Each ability key remembers where it was last found. The next frame
//! first searches a padded box around that spot and only falls back to the
//! full frame on a miss. Every fault degrades to a not-found result.

use std::sync::{Arc, PoisonError, RwLock};

use hashbrown::HashMap;
use rotascope_types::DetectionSettings;
use serde::Serialize;
use tracing::debug;

use super::accelerator::backend_for;
use super::error::DetectionError;
use super::frame::Frame;
use super::geometry::{Point, Rect};
use super::matcher::{MatchBackend, MatchScore};
use super::template::{PreparedTemplate, TemplateStore};
use crate::abilities::{AbilityRegistry, resolve_ability};
use crate::dsl::RotationSettings;

/// Outcome of looking for one ability in one frame. Coordinates are absolute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub ability_key: String,
    pub found: bool,
    /// Top-left of the match, when found
    pub location: Option<Point>,
    /// Best confidence seen, found or not
    pub confidence: f32,
    pub bounding_box: Option<Rect>,
    /// The ability is one option of a `/` choice
    pub is_alternative: bool,
}

impl DetectionResult {
    pub fn not_found(ability_key: impl Into<String>, is_alternative: bool) -> Self {
        Self {
            ability_key: ability_key.into(),
            found: false,
            location: None,
            confidence: 0.0,
            bounding_box: None,
            is_alternative,
        }
    }
}

pub struct TemplateDetector {
    templates: Arc<dyn TemplateStore>,
    abilities: Arc<dyn AbilityRegistry>,
    backend: Box<dyn MatchBackend>,
    settings: DetectionSettings,
    rotation: RwLock<RotationSettings>,
    prepared: RwLock<HashMap<String, Arc<PreparedTemplate>>>,
    /// Last found box per key, frame-local
    known_locations: RwLock<HashMap<String, Rect>>,
}

impl TemplateDetector {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        abilities: Arc<dyn AbilityRegistry>,
        backend: Box<dyn MatchBackend>,
        settings: DetectionSettings,
    ) -> Self {
        Self {
            templates,
            abilities,
            backend,
            settings,
            rotation: RwLock::new(RotationSettings::default()),
            prepared: RwLock::new(HashMap::new()),
            known_locations: RwLock::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    /// Detector on the backend `settings` ask for (see [`backend_for`]).
    pub fn from_settings(
        templates: Arc<dyn TemplateStore>,
        abilities: Arc<dyn AbilityRegistry>,
        settings: DetectionSettings,
    ) -> Self {
        let backend = backend_for(&settings);
        Self::new(templates, abilities, backend, settings)
    }

    /// Per-ability overrides (threshold, mask) from the loaded rotation.
    /// Prepared templates are rebuilt since masks may have changed, and the
    /// backend drops its copies of the old ones.
    pub fn set_rotation_settings(&self, settings: RotationSettings) {
        *self.rotation.write().unwrap_or_else(PoisonError::into_inner) = settings;
        self.prepared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.backend.invalidate();
    }

    /// Threshold that decides `found` for this key.
    pub fn threshold_for(&self, key: &str) -> f32 {
        let rotation = self.rotation.read().unwrap_or_else(PoisonError::into_inner);
        resolve_ability(self.abilities.as_ref(), &rotation, key, None)
            .threshold_or(self.settings.default_threshold)
    }

    pub fn known_location(&self, key: &str) -> Option<Rect> {
        self.known_locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn forget_locations(&self) {
        self.known_locations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Detect one ability, ROI first when its location is known.
    pub fn detect(&self, frame: &Frame, key: &str, is_alternative: bool) -> DetectionResult {
        self.try_detect(frame, key)
            .map(|hit| self.to_result(frame, key, is_alternative, hit))
            .unwrap_or_else(|e| degrade(key, is_alternative, &e))
    }

    /// Detect one ability inside an absolute-coordinate region only.
    pub fn detect_in_region(
        &self,
        frame: &Frame,
        key: &str,
        roi: Rect,
        is_alternative: bool,
    ) -> DetectionResult {
        let region = frame.region();
        let local = roi.offset(-region.x, -region.y);
        let attempt = frame
            .bounds()
            .intersect(&local)
            .ok_or(DetectionError::RoiOutOfBounds {
                region: roi,
                frame_width: frame.width(),
                frame_height: frame.height(),
            })
            .and_then(|search| self.search(frame, key, search));
        attempt
            .map(|hit| self.to_result(frame, key, is_alternative, hit))
            .unwrap_or_else(|e| degrade(key, is_alternative, &e))
    }

    /// Best-effort warm-up: full-frame search for keys that have a template
    /// but no known location yet.
    pub fn cache_locations(&self, frame: &Frame, keys: &[&str]) -> HashMap<String, DetectionResult> {
        keys.iter()
            .filter(|key| self.templates.has_template(key) && self.known_location(key).is_none())
            .map(|key| (key.to_string(), self.detect(frame, key, false)))
            .collect()
    }

    fn try_detect(&self, frame: &Frame, key: &str) -> Result<Hit, DetectionError> {
        if let Some(known) = self.known_location(key) {
            let roi = frame.bounds().intersect(&known.padded(self.settings.roi_padding_px));
            if let Some(roi) = roi {
                match self.search(frame, key, roi) {
                    Ok(hit) if hit.found => return Ok(hit),
                    Ok(_) => {}
                    Err(e) => debug!(key, error = %e, "ROI search failed, trying full frame"),
                }
            }
        }
        self.search(frame, key, frame.bounds())
    }

    /// Match inside a frame-local area and record the location on success.
    fn search(&self, frame: &Frame, key: &str, area: Rect) -> Result<Hit, DetectionError> {
        let template = self.prepared(key)?;
        let threshold = self.threshold_for(key);
        let MatchScore {
            location,
            confidence,
        } = self.backend.best_match(frame, &template, area)?;

        let found = confidence >= threshold;
        let bounds = Rect::new(location.x, location.y, template.width(), template.height());
        if found {
            self.known_locations
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), bounds);
        }
        Ok(Hit {
            found,
            confidence,
            bounds,
        })
    }

    fn prepared(&self, key: &str) -> Result<Arc<PreparedTemplate>, DetectionError> {
        if let Some(template) = self
            .prepared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(Arc::clone(template));
        }

        let image = self
            .templates
            .get_template(key)
            .ok_or_else(|| DetectionError::TemplateMissing {
                key: key.to_string(),
            })?;
        let mask_file = {
            let rotation = self.rotation.read().unwrap_or_else(PoisonError::into_inner);
            resolve_ability(self.abilities.as_ref(), &rotation, key, None).mask_file_name
        };
        let mask = mask_file.and_then(|file| self.templates.get_mask(&file));
        let template = PreparedTemplate::prepare(key, &image, mask.as_deref())
            .map(Arc::new)
            .ok_or_else(|| DetectionError::EmptyTemplate {
                key: key.to_string(),
            })?;

        self.prepared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Arc::clone(&template));
        Ok(template)
    }

    fn to_result(&self, frame: &Frame, key: &str, is_alternative: bool, hit: Hit) -> DetectionResult {
        let region = frame.region();
        let absolute = hit.bounds.offset(region.x, region.y);
        DetectionResult {
            ability_key: key.to_string(),
            found: hit.found,
            location: hit.found.then(|| absolute.origin()),
            confidence: hit.confidence,
            bounding_box: hit.found.then_some(absolute),
            is_alternative,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    found: bool,
    confidence: f32,
    /// Frame-local box of the best placement
    bounds: Rect,
}

fn degrade(key: &str, is_alternative: bool, error: &DetectionError) -> DetectionResult {
    debug!(key, error = %error, "Detection degraded to not found");
    DetectionResult::not_found(key, is_alternative)
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;

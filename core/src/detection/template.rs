//! Template images and their match-ready form

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::debug;

use super::frame::is_png;
use super::geometry::Rect;
use crate::abilities::RegistryError;

/// Source of ability icon templates.
pub trait TemplateStore: Send + Sync {
    fn has_template(&self, key: &str) -> bool;

    fn get_template(&self, key: &str) -> Option<Arc<DynamicImage>>;

    /// Every ability key with a template, sorted.
    fn template_keys(&self) -> Vec<String>;

    /// External mask image by file name. Stores without masks return `None`.
    fn get_mask(&self, _file_name: &str) -> Option<Arc<GrayImage>> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory store
// ─────────────────────────────────────────────────────────────────────────────

/// Every `*.png` in one directory, keyed by file stem.
///
/// `fireball.png` is the template for `fireball`. Masks live in a `masks/`
/// subdirectory, so a `maskFileName` of `fireball.png` reads
/// `masks/fireball.png`. They are decoded on first use and kept.
#[derive(Debug, Default)]
pub struct DirectoryTemplateStore {
    templates: HashMap<String, Arc<DynamicImage>>,
    mask_dir: PathBuf,
    /// Decoded masks, `None` for files that are missing or unreadable
    masks: RwLock<HashMap<String, Option<Arc<GrayImage>>>>,
}

impl DirectoryTemplateStore {
    pub const MASK_DIR: &'static str = "masks";

    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        let entries = fs::read_dir(dir).map_err(|source| RegistryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut templates = HashMap::new();
        for path in entries.flatten().map(|e| e.path()).filter(|p| is_png(p)) {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let image = image::open(&path).map_err(|source| RegistryError::DecodeImage {
                path: path.clone(),
                source,
            })?;
            templates.insert(stem.to_string(), Arc::new(image));
        }

        debug!(dir = %dir.display(), count = templates.len(), "Loaded templates");
        Ok(Self {
            templates,
            mask_dir: dir.join(Self::MASK_DIR),
            masks: RwLock::new(HashMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn decode_mask(&self, file_name: &str) -> Option<Arc<GrayImage>> {
        // Mask names are plain file names, never paths
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            debug!(file_name, "Ignoring mask name with a path");
            return None;
        }
        let path = self.mask_dir.join(file_name);
        match image::open(&path) {
            Ok(image) => Some(Arc::new(image.to_luma8())),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Mask unavailable");
                None
            }
        }
    }
}

impl TemplateStore for DirectoryTemplateStore {
    fn has_template(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    fn get_template(&self, key: &str) -> Option<Arc<DynamicImage>> {
        self.templates.get(key).cloned()
    }

    fn template_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.templates.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn get_mask(&self, file_name: &str) -> Option<Arc<GrayImage>> {
        if let Some(cached) = self
            .masks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_name)
        {
            return cached.clone();
        }
        let mask = self.decode_mask(file_name);
        self.masks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_name.to_string(), mask.clone());
        mask
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct MemoryTemplateStore {
    templates: HashMap<String, Arc<DynamicImage>>,
    masks: HashMap<String, Arc<GrayImage>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, image: DynamicImage) {
        self.templates.insert(key.into(), Arc::new(image));
    }

    pub fn insert_mask(&mut self, file_name: impl Into<String>, mask: GrayImage) {
        self.masks.insert(file_name.into(), Arc::new(mask));
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn has_template(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    fn get_template(&self, key: &str) -> Option<Arc<DynamicImage>> {
        self.templates.get(key).cloned()
    }

    fn template_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.templates.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn get_mask(&self, file_name: &str) -> Option<Arc<GrayImage>> {
        self.masks.get(file_name).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prepared template
// ─────────────────────────────────────────────────────────────────────────────

/// A template cropped to its visible area with per-pixel match weights.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    pub key: String,
    pixels: RgbImage,
    /// Row-major weights in 0..=1, one per pixel
    weights: Vec<f32>,
    /// Where the crop sat inside the original image
    crop: Rect,
}

impl PreparedTemplate {
    /// Split out the mask (external mask, else alpha, else fully opaque),
    /// crop both to the mask's non-zero bounding box and keep the colour
    /// channels. `None` when nothing is visible.
    pub fn prepare(key: &str, image: &DynamicImage, mask: Option<&GrayImage>) -> Option<Self> {
        let (width, height) = (image.width(), image.height());
        let rgba = image.to_rgba8();

        let mask_fits = mask.is_some_and(|m| m.dimensions() == (width, height));
        if mask.is_some() && !mask_fits {
            debug!(key, "Mask size differs from template, using alpha instead");
        }
        let weight_at = |x: u32, y: u32| -> u8 {
            match mask {
                Some(m) if mask_fits => m.get_pixel(x, y)[0],
                _ if image.color().has_alpha() => rgba.get_pixel(x, y)[3],
                _ => u8::MAX,
            }
        };

        let crop = visible_bounds(width, height, &weight_at)?;
        let pixels = image::imageops::crop_imm(&image.to_rgb8(), crop.x as u32, crop.y as u32, crop.width, crop.height)
            .to_image();
        let mut weights = Vec::with_capacity((crop.width * crop.height) as usize);
        for y in 0..crop.height {
            for x in 0..crop.width {
                weights.push(f32::from(weight_at(crop.x as u32 + x, crop.y as u32 + y)) / 255.0);
            }
        }

        Some(Self {
            key: key.to_string(),
            pixels,
            weights,
            crop,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn weight(&self, x: u32, y: u32) -> f32 {
        self.weights[(y * self.width() + x) as usize]
    }

    /// Crop rectangle within the source image.
    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// True when every weight is 1 (no transparency inside the crop).
    pub fn is_opaque(&self) -> bool {
        self.weights.iter().all(|&w| w >= 1.0)
    }
}

fn visible_bounds(width: u32, height: u32, weight_at: &impl Fn(u32, u32) -> u8) -> Option<Rect> {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    let mut any = false;
    for y in 0..height {
        for x in 0..width {
            if weight_at(x, y) > 0 {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    any.then(|| Rect::new(min_x as i32, min_y as i32, max_x - min_x + 1, max_y - min_y + 1))
}

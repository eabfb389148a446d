use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

use super::*;
use crate::abilities::AbilityCatalog;
use crate::detection::accelerator::{Accelerator, AcceleratedMatcher};
use crate::detection::error::AcceleratorError;
use crate::detection::matcher::CpuMatcher;
use crate::detection::template::MemoryTemplateStore;
use crate::dsl::AbilitySettingsOverrides;

const ICON: u32 = 6;

/// Records every search area before delegating to the CPU matcher.
#[derive(Default)]
struct RecordingBackend {
    searches: Mutex<Vec<Rect>>,
    invalidations: AtomicUsize,
}

impl RecordingBackend {
    fn take(&self) -> Vec<Rect> {
        std::mem::take(&mut *self.searches.lock().unwrap())
    }
}

impl MatchBackend for Arc<RecordingBackend> {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn best_match(
        &self,
        frame: &Frame,
        template: &PreparedTemplate,
        search: Rect,
    ) -> Result<MatchScore, DetectionError> {
        self.searches.lock().unwrap().push(search);
        CpuMatcher.best_match(frame, template, search)
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

fn make_icon(seed: u8) -> RgbImage {
    RgbImage::from_fn(ICON, ICON, |x, y| {
        let on = (x + y) % 2 == 0;
        Rgb([
            if on { 250 } else { seed },
            (x * 40) as u8,
            (y * 40).wrapping_add(u32::from(seed)) as u8,
        ])
    })
}

fn make_background(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 13) % 97) as u8,
            ((x * 3 + y * 5) % 89) as u8,
            ((x * 11 + y * 2) % 83) as u8,
        ])
    })
}

fn make_frame(icons: &[(&RgbImage, u32, u32)], origin: Point) -> Frame {
    let mut img = make_background(64, 48);
    for (icon, x, y) in icons {
        image::imageops::replace(&mut img, *icon, i64::from(*x), i64::from(*y));
    }
    Frame::from_capture(
        DynamicImage::ImageRgb8(img),
        Rect::new(origin.x, origin.y, 0, 0),
    )
}

fn make_store() -> MemoryTemplateStore {
    let mut store = MemoryTemplateStore::new();
    store.insert("fireball", DynamicImage::ImageRgb8(make_icon(10)));
    store.insert("heal", DynamicImage::ImageRgb8(make_icon(120)));
    store
}

fn make_detector(
    store: MemoryTemplateStore,
    catalog: AbilityCatalog,
) -> (TemplateDetector, Arc<RecordingBackend>) {
    let backend = Arc::new(RecordingBackend::default());
    let detector = TemplateDetector::new(
        Arc::new(store),
        Arc::new(catalog),
        Box::new(Arc::clone(&backend)),
        DetectionSettings::default(),
    );
    (detector, backend)
}

// ─────────────────────────────────────────────────────────────────────────────
// Basic detection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_found_location_is_absolute() {
    let (detector, _) = make_detector(make_store(), AbilityCatalog::new());
    let icon = make_icon(10);
    let frame = make_frame(&[(&icon, 20, 15)], Point::new(100, 200));

    let result = detector.detect(&frame, "fireball", true);
    assert!(result.found, "confidence {}", result.confidence);
    assert_eq!(result.location, Some(Point::new(120, 215)));
    assert_eq!(result.bounding_box, Some(Rect::new(120, 215, ICON, ICON)));
    assert!(result.is_alternative);
    assert_eq!(detector.known_location("fireball"), Some(Rect::new(20, 15, ICON, ICON)), "cache stays frame-local");
}

#[test]
fn test_absent_icon_is_not_found() {
    let (detector, _) = make_detector(make_store(), AbilityCatalog::new());
    let frame = make_frame(&[], Point::default());

    let result = detector.detect(&frame, "fireball", false);
    assert!(!result.found);
    assert_eq!(result.location, None);
    assert!(result.confidence < 0.99);
    assert_eq!(detector.known_location("fireball"), None);
}

#[test]
fn test_missing_template_degrades_to_not_found() {
    let (detector, backend) = make_detector(make_store(), AbilityCatalog::new());
    let frame = make_frame(&[], Point::default());

    let result = detector.detect(&frame, "nonexistent", false);
    assert_eq!(result, DetectionResult::not_found("nonexistent", false));
    assert!(backend.take().is_empty(), "backend never called without a template");
}

#[test]
fn test_fully_transparent_template_degrades() {
    let mut store = make_store();
    store.insert(
        "ghost",
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 0]))),
    );
    let (detector, _) = make_detector(store, AbilityCatalog::new());
    let result = detector.detect(&make_frame(&[], Point::default()), "ghost", false);
    assert!(!result.found);
}

// ─────────────────────────────────────────────────────────────────────────────
// ROI caching
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_second_frame_searches_roi_first() {
    let (detector, backend) = make_detector(make_store(), AbilityCatalog::new());
    let icon = make_icon(10);
    let frame = make_frame(&[(&icon, 20, 15)], Point::default());

    assert!(detector.detect(&frame, "fireball", false).found);
    assert_eq!(backend.take(), vec![frame.bounds()], "first frame is a full search");

    assert!(detector.detect(&frame, "fireball", false).found);
    let roi = Rect::new(20, 15, ICON, ICON).padded(12);
    assert_eq!(backend.take(), vec![roi], "hit in ROI skips the full frame");
}

#[test]
fn test_roi_miss_falls_back_to_full_frame() {
    let (detector, backend) = make_detector(make_store(), AbilityCatalog::new());
    let icon = make_icon(10);

    let first = make_frame(&[(&icon, 2, 2)], Point::default());
    assert!(detector.detect(&first, "fireball", false).found);
    backend.take();

    let moved = make_frame(&[(&icon, 50, 38)], Point::default());
    let result = detector.detect(&moved, "fireball", false);
    assert!(result.found);
    assert_eq!(result.location, Some(Point::new(50, 38)));

    let searches = backend.take();
    assert_eq!(searches.len(), 2, "ROI then full frame: {searches:?}");
    assert_eq!(searches[0], Rect::new(0, 0, 20, 20), "ROI is clipped to the frame");
    assert_eq!(searches[1], moved.bounds());
    assert_eq!(detector.known_location("fireball"), Some(Rect::new(50, 38, ICON, ICON)));
}

#[test]
fn test_cache_locations_skips_known_and_missing() {
    let (detector, backend) = make_detector(make_store(), AbilityCatalog::new());
    let fire = make_icon(10);
    let heal = make_icon(120);
    let frame = make_frame(&[(&fire, 5, 5), (&heal, 40, 30)], Point::default());

    assert!(detector.detect(&frame, "fireball", false).found);
    backend.take();

    let warmed = detector.cache_locations(&frame, &["fireball", "heal", "unknown"]);
    assert_eq!(warmed.len(), 1);
    assert!(warmed["heal"].found);
    assert_eq!(backend.take().len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Regions, thresholds, masks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_detect_in_region_uses_absolute_roi() {
    let (detector, backend) = make_detector(make_store(), AbilityCatalog::new());
    let icon = make_icon(10);
    let frame = make_frame(&[(&icon, 30, 20)], Point::new(1000, 500));

    let hit = detector.detect_in_region(&frame, "fireball", Rect::new(1025, 515, 20, 20), false);
    assert!(hit.found);
    assert_eq!(hit.location, Some(Point::new(1030, 520)));
    assert_eq!(backend.take(), vec![Rect::new(25, 15, 20, 20)]);

    let elsewhere = detector.detect_in_region(&frame, "fireball", Rect::new(1000, 500, 12, 12), false);
    assert!(!elsewhere.found);

    let outside = detector.detect_in_region(&frame, "fireball", Rect::new(0, 0, 50, 50), false);
    assert!(!outside.found);
}

#[test]
fn test_catalog_threshold_and_rotation_override() {
    let catalog =
        AbilityCatalog::from_toml_str("[[ability]]\nkey = \"fireball\"\ndetection_threshold = 0.5\n", 600)
            .unwrap();
    let (detector, _) = make_detector(make_store(), catalog);
    assert_eq!(detector.threshold_for("fireball"), 0.5);
    assert_eq!(detector.threshold_for("heal"), 0.99);

    let mut rotation = RotationSettings::default();
    rotation.per_ability.insert(
        "fireball".to_string(),
        AbilitySettingsOverrides {
            detection_threshold: Some(0.75),
            ..Default::default()
        },
    );
    detector.set_rotation_settings(rotation);
    assert_eq!(detector.threshold_for("fireball"), 0.75);
}

#[test]
fn test_rotation_settings_invalidate_backend_templates() {
    let (detector, backend) = make_detector(make_store(), AbilityCatalog::new());
    detector.set_rotation_settings(RotationSettings::default());
    assert_eq!(backend.invalidations.load(Ordering::SeqCst), 1);
}

#[test]
fn test_from_settings_honours_accelerator_switch() {
    let settings = DetectionSettings {
        use_accelerator: false,
        ..DetectionSettings::default()
    };
    let detector = TemplateDetector::from_settings(
        Arc::new(make_store()),
        Arc::new(AbilityCatalog::new()),
        settings,
    );
    assert_eq!(detector.backend_name(), "cpu");
}

#[test]
fn test_external_mask_hides_changed_pixels() {
    // Template has a corner that differs from what is on screen; the mask
    // excludes that corner so the match is still exact.
    let on_screen = make_icon(10);
    let mut template = on_screen.clone();
    template.put_pixel(0, 0, Rgb([0, 255, 0]));
    template.put_pixel(1, 0, Rgb([0, 255, 0]));

    let mut mask = GrayImage::from_pixel(ICON, ICON, Luma([255]));
    mask.put_pixel(0, 0, Luma([0]));
    mask.put_pixel(1, 0, Luma([0]));

    let mut store = MemoryTemplateStore::new();
    store.insert("fireball", DynamicImage::ImageRgb8(template));
    store.insert_mask("fireball_mask.png", mask);
    let catalog = AbilityCatalog::from_toml_str(
        "[[ability]]\nkey = \"fireball\"\nmask_file_name = \"fireball_mask.png\"\n",
        600,
    )
    .unwrap();
    let (detector, _) = make_detector(store, catalog);

    let frame = make_frame(&[(&on_screen, 10, 10)], Point::default());
    let result = detector.detect(&frame, "fireball", false);
    assert!(result.found, "confidence {}", result.confidence);
    assert!(result.confidence > 0.999);
}

// ─────────────────────────────────────────────────────────────────────────────
// Accelerator fallback
// ─────────────────────────────────────────────────────────────────────────────

struct BrokenDevice;

impl Accelerator for BrokenDevice {
    type Buffer = ();

    fn name(&self) -> &'static str {
        "broken"
    }

    fn connect(&self) -> Result<(), AcceleratorError> {
        Ok(())
    }

    fn upload(&self, _: &PreparedTemplate) -> Result<(), AcceleratorError> {
        Ok(())
    }

    fn match_template(&self, _: &Frame, _: &(), _: Rect) -> Result<MatchScore, AcceleratorError> {
        Err(AcceleratorError::CallFailed("device lost".to_string()))
    }
}

#[test]
fn test_accelerator_failure_is_invisible() {
    let icon = make_icon(10);
    let frame = make_frame(&[(&icon, 20, 15)], Point::new(100, 200));

    let cpu = TemplateDetector::new(
        Arc::new(make_store()),
        Arc::new(AbilityCatalog::new()),
        Box::new(CpuMatcher),
        DetectionSettings::default(),
    );
    let accelerated = TemplateDetector::new(
        Arc::new(make_store()),
        Arc::new(AbilityCatalog::new()),
        Box::new(AcceleratedMatcher::new(BrokenDevice)),
        DetectionSettings::default(),
    );

    let expected = cpu.detect(&frame, "fireball", false);
    let actual = accelerated.detect(&frame, "fireball", false);
    assert_eq!(actual, expected);
    assert_eq!(actual.location, Some(Point::new(120, 215)));
}

use std::time::Duration;

use image::{DynamicImage, RgbImage};

use super::*;
use crate::abilities::{AbilityConfig, TimingProfile};
use crate::detection::{MemoryTemplateStore, Point, Rect};
use crate::dsl::parse;

/// Every ability gets the same profile.
struct FixedTiming(TimingProfile);

impl TimingSource for FixedTiming {
    fn timing_profile(&self, _: &AbilityRef) -> TimingProfile {
        self.0
    }
}

fn gcd_timing() -> FixedTiming {
    FixedTiming(AbilityConfig::new("any").timing_profile())
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn make_store(keys: &[&str]) -> MemoryTemplateStore {
    let mut store = MemoryTemplateStore::new();
    for key in keys {
        store.insert(*key, DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
    }
    store
}

fn make_sequence(text: &str, require_detection: bool) -> ActiveSequence {
    let mut config = EngineConfig::default();
    config.runtime.require_detection_to_advance = require_detection;
    ActiveSequence::new(parse(text).unwrap(), &config)
}

fn make_result(key: &str, found: bool) -> DetectionResult {
    if found {
        DetectionResult {
            ability_key: key.to_string(),
            found: true,
            location: Some(Point::new(1, 1)),
            confidence: 1.0,
            bounding_box: Some(Rect::new(1, 1, 2, 2)),
            is_alternative: false,
        }
    } else {
        DetectionResult::not_found(key, false)
    }
}

fn make_detections(current: &[(&str, bool)], next: &[(&str, bool)]) -> FrameDetections {
    FrameDetections {
        current: current.iter().map(|(k, f)| make_result(k, *f)).collect(),
        next: next.iter().map(|(k, f)| make_result(k, *f)).collect(),
        elapsed: Duration::ZERO,
    }
}

fn keys(required: &[RequiredAbility], placement: StepPlacement) -> Vec<&str> {
    required
        .iter()
        .filter(|r| r.placement == placement)
        .map(|r| r.key.as_str())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Required detection set
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_required_set_for_scenario() {
    let store = make_store(&["fireball", "heal", "shield", "buff"]);
    let mut sequence = make_sequence("fireball → (heal/shield) + buff", false);
    let t0 = Instant::now();
    sequence.initialize(&gcd_timing(), t0);

    let required = sequence.required_abilities(&store);
    assert_eq!(keys(&required, StepPlacement::Current), vec!["fireball"]);
    assert_eq!(keys(&required, StepPlacement::Next), vec!["heal", "shield", "buff"]);
    let flags: Vec<bool> = required.iter().map(|r| r.is_alternative).collect();
    assert_eq!(flags, vec![false, true, true, false]);

    sequence.try_advance(&gcd_timing(), t0 + ms(1800));
    let required = sequence.required_abilities(&store);
    assert_eq!(keys(&required, StepPlacement::Current), vec!["heal", "shield", "buff"]);
    assert!(keys(&required, StepPlacement::Next).is_empty(), "last step has no next");
}

#[test]
fn test_required_set_skips_missing_templates_and_duplicates() {
    let store = make_store(&["a", "c"]);
    let mut sequence = make_sequence("a + (b → a) / c → c", false);
    sequence.initialize(&gcd_timing(), Instant::now());

    let required = sequence.required_abilities(&store);
    assert_eq!(keys(&required, StepPlacement::Current), vec!["a", "c"]);
    assert_eq!(keys(&required, StepPlacement::Next), vec!["c"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Advancement
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_initialize_events() {
    let mut sequence = make_sequence("a → b", false);
    let t0 = Instant::now();
    let events = sequence.initialize(&gcd_timing(), t0);
    assert_eq!(
        events,
        vec![
            SequenceEvent::SequenceInitialized { at: t0, step_count: 2 },
            SequenceEvent::StepStarted { at: t0, step_index: 0 },
        ]
    );
}

#[test]
fn test_advances_on_elapsed_dwell_and_clamps_at_end() {
    let timing = gcd_timing();
    let mut sequence = make_sequence("a → b", false);
    let t0 = Instant::now();
    sequence.initialize(&timing, t0);

    assert!(sequence.try_advance(&timing, t0 + ms(1000)).is_empty());
    let events = sequence.try_advance(&timing, t0 + ms(1800));
    assert_eq!(
        events,
        vec![
            SequenceEvent::StepAdvanced { at: t0 + ms(1800), from: 0, to: 1 },
            SequenceEvent::StepStarted { at: t0 + ms(1800), step_index: 1 },
        ]
    );

    let events = sequence.try_advance(&timing, t0 + ms(3600));
    assert_eq!(events, vec![SequenceEvent::StepAdvanced { at: t0 + ms(3600), from: 1, to: 2 }]);
    assert!(sequence.is_complete());
    assert!(sequence.try_advance(&timing, t0 + ms(60_000)).is_empty(), "terminal state is sticky");
    assert_eq!(sequence.current_step_index(), 2);
}

#[test]
fn test_forced_step_advances_before_dwell() {
    let timing = gcd_timing();
    let mut sequence = make_sequence("a → b", false);
    let t0 = Instant::now();
    sequence.initialize(&timing, t0);

    sequence.apply_directive(&TimingDirective::ForceStepSatisfiedAt { at: t0 + ms(100) });
    assert!(sequence.try_advance(&timing, t0 + ms(50)).is_empty());
    assert_eq!(sequence.try_advance(&timing, t0 + ms(100)).len(), 2);
    assert_eq!(sequence.current_step_index(), 1);
    assert!(!sequence.is_step_satisfied(t0 + ms(200)), "force does not carry over");
}

#[test]
fn test_pause_blocks_advancement() {
    let timing = gcd_timing();
    let mut sequence = make_sequence("a → b", false);
    let t0 = Instant::now();
    sequence.initialize(&timing, t0);

    assert_eq!(sequence.pause(t0 + ms(500)), vec![SequenceEvent::SequencePaused { at: t0 + ms(500) }]);
    assert!(sequence.pause(t0 + ms(600)).is_empty());
    assert!(sequence.try_advance(&timing, t0 + ms(10_000)).is_empty());

    sequence.resume(t0 + ms(10_000));
    assert!(sequence.try_advance(&timing, t0 + ms(11_000)).is_empty(), "paused time excluded");
    assert_eq!(sequence.try_advance(&timing, t0 + ms(11_300)).len(), 2);
}

#[test]
fn test_reset_returns_to_first_step() {
    let timing = gcd_timing();
    let mut sequence = make_sequence("a → b → c", false);
    let t0 = Instant::now();
    sequence.initialize(&timing, t0);
    sequence.try_advance(&timing, t0 + ms(1800));
    sequence.process_detections(&make_detections(&[("b", true)], &[]), t0 + ms(1900));
    assert_eq!(sequence.current_step_index(), 1);

    let events = sequence.reset(&timing, t0 + ms(2000));
    assert_eq!(
        events,
        vec![
            SequenceEvent::SequenceReset { at: t0 + ms(2000) },
            SequenceEvent::StepStarted { at: t0 + ms(2000), step_index: 0 },
        ]
    );
    assert_eq!(sequence.current_step_index(), 0);
    assert!(sequence.last_detection("b").is_none());
    assert!(!sequence.is_step_satisfied(t0 + ms(3000)));
}

#[test]
fn test_empty_definition_is_complete() {
    let mut sequence = ActiveSequence::new(SequenceDefinition::default(), &EngineConfig::default());
    let t0 = Instant::now();
    let events = sequence.initialize(&gcd_timing(), t0);
    assert_eq!(events, vec![SequenceEvent::SequenceInitialized { at: t0, step_count: 0 }]);
    assert!(sequence.is_complete());
    assert!(sequence.try_advance(&gcd_timing(), t0 + ms(5000)).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection events and latching
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rising_edges_for_current_and_next() {
    let timing = gcd_timing();
    let mut sequence = make_sequence("a → b", false);
    let t0 = Instant::now();
    sequence.initialize(&timing, t0);

    let events = sequence.process_detections(&make_detections(&[("a", true)], &[("b", true)]), t0);
    assert_eq!(
        events,
        vec![
            SequenceEvent::AbilityUsed { at: t0, ability: AbilityRef::new("a"), step_index: 0 },
            SequenceEvent::AbilityDetected { at: t0, ability: AbilityRef::new("b"), step_index: 1 },
            SequenceEvent::LatchStarted { at: t0, step_index: 0 },
        ]
    );

    let still_visible = sequence.process_detections(&make_detections(&[("a", true)], &[("b", true)]), t0 + ms(100));
    assert!(still_visible.is_empty(), "no edge while the icon stays visible");

    sequence.process_detections(&make_detections(&[("a", false)], &[("b", true)]), t0 + ms(200));
    let again = sequence.process_detections(&make_detections(&[("a", true)], &[("b", true)]), t0 + ms(300));
    assert_eq!(again.len(), 1);
    assert!(matches!(again[0], SequenceEvent::AbilityUsed { .. }));
    assert!(sequence.last_detection("a").is_some_and(|r| r.found));
}

#[test]
fn test_used_wins_when_key_is_in_both_steps() {
    let mut sequence = make_sequence("a[*1] → a[*2]", false);
    let t0 = Instant::now();
    sequence.initialize(&gcd_timing(), t0);

    let events = sequence.process_detections(&make_detections(&[("a", true)], &[("a", true)]), t0);
    assert_eq!(
        events[0],
        SequenceEvent::AbilityUsed {
            at: t0,
            ability: AbilityRef::labeled("a", "1"),
            step_index: 0,
        }
    );
    assert!(!events.iter().any(|e| matches!(e, SequenceEvent::AbilityDetected { .. })));
}

#[test]
fn test_detection_required_waits_for_latch() {
    let timing = gcd_timing();
    let mut sequence = make_sequence("a + b/c → d", true);
    let t0 = Instant::now();
    sequence.initialize(&timing, t0);

    sequence.process_detections(&make_detections(&[("a", true), ("b", false), ("c", false)], &[]), t0);
    assert!(!sequence.is_latched());
    assert!(sequence.try_advance(&timing, t0 + ms(5000)).is_empty(), "dwell alone is not enough");

    // Terms may be seen in different frames
    let events = sequence.process_detections(
        &make_detections(&[("a", false), ("b", false), ("c", true)], &[]),
        t0 + ms(5100),
    );
    assert!(events.contains(&SequenceEvent::LatchStarted { at: t0 + ms(5100), step_index: 0 }));
    assert!(sequence.is_latched());

    let again = sequence.process_detections(&make_detections(&[("a", true)], &[]), t0 + ms(5200));
    assert!(!again.iter().any(|e| matches!(e, SequenceEvent::LatchStarted { .. })), "latch fires once");

    assert_eq!(sequence.try_advance(&timing, t0 + ms(5200)).len(), 2);
    assert!(!sequence.is_latched(), "latch is per step");
}

#[test]
fn test_group_alternative_latches_when_whole_group_seen() {
    let mut sequence = make_sequence("(x → y) / z", true);
    let t0 = Instant::now();
    sequence.initialize(&gcd_timing(), t0);

    sequence.process_detections(&make_detections(&[("x", true)], &[]), t0);
    assert!(!sequence.is_latched());
    sequence.process_detections(&make_detections(&[("y", true)], &[]), t0);
    assert!(sequence.is_latched());
}

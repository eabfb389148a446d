//! Ability configuration and timing profile

use serde::{Deserialize, Serialize};

use crate::dsl::AbilitySettingsOverrides;
use crate::serde_defaults::{default_ability_type, default_true};

/// Static configuration for one ability, as loaded from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityConfig {
    /// Ability key as written in rotations and used for template file names
    pub key: String,

    /// Free-form category ("basic", "threshold", "channel", ...) used by selectors
    #[serde(default = "default_ability_type", rename = "type")]
    pub ability_type: String,

    #[serde(default)]
    pub level: u32,

    /// Whether using the ability starts the global cooldown
    #[serde(default = "default_true")]
    pub triggers_gcd: bool,

    #[serde(default)]
    pub cast_duration_ticks: u32,

    #[serde(default)]
    pub cooldown_ticks: u32,

    /// Cooldown in seconds; converted to ticks on load, rounding up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<f32>,

    /// Minimum match confidence; the detector default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_threshold: Option<f32>,

    /// External mask image used instead of the template's alpha channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_file_name: Option<String>,
}

impl AbilityConfig {
    /// Config for an ability nobody described: GCD-triggering, no cast, no cooldown.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ability_type: default_ability_type(),
            level: 0,
            triggers_gcd: true,
            cast_duration_ticks: 0,
            cooldown_ticks: 0,
            cooldown_secs: None,
            detection_threshold: None,
            mask_file_name: None,
        }
    }

    /// Fold `cooldown_secs` into `cooldown_ticks` (whichever is longer).
    pub fn normalize(&mut self, tick_duration_ms: u64) {
        if let Some(secs) = self.cooldown_secs.take() {
            self.cooldown_ticks = self.cooldown_ticks.max(secs_to_ticks(secs, tick_duration_ms));
        }
    }

    /// Copy of this config with every set override field replacing the base.
    pub fn with_overrides(&self, overrides: &AbilitySettingsOverrides) -> Self {
        let mut config = self.clone();
        if let Some(v) = &overrides.ability_type {
            config.ability_type.clone_from(v);
        }
        if let Some(v) = overrides.level {
            config.level = v;
        }
        if let Some(v) = overrides.triggers_gcd {
            config.triggers_gcd = v;
        }
        if let Some(v) = overrides.cast_duration_ticks {
            config.cast_duration_ticks = v;
        }
        if let Some(v) = overrides.cooldown_ticks {
            config.cooldown_ticks = v;
        }
        if let Some(v) = overrides.detection_threshold {
            config.detection_threshold = Some(v);
        }
        if let Some(v) = &overrides.mask_file_name {
            config.mask_file_name = Some(v.clone());
        }
        config
    }

    pub fn threshold_or(&self, default: f32) -> f32 {
        self.detection_threshold.unwrap_or(default)
    }

    pub fn timing_profile(&self) -> TimingProfile {
        TimingProfile {
            triggers_gcd: self.triggers_gcd,
            cast_duration_ticks: self.cast_duration_ticks,
            cooldown_ticks: self.cooldown_ticks,
            gcd_ticks: None,
        }
    }
}

/// `ceil(secs / tick)`, never negative.
pub fn secs_to_ticks(secs: f32, tick_duration_ms: u64) -> u32 {
    if secs <= 0.0 || tick_duration_ms == 0 {
        return 0;
    }
    let ticks = (f64::from(secs) * 1000.0 / tick_duration_ms as f64).ceil();
    ticks.min(f64::from(u32::MAX)) as u32
}

/// The timing-relevant part of an ability, after rule patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingProfile {
    pub triggers_gcd: bool,
    pub cast_duration_ticks: u32,
    pub cooldown_ticks: u32,
    /// Replaces the engine-wide GCD length for this ability when set
    pub gcd_ticks: Option<u32>,
}

impl TimingProfile {
    /// Ticks the ability keeps a step busy. Cast time counts too, so a
    /// zero-cast override can shorten the step.
    pub fn dwell_ticks(&self, default_gcd_ticks: u32) -> u32 {
        let gcd = if self.triggers_gcd {
            self.gcd_ticks.unwrap_or(default_gcd_ticks)
        } else {
            0
        };
        gcd.max(self.cooldown_ticks).max(self.cast_duration_ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_secs_round_up_to_ticks() {
        assert_eq!(secs_to_ticks(12.0, 600), 20);
        assert_eq!(secs_to_ticks(1.0, 600), 2);
        assert_eq!(secs_to_ticks(0.0, 600), 0);
        assert_eq!(secs_to_ticks(-3.0, 600), 0);
    }

    #[test]
    fn test_normalize_keeps_longer_cooldown() {
        let mut config = AbilityConfig::new("surge");
        config.cooldown_ticks = 30;
        config.cooldown_secs = Some(6.0);
        config.normalize(600);
        assert_eq!(config.cooldown_ticks, 30);
        assert_eq!(config.cooldown_secs, None);
    }

    #[test]
    fn test_dwell_is_max_of_gcd_cooldown_and_cast() {
        let base = AbilityConfig::new("a").timing_profile();
        assert_eq!(base.dwell_ticks(3), 3, "plain GCD ability");

        let off_gcd = TimingProfile {
            triggers_gcd: false,
            ..base
        };
        assert_eq!(off_gcd.dwell_ticks(3), 0);

        let channel = TimingProfile {
            cast_duration_ticks: 5,
            ..base
        };
        assert_eq!(channel.dwell_ticks(3), 5);

        let short_gcd = TimingProfile {
            gcd_ticks: Some(1),
            ..base
        };
        assert_eq!(short_gcd.dwell_ticks(3), 1);
    }

    #[test]
    fn test_overrides_replace_only_set_fields() {
        let mut base = AbilityConfig::new("fireball");
        base.cooldown_ticks = 10;
        let overrides = AbilitySettingsOverrides {
            cast_duration_ticks: Some(4),
            detection_threshold: Some(0.9),
            ..Default::default()
        };
        let resolved = base.with_overrides(&overrides);
        assert_eq!(resolved.cast_duration_ticks, 4);
        assert_eq!(resolved.cooldown_ticks, 10);
        assert_eq!(resolved.threshold_or(0.99), 0.9);
        assert!(resolved.triggers_gcd);
    }
}

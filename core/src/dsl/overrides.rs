//! Per-rotation ability setting overrides
//!
//! Written in rotation files as annotation lines:
//!
//! ```text
//! #*2 castDurationTicks=0 detectionThreshold=0.95
//! #@fireball cooldownTicks=10
//! ```
//!
//! `#*<label>` targets one instance (`fireball[*2]`), `#@<key>` every use of
//! an ability. Per-instance values win over per-ability ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::AnnotationError;

/// Optional replacements for fields of an ability's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilitySettingsOverrides {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ability_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers_gcd: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_duration_ticks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ticks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_file_name: Option<String>,
}

impl AbilitySettingsOverrides {
    /// Keys in the order they are written back out.
    pub const KEYS: [&'static str; 7] = [
        "type",
        "level",
        "triggersGcd",
        "castDurationTicks",
        "cooldownTicks",
        "detectionThreshold",
        "maskFileName",
    ];

    /// Set one field from its annotation text. Keys match case-insensitively.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), AnnotationError> {
        let invalid = || AnnotationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        match key.to_ascii_lowercase().as_str() {
            "type" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.ability_type = Some(value.to_string());
            }
            "level" => self.level = Some(value.parse().map_err(|_| invalid())?),
            "triggersgcd" => self.triggers_gcd = Some(parse_bool(value).ok_or_else(invalid)?),
            "castdurationticks" => {
                self.cast_duration_ticks = Some(value.parse().map_err(|_| invalid())?)
            }
            "cooldownticks" => self.cooldown_ticks = Some(value.parse().map_err(|_| invalid())?),
            "detectionthreshold" => {
                let threshold: f32 = value.parse().map_err(|_| invalid())?;
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(invalid());
                }
                self.detection_threshold = Some(threshold);
            }
            "maskfilename" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.mask_file_name = Some(value.to_string());
            }
            _ => {
                return Err(AnnotationError::UnknownKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(&mut self, other: &AbilitySettingsOverrides) {
        if other.ability_type.is_some() {
            self.ability_type.clone_from(&other.ability_type);
        }
        if other.level.is_some() {
            self.level = other.level;
        }
        if other.triggers_gcd.is_some() {
            self.triggers_gcd = other.triggers_gcd;
        }
        if other.cast_duration_ticks.is_some() {
            self.cast_duration_ticks = other.cast_duration_ticks;
        }
        if other.cooldown_ticks.is_some() {
            self.cooldown_ticks = other.cooldown_ticks;
        }
        if other.detection_threshold.is_some() {
            self.detection_threshold = other.detection_threshold;
        }
        if other.mask_file_name.is_some() {
            self.mask_file_name.clone_from(&other.mask_file_name);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set fields as `(key, value)` text pairs, in [`Self::KEYS`] order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.ability_type {
            pairs.push(("type", v.clone()));
        }
        if let Some(v) = self.level {
            pairs.push(("level", v.to_string()));
        }
        if let Some(v) = self.triggers_gcd {
            pairs.push(("triggersGcd", v.to_string()));
        }
        if let Some(v) = self.cast_duration_ticks {
            pairs.push(("castDurationTicks", v.to_string()));
        }
        if let Some(v) = self.cooldown_ticks {
            pairs.push(("cooldownTicks", v.to_string()));
        }
        if let Some(v) = self.detection_threshold {
            pairs.push(("detectionThreshold", v.to_string()));
        }
        if let Some(v) = &self.mask_file_name {
            pairs.push(("maskFileName", v.clone()));
        }
        pairs
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Every override attached to one rotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Keyed by instance label (`#*2` → `"2"`)
    #[serde(default)]
    pub per_instance: BTreeMap<String, AbilitySettingsOverrides>,
    /// Keyed by ability key (`#@fireball` → `"fireball"`)
    #[serde(default)]
    pub per_ability: BTreeMap<String, AbilitySettingsOverrides>,
}

impl RotationSettings {
    pub fn is_empty(&self) -> bool {
        self.per_instance.values().all(AbilitySettingsOverrides::is_empty)
            && self.per_ability.values().all(AbilitySettingsOverrides::is_empty)
    }

    /// Effective overrides for one ability occurrence.
    pub fn resolve(&self, key: &str, label: Option<&str>) -> AbilitySettingsOverrides {
        let mut resolved = self.per_ability.get(key).cloned().unwrap_or_default();
        if let Some(instance) = label.and_then(|l| self.per_instance.get(l)) {
            resolved.merge(instance);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_parses_typed_values() {
        let mut o = AbilitySettingsOverrides::default();
        o.set("castDurationTicks", "0").unwrap();
        o.set("TRIGGERSGCD", "no").unwrap();
        o.set("detectionThreshold", "0.95").unwrap();
        o.set("type", "channel").unwrap();

        assert_eq!(o.cast_duration_ticks, Some(0));
        assert_eq!(o.triggers_gcd, Some(false));
        assert_eq!(o.detection_threshold, Some(0.95));
        assert_eq!(o.ability_type.as_deref(), Some("channel"));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut o = AbilitySettingsOverrides::default();
        assert!(matches!(
            o.set("colour", "red"),
            Err(AnnotationError::UnknownKey { .. })
        ));
        assert!(matches!(
            o.set("level", "high"),
            Err(AnnotationError::InvalidValue { .. })
        ));
        assert!(matches!(
            o.set("detectionThreshold", "1.5"),
            Err(AnnotationError::InvalidValue { .. })
        ));
        assert!(o.is_empty(), "failed sets must not leave partial values");
    }

    #[test]
    fn test_merge_later_wins_per_field() {
        let mut base = AbilitySettingsOverrides {
            level: Some(1),
            cooldown_ticks: Some(5),
            ..Default::default()
        };
        let later = AbilitySettingsOverrides {
            level: Some(3),
            ..Default::default()
        };
        base.merge(&later);
        assert_eq!(base.level, Some(3));
        assert_eq!(base.cooldown_ticks, Some(5), "unset fields keep their value");
    }

    #[test]
    fn test_resolve_applies_instance_over_ability() {
        let mut settings = RotationSettings::default();
        settings.per_ability.insert(
            "fireball".to_string(),
            AbilitySettingsOverrides {
                cooldown_ticks: Some(8),
                cast_duration_ticks: Some(2),
                ..Default::default()
            },
        );
        settings.per_instance.insert(
            "1".to_string(),
            AbilitySettingsOverrides {
                cast_duration_ticks: Some(0),
                ..Default::default()
            },
        );

        let plain = settings.resolve("fireball", None);
        assert_eq!(plain.cast_duration_ticks, Some(2));

        let labeled = settings.resolve("fireball", Some("1"));
        assert_eq!(labeled.cast_duration_ticks, Some(0));
        assert_eq!(labeled.cooldown_ticks, Some(8));

        assert!(settings.resolve("heal", Some("9")).is_empty());
    }

    #[test]
    fn test_to_pairs_uses_annotation_keys() {
        let o = AbilitySettingsOverrides {
            mask_file_name: Some("fb_mask.png".to_string()),
            level: Some(2),
            ..Default::default()
        };
        assert_eq!(
            o.to_pairs(),
            vec![
                ("level", "2".to_string()),
                ("maskFileName", "fb_mask.png".to_string())
            ]
        );
    }
}

//! Ability definitions
//!
//! - **config**: Per-ability configuration and its timing profile
//! - **catalog**: TOML-backed [`AbilityRegistry`]

mod catalog;
mod config;
mod error;

pub use catalog::*;
pub use config::*;
pub use error::*;

use crate::dsl::RotationSettings;

/// Source of ability configuration.
pub trait AbilityRegistry: Send + Sync {
    fn get_ability(&self, key: &str) -> Option<&AbilityConfig>;

    /// Every key the registry knows, sorted.
    fn ability_keys(&self) -> Vec<String>;
}

/// Effective config for one ability occurrence: the registry entry (or a
/// default config for unknown keys) with rotation overrides applied,
/// per-ability first and per-instance second.
pub fn resolve_ability(
    registry: &dyn AbilityRegistry,
    settings: &RotationSettings,
    key: &str,
    label: Option<&str>,
) -> AbilityConfig {
    let base = registry
        .get_ability(key)
        .cloned()
        .unwrap_or_else(|| AbilityConfig::new(key));
    let overrides = settings.resolve(key, label);
    if overrides.is_empty() {
        base
    } else {
        base.with_overrides(&overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::AbilitySettingsOverrides;

    #[test]
    fn test_resolve_unknown_ability_uses_defaults() {
        let catalog = AbilityCatalog::new();
        let config = resolve_ability(&catalog, &RotationSettings::default(), "mystery", None);
        assert_eq!(config, AbilityConfig::new("mystery"));
    }

    #[test]
    fn test_resolve_applies_rotation_overrides() {
        let catalog =
            AbilityCatalog::from_toml_str("[[ability]]\nkey = \"heal\"\ncooldown_ticks = 6\n", 600)
                .unwrap();
        let mut settings = RotationSettings::default();
        settings.per_instance.insert(
            "2".to_string(),
            AbilitySettingsOverrides {
                triggers_gcd: Some(false),
                ..Default::default()
            },
        );

        let plain = resolve_ability(&catalog, &settings, "heal", None);
        assert!(plain.triggers_gcd);

        let instance = resolve_ability(&catalog, &settings, "heal", Some("2"));
        assert!(!instance.triggers_gcd);
        assert_eq!(instance.cooldown_ticks, 6);
    }
}

//! TOML ability catalog
//!
//! ```toml
//! [[ability]]
//! key = "fireball"
//! type = "basic"
//! cooldown_secs = 12.0
//!
//! [[ability]]
//! key = "death skulls"
//! cast_duration_ticks = 2
//! detection_threshold = 0.95
//! mask_file_name = "death_skulls_mask.png"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AbilityConfig, AbilityRegistry, RegistryError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct AbilityFile {
    #[serde(default, rename = "ability")]
    abilities: Vec<AbilityConfig>,
}

/// Registry of ability configs keyed by ability key.
#[derive(Debug, Clone, Default)]
pub struct AbilityCatalog {
    abilities: HashMap<String, AbilityConfig>,
}

impl AbilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one TOML file. `cooldown_secs` is converted with `tick_duration_ms`.
    pub fn load_from_file(path: &Path, tick_duration_ms: u64) -> Result<Self, RegistryError> {
        let mut catalog = Self::new();
        catalog.merge_file(path, tick_duration_ms)?;
        Ok(catalog)
    }

    /// Load every `*.toml` file in a directory, in file-name order.
    /// A missing directory yields an empty catalog.
    pub fn load_from_dir(dir: &Path, tick_duration_ms: u64) -> Result<Self, RegistryError> {
        let mut catalog = Self::new();
        if !dir.exists() {
            return Ok(catalog);
        }

        let entries = fs::read_dir(dir).map_err(|source| RegistryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut files: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for path in files {
            catalog.merge_file(&path, tick_duration_ms)?;
        }
        Ok(catalog)
    }

    fn merge_file(&mut self, path: &Path, tick_duration_ms: u64) -> Result<(), RegistryError> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file: AbilityFile = toml::from_str(&content).map_err(|source| RegistryError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;

        for mut ability in file.abilities {
            if let Err(reason) = validate(&ability) {
                return Err(RegistryError::InvalidDefinition {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            ability.normalize(tick_duration_ms);
            self.insert(ability);
        }
        debug!(path = %path.display(), count = self.abilities.len(), "Loaded ability catalog");
        Ok(())
    }

    /// Parse catalog TOML from a string (no file context in errors).
    pub fn from_toml_str(content: &str, tick_duration_ms: u64) -> Result<Self, toml::de::Error> {
        let file: AbilityFile = toml::from_str(content)?;
        let mut catalog = Self::new();
        for mut ability in file.abilities {
            ability.normalize(tick_duration_ms);
            catalog.insert(ability);
        }
        Ok(catalog)
    }

    /// Add or replace an ability. Later definitions win.
    pub fn insert(&mut self, ability: AbilityConfig) {
        if self.abilities.contains_key(&ability.key) {
            warn!(key = %ability.key, "Duplicate ability definition replaced");
        }
        self.abilities.insert(ability.key.clone(), ability);
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }
}

fn validate(ability: &AbilityConfig) -> Result<(), String> {
    if ability.key.trim().is_empty() {
        return Err("ability with empty key".to_string());
    }
    if let Some(threshold) = ability.detection_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!(
                "{}: detection_threshold {threshold} outside 0..=1",
                ability.key
            ));
        }
    }
    Ok(())
}

impl AbilityRegistry for AbilityCatalog {
    fn get_ability(&self, key: &str) -> Option<&AbilityConfig> {
        self.abilities.get(key)
    }

    fn ability_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.abilities.keys().cloned().collect();
        keys.sort();
        keys
    }
}

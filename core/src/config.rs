//! Engine configuration
//!
//! Re-exports the shared config types from rotascope-types and adds
//! confy persistence and platform directories.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

pub use rotascope_types::{
    DEFAULT_DETECTION_THRESHOLD, DetectionSettings, EngineConfig, GradingSettings, LoggingSettings,
    RuntimeSettings, TokenizerSettings,
};

const APP_NAME: &str = "rotascope";
const CONFIG_NAME: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to save configuration")]
    Save(#[source] confy::ConfyError),

    #[error("failed to load configuration: {0}")]
    Load(#[source] confy::ConfyError),

    #[error("failed to locate configuration file")]
    Locate(#[source] confy::ConfyError),

    #[error("failed to load configuration from {path}")]
    LoadFile {
        path: PathBuf,
        #[source]
        source: confy::ConfyError,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Platform Directories
// ─────────────────────────────────────────────────────────────────────────────

/// Where templates and ability catalogs live unless told otherwise.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_templates_dir() -> PathBuf {
    data_dir().join("templates")
}

pub fn default_abilities_dir() -> PathBuf {
    data_dir().join("abilities")
}

// ─────────────────────────────────────────────────────────────────────────────
// EngineConfig Extensions
// ─────────────────────────────────────────────────────────────────────────────

/// Extension trait for EngineConfig persistence
pub trait EngineConfigExt: Sized {
    /// Load the user's config, falling back to defaults if it is missing
    /// or unreadable.
    fn load() -> Self;

    /// Load the user's config, reporting why it could not be read.
    fn try_load() -> Result<Self, ConfigError>;

    /// Load an explicit config file.
    fn load_from(path: &Path) -> Result<Self, ConfigError>;

    fn save(&self) -> Result<(), ConfigError>;

    fn config_path() -> Result<PathBuf, ConfigError>;
}

impl EngineConfigExt for EngineConfig {
    fn load() -> Self {
        Self::try_load().unwrap_or_else(|e| {
            warn!(error = %e, "Could not load config, using defaults");
            Self::default()
        })
    }

    fn try_load() -> Result<Self, ConfigError> {
        confy::load(APP_NAME, CONFIG_NAME).map_err(ConfigError::Load)
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        confy::load_path(path).map_err(|source| ConfigError::LoadFile {
            path: path.to_path_buf(),
            source,
        })
    }

    fn save(&self) -> Result<(), ConfigError> {
        confy::store(APP_NAME, CONFIG_NAME, self).map_err(ConfigError::Save)
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).map_err(ConfigError::Locate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "frame_budget_ms = 900\n[runtime]\nrequire_detection_to_advance = true\n").unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.frame_budget_ms, 900);
        assert!(config.runtime.require_detection_to_advance);
        assert_eq!(config.gcd_ticks, 3);
    }

    #[test]
    fn test_load_from_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "frame_budget_ms = \"soon\"\n").unwrap();
        assert!(matches!(EngineConfig::load_from(&path), Err(ConfigError::LoadFile { .. })));
    }

    #[test]
    fn test_default_dirs_live_under_data_dir() {
        assert!(default_templates_dir().starts_with(data_dir()));
        assert!(default_abilities_dir().ends_with("abilities"));
    }
}

//! Common serde default value functions
//!
//! Used across ability definitions and rotation settings to avoid duplication.

/// Default for flags that are on unless a definition says otherwise
pub fn default_true() -> bool {
    true
}

/// Default ability category
pub fn default_ability_type() -> String {
    "basic".to_string()
}

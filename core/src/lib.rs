pub mod abilities;
pub mod config;
pub mod detection;
pub mod dsl;
pub mod modification;
pub mod runtime;
pub mod serde_defaults;

// Re-exports for convenience
pub use abilities::{AbilityCatalog, AbilityConfig, AbilityRegistry, TimingProfile, resolve_ability};
pub use config::{ConfigError, EngineConfig, EngineConfigExt};
pub use detection::{
    ConfidenceGrade, ConfidenceGrader, DetectionOrchestrator, DetectionResult, DirectoryTemplateStore,
    Frame, FrameSource, ImageSequenceSource, TemplateDetector, TemplateStore,
};
pub use dsl::{DslError, Rotation, RotationCodec, RotationParser, SequenceDefinition};
pub use modification::{AbilityModificationEngine, AbilityModificationRule, GatedAbilityRule};
pub use runtime::{ActiveSequence, RotationEngine, SequenceEvent, TimingDirective};

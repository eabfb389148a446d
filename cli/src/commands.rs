use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rotascope_core::abilities::{AbilityCatalog, AbilityRegistry};
use rotascope_core::config::{EngineConfig, default_abilities_dir, default_templates_dir};
use rotascope_core::detection::{
    ConfidenceGrader, DirectoryTemplateStore, Frame, ImageSequenceSource, Rect,
    TemplateDetector,
};
use rotascope_core::dsl::{ImportReport, RotationCodec, RotationParser, SequenceDefinition};
use rotascope_core::modification::{GatedAbilityConfig, GatedAbilityRule};
use rotascope_core::runtime::{FrameUpdate, LoggingSink, PresentationSink, RotationEngine, SequenceEvent};
use tokio::sync::watch;

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

fn load_catalog(path: Option<&Path>, config: &EngineConfig) -> Result<AbilityCatalog, String> {
    let path = path.map_or_else(default_abilities_dir, Path::to_path_buf);
    let catalog = if path.is_dir() || !path.exists() {
        AbilityCatalog::load_from_dir(&path, config.tick_duration_ms)
    } else {
        AbilityCatalog::load_from_file(&path, config.tick_duration_ms)
    };
    catalog.map_err(|e| e.to_string())
}

fn load_templates(path: Option<&Path>) -> Result<DirectoryTemplateStore, String> {
    let path = path.map_or_else(default_templates_dir, Path::to_path_buf);
    DirectoryTemplateStore::load(&path).map_err(|e| e.to_string())
}

fn make_codec(config: &EngineConfig, catalog: Option<&AbilityCatalog>) -> RotationCodec {
    let parser = RotationParser::new(&config.tokenizer);
    let parser = match catalog {
        Some(catalog) if !catalog.is_empty() => parser.with_known_abilities(catalog.ability_keys()),
        _ => parser,
    };
    RotationCodec::new(parser)
}

fn import(path: &Path, codec: &RotationCodec) -> Result<ImportReport, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    codec
        .import(&text)
        .map_err(|e| format!("{}: {e}", path.display()))
}

fn make_detector(
    templates: DirectoryTemplateStore,
    catalog: Arc<dyn AbilityRegistry>,
    config: &EngineConfig,
) -> Arc<TemplateDetector> {
    let detector = TemplateDetector::from_settings(Arc::new(templates), catalog, config.detection.clone());
    tracing::debug!(backend = detector.backend_name(), "Detector ready");
    Arc::new(detector)
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

pub fn check(path: &Path, abilities: Option<&Path>, config: &EngineConfig) -> Result<(), String> {
    let catalog = abilities.map(|p| load_catalog(Some(p), config)).transpose()?;
    let report = import(path, &make_codec(config, catalog.as_ref()))?;
    let rotation = &report.rotation;

    println!("{} steps", rotation.definition.len());
    for (index, step) in rotation.definition.steps.iter().enumerate() {
        let text = SequenceDefinition::new(vec![step.clone()]).render();
        println!("  {:>3}  {text}  ({} terms)", index + 1, step.terms.len());
    }
    for tooltip in &rotation.tooltips {
        println!("tooltip @{} {:?}: {}", tooltip.structural_index, tooltip.side, tooltip.text);
    }
    for warning in &report.warnings {
        println!("warning (line {}): {}", warning.line, warning.message);
    }
    Ok(())
}

pub fn format(path: &Path, config: &EngineConfig) -> Result<(), String> {
    let codec = make_codec(config, None);
    let report = import(path, &codec)?;
    print!("{}", codec.export(&report.rotation));
    Ok(())
}

pub fn detect(
    frame: &Path,
    templates: Option<&Path>,
    abilities: Option<&Path>,
    keys: &[String],
    config: &EngineConfig,
) -> Result<(), String> {
    let catalog: Arc<dyn AbilityRegistry> = Arc::new(load_catalog(abilities, config)?);
    let detector = make_detector(load_templates(templates)?, catalog, config);
    let grader = ConfidenceGrader::new(&config.grading);

    let image = image::open(frame).map_err(|e| format!("{}: {e}", frame.display()))?;
    let region = Rect::sized(image.width(), image.height());
    let frame = Frame::from_capture(image, region);

    for key in keys {
        let result = detector.detect(&frame, key, false);
        let threshold = detector.threshold_for(key);
        let bbox = result
            .bounding_box
            .map(|b| format!("{}x{} at ({}, {})", b.width, b.height, b.x, b.y))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{key}: found={} confidence={:.4} threshold={threshold:.2} grade={} bbox={bbox}",
            result.found,
            result.confidence,
            grader.grade(threshold, result.confidence),
        );
    }
    Ok(())
}

pub struct ReplayArgs {
    pub rotation: PathBuf,
    pub frames: PathBuf,
    pub templates: Option<PathBuf>,
    pub abilities: Option<PathBuf>,
    pub gated: Option<String>,
    pub follow_ups: Vec<String>,
    pub looping: bool,
}

/// Logs through [`LoggingSink`] and prints step transitions.
struct TransitionPrinter(LoggingSink);

impl PresentationSink for TransitionPrinter {
    fn present(&mut self, update: &FrameUpdate) {
        self.0.present(update);
        for event in &update.events {
            if let SequenceEvent::StepAdvanced { from, to, .. } = event {
                if *to >= update.step_count {
                    println!("step {} -> done", from + 1);
                } else {
                    println!("step {} -> {}", from + 1, to + 1);
                }
            }
        }
        for tooltip in &update.tooltips {
            println!("  [{}] {}", tooltip.anchor.as_deref().unwrap_or("-"), tooltip.text);
        }
    }
}

pub async fn replay(args: ReplayArgs, config: EngineConfig) -> Result<(), String> {
    let catalog = load_catalog(args.abilities.as_deref(), &config)?;
    let report = import(&args.rotation, &make_codec(&config, Some(&catalog)))?;
    for warning in &report.warnings {
        println!("warning (line {}): {}", warning.line, warning.message);
    }

    let catalog: Arc<dyn AbilityRegistry> = Arc::new(catalog);
    let detector = make_detector(load_templates(args.templates.as_deref())?, Arc::clone(&catalog), &config);
    let source = ImageSequenceSource::from_dir(&args.frames, Rect::default())
        .map_err(|e| e.to_string())?
        .looping(args.looping);
    if source.is_empty() {
        return Err(format!("no PNG frames in {}", args.frames.display()));
    }

    let mut engine = RotationEngine::new(
        config,
        report.rotation,
        detector,
        catalog,
        Box::new(source),
        Box::new(TransitionPrinter(LoggingSink)),
    )
    .map_err(|e| e.to_string())?;

    if let Some(gated) = args.gated {
        let rule_config = GatedAbilityConfig::new(gated).with_follow_ups(args.follow_ups);
        let rule = GatedAbilityRule::new(rule_config).map_err(|e| e.to_string())?;
        engine.add_rule(Box::new(rule));
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    let engine = engine.run(stop_rx).await.map_err(|e| e.to_string())?;
    let sequence = engine.sequence();
    if sequence.is_complete() {
        println!("rotation complete");
    } else {
        println!(
            "stopped at step {} of {}",
            sequence.current_step_index() + 1,
            sequence.step_count()
        );
    }
    Ok(())
}

//! Rotation file import/export
//!
//! A rotation file is the expression text plus optional annotation lines:
//!
//! ```text
//! fireball[*1] (open with this) → (heal / shield) + buff
//! #*1 castDurationTicks=0
//! #@heal detectionThreshold=0.95 maskFileName=heal_mask.png
//! # plain comment
//! ```

use std::cmp::Ordering;

use tracing::warn;

use super::ast::SequenceDefinition;
use super::error::{AnnotationError, DslError};
use super::overrides::{AbilitySettingsOverrides, RotationSettings};
use super::parser::RotationParser;
use super::tokenizer::TooltipPlacement;

const INSTANCE_PREFIX: &str = "#*";
const ABILITY_PREFIX: &str = "#@";

/// A fully imported rotation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rotation {
    pub definition: SequenceDefinition,
    pub tooltips: Vec<TooltipPlacement>,
    pub settings: RotationSettings,
}

impl Rotation {
    /// Effective overrides for one ability occurrence.
    pub fn overrides_for(&self, key: &str, label: Option<&str>) -> AbilitySettingsOverrides {
        self.settings.resolve(key, label)
    }
}

/// An annotation problem that did not stop the import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecWarning {
    /// 1-based line in the source text
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub rotation: Rotation,
    pub warnings: Vec<CodecWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct RotationCodec {
    parser: RotationParser,
}

#[derive(Clone, Copy)]
enum AnnotationTarget {
    Instance,
    Ability,
}

impl RotationCodec {
    pub fn new(parser: RotationParser) -> Self {
        Self { parser }
    }

    /// Import rotation text. Expression errors fail the import; annotation
    /// problems are dropped and reported as warnings.
    pub fn import(&self, text: &str) -> Result<ImportReport, DslError> {
        let mut expression = Vec::new();
        let mut settings = RotationSettings::default();
        let mut warnings = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let target = if let Some(rest) = line.strip_prefix(INSTANCE_PREFIX) {
                Some((AnnotationTarget::Instance, rest))
            } else if let Some(rest) = line.strip_prefix(ABILITY_PREFIX) {
                Some((AnnotationTarget::Ability, rest))
            } else {
                None
            };

            match target {
                Some((kind, rest)) => {
                    apply_annotation(kind, rest, index + 1, &mut settings, &mut warnings)
                }
                None if line.starts_with('#') => {}
                None => expression.push(raw),
            }
        }

        let parsed = self.parser.parse_with_tooltips(&expression.join("\n"))?;
        Ok(ImportReport {
            rotation: Rotation {
                definition: parsed.definition,
                tooltips: parsed.tooltips,
                settings,
            },
            warnings,
        })
    }

    /// Canonical text form. Overrides whose label or key no longer appears
    /// in the expression are left out.
    pub fn export(&self, rotation: &Rotation) -> String {
        let definition = &rotation.definition;
        let mut out = definition.render_with_tooltips(&rotation.tooltips);

        let labels = definition.labels();
        let mut instances: Vec<(&String, &AbilitySettingsOverrides)> = rotation
            .settings
            .per_instance
            .iter()
            .filter(|(label, o)| labels.contains(&label.as_str()) && !o.is_empty())
            .collect();
        instances.sort_by(|a, b| compare_labels(a.0, b.0));
        for (label, overrides) in instances {
            push_annotation(&mut out, INSTANCE_PREFIX, label, overrides);
        }

        let keys = definition.ability_keys();
        for (key, overrides) in &rotation.settings.per_ability {
            if keys.contains(&key.as_str()) && !overrides.is_empty() {
                push_annotation(&mut out, ABILITY_PREFIX, key, overrides);
            }
        }

        out
    }
}

fn push_annotation(out: &mut String, prefix: &str, target: &str, overrides: &AbilitySettingsOverrides) {
    out.push('\n');
    out.push_str(prefix);
    out.push_str(target);
    for (key, value) in overrides.to_pairs() {
        out.push(' ');
        out.push_str(key);
        out.push('=');
        out.push_str(&value);
    }
}

/// Numeric labels first (by value), then the rest lexicographically.
fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Parse `<target> key=value ...` and merge it into `settings`.
///
/// Labels are one word; an ability key runs up to the first `key=value`
/// pair so it may contain spaces (`#@death skulls cooldownTicks=4`).
fn apply_annotation(
    kind: AnnotationTarget,
    rest: &str,
    line: usize,
    settings: &mut RotationSettings,
    warnings: &mut Vec<CodecWarning>,
) {
    let words: Vec<&str> = rest.split_whitespace().collect();
    let split = match kind {
        AnnotationTarget::Instance => words.len().min(1),
        AnnotationTarget::Ability => words
            .iter()
            .position(|w| w.contains('='))
            .unwrap_or(words.len()),
    };
    let target = words[..split].join(" ");

    let mut report = |message: String| {
        warn!(line, %message, "Dropped rotation annotation");
        warnings.push(CodecWarning { line, message });
    };

    if target.is_empty() {
        report("annotation has no label or ability key".to_string());
        return;
    }

    let mut parsed = AbilitySettingsOverrides::default();
    for pair in &words[split..] {
        let result = match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => parsed.set(key, value),
            _ => Err(AnnotationError::MalformedPair {
                text: pair.to_string(),
            }),
        };
        if let Err(e) = result {
            report(format!("{target}: {e}"));
        }
    }

    let entries = match kind {
        AnnotationTarget::Instance => &mut settings.per_instance,
        AnnotationTarget::Ability => &mut settings.per_ability,
    };
    entries.entry(target).or_default().merge(&parsed);
}

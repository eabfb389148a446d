//! Rotation syntax tree
//!
//! ```text
//! SequenceDefinition  steps joined by →
//!   Step              terms joined by +   (all required)
//!     Term            alternatives joined by /   (any one)
//!       Alternative   ability token | ( SequenceDefinition )
//! ```
//!
//! A parenthesized group holding a single one-term step is folded into the
//! enclosing term when parsed; `Term::parens` remembers how many paren pairs
//! wrapped it so the flattened view still matches the written text.
//!
//! Every consumer that needs a flat view (detection requirements, tooltip
//! placement, text rendering) goes through [`SequenceDefinition::linearize`]
//! or [`Step::linearize`], so the traversal order is defined once.

use super::token::{AbilityToken, Operator};
use super::tokenizer::{TooltipPlacement, TooltipSide};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceDefinition {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Term {
    pub alternatives: Vec<Alternative>,
    /// Redundant paren pairs written around this term, e.g. `(b / c)`
    pub parens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alternative {
    Ability(AbilityToken),
    Group(SequenceDefinition),
}

/// One element of the flattened tree, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearItem<'a> {
    Ability {
        token: &'a AbilityToken,
        /// The ability sits inside a `/` choice (at any nesting depth)
        in_choice: bool,
    },
    Operator(Operator),
    LeftParen,
    RightParen,
}

impl LinearItem<'_> {
    pub fn ability(&self) -> Option<&AbilityToken> {
        match self {
            Self::Ability { token, .. } => Some(token),
            _ => None,
        }
    }
}

impl SequenceDefinition {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Flatten the whole tree in source order, parens included.
    pub fn linearize(&self) -> Vec<LinearItem<'_>> {
        let mut out = Vec::new();
        self.linearize_into(&mut out, false);
        out
    }

    fn linearize_into<'a>(&'a self, out: &mut Vec<LinearItem<'a>>, in_choice: bool) {
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                out.push(LinearItem::Operator(Operator::Then));
            }
            step.linearize_into(out, in_choice);
        }
    }

    /// Every ability occurrence, in source order.
    pub fn abilities(&self) -> Vec<&AbilityToken> {
        collect_abilities(&self.linearize())
    }

    /// Distinct ability keys, in order of first appearance.
    pub fn ability_keys(&self) -> Vec<&str> {
        distinct_keys(&self.linearize())
    }

    /// Instance labels used anywhere in the rotation.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for token in self.abilities() {
            if let Some(label) = token.label.as_deref() {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    /// Canonical text form (`a → (b / c) + d`).
    pub fn render(&self) -> String {
        render_items(&self.linearize(), &[])
    }

    /// Canonical text form with tooltips re-inserted at their placements.
    pub fn render_with_tooltips(&self, tooltips: &[TooltipPlacement]) -> String {
        render_items(&self.linearize(), tooltips)
    }
}

impl Step {
    pub fn new(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    /// Flatten this step, including nested groups.
    pub fn linearize(&self) -> Vec<LinearItem<'_>> {
        let mut out = Vec::new();
        self.linearize_into(&mut out, false);
        out
    }

    fn linearize_into<'a>(&'a self, out: &mut Vec<LinearItem<'a>>, in_choice: bool) {
        for (index, term) in self.terms.iter().enumerate() {
            if index > 0 {
                out.push(LinearItem::Operator(Operator::And));
            }
            term.linearize_into(out, in_choice);
        }
    }

    pub fn abilities(&self) -> Vec<&AbilityToken> {
        collect_abilities(&self.linearize())
    }

    pub fn ability_keys(&self) -> Vec<&str> {
        distinct_keys(&self.linearize())
    }
}

impl Term {
    pub fn new(alternatives: Vec<Alternative>) -> Self {
        Self {
            alternatives,
            parens: 0,
        }
    }

    pub fn grouped(alternatives: Vec<Alternative>, parens: usize) -> Self {
        Self {
            alternatives,
            parens,
        }
    }

    /// True when the term offers more than one alternative.
    pub fn is_choice(&self) -> bool {
        self.alternatives.len() > 1
    }

    pub fn linearize(&self) -> Vec<LinearItem<'_>> {
        let mut out = Vec::new();
        self.linearize_into(&mut out, false);
        out
    }

    fn linearize_into<'a>(&'a self, out: &mut Vec<LinearItem<'a>>, in_choice: bool) {
        let in_choice = in_choice || self.is_choice();
        out.extend(std::iter::repeat_n(LinearItem::LeftParen, self.parens));
        for (index, alternative) in self.alternatives.iter().enumerate() {
            if index > 0 {
                out.push(LinearItem::Operator(Operator::Or));
            }
            match alternative {
                Alternative::Ability(token) => out.push(LinearItem::Ability { token, in_choice }),
                Alternative::Group(inner) => {
                    out.push(LinearItem::LeftParen);
                    inner.linearize_into(out, in_choice);
                    out.push(LinearItem::RightParen);
                }
            }
        }
        out.extend(std::iter::repeat_n(LinearItem::RightParen, self.parens));
    }

    pub fn ability_keys(&self) -> Vec<&str> {
        distinct_keys(&self.linearize())
    }
}

impl Alternative {
    pub fn ability(key: impl Into<String>) -> Self {
        Self::Ability(AbilityToken::new(key))
    }
}

fn collect_abilities<'a>(items: &[LinearItem<'a>]) -> Vec<&'a AbilityToken> {
    items
        .iter()
        .filter_map(|item| match item {
            LinearItem::Ability { token, .. } => Some(*token),
            _ => None,
        })
        .collect()
}

fn distinct_keys<'a>(items: &[LinearItem<'a>]) -> Vec<&'a str> {
    let mut keys: Vec<&str> = Vec::new();
    for token in collect_abilities(items) {
        if !keys.contains(&token.key.as_str()) {
            keys.push(token.key.as_str());
        }
    }
    keys
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '(' | ')' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_spaced(out: &mut String, piece: &str) {
    if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('(') {
        out.push(' ');
    }
    out.push_str(piece);
}

fn push_tooltips(out: &mut String, tooltips: &[TooltipPlacement], index: usize, side: TooltipSide) {
    for tooltip in tooltips
        .iter()
        .filter(|t| t.structural_index == index && t.side == side)
    {
        push_spaced(out, &format!("({})", escape_text(&tooltip.text)));
    }
}

fn render_items(items: &[LinearItem<'_>], tooltips: &[TooltipPlacement]) -> String {
    let mut out = String::new();
    for (index, item) in items.iter().enumerate() {
        push_tooltips(&mut out, tooltips, index, TooltipSide::Before);
        match item {
            LinearItem::Ability { token, .. } => {
                push_spaced(&mut out, &escape_text(&token.display_id()));
            }
            LinearItem::Operator(op) => {
                while out.ends_with(' ') {
                    out.pop();
                }
                out.push(' ');
                out.push(op.symbol());
                out.push(' ');
            }
            LinearItem::LeftParen => push_spaced(&mut out, "("),
            LinearItem::RightParen => {
                while out.ends_with(' ') {
                    out.pop();
                }
                out.push(')');
            }
        }
        push_tooltips(&mut out, tooltips, index, TooltipSide::After);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(key: &str) -> Term {
        Term::new(vec![Alternative::ability(key)])
    }

    fn sample() -> SequenceDefinition {
        // fireball → (heal / shield) + buff
        SequenceDefinition::new(vec![
            Step::new(vec![single("fireball")]),
            Step::new(vec![
                Term::grouped(
                    vec![Alternative::ability("heal"), Alternative::ability("shield")],
                    1,
                ),
                single("buff"),
            ]),
        ])
    }

    #[test]
    fn test_render_canonical_spacing() {
        assert_eq!(sample().render(), "fireball → (heal / shield) + buff");
    }

    #[test]
    fn test_linearize_marks_choices() {
        let def = sample();
        let flags: Vec<(String, bool)> = def
            .linearize()
            .iter()
            .filter_map(|item| match item {
                LinearItem::Ability { token, in_choice } => Some((token.key.clone(), *in_choice)),
                _ => None,
            })
            .collect();
        assert_eq!(
            flags,
            vec![
                ("fireball".to_string(), false),
                ("heal".to_string(), true),
                ("shield".to_string(), true),
                ("buff".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_step_keys_descend_into_groups() {
        let def = sample();
        assert_eq!(def.steps[1].ability_keys(), vec!["heal", "shield", "buff"]);
        assert_eq!(def.ability_keys(), vec!["fireball", "heal", "shield", "buff"]);
    }

    #[test]
    fn test_nested_group_keeps_its_parens() {
        // a / (b + c)
        let def = SequenceDefinition::new(vec![Step::new(vec![Term::new(vec![
            Alternative::ability("a"),
            Alternative::Group(SequenceDefinition::new(vec![Step::new(vec![
                single("b"),
                single("c"),
            ])])),
        ])])]);
        assert_eq!(def.render(), "a / (b + c)");
        let flags: Vec<bool> = def
            .linearize()
            .iter()
            .filter_map(|item| match item {
                LinearItem::Ability { in_choice, .. } => Some(*in_choice),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![true, true, true]);
    }

    #[test]
    fn test_render_escapes_literal_parens() {
        let def = SequenceDefinition::new(vec![Step::new(vec![single("(big) hit")])]);
        assert_eq!(def.render(), r"\(big\) hit");
    }

    #[test]
    fn test_render_with_tooltips() {
        let def = SequenceDefinition::new(vec![
            Step::new(vec![single("fireball")]),
            Step::new(vec![single("heal")]),
        ]);
        let tooltips = vec![
            TooltipPlacement {
                structural_index: 0,
                side: TooltipSide::After,
                text: "wait".to_string(),
            },
            TooltipPlacement {
                structural_index: 2,
                side: TooltipSide::Before,
                text: "then".to_string(),
            },
        ];
        assert_eq!(
            def.render_with_tooltips(&tooltips),
            "fireball (wait) → (then) heal"
        );
    }

    #[test]
    fn test_labels_are_distinct() {
        let def = SequenceDefinition::new(vec![
            Step::new(vec![Term::new(vec![Alternative::Ability(AbilityToken::labeled("a", "1"))])]),
            Step::new(vec![Term::new(vec![Alternative::Ability(AbilityToken::labeled("b", "1"))])]),
            Step::new(vec![Term::new(vec![Alternative::Ability(AbilityToken::labeled("a", "2"))])]),
        ]);
        assert_eq!(def.labels(), vec!["1", "2"]);
    }
}

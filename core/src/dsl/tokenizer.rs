//! Rotation text tokenizer
//!
//! Turns free-form rotation text (often pasted from a guide, one ability per
//! line) into a flat token stream. The passes run in this order:
//!
//! 1. `->` is accepted as an alias for `→`
//! 2. Line breaks between two complete lines become an implicit `→`
//! 3. `(message)` spans that hang off ability text are cut out as tooltips
//!    and replaced with [`TOOLTIP_MARKER`]
//! 4. Operators and parens split the text; consecutive words merge into one
//!    ability name, after the suffix-qualifier and ability-pair rewrites
//!
//! A backslash escapes a following `(`, `)` or `\`, making it literal text.

use rotascope_types::TokenizerSettings;

use super::error::DslError;
use super::token::{AbilityToken, Operator, TOOLTIP_MARKER, Token, TokenKind};

/// Which side of the structural token a tooltip hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipSide {
    /// Rendered right after the token at `structural_index`
    After,
    /// Rendered right before the token at `structural_index`
    Before,
}

/// A tooltip cut out of the expression, keyed by structural position.
///
/// `structural_index` indexes the token stream, which lines up one-to-one
/// with [`SequenceDefinition::linearize`](super::SequenceDefinition::linearize).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipPlacement {
    pub structural_index: usize,
    pub side: TooltipSide,
    pub text: String,
}

/// Tokenizer output: structural tokens plus extracted tooltips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    pub tooltips: Vec<TooltipPlacement>,
}

#[derive(Debug, Clone)]
struct PendingTooltip {
    text: String,
    side: TooltipSide,
}

#[derive(Debug, Clone)]
struct Word {
    text: String,
    position: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    suffix_qualifiers: Vec<String>,
    ability_pairs: Vec<(String, String)>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerSettings::default())
    }
}

impl Tokenizer {
    pub fn new(settings: &TokenizerSettings) -> Self {
        Self {
            suffix_qualifiers: settings
                .suffix_qualifiers
                .iter()
                .map(|q| q.trim().to_lowercase())
                .filter(|q| !q.is_empty())
                .collect(),
            ability_pairs: settings
                .ability_pairs
                .iter()
                .map(|(a, b)| (a.trim().to_lowercase(), b.trim().to_lowercase()))
                .collect(),
        }
    }

    /// Tokenize rotation text. Positions are character offsets into the
    /// normalized single-line expression.
    pub fn tokenize(&self, input: &str) -> Result<Tokenized, DslError> {
        if let Some(position) = input.chars().position(|c| c == TOOLTIP_MARKER) {
            return Err(DslError::ReservedCharacter {
                position,
                code: TOOLTIP_MARKER as u32,
            });
        }

        let text = join_lines(&input.replace("->", "→"));
        let (chars, pending) = mark_tooltips(&text);
        Ok(self.split(&chars, pending))
    }

    fn split(&self, chars: &[char], pending: Vec<PendingTooltip>) -> Tokenized {
        let mut tokens = Vec::new();
        let mut tooltips = Vec::new();
        let mut pending = pending.into_iter();
        let mut words: Vec<Word> = Vec::new();
        let mut current = String::new();
        let mut current_start = 0;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];

            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    if matches!(next, '(' | ')' | '\\') {
                        if current.is_empty() {
                            current_start = i;
                        }
                        current.push(next);
                        i += 2;
                        continue;
                    }
                }
            }

            if c.is_whitespace() {
                flush_word(&mut current, current_start, &mut words);
                i += 1;
                continue;
            }

            let structural = match c {
                '(' => Some(TokenKind::LeftParen),
                ')' => Some(TokenKind::RightParen),
                _ => Operator::from_char(c).map(TokenKind::Operator),
            };
            if let Some(kind) = structural {
                flush_word(&mut current, current_start, &mut words);
                self.emit_words(&mut words, &mut tokens);
                tokens.push(Token::new(kind, i));
                i += 1;
                continue;
            }

            if c == TOOLTIP_MARKER {
                flush_word(&mut current, current_start, &mut words);
                self.emit_words(&mut words, &mut tokens);
                if let Some(tooltip) = pending.next() {
                    tooltips.push(place_tooltip(tooltip, tokens.len()));
                }
                i += 1;
                continue;
            }

            if current.is_empty() {
                current_start = i;
            }
            current.push(c);
            i += 1;
        }

        flush_word(&mut current, current_start, &mut words);
        self.emit_words(&mut words, &mut tokens);

        Tokenized { tokens, tooltips }
    }

    /// Merge buffered words into ability tokens, splitting on known idioms.
    fn emit_words(&self, words: &mut Vec<Word>, tokens: &mut Vec<Token>) {
        if words.is_empty() {
            return;
        }

        let groups = self.split_idioms(std::mem::take(words));
        for (index, group) in groups.into_iter().enumerate() {
            let Some(first) = group.first() else {
                continue;
            };
            let position = first.position;
            if index > 0 {
                tokens.push(Token::new(TokenKind::Operator(Operator::And), position));
            }
            let name = group
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            tokens.push(Token::new(
                TokenKind::Ability(AbilityToken::parse(&name)),
                position,
            ));
        }
    }

    fn split_idioms(&self, words: Vec<Word>) -> Vec<Vec<Word>> {
        let mut groups: Vec<Vec<Word>> = Vec::new();
        let mut current: Vec<Word> = Vec::new();
        for word in words {
            if let Some(prev) = current.last() {
                if self.is_pair(&prev.text, &word.text) {
                    groups.push(std::mem::take(&mut current));
                }
            }
            current.push(word);
        }
        groups.push(current);

        let mut out = Vec::with_capacity(groups.len());
        for mut group in groups {
            let split_last = group.len() >= 2
                && group
                    .last()
                    .is_some_and(|w| self.is_qualifier(&w.text));
            if split_last {
                if let Some(last) = group.pop() {
                    out.push(group);
                    out.push(vec![last]);
                    continue;
                }
            }
            out.push(group);
        }
        out
    }

    fn is_qualifier(&self, word: &str) -> bool {
        let key = AbilityToken::parse(word).key.to_lowercase();
        self.suffix_qualifiers.iter().any(|q| *q == key)
    }

    fn is_pair(&self, first: &str, second: &str) -> bool {
        let first = first.to_lowercase();
        let second = AbilityToken::parse(second).key.to_lowercase();
        self.ability_pairs
            .iter()
            .any(|(a, b)| *a == first && *b == second)
    }
}

fn flush_word(current: &mut String, start: usize, words: &mut Vec<Word>) {
    if !current.is_empty() {
        words.push(Word {
            text: std::mem::take(current),
            position: start,
        });
    }
}

fn place_tooltip(tooltip: PendingTooltip, next_index: usize) -> TooltipPlacement {
    let (structural_index, side) = match tooltip.side {
        TooltipSide::After if next_index > 0 => (next_index - 1, TooltipSide::After),
        _ => (next_index, TooltipSide::Before),
    };
    TooltipPlacement {
        structural_index,
        side,
        text: tooltip.text,
    }
}

/// True when the character at `index` is preceded by an odd run of backslashes.
fn is_escaped(chars: &[char], index: usize) -> bool {
    let run = chars[..index]
        .iter()
        .rev()
        .take_while(|&&c| c == '\\')
        .count();
    run % 2 == 1
}

fn is_structural_paren(chars: &[char], index: usize) -> bool {
    matches!(chars[index], '(' | ')') && !is_escaped(chars, index)
}

/// Join non-empty lines, inserting `→` where neither side already carries
/// an operator (or an open/close paren that continues the expression).
fn join_lines(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut out = String::new();
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            if line_continues(lines[index - 1]) || line_resumes(line) || is_tooltip_line(line) {
                out.push(' ');
            } else {
                out.push_str(" → ");
            }
        }
        out.push_str(line);
    }
    out
}

fn line_continues(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    match chars.last() {
        Some(&c) if Operator::is_operator_char(c) => true,
        Some('(') => !is_escaped(&chars, chars.len() - 1),
        _ => false,
    }
}

/// A line holding nothing but a `(note)` hangs off the line above it.
fn is_tooltip_line(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    chars.first() == Some(&'(') && tooltip_close(&chars, 0) == Some(chars.len() - 1)
}

fn line_resumes(line: &str) -> bool {
    match line.chars().next() {
        Some(c) => Operator::is_operator_char(c) || c == ')',
        None => false,
    }
}

/// Whether the nearest non-whitespace character is ability text.
fn touches_text(chars: &[char], index: Option<usize>) -> bool {
    let Some(index) = index else {
        return false;
    };
    let c = chars[index];
    if c == TOOLTIP_MARKER {
        return true;
    }
    !Operator::is_operator_char(c) && !is_structural_paren(chars, index)
}

/// Find the `)` closing a tooltip candidate opened at `open`.
///
/// Returns `None` if the span holds a nested paren or an operator, or is
/// empty, in which case the paren is structural grouping.
fn tooltip_close(chars: &[char], open: usize) -> Option<usize> {
    for j in open + 1..chars.len() {
        let c = chars[j];
        if Operator::is_operator_char(c) {
            return None;
        }
        if c == '(' && !is_escaped(chars, j) {
            return None;
        }
        if c == ')' && !is_escaped(chars, j) {
            let body_empty = chars[open + 1..j].iter().all(|c| c.is_whitespace());
            return (!body_empty).then_some(j);
        }
    }
    None
}

fn unescape(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                if matches!(next, '(' | ')' | '\\') {
                    out.push(next);
                    i += 2;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Replace tooltip spans with the marker character, returning the rewritten
/// characters and the tooltips in order of appearance.
fn mark_tooltips(text: &str) -> (Vec<char>, Vec<PendingTooltip>) {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut tooltips = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '(' && !is_escaped(&chars, i) {
            if let Some(close) = tooltip_close(&chars, i) {
                let left_index = out.iter().rposition(|c| !c.is_whitespace());
                let right_index = (close + 1..chars.len()).find(|&j| !chars[j].is_whitespace());
                let left = touches_text(&out, left_index);
                let right = touches_text(&chars, right_index);

                if left || right {
                    tooltips.push(PendingTooltip {
                        text: unescape(&chars[i + 1..close]).trim().to_string(),
                        side: if left {
                            TooltipSide::After
                        } else {
                            TooltipSide::Before
                        },
                    });
                    out.push(TOOLTIP_MARKER);
                    i = close + 1;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    (out, tooltips)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Tokenizer::default()
            .tokenize(text)
            .unwrap()
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn ability(key: &str) -> TokenKind {
        TokenKind::Ability(AbilityToken::new(key))
    }

    fn op(op: Operator) -> TokenKind {
        TokenKind::Operator(op)
    }

    #[test]
    fn test_multi_word_names_merge() {
        assert_eq!(
            kinds("death skulls → fireball"),
            vec![ability("death skulls"), op(Operator::Then), ability("fireball")]
        );
    }

    #[test]
    fn test_ascii_arrow_alias() {
        assert_eq!(
            kinds("a->b"),
            vec![ability("a"), op(Operator::Then), ability("b")]
        );
    }

    #[test]
    fn test_operators_do_not_need_spaces() {
        assert_eq!(
            kinds("(a/b)+c"),
            vec![
                TokenKind::LeftParen,
                ability("a"),
                op(Operator::Or),
                ability("b"),
                TokenKind::RightParen,
                op(Operator::And),
                ability("c"),
            ]
        );
    }

    #[test]
    fn test_line_breaks_become_arrows() {
        assert_eq!(
            kinds("fireball\n\n  heal \r\nbuff"),
            vec![
                ability("fireball"),
                op(Operator::Then),
                ability("heal"),
                op(Operator::Then),
                ability("buff"),
            ]
        );
    }

    #[test]
    fn test_line_break_after_operator_is_plain_space() {
        assert_eq!(
            kinds("fireball +\nheal\n/ shield"),
            vec![
                ability("fireball"),
                op(Operator::And),
                ability("heal"),
                op(Operator::Or),
                ability("shield"),
            ]
        );
    }

    #[test]
    fn test_tooltip_on_its_own_line_attaches_above() {
        let out = Tokenizer::default()
            .tokenize("fireball\n(wait for proc)\nheal")
            .unwrap();
        let kinds: Vec<_> = out.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![ability("fireball"), op(Operator::Then), ability("heal")]
        );
        assert_eq!(out.tooltips[0].structural_index, 0);
        assert_eq!(out.tooltips[0].side, TooltipSide::After);
    }

    #[test]
    fn test_tooltip_after_ability() {
        let out = Tokenizer::default()
            .tokenize("fireball (wait for proc) → heal")
            .unwrap();
        let kinds: Vec<_> = out.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![ability("fireball"), op(Operator::Then), ability("heal")]
        );
        assert_eq!(
            out.tooltips,
            vec![TooltipPlacement {
                structural_index: 0,
                side: TooltipSide::After,
                text: "wait for proc".to_string(),
            }]
        );
    }

    #[test]
    fn test_tooltip_before_first_ability() {
        let out = Tokenizer::default().tokenize("(opener) fireball").unwrap();
        assert_eq!(out.tokens.len(), 1);
        assert_eq!(out.tooltips[0].structural_index, 0);
        assert_eq!(out.tooltips[0].side, TooltipSide::Before);
    }

    #[test]
    fn test_tooltip_forces_ability_boundary() {
        // Without the marker these would merge into "fireball heal"
        assert_eq!(
            kinds("fireball(note)heal"),
            vec![ability("fireball"), ability("heal")]
        );
    }

    #[test]
    fn test_group_between_operators_is_structural() {
        let out = Tokenizer::default().tokenize("a + (b) + c").unwrap();
        assert!(out.tooltips.is_empty());
        assert_eq!(out.tokens.len(), 7);
    }

    #[test]
    fn test_span_with_operator_is_structural() {
        let out = Tokenizer::default().tokenize("fireball → (heal/shield) buff").unwrap();
        assert!(out.tooltips.is_empty());
        assert!(out.tokens.iter().any(|t| t.kind == TokenKind::LeftParen));
    }

    #[test]
    fn test_escaped_parens_in_tooltip_text() {
        let out = Tokenizer::default()
            .tokenize(r"fireball (use \(early\))")
            .unwrap();
        assert_eq!(out.tooltips[0].text, "use (early)");
    }

    #[test]
    fn test_escaped_parens_are_literal_name_text() {
        assert_eq!(kinds(r"\(big\) hit"), vec![ability("(big) hit")]);
    }

    #[test]
    fn test_even_backslashes_do_not_escape() {
        let tokenizer = Tokenizer::default();

        let odd = tokenizer.tokenize(r"x \(note\)").unwrap();
        assert!(odd.tooltips.is_empty());
        assert_eq!(odd.tokens[0].kind, ability("x (note)"));

        let even = tokenizer.tokenize(r"x \\(note)").unwrap();
        assert_eq!(even.tooltips.len(), 1);
        assert_eq!(even.tokens[0].kind, ability(r"x \"));
    }

    #[test]
    fn test_suffix_qualifier_becomes_and() {
        assert_eq!(
            kinds("tsunami eof"),
            vec![ability("tsunami"), op(Operator::And), ability("eof")]
        );
        assert_eq!(kinds("eof"), vec![ability("eof")]);
    }

    #[test]
    fn test_known_pair_becomes_and() {
        assert_eq!(
            kinds("vuln bomb → surge"),
            vec![
                ability("vuln"),
                op(Operator::And),
                ability("bomb"),
                op(Operator::Then),
                ability("surge"),
            ]
        );
    }

    #[test]
    fn test_labels_survive_tokenizing() {
        assert_eq!(
            kinds("fireball[*2] → fireball[*3]"),
            vec![
                TokenKind::Ability(AbilityToken::labeled("fireball", "2")),
                op(Operator::Then),
                TokenKind::Ability(AbilityToken::labeled("fireball", "3")),
            ]
        );
    }

    #[test]
    fn test_reserved_marker_in_input_is_rejected() {
        let err = Tokenizer::default().tokenize("a\u{E000}b").unwrap_err();
        assert_eq!(
            err,
            DslError::ReservedCharacter {
                position: 1,
                code: 0xE000
            }
        );
    }
}

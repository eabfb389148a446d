//! Recursive-descent parser for rotation expressions
//!
//! ```text
//! Expression  := Step ('→' Step)*
//! Step        := Term ('+' Term)*
//! Term        := Alternative ('/' Alternative)*
//! Alternative := AbilityToken | '(' Expression ')'
//! ```
//!
//! Errors are all-or-nothing: no partial tree is ever returned.

use std::collections::HashSet;

use rotascope_types::TokenizerSettings;

use super::ast::{Alternative, SequenceDefinition, Step, Term};
use super::error::DslError;
use super::token::{Operator, Token, TokenKind, TokenTag};
use super::tokenizer::{Tokenized, Tokenizer, TooltipPlacement};

/// A parsed expression together with the tooltips cut out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedExpression {
    pub definition: SequenceDefinition,
    pub tooltips: Vec<TooltipPlacement>,
}

/// Tokenizer + parser with optional knowledge of valid ability keys.
///
/// With known keys, a multi-word name that is not itself a key but splits
/// into several keys (`fireball heal`) is rejected as a missing operator.
#[derive(Debug, Clone, Default)]
pub struct RotationParser {
    tokenizer: Tokenizer,
    known_abilities: Option<HashSet<String>>,
}

impl RotationParser {
    pub fn new(settings: &TokenizerSettings) -> Self {
        Self {
            tokenizer: Tokenizer::new(settings),
            known_abilities: None,
        }
    }

    pub fn with_known_abilities<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_abilities = Some(
            keys.into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .collect(),
        );
        self
    }

    pub fn parse(&self, text: &str) -> Result<SequenceDefinition, DslError> {
        Ok(self.parse_with_tooltips(text)?.definition)
    }

    pub fn parse_with_tooltips(&self, text: &str) -> Result<ParsedExpression, DslError> {
        let Tokenized { tokens, tooltips } = self.tokenizer.tokenize(text)?;
        if tokens.is_empty() {
            return Err(DslError::Empty);
        }
        self.check_missing_operators(&tokens)?;
        let definition = parse_tokens(&tokens)?;
        Ok(ParsedExpression {
            definition,
            tooltips,
        })
    }

    fn check_missing_operators(&self, tokens: &[Token]) -> Result<(), DslError> {
        let Some(known) = &self.known_abilities else {
            return Ok(());
        };

        for token in tokens {
            let TokenKind::Ability(ability) = &token.kind else {
                continue;
            };
            let words: Vec<&str> = ability.key.split_whitespace().collect();
            if words.len() < 2 || known.contains(&ability.key.to_lowercase()) {
                continue;
            }
            let alphanumeric = words
                .iter()
                .all(|w| w.chars().all(char::is_alphanumeric));
            if alphanumeric && splits_into_known(&words, known) {
                return Err(DslError::MissingOperator {
                    position: token.position,
                    text: ability.key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Parse with default tokenizer settings and no known-ability check.
pub fn parse(text: &str) -> Result<SequenceDefinition, DslError> {
    RotationParser::default().parse(text)
}

/// Parse an already tokenized stream.
pub fn parse_tokens(tokens: &[Token]) -> Result<SequenceDefinition, DslError> {
    if tokens.is_empty() {
        return Err(DslError::Empty);
    }
    let mut stream = TokenStream { tokens, index: 0 };
    let definition = stream.expression()?;
    if let Some(token) = stream.peek() {
        return Err(DslError::TrailingInput {
            position: token.position,
            found: token.kind.describe(),
        });
    }
    Ok(definition)
}

/// Whether `words` can be cut into two or more known ability names.
fn splits_into_known(words: &[&str], known: &HashSet<String>) -> bool {
    let n = words.len();
    let mut reachable = vec![false; n + 1];
    reachable[0] = true;
    for start in 0..n {
        if !reachable[start] {
            continue;
        }
        for end in start + 1..=n {
            if start == 0 && end == n {
                continue;
            }
            if known.contains(&words[start..end].join(" ").to_lowercase()) {
                reachable[end] = true;
            }
        }
    }
    reachable[n]
}

struct TokenStream<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> TokenStream<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.index)
    }

    fn peek_operator(&self, op: Operator) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Operator(o), .. }) if *o == op)
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map(|t| t.position + 1).unwrap_or(0)
    }

    fn consume(&mut self, expected: TokenTag) -> Result<&'a Token, DslError> {
        match self.peek() {
            Some(token) if token.kind.tag() == expected => {
                self.index += 1;
                Ok(token)
            }
            Some(token) => Err(DslError::UnexpectedToken {
                position: token.position,
                expected: expected.to_string(),
                found: token.kind.describe(),
            }),
            None => Err(DslError::UnexpectedToken {
                position: self.end_position(),
                expected: expected.to_string(),
                found: "end of input".to_string(),
            }),
        }
    }

    fn expression(&mut self) -> Result<SequenceDefinition, DslError> {
        let mut steps = vec![self.step()?];
        while self.peek_operator(Operator::Then) {
            self.consume(TokenTag::Operator(Operator::Then))?;
            steps.push(self.step()?);
        }
        Ok(SequenceDefinition::new(steps))
    }

    fn step(&mut self) -> Result<Step, DslError> {
        let mut starts = vec![self.position()];
        let mut terms = vec![self.term()?];
        while self.peek_operator(Operator::And) {
            self.consume(TokenTag::Operator(Operator::And))?;
            starts.push(self.position());
            terms.push(self.term()?);
        }

        // `a + b/c + d` could mean several groupings; demand explicit parens
        if terms.len() >= 3 {
            let interior = 1..terms.len() - 1;
            if let Some(index) = interior
                .into_iter()
                .find(|&i| terms[i].is_choice() && terms[i].parens == 0)
            {
                return Err(DslError::AmbiguousNesting {
                    position: starts[index],
                });
            }
        }

        Ok(Step::new(terms))
    }

    fn term(&mut self) -> Result<Term, DslError> {
        let mut alternatives = vec![self.alternative()?];
        while self.peek_operator(Operator::Or) {
            self.consume(TokenTag::Operator(Operator::Or))?;
            alternatives.push(self.alternative()?);
        }
        Ok(fold_redundant_group(alternatives))
    }

    fn alternative(&mut self) -> Result<Alternative, DslError> {
        if matches!(self.peek(), Some(Token { kind: TokenKind::LeftParen, .. })) {
            self.consume(TokenTag::LeftParen)?;
            let inner = self.expression()?;
            self.consume(TokenTag::RightParen)?;
            return Ok(Alternative::Group(inner));
        }

        let token = self.consume(TokenTag::Ability)?;
        match &token.kind {
            TokenKind::Ability(ability) => Ok(Alternative::Ability(ability.clone())),
            other => Err(DslError::UnexpectedToken {
                position: token.position,
                expected: TokenTag::Ability.to_string(),
                found: other.describe(),
            }),
        }
    }

    fn position(&self) -> usize {
        self.peek()
            .map(|t| t.position)
            .unwrap_or_else(|| self.end_position())
    }
}

/// `(b / c)` as a whole term becomes the term `b / c` wrapped once.
fn fold_redundant_group(mut alternatives: Vec<Alternative>) -> Term {
    let foldable = matches!(
        alternatives.as_slice(),
        [Alternative::Group(inner)] if inner.steps.len() == 1 && inner.steps[0].terms.len() == 1
    );
    if foldable {
        if let Some(Alternative::Group(mut inner)) = alternatives.pop() {
            if let Some(mut step) = inner.steps.pop() {
                if let Some(term) = step.terms.pop() {
                    return Term::grouped(term.alternatives, term.parens + 1);
                }
            }
        }
    }
    Term::new(alternatives)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;

//! Token vocabulary for rotation text

use std::fmt;

/// Private-use character that stands in for an extracted `(tooltip)` span.
///
/// It splits words like whitespace would, but never merges into an
/// ability name and never acts as an operator.
pub const TOOLTIP_MARKER: char = '\u{E000}';

/// Structural operators, in increasing binding strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `→` sequential steps
    Then,
    /// `+` all terms of a step together
    And,
    /// `/` any one alternative
    Or,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Self::Then => '→',
            Self::And => '+',
            Self::Or => '/',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '→' => Some(Self::Then),
            '+' => Some(Self::And),
            '/' => Some(Self::Or),
            _ => None,
        }
    }

    /// True for any character that is an operator symbol.
    pub fn is_operator_char(c: char) -> bool {
        Self::from_char(c).is_some()
    }
}

/// A leaf ability reference as written in a rotation.
///
/// `fireball[*2]` parses to key `fireball` with instance label `2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbilityToken {
    pub key: String,
    pub label: Option<String>,
}

impl AbilityToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
        }
    }

    pub fn labeled(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: Some(label.into()),
        }
    }

    /// Split a raw ability name into key and optional `[*label]` suffix.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.ends_with(']') {
            if let Some(start) = text.rfind("[*") {
                let label = text[start + 2..text.len() - 1].trim();
                let key = text[..start].trim();
                if !key.is_empty() {
                    return Self {
                        key: key.to_string(),
                        label: (!label.is_empty()).then(|| label.to_string()),
                    };
                }
            }
        }
        Self::new(text)
    }

    /// `key` or `key[*label]`, the identifier used in results and events.
    pub fn display_id(&self) -> String {
        match &self.label {
            Some(label) => format!("{}[*{}]", self.key, label),
            None => self.key.clone(),
        }
    }
}

impl fmt::Display for AbilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ability(AbilityToken),
    Operator(Operator),
    LeftParen,
    RightParen,
}

impl TokenKind {
    pub fn tag(&self) -> TokenTag {
        match self {
            Self::Ability(_) => TokenTag::Ability,
            Self::Operator(op) => TokenTag::Operator(*op),
            Self::LeftParen => TokenTag::LeftParen,
            Self::RightParen => TokenTag::RightParen,
        }
    }

    /// Human-readable form for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Ability(token) => format!("ability '{}'", token.display_id()),
            Self::Operator(op) => format!("operator '{}'", op.symbol()),
            Self::LeftParen => "'('".to_string(),
            Self::RightParen => "')'".to_string(),
        }
    }
}

/// Token kind without payload, used for `consume(expected)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTag {
    Ability,
    Operator(Operator),
    LeftParen,
    RightParen,
}

impl fmt::Display for TokenTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ability => f.write_str("ability"),
            Self::Operator(op) => write!(f, "operator '{}'", op.symbol()),
            Self::LeftParen => f.write_str("'('"),
            Self::RightParen => f.write_str("')'"),
        }
    }
}

/// A token with the character offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, position: usize) -> Self {
        Self { kind, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_suffix_is_split() {
        let token = AbilityToken::parse("fireball[*2]");
        assert_eq!(token.key, "fireball");
        assert_eq!(token.label.as_deref(), Some("2"));
        assert_eq!(token.display_id(), "fireball[*2]");
    }

    #[test]
    fn test_label_with_space_before_suffix() {
        let token = AbilityToken::parse("death skulls [*1]");
        assert_eq!(token.key, "death skulls");
        assert_eq!(token.label.as_deref(), Some("1"));
    }

    #[test]
    fn test_empty_label_is_dropped() {
        let token = AbilityToken::parse("surge[*]");
        assert_eq!(token.key, "surge");
        assert_eq!(token.label, None);
    }

    #[test]
    fn test_plain_brackets_stay_in_key() {
        let token = AbilityToken::parse("rune [x]");
        assert_eq!(token.key, "rune [x]");
        assert_eq!(token.label, None);
    }
}

use thiserror::Error;

/// A modification rule could not handle an event.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule} failed: {message}")]
    Failed { rule: String, message: String },

    #[error("rule {rule} is misconfigured: {reason}")]
    InvalidConfig { rule: String, reason: String },
}

impl RuleError {
    pub fn failed(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

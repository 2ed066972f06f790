use thiserror::Error;

/// Rejected construction of a value object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("{kind} must be positive, got {value}")]
    NotPositive { kind: &'static str, value: i64 },

    #[error("Invalid language code '{0}': expected two letters")]
    InvalidLanguage(String),

    #[error("Invalid tag name '{0}': expected 2 to 50 characters")]
    InvalidTagName(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{tier} storage unavailable: {reason}")]
    TierUnavailable { tier: String, reason: String },

    #[error("estimated size {estimated} bytes exceeds sync budget of {budget} bytes")]
    QuotaExceeded { estimated: usize, budget: usize },

    #[error("invalid shortcut: {0}")]
    InvalidRecord(String),

    #[error("index {index} out of range for {len} shortcuts")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("could not parse import file: {0}")]
    ImportParse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn unavailable(tier: &str, reason: impl std::fmt::Display) -> Self {
        Error::TierUnavailable {
            tier: tier.to_string(),
            reason: reason.to_string(),
        }
    }
}

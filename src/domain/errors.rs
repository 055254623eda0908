// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the reward ledger core.
///
/// `Validation` and `DuplicateGrant` are expected outcomes the caller can act
/// on. Everything else is an internal failure.
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("duplicate reward: identical reward already exists")]
    DuplicateGrant,

    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Reward grant not found: {0}")]
    GrantNotFound(i64),

    #[error("Ledger entries for grant {0} are already reversed")]
    AlreadyReversed(i64),
}

impl RewardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RewardError::Validation(msg.into())
    }

    /// True for failures that an outer layer should report as a server error.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            RewardError::PriceUnavailable { .. } | RewardError::Persistence(_)
        )
    }
}

impl From<rusqlite::Error> for RewardError {
    fn from(e: rusqlite::Error) -> Self {
        RewardError::Persistence(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
pub type RewardResult<T> = Result<T, RewardError>;

use crate::providers::ProviderError;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad placement/kills handed to the score calculator, or a malformed
    /// user-supplied value (e.g. a manual match-id lookup).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Vendor/network failure while talking to a statistics provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Natural-key collision. The record was skipped, never re-merged.
    #[error("duplicate record for natural key")]
    DuplicateRecord,

    /// Concurrent-write detected during a merge; retry with fresh state.
    #[error("persistence conflict during leaderboard merge")]
    PersistenceConflict,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Whether the failure is worth retrying on the next scheduled run.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Provider(e) => e.is_retryable(),
            EngineError::PersistenceConflict | EngineError::Database(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_is_not_retryable() {
        assert!(!EngineError::InvalidInput("placement".into()).is_retryable());
        assert!(!EngineError::DuplicateRecord.is_retryable());
        assert!(!EngineError::NotFound("tournament".into()).is_retryable());
    }

    #[test]
    fn conflicts_are_retryable() {
        assert!(EngineError::PersistenceConflict.is_retryable());
    }
}

use thiserror::Error;

/// Failure modes surfaced by the store and sync paths. Evaluation itself
/// never returns errors; unexpected conditions degrade to default results.
#[derive(Debug, Error)]
pub enum StatsigError {
    #[error("statsig network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// Raised instead of touching the network when local mode is enabled.
    /// Callers treat this as a quiet failure and skip logging.
    #[error("network access disabled in local mode")]
    LocalModeNetwork,

    #[error("failed to parse spec payload: {0}")]
    Parse(String),

    #[error("malformed config spec payload: {0}")]
    ConfigConstruction(String),

    #[error("id list {name} invalidated: {reason}")]
    IdList { name: String, reason: String },

    #[error("data adapter error: {0}")]
    Adapter(String),

    #[error("statsig: missing user id")]
    MissingUserId,
}

impl StatsigError {
    /// True for failures that should not be logged or counted against the
    /// sync failure budget.
    pub fn is_quiet(&self) -> bool {
        matches!(self, StatsigError::LocalModeNetwork)
    }
}

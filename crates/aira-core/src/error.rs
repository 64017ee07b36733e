use thiserror::Error;

/// Top-level error type for the AIRA system.
///
/// Capability implementations (storage, completion, search, transcription)
/// all report through this type so the orchestration layer can apply one
/// retry and degradation policy regardless of which backend failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AiraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AiraError {
    /// Whether this failure carries a rate-limit or overload signature.
    ///
    /// Only these failures earn a backoff sleep before the next attempt.
    pub fn is_rate_limited(&self) -> bool {
        if matches!(self, AiraError::RateLimited(_)) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        ["rate limit", "rate_limit", "capacity", "overloaded", "429"]
            .iter()
            .any(|marker| message.contains(marker))
    }
}

impl From<toml::de::Error> for AiraError {
    fn from(err: toml::de::Error) -> Self {
        AiraError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AiraError {
    fn from(err: toml::ser::Error) -> Self {
        AiraError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AiraError {
    fn from(err: serde_json::Error) -> Self {
        AiraError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for AIRA operations.
pub type Result<T> = std::result::Result<T, AiraError>;

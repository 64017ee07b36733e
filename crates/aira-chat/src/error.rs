//! Error types for the conversation pipeline.
//!
//! Capability failures never surface here during a turn; they degrade the
//! turn instead. These errors cover caller input and the standalone voice
//! entry point.

use aira_core::error::AiraError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("utterance cannot be empty")]
    EmptyUtterance,
    #[error("utterance exceeds maximum length of {0} characters")]
    UtteranceTooLong(usize),
    #[error("audio payload is empty")]
    EmptyAudio,
    #[error("voice error: {0}")]
    Voice(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<AiraError> for ChatError {
    fn from(err: AiraError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

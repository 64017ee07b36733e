//! Voice input for the conversational engine.
//!
//! Audio capture happens in the calling layer; this turns recorded bytes
//! into text that is then submitted as an ordinary user turn.

use std::sync::Arc;

use tracing::{info, warn};

use aira_core::capability::Transcriber;
use aira_core::config::RetryConfig;

use crate::error::ChatError;
use crate::retry::with_retry;

pub struct VoiceInput {
    transcriber: Arc<dyn Transcriber>,
    retry: RetryConfig,
}

impl VoiceInput {
    pub fn new(transcriber: Arc<dyn Transcriber>, retry: RetryConfig) -> Self {
        Self { transcriber, retry }
    }

    /// Transcribe recorded audio.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String, ChatError> {
        if audio.is_empty() {
            return Err(ChatError::EmptyAudio);
        }

        let transcriber = &self.transcriber;
        let text = with_retry(&self.retry, "transcription", move || {
            transcriber.transcribe(audio)
        })
        .await
        .map_err(|e| {
            warn!(error = %e, bytes = audio.len(), "Transcription failed");
            ChatError::Voice(e.to_string())
        })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ChatError::Voice("no speech recognized".to_string()));
        }
        info!(bytes = audio.len(), chars = text.chars().count(), "Audio transcribed");
        Ok(text)
    }
}

// =============================================================================
// Tests
// =============================================================================

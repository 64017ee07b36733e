//! Speech-to-text over the OpenAI audio transcription endpoint.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use aira_core::capability::Transcriber;
use aira_core::config::ProviderConfig;
use aira_core::error::{AiraError, Result};

use crate::http;

const SERVICE: &str = "transcription";

pub struct OpenAiTranscriber {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>, config: &ProviderConfig) -> Self {
        Self {
            client: http::build_client(config.timeout_secs),
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let key = http::api_key_from_env(&config.api_key_env)?;
        Ok(Self::new(key, config))
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        debug!(bytes = audio.len(), model = %self.model, "Uploading audio");
        let file = Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AiraError::Transcription(e.to_string()))?;
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", file);

        let request = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form);
        let response =
            http::send(request, SERVICE, self.timeout_secs, AiraError::Transcription).await?;

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| {
            AiraError::InvalidResponse(format!("{} response parse failed: {}", SERVICE, e))
        })?;
        Ok(parsed.text)
    }
}

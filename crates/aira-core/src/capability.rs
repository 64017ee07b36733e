//! External capabilities the assistant consumes: text completion, web
//! search, and speech transcription.
//!
//! Each trait is object-safe (`async_trait`) so the orchestrator can hold
//! `Arc<dyn ...>` and swap HTTP clients for mocks.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Utterance;

/// Lazy sequence of reply fragments.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Requested shape of a non-streaming completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// The reply must be a single JSON object.
    JsonObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Utterance>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Utterance>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            system: None,
            messages,
            temperature,
            max_tokens,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json_object(mut self) -> Self {
        self.response_format = ResponseFormat::JsonObject;
        self
    }
}

#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Start a streaming completion. Errors before the first fragment are
    /// returned directly; errors mid-stream arrive as stream items.
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream>;

    /// Run a completion to the end and return the full text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// One web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, depth: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Raw text content of the page at `url`.
    async fn extract(&self, url: &str) -> Result<String>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

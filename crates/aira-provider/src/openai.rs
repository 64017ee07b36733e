//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use aira_core::capability::{
    CompletionRequest, ResponseFormat, TextCompletion, TextStream,
};
use aira_core::config::ProviderConfig;
use aira_core::error::{AiraError, Result};
use aira_core::types::{ContentPart, Role, Utterance};

use crate::http;

const SERVICE: &str = "openai";

pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiCompletion {
    pub fn new(api_key: impl Into<String>, config: &ProviderConfig) -> Self {
        Self {
            client: http::build_client(config.timeout_secs),
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    /// Build a client with the key read from `config.api_key_env`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let key = http::api_key_from_env(&config.api_key_env)?;
        Ok(Self::new(key, config))
    }

    fn to_api_request(&self, request: &CompletionRequest, stream: bool) -> ApiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: ApiContent::Text(system.clone()),
            });
        }
        messages.extend(request.messages.iter().map(to_api_message));

        ApiRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: if stream { Some(true) } else { None },
            response_format: match request.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some(ApiResponseFormat {
                    kind: "json_object".to_string(),
                }),
            },
        }
    }

    async fn post(&self, body: &ApiRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body);
        http::send(request, SERVICE, self.timeout_secs, AiraError::Completion).await
    }
}

#[async_trait]
impl TextCompletion for OpenAiCompletion {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        let body = self.to_api_request(&request, true);
        debug!(model = %body.model, messages = body.messages.len(), "Starting completion stream");
        let response = self.post(&body).await?;
        Ok(parse_sse_stream(response.bytes_stream()).boxed())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = self.to_api_request(&request, false);
        debug!(model = %body.model, messages = body.messages.len(), "Requesting completion");
        let response = self.post(&body).await?;
        let parsed: ApiResponse = response.json().await.map_err(|e| {
            AiraError::InvalidResponse(format!("{} response parse failed: {}", SERVICE, e))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiraError::InvalidResponse("completion has no content".to_string()))
    }
}

fn to_api_message(utterance: &Utterance) -> ApiMessage {
    let role = match utterance.role() {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let has_image = utterance
        .parts()
        .iter()
        .any(|p| matches!(p, ContentPart::Image { .. }));

    let content = if has_image {
        ApiContent::Parts(
            utterance
                .parts()
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => ApiPart::Text { text: text.clone() },
                    ContentPart::Image { media_type, data } => ApiPart::ImageUrl {
                        image_url: ApiImageUrl {
                            url: format!("data:{};base64,{}", media_type, data),
                        },
                    },
                })
                .collect(),
        )
    } else {
        ApiContent::Text(utterance.text())
    };

    ApiMessage {
        role: role.to_string(),
        content,
    }
}

/// Turn a server-sent-events body into a stream of content deltas.
///
/// Events are separated by a blank line. `[DONE]` and events without
/// content are skipped; an unparseable event ends the stream with an error.
pub(crate) fn parse_sse_stream<S>(byte_stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut buffer = String::new();
        futures::pin_mut!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(AiraError::Completion(format!("stream read failed: {}", e)));
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk).replace("\r\n", "\n"));

            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer.drain(..pos + 2);

                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() || data == "[DONE]" {
                        continue;
                    }
                    match serde_json::from_str::<ApiStreamChunk>(data) {
                        Ok(parsed) => {
                            let delta = parsed
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content);
                            if let Some(text) = delta {
                                if !text.is_empty() {
                                    yield Ok(text);
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(AiraError::InvalidResponse(format!(
                                "invalid stream event: {}",
                                e
                            )));
                            return;
                        }
                    }
                }
            }
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ApiResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ApiResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
}

//! Search-intent classification.
//!
//! Asks the completion capability whether an utterance needs real-time web
//! lookup. Failure never blocks the turn: after the retry budget is spent
//! the classifier answers "no search" with the utterance as query.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use aira_core::capability::{CompletionRequest, TextCompletion};
use aira_core::config::RetryConfig;
use aira_core::error::AiraError;
use aira_core::types::Utterance;

use crate::retry::with_retry;

const CLASSIFIER_TEMPERATURE: f32 = 0.1;
const CLASSIFIER_MAX_TOKENS: u32 = 200;

const CLASSIFIER_INSTRUCTION: &str = "\
You classify questions sent to a family assistant. Decide whether answering \
needs real-time facts from the web.

Search is needed when the question is about:
1. News, current or recent events
2. Up-to-date facts or statistics
3. Sports results or tournaments
4. Prices or new products
5. Weather or current traffic

Search is NOT needed when the question is about:
1. Managing family data (members, events, notes)
2. Opinions or personal advice
3. Common recipes
4. Simple general knowledge
5. Help using the app";

/// Classifier verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIntent {
    pub need_search: bool,
    /// Optimized query; the utterance itself when none was produced.
    pub query: String,
}

impl SearchIntent {
    fn no_search(query: &str) -> Self {
        Self {
            need_search: false,
            query: query.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    need_search: bool,
    #[serde(default)]
    search_query: String,
}

pub struct SearchIntentClassifier {
    completion: Arc<dyn TextCompletion>,
    retry: RetryConfig,
}

impl SearchIntentClassifier {
    pub fn new(completion: Arc<dyn TextCompletion>, retry: RetryConfig) -> Self {
        Self { completion, retry }
    }

    /// Classify `utterance`. Never fails.
    pub async fn classify(&self, utterance: &str) -> SearchIntent {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return SearchIntent::no_search(utterance);
        }

        let request = CompletionRequest::new(
            vec![Utterance::user_text(format!(
                "Question: {}\n\nDoes this question need real-time information from the web? \
                 Reply with a JSON object with two fields: need_search (true/false) and \
                 search_query (the best web search query if a search is needed).",
                utterance
            ))],
            CLASSIFIER_TEMPERATURE,
            CLASSIFIER_MAX_TOKENS,
        )
        .with_system(CLASSIFIER_INSTRUCTION)
        .json_object();

        let completion = &self.completion;
        let result = with_retry(&self.retry, "search_intent", move || {
            let request = request.clone();
            async move {
                let raw = completion.complete(request).await?;
                parse_verdict(&raw)
            }
        })
        .await;

        match result {
            Ok(verdict) => {
                let query = verdict.search_query.trim();
                let intent = SearchIntent {
                    need_search: verdict.need_search,
                    query: if query.is_empty() {
                        utterance.to_string()
                    } else {
                        query.to_string()
                    },
                };
                debug!(need_search = intent.need_search, query = %intent.query, "Search intent classified");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Search intent classification failed, skipping search");
                SearchIntent::no_search(utterance)
            }
        }
    }
}

fn parse_verdict(raw: &str) -> Result<Verdict, AiraError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body)
        .map_err(|e| AiraError::InvalidResponse(format!("search intent verdict: {}", e)))
}

/// Remove a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    match inner.find('\n') {
        Some(newline) if !inner[..newline].contains('{') => inner[newline + 1..].trim(),
        _ => inner.trim(),
    }
}

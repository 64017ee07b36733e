//! Search-and-summarize augmentation.
//!
//! Runs a web search, extracts the top result pages concurrently, and asks
//! the completion capability to condense them into one answer with source
//! attribution.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use aira_core::capability::{CompletionRequest, SearchHit, TextCompletion, WebSearch};
use aira_core::config::{RetryConfig, SearchConfig};
use aira_core::types::Utterance;

use crate::context::TRUNCATION_MARKER;
use crate::retry::with_retry;
use crate::types::SearchAugmentation;

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 1500;

const SUMMARIZER_INSTRUCTION: &str = "You condense information from several web sources \
into a complete, accurate and well structured answer.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Document {
    url: String,
    content: String,
}

pub struct WebResearcher {
    search: Arc<dyn WebSearch>,
    completion: Arc<dyn TextCompletion>,
    config: SearchConfig,
    retry: RetryConfig,
}

impl WebResearcher {
    pub fn new(
        search: Arc<dyn WebSearch>,
        completion: Arc<dyn TextCompletion>,
        config: SearchConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            search,
            completion,
            config,
            retry,
        }
    }

    /// Research `query`. `None` when nothing usable came back; failures
    /// are logged, never raised.
    pub async fn research(&self, query: &str) -> Option<SearchAugmentation> {
        let search = &self.search;
        let depth = self.config.depth.as_str();
        let max_results = self.config.max_results;
        let hits = match with_retry(&self.retry, "web_search", move || {
            search.search(query, depth, max_results)
        })
        .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, query, "Web search failed");
                return None;
            }
        };
        if hits.is_empty() {
            info!(query, "Web search returned no results");
            return None;
        }

        let documents = self.extract_documents(&hits).await;
        if documents.is_empty() {
            warn!(query, "No content could be extracted from search results");
            return None;
        }

        let summary = self.summarize(query, &documents).await?;
        Some(SearchAugmentation {
            query: query.to_string(),
            summary,
            sources: documents.into_iter().map(|d| d.url).collect(),
        })
    }

    /// Fetch the top hits concurrently. Failed extractions are dropped.
    async fn extract_documents(&self, hits: &[SearchHit]) -> Vec<Document> {
        let fetches = hits.iter().take(self.config.extract_limit).map(|hit| {
            let search = &self.search;
            let url = hit.url.as_str();
            async move {
                let result =
                    with_retry(&self.retry, "web_extract", move || search.extract(url)).await;
                (hit, result)
            }
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(hit, result)| match result {
                Ok(content) if !content.trim().is_empty() => Some(Document {
                    url: hit.url.clone(),
                    content: truncate_chars(&content, self.config.max_content_chars),
                }),
                Ok(_) => {
                    debug!(url = %hit.url, "Extracted page is empty");
                    None
                }
                Err(e) => {
                    warn!(url = %hit.url, error = %e, "Content extraction failed");
                    None
                }
            })
            .collect()
    }

    async fn summarize(&self, query: &str, documents: &[Document]) -> Option<String> {
        let sources = match serde_json::to_string(documents) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize extracted documents");
                return None;
            }
        };
        let prompt = format!(
            "Below is content extracted from the web about the question: \"{}\"\n\n{}\n\n\
             Combine the sources into a complete and accurate answer. Present it clearly \
             and with structure. If sources disagree, say so. Cite the source URL at the \
             end of each part.",
            query, sources
        );
        let request = CompletionRequest::new(
            vec![Utterance::user_text(prompt)],
            SUMMARY_TEMPERATURE,
            SUMMARY_MAX_TOKENS,
        )
        .with_system(SUMMARIZER_INSTRUCTION);

        let completion = &self.completion;
        match with_retry(&self.retry, "search_summary", move || {
            completion.complete(request.clone())
        })
        .await
        {
            Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
            Ok(_) => {
                warn!(query, "Search summary was empty");
                None
            }
            Err(e) => {
                warn!(error = %e, query, "Search summary failed");
                None
            }
        }
    }
}

/// Keep the first `max_chars` characters, marking the cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCompletion, MockSearch};
    use aira_core::error::AiraError;

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn researcher(search: Arc<MockSearch>, completion: Arc<MockCompletion>) -> WebResearcher {
        WebResearcher::new(search, completion, SearchConfig::default(), retry())
    }

    #[tokio::test]
    async fn test_research_summarizes_top_pages() {
        let search = Arc::new(
            MockSearch::new()
                .with_page("https://a.example", "A", "Trời nắng 31 độ")
                .with_page("https://b.example", "B", "Không mưa")
                .with_page("https://c.example", "C", "Gió nhẹ")
                .with_page("https://d.example", "D", "ignored"),
        );
        let completion = Arc::new(MockCompletion::new());
        completion.push_complete("Hà Nội nắng, 31°C.");

        let aug = researcher(search.clone(), completion.clone())
            .research("thời tiết Hà Nội")
            .await
            .unwrap();

        assert_eq!(aug.summary, "Hà Nội nắng, 31°C.");
        assert_eq!(
            aug.sources,
            vec!["https://a.example", "https://b.example", "https://c.example"]
        );
        let mut extracted = search.extracted();
        extracted.sort();
        assert_eq!(extracted.len(), 3);
        assert!(!extracted.contains(&"https://d.example".to_string()));

        let request = &completion.requests()[0];
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 1500);
        assert!(request.messages[0].text().contains("Gió nhẹ"));
    }

    #[tokio::test]
    async fn test_failed_extraction_is_skipped() {
        let search = Arc::new(
            MockSearch::new()
                .with_unreadable_page("https://broken.example", "x")
                .with_page("https://ok.example", "ok", "useful"),
        );
        let completion = Arc::new(MockCompletion::new());
        completion.push_complete("summary");

        let aug = researcher(search, completion)
            .research("q")
            .await
            .unwrap();
        assert_eq!(aug.sources, vec!["https://ok.example"]);
    }

    #[tokio::test]
    async fn test_no_results_is_none() {
        let search = Arc::new(MockSearch::new());
        let completion = Arc::new(MockCompletion::new());
        assert!(researcher(search, completion.clone())
            .research("q")
            .await
            .is_none());
        assert!(completion.requests().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_none() {
        let search = Arc::new(MockSearch::new().with_page("https://a", "a", "b"));
        search.set_failing(true);
        let completion = Arc::new(MockCompletion::new());
        assert!(researcher(search.clone(), completion)
            .research("q")
            .await
            .is_none());
        assert_eq!(search.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_summary_failure_is_none() {
        let search = Arc::new(MockSearch::new().with_page("https://a", "a", "content"));
        let completion = Arc::new(MockCompletion::new());
        completion.push_complete_error(AiraError::Completion("down".into()));
        completion.push_complete_error(AiraError::Completion("down".into()));
        assert!(researcher(search, completion)
            .research("q")
            .await
            .is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("phở bò", 3), "phở...");
    }
}

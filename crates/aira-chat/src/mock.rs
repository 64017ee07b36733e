//! Scriptable mock capabilities.
//!
//! Used by tests and by the binary's offline mode. Each mock pops scripted
//! responses in order and falls back to a fixed default when its script
//! runs out.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;

use aira_core::capability::{
    CompletionRequest, ResponseFormat, SearchHit, TextCompletion, TextStream, Transcriber,
    WebSearch,
};
use aira_core::error::{AiraError, Result};
use aira_core::types::Role;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Completion
// =============================================================================

/// One scripted streaming call.
#[derive(Debug)]
pub enum MockStream {
    /// Yield these fragments, then end.
    Fragments(Vec<String>),
    /// Fail before any fragment.
    Fail(AiraError),
    /// Yield these fragments, then fail mid-stream.
    FailAfter(Vec<String>, AiraError),
}

/// Mock text completion with separate scripts for streaming, plain-text
/// and JSON-mode calls. Every request is recorded.
#[derive(Debug, Default)]
pub struct MockCompletion {
    streams: Mutex<VecDeque<MockStream>>,
    texts: Mutex<VecDeque<Result<String>>>,
    json: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream<S: Into<String>>(&self, fragments: impl IntoIterator<Item = S>) {
        let fragments = fragments.into_iter().map(Into::into).collect();
        lock(&self.streams).push_back(MockStream::Fragments(fragments));
    }

    pub fn push_stream_error(&self, error: AiraError) {
        lock(&self.streams).push_back(MockStream::Fail(error));
    }

    pub fn push_stream_then_error<S: Into<String>>(
        &self,
        fragments: impl IntoIterator<Item = S>,
        error: AiraError,
    ) {
        let fragments = fragments.into_iter().map(Into::into).collect();
        lock(&self.streams).push_back(MockStream::FailAfter(fragments, error));
    }

    /// Script a plain-text `complete` reply.
    pub fn push_complete(&self, text: impl Into<String>) {
        lock(&self.texts).push_back(Ok(text.into()));
    }

    pub fn push_complete_error(&self, error: AiraError) {
        lock(&self.texts).push_back(Err(error));
    }

    /// Script a JSON-mode `complete` reply.
    pub fn push_json(&self, text: impl Into<String>) {
        lock(&self.json).push_back(Ok(text.into()));
    }

    pub fn push_json_error(&self, error: AiraError) {
        lock(&self.json).push_back(Err(error));
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    fn record(&self, request: &CompletionRequest) {
        lock(&self.requests).push(request.clone());
    }
}

fn last_user_text(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|u| u.role() == Role::User)
        .map(|u| u.text())
        .unwrap_or_default()
}

#[async_trait]
impl TextCompletion for MockCompletion {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        self.record(&request);
        let scripted = lock(&self.streams).pop_front();
        let items: Vec<Result<String>> = match scripted {
            Some(MockStream::Fragments(fragments)) => fragments.into_iter().map(Ok).collect(),
            Some(MockStream::Fail(error)) => return Err(error),
            Some(MockStream::FailAfter(fragments, error)) => fragments
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(error)))
                .collect(),
            None => {
                let echo = format!("(offline) {}", last_user_text(&request));
                echo.split_inclusive(' ').map(|w| Ok(w.to_string())).collect()
            }
        };
        Ok(futures::stream::iter(items).boxed())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.record(&request);
        match request.response_format {
            ResponseFormat::JsonObject => lock(&self.json)
                .pop_front()
                .unwrap_or_else(|| Ok(r#"{"need_search": false, "search_query": ""}"#.to_string())),
            ResponseFormat::Text => lock(&self.texts).pop_front().unwrap_or_else(|| {
                Ok(format!(
                    "Conversation about: {}",
                    last_user_text(&request).chars().take(80).collect::<String>()
                ))
            }),
        }
    }
}

// =============================================================================
// Search
// =============================================================================

/// Mock web search returning fixed hits and page contents.
#[derive(Debug, Default)]
pub struct MockSearch {
    hits: Vec<SearchHit>,
    pages: HashMap<String, String>,
    fail_search: AtomicBool,
    queries: Mutex<Vec<String>>,
    extracted: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hit whose page content is `content`.
    pub fn with_page(mut self, url: &str, snippet: &str, content: &str) -> Self {
        self.hits.push(SearchHit {
            url: url.to_string(),
            title: url.to_string(),
            snippet: snippet.to_string(),
        });
        self.pages.insert(url.to_string(), content.to_string());
        self
    }

    /// Add a hit whose content extraction fails.
    pub fn with_unreadable_page(mut self, url: &str, snippet: &str) -> Self {
        self.hits.push(SearchHit {
            url: url.to_string(),
            title: url.to_string(),
            snippet: snippet.to_string(),
        });
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_search.store(failing, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn extracted(&self) -> Vec<String> {
        lock(&self.extracted).clone()
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str, _depth: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        lock(&self.queries).push(query.to_string());
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(AiraError::Search("mock search unavailable".to_string()));
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    async fn extract(&self, url: &str) -> Result<String> {
        lock(&self.extracted).push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AiraError::Search(format!("no content for {}", url)))
    }
}

// =============================================================================
// Transcription
// =============================================================================

/// Mock transcriber popping scripted results.
#[derive(Debug, Default)]
pub struct MockTranscription {
    results: Mutex<VecDeque<Result<String>>>,
}

impl MockTranscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        lock(&self.results).push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: AiraError) {
        lock(&self.results).push_back(Err(error));
    }
}

#[async_trait]
impl Transcriber for MockTranscription {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Err(AiraError::Transcription(
                "Cannot transcribe empty audio data".to_string(),
            ));
        }
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Ok(format!("({} bytes of audio)", audio.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aira_core::types::Utterance;
    use futures::TryStreamExt;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new(vec![Utterance::user_text(text)], 0.7, 100)
    }

    #[tokio::test]
    async fn test_scripted_stream() {
        let mock = MockCompletion::new();
        mock.push_stream(["a", "b"]);
        let parts: Vec<String> = mock
            .stream(request("x"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(parts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stream_fails_mid_way() {
        let mock = MockCompletion::new();
        mock.push_stream_then_error(["a"], AiraError::Completion("cut".into()));
        let items: Vec<Result<String>> = mock.stream(request("x")).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_default_stream_echoes() {
        let mock = MockCompletion::new();
        let text: String = mock
            .stream(request("xin chào"))
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .concat();
        assert_eq!(text, "(offline) xin chào");
    }

    #[tokio::test]
    async fn test_json_and_text_scripts_are_separate() {
        let mock = MockCompletion::new();
        mock.push_complete("plain");
        mock.push_json("{}");
        assert_eq!(mock.complete(request("x").json_object()).await.unwrap(), "{}");
        assert_eq!(mock.complete(request("x")).await.unwrap(), "plain");
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_search() {
        let search = MockSearch::new()
            .with_page("https://a", "A", "content a")
            .with_unreadable_page("https://b", "B");
        let hits = search.search("q", "basic", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(search.extract("https://a").await.unwrap(), "content a");
        assert!(search.extract("https://b").await.is_err());
        search.set_failing(true);
        assert!(search.search("q", "basic", 3).await.is_err());
        assert_eq!(search.queries(), vec!["q", "q"]);
    }

    #[tokio::test]
    async fn test_mock_transcription_rejects_empty_audio() {
        let mock = MockTranscription::new();
        assert!(mock.transcribe(&[]).await.is_err());
        mock.push_text("hello");
        assert_eq!(mock.transcribe(&[1]).await.unwrap(), "hello");
    }
}

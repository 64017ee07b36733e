//! Short conversation summaries stored alongside chat snapshots.

use std::sync::Arc;

use tracing::{debug, warn};

use aira_core::capability::{CompletionRequest, TextCompletion};
use aira_core::config::RetryConfig;
use aira_core::types::Utterance;

use crate::retry::with_retry;

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 150;

const SUMMARIZER_INSTRUCTION: &str = "You write conversation summaries. Summarize the \
conversation below in 1-3 short sentences, focusing on the key information and requests.";

pub struct ChatSummarizer {
    completion: Arc<dyn TextCompletion>,
    retry: RetryConfig,
}

impl ChatSummarizer {
    pub fn new(completion: Arc<dyn TextCompletion>, retry: RetryConfig) -> Self {
        Self { completion, retry }
    }

    /// Summarize `conversation`. `None` when it has no text or every
    /// attempt failed.
    pub async fn summarize(&self, conversation: &[Utterance]) -> Option<String> {
        let transcript = transcript(conversation);
        if transcript.is_empty() {
            return None;
        }

        let request = CompletionRequest::new(
            vec![Utterance::user_text(format!(
                "Summarize the following conversation:\n\n{}",
                transcript
            ))],
            SUMMARY_TEMPERATURE,
            SUMMARY_MAX_TOKENS,
        )
        .with_system(SUMMARIZER_INSTRUCTION);

        let completion = &self.completion;
        match with_retry(&self.retry, "chat_summary", move || {
            completion.complete(request.clone())
        })
        .await
        {
            Ok(summary) => {
                let summary = summary.trim().to_string();
                debug!(chars = summary.len(), "Conversation summarized");
                (!summary.is_empty()).then_some(summary)
            }
            Err(e) => {
                warn!(error = %e, "Conversation summary failed");
                None
            }
        }
    }
}

/// `ROLE: text` per text part, one per line. Image parts are skipped.
pub fn transcript(conversation: &[Utterance]) -> String {
    conversation
        .iter()
        .flat_map(|u| {
            let role = u.role().to_string().to_uppercase();
            u.parts()
                .iter()
                .filter_map(|p| p.as_text())
                .map(move |text| format!("{}: {}", role, text))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCompletion;
    use aira_core::error::AiraError;
    use aira_core::types::{ContentPart, Role};

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_transcript_skips_images() {
        let conversation = vec![
            Utterance::new(
                Role::User,
                vec![
                    ContentPart::text("what is this?"),
                    ContentPart::image("image/png", b"png"),
                ],
            ),
            Utterance::assistant_text("a cat"),
        ];
        assert_eq!(transcript(&conversation), "USER: what is this?\nASSISTANT: a cat");
    }

    #[tokio::test]
    async fn test_summarize() {
        let mock = Arc::new(MockCompletion::new());
        mock.push_complete("  Planned a family dinner for Friday.  ");
        let summarizer = ChatSummarizer::new(mock.clone(), retry());

        let summary = summarizer
            .summarize(&[Utterance::user_text("dinner friday?")])
            .await;
        assert_eq!(summary.as_deref(), Some("Planned a family dinner for Friday."));

        let request = &mock.requests()[0];
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 150);
        assert!(request.messages[0].text().contains("USER: dinner friday?"));
    }

    #[tokio::test]
    async fn test_summarize_gives_up_after_retries() {
        let mock = Arc::new(MockCompletion::new());
        for _ in 0..3 {
            mock.push_complete_error(AiraError::Completion("down".into()));
        }
        let summarizer = ChatSummarizer::new(mock.clone(), retry());
        assert!(summarizer
            .summarize(&[Utterance::user_text("hi")])
            .await
            .is_none());
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_conversation_is_not_sent() {
        let mock = Arc::new(MockCompletion::new());
        let summarizer = ChatSummarizer::new(mock.clone(), retry());
        assert!(summarizer.summarize(&[]).await.is_none());
        assert!(mock.requests().is_empty());
    }
}

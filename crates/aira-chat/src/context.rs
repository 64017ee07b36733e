//! Context window limiting.
//!
//! Bounds the conversation submitted to the completion capability under an
//! approximate token budget. Token counts are estimated as text characters
//! divided by a fixed ratio; image parts are free.

use tracing::debug;

use aira_core::config::ContextConfig;
use aira_core::types::{Role, Utterance};

/// Appended to text parts cut by the latest-utterance ceiling.
pub const TRUNCATION_MARKER: &str = "...";

/// Messages selected for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    /// System instruction, always included.
    pub system: String,
    /// Older utterances that fit, oldest first, then the latest user
    /// utterance last.
    pub messages: Vec<Utterance>,
    /// Older utterances left out of the window.
    pub dropped: usize,
    /// Whether the latest user utterance was truncated.
    pub truncated_latest: bool,
}

/// Applies the token budget to a conversation.
#[derive(Debug, Clone)]
pub struct ContextLimiter {
    config: ContextConfig,
}

impl ContextLimiter {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Approximate token count of `chars` characters.
    pub fn estimate_chars(&self, chars: usize) -> usize {
        chars / self.config.chars_per_token.max(1)
    }

    pub fn estimate(&self, utterance: &Utterance) -> usize {
        self.estimate_chars(utterance.text_chars())
    }

    /// Select the messages to submit.
    ///
    /// The system instruction counts against the budget first. Every
    /// utterance except the most recent user one is then walked newest to
    /// oldest and kept while the running total stays within
    /// `max_tokens - reserve_tokens`; the walk stops at the first one that
    /// does not fit. The most recent user utterance is always appended
    /// last, truncated if it alone exceeds the per-message ceiling.
    pub fn limit(&self, system: &str, conversation: &[Utterance]) -> ContextWindow {
        let budget = self
            .config
            .max_tokens
            .saturating_sub(self.config.reserve_tokens);
        let mut used = self.estimate_chars(system.chars().count());

        let latest_index = conversation.iter().rposition(|u| u.role() == Role::User);

        let mut kept: Vec<&Utterance> = Vec::new();
        let mut considered = 0;
        for (index, utterance) in conversation.iter().enumerate().rev() {
            if Some(index) == latest_index {
                continue;
            }
            considered += 1;
            let cost = self.estimate(utterance);
            if used + cost > budget {
                break;
            }
            used += cost;
            kept.push(utterance);
        }
        let others = conversation.len() - usize::from(latest_index.is_some());
        let dropped = others - kept.len();

        let mut messages: Vec<Utterance> = kept.into_iter().rev().cloned().collect();

        let mut truncated_latest = false;
        if let Some(index) = latest_index {
            let latest = &conversation[index];
            if self.estimate(latest) > self.config.latest_message_max_tokens {
                truncated_latest = true;
                messages.push(self.truncate(latest));
            } else {
                messages.push(latest.clone());
            }
        }

        debug!(
            kept = messages.len(),
            dropped,
            considered,
            estimated_tokens = used,
            truncated_latest,
            "Context window built"
        );

        ContextWindow {
            system: system.to_string(),
            messages,
            dropped,
            truncated_latest,
        }
    }

    fn truncate(&self, utterance: &Utterance) -> Utterance {
        let max_chars = self.config.latest_message_max_chars;
        utterance.map_text(|text| {
            if text.chars().count() <= max_chars {
                return text.to_string();
            }
            let mut cut: String = text.chars().take(max_chars).collect();
            cut.push_str(TRUNCATION_MARKER);
            cut
        })
    }
}

impl Default for ContextLimiter {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aira_core::types::ContentPart;

    fn limiter(max_tokens: usize, reserve_tokens: usize) -> ContextLimiter {
        ContextLimiter::new(ContextConfig {
            max_tokens,
            reserve_tokens,
            ..ContextConfig::default()
        })
    }

    /// An utterance estimated at exactly `tokens` tokens.
    fn sized(role: Role, label: char, tokens: usize) -> Utterance {
        Utterance::new(role, vec![ContentPart::text(label.to_string().repeat(tokens * 4))])
    }

    #[test]
    fn test_estimate_is_chars_over_four() {
        let l = ContextLimiter::default();
        assert_eq!(l.estimate(&Utterance::user_text("abcdefgh")), 2);
        assert_eq!(l.estimate(&Utterance::user_text("abc")), 0);
        assert_eq!(l.estimate(&Utterance::user_text("phở bò")), 1);
    }

    #[test]
    fn test_images_do_not_count() {
        let l = ContextLimiter::default();
        let u = Utterance::new(
            Role::User,
            vec![
                ContentPart::text("abcd"),
                ContentPart::image("image/png", &vec![0u8; 100_000]),
            ],
        );
        assert_eq!(l.estimate(&u), 1);
    }

    #[test]
    fn test_estimate_counts_part_separators() {
        let l = ContextLimiter::default();
        let u = Utterance::new(
            Role::User,
            vec![ContentPart::text("abcd"), ContentPart::text("efg")],
        );
        assert_eq!(l.estimate(&u), 2);
        assert_eq!(l.estimate(&Utterance::user_text("abcdefg")), 1);
    }

    #[test]
    fn test_everything_fits() {
        let conversation = vec![
            Utterance::user_text("hi"),
            Utterance::assistant_text("hello"),
            Utterance::user_text("how are you"),
        ];
        let window = ContextLimiter::default().limit("system", &conversation);
        assert_eq!(window.system, "system");
        assert_eq!(window.messages, conversation);
        assert_eq!(window.dropped, 0);
        assert!(!window.truncated_latest);
    }

    #[test]
    fn test_keeps_most_recent_prefix_only() {
        // Budget 100 - reserve 10 = 90. System costs 20, leaving 70.
        let l = limiter(100, 10);
        let system = "s".repeat(80);
        let conversation = vec![
            sized(Role::User, 'a', 30),
            sized(Role::Assistant, 'b', 30),
            sized(Role::User, 'c', 30),
            sized(Role::Assistant, 'd', 30),
            sized(Role::User, 'e', 5),
        ];
        let window = l.limit(&system, &conversation);

        let labels: Vec<char> = window
            .messages
            .iter()
            .map(|u| u.text().chars().next().unwrap())
            .collect();
        assert_eq!(labels, vec!['c', 'd', 'e']);
        assert_eq!(window.dropped, 2);
    }

    #[test]
    fn test_stops_at_first_overflow() {
        // A small older utterance behind a large one is not picked up.
        let l = limiter(100, 0);
        let conversation = vec![
            sized(Role::User, 'a', 1),
            sized(Role::Assistant, 'b', 200),
            sized(Role::User, 'c', 1),
        ];
        let window = l.limit("", &conversation);
        assert_eq!(window.messages.len(), 1);
        assert_eq!(window.messages[0].text(), "cccc");
        assert_eq!(window.dropped, 2);
    }

    #[test]
    fn test_latest_kept_even_when_system_exceeds_budget() {
        let l = limiter(10, 5);
        let conversation = vec![sized(Role::Assistant, 'a', 1), sized(Role::User, 'b', 3)];
        let window = l.limit(&"s".repeat(400), &conversation);
        assert_eq!(window.messages.len(), 1);
        assert_eq!(window.messages[0].role(), Role::User);
    }

    #[test]
    fn test_oversized_latest_is_truncated() {
        let l = ContextLimiter::default();
        let long = "x".repeat(9000);
        let conversation = vec![Utterance::new(
            Role::User,
            vec![
                ContentPart::text(long),
                ContentPart::image("image/png", b"img"),
                ContentPart::text("short tail"),
            ],
        )];
        let window = l.limit("system", &conversation);
        assert!(window.truncated_latest);

        let latest = &window.messages[0];
        let first = latest.parts()[0].as_text().unwrap();
        assert_eq!(first.chars().count(), 8000 + TRUNCATION_MARKER.len());
        assert!(first.ends_with(TRUNCATION_MARKER));
        assert_eq!(latest.parts()[2].as_text(), Some("short tail"));
        assert!(matches!(latest.parts()[1], ContentPart::Image { .. }));
        // The conversation itself is untouched.
        assert_eq!(conversation[0].text_chars(), 9000 + 1 + "short tail".len());
    }

    #[test]
    fn test_latest_at_ceiling_is_not_truncated() {
        let l = ContextLimiter::default();
        let conversation = vec![sized(Role::User, 'a', 2000)];
        let window = l.limit("", &conversation);
        assert!(!window.truncated_latest);
        assert_eq!(window.messages[0].text_chars(), 8000);
    }

    #[test]
    fn test_latest_user_is_last_even_with_trailing_assistant() {
        let conversation = vec![
            Utterance::user_text("question"),
            Utterance::assistant_text("answer"),
        ];
        let window = ContextLimiter::default().limit("", &conversation);
        assert_eq!(window.messages[0].role(), Role::Assistant);
        assert_eq!(window.messages[1].text(), "question");
    }

    #[test]
    fn test_empty_conversation() {
        let window = ContextLimiter::default().limit("system", &[]);
        assert!(window.messages.is_empty());
        assert_eq!(window.dropped, 0);
    }
}

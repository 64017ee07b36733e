//! Personalised suggested questions.
//!
//! Suggestions are generated once per member per calendar hour and cached.
//! When the completion capability fails or returns nothing, a deterministic
//! list rotated by member and hour is used instead.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use serde_json::json;
use tracing::{debug, warn};

use aira_core::capability::{CompletionRequest, TextCompletion};
use aira_core::config::RetryConfig;
use aira_core::types::{Event, FamilyMember, Utterance};

use crate::retry::with_retry;

const SUGGESTION_TEMPERATURE: f32 = 0.8;
const SUGGESTION_MAX_TOKENS: u32 = 300;

const SUGGESTER_INSTRUCTION: &str = "You write personalised suggested questions for a family assistant.";

/// Static suggestions, grouped by topic.
const FALLBACK_TOPICS: &[&[&str]] = &[
    &[
        "Công thức nấu phở bò tại nhà?",
        "5 món ăn sáng nhanh cho cả nhà?",
        "Thực đơn bữa tối cuối tuần cho gia đình?",
    ],
    &[
        "Top 5 phim chiếu rạp tuần này?",
        "Phim hoạt hình hay cho trẻ em?",
        "Đánh giá phim mới ra mắt?",
    ],
    &[
        "Kết quả Champions League?",
        "Bảng xếp hạng Ngoại hạng Anh?",
        "Tin chuyển nhượng bóng đá mới nhất?",
    ],
    &[
        "5 tính năng AI mới trên smartphone?",
        "So sánh các mẫu điện thoại mới nhất?",
        "Laptop nào phù hợp cho học sinh?",
    ],
    &[
        "5 loại thực phẩm tăng cường miễn dịch?",
        "3 bài tập cardio hiệu quả tại nhà?",
        "Thực đơn 7 ngày giàu protein?",
    ],
    &[
        "10 hoạt động cuối tuần gắn kết gia đình?",
        "Bí quyết dạy trẻ quản lý tài chính?",
        "Lịch sinh hoạt khoa học cho trẻ?",
    ],
    &["Tin kinh tế hôm nay?", "Dự báo thời tiết tuần này?", "Tin giáo dục mới nhất?"],
];

type CacheKey = (String, String);

pub struct SuggestionService {
    completion: Arc<dyn TextCompletion>,
    retry: RetryConfig,
    cache: Mutex<HashMap<CacheKey, Vec<String>>>,
}

impl SuggestionService {
    pub fn new(completion: Arc<dyn TextCompletion>, retry: RetryConfig) -> Self {
        Self {
            completion,
            retry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Up to `max` suggestions for `member` (`None` is shared mode).
    pub async fn suggest(
        &self,
        member: Option<&FamilyMember>,
        upcoming: &[Event],
        recent_topics: &[String],
        max: usize,
    ) -> Vec<String> {
        self.suggest_at(member, upcoming, recent_topics, max, Local::now().naive_local())
            .await
    }

    /// Same as [`suggest`](Self::suggest) with an explicit clock.
    pub async fn suggest_at(
        &self,
        member: Option<&FamilyMember>,
        upcoming: &[Event],
        recent_topics: &[String],
        max: usize,
        now: NaiveDateTime,
    ) -> Vec<String> {
        let member_key = member.map(|m| m.id.clone()).unwrap_or_default();
        let hour_key = now.format("%Y-%m-%d_%H").to_string();
        let key = (member_key, hour_key);

        if let Some(cached) = self.cached(&key) {
            debug!(member = %key.0, "Suggested questions served from cache");
            return cached;
        }

        let generated = self
            .generate(member, upcoming, recent_topics, max, now)
            .await;
        let suggestions = if generated.is_empty() {
            fallback_suggestions(&key.0, &key.1, max)
        } else {
            generated
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, suggestions.clone());
        }
        suggestions
    }

    /// Drop every cached list, e.g. after the acting member changes data.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<String>> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    async fn generate(
        &self,
        member: Option<&FamilyMember>,
        upcoming: &[Event],
        recent_topics: &[String],
        max: usize,
        now: NaiveDateTime,
    ) -> Vec<String> {
        if max == 0 {
            return Vec::new();
        }
        let member_info = match member {
            Some(m) => json!({"name": m.name, "age": m.age, "preferences": m.preferences}),
            None => json!({}),
        };
        let context = json!({
            "member": member_info,
            "upcoming_events": upcoming,
            "recent_topics": recent_topics,
            "current_time": now.format("%H:%M").to_string(),
            "current_day": now.format("%A").to_string(),
            "current_date": now.format("%Y-%m-%d").to_string(),
        });
        let prompt = format!(
            "Write {max} varied, personalised suggestions for a user of a family assistant, \
             based on this context:\n\n{context}\n\n\
             Rules:\n\
             1. Each suggestion focuses on ONE specific interest.\n\
             2. Do not end a suggestion with phrases like \"did you know?\".\n\
             3. Be concrete and specific.\n\
             4. Return only the suggestions, one per line.\n\
             5. No numbering or bullet points.\n\n\
             Return exactly {max} suggestions."
        );
        let request = CompletionRequest::new(
            vec![Utterance::user_text(prompt)],
            SUGGESTION_TEMPERATURE,
            SUGGESTION_MAX_TOKENS,
        )
        .with_system(SUGGESTER_INSTRUCTION);

        let completion = &self.completion;
        match with_retry(&self.retry, "suggested_questions", move || {
            completion.complete(request.clone())
        })
        .await
        {
            Ok(raw) => parse_suggestions(&raw, max),
            Err(e) => {
                warn!(error = %e, "Suggested question generation failed, using fallback");
                Vec::new()
            }
        }
    }
}

/// One suggestion per non-empty line, list markers removed.
pub fn parse_suggestions(raw: &str, max: usize) -> Vec<String> {
    raw.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(max)
        .map(String::from)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix(['-', '*', '•'])
        .map(str::trim_start)
        .unwrap_or(line);
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line
}

/// Deterministic suggestions for `(member, hour)`: one per topic, topics
/// rotated by a hash of the key.
pub fn fallback_suggestions(member_key: &str, hour_key: &str, max: usize) -> Vec<String> {
    let mut hasher = DefaultHasher::new();
    hour_key.hash(&mut hasher);
    member_key.hash(&mut hasher);
    let seed = (hasher.finish() % 10_000) as usize;

    let topics = FALLBACK_TOPICS.len();
    (0..max.min(topics))
        .map(|i| {
            let topic = FALLBACK_TOPICS[(seed + i) % topics];
            topic[(seed / topics + i) % topic.len()].to_string()
        })
        .collect()
}

//! System instruction assembly.
//!
//! The instruction is rebuilt every turn from fresh store snapshots. Search
//! augmentation is folded in for that turn only and never enters the
//! conversation.

use chrono::NaiveDate;
use serde::Serialize;

use aira_core::config::AssistantConfig;
use aira_core::error::Result;
use aira_core::store::FamilyStore;
use aira_core::types::{Event, FamilyMember, Note};

use crate::dates::upcoming_events;
use crate::types::SearchAugmentation;

/// Days ahead listed as upcoming in the instruction.
const UPCOMING_DAYS: u64 = 7;

/// Members, events and notes as read at the start of a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub members: Vec<FamilyMember>,
    pub events: Vec<Event>,
    pub notes: Vec<Note>,
}

impl StoreSnapshot {
    pub fn load(store: &dyn FamilyStore) -> Result<Self> {
        Ok(Self {
            members: store.list_members()?,
            events: store.list_events()?,
            notes: store.list_notes()?,
        })
    }

    pub fn member(&self, id: &str) -> Option<&FamilyMember> {
        self.members.iter().find(|m| m.id == id)
    }
}

/// Web research attached to one turn.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub question: &'a str,
    pub augmentation: &'a SearchAugmentation,
}

#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    config: AssistantConfig,
}

impl SystemPromptBuilder {
    pub fn new(config: AssistantConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        data: &StoreSnapshot,
        acting_member: Option<&FamilyMember>,
        search: Option<SearchContext<'_>>,
        today: NaiveDate,
    ) -> String {
        let mut prompt = self.preamble(today);

        if let Some(member) = acting_member {
            prompt.push_str(&format!(
                "\n\nCURRENT USER:\n\
                 You are talking with: {}\n\
                 Age: {}\n\
                 Preferences: {}\n\n\
                 Adapt your tone and suggestions to this person. Events and notes you \
                 create are recorded as created by them.",
                member.name,
                member.age,
                to_json(&member.preferences),
            ));
        }

        let upcoming = upcoming_events(&data.events, today, UPCOMING_DAYS);
        let upcoming = if upcoming.is_empty() {
            "None".to_string()
        } else {
            upcoming
                .iter()
                .map(|e| format!("- {} {} {} (id {})", e.date, e.time, e.title, e.id))
                .collect::<Vec<_>>()
                .join("\n")
        };

        prompt.push_str(&format!(
            "\n\nFamily members:\n{}\n\nEvents:\n{}\n\nUpcoming in the next {} days:\n{}\n\n\
             Notes:\n{}\n\n\
             Understand and meet the user's needs naturally. Never show the special \
             commands in your reply text; use them only to perform the requested actions.",
            to_json(&data.members),
            to_json(&data.events),
            UPCOMING_DAYS,
            upcoming,
            to_json(&data.notes),
        ));

        if let Some(search) = search {
            prompt.push_str(&format!(
                "\n\nSEARCH RESULTS:\nQuestion: {}\n\nFindings:\n{}\n\n\
                 Use these findings to answer the question completely and accurately. \
                 Mention the sources.",
                search.question,
                search.augmentation.render(),
            ));
        }

        prompt
    }

    fn preamble(&self, today: NaiveDate) -> String {
        let name = &self.config.name;
        let default_time = &self.config.default_event_time;
        let language = &self.config.reply_language;
        format!(
            r#"You are {name}, a smart family assistant. You help manage information about family members, their preferences, events and notes, and you analyse family-related images. When the user asks, act immediately:

1. Add a family member (name, age, preferences)
2. Update a family member's preferences
3. Add, update or delete events
4. Add notes
5. Analyse images the user sends (dishes, family activities, ...)
6. Answer questions about news, weather, sports and current events using real-time search

IMPORTANT: to perform these actions you MUST use exactly this command syntax (the user never sees it):

- Add member: ##ADD_FAMILY_MEMBER:{{"name":"Name","age":"Age","preferences":{{"food":"Dish","hobby":"Hobby","color":"Colour"}}}}##
- Update preference: ##UPDATE_PREFERENCE:{{"id":"member_id","key":"preference_kind","value":"value"}}##
- Add event: ##ADD_EVENT:{{"title":"Title","date":"YYYY-MM-DD","time":"HH:MM","description":"Description","participants":["Name1","Name2"]}}##
- Update event: ##UPDATE_EVENT:{{"id":"event_id","title":"New title","date":"YYYY-MM-DD","time":"HH:MM","description":"New description","participants":["Name1","Name2"]}}##
- Delete event: ##DELETE_EVENT:event_id##
- Add note: ##ADD_NOTE:{{"title":"Title","content":"Content","tags":["tag1","tag2"]}}##

EVENT RULES:
1. When asked to add an event, do it IMMEDIATELY without asking for unnecessary details.
2. When the user says "tomorrow" or "next week", compute the date as YYYY-MM-DD.
3. Without a specific time, use {default_time}.
4. Use a short description taken from the request.
5. Only ask questions when truly necessary.
6. After adding, updating or deleting an event, briefly summarize what was done.

REAL-TIME INFORMATION:
1. For news, weather, sports, current events or new products, search results are gathered for you automatically.
2. Use them to answer accurately and completely, and mention the sources.
3. Without search results, answer from your own knowledge and note that it may be out of date.

Today is {today}.

The JSON inside commands MUST be exact: double quotes around keys and values, every brace and bracket closed.

For images:
- A dish: describe it and suggest how to cook it or its nutrition facts.
- A family activity: describe it and suggest how to remember the moment.
- Any image: link it to a family member or event where it fits.

STYLE:
1. Personalise answers for the current user.
2. Be friendly, concise and complete.
3. Use fitting emoji.
4. Suggest next steps or related ideas.
5. Reply in {language}."#,
            today = today.format("%d/%m/%Y"),
        )
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn member() -> FamilyMember {
        FamilyMember {
            id: "3".into(),
            name: "Minh".into(),
            age: "12".into(),
            preferences: json!({"food": "phở"}).as_object().cloned().unwrap(),
            added_on: "2024-05-01 10:00:00".into(),
        }
    }

    fn snapshot() -> StoreSnapshot {
        StoreSnapshot {
            members: vec![member()],
            events: vec![Event {
                id: "7".into(),
                title: "Họp gia đình".into(),
                date: "2024-05-11".into(),
                time: "19:00".into(),
                description: String::new(),
                participants: vec!["Minh".into()],
                created_by: "3".into(),
                created_on: String::new(),
            }],
            notes: vec![],
        }
    }

    #[test]
    fn test_prompt_contains_grammar_and_data() {
        let builder = SystemPromptBuilder::new(AssistantConfig::default());
        let prompt = builder.build(&snapshot(), None, None, today());

        assert!(prompt.starts_with("You are AIRA"));
        for marker in [
            "##ADD_FAMILY_MEMBER:",
            "##UPDATE_PREFERENCE:",
            "##ADD_EVENT:",
            "##UPDATE_EVENT:",
            "##DELETE_EVENT:",
            "##ADD_NOTE:",
        ] {
            assert!(prompt.contains(marker), "missing {}", marker);
        }
        assert!(prompt.contains(r#"{"title":"Title","date":"YYYY-MM-DD""#));
        assert!(prompt.contains("Today is 10/05/2024."));
        assert!(prompt.contains("use 19:00"));
        assert!(prompt.contains("Reply in Vietnamese."));
        assert!(prompt.contains("Họp gia đình"));
        assert!(!prompt.contains("CURRENT USER"));
        assert!(!prompt.contains("SEARCH RESULTS"));
    }

    #[test]
    fn test_acting_member_block() {
        let builder = SystemPromptBuilder::new(AssistantConfig::default());
        let m = member();
        let prompt = builder.build(&snapshot(), Some(&m), None, today());
        assert!(prompt.contains("You are talking with: Minh"));
        assert!(prompt.contains("\"food\": \"phở\""));
    }

    #[test]
    fn test_search_block_with_sources() {
        let builder = SystemPromptBuilder::new(AssistantConfig::default());
        let aug = SearchAugmentation {
            query: "thời tiết".into(),
            summary: "Trời nắng.".into(),
            sources: vec!["https://weather.example".into()],
        };
        let prompt = builder.build(
            &StoreSnapshot::default(),
            None,
            Some(SearchContext {
                question: "Mai có mưa không?",
                augmentation: &aug,
            }),
            today(),
        );
        assert!(prompt.contains("Question: Mai có mưa không?"));
        assert!(prompt.contains("Trời nắng."));
        assert!(prompt.contains("- https://weather.example"));
    }

    #[test]
    fn test_custom_assistant_settings() {
        let config = AssistantConfig {
            name: "Nova".into(),
            reply_language: "English".into(),
            default_event_time: "18:30".into(),
            ..AssistantConfig::default()
        };
        let prompt = SystemPromptBuilder::new(config).build(
            &StoreSnapshot::default(),
            None,
            None,
            today(),
        );
        assert!(prompt.starts_with("You are Nova"));
        assert!(prompt.contains("use 18:30"));
        assert!(prompt.contains("Reply in English."));
    }

    #[test]
    fn test_upcoming_events_listed() {
        let builder = SystemPromptBuilder::new(AssistantConfig::default());
        let prompt = builder.build(&snapshot(), None, None, today());
        assert!(prompt.contains("Upcoming in the next 7 days:\n- 2024-05-11 19:00 Họp gia đình (id 7)"));

        let later = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let prompt = builder.build(&snapshot(), None, None, later);
        assert!(prompt.contains("Upcoming in the next 7 days:\nNone"));
    }

    #[test]
    fn test_snapshot_member_lookup() {
        let data = snapshot();
        assert_eq!(data.member("3").map(|m| m.name.as_str()), Some("Minh"));
        assert!(data.member("4").is_none());
    }
}

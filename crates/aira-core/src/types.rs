//! Domain types shared across the AIRA crates.
//!
//! Conversation types (utterances and their content parts) and the family
//! store entities, plus the typed inserts and patches that directive
//! payloads are converted into at the storage boundary.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AiraError, Result};

/// Opaque identifier of a store entity.
pub type EntityId = String;

/// JSON object carried by a directive.
pub type Payload = Map<String, Value>;

// =============================================================================
// Conversation
// =============================================================================

/// Speaker of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One part of an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64-encoded image bytes.
    Image { media_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        ContentPart::Image {
            media_type: media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::Image { .. } => None,
        }
    }
}

/// A single message in a conversation.
///
/// Fields are private: once built, an utterance is never edited, only
/// replaced by a new value (the context limiter truncates copies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    role: Role,
    parts: Vec<ContentPart>,
}

impl Utterance {
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, parts }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// A user utterance carrying one image.
    pub fn user_image(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(Role::User, vec![ContentPart::image(media_type, bytes)])
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// Concatenated text parts, separated by a single space.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Character count of [`Utterance::text`], separators included. Image
    /// payloads do not count.
    pub fn text_chars(&self) -> usize {
        let (chars, parts): (usize, usize) = self
            .parts
            .iter()
            .filter_map(ContentPart::as_text)
            .fold((0, 0), |(chars, parts), t| (chars + t.chars().count(), parts + 1));
        chars + parts.saturating_sub(1)
    }

    pub fn has_text(&self) -> bool {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .any(|t| !t.trim().is_empty())
    }

    /// A copy with every text part passed through `f`.
    pub fn map_text(&self, f: impl Fn(&str) -> String) -> Self {
        let parts = self
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ContentPart::Text { text: f(text) },
                other => other.clone(),
            })
            .collect();
        Self::new(self.role, parts)
    }
}

/// Ordered sequence of utterances for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    utterances: Vec<Utterance>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn clear(&mut self) {
        self.utterances.clear();
    }

    pub fn last(&self) -> Option<&Utterance> {
        self.utterances.last()
    }
}

impl From<Vec<Utterance>> for Conversation {
    fn from(utterances: Vec<Utterance>) -> Self {
        Self { utterances }
    }
}

// =============================================================================
// Store entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: EntityId,
    pub name: String,
    pub age: String,
    pub preferences: Map<String, Value>,
    pub added_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EntityId,
    pub title: String,
    /// ISO `YYYY-MM-DD` once it has passed through the date resolver.
    pub date: String,
    pub time: String,
    pub description: String,
    pub participants: Vec<String>,
    /// Member id of the creator, empty when created in shared mode.
    pub created_by: String,
    pub created_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_by: String,
    pub created_on: String,
}

/// Persisted conversation plus its generated summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub id: EntityId,
    pub member_id: EntityId,
    pub timestamp: String,
    pub messages: Vec<Utterance>,
    pub summary: String,
}

// =============================================================================
// Inserts and patches
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub age: String,
    pub preferences: Map<String, Value>,
}

impl NewMember {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Ok(Self {
            name: required_str(payload, "name")?,
            age: field_str(payload, "age").unwrap_or_default(),
            preferences: payload
                .get("preferences")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberPatch {
    pub name: Option<String>,
    pub age: Option<String>,
    pub preferences: Option<Map<String, Value>>,
}

impl MemberPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.preferences.is_none()
    }
}

/// One preference key merged into a member's preference map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub member_id: EntityId,
    pub key: String,
    pub value: Value,
}

impl PreferenceUpdate {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Ok(Self {
            member_id: required_str(payload, "id")?,
            key: required_str(payload, "key")?,
            value: payload.get("value").cloned().unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    pub time: String,
    pub description: String,
    pub participants: Vec<String>,
    pub created_by: String,
}

impl NewEvent {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Ok(Self {
            title: required_str(payload, "title")?,
            date: field_str(payload, "date").unwrap_or_default(),
            time: field_str(payload, "time").unwrap_or_default(),
            description: field_str(payload, "description").unwrap_or_default(),
            participants: string_list(payload, "participants").unwrap_or_default(),
            created_by: field_str(payload, "created_by").unwrap_or_default(),
        })
    }
}

/// Partial update of an event; only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub description: Option<String>,
    pub participants: Option<Vec<String>>,
}

impl EventPatch {
    /// Split an `UPDATE_EVENT` payload into the target id and the patch.
    pub fn from_payload(payload: &Payload) -> Result<(EntityId, Self)> {
        let id = required_str(payload, "id")?;
        let patch = Self {
            title: field_str(payload, "title"),
            date: field_str(payload, "date"),
            time: field_str(payload, "time"),
            description: field_str(payload, "description"),
            participants: string_list(payload, "participants"),
        };
        Ok((id, patch))
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.description.is_none()
            && self.participants.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_by: String,
}

impl NewNote {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Ok(Self {
            title: required_str(payload, "title")?,
            content: field_str(payload, "content").unwrap_or_default(),
            tags: string_list(payload, "tags").unwrap_or_default(),
            created_by: field_str(payload, "created_by").unwrap_or_default(),
        })
    }
}

// =============================================================================
// Payload helpers
// =============================================================================

/// Read a field as a string. Numbers and booleans are stringified, so
/// `"age": 30` and `"id": 42` are accepted; `null` counts as absent.
pub fn field_str(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_str(payload: &Payload, key: &str) -> Result<String> {
    field_str(payload, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AiraError::InvalidResponse(format!("payload is missing '{}'", key)))
}

/// Read a list of strings. A bare string is split on commas.
fn string_list(payload: &Payload, key: &str) -> Option<Vec<String>> {
    match payload.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
        _ => None,
    }
}

//! Value types for the conversation pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use aira_core::types::{Conversation, EntityId, Payload};

// =============================================================================
// Actions
// =============================================================================

/// Directive kinds, declared in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AddMember,
    UpdatePreference,
    AddEvent,
    UpdateEvent,
    DeleteEvent,
    AddNote,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::AddMember,
        ActionKind::UpdatePreference,
        ActionKind::AddEvent,
        ActionKind::UpdateEvent,
        ActionKind::DeleteEvent,
        ActionKind::AddNote,
    ];

    /// The `KIND` word used in `##KIND:payload##`.
    pub fn marker(&self) -> &'static str {
        match self {
            ActionKind::AddMember => "ADD_FAMILY_MEMBER",
            ActionKind::UpdatePreference => "UPDATE_PREFERENCE",
            ActionKind::AddEvent => "ADD_EVENT",
            ActionKind::UpdateEvent => "UPDATE_EVENT",
            ActionKind::DeleteEvent => "DELETE_EVENT",
            ActionKind::AddNote => "ADD_NOTE",
        }
    }

    /// Creation-type actions get stamped with the acting member.
    pub fn is_creation(&self) -> bool {
        matches!(self, ActionKind::AddEvent | ActionKind::AddNote)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.marker() == s)
            .ok_or_else(|| format!("Unknown directive kind: {}", s))
    }
}

/// A structured intent to mutate the family store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActionRequest {
    AddMember(Payload),
    UpdatePreference(Payload),
    AddEvent(Payload),
    UpdateEvent(Payload),
    /// Carries the raw event identifier.
    DeleteEvent(String),
    AddNote(Payload),
}

impl ActionRequest {
    /// Build a JSON-bearing request. `DeleteEvent` takes its id from the
    /// payload's `id` field.
    pub fn with_payload(kind: ActionKind, payload: Payload) -> Self {
        match kind {
            ActionKind::AddMember => ActionRequest::AddMember(payload),
            ActionKind::UpdatePreference => ActionRequest::UpdatePreference(payload),
            ActionKind::AddEvent => ActionRequest::AddEvent(payload),
            ActionKind::UpdateEvent => ActionRequest::UpdateEvent(payload),
            ActionKind::DeleteEvent => ActionRequest::DeleteEvent(
                aira_core::types::field_str(&payload, "id").unwrap_or_default(),
            ),
            ActionKind::AddNote => ActionRequest::AddNote(payload),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::AddMember(_) => ActionKind::AddMember,
            ActionRequest::UpdatePreference(_) => ActionKind::UpdatePreference,
            ActionRequest::AddEvent(_) => ActionKind::AddEvent,
            ActionRequest::UpdateEvent(_) => ActionKind::UpdateEvent,
            ActionRequest::DeleteEvent(_) => ActionKind::DeleteEvent,
            ActionRequest::AddNote(_) => ActionKind::AddNote,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            ActionRequest::AddMember(p)
            | ActionRequest::UpdatePreference(p)
            | ActionRequest::AddEvent(p)
            | ActionRequest::UpdateEvent(p)
            | ActionRequest::AddNote(p) => Some(p),
            ActionRequest::DeleteEvent(_) => None,
        }
    }

    pub fn payload_mut(&mut self) -> Option<&mut Payload> {
        match self {
            ActionRequest::AddMember(p)
            | ActionRequest::UpdatePreference(p)
            | ActionRequest::AddEvent(p)
            | ActionRequest::UpdateEvent(p)
            | ActionRequest::AddNote(p) => Some(p),
            ActionRequest::DeleteEvent(_) => None,
        }
    }
}

/// At most one request per kind, iterated in [`ActionKind::ALL`] order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSet {
    requests: BTreeMap<ActionKind, ActionRequest>,
}

impl ActionSet {
    /// Insert a request, returning the one it replaced.
    pub fn insert(&mut self, request: ActionRequest) -> Option<ActionRequest> {
        self.requests.insert(request.kind(), request)
    }

    pub fn get(&self, kind: ActionKind) -> Option<&ActionRequest> {
        self.requests.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionRequest> {
        self.requests.values()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl IntoIterator for ActionSet {
    type Item = ActionRequest;
    type IntoIter = std::collections::btree_map::IntoValues<ActionKind, ActionRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.into_values()
    }
}

/// Result of applying one action against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    /// Applied; carries the created or affected entity id.
    Applied { id: EntityId },
    /// The target entity does not exist.
    NotFound { id: EntityId },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    /// Human-readable label (event title, member name, ...).
    pub label: String,
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, ActionStatus::Applied { .. })
    }
}

// =============================================================================
// Session and turn
// =============================================================================

/// Per-session state owned by the calling layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub id: Uuid,
    pub conversation: Conversation,
    /// Member this session speaks for; `None` is shared mode.
    pub acting_member_id: Option<EntityId>,
}

impl SessionContext {
    pub fn new(acting_member_id: Option<EntityId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: Conversation::new(),
            acting_member_id,
        }
    }

    pub fn shared() -> Self {
        Self::new(None)
    }

    pub fn for_member(member_id: impl Into<EntityId>) -> Self {
        Self::new(Some(member_id.into()))
    }
}

/// Web research folded into one turn's system instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchAugmentation {
    pub query: String,
    pub summary: String,
    pub sources: Vec<String>,
}

impl SearchAugmentation {
    /// Summary text followed by source attribution.
    pub fn render(&self) -> String {
        if self.sources.is_empty() {
            return self.summary.clone();
        }
        let sources = self
            .sources
            .iter()
            .map(|url| format!("- {}", url))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n\n**Sources:**\n{}", self.summary, sources)
    }
}

/// Everything a caller needs to render one completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The raw reply, directives included, as stored in the conversation.
    pub reply: String,
    /// The reply as shown to the user.
    pub display_text: String,
    pub actions: Vec<ActionOutcome>,
    pub search: Option<SearchAugmentation>,
    /// `false` when every streaming attempt failed and `reply` is an apology.
    pub completed: bool,
    pub history_saved: bool,
}

/// Progress notifications emitted while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    SearchStarted { query: String },
    SearchFinished { found: bool },
    Fragment(String),
    /// Fragments shown since the last attempt started must be discarded.
    AttemptFailed { attempt: u32, error: String },
    ActionApplied(ActionOutcome),
    ActionFailed(ActionOutcome),
    HistorySaved,
}

//! Conversation orchestrator: central coordinator for one user turn.
//!
//! A turn runs search check, optional web research, prompt assembly,
//! context limiting, streaming with retry, action application and history
//! persistence, in that order. Capability failures degrade the turn; they
//! never escape it.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use aira_core::capability::{CompletionRequest, TextCompletion, WebSearch};
use aira_core::config::{AiraConfig, AssistantConfig, HistoryConfig, RetryConfig, SearchConfig};
use aira_core::error::AiraError;
use aira_core::store::FamilyStore;
use aira_core::types::{ContentPart, Role, Utterance};

use crate::applier::ActionApplier;
use crate::context::ContextLimiter;
use crate::dates::upcoming_events;
use crate::error::ChatError;
use crate::parser::{extract_actions, strip_directives};
use crate::prompt::{SearchContext, StoreSnapshot, SystemPromptBuilder};
use crate::research::WebResearcher;
use crate::retry::backoff;
use crate::search_intent::SearchIntentClassifier;
use crate::suggest::SuggestionService;
use crate::summary::ChatSummarizer;
use crate::types::{ActionStatus, SearchAugmentation, SessionContext, TurnEvent, TurnOutcome};

/// Maximum accepted utterance length in characters. Longer text is
/// rejected outright; text under this but over the context ceiling is
/// truncated instead.
const MAX_UTTERANCE_CHARS: usize = 100_000;

/// Follow-up text submitted after an image-only utterance.
pub const IMAGE_FOLLOW_UP: &str = "Please analyse this image.";

/// Prefix of the reply delivered when every streaming attempt failed.
pub const APOLOGY_PREFIX: &str = "Sorry, I'm having trouble connecting:";

/// Window, in days, of events offered to the question suggester.
const SUGGESTION_EVENT_DAYS: u64 = 14;

/// Web search plus the classifier deciding when to use it.
struct SearchPipeline {
    classifier: SearchIntentClassifier,
    researcher: WebResearcher,
}

pub struct ConversationOrchestrator {
    completion: Arc<dyn TextCompletion>,
    store: Arc<dyn FamilyStore>,
    search: Option<SearchPipeline>,
    limiter: ContextLimiter,
    prompt: SystemPromptBuilder,
    applier: ActionApplier,
    summarizer: ChatSummarizer,
    suggestions: SuggestionService,
    assistant: AssistantConfig,
    history: HistoryConfig,
    retry: RetryConfig,
    search_config: SearchConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        config: &AiraConfig,
        completion: Arc<dyn TextCompletion>,
        store: Arc<dyn FamilyStore>,
    ) -> Self {
        Self {
            limiter: ContextLimiter::new(config.context.clone()),
            prompt: SystemPromptBuilder::new(config.assistant.clone()),
            applier: ActionApplier::new(store.clone(), config.assistant.default_event_time.clone()),
            summarizer: ChatSummarizer::new(completion.clone(), config.retry.clone()),
            suggestions: SuggestionService::new(completion.clone(), config.retry.clone()),
            assistant: config.assistant.clone(),
            history: config.history.clone(),
            retry: config.retry.clone(),
            search_config: config.search.clone(),
            search: None,
            completion,
            store,
        }
    }

    /// Attach a search capability. Ignored when search is disabled in the
    /// configuration.
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        if !self.search_config.enabled {
            info!("Web search disabled by configuration");
            return self;
        }
        self.search = Some(SearchPipeline {
            classifier: SearchIntentClassifier::new(self.completion.clone(), self.retry.clone()),
            researcher: WebResearcher::new(
                search,
                self.completion.clone(),
                self.search_config.clone(),
                self.retry.clone(),
            ),
        });
        self
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_some()
    }

    /// Handle one user turn.
    ///
    /// Only invalid input is an error. Every capability failure is absorbed
    /// into the returned outcome: a skipped search, an apology reply, a
    /// failed action or an unsaved history.
    pub async fn submit_user_turn(
        &self,
        session: &mut SessionContext,
        utterance: Utterance,
        events: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<TurnOutcome, ChatError> {
        let question = validate(&utterance)?;
        let today = today();
        let acting_member_id = session.acting_member_id.clone();

        debug!(session = %session.id, chars = question.chars().count(), "Turn received");
        let image_only = question.is_empty();
        session.conversation.push(utterance);
        if image_only {
            session.conversation.push(Utterance::user_text(IMAGE_FOLLOW_UP));
        }

        let search = match &self.search {
            Some(pipeline) if !image_only => self.research(pipeline, &question, events).await,
            _ => None,
        };

        let data = StoreSnapshot::load(self.store.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read family data for the system prompt");
            StoreSnapshot::default()
        });
        let acting_member = acting_member_id.as_deref().and_then(|id| data.member(id));
        if acting_member_id.is_some() && acting_member.is_none() {
            warn!(member_id = ?acting_member_id, "Acting member not found in the store");
        }
        let search_context = search.as_ref().map(|augmentation| SearchContext {
            question: &question,
            augmentation,
        });
        let system = self.prompt.build(&data, acting_member, search_context, today);

        let window = self.limiter.limit(&system, session.conversation.utterances());
        let request = CompletionRequest::new(
            window.messages,
            self.assistant.temperature,
            self.assistant.max_tokens,
        )
        .with_system(window.system);

        let (reply, completed) = self.stream_reply(request, events).await;

        let actions = if completed {
            let outcomes = self.applier.apply(
                extract_actions(&reply),
                acting_member_id.as_deref(),
                today,
            );
            for outcome in &outcomes {
                let event = match outcome.status {
                    ActionStatus::Applied { .. } => TurnEvent::ActionApplied(outcome.clone()),
                    _ => TurnEvent::ActionFailed(outcome.clone()),
                };
                emit(events, event);
            }
            outcomes
        } else {
            Vec::new()
        };

        let display_text = if self.assistant.strip_directives {
            strip_directives(&reply)
        } else {
            reply.clone()
        };
        session
            .conversation
            .push(Utterance::assistant_text(reply.clone()));

        let history_saved = match acting_member_id.as_deref() {
            Some(member_id) => self.persist(session, member_id).await,
            None => false,
        };
        if history_saved {
            emit(events, TurnEvent::HistorySaved);
        }

        info!(
            session = %session.id,
            completed,
            actions = actions.len(),
            searched = search.is_some(),
            history_saved,
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply,
            display_text,
            actions,
            search,
            completed,
            history_saved,
        })
    }

    /// Persist the acting member's conversation, then clear it. Returns
    /// whether a snapshot was saved.
    pub async fn reset_session(&self, session: &mut SessionContext) -> bool {
        let saved = match session.acting_member_id.clone() {
            Some(member_id) if !session.conversation.is_empty() => {
                self.persist(session, &member_id).await
            }
            _ => false,
        };
        session.conversation.clear();
        info!(session = %session.id, saved, "Session reset");
        saved
    }

    /// Suggested questions for the session's acting member, or for shared
    /// mode when there is none.
    pub async fn suggested_questions(
        &self,
        acting_member_id: Option<&str>,
        max: usize,
    ) -> Vec<String> {
        let member = acting_member_id.and_then(|id| {
            self.store.get_member(id).unwrap_or_else(|e| {
                warn!(error = %e, member_id = id, "Failed to load member for suggestions");
                None
            })
        });
        let events = self.store.list_events().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load events for suggestions");
            Vec::new()
        });
        let upcoming = upcoming_events(&events, today(), SUGGESTION_EVENT_DAYS);
        let recent_topics: Vec<String> = match acting_member_id {
            Some(id) => self
                .store
                .chat_history(id, self.history.suggestion_topics)
                .unwrap_or_else(|e| {
                    warn!(error = %e, member_id = id, "Failed to load chat history for suggestions");
                    Vec::new()
                })
                .into_iter()
                .map(|snapshot| snapshot.summary)
                .filter(|summary| !summary.is_empty())
                .collect(),
            None => Vec::new(),
        };
        self.suggestions
            .suggest(member.as_ref(), &upcoming, &recent_topics, max)
            .await
    }

    async fn research(
        &self,
        pipeline: &SearchPipeline,
        question: &str,
        events: Option<&UnboundedSender<TurnEvent>>,
    ) -> Option<SearchAugmentation> {
        let intent = pipeline.classifier.classify(question).await;
        if !intent.need_search {
            return None;
        }
        info!(query = %intent.query, "Searching the web");
        emit(
            events,
            TurnEvent::SearchStarted {
                query: intent.query.clone(),
            },
        );
        let augmentation = pipeline.researcher.research(&intent.query).await;
        emit(
            events,
            TurnEvent::SearchFinished {
                found: augmentation.is_some(),
            },
        );
        augmentation
    }

    /// Stream a reply, retrying failed attempts. Fragments of a failed
    /// attempt are discarded. Returns the reply and whether it completed;
    /// an incomplete reply is the apology text.
    async fn stream_reply(
        &self,
        request: CompletionRequest,
        events: Option<&UnboundedSender<TurnEvent>>,
    ) -> (String, bool) {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<AiraError> = None;

        for attempt in 0..attempts {
            match self.stream_attempt(request.clone(), events).await {
                Ok(reply) => {
                    if attempt > 0 {
                        info!(attempt = attempt + 1, "Streaming completion recovered");
                    }
                    return (reply, true);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "Streaming completion failed");
                    emit(
                        events,
                        TurnEvent::AttemptFailed {
                            attempt: attempt + 1,
                            error: e.to_string(),
                        },
                    );
                    if attempt + 1 < attempts {
                        backoff(&self.retry, attempt, &e).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.map(|e| e.to_string()).unwrap_or_default();
        let apology = format!("{} {}", APOLOGY_PREFIX, error);
        emit(events, TurnEvent::Fragment(apology.clone()));
        (apology, false)
    }

    async fn stream_attempt(
        &self,
        request: CompletionRequest,
        events: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<String, AiraError> {
        let mut stream = self.completion.stream(request).await?;
        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            emit(events, TurnEvent::Fragment(fragment.clone()));
            reply.push_str(&fragment);
        }
        Ok(reply)
    }

    /// Summarize and save the conversation for `member_id`. A failed
    /// summary is saved as empty; a failed save is logged.
    async fn persist(&self, session: &SessionContext, member_id: &str) -> bool {
        let utterances = session.conversation.utterances();
        let summary = self
            .summarizer
            .summarize(utterances)
            .await
            .unwrap_or_default();
        match self.store.save_chat_snapshot(
            member_id,
            utterances,
            &summary,
            self.history.retention,
        ) {
            Ok(id) => {
                debug!(member_id, snapshot = %id, "Chat history saved");
                true
            }
            Err(e) => {
                warn!(error = %e, member_id, "Failed to save chat history");
                false
            }
        }
    }
}

/// Check the utterance and return its text (empty for image-only input).
fn validate(utterance: &Utterance) -> Result<String, ChatError> {
    let has_image = utterance
        .parts()
        .iter()
        .any(|p| matches!(p, ContentPart::Image { .. }));
    if utterance.role() != Role::User || (!utterance.has_text() && !has_image) {
        return Err(ChatError::EmptyUtterance);
    }
    if utterance.text_chars() > MAX_UTTERANCE_CHARS {
        return Err(ChatError::UtteranceTooLong(MAX_UTTERANCE_CHARS));
    }
    Ok(utterance.text().trim().to_string())
}

fn emit(events: Option<&UnboundedSender<TurnEvent>>, event: TurnEvent) {
    if let Some(tx) = events {
        // The receiver may have gone away; the turn continues regardless.
        let _ = tx.send(event);
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// =============================================================================
// Tests
// =============================================================================

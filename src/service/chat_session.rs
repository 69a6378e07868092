use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{error, info};

use crate::api::{ApiClient, RagApi};
use crate::config::Settings;
use crate::errors::AppError;
use crate::events::{EventBus, ReplaceOrigin, SessionEvent};
use crate::models::{Conversation, ConversationId, LogMessage, RagDocument, Reference};
use crate::state::{ConversationGroups, ReferencePanel, SessionState};

/// The console's session context: one backend connection, one active
/// conversation, and the event stream a view renders from.
///
/// Cheap to clone; clones share the same state. Operations are split over
/// `conversations`, `streaming` and `poller`.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<Shared>,
}

struct Shared {
    api: RagApi,
    state: Mutex<SessionState>,
    events: EventBus,
    settings: Settings,
}

impl ChatSession {
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let events = EventBus::new();
        let client = ApiClient::new(&settings, events.clone())?;
        Ok(Self {
            shared: Arc::new(Shared {
                api: RagApi::new(client),
                state: Mutex::new(SessionState::new(settings.display_cap)),
                events,
                settings,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn api(&self) -> &RagApi {
        &self.shared.api
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    // ── Read access for views ─────────────────────────────────────────────────

    pub async fn active_conversation_id(&self) -> Option<ConversationId> {
        self.state().await.active_conversation_id
    }

    pub async fn messages(&self) -> Vec<LogMessage> {
        self.state().await.log.messages().to_vec()
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state().await.conversations.items().to_vec()
    }

    pub async fn conversation_groups(&self, now: DateTime<Local>) -> ConversationGroups {
        self.state().await.conversations.groups(now)
    }

    pub async fn is_sending(&self) -> bool {
        self.state().await.is_sending
    }

    pub async fn last_known_message_count(&self) -> usize {
        self.state().await.last_known_message_count
    }

    pub async fn documents(&self) -> Vec<(RagDocument, bool)> {
        let state = self.state().await;
        state
            .documents
            .documents()
            .iter()
            .map(|d| (d.clone(), state.documents.is_selected(d.id)))
            .collect()
    }

    // ── View feedback ─────────────────────────────────────────────────────────

    /// The view reports whether its transcript is scrolled to the bottom.
    pub async fn set_viewport_at_bottom(&self, at_bottom: bool) {
        self.state().await.viewport_at_bottom = at_bottom;
    }

    pub async fn viewport_at_bottom(&self) -> bool {
        self.state().await.viewport_at_bottom
    }

    // ── Reference viewer ──────────────────────────────────────────────────────

    /// Shows `references` in the evidence panel, e.g. when the user picks an
    /// older answer's reference link.
    pub async fn show_references(&self, references: Vec<Reference>) -> ReferencePanel {
        let panel = self.state().await.references.show(references.clone());
        self.emit(SessionEvent::ReferencesShown(references));
        panel
    }

    pub async fn open_reference(&self, index: usize) -> Option<Reference> {
        self.state().await.references.open(index).cloned()
    }

    pub async fn shown_references(&self) -> (ReferencePanel, Vec<Reference>) {
        let state = self.state().await;
        (state.references.panel(), state.references.last_shown().to_vec())
    }

    // ── Reference documents ───────────────────────────────────────────────────

    pub async fn load_documents(&self) -> Result<Vec<RagDocument>, AppError> {
        let documents = match self.api().list_documents().await {
            Ok(documents) => documents,
            Err(e) => return Err(self.surface("Could not load reference documents", e).await),
        };
        self.state().await.documents.replace(documents.clone());
        self.emit(SessionEvent::DocumentsUpdated(documents.clone()));
        Ok(documents)
    }

    pub async fn set_document_selected(&self, id: i64, selected: bool) -> bool {
        self.state().await.documents.set_selected(id, selected)
    }

    pub async fn select_all_documents(&self, selected: bool) {
        self.state().await.documents.select_all(selected);
    }

    // ── Crate internals ───────────────────────────────────────────────────────

    pub(crate) async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.shared.state.lock().await
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.shared.events.emit(event);
    }

    /// Reports a failed foreground action to the user and hands the error
    /// back. An expired session tears the session state down instead.
    pub(crate) async fn surface(&self, context: &str, err: AppError) -> AppError {
        if err.is_auth() {
            self.end_session().await;
        } else {
            error!("{context}: {err}");
            self.emit(SessionEvent::Notice(format!("{context}: {err}")));
        }
        err
    }

    /// Drops everything tied to the backend session after a 401.
    pub(crate) async fn end_session(&self) {
        let mut state = self.state().await;
        state.reset_to(None);
        state.conversations.replace(Vec::new());
        state.references.show(Vec::new());
        drop(state);
        info!("Session ended; conversation state cleared");
        self.emit(SessionEvent::ActiveConversationChanged(None));
        self.emit(SessionEvent::LogReplaced {
            origin: ReplaceOrigin::Reset,
            messages: Vec::new(),
            hidden: 0,
            scroll_to_bottom: true,
        });
        self.emit(SessionEvent::ConversationsUpdated(Vec::new()));
    }
}

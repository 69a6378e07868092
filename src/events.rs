//! State-change notifications for the presentation layer.
//!
//! The core never renders anything. Every mutation of the session state is
//! announced on a broadcast channel; a view subscribes with
//! [`crate::service::chat_session::ChatSession::subscribe`] and redraws from
//! the payloads.

use tokio::sync::broadcast;

use crate::models::{Conversation, ConversationId, LogMessage, MessageId, RagDocument, Reference};

const EVENT_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOrigin {
    /// Explicit load of a conversation.
    Load,
    /// Background reconciliation found new server messages.
    Poll,
    /// Active conversation cleared or freshly created.
    Reset,
}

/// Phase of the send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    AwaitingConversation,
    Streaming,
    Error,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConversationsUpdated(Vec<Conversation>),
    ActiveConversationChanged(Option<ConversationId>),
    MessageAppended(LogMessage),
    /// Streaming tail grew; `content` is the full text so far.
    MessageUpdated { id: MessageId, content: String },
    MessageFinalized(LogMessage),
    LogReplaced {
        origin: ReplaceOrigin,
        messages: Vec<LogMessage>,
        hidden: usize,
        scroll_to_bottom: bool,
    },
    ReferencesShown(Vec<Reference>),
    DocumentsUpdated(Vec<RagDocument>),
    SendPhaseChanged(SendPhase),
    /// User-visible failure of a foreground action.
    Notice(String),
    SessionExpired,
}

/// Cloneable sender half shared by the transport client and the session.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publishes an event; having no subscriber is not an error.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

use crate::models::ConversationId;
use crate::state::{ConversationStore, DocumentSelection, MessageLog, ReferenceViewer};

/// Everything the console knows about the current admin session.
///
/// Held behind one async mutex by
/// [`ChatSession`](crate::service::chat_session::ChatSession). The guard
/// flags are read and written inside a single critical section, so a
/// check-then-set on them cannot interleave with another task.
#[derive(Debug)]
pub struct SessionState {
    pub active_conversation_id: Option<ConversationId>,
    pub is_sending: bool,
    pub is_loading_conversation: bool,
    pub is_polling: bool,
    /// Server-side message count at the last load or reconciliation.
    pub last_known_message_count: usize,
    /// Reported by the view; lets reconciliation keep the transcript pinned.
    pub viewport_at_bottom: bool,
    pub conversations: ConversationStore,
    pub log: MessageLog,
    pub references: ReferenceViewer,
    pub documents: DocumentSelection,
}

impl SessionState {
    pub fn new(display_cap: usize) -> Self {
        Self {
            active_conversation_id: None,
            is_sending: false,
            is_loading_conversation: false,
            is_polling: false,
            last_known_message_count: 0,
            viewport_at_bottom: true,
            conversations: ConversationStore::new(),
            log: MessageLog::new(display_cap),
            references: ReferenceViewer::new(),
            documents: DocumentSelection::new(),
        }
    }

    pub fn is_active(&self, id: ConversationId) -> bool {
        self.active_conversation_id == Some(id)
    }

    /// Switches to `id` (or to no conversation) with an empty transcript.
    pub fn reset_to(&mut self, id: Option<ConversationId>) {
        self.active_conversation_id = id;
        self.log.clear();
        self.last_known_message_count = 0;
    }
}

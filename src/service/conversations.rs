use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::events::{ReplaceOrigin, SessionEvent};
use crate::models::{Conversation, ConversationId};
use crate::service::chat_session::ChatSession;

impl ChatSession {
    /// Replaces the local conversation list with the backend's.
    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>, AppError> {
        let items = match self.api().list_conversations().await {
            Ok(items) => items,
            Err(e) => {
                if e.is_auth() {
                    self.end_session().await;
                }
                return Err(e);
            }
        };
        debug!("Loaded {} conversations", items.len());
        self.state().await.conversations.replace(items.clone());
        self.emit(SessionEvent::ConversationsUpdated(items.clone()));
        Ok(items)
    }

    /// Opens a conversation and loads its history.
    ///
    /// Returns `Ok(false)` without touching anything when `id` is already
    /// open or another load is still in flight.
    pub async fn select_conversation(&self, id: ConversationId) -> Result<bool, AppError> {
        let previous = {
            let mut state = self.state().await;
            if state.is_loading_conversation {
                debug!("Ignoring select of {id}: a conversation is already loading");
                return Ok(false);
            }
            if state.is_active(id) {
                debug!("Ignoring select of {id}: already open");
                return Ok(false);
            }
            state.is_loading_conversation = true;
            let previous = state.active_conversation_id;
            state.active_conversation_id = Some(id);
            previous
        };
        self.emit(SessionEvent::ActiveConversationChanged(Some(id)));

        let result = self.api().get_conversation(id).await;

        let mut state = self.state().await;
        state.is_loading_conversation = false;
        match result {
            Ok(detail) => {
                if !state.is_active(id) {
                    debug!("Conversation {id} was closed while loading");
                    return Ok(false);
                }
                let count = detail.messages.len();
                state.log.replace_all(detail.messages);
                state.last_known_message_count = count;
                state.viewport_at_bottom = true;
                info!("Opened conversation {id} ({count} messages)");
                self.emit(SessionEvent::LogReplaced {
                    origin: ReplaceOrigin::Load,
                    messages: state.log.messages().to_vec(),
                    hidden: state.log.hidden_count(),
                    scroll_to_bottom: true,
                });
                Ok(true)
            }
            Err(e) => {
                if state.is_active(id) {
                    state.active_conversation_id = previous;
                }
                let restored = state.active_conversation_id;
                drop(state);
                self.emit(SessionEvent::ActiveConversationChanged(restored));
                Err(self.surface("Could not load the conversation", e).await)
            }
        }
    }

    /// Creates an empty conversation on the backend and opens it.
    pub async fn new_conversation(&self) -> Result<ConversationId, AppError> {
        let title = &self.settings().conversation_title;
        let conversation = match self.api().create_conversation(title).await {
            Ok(conversation) => conversation,
            Err(e) => return Err(self.surface("Could not create a conversation", e).await),
        };
        self.open_fresh(conversation.id).await;
        self.refresh_listing().await?;
        Ok(conversation.id)
    }

    /// Leaves the current conversation without deleting it.
    pub async fn close_conversation(&self) {
        let mut state = self.state().await;
        if state.active_conversation_id.is_none() {
            return;
        }
        state.reset_to(None);
        drop(state);
        self.emit(SessionEvent::ActiveConversationChanged(None));
        self.emit_reset();
    }

    pub async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::empty_field("title"));
        }
        let unchanged = self.state().await.conversations.get(id).is_some_and(|c| c.title == title);
        if unchanged {
            return Ok(());
        }
        if let Err(e) = self.api().rename_conversation(id, title).await {
            return Err(self.surface("Could not rename the conversation", e).await);
        }
        self.refresh_listing().await
    }

    /// Flips the saved flag; returns the new value.
    pub async fn toggle_saved(&self, id: ConversationId) -> Result<bool, AppError> {
        let saved = match self.api().toggle_saved(id).await {
            Ok(saved) => saved,
            Err(e) => return Err(self.surface("Could not change the saved flag", e).await),
        };
        self.refresh_listing().await?;
        Ok(saved)
    }

    pub async fn delete_conversation(&self, id: ConversationId) -> Result<(), AppError> {
        if let Err(e) = self.api().delete_conversation(id).await {
            return Err(self.surface("Could not delete the conversation", e).await);
        }
        let was_active = {
            let mut state = self.state().await;
            let was_active = state.is_active(id);
            if was_active {
                state.reset_to(None);
            }
            was_active
        };
        if was_active {
            self.emit(SessionEvent::ActiveConversationChanged(None));
            self.emit_reset();
        }
        self.refresh_listing().await
    }

    /// Makes `id` the active conversation with an empty transcript.
    pub(crate) async fn open_fresh(&self, id: ConversationId) {
        self.state().await.reset_to(Some(id));
        self.emit(SessionEvent::ActiveConversationChanged(Some(id)));
        self.emit_reset();
    }

    /// List reload after a successful mutation; only an expired session is
    /// worth failing the mutation for.
    async fn refresh_listing(&self) -> Result<(), AppError> {
        match self.refresh_conversations().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!("Conversation list refresh failed: {e}");
                Ok(())
            }
        }
    }

    fn emit_reset(&self) {
        self.emit(SessionEvent::LogReplaced {
            origin: ReplaceOrigin::Reset,
            messages: Vec::new(),
            hidden: 0,
            scroll_to_bottom: true,
        });
    }
}

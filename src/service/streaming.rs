//! One send cycle: user message, answer stream, finalization.

use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::events::{SendPhase, SessionEvent};
use crate::models::{ChatStreamRequest, ConversationId, MessageId};
use crate::service::chat_session::ChatSession;
use crate::stream::{ChatFrame, FrameDecoder, FrameError};

/// How a send cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// `done` frame received; the answer carries this many references.
    Completed { references: usize },
    /// Body ended without `done`; the accumulated text was kept.
    Partial,
    /// The stream broke; the answer slot holds the failure notice.
    Failed { reason: String },
    /// The user moved to another conversation before the stream settled.
    Detached,
}

/// Where the frames of one stream land.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamTarget {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

impl ChatSession {
    /// Sends a question in the active conversation, creating one first if
    /// none is open, and streams the answer into the message log.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, AppError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(AppError::empty_field("message"));
        }

        let active = {
            let mut state = self.state().await;
            if state.is_sending {
                return Err(AppError::SendInProgress);
            }
            // The load is about to replace the log; anything appended now
            // would land in the previous conversation and be wiped.
            if state.is_loading_conversation {
                return Err(AppError::LoadInProgress);
            }
            state.is_sending = true;
            state.active_conversation_id
        };

        let result = self.run_send_cycle(message, active).await;

        self.state().await.is_sending = false;
        self.emit(SessionEvent::SendPhaseChanged(SendPhase::Idle));
        result
    }

    async fn run_send_cycle(
        &self,
        message: &str,
        active: Option<ConversationId>,
    ) -> Result<SendOutcome, AppError> {
        let conversation_id = match active {
            Some(id) => id,
            None => {
                self.emit(SessionEvent::SendPhaseChanged(SendPhase::AwaitingConversation));
                match self.api().create_conversation(&self.settings().conversation_title).await {
                    Ok(conversation) => {
                        self.open_fresh(conversation.id).await;
                        conversation.id
                    }
                    Err(e) => {
                        self.emit(SessionEvent::SendPhaseChanged(SendPhase::Error));
                        return Err(self.surface("Could not create a conversation", e).await);
                    }
                }
            }
        };

        let (target, document_ids) = {
            let mut state = self.state().await;
            if !state.is_active(conversation_id) {
                return Ok(SendOutcome::Detached);
            }
            let user_id = state.log.append_user(message);
            let placeholder_id = state.log.append_assistant_placeholder();
            for id in [user_id, placeholder_id] {
                if let Some(appended) = state.log.get(id) {
                    self.emit(SessionEvent::MessageAppended(appended.clone()));
                }
            }
            let target = StreamTarget { conversation_id, message_id: placeholder_id };
            (target, state.documents.selected_ids())
        };
        self.emit(SessionEvent::SendPhaseChanged(SendPhase::Streaming));

        let request = ChatStreamRequest { conversation_id, message, document_ids };
        let outcome = match self.api().open_chat_stream(&request).await {
            Ok(response) => self.consume_stream(target, response.bytes_stream()).await,
            Err(e) if e.is_auth() => {
                self.end_session().await;
                return Err(e);
            }
            Err(e) => self.fail_stream(target, &e.to_string()).await,
        };
        info!("Send cycle in conversation {conversation_id} ended: {outcome:?}");

        match self.refresh_conversations().await {
            Ok(_) => Ok(outcome),
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!("Conversation list refresh after send failed: {e}");
                Ok(outcome)
            }
        }
    }

    /// Feeds a raw answer body through the frame decoder into the log.
    ///
    /// Each read is bounded by the configured stream read timeout; a stall
    /// counts as a stream failure.
    pub(crate) async fn consume_stream<S, E>(&self, target: StreamTarget, stream: S) -> SendOutcome
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let read_timeout = self.settings().stream_read_timeout;
        let mut decoder = FrameDecoder::new();
        let mut references: Option<usize> = None;
        let mut stream = std::pin::pin!(stream);

        loop {
            let failure = match tokio::time::timeout(read_timeout, stream.next()).await {
                Ok(None) => break,
                Ok(Some(Ok(bytes))) => {
                    for decoded in decoder.push(&bytes) {
                        self.apply_frame(target, decoded, &mut references).await;
                    }
                    continue;
                }
                Ok(Some(Err(e))) => AppError::StreamFailed { message: e.to_string() },
                Err(_) => AppError::StreamTimeout { millis: read_timeout.as_millis() as u64 },
            };

            if let Some(count) = references {
                warn!("Answer stream broke after completion: {failure}");
                return SendOutcome::Completed { references: count };
            }
            return self.fail_stream(target, &failure.to_string()).await;
        }

        for decoded in decoder.finish() {
            self.apply_frame(target, decoded, &mut references).await;
        }

        match references {
            Some(count) => SendOutcome::Completed { references: count },
            None => self.finish_partial(target).await,
        }
    }

    async fn apply_frame(
        &self,
        target: StreamTarget,
        decoded: Result<ChatFrame, FrameError>,
        references: &mut Option<usize>,
    ) {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping malformed stream frame: {e}");
                return;
            }
        };

        let mut state = self.state().await;
        if !state.is_active(target.conversation_id) {
            debug!("Dropping frame for conversation {}: no longer open", target.conversation_id);
            return;
        }

        match frame {
            ChatFrame::Chunk(text) => {
                let updated = state
                    .log
                    .append_assistant_chunk(target.message_id, &text)
                    .map(|m| m.content.clone());
                match updated {
                    Ok(content) => {
                        self.emit(SessionEvent::MessageUpdated { id: target.message_id, content })
                    }
                    Err(e) => debug!("Dropping chunk: {e}"),
                }
            }
            ChatFrame::Done { references: refs } => {
                let finalized = state.log.finalize(target.message_id, refs.clone()).cloned();
                match finalized {
                    Ok(message) => {
                        state.references.show(refs.clone());
                        *references = Some(refs.len());
                        self.emit(SessionEvent::MessageFinalized(message));
                        self.emit(SessionEvent::ReferencesShown(refs));
                    }
                    Err(e) => warn!("Ignoring completion frame: {e}"),
                }
            }
        }
    }

    /// Body ended without a completion frame: keep what arrived.
    async fn finish_partial(&self, target: StreamTarget) -> SendOutcome {
        let mut state = self.state().await;
        if !state.is_active(target.conversation_id) {
            return SendOutcome::Detached;
        }
        match state.log.finalize(target.message_id, Vec::new()).cloned() {
            Ok(message) => {
                debug!("Answer stream ended without completion frame");
                self.emit(SessionEvent::MessageFinalized(message));
                SendOutcome::Partial
            }
            Err(e) => {
                debug!("Partial answer no longer in the log: {e}");
                SendOutcome::Detached
            }
        }
    }

    /// Marks the answer slot failed, or appends a standalone failure message
    /// when the slot is gone.
    async fn fail_stream(&self, target: StreamTarget, reason: &str) -> SendOutcome {
        error!("Answer stream for conversation {} failed: {reason}", target.conversation_id);
        let notice = self.settings().failure_notice.clone();

        let mut state = self.state().await;
        if !state.is_active(target.conversation_id) {
            return SendOutcome::Detached;
        }
        let event = match state.log.fail(target.message_id, &notice).cloned() {
            Ok(message) => SessionEvent::MessageFinalized(message),
            Err(_) => {
                let id = state.log.append_failure(&notice);
                match state.log.get(id) {
                    Some(message) => SessionEvent::MessageAppended(message.clone()),
                    None => SessionEvent::Notice(notice.clone()),
                }
            }
        };
        drop(state);

        self.emit(event);
        self.emit(SessionEvent::Notice(format!("Answer failed: {reason}")));
        self.emit(SessionEvent::SendPhaseChanged(SendPhase::Error));
        SendOutcome::Failed { reason: reason.to_string() }
    }
}

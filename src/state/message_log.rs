use crate::errors::AppError;
use crate::models::{LogMessage, Message, MessageId, MessageRole, MessageStatus, Reference};

/// Ordered messages of the active conversation.
///
/// The backend is the source of truth for history: loads and polls replace
/// the whole log. Between replacements the send cycle appends the user
/// message and grows exactly one assistant tail until it is finalized.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<LogMessage>,
    display_cap: usize,
    hidden: usize,
}

impl MessageLog {
    pub fn new(display_cap: usize) -> Self {
        Self { messages: Vec::new(), display_cap: display_cap.max(1), hidden: 0 }
    }

    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Older server messages dropped by the display cap on the last replace.
    pub fn hidden_count(&self) -> usize {
        self.hidden
    }

    pub fn get(&self, id: MessageId) -> Option<&LogMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last_assistant(&self) -> Option<&LogMessage> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::Assistant)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.hidden = 0;
    }

    /// Replaces the log with a server message set, keeping only the most
    /// recent `display_cap` entries. Returns `false` when the resulting log
    /// is identical to the current one.
    pub fn replace_all(&mut self, messages: Vec<Message>) -> bool {
        let total = messages.len();
        let skip = total.saturating_sub(self.display_cap);
        let next: Vec<LogMessage> = messages
            .into_iter()
            .enumerate()
            .skip(skip)
            .map(|(position, m)| LogMessage::from_server(m, position))
            .collect();

        if next == self.messages && skip == self.hidden {
            return false;
        }
        self.messages = next;
        self.hidden = skip;
        true
    }

    pub fn append_user(&mut self, content: &str) -> MessageId {
        self.push(MessageRole::User, content.to_string(), MessageStatus::Final)
    }

    pub fn append_assistant_placeholder(&mut self) -> MessageId {
        self.push(MessageRole::Assistant, String::new(), MessageStatus::Pending)
    }

    /// Standalone assistant message carrying a failure notice.
    pub fn append_failure(&mut self, notice: &str) -> MessageId {
        self.push(MessageRole::Assistant, notice.to_string(), MessageStatus::Failed)
    }

    /// Concatenates `delta` onto a streaming assistant message. The first
    /// chunk turns the placeholder into a real message.
    pub fn append_assistant_chunk(
        &mut self,
        id: MessageId,
        delta: &str,
    ) -> Result<&LogMessage, AppError> {
        let message = self.mutable_tail(id)?;
        message.content.push_str(delta);
        message.status = MessageStatus::Streaming;
        Ok(message)
    }

    pub fn finalize(
        &mut self,
        id: MessageId,
        references: Vec<Reference>,
    ) -> Result<&LogMessage, AppError> {
        let message = self.mutable_tail(id)?;
        message.references = references;
        message.status = MessageStatus::Final;
        Ok(message)
    }

    /// Ends a broken stream: the partial content is replaced by `notice`.
    pub fn fail(&mut self, id: MessageId, notice: &str) -> Result<&LogMessage, AppError> {
        let message = self.mutable_tail(id)?;
        message.content = notice.to_string();
        message.status = MessageStatus::Failed;
        Ok(message)
    }

    fn push(&mut self, role: MessageRole, content: String, status: MessageStatus) -> MessageId {
        let id = MessageId::local();
        self.messages.push(LogMessage {
            id,
            role,
            content,
            references: Vec::new(),
            created_at: None,
            status,
        });
        id
    }

    fn mutable_tail(&mut self, id: MessageId) -> Result<&mut LogMessage, AppError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(AppError::MessageNotFound { id })?;
        if message.role != MessageRole::Assistant || !message.status.is_mutable() {
            return Err(AppError::MessageFinalized { id });
        }
        Ok(message)
    }
}

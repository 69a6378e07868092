use thiserror::Error;

use crate::models::{ConversationId, MessageId};

/// Top-level application error for the console core.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Transport errors ─────────────────────────────────────────────────────
    #[error("Session expired; sign in again")]
    SessionExpired,

    #[error("Network error while calling {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for {path}: {detail}")]
    Api { path: String, status: u16, detail: String },

    #[error("Could not decode response from {path}: {message}")]
    Decode { path: String, message: String },

    // ── Stream errors ────────────────────────────────────────────────────────
    #[error("Answer stream failed: {message}")]
    StreamFailed { message: String },

    #[error("Answer stream timed out after {millis} ms without data")]
    StreamTimeout { millis: u64 },

    // ── Message log errors ───────────────────────────────────────────────────
    #[error("Message {id} is not in the log")]
    MessageNotFound { id: MessageId },

    #[error("Message {id} is already finalized")]
    MessageFinalized { id: MessageId },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    // ── Session errors ───────────────────────────────────────────────────────
    #[error("A message is already being sent")]
    SendInProgress,

    #[error("A conversation is still loading")]
    LoadInProgress,

    #[error("Conversation {id} not found")]
    ConversationNotFound { id: ConversationId },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn network(path: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Network { path: path.into(), source }
    }

    pub fn decode(path: impl Into<String>, message: impl ToString) -> Self {
        AppError::Decode { path: path.into(), message: message.to_string() }
    }

    pub fn empty_field(field_name: &str) -> Self {
        AppError::EmptyField { field_name: field_name.to_string() }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::SessionExpired)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::EmptyField { .. })
    }

    /// The session is in the middle of another foreground action.
    pub fn is_busy(&self) -> bool {
        matches!(self, AppError::SendInProgress | AppError::LoadInProgress)
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            AppError::ConversationNotFound { .. } | AppError::MessageNotFound { .. } => true,
            AppError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}

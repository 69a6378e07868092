use reqwest::{Method, Response};
use tracing::debug;

use crate::api::client::{ensure_success, read_json, ApiClient};
use crate::errors::AppError;
use crate::models::{
    ChatStreamRequest, Conversation, ConversationDetail, ConversationId, RagDocument, SavedResponse,
    TitleRequest,
};

const CONVERSATIONS_PATH: &str = "/admin/rag/conversations";
const DOCUMENTS_PATH: &str = "/admin/rag/documents";
const CHAT_STREAM_PATH: &str = "/admin/rag/chat/stream";

/// Typed calls to the `/admin/rag` endpoints.
#[derive(Debug, Clone)]
pub struct RagApi {
    client: ApiClient,
}

impl RagApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, AppError> {
        let response = self.client.get(CONVERSATIONS_PATH).await?;
        let response = ensure_success(CONVERSATIONS_PATH, response).await?;
        read_json(CONVERSATIONS_PATH, response).await
    }

    pub async fn create_conversation(&self, title: &str) -> Result<Conversation, AppError> {
        let response = self
            .client
            .request(Method::POST, CONVERSATIONS_PATH, Some(&TitleRequest { title }))
            .await?;
        let response = ensure_success(CONVERSATIONS_PATH, response).await?;
        let conversation: Conversation = read_json(CONVERSATIONS_PATH, response).await?;
        debug!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    pub async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<ConversationDetail, AppError> {
        let path = conversation_path(id);
        let response = self.client.get(&path).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::ConversationNotFound { id });
        }
        let response = ensure_success(&path, response).await?;
        read_json(&path, response).await
    }

    pub async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), AppError> {
        let path = conversation_path(id);
        let response = self
            .client
            .request(Method::PATCH, &path, Some(&TitleRequest { title }))
            .await?;
        ensure_success(&path, response).await?;
        Ok(())
    }

    pub async fn delete_conversation(&self, id: ConversationId) -> Result<(), AppError> {
        let path = conversation_path(id);
        let response = self.client.delete(&path).await?;
        ensure_success(&path, response).await?;
        Ok(())
    }

    /// Flips the saved flag and returns its new value.
    pub async fn toggle_saved(&self, id: ConversationId) -> Result<bool, AppError> {
        let path = format!("{}/save", conversation_path(id));
        let response = self.client.request(Method::POST, &path, None::<&()>).await?;
        let response = ensure_success(&path, response).await?;
        let body: SavedResponse = read_json(&path, response).await?;
        Ok(body.saved)
    }

    pub async fn list_documents(&self) -> Result<Vec<RagDocument>, AppError> {
        let response = self.client.get(DOCUMENTS_PATH).await?;
        let response = ensure_success(DOCUMENTS_PATH, response).await?;
        read_json(DOCUMENTS_PATH, response).await
    }

    /// Starts an answer stream. The returned response has a 2xx status and
    /// an unread body.
    pub async fn open_chat_stream(
        &self,
        request: &ChatStreamRequest<'_>,
    ) -> Result<Response, AppError> {
        let response = self.client.open_stream(CHAT_STREAM_PATH, request).await?;
        ensure_success(CHAT_STREAM_PATH, response).await
    }
}

fn conversation_path(id: ConversationId) -> String {
    format!("{CONVERSATIONS_PATH}/{id}")
}

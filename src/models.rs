use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Server-assigned conversation identifier.
pub type ConversationId = i64;

/// Unsaved conversations are purged by the backend after this many days.
pub const RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub saved: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Whole days until the backend's retention sweep removes this
    /// conversation, never negative. Saved conversations are exempt but the
    /// figure is still computed from `updated_at`.
    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        let Some(updated) = self.updated_at else {
            return RETENTION_DAYS;
        };
        let remaining = (updated + Duration::days(RETENTION_DAYS)) - now;
        let day_ms = Duration::days(1).num_milliseconds();
        let ms = remaining.num_milliseconds();
        // ceil for integer division, valid for negative numerators too
        let days = ms.div_euclid(day_ms) + i64::from(ms.rem_euclid(day_ms) != 0);
        days.max(0)
    }
}

/// `GET /admin/rag/conversations/{id}` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Entries that fail to decode are dropped so one bad row cannot hide
    /// the rest of the conversation.
    #[serde(default, deserialize_with = "lenient_seq")]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored document snippet returned alongside an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub filename: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub similarity: f64,
    #[serde(default)]
    pub chunk_text: String,
}

impl Reference {
    pub fn similarity_percent(&self) -> u8 {
        (self.similarity.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// A message as the backend stores it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<i64>,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub references: Vec<Reference>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Selectable reference document (`GET /admin/rag/documents`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RagDocument {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

// ── Local message log types ──────────────────────────────────────────────────

/// Identity of a message in the local log.
///
/// Server messages keep their server id so that replacing the log with the
/// same server set is a no-op; messages created locally get a fresh uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(i64),
    /// Server message without an id, keyed by its position in the payload.
    Position(usize),
    Local(Uuid),
}

impl MessageId {
    pub fn local() -> Self {
        MessageId::Local(Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Server(id) => write!(f, "server-{id}"),
            MessageId::Position(idx) => write!(f, "pos-{idx}"),
            MessageId::Local(uuid) => write!(f, "local-{uuid}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Assistant placeholder, no token received yet.
    Pending,
    /// Assistant message receiving tokens.
    Streaming,
    Final,
    /// Stream broke; content holds the failure notice.
    Failed,
}

impl MessageStatus {
    pub fn is_mutable(&self) -> bool {
        matches!(self, MessageStatus::Pending | MessageStatus::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub references: Vec<Reference>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
}

impl LogMessage {
    pub fn from_server(message: Message, position: usize) -> Self {
        Self {
            id: message.id.map(MessageId::Server).unwrap_or(MessageId::Position(position)),
            role: message.role,
            content: message.content,
            references: message.references,
            created_at: message.created_at,
            status: MessageStatus::Final,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

// ── Request / response bodies ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TitleRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatStreamRequest<'a> {
    pub conversation_id: ConversationId,
    pub message: &'a str,
    /// `None` means "search every document".
    pub document_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SavedResponse {
    pub saved: bool,
}

// ── Lenient field decoding ───────────────────────────────────────────────────

/// Accepts RFC 3339 as well as the naive ISO-8601 strings the backend emits
/// for `timestamp without time zone` columns (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// A null or missing list is empty; entries that do not decode are skipped.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let items = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping malformed {} at index {index}: {e}", std::any::type_name::<T>());
                None
            }
        })
        .collect();
    Ok(items)
}

//! In-process stand-in for the admin backend.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};

use rag_console::config::Settings;
use rag_console::service::ChatSession;

pub const TOKEN: &str = "test-token";
pub const PASSWORD: &str = "secret";
const TIMESTAMP: &str = "2025-06-10T12:00:00";
const CONVERSATION_PREFIX: &str = "/admin/rag/conversations/";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// How the chat stream endpoint answers.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Send these body parts, then end normally.
    Frames(Vec<String>),
    /// Send each part after waiting the given delay, then end normally.
    Paced(Vec<String>, Duration),
    /// Send these parts, then break the connection.
    AbortAfter(Vec<String>),
    /// Send these parts, then go silent.
    StallAfter(Vec<String>),
    /// Answer with this status and a FastAPI error body.
    Status(u16),
}

#[derive(Debug)]
pub struct MockState {
    pub conversations: Vec<Value>,
    pub messages: HashMap<i64, Vec<Value>>,
    pub documents: Vec<Value>,
    pub stream: StreamScript,
    pub requests: Vec<RecordedRequest>,
    /// Answer every authenticated call with 401.
    pub reject_all: bool,
    /// Hold `GET /conversations/{id}` this long before answering.
    pub detail_delay: Option<Duration>,
    next_id: i64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            messages: HashMap::new(),
            documents: Vec::new(),
            stream: StreamScript::Frames(Vec::new()),
            requests: Vec::new(),
            reject_all: false,
            detail_delay: None,
            next_id: 1,
        }
    }
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url: format!("http://{addr}"), state }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            api_base: self.base_url.clone(),
            admin_token: Some(TOKEN.to_string()),
            request_timeout: Duration::from_secs(5),
            stream_read_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
            ..Settings::default()
        }
    }

    pub fn session(&self) -> ChatSession {
        ChatSession::new(self.settings()).unwrap()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Adds a conversation holding `count` alternating messages.
    pub fn seed_conversation(&self, id: i64, title: &str, count: usize) {
        self.with(|s| {
            s.conversations.push(conversation_json(id, title, false));
            s.messages.insert(id, messages_json(count));
            s.next_id = s.next_id.max(id + 1);
        });
    }

    pub fn set_message_count(&self, id: i64, count: usize) {
        self.with(|s| {
            s.messages.insert(id, messages_json(count));
        });
    }

    pub fn set_messages(&self, id: i64, messages: Vec<Value>) {
        self.with(|s| {
            s.messages.insert(id, messages);
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.with(|s| s.requests.clone())
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.with(|s| s.requests.clear());
    }
}

pub fn conversation_json(id: i64, title: &str, saved: bool) -> Value {
    json!({
        "id": id,
        "title": title,
        "saved": saved,
        "created_at": TIMESTAMP,
        "updated_at": TIMESTAMP,
    })
}

fn messages_json(count: usize) -> Vec<Value> {
    (0..count).map(|i| message_json(i as i64 + 1, i)).collect()
}

fn message_json(id: i64, index: usize) -> Value {
    let (role, references) = if index % 2 == 0 {
        ("user", Value::Null)
    } else {
        let reference = json!({
            "filename": format!("doc-{index}.pdf"),
            "similarity": 0.5,
            "chunk_text": "snippet",
        });
        ("assistant", json!([reference]))
    };
    json!({
        "id": id,
        "role": role,
        "content": format!("message {index}"),
        "references": references,
        "created_at": TIMESTAMP,
    })
}

pub fn chunk(text: &str) -> String {
    format!("data: {}\n\n", json!({ "chunk": text }))
}

pub fn done(references: Value) -> String {
    format!("data: {}\n\n", json!({ "done": true, "references": references }))
}

async fn handle(
    State(state): State<Arc<Mutex<MockState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let body: Option<Value> = serde_json::from_slice(&body).ok();

    let delay = {
        let mut s = state.lock().unwrap();
        s.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            bearer: bearer.clone(),
            body: body.clone(),
        });
        if method == Method::GET && path.starts_with(CONVERSATION_PREFIX) {
            s.detail_delay
        } else {
            None
        }
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut s = state.lock().unwrap();
    if path == "/admin/login" {
        let password = body.as_ref().and_then(|b| b["password"].as_str()).unwrap_or_default();
        if password == PASSWORD {
            return Json(json!({ "token": TOKEN })).into_response();
        }
        return error(StatusCode::UNAUTHORIZED, "Invalid password");
    }
    if s.reject_all || bearer.as_deref() != Some(TOKEN) {
        return error(StatusCode::UNAUTHORIZED, "Not authenticated");
    }

    let title = body.as_ref().and_then(|b| b["title"].as_str()).unwrap_or_default().to_string();
    let segments: Vec<&str> = path.trim_start_matches("/admin/rag/").split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["conversations"]) => Json(Value::Array(s.conversations.clone())).into_response(),
        ("POST", ["conversations"]) => {
            let id = s.next_id;
            s.next_id += 1;
            let conversation = conversation_json(id, &title, false);
            s.conversations.insert(0, conversation.clone());
            s.messages.insert(id, Vec::new());
            Json(conversation).into_response()
        }
        (verb, ["conversations", id, rest @ ..]) => {
            let Ok(id) = id.parse::<i64>() else {
                return error(StatusCode::UNPROCESSABLE_ENTITY, "bad id");
            };
            let Some(index) = s.conversations.iter().position(|c| c["id"] == id) else {
                return error(StatusCode::NOT_FOUND, "대화를 찾을 수 없습니다");
            };
            match (verb, rest) {
                ("GET", []) => {
                    let mut detail = s.conversations[index].clone();
                    let messages = s.messages.get(&id).cloned().unwrap_or_default();
                    detail["messages"] = Value::Array(messages);
                    Json(detail).into_response()
                }
                ("PATCH", []) => {
                    s.conversations[index]["title"] = json!(title);
                    Json(s.conversations[index].clone()).into_response()
                }
                ("DELETE", []) => {
                    s.conversations.remove(index);
                    s.messages.remove(&id);
                    Json(json!({ "ok": true })).into_response()
                }
                ("POST", ["save"]) => {
                    let saved = !s.conversations[index]["saved"].as_bool().unwrap_or(false);
                    s.conversations[index]["saved"] = json!(saved);
                    Json(json!({ "saved": saved })).into_response()
                }
                _ => error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            }
        }
        ("GET", ["documents"]) => Json(Value::Array(s.documents.clone())).into_response(),
        ("POST", ["chat", "stream"]) => stream_response(s.stream.clone()),
        _ => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

fn parts(parts: Vec<String>) -> BodyStream {
    stream::iter(parts.into_iter().map(|p| Ok::<_, std::io::Error>(Bytes::from(p)))).boxed()
}

fn stream_response(script: StreamScript) -> Response {
    let body: BodyStream = match script {
        StreamScript::Status(status) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return error(status, "stream refused");
        }
        StreamScript::Frames(p) => parts(p),
        StreamScript::Paced(p, delay) => stream::iter(p)
            .then(move |part| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, std::io::Error>(Bytes::from(part))
            })
            .boxed(),
        StreamScript::AbortAfter(p) => parts(p)
            .chain(stream::once(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(std::io::Error::other("connection aborted"))
            }))
            .boxed(),
        StreamScript::StallAfter(p) => parts(p).chain(stream::pending()).boxed(),
    };
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
}

fn error(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::AppError;
use crate::events::{EventBus, SessionEvent};
use crate::models::{LoginRequest, LoginResponse};

const LOGIN_PATH: &str = "/admin/login";

/// Authenticated HTTP access to the admin backend.
///
/// Every call carries `Authorization: Bearer <token>`. A 401 on any call
/// clears the token, announces [`SessionEvent::SessionExpired`] and fails
/// with [`AppError::SessionExpired`]. Any other status is handed back to the
/// caller untouched.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    request_timeout: Duration,
    events: EventBus,
}

impl ApiClient {
    pub fn new(settings: &Settings, events: EventBus) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout)
            .build()
            .map_err(|e| AppError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.api_base.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(settings.admin_token.clone())),
            request_timeout: settings.request_timeout,
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    pub async fn logout(&self) {
        *self.token.write().await = None;
        info!("Signed out of admin session");
    }

    /// Exchanges the admin password for a bearer token and keeps it.
    ///
    /// Login goes around the 401 handling: a rejected password is an
    /// ordinary [`AppError::Api`] error, not a session expiry.
    pub async fn login(&self, password: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .timeout(self.request_timeout)
            .json(&LoginRequest { password })
            .send()
            .await
            .map_err(|e| AppError::network(LOGIN_PATH, e))?;

        let response = ensure_success(LOGIN_PATH, response).await?;
        let body: LoginResponse = read_json(LOGIN_PATH, response).await?;
        self.set_token(body.token).await;
        info!("Signed in to admin session");
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Response, AppError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, AppError> {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, AppError>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.http.request(method, self.url(path)).timeout(self.request_timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(path, builder).await
    }

    /// POSTs `body` and returns the response without a total timeout, for
    /// bodies that are consumed incrementally.
    pub async fn open_stream<B>(&self, path: &str, body: &B) -> Result<Response, AppError>
    where
        B: Serialize + ?Sized,
    {
        let builder = self
            .http
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        self.execute(path, builder).await
    }

    async fn execute(&self, path: &str, builder: RequestBuilder) -> Result<Response, AppError> {
        let builder = match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            warn!("Request to {path} failed: {e}");
            AppError::network(path, e)
        })?;
        debug!("{path} -> {}", response.status());

        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate(path).await;
            return Err(AppError::SessionExpired);
        }
        Ok(response)
    }

    async fn invalidate(&self, path: &str) {
        *self.token.write().await = None;
        warn!("Session rejected by backend on {path}; token cleared");
        self.events.emit(SessionEvent::SessionExpired);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turns a non-2xx response into [`AppError::Api`], using FastAPI's
/// `{"detail": ...}` field when the body has one.
pub async fn ensure_success(path: &str, response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Api {
        path: path.to_string(),
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

pub async fn read_json<T>(path: &str, response: Response) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned,
{
    let bytes = response.bytes().await.map_err(|e| AppError::network(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::decode(path, e))
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value.get("detail").map(|detail| match detail.as_str() {
                Some(text) => text.to_string(),
                None => detail.to_string(),
            })
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_extracted_from_fastapi_errors() {
        assert_eq!(error_detail(r#"{"detail":"대화를 찾을 수 없습니다"}"#), "대화를 찾을 수 없습니다");
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":["body","title"],"msg":"field required"}]}"#),
            r#"[{"loc":["body","title"],"msg":"field required"}]"#
        );
    }

    #[test]
    fn non_json_body_is_kept_verbatim() {
        assert_eq!(error_detail("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_detail(r#"{"message":"x"}"#), r#"{"message":"x"}"#);
    }

    #[tokio::test]
    async fn token_lifecycle() {
        let settings = Settings { admin_token: Some("t0".into()), ..Settings::default() };
        let client = ApiClient::new(&settings, EventBus::new()).unwrap();
        assert!(client.has_token().await);
        client.logout().await;
        assert!(!client.has_token().await);
        client.set_token("t1").await;
        assert!(client.has_token().await);
    }
}

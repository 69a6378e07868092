use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

/// Title sent when the console creates a conversation. The backend replaces
/// it with the first question as long as the title is still this exact text.
pub const DEFAULT_CONVERSATION_TITLE: &str = "새 대화";

pub const DEFAULT_FAILURE_NOTICE: &str = "An error occurred. Please try again.";

/// Runtime settings for the console, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base: String,
    pub admin_token: Option<String>,
    pub admin_password: Option<String>,
    pub request_timeout: Duration,
    /// Longest silence tolerated between two reads of the answer stream.
    pub stream_read_timeout: Duration,
    pub poll_interval: Duration,
    /// Let the reconciler run while a send is streaming.
    pub poll_during_send: bool,
    /// Most recent messages kept in the log after a load or poll.
    pub display_cap: usize,
    pub conversation_title: String,
    pub failure_notice: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            admin_token: None,
            admin_password: None,
            request_timeout: Duration::from_secs(30),
            stream_read_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            poll_during_send: false,
            display_cap: 100,
            conversation_title: DEFAULT_CONVERSATION_TITLE.to_string(),
            failure_notice: DEFAULT_FAILURE_NOTICE.to_string(),
        }
    }
}

impl Settings {
    /// Reads `RAG_*` variables from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup; unset keys keep their
    /// defaults, blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Settings::default();

        if let Some(base) = get("RAG_API_BASE") {
            settings.api_base = base.trim_end_matches('/').to_string();
        }
        settings.admin_token = get("RAG_ADMIN_TOKEN");
        settings.admin_password = get("RAG_ADMIN_PASSWORD");

        if let Some(secs) = parse_var::<u64>(&get, "RAG_REQUEST_TIMEOUT_SECS")? {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&get, "RAG_STREAM_READ_TIMEOUT_SECS")? {
            settings.stream_read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&get, "RAG_POLL_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(AppError::Config {
                    key: "RAG_POLL_INTERVAL_SECS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(flag) = parse_var::<bool>(&get, "RAG_POLL_DURING_SEND")? {
            settings.poll_during_send = flag;
        }
        if let Some(cap) = parse_var::<usize>(&get, "RAG_DISPLAY_CAP")? {
            settings.display_cap = cap.max(1);
        }

        Ok(settings)
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| AppError::Config {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

pub mod gateway;
pub mod gemini;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use self::gateway::GatewayChatClient;
use self::gemini::GeminiChatClient;

/// One provider-agnostic completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Logical model name; each provider resolves it to its own identifier.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self { model: model.into(), messages, temperature: None }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 429/403 or a quota marker in the body.
    Quota,
    Auth,
    Payment,
    Http,
    Transport,
    /// The call succeeded but carried no text.
    Empty,
}

/// Why a single provider attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: FailureKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self { kind, status, message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, None, message)
    }

    pub fn empty() -> Self {
        Self::new(FailureKind::Empty, None, "Provider returned no text")
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl StdError for AttemptError {}

/// A single strategy in the fallback chain.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn llm_type(&self) -> LlmType;

    /// Human-readable provider label for logs. Never includes the credential.
    fn label(&self) -> String {
        self.llm_type().to_string()
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<String, AttemptError>;
}

pub(crate) fn build_http_client(
    timeout_secs: u64,
    headers: HeaderMap
) -> Result<reqwest::Client, Box<dyn StdError + Send + Sync>> {
    let mut builder = reqwest::Client::builder().default_headers(headers);
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build().map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)
}

/// Shortens an upstream body so error messages stay readable.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(LIMIT).collect();
    out.push_str("...");
    out
}

pub fn new_provider(
    config: &LlmConfig
) -> Result<Arc<dyn ChatProvider>, Box<dyn StdError + Send + Sync>> {
    let provider: Arc<dyn ChatProvider> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Gateway => {
            let specific_client = GatewayChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(provider)
}

/// Local stand-in for an upstream provider, used by the adapter tests.
#[cfg(test)]
pub(crate) mod stub {
    use axum::{ extract::{ Query, State }, http::{ HeaderMap, StatusCode, Uri }, Router };
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{ Arc, Mutex };

    /// The last request the stub received.
    #[derive(Clone, Debug, Default)]
    pub struct Seen {
        pub path: String,
        pub query: HashMap<String, String>,
        pub authorization: Option<String>,
        pub body: Value,
    }

    #[derive(Clone)]
    struct StubState {
        status: StatusCode,
        body: String,
        seen: Arc<Mutex<Option<Seen>>>,
    }

    async fn respond(
        State(state): State<StubState>,
        Query(query): Query<HashMap<String, String>>,
        uri: Uri,
        headers: HeaderMap,
        body: String
    ) -> (StatusCode, String) {
        let seen = Seen {
            path: uri.path().to_string(),
            query,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: serde_json::from_str(&body).unwrap_or(Value::Null),
        };
        *state.seen.lock().unwrap() = Some(seen);
        (state.status, state.body.clone())
    }

    /// Serves `status` and `body` for every request. Returns the base URL.
    pub async fn spawn(status: u16, body: &str) -> (String, Arc<Mutex<Option<Seen>>>) {
        let seen = Arc::new(Mutex::new(None));
        let state = StubState {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
            seen: Arc::clone(&seen),
        };
        let app = Router::new().fallback(respond).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    /// A base URL nothing listens on.
    pub async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }
}

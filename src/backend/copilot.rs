//! GitHub Copilot chat backend
//!
//! Each session is one streamed `POST /chat/completions` call against the
//! Copilot API. The upstream OpenAI-style SSE body is read on a spawned task
//! and re-emitted as [`SessionEvent`]s.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{BackendError, BackendSession, EventHandler, SessionBackend, SessionEvent, Subscribers, Subscription};
use crate::auth::session_token::{EDITOR_PLUGIN_VERSION, EDITOR_VERSION, USER_AGENT};
use crate::auth::{BearerCredential, SessionCredential, SessionTokenCache};
use crate::config::Config;
use crate::streaming::{parse_data_line, SseLine, SseLineBuffer};

const INTEGRATION_ID: &str = "vscode-chat";
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One upstream SSE payload
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// Production [`SessionBackend`] backed by the Copilot chat API
pub struct CopilotBackend {
    client: reqwest::Client,
    api_url: String,
    bearer: BearerCredential,
    tokens: Arc<SessionTokenCache>,
}

impl CopilotBackend {
    pub fn new(
        client: reqwest::Client,
        config: &Config,
        bearer: BearerCredential,
        tokens: Arc<SessionTokenCache>,
    ) -> Self {
        Self {
            client,
            api_url: config.copilot_api_url.trim_end_matches('/').to_string(),
            bearer,
            tokens,
        }
    }
}

#[async_trait]
impl SessionBackend for CopilotBackend {
    fn name(&self) -> &'static str {
        "copilot"
    }

    #[instrument(skip(self))]
    async fn create_session(&self, model: &str) -> Result<Arc<dyn BackendSession>, BackendError> {
        let credential = self.tokens.get(&self.bearer).await?;

        let session = CopilotSession {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            endpoint: format!("{}/chat/completions", self.api_url),
            client: self.client.clone(),
            credential,
            tokens: self.tokens.clone(),
            subscribers: Subscribers::new(),
            sent: AtomicBool::new(false),
            task: Mutex::new(None),
        };
        debug!(session_id = %session.id, "Session created");

        Ok(Arc::new(session))
    }
}

struct CopilotSession {
    id: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    credential: SessionCredential,
    tokens: Arc<SessionTokenCache>,
    subscribers: Subscribers,
    sent: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CopilotSession {
    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait]
impl BackendSession for CopilotSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.subscribers.subscribe(handler)
    }

    #[instrument(skip(self, prompt), fields(session_id = %self.id, model = %self.model))]
    async fn send(&self, prompt: &str) -> Result<(), BackendError> {
        if self.sent.swap(true, Ordering::SeqCst) {
            return Err(BackendError::Send(
                "a prompt was already sent on this session".to_string(),
            ));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.credential.token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header("Copilot-Integration-Id", INTEGRATION_ID)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                info!("Copilot rejected the session token; dropping cached credential");
                self.tokens.invalidate().await;
            }
            let mut body = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(BackendError::Send(format!(
                "Copilot API returned {}: {}",
                status, body
            )));
        }

        let subscribers = self.subscribers.clone();
        let session_id = self.id.clone();
        let handle = tokio::spawn(async move {
            let terminal = relay_stream(response.bytes_stream(), &subscribers).await;
            debug!(session_id = %session_id, ?terminal, "Upstream stream finished");
            subscribers.emit(terminal);
        });
        *self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn destroy(&self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
        self.subscribers.clear();
        debug!("Session destroyed");
    }
}

impl Drop for CopilotSession {
    fn drop(&mut self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
    }
}

/// Emit assistant text from `body` and return the terminal event.
async fn relay_stream<S, E>(body: S, subscribers: &Subscribers) -> SessionEvent
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    futures::pin_mut!(body);
    let mut buffer = SseLineBuffer::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return SessionEvent::Error(format!("Copilot stream interrupted: {}", e)),
        };
        for line in buffer.feed(&chunk) {
            if let Some(terminal) = relay_line(&line, subscribers) {
                return terminal;
            }
        }
    }

    if let Some(line) = buffer.finish() {
        if let Some(terminal) = relay_line(&line, subscribers) {
            return terminal;
        }
    }

    SessionEvent::Idle
}

fn relay_line(line: &str, subscribers: &Subscribers) -> Option<SessionEvent> {
    let payload = match parse_data_line(line) {
        SseLine::Done => return Some(SessionEvent::Idle),
        SseLine::Other => return None,
        SseLine::Data(payload) => payload,
    };

    let chunk: ChatChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(
                error = %e,
                line_len = payload.len(),
                "Skipping unparseable upstream SSE payload"
            );
            return None;
        }
    };

    if let Some(error) = chunk.error {
        return Some(SessionEvent::Error(error.message));
    }

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            subscribers.emit(SessionEvent::AssistantText(text));
        }
    }
    None
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

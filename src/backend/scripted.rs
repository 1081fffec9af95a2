//! In-process backend that replays a fixed event script
//!
//! Used by unit and integration tests in place of the Copilot API. Events are
//! emitted from a spawned task, like a real backend, and the backend keeps
//! counters so tests can assert on session lifecycle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::{BackendError, BackendSession, EventHandler, SessionBackend, SessionEvent, Subscribers, Subscription};

#[derive(Debug, Default)]
struct Recorder {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    models: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

/// Backend whose sessions replay `script` after every send.
///
/// A script without a terminal event leaves the exchange open forever, which
/// is how tests drive the response timeout.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    script: Vec<SessionEvent>,
    event_delay: Option<Duration>,
    create_error: Option<String>,
    send_error: Option<String>,
    recorder: Arc<Recorder>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<SessionEvent>) -> Self {
        Self {
            script,
            event_delay: None,
            create_error: None,
            send_error: None,
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Script that answers `chunks` and then goes idle.
    pub fn replying(chunks: &[&str]) -> Self {
        let mut script: Vec<SessionEvent> = chunks
            .iter()
            .map(|c| SessionEvent::AssistantText(c.to_string()))
            .collect();
        script.push(SessionEvent::Idle);
        Self::new(script)
    }

    /// Sleep between events
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// Fail every `create_session` with `message`
    pub fn with_create_error(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }

    /// Fail every `send` with `message`
    pub fn with_send_error(mut self, message: impl Into<String>) -> Self {
        self.send_error = Some(message.into());
        self
    }

    pub fn sessions_created(&self) -> usize {
        self.recorder.created.load(Ordering::SeqCst)
    }

    pub fn sessions_destroyed(&self) -> usize {
        self.recorder.destroyed.load(Ordering::SeqCst)
    }

    /// Models requested so far, in order
    pub fn models(&self) -> Vec<String> {
        self.recorder.models.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Prompts sent so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.recorder.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_session(&self, model: &str) -> Result<Arc<dyn BackendSession>, BackendError> {
        if let Some(message) = &self.create_error {
            return Err(BackendError::SessionCreate(message.clone()));
        }

        let n = self.recorder.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut models) = self.recorder.models.lock() {
            models.push(model.to_string());
        }

        Ok(Arc::new(ScriptedSession {
            id: format!("scripted-{}", n + 1),
            backend: self.clone(),
            subscribers: Subscribers::new(),
            destroyed: AtomicBool::new(false),
            task: Mutex::new(None),
        }))
    }
}

struct ScriptedSession {
    id: String,
    backend: ScriptedBackend,
    subscribers: Subscribers,
    destroyed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl BackendSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.subscribers.subscribe(handler)
    }

    async fn send(&self, prompt: &str) -> Result<(), BackendError> {
        if let Ok(mut prompts) = self.backend.recorder.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(message) = &self.backend.send_error {
            return Err(BackendError::Send(message.clone()));
        }

        let script = self.backend.script.clone();
        let delay = self.backend.event_delay;
        let subscribers = self.subscribers.clone();
        let handle = tokio::spawn(async move {
            for event in script {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => tokio::task::yield_now().await,
                }
                subscribers.emit(event);
            }
        });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
        self.subscribers.clear();
        self.backend.recorder.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

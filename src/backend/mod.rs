//! Session-based assistant backend
//!
//! The backend speaks an event-callback protocol: a caller creates a session,
//! registers one or more event handlers, sends a prompt, and then receives
//! [`SessionEvent`]s on a task owned by the session until exactly one terminal
//! event (`Idle` or `Error`) closes the exchange.
//!
//! [`SessionBackend`] and [`BackendSession`] are the seam the translator is
//! written against; [`copilot::CopilotBackend`] is the production
//! implementation.

pub mod copilot;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::AuthError;

pub use copilot::CopilotBackend;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedBackend;

/// Event emitted by a backend session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A piece of assistant output
    AssistantText(String),
    /// The assistant finished the turn
    Idle,
    /// The turn failed
    Error(String),
}

impl SessionEvent {
    /// Whether this event closes the exchange
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Idle | SessionEvent::Error(_))
    }
}

/// Backend failures that prevent an exchange from starting
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Copilot credential unavailable: {0}")]
    Credential(#[from] AuthError),

    #[error("Failed to create session: {0}")]
    SessionCreate(String),

    #[error("Failed to send prompt: {0}")]
    Send(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Callback invoked for every event of a session
pub type EventHandler = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Creates one session per request
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Open a new session bound to `model`
    async fn create_session(&self, model: &str) -> Result<Arc<dyn BackendSession>, BackendError>;
}

/// A single conversation context on the backend
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Backend-assigned session identifier
    fn id(&self) -> &str;

    /// Register `handler` for this session's events.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// released or dropped.
    fn subscribe(&self, handler: EventHandler) -> Subscription;

    /// Submit the prompt. Output arrives through subscribed handlers.
    async fn send(&self, prompt: &str) -> Result<(), BackendError>;

    /// Tear the session down, cancelling any in-flight work.
    async fn destroy(&self);
}

/// Registration handle returned by [`BackendSession::subscribe`].
///
/// Releasing (explicitly or by drop) unregisters the handler exactly once.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister now instead of at drop.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[derive(Default)]
struct HandlerTable {
    next_id: u64,
    handlers: HashMap<u64, EventHandler>,
}

/// Handler registry shared by session implementations.
#[derive(Clone, Default)]
pub struct Subscribers {
    table: Arc<Mutex<HandlerTable>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: EventHandler) -> Subscription {
        let id = {
            let mut table = lock(&self.table);
            let id = table.next_id;
            table.next_id += 1;
            table.handlers.insert(id, handler);
            id
        };

        let table: Weak<Mutex<HandlerTable>> = Arc::downgrade(&self.table);
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                lock(&table).handlers.remove(&id);
            }
        })
    }

    /// Deliver `event` to every registered handler.
    ///
    /// Handlers run outside the registry lock so they may unsubscribe.
    pub fn emit(&self, event: SessionEvent) {
        let handlers: Vec<EventHandler> = lock(&self.table).handlers.values().cloned().collect();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        lock(&self.table).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handler
    pub fn clear(&self) {
        lock(&self.table).handlers.clear();
    }
}

fn lock(table: &Mutex<HandlerTable>) -> std::sync::MutexGuard<'_, HandlerTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

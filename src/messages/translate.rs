//! Backend session events to Messages API output
//!
//! An [`Exchange`] owns one backend session for the lifetime of one request:
//!
//! ```text
//! Start -> Sent -> Buffering -> Done | Failed
//!               -> Streaming -> Done | Failed
//! ```
//!
//! Events are delivered by the backend on its own task and forwarded through
//! an unbounded channel; the request side awaits that channel until a
//! terminal event arrives. Dropping the handler subscription closes the
//! channel, so it doubles as the completion latch.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::response::{message_id, MessagesResponse};
use super::streaming::{format_frame, StreamFrame};
use crate::backend::{BackendError, BackendSession, SessionBackend, SessionEvent, Subscription};
use crate::routes::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Start,
    Sent,
    Buffering,
    Streaming,
    Done,
    Failed,
}

impl ExchangeState {
    fn as_str(self) -> &'static str {
        match self {
            ExchangeState::Start => "start",
            ExchangeState::Sent => "sent",
            ExchangeState::Buffering => "buffering",
            ExchangeState::Streaming => "streaming",
            ExchangeState::Done => "done",
            ExchangeState::Failed => "failed",
        }
    }
}

/// Destroys the backend session exactly once, at the latest on drop.
struct SessionGuard {
    session: Arc<dyn BackendSession>,
    destroyed: bool,
}

impl SessionGuard {
    fn new(session: Arc<dyn BackendSession>) -> Self {
        metrics::session_opened();
        Self {
            session,
            destroyed: false,
        }
    }

    async fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.session.destroy().await;
            metrics::session_closed();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        metrics::session_closed();

        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(session_id = %session.id(), "Exchange dropped early, destroying session");
                handle.spawn(async move { session.destroy().await });
            }
            Err(_) => warn!(session_id = %session.id(), "No runtime to destroy session on"),
        }
    }
}

/// One request's conversation with a backend session.
pub struct Exchange {
    session: SessionGuard,
    subscription: Option<Subscription>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    model: String,
    deadline: Option<Instant>,
    state: ExchangeState,
    started: Instant,
}

impl Exchange {
    /// Create a session for `model`, subscribe to it and send `prompt`.
    ///
    /// The subscription is registered before the prompt goes out so no event
    /// can be missed. `timeout` bounds everything after session creation:
    /// the send itself and the wait for the terminal event.
    pub async fn open(
        backend: &dyn SessionBackend,
        model: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, BackendError> {
        let started = Instant::now();
        let session = backend.create_session(model).await.map_err(|e| {
            metrics::record_backend_error("create");
            e
        })?;
        let session = SessionGuard::new(session);

        let (tx, events) = mpsc::unbounded_channel();
        let subscription = session.session.subscribe(Arc::new(move |event| {
            // The receiver is gone once the exchange has finished.
            let _ = tx.send(event);
        }));

        let mut exchange = Self {
            session,
            subscription: Some(subscription),
            events,
            model: model.to_string(),
            deadline: None,
            state: ExchangeState::Start,
            started,
        };

        exchange.deadline = timeout.map(|t| Instant::now() + t);
        let sent = match exchange.deadline {
            Some(deadline) => {
                tokio::time::timeout_at(deadline, exchange.session.session.send(prompt))
                    .await
                    .unwrap_or_else(|_| {
                        Err(BackendError::Send(
                            "Timed out waiting for the backend to accept the prompt".to_string(),
                        ))
                    })
            }
            None => exchange.session.session.send(prompt).await,
        };

        if let Err(e) = sent {
            metrics::record_backend_error("send");
            exchange.release_subscription();
            exchange.session.destroy().await;
            return Err(e);
        }

        exchange.transition(ExchangeState::Sent);
        Ok(exchange)
    }

    pub fn session_id(&self) -> &str {
        self.session.session.id()
    }

    pub fn message_id(&self) -> String {
        message_id(self.session_id())
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Wait for the whole reply and return it as one message.
    ///
    /// A backend error yields whatever text arrived before it.
    pub async fn collect(mut self) -> MessagesResponse {
        self.transition(ExchangeState::Buffering);

        let mut text = String::new();
        loop {
            match self.next_event().await {
                SessionEvent::AssistantText(piece) => text.push_str(&piece),
                SessionEvent::Idle => {
                    self.transition(ExchangeState::Done);
                    break;
                }
                SessionEvent::Error(message) => {
                    self.fail(&message);
                    break;
                }
            }
        }

        self.finish("buffered").await;
        MessagesResponse::text(self.message_id(), self.model.clone(), text)
    }

    /// Stream the reply as Anthropic SSE frames.
    ///
    /// Dropping the stream before it ends destroys the backend session.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        let mut exchange = self;
        async_stream::stream! {
            exchange.transition(ExchangeState::Streaming);
            yield Ok::<Bytes, Infallible>(format_frame(&StreamFrame::MessageStart {
                id: exchange.message_id(),
                model: exchange.model.clone(),
            }));

            loop {
                match exchange.next_event().await {
                    SessionEvent::AssistantText(text) => {
                        yield Ok(format_frame(&StreamFrame::ContentBlockDelta { text }));
                    }
                    SessionEvent::Idle => {
                        exchange.transition(ExchangeState::Done);
                        break;
                    }
                    SessionEvent::Error(message) => {
                        exchange.fail(&message);
                        break;
                    }
                }
            }

            exchange.finish("stream").await;
            for frame in StreamFrame::closing() {
                yield Ok(format_frame(&frame));
            }
        }
    }

    async fn next_event(&mut self) -> SessionEvent {
        let received = match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    metrics::record_backend_error("timeout");
                    return SessionEvent::Error(
                        "timed out waiting for the backend to finish".to_string(),
                    );
                }
            },
            None => self.events.recv().await,
        };

        received.unwrap_or_else(|| {
            SessionEvent::Error("backend session closed without a terminal event".to_string())
        })
    }

    fn fail(&mut self, message: &str) {
        error!(
            session_id = %self.session_id(),
            model = %self.model,
            error = %message,
            "Backend session error, returning partial reply"
        );
        metrics::record_backend_error("event");
        self.transition(ExchangeState::Failed);
    }

    fn transition(&mut self, next: ExchangeState) {
        debug!(
            session_id = %self.session_id(),
            from = self.state.as_str(),
            to = next.as_str(),
            "Exchange state change"
        );
        self.state = next;
    }

    fn release_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.release();
        }
    }

    async fn finish(&mut self, mode: &'static str) {
        self.release_subscription();
        self.session.destroy().await;
        metrics::record_request(
            mode,
            &self.model,
            self.state.as_str(),
            self.started.elapsed().as_secs_f64(),
        );
    }
}

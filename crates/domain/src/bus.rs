//! In-process delivery of post events to registered listeners.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;

use crate::events::{DomainEvent, PostEvent, PostEventKind};
use crate::listeners::{PostCreatedLogger, PostPublishedLogger, PostUpdatedLogger};

/// Error reported by a listener. Logged by the bus, never propagated.
#[derive(Debug, Error)]
#[error("listener {listener} failed: {message}")]
pub struct ListenerError {
    pub listener: &'static str,
    pub message: String,
}

impl ListenerError {
    pub fn new(listener: &'static str, message: impl Into<String>) -> Self {
        Self {
            listener,
            message: message.into(),
        }
    }
}

/// A synchronous subscriber to post events.
///
/// Listeners run after the write has committed, so nothing they do can
/// undo it. They should read only from the event itself.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Returns the name of this listener.
    fn name(&self) -> &'static str;

    /// Reacts to a single event.
    async fn handle(&self, event: &PostEvent) -> Result<(), ListenerError>;
}

/// Explicit registry mapping each event kind to its listeners.
///
/// Built once at startup and shared with the actions that publish through it.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: HashMap<PostEventKind, Vec<Arc<dyn Listener>>>,
}

impl EventBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus with the logging listener for every event kind.
    pub fn with_default_listeners() -> Self {
        let mut bus = Self::new();
        bus.listen(PostEventKind::Created, Arc::new(PostCreatedLogger));
        bus.listen(PostEventKind::Updated, Arc::new(PostUpdatedLogger));
        bus.listen(PostEventKind::Published, Arc::new(PostPublishedLogger));
        bus
    }

    /// Registers a listener for one event kind.
    pub fn listen(&mut self, kind: PostEventKind, listener: Arc<dyn Listener>) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Registers a listener for every event kind.
    pub fn listen_all(&mut self, listener: Arc<dyn Listener>) {
        for kind in PostEventKind::ALL {
            self.listen(kind, listener.clone());
        }
    }

    /// Returns the number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: PostEventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Delivers `event` to its listeners in registration order.
    ///
    /// Returns once every listener has run. A failing or panicking listener
    /// is logged and skipped; the remaining listeners still run.
    #[tracing::instrument(skip_all, fields(event_type = event.event_type(), post_id = %event.post().id))]
    pub async fn publish(&self, event: &PostEvent) {
        let Some(listeners) = self.listeners.get(&event.kind()) else {
            return;
        };

        for listener in listeners {
            match AssertUnwindSafe(listener.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(listener = listener.name(), error = %err, "event listener failed");
                }
                Err(_) => {
                    tracing::warn!(listener = listener.name(), "event listener panicked");
                }
            }
        }
    }
}

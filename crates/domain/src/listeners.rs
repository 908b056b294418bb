//! Listeners registered on the event bus.
//!
//! The logging listeners write one structured record per event. This is the
//! extension point for notifications, search indexing and cache invalidation.

use std::sync::Arc;

use async_trait::async_trait;
use common::Post;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::bus::{Listener, ListenerError};
use crate::events::{PostEvent, PostUpdatedData};

/// Logs `PostCreated` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostCreatedLogger;

#[async_trait]
impl Listener for PostCreatedLogger {
    fn name(&self) -> &'static str {
        "post_created_logger"
    }

    async fn handle(&self, event: &PostEvent) -> Result<(), ListenerError> {
        if let PostEvent::PostCreated(data) = event {
            let post = &data.post;
            tracing::info!(
                operation = "post.created",
                post_id = %post.id,
                title = %post.title,
                user_id = %post.user_id,
                created_at = %post.created_at,
                "new post created"
            );
        }
        Ok(())
    }
}

/// Logs `PostUpdated` events with the changed attributes and the
/// pre-update snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostUpdatedLogger;

impl PostUpdatedLogger {
    fn changes(&self, data: &PostUpdatedData) -> Result<Value, ListenerError> {
        let current = self.attributes(&data.post)?;
        let changes: Map<String, Value> = data
            .changed_fields()
            .into_iter()
            .map(|field| {
                let value = current.get(field.as_str()).cloned().unwrap_or(Value::Null);
                (field.as_str().to_string(), value)
            })
            .collect();
        Ok(Value::Object(changes))
    }

    fn attributes(&self, post: &Post) -> Result<Map<String, Value>, ListenerError> {
        match serde_json::to_value(post) {
            Ok(Value::Object(mut attributes)) => {
                attributes.remove("user");
                Ok(attributes)
            }
            Ok(_) => Err(ListenerError::new(self.name(), "post is not a JSON object")),
            Err(err) => Err(ListenerError::new(self.name(), err.to_string())),
        }
    }
}

#[async_trait]
impl Listener for PostUpdatedLogger {
    fn name(&self) -> &'static str {
        "post_updated_logger"
    }

    async fn handle(&self, event: &PostEvent) -> Result<(), ListenerError> {
        if let PostEvent::PostUpdated(data) = event {
            let post = &data.post;
            let changes = self.changes(data)?;
            let original = Value::Object(self.attributes(&data.original)?);
            tracing::info!(
                operation = "post.updated",
                post_id = %post.id,
                title = %post.title,
                user_id = %post.user_id,
                updated_at = %post.updated_at,
                changes = %changes,
                original_data = %original,
                "post updated"
            );
        }
        Ok(())
    }
}

/// Logs `PostPublished` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostPublishedLogger;

#[async_trait]
impl Listener for PostPublishedLogger {
    fn name(&self) -> &'static str {
        "post_published_logger"
    }

    async fn handle(&self, event: &PostEvent) -> Result<(), ListenerError> {
        if let PostEvent::PostPublished(data) = event {
            let post = &data.post;
            let Some(published_at) = post.published_at else {
                return Err(ListenerError::new(
                    self.name(),
                    "published post has no publication time",
                ));
            };
            tracing::info!(
                operation = "post.published",
                post_id = %post.id,
                title = %post.title,
                user_id = %post.user_id,
                published_at = %published_at,
                "post published"
            );
        }
        Ok(())
    }
}

/// Keeps every event it receives, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<PostEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    pub async fn events(&self) -> Vec<PostEvent> {
        self.events.lock().await.clone()
    }

    /// Returns the number of recorded events.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl Listener for RecordingListener {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn handle(&self, event: &PostEvent) -> Result<(), ListenerError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

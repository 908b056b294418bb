//! Post lifecycle actions.
//!
//! Each action is one transactional write followed by one domain event. A
//! failed write is rolled back, logged with its input and reported to the
//! caller as [`ActionError::Failed`] without the underlying store error.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use common::{NewPost, Post, PostChanges, PostId};
use serde_json::{Value, json};
use store::{EntityStore, StoreError};

use crate::bus::EventBus;
use crate::error::ActionError;
use crate::events::PostEvent;

/// The three post lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostAction {
    Create,
    Update,
    Publish,
}

impl PostAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostAction::Create => "create",
            PostAction::Update => "update",
            PostAction::Publish => "publish",
        }
    }
}

impl fmt::Display for PostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs post writes and publishes the resulting events.
pub struct PostActions<S: EntityStore> {
    store: S,
    bus: Arc<EventBus>,
}

impl<S: EntityStore> PostActions<S> {
    /// Creates the actions over a store and the bus their events go to.
    pub fn new(store: S, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the bus events are published to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Inserts a new post and emits `PostCreated`.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create(&self, input: NewPost) -> Result<Post, ActionError> {
        let data = payload(&input);

        let post = match self.insert(input).await {
            Ok(post) => post,
            Err(err) => return Err(self.failed(PostAction::Create, None, &err, data)),
        };

        self.succeeded(PostAction::Create);
        self.bus.publish(&PostEvent::created(post.clone())).await;
        Ok(post)
    }

    /// Applies a partial update and emits `PostUpdated` with the pre-update
    /// snapshot.
    ///
    /// Only the columns present in `changes` are written; the snapshot is
    /// the row as read inside the transaction, not `existing`. `existing` is
    /// not modified; the stored post is returned.
    #[tracing::instrument(skip(self, existing, changes), fields(post_id = %existing.id))]
    pub async fn update(&self, existing: &Post, changes: PostChanges) -> Result<Post, ActionError> {
        let data = payload(&changes);

        let (original, post) = match self.save(existing, &changes).await {
            Ok(saved) => saved,
            Err(err) => {
                return Err(self.failed(PostAction::Update, Some(existing.id), &err, data));
            }
        };

        self.succeeded(PostAction::Update);
        self.bus
            .publish(&PostEvent::updated(post.clone(), original))
            .await;
        Ok(post)
    }

    /// Stamps the post with the current time and emits `PostPublished`.
    ///
    /// Publishing an already published post overwrites its timestamp.
    #[tracing::instrument(skip(self, existing), fields(post_id = %existing.id))]
    pub async fn publish(&self, existing: &Post) -> Result<Post, ActionError> {
        let published_at = Utc::now();
        let data = json!({ "published_at": published_at });

        let changes = PostChanges::new().published_at(published_at);
        let post = match self.save(existing, &changes).await {
            Ok((_, post)) => post,
            Err(err) => {
                return Err(self.failed(PostAction::Publish, Some(existing.id), &err, data));
            }
        };

        self.succeeded(PostAction::Publish);
        self.bus.publish(&PostEvent::published(post.clone())).await;
        Ok(post)
    }

    async fn insert(&self, input: NewPost) -> Result<Post, StoreError> {
        let mut tx = self.store.begin().await?;
        let post = tx.insert_post(input).await?;
        tx.commit().await?;
        Ok(post)
    }

    /// Writes `changes` to the post and returns the row as it was before
    /// the write along with the stored row.
    async fn save(
        &self,
        existing: &Post,
        changes: &PostChanges,
    ) -> Result<(Post, Post), StoreError> {
        let mut tx = self.store.begin().await?;
        let original = tx
            .find_post_for_update(existing.id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "post",
                id: existing.id.as_i64(),
            })?;
        let mut stored = tx.update_post(existing.id, changes).await?;
        tx.commit().await?;

        if stored.user_id == existing.user_id {
            stored.user = existing.user.clone();
        }
        Ok((original, stored))
    }

    fn succeeded(&self, action: PostAction) {
        metrics::counter!(
            "post_actions_total",
            "action" => action.as_str(),
            "outcome" => "success"
        )
        .increment(1);
    }

    fn failed(
        &self,
        action: PostAction,
        post_id: Option<PostId>,
        err: &StoreError,
        data: Value,
    ) -> ActionError {
        metrics::counter!(
            "post_actions_total",
            "action" => action.as_str(),
            "outcome" => "failure"
        )
        .increment(1);
        tracing::error!(
            action = action.as_str(),
            post_id = post_id.map(|id| id.as_i64()),
            error = %err,
            data = %data,
            "failed to {action} post"
        );
        ActionError::Failed(action)
    }
}

fn payload<T: serde::Serialize>(input: &T) -> Value {
    serde_json::to_value(input).unwrap_or(Value::Null)
}

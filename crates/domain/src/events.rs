//! Post domain events.

use common::{Post, PostField};
use serde::Serialize;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Discriminant of [`PostEvent`], used as the listener registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostEventKind {
    Created,
    Updated,
    Published,
}

impl PostEventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [PostEventKind; 3] = [
        PostEventKind::Created,
        PostEventKind::Updated,
        PostEventKind::Published,
    ];
}

/// Events emitted after a post write commits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PostEvent {
    /// A post was created.
    PostCreated(PostCreatedData),

    /// A post's attributes were changed.
    PostUpdated(PostUpdatedData),

    /// A post was stamped with a publication time.
    PostPublished(PostPublishedData),
}

impl DomainEvent for PostEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PostEvent::PostCreated(_) => "PostCreated",
            PostEvent::PostUpdated(_) => "PostUpdated",
            PostEvent::PostPublished(_) => "PostPublished",
        }
    }
}

impl PostEvent {
    pub fn created(post: Post) -> Self {
        PostEvent::PostCreated(PostCreatedData { post })
    }

    pub fn updated(post: Post, original: Post) -> Self {
        PostEvent::PostUpdated(PostUpdatedData { post, original })
    }

    pub fn published(post: Post) -> Self {
        PostEvent::PostPublished(PostPublishedData { post })
    }

    /// Returns the registry key for this event.
    pub fn kind(&self) -> PostEventKind {
        match self {
            PostEvent::PostCreated(_) => PostEventKind::Created,
            PostEvent::PostUpdated(_) => PostEventKind::Updated,
            PostEvent::PostPublished(_) => PostEventKind::Published,
        }
    }

    /// Returns the post as committed.
    pub fn post(&self) -> &Post {
        match self {
            PostEvent::PostCreated(data) => &data.post,
            PostEvent::PostUpdated(data) => &data.post,
            PostEvent::PostPublished(data) => &data.post,
        }
    }
}

/// Data for PostCreated event.
#[derive(Debug, Clone, Serialize)]
pub struct PostCreatedData {
    pub post: Post,
}

/// Data for PostUpdated event.
#[derive(Debug, Clone, Serialize)]
pub struct PostUpdatedData {
    /// The post after the update.
    pub post: Post,

    /// The post exactly as it was before the update.
    pub original: Post,
}

impl PostUpdatedData {
    /// Attributes whose value differs between `original` and `post`.
    pub fn changed_fields(&self) -> Vec<PostField> {
        self.original.changed_fields(&self.post)
    }
}

/// Data for PostPublished event.
#[derive(Debug, Clone, Serialize)]
pub struct PostPublishedData {
    pub post: Post,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{PostChanges, PostId, UserId};

    use super::*;

    fn post() -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(3),
            title: "A".to_string(),
            content: "B".to_string(),
            user_id: UserId::new(1),
            published_at: None,
            created_at: now,
            updated_at: now,
            user: None,
        }
    }

    #[test]
    fn event_type_and_kind_agree() {
        let events = [
            PostEvent::created(post()),
            PostEvent::updated(post(), post()),
            PostEvent::published(post()),
        ];
        let kinds: Vec<_> = events.iter().map(PostEvent::kind).collect();
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();

        assert_eq!(kinds, PostEventKind::ALL.to_vec());
        assert_eq!(types, vec!["PostCreated", "PostUpdated", "PostPublished"]);
    }

    #[test]
    fn updated_event_reports_changed_fields() {
        let original = post();
        let updated = original.apply_changes(&PostChanges::new().title("Z"));
        let event = PostUpdatedData {
            post: updated,
            original,
        };

        assert_eq!(event.changed_fields(), vec![PostField::Title]);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(PostEvent::created(post())).unwrap();
        assert_eq!(json["type"], "PostCreated");
        assert_eq!(json["data"]["post"]["id"], 3);
    }
}

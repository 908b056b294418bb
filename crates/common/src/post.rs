//! Post entity and its write-side inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PostId, User, UserId};

/// A stored post.
///
/// `published_at` is the only publication state: `None` means unpublished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub user_id: UserId,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Owning user, present only when the query asked for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl Post {
    /// Returns true if the post has a publication timestamp.
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Produces the post with `changes` applied. Fields absent from
    /// `changes` keep their current value.
    pub fn apply_changes(&self, changes: &PostChanges) -> Post {
        let mut updated = self.clone();
        if let Some(title) = &changes.title {
            updated.title = title.clone();
        }
        if let Some(content) = &changes.content {
            updated.content = content.clone();
        }
        if let Some(user_id) = changes.user_id {
            if user_id != updated.user_id {
                updated.user = None;
            }
            updated.user_id = user_id;
        }
        if let Some(at) = changes.published_at {
            updated.published_at = Some(at);
        }
        updated
    }

    /// Lists the persisted attributes whose value differs between `self`
    /// (the earlier state) and `later`.
    pub fn changed_fields(&self, later: &Post) -> Vec<PostField> {
        let mut fields = Vec::new();
        if self.title != later.title {
            fields.push(PostField::Title);
        }
        if self.content != later.content {
            fields.push(PostField::Content);
        }
        if self.user_id != later.user_id {
            fields.push(PostField::UserId);
        }
        if self.published_at != later.published_at {
            fields.push(PostField::PublishedAt);
        }
        if self.updated_at != later.updated_at {
            fields.push(PostField::UpdatedAt);
        }
        fields
    }
}

/// Names of the mutable post attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostField {
    Title,
    Content,
    UserId,
    PublishedAt,
    UpdatedAt,
}

impl PostField {
    /// Returns the attribute name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostField::Title => "title",
            PostField::Content => "content",
            PostField::UserId => "user_id",
            PostField::PublishedAt => "published_at",
            PostField::UpdatedAt => "updated_at",
        }
    }
}

impl std::fmt::Display for PostField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes accepted when creating a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub user_id: UserId,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>, user_id: UserId) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            user_id,
        }
    }
}

/// Partial set of attributes for an update.
///
/// Only the supplied attributes are written; the rest of the stored row is
/// left as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,

    /// Set only by publishing, never taken from request input.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl PostChanges {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    /// Returns true if no attribute is supplied.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.user_id.is_none()
            && self.published_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(3),
            title: "A".to_string(),
            content: "B".to_string(),
            user_id: UserId::new(7),
            published_at: None,
            created_at: now,
            updated_at: now,
            user: None,
        }
    }

    #[test]
    fn apply_changes_keeps_unspecified_fields() {
        let post = sample_post();
        let updated = post.apply_changes(&PostChanges::new().title("Z"));

        assert_eq!(updated.title, "Z");
        assert_eq!(updated.content, "B");
        assert_eq!(updated.user_id, UserId::new(7));
        assert_eq!(post.title, "A");
    }

    #[test]
    fn apply_empty_changes_is_identity() {
        let post = sample_post();
        assert_eq!(post.apply_changes(&PostChanges::new()), post);
    }

    #[test]
    fn changed_fields_lists_only_differences() {
        let post = sample_post();
        let updated = post.apply_changes(&PostChanges::new().title("Z").content("B"));

        assert_eq!(post.changed_fields(&updated), vec![PostField::Title]);
    }

    #[test]
    fn published_at_change_sets_timestamp() {
        let post = sample_post();
        let at = Utc::now();
        let published = post.apply_changes(&PostChanges::new().published_at(at));

        assert!(published.is_published());
        assert_eq!(published.published_at, Some(at));
        assert!(!post.is_published());
    }

    #[test]
    fn unloaded_owner_is_not_serialized() {
        let json = serde_json::to_value(sample_post()).unwrap();
        assert!(json.get("user").is_none());
        assert_eq!(json["user_id"], 7);
        assert!(json["published_at"].is_null());
    }

    #[test]
    fn changes_serialize_only_supplied_keys() {
        let json = serde_json::to_value(PostChanges::new().content("new")).unwrap();
        assert_eq!(json, serde_json::json!({ "content": "new" }));
    }

    #[test]
    fn published_at_is_not_read_from_input() {
        let changes: PostChanges = serde_json::from_value(serde_json::json!({
            "title": "T",
            "published_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(changes, PostChanges::new().title("T"));
    }
}

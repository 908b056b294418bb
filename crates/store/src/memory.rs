use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::store::validate_post_columns;
use crate::{
    EntityStore, NewPost, NewUser, Post, PostChanges, PostId, PostQuery, Result, StoreError, StoreTransaction,
    User, UserId,
};

const POSTS_USER_FOREIGN_KEY: &str = "posts_user_id_foreign";
const USERS_EMAIL_UNIQUE: &str = "users_email_unique";

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    last_user_id: i64,
    last_post_id: i64,
}

impl Tables {
    fn insert_post(&mut self, new_post: NewPost) -> Result<Post> {
        validate_post_columns(&new_post.title, &new_post.content)?;
        self.check_owner(new_post.user_id)?;

        self.last_post_id += 1;
        let now = Utc::now();
        let post = Post {
            id: PostId::new(self.last_post_id),
            title: new_post.title,
            content: new_post.content,
            user_id: new_post.user_id,
            published_at: None,
            created_at: now,
            updated_at: now,
            user: None,
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    fn update_post(&mut self, id: PostId, changes: &PostChanges) -> Result<Post> {
        let current = self.posts.get(&id).ok_or(StoreError::NotFound {
            entity: "post",
            id: id.as_i64(),
        })?;
        let mut updated = current.apply_changes(changes);
        validate_post_columns(&updated.title, &updated.content)?;
        if changes.user_id.is_some() {
            self.check_owner(updated.user_id)?;
        }

        updated.updated_at = Utc::now();
        self.posts.insert(id, updated.clone());
        Ok(updated)
    }

    fn check_owner(&self, user_id: UserId) -> Result<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation {
                constraint: POSTS_USER_FOREIGN_KEY.to_string(),
            })
        }
    }

    fn check_email_free(&self, email: &str, except: Option<UserId>) -> Result<()> {
        let taken = self
            .users
            .values()
            .any(|u| u.email == email && Some(u.id) != except);
        if taken {
            Err(StoreError::UniqueViolation {
                constraint: USERS_EMAIL_UNIQUE.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    fail_on_write: AtomicBool,
    fail_on_commit: AtomicBool,
}

impl FailurePlan {
    fn check_write(&self) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn check_commit(&self) -> Result<()> {
        if self.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory entity store.
///
/// Mirrors the constraints of the PostgreSQL schema (non-empty title and
/// content, title length, owner foreign key, unique email) so both backends
/// accept and reject the same writes. Failures can be injected to exercise
/// callers' error paths.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<FailurePlan>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`]
    /// until reset.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.failures.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent transaction commit fail until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.failures.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of posts stored.
    pub async fn post_count(&self) -> usize {
        self.tables.read().await.posts.len()
    }

    /// Returns the total number of users stored.
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    /// Clears all users and posts.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

/// Transaction over a staged copy of the tables.
///
/// Holds the write lock for its whole lifetime, so transactions are
/// serialized and readers never observe staged rows.
struct InMemoryTransaction {
    live: OwnedRwLockWriteGuard<Tables>,
    staged: Tables,
    failures: Arc<FailurePlan>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_post(&mut self, post: NewPost) -> Result<Post> {
        self.failures.check_write()?;
        self.staged.insert_post(post)
    }

    async fn find_post_for_update(&mut self, id: PostId) -> Result<Option<Post>> {
        Ok(self.staged.posts.get(&id).cloned())
    }

    async fn update_post(&mut self, id: PostId, changes: &PostChanges) -> Result<Post> {
        self.failures.check_write()?;
        self.staged.update_post(id, changes)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            mut live,
            staged,
            failures,
        } = *self;
        failures.check_commit()?;
        *live = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let live = self.tables.clone().write_owned().await;
        let staged = live.clone();
        Ok(Box::new(InMemoryTransaction {
            live,
            staged,
            failures: self.failures.clone(),
        }))
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<_> = tables
            .posts
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        posts.sort_by(|a, b| query.compare(a, b));
        Ok(posts)
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.posts.values().filter(|p| query.matches(p)).count() as u64)
    }

    async fn delete_post(&self, id: PostId) -> Result<bool> {
        self.failures.check_write()?;
        Ok(self.tables.write().await.posts.remove(&id).is_some())
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User> {
        self.failures.check_write()?;
        let mut tables = self.tables.write().await;
        tables.check_email_free(&new_user.email, None)?;

        tables.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(tables.last_user_id),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            email_verified_at: new_user.email_verified_at,
            remember_token: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        self.failures.check_write()?;
        let mut tables = self.tables.write().await;
        tables.check_email_free(&user.email, Some(user.id))?;

        let stored = tables.users.get_mut(&user.id).ok_or(StoreError::NotFound {
            entity: "user",
            id: user.id.as_i64(),
        })?;
        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.email_verified_at = user.email_verified_at;
        stored.remember_token = user.remember_token.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        self.failures.check_write()?;
        let mut tables = self.tables.write().await;
        if tables.posts.values().any(|p| p.user_id == id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: POSTS_USER_FOREIGN_KEY.to_string(),
            });
        }
        Ok(tables.users.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityStoreExt, PostOrder, PublicationFilter};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            email_verified_at: None,
        }
    }

    async fn store_with_user() -> (InMemoryStore, User) {
        let store = InMemoryStore::new();
        let user = store.insert_user(new_user("test@example.com")).await.unwrap();
        (store, user)
    }

    async fn create_post(store: &InMemoryStore, title: &str, content: &str, owner: UserId) -> Post {
        let mut tx = store.begin().await.unwrap();
        let post = tx
            .insert_post(NewPost::new(title, content, owner))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        post
    }

    #[tokio::test]
    async fn committed_insert_is_visible() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "T", "C", user.id).await;

        assert_eq!(post.id, PostId::new(1));
        assert_eq!(post.created_at, post.updated_at);
        let found = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(found, post);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (store, user) = store_with_user().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_post(NewPost::new("T", "C", user.id)).await.unwrap();
        }

        assert_eq!(store.post_count().await, 0);
    }

    #[tokio::test]
    async fn explicit_rollback_discards_writes() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "A", "B", user.id).await;

        let mut tx = store.begin().await.unwrap();
        tx.update_post(post.id, &PostChanges::new().title("Z"))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let stored = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "A");
    }

    #[tokio::test]
    async fn update_refreshes_updated_at_and_keeps_created_at() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "A", "B", user.id).await;

        let mut tx = store.begin().await.unwrap();
        let stored = tx
            .update_post(post.id, &PostChanges::new().content("new"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stored.content, "new");
        assert_eq!(stored.title, "A");
        assert_eq!(stored.created_at, post.created_at);
        assert!(stored.updated_at >= post.updated_at);
    }

    #[tokio::test]
    async fn update_missing_post_fails() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "A", "B", user.id).await;
        store.delete_post(post.id).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_post_for_update(post.id).await.unwrap().is_none());
        let result = tx.update_post(post.id, &PostChanges::new().title("Z")).await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "post", .. })));
    }

    #[tokio::test]
    async fn update_writes_only_supplied_columns() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "A", "B", user.id).await;
        let published_at = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.update_post(post.id, &PostChanges::new().published_at(published_at))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let stored = tx
            .update_post(post.id, &PostChanges::new().title("Z"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stored.title, "Z");
        assert_eq!(stored.content, "B");
        assert_eq!(stored.published_at, Some(published_at));
    }

    #[tokio::test]
    async fn find_for_update_sees_staged_writes() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "A", "B", user.id).await;

        let mut tx = store.begin().await.unwrap();
        tx.update_post(post.id, &PostChanges::new().title("Z"))
            .await
            .unwrap();
        let staged = tx.find_post_for_update(post.id).await.unwrap().unwrap();
        assert_eq!(staged.title, "Z");
    }

    #[tokio::test]
    async fn update_to_unknown_owner_rejected() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "A", "B", user.id).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx
            .update_post(post.id, &PostChanges::new().user_id(UserId::new(99)))
            .await;
        assert!(matches!(result, Err(StoreError::ForeignKeyViolation { .. })));
    }

    #[tokio::test]
    async fn clear_empties_both_tables() {
        let (store, user) = store_with_user().await;
        create_post(&store, "A", "B", user.id).await;
        assert_eq!(store.user_count().await, 1);
        assert!(store.post_exists(PostId::new(1)).await.unwrap());

        store.clear().await;

        assert_eq!(store.user_count().await, 0);
        assert_eq!(store.post_count().await, 0);
        assert!(!store.user_exists(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn insert_requires_existing_owner() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_post(NewPost::new("T", "C", UserId::new(99))).await;

        assert!(matches!(result, Err(StoreError::ForeignKeyViolation { .. })));
    }

    #[tokio::test]
    async fn insert_rejects_empty_title() {
        let (store, user) = store_with_user().await;
        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_post(NewPost::new("", "C", user.id)).await;

        assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let (store, user) = store_with_user().await;
        store.set_fail_on_write(true);

        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_post(NewPost::new("T", "C", user.id)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        drop(tx);

        store.set_fail_on_write(false);
        create_post(&store, "T", "C", user.id).await;
        assert_eq!(store.post_count().await, 1);
    }

    #[tokio::test]
    async fn injected_commit_failure_keeps_store_unchanged() {
        let (store, user) = store_with_user().await;
        store.set_fail_on_commit(true);

        let mut tx = store.begin().await.unwrap();
        tx.insert_post(NewPost::new("T", "C", user.id)).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert_eq!(store.post_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let (store, _) = store_with_user().await;
        let result = store.insert_user(new_user("test@example.com")).await;

        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn update_user_to_taken_email_rejected() {
        let (store, _) = store_with_user().await;
        let mut other = store.insert_user(new_user("other@example.com")).await.unwrap();
        other.email = "test@example.com".to_string();

        let result = store.update_user(&other).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn delete_user_with_posts_is_restricted() {
        let (store, user) = store_with_user().await;
        let post = create_post(&store, "T", "C", user.id).await;

        let result = store.delete_user(user.id).await;
        assert!(matches!(result, Err(StoreError::ForeignKeyViolation { .. })));
        assert!(store.find_user(user.id).await.unwrap().is_some());

        store.delete_post(post.id).await.unwrap();
        assert!(store.delete_user(user.id).await.unwrap());
        assert!(!store.delete_user(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let (store, user) = store_with_user().await;
        let first = create_post(&store, "foo one", "body", user.id).await;
        let second = create_post(&store, "two", "has foo", user.id).await;
        create_post(&store, "three", "nothing", user.id).await;

        let mut tx = store.begin().await.unwrap();
        tx.update_post(first.id, &PostChanges::new().published_at(Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let found = store
            .query_posts(&PostQuery::new().search("foo").order(PostOrder::Recency))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
        assert_eq!(ids.len(), 2);

        let published = PostQuery::new().publication(PublicationFilter::Published);
        let unpublished = PostQuery::new().publication(PublicationFilter::Unpublished);
        assert_eq!(store.count_posts(&published).await.unwrap(), 1);
        assert_eq!(store.count_posts(&unpublished).await.unwrap(), 2);
        assert_eq!(store.count_posts(&PostQuery::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn find_users_skips_unknown_ids() {
        let (store, user) = store_with_user().await;
        let users = store
            .find_users(&[user.id, UserId::new(404)])
            .await
            .unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, user.id);
    }
}

use async_trait::async_trait;

use crate::{NewPost, NewUser, Post, PostChanges, PostId, PostQuery, Result, StoreError, User, UserId};

/// Maximum title length in characters, enforced by every backend.
pub const TITLE_MAX_CHARS: usize = 255;

/// An open unit of work against the store.
///
/// Writes become visible to other readers only after [`commit`]. Dropping the
/// transaction without committing discards every write made through it, so
/// an early return on any error path leaves the store untouched.
///
/// [`commit`]: StoreTransaction::commit
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts a new post and returns it with its assigned id and timestamps.
    async fn insert_post(&mut self, post: NewPost) -> Result<Post>;

    /// Reads a post and locks its row until the transaction ends.
    async fn find_post_for_update(&mut self, id: PostId) -> Result<Option<Post>>;

    /// Writes only the attributes supplied in `changes`, refreshes
    /// `updated_at` and returns the stored row.
    ///
    /// Fails with [`StoreError::NotFound`] if the row no longer exists.
    async fn update_post(&mut self, id: PostId, changes: &PostChanges) -> Result<Post>;

    /// Makes every write in this transaction durable and visible.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write in this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Persistent storage for users and posts.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Opens a transaction for post writes.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Retrieves a post by id, without its owner.
    async fn find_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Retrieves the posts matching a query, in the query's order.
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>>;

    /// Counts the posts matching a query.
    async fn count_posts(&self, query: &PostQuery) -> Result<u64>;

    /// Deletes a post. Returns false if it did not exist.
    async fn delete_post(&self, id: PostId) -> Result<bool>;

    /// Inserts a new user.
    ///
    /// Fails with [`StoreError::UniqueViolation`] if the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    /// Persists the mutable attributes of `user` and returns the stored row.
    async fn update_user(&self, user: &User) -> Result<User>;

    /// Retrieves a user by id.
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    /// Retrieves every user whose id is in `ids`. Unknown ids are skipped.
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>>;

    /// Retrieves a user by exact email address.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Deletes a user. Returns false if it did not exist.
    ///
    /// Deleting a user who still owns posts is restricted and fails with
    /// [`StoreError::ForeignKeyViolation`].
    async fn delete_user(&self, id: UserId) -> Result<bool>;
}

/// Extension trait providing convenience methods for entity stores.
#[async_trait]
pub trait EntityStoreExt: EntityStore {
    /// Checks if a user exists.
    async fn user_exists(&self, id: UserId) -> Result<bool> {
        Ok(self.find_user(id).await?.is_some())
    }

    /// Checks if a post exists.
    async fn post_exists(&self, id: PostId) -> Result<bool> {
        Ok(self.find_post(id).await?.is_some())
    }
}

// Blanket implementation for all EntityStore implementations
impl<T: EntityStore + ?Sized> EntityStoreExt for T {}

/// Checks the column constraints every post row must satisfy.
///
/// Backends with native check constraints reject the same rows themselves;
/// this is used where the backend has none.
pub fn validate_post_columns(title: &str, content: &str) -> Result<()> {
    if title.is_empty() {
        return Err(StoreError::ConstraintViolation(
            "posts.title must not be empty".to_string(),
        ));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(StoreError::ConstraintViolation(format!(
            "posts.title exceeds {TITLE_MAX_CHARS} characters"
        )));
    }
    if content.is_empty() {
        return Err(StoreError::ConstraintViolation(
            "posts.content must not be empty".to_string(),
        ));
    }
    Ok(())
}

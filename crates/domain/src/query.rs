//! Composable read queries over posts.

use std::collections::HashMap;

use common::{Post, PostId, User, UserId};
use store::{EntityStore, PostOrder, PostQuery, PublicationFilter, Result};

/// Fluent, read-only query over the post set.
///
/// Every setter returns the builder so calls chain; nothing touches the
/// store until [`execute`], [`find_by_id`] or [`count`]. A builder can be
/// executed any number of times.
///
/// ```ignore
/// let posts = PostQueryBuilder::new(&store)
///     .include_owner()
///     .only_published()
///     .search("rust")
///     .order_by_recency()
///     .execute()
///     .await?;
/// ```
///
/// [`execute`]: PostQueryBuilder::execute
/// [`find_by_id`]: PostQueryBuilder::find_by_id
/// [`count`]: PostQueryBuilder::count
pub struct PostQueryBuilder<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    query: PostQuery,
    include_owner: bool,
}

impl<S: EntityStore + ?Sized> Clone for PostQueryBuilder<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            query: self.query.clone(),
            include_owner: self.include_owner,
        }
    }
}

impl<'a, S: EntityStore + ?Sized> PostQueryBuilder<'a, S> {
    /// Starts a query matching every post in store order.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            query: PostQuery::new(),
            include_owner: false,
        }
    }

    /// Loads each post's owner alongside it.
    pub fn include_owner(mut self) -> Self {
        self.include_owner = true;
        self
    }

    /// Orders by creation time, most recent first.
    pub fn order_by_recency(mut self) -> Self {
        self.query = self.query.order(PostOrder::Recency);
        self
    }

    /// Keeps only posts with a publication time. Combined with
    /// [`only_unpublished`](Self::only_unpublished) nothing matches.
    pub fn only_published(mut self) -> Self {
        self.query = self.query.publication(PublicationFilter::Published);
        self
    }

    /// Keeps only posts without a publication time.
    pub fn only_unpublished(mut self) -> Self {
        self.query = self.query.publication(PublicationFilter::Unpublished);
        self
    }

    /// Keeps only posts whose title or content contains `term`. Repeated
    /// calls require every term.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.query = self.query.search(term);
        self
    }

    /// Returns the store query built so far.
    pub fn query(&self) -> &PostQuery {
        &self.query
    }

    /// Runs the query.
    #[tracing::instrument(skip(self), fields(query = ?self.query, include_owner = self.include_owner))]
    pub async fn execute(&self) -> Result<Vec<Post>> {
        let posts = self.store.query_posts(&self.query).await?;
        self.attach_owners(posts).await
    }

    /// Returns the post with this id if it also passes the filters applied
    /// so far.
    pub async fn find_by_id(&self, id: PostId) -> Result<Option<Post>> {
        let posts = self.store.query_posts(&self.query.clone().id(id)).await?;
        Ok(self.attach_owners(posts).await?.into_iter().next())
    }

    /// Counts the posts the query would return.
    pub async fn count(&self) -> Result<u64> {
        self.store.count_posts(&self.query).await
    }

    async fn attach_owners(&self, mut posts: Vec<Post>) -> Result<Vec<Post>> {
        if !self.include_owner || posts.is_empty() {
            return Ok(posts);
        }

        let mut ids: Vec<UserId> = posts.iter().map(|p| p.user_id).collect();
        ids.sort();
        ids.dedup();

        let owners: HashMap<UserId, User> = self
            .store
            .find_users(&ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        for post in &mut posts {
            post.user = owners.get(&post.user_id).cloned();
        }
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use common::{NewPost, NewUser, PostChanges};
    use store::InMemoryStore;

    use super::*;

    async fn seeded() -> (InMemoryStore, Vec<Post>) {
        let store = InMemoryStore::new();
        let user = store
            .insert_user(NewUser {
                name: "Author".to_string(),
                email: "author@example.com".to_string(),
                password_hash: "hash".to_string(),
                email_verified_at: None,
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut posts = Vec::new();
        for (title, content) in [("foo", "one"), ("two", "has foo"), ("three", "bar")] {
            posts.push(
                tx.insert_post(NewPost::new(title, content, user.id))
                    .await
                    .unwrap(),
            );
        }
        let published = tx
            .update_post(
                posts[2].id,
                &PostChanges::new().published_at(chrono::Utc::now()),
            )
            .await
            .unwrap();
        posts[2] = published;
        tx.commit().await.unwrap();

        (store, posts)
    }

    #[tokio::test]
    async fn execute_in_store_order_by_default() {
        let (store, posts) = seeded().await;

        let found = PostQueryBuilder::new(&store).execute().await.unwrap();

        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, posts.iter().map(|p| p.id).collect::<Vec<_>>());
        assert!(found.iter().all(|p| p.user.is_none()));
    }

    #[tokio::test]
    async fn recency_reverses_insertion_order() {
        let (store, posts) = seeded().await;

        let found = PostQueryBuilder::new(&store)
            .order_by_recency()
            .execute()
            .await
            .unwrap();

        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, posts.iter().rev().map(|p| p.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn include_owner_loads_user() {
        let (store, _) = seeded().await;

        let found = PostQueryBuilder::new(&store)
            .include_owner()
            .execute()
            .await
            .unwrap();

        assert!(
            found
                .iter()
                .all(|p| p.user.as_ref().map(|u| u.id) == Some(p.user_id))
        );
    }

    #[tokio::test]
    async fn search_matches_title_or_content() {
        let (store, posts) = seeded().await;

        let found = PostQueryBuilder::new(&store)
            .search("foo")
            .execute()
            .await
            .unwrap();

        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![posts[0].id, posts[1].id]);
    }

    #[tokio::test]
    async fn contradictory_publication_filters_match_nothing() {
        let (store, _) = seeded().await;

        let builder = PostQueryBuilder::new(&store)
            .only_unpublished()
            .only_published();

        assert!(builder.execute().await.unwrap().is_empty());
        assert_eq!(builder.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chained_searches_require_every_term() {
        let (store, posts) = seeded().await;

        let builder = PostQueryBuilder::new(&store).search("foo").search("has");
        assert_eq!(builder.query().search, vec!["foo".to_string(), "has".to_string()]);

        let found = builder.execute().await.unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![posts[1].id]);
    }

    #[tokio::test]
    async fn published_then_search_composes() {
        let (store, posts) = seeded().await;

        let builder = PostQueryBuilder::new(&store).only_published().search("bar");
        let found = builder.execute().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, posts[2].id);

        let none = builder.clone().search("foo");
        assert_eq!(none.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_by_id_honors_filters() {
        let (store, posts) = seeded().await;
        let published = PostQueryBuilder::new(&store).only_published();

        assert!(published.find_by_id(posts[0].id).await.unwrap().is_none());
        assert!(published.find_by_id(posts[2].id).await.unwrap().is_some());
        assert!(
            PostQueryBuilder::new(&store)
                .find_by_id(PostId::new(999))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn builder_is_reusable() {
        let (store, _) = seeded().await;
        let builder = PostQueryBuilder::new(&store).search("foo");

        let first = builder.execute().await.unwrap();
        let second = builder.clone().only_unpublished().execute().await.unwrap();

        assert_eq!(first, second);
    }
}

use std::cmp::Ordering;

use crate::{Post, PostId};

/// Restricts posts by publication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationFilter {
    /// Only posts with a publication timestamp.
    Published,
    /// Only posts without a publication timestamp.
    Unpublished,
}

/// Result ordering for a post query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostOrder {
    /// Ascending id, i.e. insertion order.
    #[default]
    StoreDefault,
    /// Most recently created first; ties broken by descending id.
    Recency,
}

/// Filter and ordering for reading posts.
///
/// Built with chained setters and handed to
/// [`EntityStore::query_posts`](crate::EntityStore::query_posts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostQuery {
    /// Restrict to a single post.
    pub id: Option<PostId>,

    /// Publication restrictions; a post must satisfy all of them.
    pub publication: Vec<PublicationFilter>,

    /// Literal substrings that must each occur in the title or the content.
    pub search: Vec<String>,

    /// Result ordering.
    pub order: PostOrder,
}

impl PostQuery {
    /// Creates a query matching every post in store order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the post with this id.
    pub fn id(mut self, id: PostId) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds a publication restriction. Contradictory restrictions match
    /// nothing.
    pub fn publication(mut self, filter: PublicationFilter) -> Self {
        if !self.publication.contains(&filter) {
            self.publication.push(filter);
        }
        self
    }

    /// Restricts to posts whose title or content contains `term`, in
    /// addition to any earlier search term.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search.push(term.into());
        self
    }

    /// Sets the result ordering.
    pub fn order(mut self, order: PostOrder) -> Self {
        self.order = order;
        self
    }

    /// Returns true if `post` passes every filter of this query.
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(id) = self.id
            && post.id != id
        {
            return false;
        }
        let published = post.is_published();
        let publication_ok = self.publication.iter().all(|filter| match filter {
            PublicationFilter::Published => published,
            PublicationFilter::Unpublished => !published,
        });
        publication_ok
            && self
                .search
                .iter()
                .all(|term| post.title.contains(term.as_str()) || post.content.contains(term.as_str()))
    }

    /// Compares two posts according to this query's ordering.
    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        match self.order {
            PostOrder::StoreDefault => a.id.cmp(&b.id),
            PostOrder::Recency => b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)),
        }
    }
}

/// Escapes `LIKE` wildcards so `term` matches literally.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::UserId;

    fn post(id: i64, title: &str, content: &str, published: bool) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(id),
            title: title.to_string(),
            content: content.to_string(),
            user_id: UserId::new(1),
            published_at: published.then_some(now),
            created_at: now,
            updated_at: now,
            user: None,
        }
    }

    #[test]
    fn query_builder_chain() {
        let query = PostQuery::new()
            .id(PostId::new(4))
            .publication(PublicationFilter::Published)
            .search("foo")
            .order(PostOrder::Recency);

        assert_eq!(query.id, Some(PostId::new(4)));
        assert_eq!(query.publication, vec![PublicationFilter::Published]);
        assert_eq!(query.search, vec!["foo".to_string()]);
        assert_eq!(query.order, PostOrder::Recency);
    }

    #[test]
    fn contradictory_publication_filters_match_nothing() {
        let query = PostQuery::new()
            .publication(PublicationFilter::Published)
            .publication(PublicationFilter::Unpublished);

        assert!(!query.matches(&post(1, "a", "b", true)));
        assert!(!query.matches(&post(2, "a", "b", false)));
    }

    #[test]
    fn repeated_publication_filter_is_kept_once() {
        let query = PostQuery::new()
            .publication(PublicationFilter::Published)
            .publication(PublicationFilter::Published);

        assert_eq!(query.publication, vec![PublicationFilter::Published]);
        assert!(query.matches(&post(1, "a", "b", true)));
    }

    #[test]
    fn chained_search_terms_must_all_match() {
        let query = PostQuery::new().search("foo").search("bar");

        assert!(query.matches(&post(1, "foo bar", "body", false)));
        assert!(query.matches(&post(2, "foo", "bar", false)));
        assert!(!query.matches(&post(3, "foo", "body", false)));
        assert!(!query.matches(&post(4, "bar", "body", false)));
    }

    #[test]
    fn search_matches_title_or_content() {
        let query = PostQuery::new().search("foo");

        assert!(query.matches(&post(1, "a foo title", "body", false)));
        assert!(query.matches(&post(2, "title", "body with foo", false)));
        assert!(!query.matches(&post(3, "title", "body", false)));
    }

    #[test]
    fn search_is_case_sensitive() {
        let query = PostQuery::new().search("foo");
        assert!(!query.matches(&post(1, "FOO", "Foo", false)));
    }

    #[test]
    fn publication_filters_partition_posts() {
        let posts = [post(1, "a", "b", true), post(2, "a", "b", false)];
        let published = PostQuery::new().publication(PublicationFilter::Published);
        let unpublished = PostQuery::new().publication(PublicationFilter::Unpublished);

        for p in &posts {
            assert_ne!(published.matches(p), unpublished.matches(p));
        }
    }

    #[test]
    fn recency_orders_newest_first_then_highest_id() {
        let older = Post {
            created_at: Utc::now() - Duration::seconds(10),
            ..post(5, "a", "b", false)
        };
        let newer = post(1, "a", "b", false);
        let same_time_higher_id = Post {
            created_at: newer.created_at,
            ..post(2, "a", "b", false)
        };

        let query = PostQuery::new().order(PostOrder::Recency);
        let mut posts = vec![older.clone(), newer.clone(), same_time_higher_id.clone()];
        posts.sort_by(|a, b| query.compare(a, b));

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_i64()).collect();
        assert_eq!(ids, vec![2, 1, 5]);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("foo"), "%foo%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}

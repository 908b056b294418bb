use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::query::like_pattern;
use crate::{
    EntityStore, NewPost, NewUser, Post, PostChanges, PostId, PostOrder, PostQuery, PublicationFilter, Result,
    StoreError, StoreTransaction, User, UserId,
};

/// PostgreSQL-backed entity store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL entity store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Builds the `WHERE`/`ORDER BY` tail for a post query.
    ///
    /// Placeholders are numbered in the order [`bind_filters`] binds them.
    fn filter_clause(query: &PostQuery, with_order: bool) -> String {
        let mut sql = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if query.id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND id = ${param_count}"));
        }
        for filter in &query.publication {
            match filter {
                PublicationFilter::Published => sql.push_str(" AND published_at IS NOT NULL"),
                PublicationFilter::Unpublished => sql.push_str(" AND published_at IS NULL"),
            }
        }
        for _ in &query.search {
            param_count += 1;
            sql.push_str(&format!(
                " AND (title LIKE ${param_count} OR content LIKE ${param_count})"
            ));
        }

        if with_order {
            match query.order {
                PostOrder::StoreDefault => sql.push_str(" ORDER BY id ASC"),
                PostOrder::Recency => sql.push_str(" ORDER BY created_at DESC, id DESC"),
            }
        }
        sql
    }

    fn bind_filters<'q>(
        mut sqlx_query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        query: &PostQuery,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        if let Some(id) = query.id {
            sqlx_query = sqlx_query.bind(id.as_i64());
        }
        for term in &query.search {
            sqlx_query = sqlx_query.bind(like_pattern(term));
        }
        sqlx_query
    }
}

fn row_to_post(row: PgRow) -> Result<Post> {
    Ok(Post {
        id: PostId::new(row.try_get("id")?),
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        user_id: UserId::new(row.try_get("user_id")?),
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        user: None,
    })
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        email_verified_at: row.try_get("email_verified_at")?,
        remember_token: row.try_get("remember_token")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Maps constraint and connectivity failures onto their store variants.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        let constraint = db_err.constraint().unwrap_or_default().to_string();
        match db_err.kind() {
            ErrorKind::UniqueViolation => return StoreError::UniqueViolation { constraint },
            ErrorKind::ForeignKeyViolation => {
                return StoreError::ForeignKeyViolation { constraint };
            }
            ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                return StoreError::ConstraintViolation(db_err.message().to_string());
            }
            _ => {}
        }
    }
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other),
    }
}

/// A `sqlx` transaction; dropping it uncommitted rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_post(&mut self, post: NewPost) -> Result<Post> {
        let row = sqlx::query(
            r#"
            INSERT INTO posts (title, content, user_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, user_id, published_at, created_at, updated_at
            "#,
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.user_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        row_to_post(row)
    }

    async fn find_post_for_update(&mut self, id: PostId) -> Result<Option<Post>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, title, content, user_id, published_at, created_at, updated_at
            FROM posts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        row.map(row_to_post).transpose()
    }

    async fn update_post(&mut self, id: PostId, changes: &PostChanges) -> Result<Post> {
        let mut sql = String::from("UPDATE posts SET updated_at = NOW()");
        let mut param_count = 1;
        for (column, present) in [
            ("title", changes.title.is_some()),
            ("content", changes.content.is_some()),
            ("user_id", changes.user_id.is_some()),
            ("published_at", changes.published_at.is_some()),
        ] {
            if present {
                param_count += 1;
                sql.push_str(&format!(", {column} = ${param_count}"));
            }
        }
        sql.push_str(
            " WHERE id = $1 \
             RETURNING id, title, content, user_id, published_at, created_at, updated_at",
        );

        let mut sqlx_query = sqlx::query(&sql).bind(id.as_i64());
        if let Some(ref title) = changes.title {
            sqlx_query = sqlx_query.bind(title);
        }
        if let Some(ref content) = changes.content {
            sqlx_query = sqlx_query.bind(content);
        }
        if let Some(user_id) = changes.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_i64());
        }
        if let Some(published_at) = changes.published_at {
            sqlx_query = sqlx_query.bind(published_at);
        }

        let row = sqlx_query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        match row {
            Some(row) => row_to_post(row),
            None => Err(StoreError::NotFound {
                entity: "post",
                id: id.as_i64(),
            }),
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, title, content, user_id, published_at, created_at, updated_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(row_to_post).transpose()
    }

    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let mut sql = String::from(
            "SELECT id, title, content, user_id, published_at, created_at, updated_at FROM posts",
        );
        sql.push_str(&Self::filter_clause(query, true));

        let rows = Self::bind_filters(sqlx::query(&sql), query)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().map(row_to_post).collect()
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) AS total FROM posts");
        sql.push_str(&Self::filter_clause(query, false));

        let row = Self::bind_filters(sqlx::query(&sql), query)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn delete_post(&self, id: PostId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (name, email, password, email_verified_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password, email_verified_at, remember_token, created_at, updated_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        row_to_user(row)
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, password = $4, email_verified_at = $5,
                remember_token = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, password, email_verified_at, remember_token, created_at, updated_at
            "#,
        )
        .bind(user.id.as_i64())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified_at)
        .bind(&user.remember_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        match row {
            Some(row) => row_to_user(row),
            None => Err(StoreError::NotFound {
                entity: "user",
                id: user.id.as_i64(),
            }),
        }
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, email, password, email_verified_at, remember_token, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(row_to_user).transpose()
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let raw_ids: Vec<i64> = ids.iter().map(UserId::as_i64).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, password, email_verified_at, remember_token, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(raw_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(row_to_user).collect()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, email, password, email_verified_at, remember_token, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(row_to_user).transpose()
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }
}

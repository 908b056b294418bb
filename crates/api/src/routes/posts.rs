//! Post CRUD and publish endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Post, PostId};
use domain::PostQueryBuilder;
use serde::{Deserialize, Serialize};
use store::EntityStore;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{self, PostPayload};

// -- Request types --

/// Publication state filter for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Published,
    Unpublished,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<PostStatus>,
    pub search: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct PostListResponse {
    pub success: bool,
    pub data: Vec<Post>,
}

#[derive(Serialize)]
pub struct PostResponse {
    pub data: Post,
}

#[derive(Serialize)]
pub struct PostActionResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: Post,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

// -- Handlers --

/// GET /api/posts: every post with its owner, most recent first.
#[tracing::instrument(skip(state))]
pub async fn list<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<PostListResponse>, ApiError> {
    let mut query = PostQueryBuilder::new(&state.store)
        .include_owner()
        .order_by_recency();
    query = match params.status {
        Some(PostStatus::Published) => query.only_published(),
        Some(PostStatus::Unpublished) => query.only_unpublished(),
        None => query,
    };
    if let Some(term) = params.search.filter(|t| !t.is_empty()) {
        query = query.search(term);
    }

    let posts = query.execute().await?;
    Ok(Json(PostListResponse {
        success: true,
        data: posts,
    }))
}

/// POST /api/posts: validate and create a post.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(payload): Json<PostPayload>,
) -> Result<(StatusCode, Json<PostActionResponse>), ApiError> {
    let input = validation::new_post(&state.store, &payload).await?;
    let post = state.actions.create(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(PostActionResponse {
            success: true,
            message: "Post created successfully",
            data: post,
        }),
    ))
}

/// GET /api/posts/{id}: one post with its owner.
#[tracing::instrument(skip(state))]
pub async fn show<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let id = parse_post_id(&id)?;
    let post = PostQueryBuilder::new(&state.store)
        .include_owner()
        .find_by_id(id)
        .await?
        .ok_or_else(|| post_not_found(id))?;

    Ok(Json(PostResponse { data: post }))
}

/// PUT or PATCH /api/posts/{id}: partial update.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(payload): Json<PostPayload>,
) -> Result<Json<PostActionResponse>, ApiError> {
    let post = load_post(&state, &id).await?;
    let changes = validation::post_changes(&state.store, &payload).await?;
    let updated = state.actions.update(&post, changes).await?;

    Ok(Json(PostActionResponse {
        success: true,
        message: "Post updated successfully",
        data: updated,
    }))
}

/// DELETE /api/posts/{id}: removes the post. No event is emitted.
#[tracing::instrument(skip(state))]
pub async fn destroy<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_post_id(&id)?;
    if !state.store.delete_post(id).await? {
        return Err(post_not_found(id));
    }
    tracing::info!(post_id = %id, "post deleted");

    Ok(Json(MessageResponse {
        success: true,
        message: "Post deleted successfully",
    }))
}

/// POST /api/posts/{id}/publish: stamps the post with the current time.
#[tracing::instrument(skip(state))]
pub async fn publish<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PostActionResponse>, ApiError> {
    let post = load_post(&state, &id).await?;
    let published = state.actions.publish(&post).await?;

    Ok(Json(PostActionResponse {
        success: true,
        message: "Post published successfully",
        data: published,
    }))
}

// -- Helpers --

async fn load_post<S: EntityStore>(state: &AppState<S>, raw_id: &str) -> Result<Post, ApiError> {
    let id = parse_post_id(raw_id)?;
    state
        .store
        .find_post(id)
        .await?
        .ok_or_else(|| post_not_found(id))
}

/// Ids that are not integers name no post.
fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    raw.parse::<i64>()
        .map(PostId::new)
        .map_err(|_| ApiError::NotFound(format!("Post {raw} not found")))
}

fn post_not_found(id: PostId) -> ApiError {
    ApiError::NotFound(format!("Post {id} not found"))
}

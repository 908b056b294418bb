//! User registration and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{User, UserId};
use serde::Serialize;
use store::EntityStore;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{self, RegisterPayload};

#[derive(Serialize)]
pub struct UserResponse {
    pub data: User,
}

/// POST /api/users: registers a new, unverified user.
#[tracing::instrument(skip(state, payload))]
pub async fn register<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let registration = validation::registration(&payload)?;
    let user = state
        .users
        .register(
            &registration.name,
            &registration.email,
            &registration.password,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse { data: user })))
}

/// GET /api/users/{id}
#[tracing::instrument(skip(state))]
pub async fn show<S: EntityStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let not_found = || ApiError::NotFound(format!("User {id} not found"));
    let user_id = id.parse::<i64>().map(UserId::new).map_err(|_| not_found())?;
    let user = state.users.find(user_id).await?.ok_or_else(not_found)?;

    Ok(Json(UserResponse { data: user }))
}

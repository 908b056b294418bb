//! HTTP API server for posts and users.
//!
//! Provides REST endpoints under `/api` for the post lifecycle and user
//! registration, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use store::EntityStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EntityStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api = Router::new()
        .route(
            "/posts",
            get(routes::posts::list::<S>).post(routes::posts::create::<S>),
        )
        .route(
            "/posts/{id}",
            get(routes::posts::show::<S>)
                .put(routes::posts::update::<S>)
                .patch(routes::posts::update::<S>)
                .delete(routes::posts::destroy::<S>),
        )
        .route("/posts/{id}/publish", post(routes::posts::publish::<S>))
        .route("/users", post(routes::users::register::<S>))
        .route("/users/{id}", get(routes::users::show::<S>));

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api", api)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with the logging listeners registered.
pub fn create_default_state<S: EntityStore + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, EventBus::with_default_listeners()))
}

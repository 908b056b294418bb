//! Shared application state.

use std::sync::Arc;

use domain::{EventBus, PostActions, UserService};
use store::EntityStore;

/// State shared by every handler.
pub struct AppState<S: EntityStore> {
    pub store: S,
    pub actions: PostActions<S>,
    pub users: UserService<S>,
}

impl<S: EntityStore + Clone> AppState<S> {
    /// Wires the actions and services over one store, publishing post
    /// events to `bus`.
    pub fn new(store: S, bus: EventBus) -> Self {
        Self {
            actions: PostActions::new(store.clone(), Arc::new(bus)),
            users: UserService::new(store.clone()),
            store,
        }
    }
}

//! Domain layer for the posts service.
//!
//! This crate provides:
//! - [`PostActions`]: create, update and publish, each one transaction plus
//!   one domain event
//! - [`PostEvent`] and the [`EventBus`] that delivers events to listeners
//! - the logging listeners registered by default
//! - [`PostQueryBuilder`] for composable read queries
//! - [`UserService`] for registration and credentials

pub mod actions;
pub mod bus;
pub mod error;
pub mod events;
pub mod listeners;
pub mod query;
pub mod user;

pub use actions::{PostAction, PostActions};
pub use bus::{EventBus, Listener, ListenerError};
pub use error::{ActionError, UserError};
pub use events::{
    DomainEvent, PostCreatedData, PostEvent, PostEventKind, PostPublishedData, PostUpdatedData,
};
pub use listeners::{
    PostCreatedLogger, PostPublishedLogger, PostUpdatedLogger, RecordingListener,
};
pub use query::PostQueryBuilder;
pub use user::{UserService, hash_password, verify_password};

//! Entity store for users and posts.
//!
//! [`EntityStore`] is the persistence boundary consumed by the domain layer.
//! Post writes go through a [`StoreTransaction`] obtained from
//! [`EntityStore::begin`]; dropping a transaction without committing it
//! rolls it back.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{NewPost, NewUser, Post, PostChanges, PostId, User, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{PostOrder, PostQuery, PublicationFilter};
pub use store::{EntityStore, EntityStoreExt, StoreTransaction, TITLE_MAX_CHARS};

//! Shared entity types for the posts service.
//!
//! Users and posts are plain values here. Persistence lives in the `store`
//! crate, lifecycle rules and events in `domain`.

pub mod post;
pub mod types;
pub mod user;

pub use post::{NewPost, Post, PostChanges, PostField};
pub use types::{PostId, UserId};
pub use user::{NewUser, User};

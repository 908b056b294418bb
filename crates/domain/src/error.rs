//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::actions::PostAction;

/// Outcome of a failed post action.
///
/// Carries no store detail. The cause is in the error record logged when
/// the action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Failed to {0} post")]
    Failed(PostAction),
}

impl ActionError {
    /// Returns the action that failed.
    pub fn action(&self) -> PostAction {
        match self {
            ActionError::Failed(action) => *action,
        }
    }
}

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// Another user already has this email address.
    #[error("Email already registered: {0}")]
    EmailTaken(String),

    /// The password could not be hashed.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// An error occurred in the entity store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

//! User entity.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::UserId;

/// A stored user.
///
/// The password hash and remember token never leave the process: both are
/// skipped when serializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub remember_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Returns true once the email address has been verified.
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// Attributes accepted when inserting a user.
///
/// Carries an already computed password hash, never a plaintext password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
}

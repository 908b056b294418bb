//! User registration and credentials.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::Utc;
use common::{NewUser, User, UserId};
use store::{EntityStore, StoreError};
use uuid::Uuid;

use crate::error::UserError;

/// Hashes a password with Argon2id and a random salt, in PHC string format.
pub fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::PasswordHash(e.to_string()))
}

/// Checks a password against a PHC hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Service for managing users.
pub struct UserService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers a new, unverified user.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserError> {
        let password_hash = hash_password(password)?;
        let result = self
            .store
            .insert_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
                email_verified_at: None,
            })
            .await;

        match result {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "user registered");
                Ok(user)
            }
            Err(StoreError::UniqueViolation { .. }) => Err(UserError::EmailTaken(email.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the user with this email if the password matches.
    #[tracing::instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, UserError> {
        let user = self.store.find_user_by_email(email).await?;
        Ok(user.filter(|u| verify_password(password, &u.password_hash)))
    }

    /// Retrieves a user by id.
    pub async fn find(&self, id: UserId) -> Result<Option<User>, UserError> {
        Ok(self.store.find_user(id).await?)
    }

    /// Stamps the user's email as verified now.
    pub async fn mark_email_verified(&self, user: &User) -> Result<User, UserError> {
        let verified = User {
            email_verified_at: Some(Utc::now()),
            ..user.clone()
        };
        Ok(self.store.update_user(&verified).await?)
    }

    /// Replaces the user's remember token and returns the new token.
    pub async fn issue_remember_token(&self, user: &User) -> Result<String, UserError> {
        let token = Uuid::new_v4().simple().to_string();
        let updated = User {
            remember_token: Some(token.clone()),
            ..user.clone()
        };
        self.store.update_user(&updated).await?;
        Ok(token)
    }
}

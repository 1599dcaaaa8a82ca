//! Identity store
//!
//! The capability the login flow and session restoration use to look up
//! and create user accounts. [`Database`] is the production backend.

use async_trait::async_trait;
use chrono::Utc;

use crate::data::{Database, EntityId, NewIdentity, User};
use crate::error::AppError;

/// Lookup and creation of user identities
///
/// Store failures surface as [`AppError::StoreUnavailable`].
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Return the user registered under `email`, creating it from
    /// `defaults` if there is none.
    ///
    /// When the email already exists `defaults` are discarded and the
    /// stored record is returned unchanged. The flag is `true` only for
    /// the call that created the record.
    async fn find_or_create(
        &self,
        email: &str,
        defaults: NewIdentity,
    ) -> Result<(User, bool), AppError>;

    async fn find_all(&self) -> Result<Vec<User>, AppError>;
}

#[async_trait]
impl IdentityStore for Database {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.get_user_by_email(email).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_user(id).await
    }

    async fn find_or_create(
        &self,
        email: &str,
        defaults: NewIdentity,
    ) -> Result<(User, bool), AppError> {
        let now = Utc::now();
        let candidate = User {
            id: EntityId::new().0,
            email: email.to_string(),
            password_hash: defaults.password_hash,
            role: defaults.role,
            created_at: now,
            updated_at: now,
        };

        let created = self.insert_user_if_absent(&candidate).await?;
        if created {
            return Ok((candidate, true));
        }

        let existing = self.get_user_by_email(email).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "user with email {email} vanished between insert and lookup"
            ))
        })?;

        Ok((existing, false))
    }

    async fn find_all(&self) -> Result<Vec<User>, AppError> {
        self.list_users().await
    }
}

//! Local (email + password) login strategy

use std::sync::Arc;

use axum::http::StatusCode;

use super::identity::IdentityStore;
use super::password;
use crate::data::User;
use crate::error::{AppError, INVALID_CREDENTIALS_MESSAGE};

/// Why a credential pair was refused
///
/// Only logs and metrics see the difference; callers must answer both
/// the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UserNotFound,
    BadPassword,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::UserNotFound => "user not found",
            Rejection::BadPassword => "bad password",
        }
    }

    /// Status sent to the client
    pub fn status(&self) -> StatusCode {
        StatusCode::NOT_FOUND
    }

    /// Body sent to the client
    pub fn message(&self) -> &'static str {
        INVALID_CREDENTIALS_MESSAGE
    }

    pub(crate) fn metric_label(&self) -> &'static str {
        match self {
            Rejection::UserNotFound => "user_not_found",
            Rejection::BadPassword => "bad_password",
        }
    }
}

/// Result of checking a credential pair
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Success(User),
    Rejected(Rejection),
}

/// Plaintext behind the hash checked when no account matches
const DUMMY_PASSWORD: &str = "coursegate-no-such-account";

/// Decides login success from an email and password
///
/// Every decision reads through the identity store. An unknown email is
/// still checked against a hash of the same cost, so both rejections take
/// as long as each other.
#[derive(Clone)]
pub struct LocalStrategy {
    identities: Arc<dyn IdentityStore>,
    dummy_hash: String,
}

impl LocalStrategy {
    /// # Errors
    /// Returns error if `cost` is outside the range bcrypt accepts
    pub fn new(identities: Arc<dyn IdentityStore>, cost: u32) -> Result<Self, AppError> {
        Ok(Self {
            identities,
            dummy_hash: password::hash(DUMMY_PASSWORD, cost)?,
        })
    }

    /// Check a credential pair
    ///
    /// # Errors
    /// Returns error only for store or hashing failures; wrong
    /// credentials are an `Ok(AuthOutcome::Rejected(_))`.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthOutcome, AppError> {
        let Some(user) = self.identities.find_by_email(email).await? else {
            password::verify_async(password.to_string(), self.dummy_hash.clone()).await?;
            return Ok(AuthOutcome::Rejected(Rejection::UserNotFound));
        };

        self.check_password(user, password).await
    }

    /// Verify `password` against an identity that is already loaded
    async fn check_password(&self, user: User, password: &str) -> Result<AuthOutcome, AppError> {
        let matches =
            password::verify_async(password.to_string(), user.password_hash.clone()).await?;

        if matches {
            Ok(AuthOutcome::Success(user))
        } else {
            Ok(AuthOutcome::Rejected(Rejection::BadPassword))
        }
    }
}

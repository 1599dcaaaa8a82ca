//! Login, logout and registration endpoints

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;

use super::middleware::{CurrentUser, RequestContext, RouterGuardExt};
use super::password;
use super::strategy::{AuthOutcome, Rejection};
use crate::AppState;
use crate::data::{NewIdentity, Role, User};
use crate::error::AppError;
use crate::metrics::{LOGIN_ATTEMPTS_TOTAL, REGISTRATIONS_TOTAL};

const AUTHENTICATED: &str = "Authenticated!";
const LOGGED_OUT: &str = "Logged out";

/// Role given to every self-registered account
const DEFAULT_ROLE: Role = Role::Student;

const TEACHERS: &[Role] = &[Role::Teacher];

/// Create authentication router
///
/// Routes:
/// - POST /auth/login - Check credentials and bind the session
/// - GET /auth/logout - Unbind the session
/// - POST /auth/register - Find or create a student account and bind the session
/// - GET /auth/me - Current identity (authenticated)
/// - GET /auth/protected - All identities (authenticated)
/// - GET /teacher - All identities (teachers only)
pub fn auth_router() -> Router<AppState> {
    let authenticated = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/protected", get(list_identities))
        .require_authentication();

    let teachers_only = Router::new()
        .route("/teacher", get(list_identities))
        .require_roles(TEACHERS);

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/register", post(register))
        .merge(authenticated)
        .merge(teachers_only)
}

/// Login and registration body
///
/// Both fields are optional at the parsing level so a missing one is
/// answered with "Missing credentials" rather than a JSON rejection.
#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    email: Option<String>,
    password: Option<String>,
}

impl CredentialsPayload {
    fn into_parts(self) -> Result<(String, String), AppError> {
        match (self.email, self.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Ok((email, password))
            }
            _ => Err(AppError::MissingCredentials),
        }
    }
}

// =============================================================================
// Login / Logout
// =============================================================================

/// POST /auth/login
///
/// # Steps
/// 1. Run the local strategy
/// 2. On success bind the user to the session
async fn login(
    State(state): State<AppState>,
    context: RequestContext,
    Json(payload): Json<CredentialsPayload>,
) -> Result<&'static str, AppError> {
    let (email, password) = payload.into_parts()?;

    let outcome = match state.strategy.authenticate(&email, &password).await {
        Ok(outcome) => outcome,
        Err(error) => {
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["error"]).inc();
            return Err(error);
        }
    };

    match outcome {
        AuthOutcome::Success(user) => {
            state.sessions.login(&context.session_id, &user).await?;
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
            Ok(AUTHENTICATED)
        }
        AuthOutcome::Rejected(rejection) => Err(reject(rejection)),
    }
}

fn reject(rejection: Rejection) -> AppError {
    tracing::info!(reason = rejection.reason(), "Login rejected");
    LOGIN_ATTEMPTS_TOTAL
        .with_label_values(&[rejection.metric_label()])
        .inc();
    AppError::InvalidCredentials
}

/// GET /auth/logout
async fn logout(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<&'static str, AppError> {
    state.sessions.logout(&context.session_id).await?;
    Ok(LOGGED_OUT)
}

// =============================================================================
// Registration
// =============================================================================

/// POST /auth/register
///
/// # Steps
/// 1. Hash the supplied password
/// 2. Find or create the account (role: student)
/// 3. Bind the user to the session
///
/// An existing account is reused as stored; the supplied password is ignored.
async fn register(
    State(state): State<AppState>,
    context: RequestContext,
    Json(payload): Json<CredentialsPayload>,
) -> Result<&'static str, AppError> {
    let (email, password) = payload.into_parts()?;

    let password_hash = password::hash_async(password, state.config.auth.bcrypt_cost).await?;
    let (user, created) = state
        .identities
        .find_or_create(
            &email,
            NewIdentity {
                password_hash,
                role: DEFAULT_ROLE,
            },
        )
        .await?;

    if created {
        tracing::info!(user_id = %user.id, "User registered");
        REGISTRATIONS_TOTAL.with_label_values(&["created"]).inc();
    } else {
        tracing::info!(user_id = %user.id, "Registration reused existing account");
        REGISTRATIONS_TOTAL.with_label_values(&["existing"]).inc();
    }

    state.sessions.login(&context.session_id, &user).await?;
    Ok(AUTHENTICATED)
}

// =============================================================================
// Identity views
// =============================================================================

/// GET /auth/me
async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// GET /auth/protected, GET /teacher
async fn list_identities(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.identities.find_all().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(email: Option<&str>, password: Option<&str>) -> CredentialsPayload {
        CredentialsPayload {
            email: email.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn complete_payload_is_accepted() {
        let (email, password) = payload(Some("alice@example.com"), Some("pw1"))
            .into_parts()
            .unwrap();
        assert_eq!(email, "alice@example.com");
        assert_eq!(password, "pw1");
    }

    #[test]
    fn missing_or_empty_fields_are_refused() {
        for incomplete in [
            payload(None, Some("pw1")),
            payload(Some("alice@example.com"), None),
            payload(Some(""), Some("pw1")),
            payload(Some("alice@example.com"), Some("")),
        ] {
            assert!(matches!(
                incomplete.into_parts(),
                Err(AppError::MissingCredentials)
            ));
        }
    }
}

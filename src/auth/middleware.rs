//! Authentication middleware
//!
//! Per request, in order:
//! 1. [`restore_session`] resolves the session and the identity bound to it
//! 2. [`require_auth`] refuses anonymous requests
//! 3. [`require_role`] refuses identities outside the allowed roles
//!
//! Gate 3 relies on gate 2 having run. Use [`RouterGuardExt`] rather than
//! layering the functions by hand.

use axum::{
    Router, async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use super::session::SessionId;
use crate::AppState;
use crate::data::{Role, User};
use crate::error::AppError;

/// Per-request authentication context
///
/// Inserted by [`restore_session`] into every request it sees.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: SessionId,
    pub user: Option<User>,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Restore the session and identity for a request
///
/// A failure to restore the identity (user deleted, store error) leaves the
/// request anonymous. Failing to read or write the session record itself is
/// a store failure and aborts the request.
pub async fn restore_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let sessions = &state.sessions;
    let cookie_value = jar
        .get(sessions.cookie_name())
        .map(|cookie| cookie.value().to_owned());

    let (record, is_new) = sessions.load_or_create(cookie_value.as_deref()).await?;
    let session_id = record.session_id();

    let user = match record.user_id.as_deref() {
        Some(key) => match sessions.deserialize(key).await {
            Ok(user) => Some(user),
            Err(error) => {
                tracing::warn!(
                    session_id = %session_id,
                    user_id = %key,
                    %error,
                    "Could not restore session identity; treating request as anonymous"
                );
                None
            }
        },
        None => None,
    };

    request.extensions_mut().insert(RequestContext {
        session_id: session_id.clone(),
        user,
    });

    let response = next.run(request).await;

    if is_new {
        let cookie = sessions.session_cookie(&session_id)?;
        return Ok((jar.add(cookie), response).into_response());
    }

    Ok(response)
}

/// Gate: the request must carry an authenticated identity
///
/// Inserts [`CurrentUser`] for the gates and handlers below it.
pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<RequestContext>()
        .and_then(|context| context.user.clone());

    let Some(user) = user else {
        crate::metrics::AUTHZ_DENIALS_TOTAL
            .with_label_values(&["authenticated"])
            .inc();
        return Err(AppError::NotAuthorised);
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Roles a [`require_role`] gate lets through
#[derive(Debug, Clone, Copy)]
pub struct AllowedRoles(pub &'static [Role]);

/// Gate: the authenticated identity must hold one of the allowed roles
pub async fn require_role(
    State(AllowedRoles(allowed)): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(CurrentUser(user)) = request.extensions().get::<CurrentUser>() else {
        tracing::error!(
            path = %request.uri().path(),
            "Role gate ran without the authentication gate in front of it"
        );
        return Err(AppError::Internal(anyhow::anyhow!(
            "role gate composed without authentication gate"
        )));
    };

    if !user.has_role(allowed) {
        tracing::debug!(user_id = %user.id, role = %user.role, "Role not permitted");
        crate::metrics::AUTHZ_DENIALS_TOTAL
            .with_label_values(&["role"])
            .inc();
        return Err(AppError::NotAuthorised);
    }

    Ok(next.run(request).await)
}

/// Attach the gates to every route of a router, in the right order
pub trait RouterGuardExt {
    /// Only authenticated requests reach the routes
    fn require_authentication(self) -> Self;

    /// Only authenticated requests whose role is in `roles` reach the routes
    fn require_roles(self, roles: &'static [Role]) -> Self;
}

impl<S> RouterGuardExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn require_authentication(self) -> Self {
        self.route_layer(middleware::from_fn(require_auth))
    }

    fn require_roles(self, roles: &'static [Role]) -> Self {
        // Layers added last run first: authentication wraps the role check.
        self.route_layer(middleware::from_fn_with_state(
            AllowedRoles(roles),
            require_role,
        ))
        .route_layer(middleware::from_fn(require_auth))
    }
}

/// Extractor for current authenticated user
///
/// Use in handlers behind [`require_auth`].
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(user): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", user.email)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::NotAuthorised)
    }
}

/// Extractor for the per-request context
///
/// Available on every route behind [`restore_session`].
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "request context missing; session layer not installed"
                ))
            })
    }
}

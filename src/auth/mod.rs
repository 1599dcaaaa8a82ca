//! Email/password authentication
//!
//! Handles:
//! - Password hashing and verification
//! - Identity lookup and creation
//! - The local login strategy
//! - Server-side session management
//! - Authentication and role gates

pub mod identity;
mod middleware;
pub mod password;
mod routes;
pub mod session;
pub mod strategy;

pub use identity::IdentityStore;
pub use middleware::{
    AllowedRoles, CurrentUser, RequestContext, RouterGuardExt, require_auth, require_role,
    restore_session,
};
pub use routes::auth_router;
pub use session::{SessionId, SessionManager, create_session_id};
pub use strategy::{AuthOutcome, LocalStrategy, Rejection};

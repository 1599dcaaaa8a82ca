//! Session management
//!
//! Sessions live server-side in SQLite; the browser only holds an opaque
//! random id, signed with HMAC so forged or tampered cookies are ignored.
//!
//! Cookie format: `{session_id}.{base64url(hmac_sha256(session_id))}`

use std::fmt;
use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::identity::IdentityStore;
use crate::config::AuthConfig;
use crate::data::{Database, SessionRecord, User};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Opaque session identifier (v4 UUID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept only canonical UUID text, so arbitrary client input never
    /// reaches the store as a key.
    fn parse(raw: &str) -> Option<Self> {
        uuid::Uuid::parse_str(raw)
            .ok()
            .map(|id| Self(id.hyphenated().to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a fresh, unguessable session id
///
/// Never derived from user data.
pub fn create_session_id() -> SessionId {
    SessionId(uuid::Uuid::new_v4().hyphenated().to_string())
}

/// Issues, persists and restores browser sessions
pub struct SessionManager {
    db: Arc<Database>,
    identities: Arc<dyn IdentityStore>,
    secret: String,
    cookie_name: String,
    max_age: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        identities: Arc<dyn IdentityStore>,
        auth: &AuthConfig,
        secure_cookies: bool,
    ) -> Self {
        Self {
            db,
            identities,
            secret: auth.session_secret.clone(),
            cookie_name: auth.cookie_name.clone(),
            max_age: Duration::seconds(auth.session_max_age),
            secure_cookies,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    // =========================================================================
    // Cookie signing
    // =========================================================================

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Encryption(e.to_string()))
    }

    /// Produce the signed cookie value for a session id
    pub fn sign(&self, id: &SessionId) -> Result<String, AppError> {
        let mut mac = self.mac()?;
        mac.update(id.as_str().as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        Ok(format!("{}.{}", id.as_str(), signature_b64))
    }

    /// Check a cookie value and extract the session id
    ///
    /// Returns `None` for malformed values and bad signatures.
    pub fn unsign(&self, value: &str) -> Option<SessionId> {
        let (raw_id, signature_b64) = value.rsplit_once('.')?;
        let signature = general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(raw_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        SessionId::parse(raw_id)
    }

    /// Build the `Set-Cookie` value for a newly issued session
    ///
    /// No `Max-Age`: the cookie lasts for the browser session, while the
    /// server-side record expires after `session_max_age`.
    pub fn session_cookie(&self, id: &SessionId) -> Result<Cookie<'static>, AppError> {
        let value = self.sign(id)?;

        Ok(Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .build())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve the session a request belongs to
    ///
    /// Reuses the record named by a correctly signed, unexpired cookie and
    /// pushes its expiry `session_max_age` past now. Otherwise a new anonymous session is persisted right away, under a
    /// freshly generated id rather than anything the client sent.
    ///
    /// # Returns
    /// The record and whether it was issued by this call
    pub async fn load_or_create(
        &self,
        cookie_value: Option<&str>,
    ) -> Result<(SessionRecord, bool), AppError> {
        if let Some(id) = cookie_value.and_then(|value| self.unsign(value)) {
            match self.db.get_session(id.as_str()).await? {
                Some(record) if !record.is_expired() => {
                    return Ok((self.touch(record).await?, false));
                }
                Some(_) => {
                    tracing::debug!(session_id = %id, "Session expired; issuing a new one");
                    self.db.delete_session(id.as_str()).await?;
                }
                None => {
                    tracing::debug!(session_id = %id, "Unknown session; issuing a new one");
                }
            }
        } else if cookie_value.is_some() {
            tracing::debug!("Ignoring session cookie with invalid signature");
        }

        let record = self.create().await?;
        Ok((record, true))
    }

    async fn touch(&self, mut record: SessionRecord) -> Result<SessionRecord, AppError> {
        let now = Utc::now();
        record.updated_at = now;
        record.expires_at = now + self.max_age;
        self.db
            .touch_session(&record.id, record.updated_at, record.expires_at)
            .await?;
        Ok(record)
    }

    async fn create(&self) -> Result<SessionRecord, AppError> {
        let now = Utc::now();
        let record = SessionRecord {
            id: create_session_id().0,
            user_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + self.max_age,
        };

        self.db.insert_session(&record).await?;
        crate::metrics::SESSIONS_CREATED_TOTAL.inc();
        tracing::debug!(session_id = %record.id, "Session created");

        Ok(record)
    }

    /// Key stored in the session for an identity: its id, nothing more
    pub fn serialize(&self, user: &User) -> String {
        user.id.clone()
    }

    /// Re-fetch the identity behind a stored key
    ///
    /// # Errors
    /// `NotAuthorised` when the user no longer exists; store errors as-is
    pub async fn deserialize(&self, key: &str) -> Result<User, AppError> {
        self.identities
            .find_by_id(key)
            .await?
            .ok_or(AppError::NotAuthorised)
    }

    /// Bind a user to the session (Anonymous -> Authenticated, or rebind)
    pub async fn login(&self, id: &SessionId, user: &User) -> Result<(), AppError> {
        let key = self.serialize(user);
        let now = Utc::now();
        let updated = self
            .db
            .set_session_user(id.as_str(), Some(&key), now, now + self.max_age)
            .await?;

        if !updated {
            return Err(AppError::Internal(anyhow::anyhow!(
                "session {id} disappeared before login"
            )));
        }

        tracing::info!(session_id = %id, user_id = %user.id, "Session authenticated");
        Ok(())
    }

    /// Clear the bound user (Authenticated -> Anonymous)
    ///
    /// A session that already vanished counts as logged out.
    pub async fn logout(&self, id: &SessionId) -> Result<(), AppError> {
        let now = Utc::now();
        self.db
            .set_session_user(id.as_str(), None, now, now + self.max_age)
            .await?;

        tracing::info!(session_id = %id, "Session logged out");
        Ok(())
    }

    /// Delete expired sessions
    ///
    /// # Returns
    /// Number of sessions removed
    pub async fn prune_expired(&self) -> Result<u64, AppError> {
        let removed = self.db.delete_expired_sessions(Utc::now()).await?;
        crate::metrics::SESSIONS_PRUNED_TOTAL.inc_by(removed);
        Ok(removed)
    }
}

impl SessionRecord {
    /// Typed id of a record loaded from the store
    pub fn session_id(&self) -> SessionId {
        SessionId(self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NewIdentity, Role};
    use tempfile::TempDir;

    async fn create_manager() -> (SessionManager, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("sessions.db"))
                .await
                .unwrap(),
        );
        let config = crate::config::tests::valid_config();
        let manager = SessionManager::new(db.clone(), db.clone(), &config.auth, false);
        (manager, db, temp_dir)
    }

    async fn create_user(db: &Database, email: &str) -> User {
        let (user, _) = db
            .find_or_create(
                email,
                NewIdentity {
                    password_hash: "hash".to_string(),
                    role: Role::Student,
                },
            )
            .await
            .unwrap();
        user
    }

    #[test]
    fn session_ids_are_random_v4_uuids() {
        let first = create_session_id();
        let second = create_session_id();

        assert_ne!(first, second);
        let parsed = uuid::Uuid::parse_str(first.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn signed_cookie_round_trips() {
        let (manager, _db, _dir) = create_manager().await;
        let id = create_session_id();

        let value = manager.sign(&id).unwrap();
        assert_eq!(manager.unsign(&value), Some(id));
    }

    #[tokio::test]
    async fn tampered_cookie_is_rejected() {
        let (manager, _db, _dir) = create_manager().await;
        let value = manager.sign(&create_session_id()).unwrap();
        let (_, signature) = value.rsplit_once('.').unwrap();

        let forged = format!("{}.{}", create_session_id(), signature);
        assert!(manager.unsign(&forged).is_none());
        assert!(manager.unsign("no-signature").is_none());
        assert!(manager.unsign("").is_none());
    }

    #[tokio::test]
    async fn cookie_signed_with_another_secret_is_rejected() {
        let (manager, db, _dir) = create_manager().await;
        let mut other_auth = crate::config::tests::valid_config().auth;
        other_auth.session_secret = "y".repeat(32);
        let other = SessionManager::new(db.clone(), db, &other_auth, false);

        let value = other.sign(&create_session_id()).unwrap();
        assert!(manager.unsign(&value).is_none());
    }

    #[tokio::test]
    async fn session_cookie_is_http_only() {
        let (manager, _db, _dir) = create_manager().await;
        let cookie = manager.session_cookie(&create_session_id()).unwrap();

        assert_eq!(cookie.name(), "coursegate.sid");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[tokio::test]
    async fn new_sessions_are_persisted_anonymous() {
        let (manager, db, _dir) = create_manager().await;

        let (record, is_new) = manager.load_or_create(None).await.unwrap();
        assert!(is_new);
        assert!(!record.is_authenticated());
        assert!(db.get_session(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn valid_cookie_reuses_session() {
        let (manager, _db, _dir) = create_manager().await;
        let (record, _) = manager.load_or_create(None).await.unwrap();
        let cookie = manager.sign(&record.session_id()).unwrap();

        let (again, is_new) = manager.load_or_create(Some(&cookie)).await.unwrap();
        assert!(!is_new);
        assert_eq!(again.id, record.id);
    }

    #[tokio::test]
    async fn unknown_session_gets_a_fresh_id() {
        let (manager, db, _dir) = create_manager().await;
        let stale = create_session_id();
        let cookie = manager.sign(&stale).unwrap();

        let (record, is_new) = manager.load_or_create(Some(&cookie)).await.unwrap();
        assert!(is_new);
        assert_ne!(record.id, stale.as_str());
        assert!(db.get_session(stale.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_replaced() {
        let (manager, db, _dir) = create_manager().await;
        let now = Utc::now();
        let expired = SessionRecord {
            id: create_session_id().0,
            user_id: Some("user-1".to_string()),
            created_at: now - Duration::days(2),
            updated_at: now - Duration::days(2),
            expires_at: now - Duration::days(1),
        };
        db.insert_session(&expired).await.unwrap();
        let cookie = manager.sign(&expired.session_id()).unwrap();

        let (record, is_new) = manager.load_or_create(Some(&cookie)).await.unwrap();
        assert!(is_new);
        assert_ne!(record.id, expired.id);
        assert!(!record.is_authenticated());
        assert!(db.get_session(&expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_then_logout_moves_between_states() {
        let (manager, db, _dir) = create_manager().await;
        let alice = create_user(&db, "alice@example.com").await;
        let bob = create_user(&db, "bob@example.com").await;
        let (record, _) = manager.load_or_create(None).await.unwrap();
        let id = record.session_id();

        manager.login(&id, &alice).await.unwrap();
        let stored = db.get_session(id.as_str()).await.unwrap().unwrap();
        assert_eq!(stored.user_id.as_deref(), Some(alice.id.as_str()));

        manager.login(&id, &bob).await.unwrap();
        let stored = db.get_session(id.as_str()).await.unwrap().unwrap();
        assert_eq!(stored.user_id.as_deref(), Some(bob.id.as_str()));

        manager.logout(&id).await.unwrap();
        let stored = db.get_session(id.as_str()).await.unwrap().unwrap();
        assert!(stored.user_id.is_none());
    }

    async fn insert_session_expiring_in(db: &Database, remaining: Duration) -> SessionRecord {
        let now = Utc::now();
        let record = SessionRecord {
            id: create_session_id().0,
            user_id: None,
            created_at: now - Duration::hours(23),
            updated_at: now - Duration::hours(23),
            expires_at: now + remaining,
        };
        db.insert_session(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn login_restarts_the_expiry_window() {
        let (manager, db, _dir) = create_manager().await;
        let alice = create_user(&db, "alice@example.com").await;
        let record = insert_session_expiring_in(&db, Duration::seconds(1)).await;
        let id = record.session_id();

        manager.login(&id, &alice).await.unwrap();

        let stored = db.get_session(id.as_str()).await.unwrap().unwrap();
        assert!(stored.expires_at > Utc::now() + Duration::hours(23));

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        let cookie = manager.sign(&id).unwrap();
        let (restored, is_new) = manager.load_or_create(Some(&cookie)).await.unwrap();
        assert!(!is_new);
        assert_eq!(restored.user_id.as_deref(), Some(alice.id.as_str()));
    }

    #[tokio::test]
    async fn logout_restarts_the_expiry_window() {
        let (manager, db, _dir) = create_manager().await;
        let record = insert_session_expiring_in(&db, Duration::minutes(1)).await;

        manager.logout(&record.session_id()).await.unwrap();

        let stored = db.get_session(&record.id).await.unwrap().unwrap();
        assert!(stored.expires_at > Utc::now() + Duration::hours(23));
    }

    #[tokio::test]
    async fn active_session_keeps_sliding() {
        let (manager, db, _dir) = create_manager().await;
        let record = insert_session_expiring_in(&db, Duration::minutes(1)).await;
        let cookie = manager.sign(&record.session_id()).unwrap();

        let (touched, is_new) = manager.load_or_create(Some(&cookie)).await.unwrap();

        assert!(!is_new);
        assert!(touched.expires_at > Utc::now() + Duration::hours(23));
        let stored = db.get_session(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at.timestamp(), touched.expires_at.timestamp());
    }

    #[tokio::test]
    async fn deserialize_round_trips_serialize() {
        let (manager, db, _dir) = create_manager().await;
        let alice = create_user(&db, "alice@example.com").await;

        let restored = manager
            .deserialize(&manager.serialize(&alice))
            .await
            .unwrap();
        assert_eq!(restored.id, alice.id);
        assert_eq!(restored.email, alice.email);
    }

    #[tokio::test]
    async fn deserialize_fails_cleanly_for_deleted_user() {
        let (manager, db, _dir) = create_manager().await;
        let alice = create_user(&db, "alice@example.com").await;
        let key = manager.serialize(&alice);
        db.delete_user(&alice.id).await.unwrap();

        let result = manager.deserialize(&key).await;
        assert!(matches!(result, Err(AppError::NotAuthorised)));
    }

    #[tokio::test]
    async fn prune_removes_only_expired_sessions() {
        let (manager, db, _dir) = create_manager().await;
        let (live, _) = manager.load_or_create(None).await.unwrap();
        let now = Utc::now();
        let expired = SessionRecord {
            id: create_session_id().0,
            user_id: None,
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
        };
        db.insert_session(&expired).await.unwrap();

        assert_eq!(manager.prune_expired().await.unwrap(), 1);
        assert!(db.get_session(&live.id).await.unwrap().is_some());
    }
}

//! Session tokens and freshness.
//!
//! Access and refresh tokens live in client storage. Before any
//! long-lived connection is opened the access token's `exp` claim is
//! checked; a token expiring within the refresh margin is exchanged for
//! a new pair first.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::watch;

use crate::api::endpoints::auth::{AuthApi, LoginResponse, SessionTokens};
use crate::api::error::ApiError;
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageError, StorageKey};

/// Errors from session handling.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Session expired; sign in again")]
    Expired,
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] ApiError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Synchronous cleanup run on every logout.
pub type SessionEndHook = Box<dyn Fn() + Send + Sync>;

/// Owner of the stored credentials.
pub struct SessionManager {
    storage: Arc<dyn KeyValueStore>,
    auth: Arc<dyn AuthApi>,
    refresh_margin: Duration,
    /// Serializes refreshes so concurrent callers reuse one exchange.
    refresh_lock: tokio::sync::Mutex<()>,
    end_hooks: Mutex<Vec<SessionEndHook>>,
    /// Bumped once per logout.
    ended: watch::Sender<u64>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn KeyValueStore>, auth: Arc<dyn AuthApi>, refresh_margin_secs: i64) -> Self {
        Self {
            storage,
            auth,
            refresh_margin: Duration::seconds(refresh_margin_secs),
            refresh_lock: tokio::sync::Mutex::new(()),
            end_hooks: Mutex::new(Vec::new()),
            ended: watch::channel(0).0,
        }
    }

    /// Register cleanup for in-memory state tied to the signed-in user.
    ///
    /// Hooks run inside `logout`, on whichever thread or task ends the
    /// session, so they must not block or call back into `logout`.
    pub fn on_session_end(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.end_hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    /// Receiver that changes after each logout, for async cleanup.
    pub fn session_ended(&self) -> watch::Receiver<u64> {
        self.ended.subscribe()
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Stored access token, as is.
    pub fn access_token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.storage.get(StorageKey::AuthToken)?)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.access_token(), Ok(Some(_)))
    }

    pub fn store_tokens(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
        self.storage.set(StorageKey::AuthToken, &tokens.access_token)?;
        if let Some(refresh) = &tokens.refresh_token {
            self.storage.set(StorageKey::RefreshToken, refresh)?;
        }
        Ok(())
    }

    /// Persist everything a login exchange returned.
    pub fn store_login(&self, login: &LoginResponse) -> Result<(), SessionError> {
        self.store_tokens(&login.tokens)?;
        if let Some(user) = &login.user {
            self.storage.set_json(StorageKey::User, user)?;
        }
        if let Some(role) = &login.role {
            self.storage.set(StorageKey::SelectedRole, role)?;
        }
        tracing::info!("Session stored");
        Ok(())
    }

    /// An access token that will not expire within the refresh margin.
    ///
    /// Tokens whose expiry cannot be read are returned unchanged; the
    /// backend rejects them with 401 if they are stale.
    pub async fn fresh_access_token(&self) -> Result<String, SessionError> {
        let _guard = self.refresh_lock.lock().await;

        let token = self.access_token()?.ok_or(SessionError::NotAuthenticated)?;
        if !expires_within(&token, self.refresh_margin, Utc::now()) {
            return Ok(token);
        }

        let refresh_token = self
            .storage
            .get(StorageKey::RefreshToken)?
            .ok_or(SessionError::Expired)?;

        tracing::info!("Access token expiring, refreshing");
        let tokens = match self.auth.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(error = %e, "Refresh token rejected");
                return Err(SessionError::Expired);
            }
            Err(e) => return Err(SessionError::Refresh(e)),
        };

        self.store_tokens(&tokens)?;
        Ok(tokens.access_token)
    }

    /// Forget the signed-in user.
    ///
    /// Server revocation and 401 handling end up here too, so hooks and
    /// `session_ended` receivers fire for every kind of logout.
    pub fn logout(&self) -> Result<(), SessionError> {
        self.storage.remove_all(StorageKey::session_keys())?;
        for hook in self
            .end_hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
        {
            hook();
        }
        self.ended.send_modify(|generation| *generation += 1);
        tracing::info!("Session cleared");
        Ok(())
    }
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: Option<i64>,
}

/// Expiry encoded in a JWT's `exp` claim, if readable.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Whether `token` expires before `now + margin`.
pub fn expires_within(token: &str, margin: Duration, now: DateTime<Utc>) -> bool {
    match token_expiry(token) {
        Some(exp) => exp <= now + margin,
        None => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::storage::MemoryStore;

    /// Unsigned JWT with the given expiry.
    pub(crate) fn jwt_expiring_at(exp: DateTime<Utc>) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"7","exp":{}}}"#, exp.timestamp()));
        format!("{header}.{claims}.signature")
    }

    /// Auth API returning a fixed token pair and counting refreshes.
    pub(crate) struct MockAuthApi {
        pub refreshed: AtomicUsize,
        pub next_access: String,
        pub reject: bool,
    }

    impl MockAuthApi {
        pub(crate) fn new(next_access: &str) -> Self {
            Self {
                refreshed: AtomicUsize::new(0),
                next_access: next_access.to_string(),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl AuthApi for MockAuthApi {
        async fn refresh(&self, _refresh_token: &str) -> Result<SessionTokens, ApiError> {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(ApiError::from_status(401, r#"{"code":"SECURITY_002"}"#));
            }
            Ok(SessionTokens {
                access_token: self.next_access.clone(),
                refresh_token: Some("refresh-2".into()),
            })
        }

        async fn kakao_login(&self, _code: &str, _redirect_uri: &str) -> Result<LoginResponse, ApiError> {
            Err(ApiError::Network("not used".into()))
        }
    }

    pub(crate) fn session_with(token: Option<&str>, auth: Arc<MockAuthApi>) -> Arc<SessionManager> {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        if let Some(token) = token {
            storage.set(StorageKey::AuthToken, token).unwrap();
            storage.set(StorageKey::RefreshToken, "refresh-1").unwrap();
        }
        Arc::new(SessionManager::new(storage, auth, 60))
    }

    #[test]
    fn reads_exp_claim() {
        let exp = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        assert_eq!(token_expiry(&jwt_expiring_at(exp)), Some(exp));
        assert_eq!(token_expiry("opaque-token"), None);
        assert_eq!(token_expiry("a.!!!.c"), None);
    }

    #[test]
    fn expiry_margin() {
        let now = Utc::now();
        let soon = jwt_expiring_at(now + Duration::seconds(30));
        let later = jwt_expiring_at(now + Duration::hours(1));
        assert!(expires_within(&soon, Duration::seconds(60), now));
        assert!(!expires_within(&later, Duration::seconds(60), now));
        assert!(!expires_within("opaque", Duration::seconds(60), now));
    }

    #[tokio::test]
    async fn fresh_token_returned_without_refresh() {
        let auth = Arc::new(MockAuthApi::new("unused"));
        let token = jwt_expiring_at(Utc::now() + Duration::hours(1));
        let session = session_with(Some(&token), auth.clone());

        assert_eq!(session.fresh_access_token().await.unwrap(), token);
        assert_eq!(auth.refreshed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_stored() {
        let auth = Arc::new(MockAuthApi::new("access-2"));
        let token = jwt_expiring_at(Utc::now() + Duration::seconds(10));
        let session = session_with(Some(&token), auth.clone());

        assert_eq!(session.fresh_access_token().await.unwrap(), "access-2");
        assert_eq!(auth.refreshed.load(Ordering::SeqCst), 1);
        assert_eq!(session.access_token().unwrap().as_deref(), Some("access-2"));
        assert_eq!(
            session.storage().get(StorageKey::RefreshToken).unwrap().as_deref(),
            Some("refresh-2")
        );
    }

    #[tokio::test]
    async fn rejected_refresh_means_expired() {
        let mut mock = MockAuthApi::new("x");
        mock.reject = true;
        let token = jwt_expiring_at(Utc::now() - Duration::seconds(5));
        let session = session_with(Some(&token), Arc::new(mock));

        assert!(matches!(
            session.fresh_access_token().await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn no_token_is_not_authenticated() {
        let session = session_with(None, Arc::new(MockAuthApi::new("x")));
        assert!(!session.is_authenticated());
        assert!(matches!(
            session.fresh_access_token().await,
            Err(SessionError::NotAuthenticated)
        ));
    }

    #[test]
    fn logout_clears_session_keys() {
        let session = session_with(Some("t"), Arc::new(MockAuthApi::new("x")));
        session.storage().set(StorageKey::DevMode, "true").unwrap();
        session.storage().set(StorageKey::SelectedRole, "GUARDIAN").unwrap();

        session.logout().unwrap();

        assert!(!session.is_authenticated());
        assert!(session.storage().get(StorageKey::SelectedRole).unwrap().is_none());
        assert!(session.storage().get(StorageKey::DevMode).unwrap().is_some());
    }

    #[tokio::test]
    async fn logout_runs_hooks_and_signals_receivers() {
        let session = session_with(Some("t"), Arc::new(MockAuthApi::new("x")));
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = hook_runs.clone();
        session.on_session_end(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut ended = session.session_ended();

        session.logout().unwrap();

        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
        tokio::time::timeout(std::time::Duration::from_secs(1), ended.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*ended.borrow(), 1);
    }
}

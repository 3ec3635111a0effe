//! Session store: the decoded identity behind the current bearer credential.
//!
//! A [`SessionStore`] is created once per process and handed to everything
//! that needs to know who is signed in. Changes are published on a
//! `tokio::sync::watch` channel so views can re-render when the identity
//! appears or disappears.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use serde::Deserialize;
use tokio::sync::watch;

use crate::error::{ClientError, ClientResult};
use crate::models::{UserPk, bool_or_int};

/// Opaque bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the claims carried by the token. The signature is not checked;
    /// the server remains the authority on whether the token is genuine.
    pub fn decode(&self) -> ClientResult<Identity> {
        let mut parts = self.0.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ClientError::InvalidCredential(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClientError::InvalidCredential(format!("payload is not base64url: {e}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::InvalidCredential(format!("payload is not valid claims: {e}")))?;

        if let Some(exp) = claims.exp {
            let now = chrono::Utc::now().timestamp();
            if exp <= now {
                return Err(ClientError::InvalidCredential("token has expired".to_string()));
            }
        }

        Ok(Identity {
            id: claims.id,
            login: claims.sub,
            nickname: claims.nickname.unwrap_or_default(),
            is_admin: claims.is_admin,
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    id: UserPk,
    sub: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default, deserialize_with = "bool_or_int")]
    is_admin: bool,
    #[serde(default)]
    exp: Option<i64>,
}

/// Who is signed in, as derived from the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserPk,
    pub login: String,
    pub nickname: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Identity,
    pub credential: Credential,
}

/// Where the raw token lives between runs.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> ClientResult<Option<String>>;
    fn save(&self, token: &str) -> ClientResult<()>;
    fn clear(&self) -> ClientResult<()>;
}

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> ClientResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(None),
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(e)),
        }
    }

    fn save(&self, token: &str) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ClientError::Storage)?;
            }
        }
        std::fs::write(&self.path, token).map_err(ClientError::Storage)
    }

    fn clear(&self) -> ClientResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(e)),
        }
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> ClientResult<Option<String>> {
        Ok(self.slot.lock().map(|s| s.clone()).unwrap_or_default())
    }

    fn save(&self, token: &str) -> ClientResult<()> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(token.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }
}

pub struct SessionStore {
    store: Arc<dyn CredentialStore>,
    current: watch::Sender<Option<Session>>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            current: watch::Sender::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::new()))
    }

    /// Replace the current session with the one carried by `credential`.
    pub fn login(&self, credential: Credential) -> ClientResult<Identity> {
        let identity = credential.decode()?;
        self.store.save(credential.as_str())?;
        tracing::info!(user = %identity.login, admin = identity.is_admin, "signed in");
        self.current.send_replace(Some(Session {
            identity: identity.clone(),
            credential,
        }));
        Ok(identity)
    }

    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to erase persisted credential");
        }
        if self.current.send_replace(None).is_some() {
            tracing::info!("signed out");
        }
    }

    /// Pick up the credential persisted by a previous run. A credential that
    /// no longer decodes is erased and the session stays empty.
    pub fn restore(&self) -> Option<Identity> {
        let token = match self.store.load() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "no persisted credential readable");
                return None;
            }
        };

        let credential = Credential::new(token);
        match credential.decode() {
            Ok(identity) => {
                tracing::debug!(user = %identity.login, "restored session");
                self.current.send_replace(Some(Session {
                    identity: identity.clone(),
                    credential,
                }));
                Some(identity)
            }
            Err(e) => {
                tracing::debug!(error = %e, "discarding persisted credential");
                if let Err(e) = self.store.clear() {
                    tracing::warn!(error = %e, "failed to erase persisted credential");
                }
                None
            }
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.current.borrow().as_ref().map(|s| s.identity.clone())
    }

    pub fn credential(&self) -> Option<Credential> {
        self.current.borrow().as_ref().map(|s| s.credential.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned token carrying `claims` as its payload.
    pub(crate) fn token(claims: serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.sig",
            engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            engine.encode(claims.to_string())
        )
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn decodes_claims_with_integer_admin_flag() {
        let t = token(serde_json::json!({
            "id": 7, "sub": "alice", "nickname": "Alice", "is_admin": 1, "exp": far_future()
        }));
        let identity = Credential::new(t).decode().unwrap();
        assert_eq!(
            identity,
            Identity {
                id: 7,
                login: "alice".to_string(),
                nickname: "Alice".to_string(),
                is_admin: true,
            }
        );
    }

    #[test]
    fn rejects_malformed_and_expired_tokens() {
        for bad in ["", "abc", "a.b", "a.!!!.c", "a.b.c.d"] {
            assert!(matches!(
                Credential::new(bad).decode(),
                Err(ClientError::InvalidCredential(_))
            ));
        }

        let missing_sub = token(serde_json::json!({"id": 1}));
        assert!(Credential::new(missing_sub).decode().is_err());

        let expired = token(serde_json::json!({"id": 1, "sub": "a", "exp": 1}));
        assert!(matches!(
            Credential::new(expired).decode(),
            Err(ClientError::InvalidCredential(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let c = Credential::new("secret.token.value");
        assert!(!format!("{c:?}").contains("secret"));
    }

    #[test]
    fn login_then_restore_yields_the_same_identity() {
        let persisted: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let t = token(serde_json::json!({
            "id": 3, "sub": "carol", "nickname": "Carol", "is_admin": false, "exp": far_future()
        }));

        let first = SessionStore::new(persisted.clone());
        let identity = first.login(Credential::new(t)).unwrap();

        let reloaded = SessionStore::new(persisted);
        assert_eq!(reloaded.restore(), Some(identity));
        assert!(reloaded.credential().is_some());
    }

    #[test]
    fn failed_login_leaves_state_alone() {
        let session = SessionStore::in_memory();
        assert!(session.login(Credential::new("nope")).is_err());
        assert!(session.identity().is_none());
    }

    #[test]
    fn restore_discards_an_undecodable_credential() {
        let persisted = Arc::new(MemoryCredentialStore::new());
        persisted.save("garbage").unwrap();

        let session = SessionStore::new(persisted.clone());
        assert_eq!(session.restore(), None);
        assert_eq!(persisted.load().unwrap(), None);
    }

    #[test]
    fn logout_clears_everything() {
        let persisted = Arc::new(MemoryCredentialStore::new());
        let session = SessionStore::new(persisted.clone());
        let t = token(serde_json::json!({"id": 1, "sub": "a", "exp": far_future()}));
        session.login(Credential::new(t)).unwrap();

        session.logout();
        assert!(session.identity().is_none());
        assert_eq!(persisted.load().unwrap(), None);

        // no-op the second time
        session.logout();
    }

    #[test]
    fn subscribers_see_transitions() {
        let session = SessionStore::in_memory();
        let mut rx = session.subscribe();
        assert!(rx.borrow_and_update().is_none());

        let t = token(serde_json::json!({"id": 1, "sub": "a", "exp": far_future()}));
        session.login(Credential::new(t)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|s| s.identity.id),
            Some(1)
        );

        session.logout();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ApiError;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the token has outlived the backend's access-token lifetime.
    pub fn is_expired(&self, lifetime: Duration) -> bool {
        Utc::now() > self.created_at + lifetime
    }
}

/// On-disk record of the current session.
#[derive(Debug, Clone)]
pub struct SessionFile {
    cache_dir: PathBuf,
}

impl SessionFile {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load session from disk, skipping one that has already expired
    pub fn load(&self, lifetime: Duration) -> Result<Option<SessionData>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.is_expired(lifetime) {
            debug!(username = %data.username, "Persisted session expired, ignoring");
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Save session to disk
    pub fn save(&self, data: &SessionData) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

/// Lifecycle signal published by `SessionGuard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Ended by an explicit logout.
    LoggedOut,
    /// No usable session: none was restored, or the server rejected it.
    /// The user must log in.
    LoginRequired,
}

struct Inner {
    data: Mutex<Option<SessionData>>,
    file: Option<SessionFile>,
    state: watch::Sender<SessionState>,
}

/// Owner of the bearer token. Every authenticated operation goes through it.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<Inner>,
}

impl SessionGuard {
    /// Restore the persisted session, if any, from `file`.
    pub fn new(file: SessionFile, lifetime: Duration) -> Self {
        let data = match file.load(lifetime) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to load session, login required");
                None
            }
        };
        Self::from_parts(data, Some(file))
    }

    /// A session that is never persisted.
    pub fn in_memory() -> Self {
        Self::from_parts(None, None)
    }

    fn from_parts(data: Option<SessionData>, file: Option<SessionFile>) -> Self {
        let initial = if data.is_some() {
            SessionState::Active
        } else {
            SessionState::LoginRequired
        };
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(data),
                file,
                state,
            }),
        }
    }

    pub fn has_session(&self) -> bool {
        self.inner.data.lock().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.data.lock().as_ref().map(|d| d.token.clone())
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every later state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Return the current token, or send the user back to login.
    ///
    /// An ended session keeps its state: after an explicit logout this
    /// stays `LoggedOut`.
    pub fn require_session(&self) -> Result<String, ApiError> {
        match self.token() {
            Some(token) => Ok(token),
            None => {
                if self.state() == SessionState::Active {
                    self.teardown(SessionState::LoginRequired);
                }
                Err(ApiError::NoSession)
            }
        }
    }

    /// Install a freshly issued session.
    pub fn establish(&self, data: SessionData) {
        if let Some(ref file) = self.inner.file {
            if let Err(e) = file.save(&data) {
                warn!(error = %e, "Failed to save session");
            }
        }
        info!(username = %data.username, "Session established");
        *self.inner.data.lock() = Some(data);
        self.publish(SessionState::Active);
    }

    /// The server rejected the session.
    pub fn on_unauthorized(&self) {
        self.teardown(SessionState::LoginRequired);
    }

    /// Tear down only if `token` is still the current one, so a late `401`
    /// for an old token cannot end a newer session. Returns whether it did.
    pub fn revoke(&self, token: &str) -> bool {
        let current = self.token();
        if current.as_deref() == Some(token) {
            self.on_unauthorized();
            true
        } else {
            debug!("Ignoring rejection of a token that is no longer current");
            false
        }
    }

    pub fn logout(&self) {
        self.teardown(SessionState::LoggedOut);
    }

    fn teardown(&self, next: SessionState) {
        let had_session = self.inner.data.lock().take().is_some();
        if let Some(ref file) = self.inner.file {
            if let Err(e) = file.clear() {
                warn!(error = %e, "Failed to clear persisted session");
            }
        }
        if had_session {
            info!(state = ?next, "Session ended");
        }
        self.publish(next);
    }

    fn publish(&self, next: SessionState) {
        self.inner.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFETIME_MINUTES: i64 = 30;

    #[test]
    fn test_session_data_expiry() {
        let lifetime = Duration::minutes(LIFETIME_MINUTES);
        let fresh = SessionData::new("t", "admin");
        assert!(!fresh.is_expired(lifetime));

        let mut old = SessionData::new("t", "admin");
        old.created_at = Utc::now() - Duration::minutes(LIFETIME_MINUTES + 1);
        assert!(old.is_expired(lifetime));
    }

    #[test]
    fn test_session_file_round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().to_path_buf());
        let lifetime = Duration::minutes(LIFETIME_MINUTES);

        assert!(file.load(lifetime).unwrap().is_none());

        let data = SessionData::new("tok", "admin");
        file.save(&data).unwrap();
        assert_eq!(file.load(lifetime).unwrap(), Some(data.clone()));

        let mut stale = data;
        stale.created_at = Utc::now() - Duration::hours(2);
        file.save(&stale).unwrap();
        assert!(file.load(lifetime).unwrap().is_none());

        file.clear().unwrap();
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_guard_restores_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().to_path_buf());
        file.save(&SessionData::new("tok", "admin")).unwrap();

        let guard = SessionGuard::new(file, Duration::minutes(LIFETIME_MINUTES));
        assert!(guard.has_session());
        assert_eq!(guard.state(), SessionState::Active);
        assert_eq!(guard.require_session().unwrap(), "tok");
    }

    #[test]
    fn test_fresh_guard_requires_login() {
        let guard = SessionGuard::in_memory();
        assert_eq!(guard.state(), SessionState::LoginRequired);

        assert_eq!(guard.require_session(), Err(ApiError::NoSession));
        assert_eq!(guard.state(), SessionState::LoginRequired);
    }

    #[test]
    fn test_guard_with_expired_file_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().to_path_buf());
        let mut stale = SessionData::new("tok", "admin");
        stale.created_at = Utc::now() - Duration::hours(2);
        file.save(&stale).unwrap();

        let guard = SessionGuard::new(file, Duration::minutes(LIFETIME_MINUTES));
        assert!(!guard.has_session());
        assert_eq!(guard.state(), SessionState::LoginRequired);
    }

    #[test]
    fn test_require_session_after_logout_stays_logged_out() {
        let guard = SessionGuard::in_memory();
        guard.establish(SessionData::new("tok", "admin"));
        guard.logout();
        let mut rx = guard.subscribe();

        assert_eq!(guard.require_session(), Err(ApiError::NoSession));
        assert_eq!(guard.state(), SessionState::LoggedOut);
        assert!(!rx.has_changed().unwrap());

        // Logging in again and losing the token is a login prompt
        guard.establish(SessionData::new("tok-2", "admin"));
        guard.on_unauthorized();
        assert_eq!(*rx.borrow_and_update(), SessionState::LoginRequired);
        assert_eq!(guard.require_session(), Err(ApiError::NoSession));
        assert_eq!(guard.state(), SessionState::LoginRequired);
    }

    #[test]
    fn test_unauthorized_clears_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SessionGuard::new(
            SessionFile::new(dir.path().to_path_buf()),
            Duration::minutes(LIFETIME_MINUTES),
        );
        guard.establish(SessionData::new("tok", "admin"));
        assert!(dir.path().join(SESSION_FILE).exists());

        guard.on_unauthorized();

        assert!(!guard.has_session());
        assert_eq!(guard.state(), SessionState::LoginRequired);
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_teardown_signals_once() {
        let guard = SessionGuard::in_memory();
        guard.establish(SessionData::new("tok", "admin"));
        let mut rx = guard.subscribe();

        guard.on_unauthorized();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        guard.on_unauthorized();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_revoke_ignores_stale_token() {
        let guard = SessionGuard::in_memory();
        guard.establish(SessionData::new("new-token", "admin"));

        assert!(!guard.revoke("old-token"));
        assert!(guard.has_session());

        assert!(guard.revoke("new-token"));
        assert!(!guard.has_session());
    }

    #[test]
    fn test_logout_state() {
        let guard = SessionGuard::in_memory();
        guard.establish(SessionData::new("tok", "admin"));
        guard.logout();
        assert_eq!(guard.state(), SessionState::LoggedOut);
        assert!(guard.token().is_none());
    }
}

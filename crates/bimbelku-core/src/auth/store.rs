//! Process-wide session holder.
//!
//! The authoritative session lives in memory behind a lock; every mutation
//! replaces it in one step and writes through to the persistence backend.
//! Readers never block on I/O and never see a half-updated session.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::persistence::{MemoryPersistence, SessionPersistence};
use super::session::{Session, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_KEY};
use crate::models::{Role, User};

/// Buffer size for the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Logout,
    RenewalFailed,
    SessionExpired,
    VerificationFailed,
}

impl ClearReason {
    /// Whether the user should be told their session expired (as opposed to
    /// having logged out themselves).
    pub fn is_forced(&self) -> bool {
        !matches!(self, ClearReason::Logout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    Renewed,
    Cleared(ClearReason),
}

/// Identifies one established session. Every `set` and `clear` moves the
/// store to a new id, so work started under an older id can tell the session
/// it was acting for is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

struct Slot {
    session: Option<Session>,
    id: u64,
}

struct StoreInner {
    slot: RwLock<Slot>,
    persistence: Box<dyn SessionPersistence>,
    events: broadcast::Sender<SessionEvent>,
}

/// Shared handle to the session. Clone is cheap; all clones see the same state.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    /// Hydrate from persistence. A partial or unreadable set of entries is
    /// treated as no session and wiped.
    pub fn load(persistence: Box<dyn SessionPersistence>) -> Result<Self> {
        let session = match Self::read_persisted(persistence.as_ref()) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                persistence
                    .clear(&SESSION_KEYS)
                    .context("Failed to wipe unreadable session")?;
                None
            }
        };
        debug!(has_session = session.is_some(), "Credential store loaded");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(StoreInner {
                slot: RwLock::new(Slot { session, id: 0 }),
                persistence,
                events,
            }),
        })
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                slot: RwLock::new(Slot { session: None, id: 0 }),
                persistence: Box::new(MemoryPersistence::new()),
                events,
            }),
        }
    }

    fn read_persisted(persistence: &dyn SessionPersistence) -> Result<Option<Session>> {
        let access = persistence.read(ACCESS_TOKEN_KEY)?;
        let refresh = persistence.read(REFRESH_TOKEN_KEY)?;
        let user = persistence.read(USER_KEY)?;

        match (access, user) {
            (Some(access_token), Some(user)) => {
                let user: User = serde_json::from_str(&user)
                    .context("Failed to parse stored user profile")?;
                Ok(Some(Session {
                    access_token,
                    refresh_token: refresh,
                    user,
                }))
            }
            (None, None) if refresh.is_none() => Ok(None),
            _ => Err(anyhow::anyhow!("Stored session is incomplete")),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.inner.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.inner.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn get(&self) -> Option<Session> {
        self.read().session.clone()
    }

    /// The session together with its id, read in one step.
    pub fn snapshot(&self) -> (Option<Session>, SessionId) {
        let slot = self.read();
        (slot.session.clone(), SessionId(slot.id))
    }

    pub fn session_id(&self) -> SessionId {
        SessionId(self.read().id)
    }

    /// A session is valid iff it has both an access token and a user.
    pub fn is_valid(&self) -> bool {
        self.read().session.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().session.as_ref().map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().session.as_ref().and_then(|s| s.refresh_token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.read().session.as_ref().map(|s| s.user.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.read().session.as_ref().map(|s| s.user.role)
    }

    /// Install a new session, persisting all of its entries together.
    /// On a persistence failure the previous state is left untouched.
    pub fn set(&self, session: Session) -> Result<()> {
        let user = serde_json::to_string(&session.user)?;

        {
            let mut slot = self.write();
            let mut entries = vec![
                (ACCESS_TOKEN_KEY, session.access_token.as_str()),
                (USER_KEY, user.as_str()),
            ];
            let mut removed = Vec::new();
            match session.refresh_token.as_deref() {
                Some(refresh) => entries.push((REFRESH_TOKEN_KEY, refresh)),
                None => removed.push(REFRESH_TOKEN_KEY),
            }
            self.inner
                .persistence
                .replace(&entries, &removed)
                .context("Failed to persist session")?;
            slot.session = Some(session);
            slot.id += 1;
        }

        info!("Session established");
        self.notify(SessionEvent::Established);
        Ok(())
    }

    /// Swap in a renewed access token, keeping the refresh token and user.
    /// Returns false when the session `id` refers to is no longer installed.
    pub fn replace_access_token(&self, id: SessionId, access_token: String) -> bool {
        {
            let mut slot = self.write();
            if slot.id != id.0 {
                return false;
            }
            let Some(session) = slot.session.as_mut() else {
                return false;
            };
            if let Err(e) = self
                .inner
                .persistence
                .write(&[(ACCESS_TOKEN_KEY, access_token.as_str())])
            {
                warn!(error = %e, "Failed to persist renewed access token");
            }
            session.access_token = access_token;
        }

        debug!("Access token renewed");
        self.notify(SessionEvent::Renewed);
        true
    }

    /// Drop the whole session. The in-memory state is cleared even if the
    /// backend fails to delete its entries.
    pub fn clear(&self, reason: ClearReason) {
        let mut slot = self.write();
        self.clear_locked(&mut slot, reason);
    }

    /// Drop the session only if it is still the one `id` refers to.
    /// Returns whether it was cleared.
    pub fn clear_if(&self, id: SessionId, reason: ClearReason) -> bool {
        let mut slot = self.write();
        if slot.id != id.0 {
            debug!(reason = ?reason, "Session replaced since the request started, not clearing");
            return false;
        }
        self.clear_locked(&mut slot, reason)
    }

    fn clear_locked(&self, slot: &mut Slot, reason: ClearReason) -> bool {
        let had_session = slot.session.take().is_some();
        slot.id += 1;
        if let Err(e) = self.inner.persistence.clear(&SESSION_KEYS) {
            warn!(error = %e, "Failed to remove persisted session");
        }

        if had_session {
            info!(reason = ?reason, "Session cleared");
            self.notify(SessionEvent::Cleared(reason));
        }
        had_session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::testing::{fixture_session, fixture_user};

    fn store_over(persistence: &MemoryPersistence) -> CredentialStore {
        CredentialStore::load(Box::new(persistence.clone())).unwrap()
    }

    #[test]
    fn test_empty_on_first_run() {
        let store = store_over(&MemoryPersistence::new());
        assert!(store.get().is_none());
        assert!(!store.is_valid());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_set_persists_all_three_entries() {
        let persistence = MemoryPersistence::new();
        let store = store_over(&persistence);
        store.set(fixture_session("a1", "r1", Role::Siswa)).unwrap();

        let saved = persistence.snapshot();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[ACCESS_TOKEN_KEY], "a1");
        assert_eq!(saved[REFRESH_TOKEN_KEY], "r1");
        let user: User = serde_json::from_str(&saved[USER_KEY]).unwrap();
        assert_eq!(user, fixture_user(Role::Siswa));
    }

    #[test]
    fn test_reload_restores_session() {
        let persistence = MemoryPersistence::new();
        store_over(&persistence)
            .set(fixture_session("a1", "r1", Role::Admin))
            .unwrap();

        let reloaded = store_over(&persistence);
        assert_eq!(reloaded.get(), Some(fixture_session("a1", "r1", Role::Admin)));
    }

    #[test]
    fn test_partial_entries_are_discarded() {
        let persistence = MemoryPersistence::new();
        persistence.write(&[(ACCESS_TOKEN_KEY, "a1"), (REFRESH_TOKEN_KEY, "r1")]).unwrap();

        let store = store_over(&persistence);
        assert!(store.get().is_none());
        assert!(persistence.snapshot().is_empty());
    }

    #[test]
    fn test_corrupt_user_is_discarded() {
        let persistence = MemoryPersistence::new();
        persistence
            .write(&[(ACCESS_TOKEN_KEY, "a1"), (USER_KEY, "{\"role\": \"guru\"}")])
            .unwrap();

        let store = store_over(&persistence);
        assert!(store.get().is_none());
        assert!(persistence.snapshot().is_empty());
    }

    #[test]
    fn test_session_without_refresh_token_is_valid() {
        let persistence = MemoryPersistence::new();
        let user = serde_json::to_string(&fixture_user(Role::Admin)).unwrap();
        persistence.write(&[(ACCESS_TOKEN_KEY, "a1"), (USER_KEY, user.as_str())]).unwrap();

        let store = store_over(&persistence);
        assert!(store.is_valid());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_replace_access_token_keeps_the_rest() {
        let persistence = MemoryPersistence::new();
        let store = store_over(&persistence);
        store.set(fixture_session("a1", "r1", Role::Admin)).unwrap();

        assert!(store.replace_access_token(store.session_id(), "a2".into()));
        let session = store.get().unwrap();
        assert_eq!(session.access_token, "a2");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.user, fixture_user(Role::Admin));
        assert_eq!(persistence.snapshot()[ACCESS_TOKEN_KEY], "a2");
    }

    #[test]
    fn test_replace_without_session_is_noop() {
        let persistence = MemoryPersistence::new();
        let store = store_over(&persistence);
        assert!(!store.replace_access_token(store.session_id(), "a2".into()));
        assert!(store.get().is_none());
        assert!(persistence.snapshot().is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let persistence = MemoryPersistence::new();
        let store = store_over(&persistence);
        store.set(fixture_session("a1", "r1", Role::Siswa)).unwrap();

        let other_handle = store.clone();
        store.clear(ClearReason::Logout);

        assert!(other_handle.get().is_none());
        assert!(other_handle.access_token().is_none());
        assert!(other_handle.refresh_token().is_none());
        assert!(other_handle.user().is_none());
        assert!(persistence.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let store = CredentialStore::in_memory();
        let mut events = store.subscribe();

        store.set(fixture_session("a1", "r1", Role::Siswa)).unwrap();
        store.replace_access_token(store.session_id(), "a2".into());
        store.clear(ClearReason::RenewalFailed);
        // Clearing an empty store is silent
        store.clear(ClearReason::Logout);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Established);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Renewed);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Cleared(ClearReason::RenewalFailed)
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_stale_id_cannot_touch_a_newer_session() {
        let store = CredentialStore::in_memory();
        store.set(fixture_session("a1", "r1", Role::Admin)).unwrap();
        let first = store.session_id();

        store.clear(ClearReason::Logout);
        store.set(fixture_session("b1", "rb", Role::Siswa)).unwrap();

        assert!(!store.replace_access_token(first, "a2".into()));
        assert!(!store.clear_if(first, ClearReason::RenewalFailed));
        assert_eq!(store.get(), Some(fixture_session("b1", "rb", Role::Siswa)));

        assert!(store.clear_if(store.session_id(), ClearReason::SessionExpired));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_same_session_keeps_its_id_across_renewal() {
        let store = CredentialStore::in_memory();
        store.set(fixture_session("a1", "r1", Role::Admin)).unwrap();
        let id = store.session_id();

        assert!(store.replace_access_token(id, "a2".into()));
        assert_eq!(store.session_id(), id);
        assert_eq!(store.snapshot(), (Some(fixture_session("a2", "r1", Role::Admin)), id));
    }

    /// Backend that rejects every change while `broken` is set.
    struct FlakyPersistence {
        inner: MemoryPersistence,
        broken: Arc<AtomicBool>,
    }

    impl SessionPersistence for FlakyPersistence {
        fn read(&self, key: &str) -> Result<Option<String>> {
            self.inner.read(key)
        }

        fn replace(&self, entries: &[(&str, &str)], keys: &[&str]) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                anyhow::bail!("keychain locked");
            }
            self.inner.replace(entries, keys)
        }
    }

    #[test]
    fn test_failed_write_leaves_previous_session_whole() {
        let persistence = MemoryPersistence::new();
        let broken = Arc::new(AtomicBool::new(false));
        let store = CredentialStore::load(Box::new(FlakyPersistence {
            inner: persistence.clone(),
            broken: broken.clone(),
        }))
        .unwrap();
        store.set(fixture_session("a1", "r1", Role::Admin)).unwrap();
        let before = persistence.snapshot();

        broken.store(true, Ordering::SeqCst);
        let mut replacement = fixture_session("b1", "unused", Role::Siswa);
        replacement.refresh_token = None;
        assert!(store.set(replacement).is_err());

        // The refresh token and every other entry are untouched
        assert_eq!(persistence.snapshot(), before);
        assert_eq!(store.get(), Some(fixture_session("a1", "r1", Role::Admin)));
        assert_eq!(store_over(&persistence).get(), Some(fixture_session("a1", "r1", Role::Admin)));
    }

    #[test]
    fn test_clear_reason_is_forced() {
        assert!(!ClearReason::Logout.is_forced());
        assert!(ClearReason::RenewalFailed.is_forced());
        assert!(ClearReason::SessionExpired.is_forced());
    }
}

use crate::session::{SessionAccountant, TicketReady};
use lru::LruCache;
use parking_lot::Mutex;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_SESSIONS: usize = 4096;
const SESSION_ID_LEN: usize = 24;

pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Everything one browser session owns.
#[derive(Debug, Default)]
pub struct SessionState {
    pub accountant: SessionAccountant,
    pending_ticket: Option<TicketReady>,
}

impl SessionState {
    /// Holds a ticket until the client downloads it; a newer ticket replaces
    /// an unclaimed one.
    pub fn stash_ticket(&mut self, ticket: TicketReady) {
        self.pending_ticket = Some(ticket);
    }

    pub fn take_ticket(&mut self) -> Option<TicketReady> {
        self.pending_ticket.take()
    }

    pub fn has_pending_ticket(&self) -> bool {
        self.pending_ticket.is_some()
    }
}

/// Bounded map of live sessions. The least recently used session is dropped
/// once `capacity` is reached.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<LruCache<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Resolves `session_id` to a live session.
    ///
    /// Only ids this store handed out and still holds are honoured; anything
    /// else gets a fresh server-generated id. Returns the id actually in use
    /// and whether it differs from the one supplied.
    pub fn open(&self, session_id: Option<&str>) -> (String, SessionHandle, bool) {
        let mut guard = self.sessions.lock();
        if let Some(id) = session_id.filter(|id| is_valid_session_id(id)) {
            if let Some(handle) = guard.get(id) {
                return (id.to_string(), Arc::clone(handle), false);
            }
        }
        let id = loop {
            let candidate = generate_session_id();
            if !guard.contains(&candidate) {
                break candidate;
            }
        };
        let handle: SessionHandle = Arc::new(Mutex::new(SessionState::default()));
        if let Some((evicted, _)) = guard.push(id.clone(), Arc::clone(&handle)) {
            debug!(session = %evicted, "evicted least recently used session");
        }
        (id, handle, true)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

fn is_valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_alphanumeric() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(is_valid_session_id(&id));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn unknown_or_missing_ids_get_a_new_session() {
        let store = SessionStore::new(8);
        let (id, _, issued) = store.open(None);
        assert!(issued);
        assert!(is_valid_session_id(&id));

        let (other, _, issued) = store.open(Some("not a valid id"));
        assert!(issued);
        assert_ne!(other, id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn known_ids_resolve_to_the_same_state() {
        let store = SessionStore::new(8);
        let (id, handle, _) = store.open(None);
        handle.lock().accountant.record_toxic("first");
        let (again, handle, issued) = store.open(Some(&id));
        assert!(!issued);
        assert_eq!(again, id);
        assert_eq!(handle.lock().accountant.toxic_count(), 1);
    }

    #[test]
    fn unknown_ids_are_never_adopted() {
        let store = SessionStore::new(8);
        let planted = generate_session_id();
        let (resolved, handle, issued) = store.open(Some(&planted));
        assert!(issued);
        assert_ne!(resolved, planted);
        assert!(store.get(&planted).is_none());

        handle.lock().accountant.record_toxic("mine");
        let (again, handle, issued) = store.open(Some(&resolved));
        assert!(!issued);
        assert_eq!(again, resolved);
        assert_eq!(handle.lock().accountant.toxic_count(), 1);
    }

    #[test]
    fn sessions_do_not_share_state() {
        let store = SessionStore::new(8);
        let (_, alice, _) = store.open(None);
        let (_, bob, _) = store.open(None);
        alice.lock().accountant.record_toxic("a");
        alice.lock().accountant.record_toxic("b");
        assert_eq!(bob.lock().accountant.toxic_count(), 0);
        assert!(bob.lock().accountant.record_toxic("c").is_none());
    }

    #[test]
    fn least_recently_used_session_is_evicted() {
        let store = SessionStore::new(2);
        let (first, _, _) = store.open(None);
        let (second, _, _) = store.open(None);
        store.open(Some(&first));
        let (third, _, _) = store.open(None);
        assert_eq!(store.len(), 2);
        assert!(store.get(&first).is_some());
        assert!(store.get(&second).is_none());
        assert!(store.get(&third).is_some());
    }

    #[test]
    fn pending_ticket_is_taken_once() {
        let mut state = SessionState::default();
        for msg in ["x", "y"] {
            state.accountant.record_toxic(msg);
        }
        let ready = state.accountant.record_toxic("z").unwrap();
        state.stash_ticket(ready);
        assert!(state.has_pending_ticket());
        assert!(state.take_ticket().is_some());
        assert!(state.take_ticket().is_none());
    }
}

//! In-memory registry of browser sessions.
//!
//! Each session sits behind its own mutex. Handlers lock it only for the
//! synchronous steps of a turn ([`begin_turn`](calctutor::tutor::TutorSession::begin_turn),
//! [`finish_turn`](calctutor::tutor::TutorSession::finish_turn)), never across
//! the model call. A session is dropped when it is closed explicitly or once
//! it has gone unused for longer than the registry's idle timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use calctutor::tutor::{Tutor, TutorSession};
use tracing::debug;

pub type SharedSession = Arc<Mutex<TutorSession>>;

/// Idle time after which a session may be evicted.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Generate a unique, URL-safe session ID.
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ses-{ts:x}-{count:04x}")
}

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a session on `tutor` and return its ID. Idle sessions are
    /// evicted first.
    pub fn create(&self, tutor: &Tutor) -> (String, SharedSession) {
        let now = Instant::now();
        let id = generate_session_id();
        let session = Arc::new(Mutex::new(tutor.new_session()));

        let mut entries = self.entries();
        let evicted = prune(&mut entries, now, self.idle_timeout);
        if evicted > 0 {
            debug!("Evicted {evicted} idle session(s)");
        }
        entries.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_used: now,
            },
        );
        (id, session)
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &str) -> Option<SharedSession> {
        let mut entries = self.entries();
        let entry = entries.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    /// Close a session. Returns `false` if it did not exist.
    pub fn remove(&self, id: &str) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Evict every session unused for longer than the idle timeout as of
    /// `now`. Sessions with a turn in flight are kept. Returns the number
    /// evicted.
    pub fn prune_idle(&self, now: Instant) -> usize {
        prune(&mut self.entries(), now, self.idle_timeout)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune(entries: &mut HashMap<String, Entry>, now: Instant, idle_timeout: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| {
        if now.saturating_duration_since(entry.last_used) <= idle_timeout {
            return true;
        }
        // A locked session is mid-turn; keep it for the next sweep.
        match entry.session.try_lock() {
            Ok(session) => session.is_pending(),
            Err(_) => true,
        }
    });
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calctutor::config::TutorConfig;

    fn tutor(dir: &tempfile::TempDir) -> Tutor {
        let config = TutorConfig::default().with_catalog_path(dir.path().join("missing.json"));
        Tutor::from_config(config).unwrap()
    }

    #[test]
    fn session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("ses-"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let tutor = tutor(&dir);
        let registry = SessionRegistry::with_idle_timeout(Duration::from_secs(60));
        let (a, _) = registry.create(&tutor);
        let (b, _) = registry.create(&tutor);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.prune_idle(Instant::now()), 0);
        assert_eq!(
            registry.prune_idle(Instant::now() + Duration::from_secs(61)),
            2
        );
        assert!(registry.get(&a).is_none());
        assert!(registry.get(&b).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn create_evicts_only_unused_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let tutor = tutor(&dir);
        let registry = SessionRegistry::with_idle_timeout(Duration::from_millis(50));
        let (used, _) = registry.create(&tutor);
        let (idle, _) = registry.create(&tutor);

        std::thread::sleep(Duration::from_millis(80));
        assert!(registry.get(&used).is_some());
        let (fresh, _) = registry.create(&tutor);

        assert!(registry.get(&used).is_some());
        assert!(registry.get(&fresh).is_some());
        assert!(registry.get(&idle).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn locked_session_survives_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let tutor = tutor(&dir);
        let registry = SessionRegistry::with_idle_timeout(Duration::from_secs(1));
        let (id, session) = registry.create(&tutor);

        let _guard = session.lock().unwrap();
        assert_eq!(
            registry.prune_idle(Instant::now() + Duration::from_secs(5)),
            0
        );
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
    }
}

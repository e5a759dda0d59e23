use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockTable = DashMap<String, Arc<RwLock<()>>>;

/// Keyed reader/writer locks. An entry exists only while some task holds
/// or waits on it.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Arc<LockTable>,
}

/// Lock guard that drops its table entry once the last holder releases.
pub struct KeyedGuard<G> {
    guard: Option<G>,
    key: String,
    table: Arc<LockTable>,
}

pub type KeyedReadGuard = KeyedGuard<OwnedRwLockReadGuard<()>>;
pub type KeyedWriteGuard = KeyedGuard<OwnedRwLockWriteGuard<()>>;

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn wrap<G>(&self, key: &str, guard: G) -> KeyedGuard<G> {
        KeyedGuard {
            guard: Some(guard),
            key: key.to_string(),
            table: Arc::clone(&self.locks),
        }
    }

    pub async fn read(&self, key: &str) -> KeyedReadGuard {
        let guard = self.handle(key).read_owned().await;
        self.wrap(key, guard)
    }

    pub async fn write(&self, key: &str) -> KeyedWriteGuard {
        let guard = self.handle(key).write_owned().await;
        self.wrap(key, guard)
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<G> Drop for KeyedGuard<G> {
    fn drop(&mut self) {
        // Owned guards keep a handle clone; release it before counting.
        self.guard.take();
        // Waiters hold their own clone, so the entry survives until they finish.
        self.table
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

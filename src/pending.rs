use std::{
    collections::HashMap,
    sync::Mutex,
    time::{
        Duration,
        Instant,
    },
};

use tracing::debug;

use crate::translator::Translation;

/// (conversation id, message id). Keying per message keeps two quick
/// requests in the same chat independently confirmable.
pub type PendingKey = (i64, i64);

#[derive(Debug, Clone)]
struct PendingEntry {
    translation: Translation,
    created_at: Instant,
}

/// In-memory cache of translations awaiting confirmation. Best effort: lost
/// on restart, bounded by age and capacity. Safe for concurrent put/take
/// from independent conversations.
pub struct PendingStore {
    entries: Mutex<HashMap<PendingKey, PendingEntry>>,
    max_age: Duration,
    capacity: usize,
}

impl PendingStore {
    pub fn new(max_age: Duration, capacity: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), max_age, capacity }
    }

    /// Upsert. A second word sent before the first is confirmed silently
    /// supersedes it; only the newest translation per slot is confirmable.
    pub fn put(&self, key: PendingKey, translation: Translation) {
        self.insert_entry(key, PendingEntry { translation, created_at: Instant::now() });
    }

    fn insert_entry(&self, key: PendingKey, entry: PendingEntry) {
        let mut entries = self.entries.lock().expect("pending store lock poisoned");

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            if let Some(oldest) =
                entries.iter().min_by_key(|(_, e)| e.created_at).map(|(k, _)| *k)
            {
                entries.remove(&oldest);
                debug!(?oldest, "pending store full, evicted oldest entry");
            }
        }

        entries.insert(key, entry);
    }

    /// Destructive read: the entry is removed atomically, so a duplicated
    /// button press finds nothing the second time. Entries past the age
    /// bound are dropped instead of returned.
    pub fn take(&self, key: PendingKey) -> Option<Translation> {
        let mut entries = self.entries.lock().expect("pending store lock poisoned");
        let entry = entries.remove(&key)?;
        if entry.created_at.elapsed() > self.max_age {
            debug!(?key, "pending entry expired on take");
            return None;
        }
        Some(entry.translation)
    }

    /// Sweep entries older than `max_age`, returning how many were dropped.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.lock().expect("pending store lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at.elapsed() <= max_age);
        before - entries.len()
    }

    /// Age-bound sweep with the store's own threshold, for the poll loop.
    pub fn evict_expired(&self) -> usize {
        self.evict_older_than(self.max_age)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("pending store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn put_with_created_at(&self, key: PendingKey, translation: Translation, created_at: Instant) {
        self.insert_entry(key, PendingEntry { translation, created_at });
    }
}

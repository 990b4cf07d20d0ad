use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::model::{Meal, MessageId, UserId};

struct Entry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) <= self.ttl
    }
}

/// String-keyed store whose entries disappear once their TTL elapses.
///
/// Lookups fail closed as soon as an entry is stale; `sweep` reclaims the
/// memory. Entries live in a sharded map, so work on one key only contends
/// with keys in the same shard.
pub struct ExpiringStore<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> Default for ExpiringStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ExpiringStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or replace, restarting the entry's clock.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        metrics::gauge!(crate::observability::SESSION_ENTRIES).set(self.entries.len() as f64);
    }

    /// `None` if the key was never set, was deleted, or has outlived its TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        entry.is_live(Instant::now()).then(|| entry.value.clone())
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every expired entry. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let after = self.entries.len();
        metrics::gauge!(crate::observability::SESSION_ENTRIES).set(after as f64);
        before.saturating_sub(after)
    }

    /// Physical entry count, stale entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a chat session parks between two updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValue {
    /// An admin picked a menu slot and the next text message names it.
    MenuEdit { slot: u8, meal: Meal },
    /// Message id of the selection form most recently sent.
    LastSelection(MessageId),
}

pub fn menu_edit_key(user: UserId) -> String {
    format!("{user}_menu_edit")
}

pub fn last_selection_key(user: UserId) -> String {
    format!("user_{user}_last_selection")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn get_returns_value_until_ttl_elapses() {
        let store = ExpiringStore::new();
        store.set("k", 42, TTL);
        assert_eq!(store.get("k"), Some(42));

        tokio::time::advance(TTL).await;
        assert_eq!(store.get("k"), Some(42), "boundary is still visible");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get("k"), None);
        // Lazy expiry: the stale entry is still physically present.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_restarts_the_clock() {
        let store = ExpiringStore::new();
        store.set("k", "a".to_string(), TTL);
        tokio::time::advance(Duration::from_secs(20)).await;
        store.set("k", "b".to_string(), TTL);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(store.get("k").as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let store = ExpiringStore::new();
        store.set("short", 1, Duration::from_secs(1));
        store.set("long", 2, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long"), Some(2));
        assert_eq!(store.get("short"), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = ExpiringStore::new();
            store.set("k", 1, TTL);
            store.delete("k");
            store.delete("k");
            store.delete("never-set");
            assert_eq!(store.get("k"), None);
            assert!(store.is_empty());
        });
    }

    #[test]
    fn session_keys_are_per_user() {
        assert_ne!(menu_edit_key(1), menu_edit_key(2));
        assert_ne!(menu_edit_key(1), last_selection_key(1));
    }
}

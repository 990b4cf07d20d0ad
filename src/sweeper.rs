use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::observability::SESSION_EVICTED_TOTAL;
use crate::repo::WalRepository;
use crate::session::ExpiringStore;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that periodically drops expired session entries.
pub async fn run_sweeper<V: Clone>(store: Arc<ExpiringStore<V>>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let evicted = store.sweep();
        if evicted > 0 {
            debug!("swept {evicted} expired session entries");
            metrics::counter!(SESSION_EVICTED_TOTAL).increment(evicted as u64);
        }
    }
}

/// Background task that rewrites the log once enough appends pile up.
pub async fn run_compactor(repo: Arc<WalRepository>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&repo, threshold).await;
    }
}

/// Returns whether a compaction ran.
async fn compact_if_due(repo: &WalRepository, threshold: u64) -> bool {
    let appends = repo.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match repo.compact().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use crate::repo::Repository;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lunchbox_test_sweeper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_on_its_interval() {
        let store = Arc::new(ExpiringStore::new());
        store.set("short", 1u8, Duration::from_secs(5));
        store.set("long", 2u8, Duration::from_secs(500));

        let task = tokio::spawn(run_sweeper(store.clone(), Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long"), Some(2));
        task.abort();
    }

    #[tokio::test]
    async fn compaction_waits_for_threshold() {
        let repo = WalRepository::open(test_wal_path("compact_threshold.wal")).unwrap();
        for id in 0..3 {
            repo.save_user(&User::new(id, format!("u{id}"), "")).await.unwrap();
        }

        assert!(!compact_if_due(&repo, 10).await);
        assert!(compact_if_due(&repo, 3).await);
        assert_eq!(repo.appends_since_compact().await, 0);
        assert_eq!(repo.users().await.unwrap().len(), 3);
    }
}

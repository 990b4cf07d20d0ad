use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, error};

#[derive(Debug)]
pub enum QueueError {
    GateClosed(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::GateClosed(identity) => write!(f, "queue gate closed for {identity}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Runs at most one unit of work per identity at a time.
///
/// Each identity gets a single-permit semaphore, created on first use and
/// kept for the life of the process. Tokio semaphores hand out permits in
/// request order, so callers for one identity are admitted FIFO; extra
/// callers wait rather than being dropped. Different identities never
/// share a gate.
///
/// The map only grows. That is fine for a member list, not for an open
/// identity space.
pub struct IdentityQueue<K> {
    gates: DashMap<K, Arc<Semaphore>>,
}

impl<K> Default for IdentityQueue<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> IdentityQueue<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            gates: DashMap::new(),
        }
    }

    fn gate(&self, identity: &K) -> Arc<Semaphore> {
        if let Some(gate) = self.gates.get(identity) {
            return gate.value().clone();
        }
        let gate = self
            .gates
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .value()
            .clone();
        metrics::gauge!(crate::observability::QUEUE_IDENTITIES).set(self.gates.len() as f64);
        gate
    }

    /// Wait for `identity`'s slot, then run `work` on its own task.
    ///
    /// Returns once the work has been admitted, not when it finishes. The
    /// slot is released when the task ends, whether `work` returns or panics.
    pub async fn process<F>(&self, identity: K, work: F) -> Result<JoinHandle<()>, QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let gate = self.gate(&identity);
        let waited = std::time::Instant::now();
        let permit = gate
            .acquire_owned()
            .await
            .map_err(|_| QueueError::GateClosed(identity.to_string()))?;
        metrics::histogram!(crate::observability::QUEUE_WAIT_SECONDS)
            .record(waited.elapsed().as_secs_f64());

        let span = tracing::info_span!("queued", identity = %identity);
        Ok(tokio::spawn(
            async move {
                let _permit = permit;
                if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                    error!("unit of work panicked; slot released");
                }
            }
            .instrument(span),
        ))
    }

    /// Identities seen so far.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn same_identity_never_overlaps() {
        let queue = Arc::new(IdentityQueue::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut callers = Vec::new();
        for _ in 0..20 {
            let queue = queue.clone();
            let running = running.clone();
            let max_seen = max_seen.clone();
            callers.push(tokio::spawn(async move {
                queue
                    .process(7i64, async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap()
            }));
        }
        for caller in callers {
            caller.await.unwrap().await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn different_identities_run_concurrently() {
        let queue = IdentityQueue::new();
        let (a_started_tx, a_started_rx) = oneshot::channel();
        let (b_started_tx, b_started_rx) = oneshot::channel::<()>();

        // A cannot finish until B has started, so both must be in flight at once.
        let a = queue
            .process(1i64, async move {
                let _ = a_started_tx.send(());
                let _ = b_started_rx.await;
            })
            .await
            .unwrap();
        let b = queue
            .process(2i64, async move {
                let _ = a_started_rx.await;
                let _ = b_started_tx.send(());
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .expect("units for different identities deadlocked");
    }

    #[tokio::test]
    async fn second_unit_waits_for_the_first() {
        let queue = IdentityQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = queue
            .process(3i64, async move {
                let _ = release_rx.await;
            })
            .await
            .unwrap();

        let mut second = tokio_test::task::spawn(queue.process(3i64, async {}));
        assert_pending!(second.poll());

        release_tx.send(()).unwrap();
        first.await.unwrap();

        assert!(second.is_woken());
        let handle = assert_ready!(second.poll()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_work_releases_the_slot() {
        let queue = IdentityQueue::new();

        let boom = queue
            .process(4i64, async {
                panic!("handler bug");
            })
            .await
            .unwrap();
        boom.await.unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        let next = tokio::time::timeout(
            Duration::from_secs(5),
            queue.process(4i64, async move {
                flag.store(1, Ordering::SeqCst);
            }),
        )
        .await
        .expect("slot leaked after panic")
        .unwrap();
        next.await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn admission_follows_call_order() {
        let queue = IdentityQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = queue
            .process(5i64, async move {
                let _ = release_rx.await;
            })
            .await
            .unwrap();

        // Register both waiters before the slot frees up.
        let mut waiters = Vec::new();
        for n in 0..2 {
            let order = order.clone();
            let mut fut = tokio_test::task::spawn(queue.process(5i64, async move {
                order.lock().unwrap().push(n);
            }));
            assert_pending!(fut.poll());
            waiters.push(fut);
        }

        release_tx.send(()).unwrap();
        first.await.unwrap();

        for mut fut in waiters {
            let handle = loop {
                if let std::task::Poll::Ready(h) = fut.poll() {
                    break h.unwrap();
                }
                tokio::task::yield_now().await;
            };
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1]);
    }
}

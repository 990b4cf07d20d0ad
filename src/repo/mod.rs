mod state;

use state::MemoryState;

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::limits::MENU_SLOTS;
use crate::model::*;
use crate::wal::Wal;

#[derive(Debug)]
pub enum RepoError {
    WalError(String),
    Unavailable(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::WalError(e) => write!(f, "WAL error: {e}"),
            RepoError::Unavailable(e) => write!(f, "storage unavailable: {e}"),
        }
    }
}

impl std::error::Error for RepoError {}

/// Persistence collaborator behind the reservation engine.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepoError>;
    async fn save_user(&self, user: &User) -> Result<(), RepoError>;
    /// All registered users, ordered by id.
    async fn users(&self) -> Result<Vec<User>, RepoError>;

    async fn find_reservation(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<ReservationRecord>, RepoError>;
    /// Upsert keyed by `(record.user_id, record.date)`.
    async fn save_reservation(&self, record: &ReservationRecord) -> Result<(), RepoError>;
    async fn reservations_on(&self, date: NaiveDate) -> Result<Vec<ReservationRecord>, RepoError>;

    /// One entry per slot `1..=MENU_SLOTS`; unnamed meals are `None`.
    async fn menu(&self) -> Result<Vec<MenuDay>, RepoError>;
    async fn save_menu_item(&self, slot: u8, meal: Meal, name: &str) -> Result<(), RepoError>;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block on the first append, drain whatever else is already queued, then
/// one fsync for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// Log-backed repository: every write is made durable before it becomes visible.
pub struct WalRepository {
    state: MemoryState,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writes hold it shared from append to apply; compaction holds it
    /// exclusively, so its snapshot covers every acknowledged append.
    commit_gate: RwLock<()>,
}

impl WalRepository {
    /// Replay the log at `wal_path` and start its writer task. Needs a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let state = MemoryState::new();
        for event in &events {
            state.apply_event(event);
        }
        tracing::info!(
            "replayed {} events from {}",
            events.len(),
            wal_path.display()
        );

        Ok(Self {
            state,
            wal_tx,
            commit_gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), RepoError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| RepoError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepoError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| RepoError::WalError(e.to_string()))
    }

    /// WAL-append, then apply to memory.
    async fn persist_and_apply(&self, event: Event) -> Result<(), RepoError> {
        let _commit = self.commit_gate.read().await;
        self.wal_append(&event).await?;
        self.state.apply_event(&event);
        Ok(())
    }

    /// Rewrite the log with only the events needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), RepoError> {
        let _exclusive = self.commit_gate.write().await;
        let events = self.state.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| RepoError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepoError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| RepoError::WalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Repository for WalRepository {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepoError> {
        Ok(self.state.user(id))
    }

    async fn save_user(&self, user: &User) -> Result<(), RepoError> {
        self.persist_and_apply(Event::UserSaved(user.clone())).await
    }

    async fn users(&self) -> Result<Vec<User>, RepoError> {
        Ok(self.state.users())
    }

    async fn find_reservation(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<ReservationRecord>, RepoError> {
        Ok(self.state.reservation(user_id, date))
    }

    async fn save_reservation(&self, record: &ReservationRecord) -> Result<(), RepoError> {
        self.persist_and_apply(Event::ReservationSaved(record.clone()))
            .await
    }

    async fn reservations_on(&self, date: NaiveDate) -> Result<Vec<ReservationRecord>, RepoError> {
        Ok(self.state.reservations_on(date))
    }

    async fn menu(&self) -> Result<Vec<MenuDay>, RepoError> {
        Ok((1..=MENU_SLOTS).map(|slot| self.state.menu_day(slot)).collect())
    }

    async fn save_menu_item(&self, slot: u8, meal: Meal, name: &str) -> Result<(), RepoError> {
        self.persist_and_apply(Event::MenuItemNamed {
            slot,
            meal,
            name: name.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_test::{assert_pending, task};

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lunchbox_test_repo");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let path = test_wal_path("reopen.wal");
        let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let mut record = ReservationRecord::empty(1, date, Utc::now());
        record.has_lunch = true;

        {
            let repo = WalRepository::open(path.clone()).unwrap();
            repo.save_user(&User::new(1, "ana", "Ana")).await.unwrap();
            repo.save_reservation(&record).await.unwrap();
            repo.save_menu_item(4, Meal::Lunch, "Pasta").await.unwrap();
        }

        let repo = WalRepository::open(path).unwrap();
        assert_eq!(repo.find_user(1).await.unwrap().unwrap().username, "ana");
        assert_eq!(repo.find_reservation(1, date).await.unwrap(), Some(record));
        let menu = repo.menu().await.unwrap();
        assert_eq!(menu.len(), MENU_SLOTS as usize);
        assert_eq!(menu[3].name(Meal::Lunch), Some("Pasta"));
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let path = test_wal_path("concurrent.wal");
        let repo = std::sync::Arc::new(WalRepository::open(path.clone()).unwrap());

        let mut handles = Vec::new();
        for id in 0..50 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.save_user(&User::new(id, format!("u{id}"), "x")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(repo.users().await.unwrap().len(), 50);
        assert_eq!(repo.appends_since_compact().await, 50);
        assert_eq!(Wal::replay(&path).unwrap().len(), 50);
    }

    #[tokio::test]
    async fn compact_keeps_latest_state() {
        let path = test_wal_path("compact.wal");
        let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let repo = WalRepository::open(path.clone()).unwrap();

        let mut record = ReservationRecord::empty(2, date, Utc::now());
        for i in 0..20 {
            record.has_lunch = i % 2 == 0;
            repo.save_reservation(&record).await.unwrap();
        }
        repo.compact().await.unwrap();
        assert_eq!(repo.appends_since_compact().await, 0);

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![Event::ReservationSaved(record)]);
    }

    #[tokio::test]
    async fn compaction_keeps_a_write_that_was_in_flight() {
        let path = test_wal_path("compact_in_flight.wal");
        let date = NaiveDate::from_ymd_opt(2025, 10, 16).unwrap();
        let mut record = ReservationRecord::empty(3, date, Utc::now());
        record.has_lunch = true;

        {
            let repo = WalRepository::open(path.clone()).unwrap();
            let mut save = task::spawn(repo.save_reservation(&record));
            assert_pending!(save.poll());
            let mut compact = task::spawn(repo.compact());
            assert_pending!(compact.poll());

            save.await.unwrap();
            compact.await.unwrap();
            assert_eq!(repo.find_reservation(3, date).await.unwrap(), Some(record.clone()));
        }

        let repo = WalRepository::open(path).unwrap();
        assert_eq!(repo.find_reservation(3, date).await.unwrap(), Some(record));
    }
}

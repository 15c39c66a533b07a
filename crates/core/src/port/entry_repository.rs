// Entry Repository Port (Interface)

use crate::domain::{EntryId, EntryStatus, QueueEntry};
use crate::error::Result;
use async_trait::async_trait;

/// Which rows of a business to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryScope {
    /// Waiting and serving entries only
    Active,
    /// Active entries followed by served/cancelled history
    All,
}

/// Partial row update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub status: Option<EntryStatus>,
    pub position: Option<u32>,
    pub expected_wait_time_minutes: Option<u32>,
    pub serving_started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl EntryUpdate {
    /// Columns that differ between two versions of the same entry, if any
    pub fn between(old: &QueueEntry, new: &QueueEntry) -> Option<Self> {
        let update = Self {
            status: (old.status != new.status).then_some(new.status),
            position: (old.position != new.position).then_some(new.position),
            expected_wait_time_minutes: (old.expected_wait_time_minutes
                != new.expected_wait_time_minutes)
                .then_some(new.expected_wait_time_minutes),
            serving_started_at: new
                .serving_started_at
                .filter(|_| old.serving_started_at != new.serving_started_at),
            finished_at: new.finished_at.filter(|_| old.finished_at != new.finished_at),
        };
        (!update.is_empty()).then_some(update)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, entry: &mut QueueEntry) {
        if let Some(status) = self.status {
            entry.status = status;
        }
        if let Some(position) = self.position {
            entry.position = position;
        }
        if let Some(wait) = self.expected_wait_time_minutes {
            entry.expected_wait_time_minutes = wait;
        }
        if let Some(at) = self.serving_started_at {
            entry.serving_started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            entry.finished_at = Some(at);
        }
    }
}

/// Row-oriented store for queue entries. Each call is atomic on its own;
/// cross-row ordering is the caller's job.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Insert a new entry
    async fn insert(&self, entry: &QueueEntry) -> Result<()>;

    /// Update selected columns (NotFound if the row is missing)
    async fn update(&self, id: &EntryId, update: &EntryUpdate) -> Result<()>;

    /// Delete a row, returning whether it existed
    async fn delete(&self, id: &EntryId) -> Result<bool>;

    /// Find entry by ID
    async fn find_by_id(&self, id: &EntryId) -> Result<Option<QueueEntry>>;

    /// Entries of a business ordered by position ascending
    /// (history, if included, after the active set in join order)
    async fn list_by_business(&self, business_id: &str, scope: EntryScope)
        -> Result<Vec<QueueEntry>>;
}

// ============================================================================
// In-memory implementation (tests, embedding)
// ============================================================================

pub mod memory {
    use super::*;
    use crate::error::AppError;
    use crate::port::change_stream::{ChangeStream, RowChange, RowOp, CHANGE_STREAM_CAPACITY};
    use crate::port::transaction::{EntryTransaction, Transaction, TransactionalEntryRepository};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct Inner {
        rows: Mutex<HashMap<EntryId, QueueEntry>>,
        changes: broadcast::Sender<RowChange>,
        fail_commits: AtomicBool,
        commit_delay: Mutex<Option<Duration>>,
        commit_count: AtomicUsize,
    }

    /// Process-local store with the same contract as the SQLite adapter.
    ///
    /// Commits can be made to fail or stall to exercise error paths.
    #[derive(Clone)]
    pub struct InMemoryEntryRepository {
        inner: Arc<Inner>,
    }

    impl Default for InMemoryEntryRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryEntryRepository {
        pub fn new() -> Self {
            let (changes, _) = broadcast::channel(CHANGE_STREAM_CAPACITY);
            Self {
                inner: Arc::new(Inner {
                    rows: Mutex::new(HashMap::new()),
                    changes,
                    fail_commits: AtomicBool::new(false),
                    commit_delay: Mutex::new(None),
                    commit_count: AtomicUsize::new(0),
                }),
            }
        }

        /// Make every following commit fail with a storage error
        pub fn set_fail_commits(&self, fail: bool) {
            self.inner.fail_commits.store(fail, Ordering::SeqCst);
        }

        /// Stall every following commit
        pub fn set_commit_delay(&self, delay: Option<Duration>) {
            *self.commit_delay() = delay;
        }

        /// Number of successful transaction commits
        pub fn commit_count(&self) -> usize {
            self.inner.commit_count.load(Ordering::SeqCst)
        }

        /// Overwrite a row outside any transaction and without validation
        /// (simulates writes by another process). The change is still announced.
        pub fn put_raw(&self, entry: QueueEntry) {
            let (business_id, entry_id) = (entry.business_id.clone(), entry.id.clone());
            let op = match self.rows().insert(entry_id.clone(), entry) {
                Some(_) => RowOp::Update,
                None => RowOp::Insert,
            };
            self.emit(&business_id, &entry_id, op);
        }

        fn rows(&self) -> std::sync::MutexGuard<'_, HashMap<EntryId, QueueEntry>> {
            self.inner.rows.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn commit_delay(&self) -> std::sync::MutexGuard<'_, Option<Duration>> {
            self.inner
                .commit_delay
                .lock()
                .unwrap_or_else(|e| e.into_inner())
        }

        fn emit(&self, business_id: &str, entry_id: &str, op: RowOp) {
            // No receivers is fine
            let _ = self.inner.changes.send(RowChange {
                business_id: business_id.to_string(),
                entry_id: entry_id.to_string(),
                op,
            });
        }

        /// Validate and apply a batch atomically; returns emitted changes
        fn apply_batch(&self, ops: &[StagedOp]) -> Result<Vec<RowChange>> {
            let mut rows = self.rows();
            let mut scratch = rows.clone();
            let mut changes = Vec::with_capacity(ops.len());

            for op in ops {
                match op {
                    StagedOp::Insert(entry) => {
                        if scratch.contains_key(&entry.id) {
                            return Err(AppError::Storage(format!(
                                "Unique constraint violation: entry {}",
                                entry.id
                            )));
                        }
                        scratch.insert(entry.id.clone(), entry.clone());
                        changes.push(change(&entry.business_id, &entry.id, RowOp::Insert));
                    }
                    StagedOp::Update(id, update) => {
                        let row = scratch.get_mut(id).ok_or_else(|| AppError::not_found(id))?;
                        update.apply_to(row);
                        changes.push(change(&row.business_id, id, RowOp::Update));
                    }
                    StagedOp::Delete(id) => {
                        if let Some(row) = scratch.remove(id) {
                            changes.push(change(&row.business_id, id, RowOp::Delete));
                        }
                    }
                }
            }

            *rows = scratch;
            Ok(changes)
        }
    }

    fn change(business_id: &str, entry_id: &str, op: RowOp) -> RowChange {
        RowChange {
            business_id: business_id.to_string(),
            entry_id: entry_id.to_string(),
            op,
        }
    }

    #[async_trait]
    impl EntryRepository for InMemoryEntryRepository {
        async fn insert(&self, entry: &QueueEntry) -> Result<()> {
            for c in self.apply_batch(&[StagedOp::Insert(entry.clone())])? {
                self.emit(&c.business_id, &c.entry_id, c.op);
            }
            Ok(())
        }

        async fn update(&self, id: &EntryId, update: &EntryUpdate) -> Result<()> {
            for c in self.apply_batch(&[StagedOp::Update(id.clone(), update.clone())])? {
                self.emit(&c.business_id, &c.entry_id, c.op);
            }
            Ok(())
        }

        async fn delete(&self, id: &EntryId) -> Result<bool> {
            let changes = self.apply_batch(&[StagedOp::Delete(id.clone())])?;
            let existed = !changes.is_empty();
            for c in changes {
                self.emit(&c.business_id, &c.entry_id, c.op);
            }
            Ok(existed)
        }

        async fn find_by_id(&self, id: &EntryId) -> Result<Option<QueueEntry>> {
            Ok(self.rows().get(id).cloned())
        }

        async fn list_by_business(
            &self,
            business_id: &str,
            scope: EntryScope,
        ) -> Result<Vec<QueueEntry>> {
            let mut entries: Vec<QueueEntry> = self
                .rows()
                .values()
                .filter(|e| e.business_id == business_id)
                .filter(|e| scope == EntryScope::All || e.is_active())
                .cloned()
                .collect();
            entries.sort_by(|a, b| {
                (!a.is_active(), a.position, a.joined_at, &a.id).cmp(&(
                    !b.is_active(),
                    b.position,
                    b.joined_at,
                    &b.id,
                ))
            });
            Ok(entries)
        }
    }

    #[async_trait]
    impl TransactionalEntryRepository for InMemoryEntryRepository {
        async fn begin_transaction(&self) -> Result<Box<dyn EntryTransaction>> {
            Ok(Box::new(InMemoryTransaction {
                repo: self.clone(),
                staged: Vec::new(),
            }))
        }
    }

    impl ChangeStream for InMemoryEntryRepository {
        fn subscribe_changes(&self) -> broadcast::Receiver<RowChange> {
            self.inner.changes.subscribe()
        }
    }

    enum StagedOp {
        Insert(QueueEntry),
        Update(EntryId, EntryUpdate),
        Delete(EntryId),
    }

    /// Buffers writes until commit; dropping it discards them
    pub struct InMemoryTransaction {
        repo: InMemoryEntryRepository,
        staged: Vec<StagedOp>,
    }

    #[async_trait]
    impl Transaction for InMemoryTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let delay = *self.repo.commit_delay();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.repo.inner.fail_commits.load(Ordering::SeqCst) {
                return Err(AppError::Storage("injected commit failure".to_string()));
            }

            let changes = self.repo.apply_batch(&self.staged)?;
            self.repo.inner.commit_count.fetch_add(1, Ordering::SeqCst);
            for c in changes {
                self.repo.emit(&c.business_id, &c.entry_id, c.op);
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl EntryTransaction for InMemoryTransaction {
        async fn insert(&mut self, entry: &QueueEntry) -> Result<()> {
            self.staged.push(StagedOp::Insert(entry.clone()));
            Ok(())
        }

        async fn update(&mut self, id: &EntryId, update: &EntryUpdate) -> Result<()> {
            self.staged.push(StagedOp::Update(id.clone(), update.clone()));
            Ok(())
        }

        async fn delete(&mut self, id: &EntryId) -> Result<()> {
            self.staged.push(StagedOp::Delete(id.clone()));
            Ok(())
        }
    }
}

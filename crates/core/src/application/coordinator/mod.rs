//! Queue Coordinator
//!
//! The single authority for mutating a business's active set.
//!
//! Every mutation (`join`, `advance`, `remove`) runs inside the business's
//! exclusive section:
//! 1. acquire the slot lock (bounded by `lock_timeout`)
//! 2. load the active set from the store if it is not cached
//! 3. apply the change to a copy (validation, transition, recompaction)
//! 4. commit the row diff in one transaction (bounded by `commit_timeout`)
//! 5. swap the copy in and publish the new snapshot
//!
//! A failure at any step leaves the cached set untouched; a failed commit
//! additionally drops the cache so state is re-derived from the store.

mod commit;
mod registry;

use crate::application::constants::{DEFAULT_COMMIT_TIMEOUT, DEFAULT_LOCK_TIMEOUT};
use crate::application::notifier::{ChangeNotifier, SnapshotSubscription};
use crate::domain::{
    ActiveSet, DomainError, EntryStatus, QueueEntry, QueueSnapshot, QueueStats,
    DEFAULT_AVERAGE_SERVICE_MINUTES,
};
use crate::error::{AppError, Result};
use crate::port::{EntryScope, IdProvider, TimeProvider, TransactionalEntryRepository};
use commit::RowWrite;
use registry::{BusinessRegistry, SlotState};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Minutes per customer used by the wait estimator
    pub average_service_minutes: u32,
    /// Max wait for a business's exclusive section
    pub lock_timeout: Duration,
    /// Max duration of a store round trip inside the exclusive section
    pub commit_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            average_service_minutes: DEFAULT_AVERAGE_SERVICE_MINUTES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

/// Join request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub business_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

pub struct QueueCoordinator {
    repo: Arc<dyn TransactionalEntryRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    registry: BusinessRegistry,
    notifier: ChangeNotifier,
    average_service_minutes: AtomicU32,
    /// Source of snapshot versions; shared so a business reloaded after
    /// eviction never reuses a version it already published
    versions: AtomicU64,
    lock_timeout: Duration,
    commit_timeout: Duration,
}

impl QueueCoordinator {
    pub fn new(
        repo: Arc<dyn TransactionalEntryRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            repo,
            id_provider,
            time_provider,
            registry: BusinessRegistry::default(),
            notifier: ChangeNotifier::new(),
            average_service_minutes: AtomicU32::new(config.average_service_minutes),
            versions: AtomicU64::new(0),
            lock_timeout: config.lock_timeout,
            commit_timeout: config.commit_timeout,
        }
    }

    pub fn average_service_minutes(&self) -> u32 {
        self.average_service_minutes.load(Ordering::SeqCst)
    }

    /// Change the estimator input. Takes effect on the next snapshot read
    /// and is written through on the next mutation of each business.
    pub fn set_average_service_minutes(&self, minutes: u32) -> Result<()> {
        if minutes == 0 {
            return Err(
                DomainError::validation("average_service_minutes", "must be at least 1").into(),
            );
        }
        let previous = self.average_service_minutes.swap(minutes, Ordering::SeqCst);
        info!(previous, minutes, "Average service minutes updated");
        Ok(())
    }

    /// Add a customer to the back of a business's queue
    pub async fn join(&self, req: JoinRequest) -> Result<QueueEntry> {
        // Validate before touching the exclusive section
        let entry = QueueEntry::create(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            req.business_id,
            &req.customer_name,
            req.phone_number.as_deref(),
        )?;
        let business_id = entry.business_id.clone();

        let joined = self
            .mutate(&business_id, |set, _now, avg| Ok(set.append(entry, avg)?))
            .await?;

        info!(
            business_id = %business_id,
            entry_id = %joined.id,
            position = joined.position,
            expected_wait_minutes = joined.expected_wait_time_minutes,
            "Customer joined queue"
        );
        Ok(joined)
    }

    /// Move an entry to `to` following the transition table
    pub async fn advance(&self, entry_id: &str, to: EntryStatus) -> Result<QueueEntry> {
        let row = self.find_row(entry_id).await?;
        let business_id = row.business_id;

        let mut state = self.exclusive(&business_id).await?;
        let set = self.ensure_loaded(&business_id, &mut state).await?;

        if !set.contains(entry_id) {
            // Re-read under the lock; the row may have moved on since the lookup
            let current = self
                .with_store_timeout(&business_id, self.repo.find_by_id(&entry_id.to_string()))
                .await?
                .ok_or_else(|| AppError::not_found(entry_id))?;
            if current.status.is_active() {
                // Store lists it as active but the cache does not: re-derive next time
                state.active = None;
                return Err(AppError::not_found(entry_id));
            }
            return Err(DomainError::InvalidTransition {
                entry_id: entry_id.to_string(),
                from: current.status,
                to,
            }
            .into());
        }

        let entry = self
            .mutate_locked(&business_id, &mut state, |set, now, avg| {
                Ok(set.advance(entry_id, to, now, avg)?)
            })
            .await;

        match &entry {
            Ok(e) => info!(
                business_id = %e.business_id,
                entry_id = %e.id,
                status = %e.status,
                position = e.position,
                "Entry advanced"
            ),
            Err(err) => debug!(entry_id = %entry_id, to = %to, error = %err, "Advance refused"),
        }
        entry
    }

    /// Operator removal, permitted from any status.
    ///
    /// Active entries are cancelled and the queue is compacted; entries that
    /// already left the queue have their history row deleted.
    pub async fn remove(&self, entry_id: &str) -> Result<()> {
        let row = self.find_row(entry_id).await?;
        let business_id = row.business_id.clone();

        let mut state = self.exclusive(&business_id).await?;
        let set = self.ensure_loaded(&business_id, &mut state).await?;

        if set.contains(entry_id) {
            let cancelled = self
                .mutate_locked(&business_id, &mut state, |set, now, avg| {
                    Ok(set.force_cancel(entry_id, now, avg)?)
                })
                .await?;
            info!(
                business_id = %business_id,
                entry_id = %cancelled.id,
                "Entry removed from active queue"
            );
            return Ok(());
        }

        // Already served/cancelled; re-read since it may have been deleted meanwhile
        let current = self
            .with_store_timeout(&business_id, self.repo.find_by_id(&row.id))
            .await?
            .ok_or_else(|| AppError::not_found(entry_id))?;
        if current.status.is_active() {
            state.active = None;
            return Err(AppError::not_found(entry_id));
        }
        self.commit(&business_id, &mut state, &[RowWrite::Delete(row.id.clone())])
            .await?;
        info!(business_id = %business_id, entry_id = %entry_id, "History entry purged");
        Ok(())
    }

    /// Active set ordered by position, plus history when requested.
    ///
    /// Once a business is loaded, a read without history serves the last
    /// published snapshot and never waits for writers. A read with history
    /// takes the exclusive section so both parts come from the same commit.
    pub async fn snapshot(
        &self,
        business_id: &str,
        include_history: bool,
    ) -> Result<QueueSnapshot> {
        if !include_history {
            if let Some(published) = self.notifier.latest(business_id) {
                return Ok((*published)
                    .clone()
                    .with_average(self.average_service_minutes()));
            }
        }

        let mut state = self.exclusive(business_id).await?;
        let set = self.ensure_loaded(business_id, &mut state).await?;
        let mut snapshot = QueueSnapshot::of(
            &set,
            state.version,
            self.average_service_minutes(),
            self.time_provider.now_millis(),
        );

        if include_history {
            let rows = self
                .with_store_timeout(
                    business_id,
                    self.repo.list_by_business(business_id, EntryScope::All),
                )
                .await?;
            snapshot.history = rows.into_iter().filter(|e| !e.is_active()).collect();
        }

        Ok(snapshot)
    }

    /// Dashboard figures for a business
    pub async fn stats(&self, business_id: &str) -> Result<QueueStats> {
        let snapshot = self.snapshot(business_id, true).await?;
        Ok(QueueStats::from_snapshot(&snapshot))
    }

    /// Subscribe to snapshots of a business. `current()` on the returned
    /// subscription is the state at subscription time.
    pub async fn subscribe(&self, business_id: &str) -> Result<SnapshotSubscription> {
        let mut state = self.exclusive(business_id).await?;
        let set = self.ensure_loaded(business_id, &mut state).await?;
        let avg = self.average_service_minutes();
        let now = self.time_provider.now_millis();
        let version = state.version;

        let subscription = self.notifier.subscribe_with(business_id, || {
            QueueSnapshot::of(&set, version, avg, now)
        });
        debug!(
            business_id = %business_id,
            subscribers = self.notifier.subscriber_count(business_id),
            "Snapshot subscriber added"
        );
        Ok(subscription)
    }

    /// Re-derive a cached business from the store and republish if it changed.
    ///
    /// Used when the store reports row changes; payloads are never trusted.
    /// Returns whether a new snapshot was published.
    pub async fn resync(&self, business_id: &str) -> Result<bool> {
        if !self.registry.contains(business_id) {
            return Ok(false);
        }

        let mut state = self.exclusive(business_id).await?;
        let fresh = self.fetch_active(business_id).await?;
        if state.active.as_ref() == Some(&fresh) {
            return Ok(false);
        }

        warn!(business_id = %business_id, "Store diverged from cached queue, republishing");
        self.install(business_id, &mut state, fresh);
        Ok(true)
    }

    /// Resync every loaded business. Returns how many were republished.
    ///
    /// Catches writes the change stream never reports, such as another
    /// process sharing the database file.
    pub async fn resync_loaded(&self) -> usize {
        let mut republished = 0;
        for business_id in self.loaded_businesses() {
            match self.resync(&business_id).await {
                Ok(true) => republished += 1,
                Ok(false) => {}
                Err(e) => warn!(business_id = %business_id, error = %e, "Resync failed"),
            }
        }
        republished
    }

    /// Businesses currently held in memory
    pub fn loaded_businesses(&self) -> Vec<String> {
        self.registry.businesses()
    }

    /// Drop state for businesses with no active entries, no subscribers and
    /// no operation in flight. Returns how many were evicted.
    pub fn evict_idle(&self) -> usize {
        let evicted = self.registry.evict_where(|business_id, state| {
            let idle = state.active.as_ref().map_or(true, ActiveSet::is_empty);
            idle && self.notifier.release(business_id)
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted idle businesses");
        }
        evicted.len()
    }

    // ------------------------------------------------------------------
    // Exclusive section
    // ------------------------------------------------------------------

    async fn exclusive(&self, business_id: &str) -> Result<OwnedMutexGuard<SlotState>> {
        let slot = self.registry.slot(business_id);
        tokio::time::timeout(self.lock_timeout, slot.lock_owned())
            .await
            .map_err(|_| {
                warn!(business_id = %business_id, "Timed out waiting for business lock");
                AppError::timeout(Some(business_id), self.lock_timeout)
            })
    }

    async fn mutate<F>(&self, business_id: &str, op: F) -> Result<QueueEntry>
    where
        F: FnOnce(&mut ActiveSet, i64, u32) -> Result<QueueEntry>,
    {
        let mut state = self.exclusive(business_id).await?;
        self.mutate_locked(business_id, &mut state, op).await
    }

    async fn mutate_locked<F>(
        &self,
        business_id: &str,
        state: &mut SlotState,
        op: F,
    ) -> Result<QueueEntry>
    where
        F: FnOnce(&mut ActiveSet, i64, u32) -> Result<QueueEntry>,
    {
        let before = self.ensure_loaded(business_id, state).await?;
        let avg = self.average_service_minutes();
        let now = self.time_provider.now_millis();

        let mut after = before.clone();
        let entry = op(&mut after, now, avg)?;
        // Carries a changed average through to every stored estimate
        after.recompact(avg);
        debug_assert!(after.is_consistent());

        let writes = commit::diff(&before, &after, Some(&entry));
        self.commit(business_id, state, &writes).await?;
        self.install(business_id, state, after);
        Ok(entry)
    }

    /// Cached active set, loading it from the store first if needed
    async fn ensure_loaded(&self, business_id: &str, state: &mut SlotState) -> Result<ActiveSet> {
        if let Some(set) = &state.active {
            return Ok(set.clone());
        }
        let set = self.fetch_active(business_id).await?;
        self.install(business_id, state, set.clone());
        Ok(set)
    }

    /// Read active rows and re-derive ranks; stored ranks that disagree are corrected
    async fn fetch_active(&self, business_id: &str) -> Result<ActiveSet> {
        let rows = self
            .with_store_timeout(
                business_id,
                self.repo.list_by_business(business_id, EntryScope::Active),
            )
            .await?;
        let set = ActiveSet::from_rows(business_id, rows.clone(), self.average_service_minutes());

        let corrections = commit::heal(&rows, &set);
        if !corrections.is_empty() {
            warn!(
                business_id = %business_id,
                rows = corrections.len(),
                "Correcting stored queue positions"
            );
            self.with_store_timeout(business_id, commit::apply(self.repo.as_ref(), &corrections))
                .await?;
        }
        Ok(set)
    }

    /// Commit writes; on failure the cached set is re-derived from the store
    /// and only republished if it differs from what subscribers last saw
    async fn commit(
        &self,
        business_id: &str,
        state: &mut SlotState,
        writes: &[RowWrite],
    ) -> Result<()> {
        let result = self
            .with_store_timeout(business_id, commit::apply(self.repo.as_ref(), writes))
            .await;

        if let Err(e) = result {
            warn!(
                business_id = %business_id,
                error = %e,
                "Commit failed, reloading queue from store"
            );
            let previous = state.active.take();
            match self.fetch_active(business_id).await {
                Ok(fresh) if previous.as_ref() == Some(&fresh) => state.active = Some(fresh),
                Ok(fresh) => self.install(business_id, state, fresh),
                Err(reload) => {
                    warn!(
                        business_id = %business_id,
                        error = %reload,
                        "Reload after failed commit failed"
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Swap in a committed set and publish it
    fn install(&self, business_id: &str, state: &mut SlotState, set: ActiveSet) {
        let avg = self.average_service_minutes();
        state.version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = QueueSnapshot::of(&set, state.version, avg, self.time_provider.now_millis());
        state.active = Some(set);
        self.notifier.publish(snapshot);
        debug!(business_id = %business_id, version = state.version, "Queue state installed");
    }

    async fn with_store_timeout<T>(
        &self,
        business_id: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.commit_timeout, fut)
            .await
            .map_err(|_| AppError::timeout(Some(business_id), self.commit_timeout))?
    }

    async fn find_row(&self, entry_id: &str) -> Result<QueueEntry> {
        tokio::time::timeout(self.commit_timeout, self.repo.find_by_id(&entry_id.to_string()))
            .await
            .map_err(|_| AppError::timeout(None, self.commit_timeout))??
            .ok_or_else(|| AppError::not_found(entry_id))
    }
}

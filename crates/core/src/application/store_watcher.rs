//! Store Watcher
//!
//! Follows the store's row change stream and asks the coordinator to
//! re-derive every business whose rows moved. Changes made by the
//! coordinator itself re-derive to the cached state and publish nothing.
//! The stream only carries writes made through this process's store
//! adapter; rows written by another process are caught by the periodic
//! `resync_loaded` in `RegistrySweeper`.

use crate::application::coordinator::QueueCoordinator;
use crate::application::shutdown::ShutdownToken;
use crate::domain::BusinessId;
use crate::port::RowChange;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

pub struct StoreWatcher {
    coordinator: Arc<QueueCoordinator>,
    changes: broadcast::Receiver<RowChange>,
}

impl StoreWatcher {
    pub fn new(
        coordinator: Arc<QueueCoordinator>,
        changes: broadcast::Receiver<RowChange>,
    ) -> Self {
        Self {
            coordinator,
            changes,
        }
    }

    /// Run until shutdown or until the store closes its stream.
    /// Should be spawned in tokio::spawn
    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        info!("Store watcher started");

        loop {
            let first = tokio::select! {
                _ = shutdown.wait() => break,
                received = self.changes.recv() => received,
            };

            match first {
                Ok(change) => {
                    let mut businesses = BTreeSet::from([change.business_id]);
                    let lagged = self.drain_into(&mut businesses);
                    if lagged {
                        self.resync_all().await;
                    } else {
                        self.resync(businesses).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Store watcher lagged behind change stream");
                    self.resync_all().await;
                }
                Err(RecvError::Closed) => {
                    info!("Store change stream closed");
                    break;
                }
            }
        }

        info!("Store watcher stopped");
    }

    /// Pull whatever is already buffered so a burst resyncs each business once.
    /// Returns true if the receiver lagged meanwhile.
    fn drain_into(&mut self, businesses: &mut BTreeSet<BusinessId>) -> bool {
        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    businesses.insert(change.business_id);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Store watcher lagged behind change stream");
                    return true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return false,
            }
        }
    }

    async fn resync_all(&self) {
        let republished = self.coordinator.resync_loaded().await;
        debug!(republished, "Resynced all loaded businesses");
    }

    async fn resync(&self, businesses: impl IntoIterator<Item = BusinessId>) {
        for business_id in businesses {
            match self.coordinator.resync(&business_id).await {
                Ok(true) => debug!(business_id = %business_id, "Republished after store change"),
                Ok(false) => {}
                Err(e) => warn!(business_id = %business_id, error = %e, "Resync failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::coordinator::{CoordinatorConfig, JoinRequest};
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::QueueEntry;
    use crate::port::entry_repository::memory::InMemoryEntryRepository;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::ChangeStream;
    use std::time::Duration;

    #[tokio::test]
    async fn test_external_write_is_republished() {
        let repo = InMemoryEntryRepository::new();
        let coordinator = Arc::new(QueueCoordinator::new(
            Arc::new(repo.clone()),
            Arc::new(SequentialIdProvider::default()),
            Arc::new(ManualTimeProvider::new(1_000)),
            CoordinatorConfig::default(),
        ));

        coordinator
            .join(JoinRequest {
                business_id: "biz".into(),
                customer_name: "Alice".into(),
                phone_number: None,
            })
            .await
            .unwrap();
        let mut sub = coordinator.subscribe("biz").await.unwrap();
        let seen = sub.current().version;

        let (tx, token) = shutdown_channel();
        let watcher = StoreWatcher::new(coordinator.clone(), repo.subscribe_changes());
        let handle = tokio::spawn(watcher.run(token));

        // A row written behind the coordinator's back
        let mut outsider = QueueEntry::create("ext-1", 2_000, "biz", "Walk-in", None).unwrap();
        outsider.position = 2;
        repo.put_raw(outsider);

        let snapshot = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.version > seen);
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[1].id, "ext-1");

        tx.shutdown();
        handle.await.unwrap();
    }
}

//! Change Notifier
//!
//! Fans committed snapshots out to per-business subscribers. Each business
//! has one `watch` channel holding the latest snapshot:
//! - delivery is in commit order (versions never go backwards for a receiver)
//! - a slow subscriber may skip intermediate snapshots but always ends up on the latest
//! - a subscriber only ever sees its own business

use crate::domain::{BusinessId, QueueSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

type Channel = watch::Sender<Arc<QueueSnapshot>>;

#[derive(Default)]
pub struct ChangeNotifier {
    channels: Mutex<HashMap<BusinessId, Channel>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest snapshot of its business and wake subscribers
    pub fn publish(&self, snapshot: QueueSnapshot) {
        let business_id = snapshot.business_id.clone();
        let version = snapshot.version;
        let snapshot = Arc::new(snapshot);

        let mut channels = self.channels();
        match channels.get(&business_id) {
            Some(tx) => {
                tx.send_replace(snapshot);
            }
            None => {
                let (tx, _) = watch::channel(snapshot);
                channels.insert(business_id.clone(), tx);
            }
        }

        debug!(business_id = %business_id, version, "Snapshot published");
    }

    /// Latest published snapshot without waiting on anything
    pub fn latest(&self, business_id: &str) -> Option<Arc<QueueSnapshot>> {
        self.channels()
            .get(business_id)
            .map(|tx| tx.borrow().clone())
    }

    /// Subscribe to a business, seeding its channel with `initial` if nothing
    /// was published yet
    pub fn subscribe_with(
        &self,
        business_id: &str,
        initial: impl FnOnce() -> QueueSnapshot,
    ) -> SnapshotSubscription {
        let mut channels = self.channels();
        let rx = match channels.get(business_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(Arc::new(initial()));
                channels.insert(business_id.to_string(), tx);
                rx
            }
        };

        SnapshotSubscription {
            business_id: business_id.to_string(),
            rx,
        }
    }

    pub fn has_subscribers(&self, business_id: &str) -> bool {
        self.subscriber_count(business_id) > 0
    }

    pub fn subscriber_count(&self, business_id: &str) -> usize {
        self.channels()
            .get(business_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Drop the channel of a business nobody is watching.
    ///
    /// Returns false only when subscribers are still attached.
    pub fn release(&self, business_id: &str) -> bool {
        let mut channels = self.channels();
        match channels.get(business_id) {
            Some(tx) if tx.receiver_count() > 0 => false,
            Some(_) => {
                channels.remove(business_id);
                true
            }
            None => true,
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<BusinessId, Channel>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Stream of snapshots for one business. Dropping it unsubscribes.
pub struct SnapshotSubscription {
    business_id: BusinessId,
    rx: watch::Receiver<Arc<QueueSnapshot>>,
}

impl SnapshotSubscription {
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Snapshot current at subscription time or at the last `next()`
    pub fn current(&self) -> Arc<QueueSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait for a snapshot newer than the last one seen.
    ///
    /// Returns `None` once the notifier is gone.
    pub async fn next(&mut self) -> Option<Arc<QueueSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(business_id: &str, version: u64) -> QueueSnapshot {
        QueueSnapshot {
            business_id: business_id.to_string(),
            version,
            average_service_minutes: 10,
            entries: Vec::new(),
            history: Vec::new(),
            taken_at: 0,
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_later_publications() {
        let notifier = ChangeNotifier::new();
        notifier.publish(snapshot("a", 1));

        let mut sub = notifier.subscribe_with("a", || snapshot("a", 0));
        assert_eq!(sub.current().version, 1);

        notifier.publish(snapshot("a", 2));
        assert_eq!(sub.next().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_gets_latest_only() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe_with("a", || snapshot("a", 0));

        for v in 1..=5 {
            notifier.publish(snapshot("a", v));
        }
        assert_eq!(sub.next().await.unwrap().version, 5);
    }

    #[tokio::test]
    async fn test_businesses_are_isolated() {
        let notifier = ChangeNotifier::new();
        let mut sub_a = notifier.subscribe_with("a", || snapshot("a", 0));

        notifier.publish(snapshot("b", 1));
        notifier.publish(snapshot("a", 1));

        let got = sub_a.next().await.unwrap();
        assert_eq!(got.business_id, "a");
        assert_eq!(notifier.subscriber_count("b"), 0);
    }

    #[test]
    fn test_release_only_when_unobserved() {
        let notifier = ChangeNotifier::new();
        let sub = notifier.subscribe_with("a", || snapshot("a", 0));
        assert!(!notifier.release("a"));

        drop(sub);
        assert!(notifier.release("a"));
        assert!(notifier.latest("a").is_none());
        assert!(notifier.release("never-seen"));
    }
}

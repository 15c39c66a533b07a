// Queue Snapshot - the published, read-only view of one business's queue

use crate::domain::active_set::ActiveSet;
use crate::domain::entry::{BusinessId, EntryStatus, QueueEntry};
use crate::domain::estimator::estimate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub business_id: BusinessId,
    /// Increases by one with every committed change for this business
    pub version: u64,
    pub average_service_minutes: u32,
    /// Active set ordered by position ascending
    pub entries: Vec<QueueEntry>,
    /// Served and cancelled entries, only when requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<QueueEntry>,
    pub taken_at: i64, // epoch ms
}

impl QueueSnapshot {
    pub fn of(set: &ActiveSet, version: u64, average_service_minutes: u32, taken_at: i64) -> Self {
        Self {
            business_id: set.business_id().to_string(),
            version,
            average_service_minutes,
            entries: set.entries().to_vec(),
            history: Vec::new(),
            taken_at,
        }
    }

    /// Re-apply the estimator if the service average changed since publication
    pub fn with_average(mut self, average_service_minutes: u32) -> Self {
        if self.average_service_minutes != average_service_minutes {
            self.average_service_minutes = average_service_minutes;
            for entry in &mut self.entries {
                entry.expected_wait_time_minutes =
                    estimate(entry.position, average_service_minutes);
            }
        }
        self
    }

    pub fn serving(&self) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.status == EntryStatus::Serving)
    }

    pub fn waiting_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Waiting)
            .count()
    }
}

/// Dashboard figures for one business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub business_id: BusinessId,
    pub waiting: usize,
    pub serving_entry_id: Option<String>,
    pub served: usize,
    pub cancelled: usize,
    pub average_wait_minutes: f64,
    pub longest_wait_minutes: u32,
}

impl QueueStats {
    pub fn from_snapshot(snapshot: &QueueSnapshot) -> Self {
        let waiting: Vec<&QueueEntry> = snapshot
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::Waiting)
            .collect();
        let total_wait: u64 = waiting
            .iter()
            .map(|e| e.expected_wait_time_minutes as u64)
            .sum();
        let average_wait_minutes = if waiting.is_empty() {
            0.0
        } else {
            total_wait as f64 / waiting.len() as f64
        };

        Self {
            business_id: snapshot.business_id.clone(),
            waiting: waiting.len(),
            serving_entry_id: snapshot.serving().map(|e| e.id.clone()),
            served: count(&snapshot.history, EntryStatus::Served),
            cancelled: count(&snapshot.history, EntryStatus::Cancelled),
            average_wait_minutes,
            longest_wait_minutes: waiting
                .iter()
                .map(|e| e.expected_wait_time_minutes)
                .max()
                .unwrap_or(0),
        }
    }
}

fn count(entries: &[QueueEntry], status: EntryStatus) -> usize {
    entries.iter().filter(|e| e.status == status).count()
}

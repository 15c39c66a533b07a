//! RPC Request/Response Types
//!
//! Method parameters and results. Entries, snapshots and stats are returned
//! as the core types serialize.

use queueline_core::domain::EntryStatus;
use serde::{Deserialize, Serialize};

/// queue.join.v1 - Add a customer to the back of the queue
pub use queueline_core::application::JoinRequest;

/// queue.advance.v1 - Move an entry to another status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub entry_id: String,
    pub status: EntryStatus,
}

/// queue.remove.v1 - Operator removal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub entry_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub entry_id: String,
    pub removed: bool,
}

/// queue.snapshot.v1 - Current queue of a business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub business_id: String,
    #[serde(default)]
    pub include_history: bool,
}

/// queue.stats.v1 - Dashboard figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub business_id: String,
}

/// admin.settings.v1 - Read or change the service average
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsRequest {
    #[serde(default)]
    pub average_service_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub average_service_minutes: u32,
}

/// queue.subscribe.v1 - Snapshot notifications for one business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub business_id: String,
}

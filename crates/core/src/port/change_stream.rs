// Change Stream Port - row-level events from the store

use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per receiver before it starts lagging
pub const CHANGE_STREAM_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOp {
    Insert,
    Update,
    Delete,
}

/// A committed row write. Only identifies the row; consumers re-fetch
/// instead of trusting payloads, so duplicates and reordering are harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub business_id: String,
    pub entry_id: String,
    pub op: RowOp,
}

/// Source of row change events
pub trait ChangeStream: Send + Sync {
    fn subscribe_changes(&self) -> broadcast::Receiver<RowChange>;
}

// Domain Layer - Pure queue rules and entities

pub mod active_set;
pub mod entry;
pub mod error;
pub mod estimator;
pub mod snapshot;
pub mod transition;

// Re-exports
pub use active_set::ActiveSet;
pub use entry::{BusinessId, EntryId, EntryStatus, QueueEntry};
pub use error::DomainError;
pub use estimator::{estimate, DEFAULT_AVERAGE_SERVICE_MINUTES};
pub use snapshot::{QueueSnapshot, QueueStats};
pub use transition::Transition;

// Port Layer - Interfaces for external dependencies

pub mod change_stream;
pub mod entry_repository;
pub mod id_provider; // For deterministic testing
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use change_stream::{ChangeStream, RowChange, RowOp};
pub use entry_repository::{EntryRepository, EntryScope, EntryUpdate};
pub use id_provider::IdProvider;
pub use time_provider::TimeProvider;
pub use transaction::{EntryTransaction, Transaction, TransactionalEntryRepository};

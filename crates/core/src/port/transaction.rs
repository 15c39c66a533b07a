// Transaction port for atomic multi-row commits

use crate::domain::{EntryId, QueueEntry};
use crate::error::Result;
use crate::port::entry_repository::{EntryRepository, EntryUpdate};
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store that can group row writes so a mutation and its compaction land together
#[async_trait]
pub trait TransactionalEntryRepository: EntryRepository {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn EntryTransaction>>;
}

/// EntryRepository writes within a transaction
#[async_trait]
pub trait EntryTransaction: Transaction {
    /// Insert entry (within transaction)
    async fn insert(&mut self, entry: &QueueEntry) -> Result<()>;

    /// Update selected columns (within transaction)
    async fn update(&mut self, id: &EntryId, update: &EntryUpdate) -> Result<()>;

    /// Delete row (within transaction)
    async fn delete(&mut self, id: &EntryId) -> Result<()>;
}

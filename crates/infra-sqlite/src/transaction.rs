// SQLite Transaction Implementation

use crate::entry_repository::{
    bind_insert, bind_update, map_sqlx_error, DELETE_ENTRY, INSERT_ENTRY, UPDATE_ENTRY,
};
use async_trait::async_trait;
use queueline_core::domain::{EntryId, QueueEntry};
use queueline_core::error::{AppError, Result};
use queueline_core::port::{EntryTransaction, EntryUpdate, RowChange, RowOp, Transaction};
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use tokio::sync::broadcast;
use tracing::debug;

/// Row writes staged inside one SQLite transaction.
///
/// Change events are held back until the commit succeeds; a rollback (or
/// dropping the transaction) discards them with the writes.
pub struct SqliteEntryTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
    changes: broadcast::Sender<RowChange>,
    pending: Vec<RowChange>,
}

impl SqliteEntryTransaction {
    pub fn new(
        tx: SqlxTransaction<'static, Sqlite>,
        changes: broadcast::Sender<RowChange>,
    ) -> Self {
        Self {
            tx,
            changes,
            pending: Vec::new(),
        }
    }

    fn stage(&mut self, business_id: String, entry_id: &str, op: RowOp) {
        self.pending.push(RowChange {
            business_id,
            entry_id: entry_id.to_string(),
            op,
        });
    }
}

#[async_trait]
impl Transaction for SqliteEntryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await.map_err(map_sqlx_error)?;

        debug!(rows = this.pending.len(), "Transaction committed");
        for change in this.pending {
            // No receivers is fine
            let _ = this.changes.send(change);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl EntryTransaction for SqliteEntryTransaction {
    async fn insert(&mut self, entry: &QueueEntry) -> Result<()> {
        bind_insert(sqlx::query(INSERT_ENTRY), entry)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        self.stage(entry.business_id.clone(), &entry.id, RowOp::Insert);
        Ok(())
    }

    async fn update(&mut self, id: &EntryId, update: &EntryUpdate) -> Result<()> {
        let business_id = bind_update(sqlx::query_scalar(UPDATE_ENTRY), id, update)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| AppError::not_found(id))?;

        self.stage(business_id, id, RowOp::Update);
        Ok(())
    }

    async fn delete(&mut self, id: &EntryId) -> Result<()> {
        let business_id: Option<String> = sqlx::query_scalar(DELETE_ENTRY)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(business_id) = business_id {
            self.stage(business_id, id, RowOp::Delete);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{create_pool, run_migrations, SqliteEntryRepository};
    use queueline_core::domain::{EntryStatus, QueueEntry};
    use queueline_core::port::{
        ChangeStream, EntryRepository, EntryScope, EntryUpdate, RowOp,
        TransactionalEntryRepository,
    };

    async fn setup_test_repo() -> SqliteEntryRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteEntryRepository::new(pool)
    }

    fn waiting(id: &str, position: u32) -> QueueEntry {
        let mut e = QueueEntry::create(id, position as i64, "biz", id, None).unwrap();
        e.position = position;
        e
    }

    #[tokio::test]
    async fn test_commit_applies_all_and_emits_after() {
        let repo = setup_test_repo().await;
        repo.insert(&waiting("a", 1)).await.unwrap();
        repo.insert(&waiting("b", 2)).await.unwrap();
        let mut changes = repo.subscribe_changes();

        let mut tx = repo.begin_transaction().await.unwrap();
        tx.update(
            &"a".to_string(),
            &EntryUpdate {
                status: Some(EntryStatus::Cancelled),
                position: Some(0),
                finished_at: Some(99),
                ..EntryUpdate::default()
            },
        )
        .await
        .unwrap();
        tx.update(
            &"b".to_string(),
            &EntryUpdate {
                position: Some(1),
                ..EntryUpdate::default()
            },
        )
        .await
        .unwrap();

        // Nothing announced before commit
        assert!(changes.try_recv().is_err());
        tx.commit().await.unwrap();

        let first = changes.recv().await.unwrap();
        let second = changes.recv().await.unwrap();
        assert_eq!((first.entry_id.as_str(), first.op), ("a", RowOp::Update));
        assert_eq!((second.entry_id.as_str(), second.op), ("b", RowOp::Update));

        let active = repo
            .list_by_business("biz", EntryScope::Active)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "b");
        assert_eq!(active[0].position, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes_and_events() {
        let repo = setup_test_repo().await;
        let mut changes = repo.subscribe_changes();

        let mut tx = repo.begin_transaction().await.unwrap();
        tx.insert(&waiting("a", 1)).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(repo.find_by_id(&"a".to_string()).await.unwrap().is_none());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let repo = setup_test_repo().await;
        {
            let mut tx = repo.begin_transaction().await.unwrap();
            tx.insert(&waiting("a", 1)).await.unwrap();
        }
        assert!(repo.find_by_id(&"a".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_of_missing_row_fails() {
        let repo = setup_test_repo().await;
        let mut tx = repo.begin_transaction().await.unwrap();
        let err = tx
            .update(
                &"ghost".to_string(),
                &EntryUpdate {
                    position: Some(1),
                    ..EntryUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            queueline_core::AppError::NotFound { .. }
        ));
        tx.rollback().await.unwrap();
    }
}

// SQLite EntryRepository Implementation

use crate::SqliteEntryTransaction;
use async_trait::async_trait;
use queueline_core::domain::{EntryId, EntryStatus, QueueEntry};
use queueline_core::error::{AppError, Result};
use queueline_core::port::change_stream::CHANGE_STREAM_CAPACITY;
use queueline_core::port::{
    ChangeStream, EntryRepository, EntryScope, EntryTransaction, EntryUpdate, RowChange, RowOp,
    TransactionalEntryRepository,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return AppError::Storage(format!("Database error: {}", db_err.message()));
            };

            // SQLite result codes: https://www.sqlite.org/rescode.html
            match code.as_ref() {
                "2067" | "1555" => AppError::Storage(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "275" => AppError::Storage(format!(
                    "Check constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "5" => AppError::Storage(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Storage(format!("Database full: {}", db_err.message())),
                other => AppError::Storage(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::Storage("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Storage(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Storage(err.to_string()),
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, business_id, customer_name, phone_number, position, status,
           joined_at, serving_started_at, finished_at, expected_wait_time_minutes
    FROM queue_entries
"#;

pub(crate) const INSERT_ENTRY: &str = r#"
    INSERT INTO queue_entries (
        id, business_id, customer_name, phone_number, position, status,
        joined_at, serving_started_at, finished_at, expected_wait_time_minutes
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Partial update: NULL parameters keep the stored value
pub(crate) const UPDATE_ENTRY: &str = r#"
    UPDATE queue_entries
    SET status = COALESCE(?, status),
        position = COALESCE(?, position),
        expected_wait_time_minutes = COALESCE(?, expected_wait_time_minutes),
        serving_started_at = COALESCE(?, serving_started_at),
        finished_at = COALESCE(?, finished_at)
    WHERE id = ?
    RETURNING business_id
"#;

pub(crate) const DELETE_ENTRY: &str =
    "DELETE FROM queue_entries WHERE id = ? RETURNING business_id";

/// Bind an insert of `entry` to a query built from `INSERT_ENTRY`
pub(crate) fn bind_insert<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    entry: &'q QueueEntry,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&entry.id)
        .bind(&entry.business_id)
        .bind(&entry.customer_name)
        .bind(&entry.phone_number)
        .bind(entry.position as i64)
        .bind(entry.status.as_str())
        .bind(entry.joined_at)
        .bind(entry.serving_started_at)
        .bind(entry.finished_at)
        .bind(entry.expected_wait_time_minutes as i64)
}

/// Bind an update to a query built from `UPDATE_ENTRY`
pub(crate) fn bind_update<'q>(
    query: sqlx::query::QueryScalar<'q, sqlx::Sqlite, String, sqlx::sqlite::SqliteArguments<'q>>,
    id: &'q EntryId,
    update: &'q EntryUpdate,
) -> sqlx::query::QueryScalar<'q, sqlx::Sqlite, String, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(update.status.map(EntryStatus::as_str))
        .bind(update.position.map(i64::from))
        .bind(update.expected_wait_time_minutes.map(i64::from))
        .bind(update.serving_started_at)
        .bind(update.finished_at)
        .bind(id)
}

pub struct SqliteEntryRepository {
    pool: SqlitePool,
    changes: broadcast::Sender<RowChange>,
}

impl SqliteEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_STREAM_CAPACITY);
        Self { pool, changes }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn emit(&self, business_id: String, entry_id: &str, op: RowOp) {
        // No receivers is fine
        let _ = self.changes.send(RowChange {
            business_id,
            entry_id: entry_id.to_string(),
            op,
        });
    }
}

#[async_trait]
impl EntryRepository for SqliteEntryRepository {
    async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        bind_insert(sqlx::query(INSERT_ENTRY), entry)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        self.emit(entry.business_id.clone(), &entry.id, RowOp::Insert);
        Ok(())
    }

    async fn update(&self, id: &EntryId, update: &EntryUpdate) -> Result<()> {
        let business_id = bind_update(sqlx::query_scalar(UPDATE_ENTRY), id, update)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| AppError::not_found(id))?;

        self.emit(business_id, id, RowOp::Update);
        Ok(())
    }

    async fn delete(&self, id: &EntryId) -> Result<bool> {
        let business_id: Option<String> = sqlx::query_scalar(DELETE_ENTRY)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match business_id {
            Some(business_id) => {
                self.emit(business_id, id, RowOp::Delete);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &EntryId) -> Result<Option<QueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(EntryRow::into_entry).transpose()
    }

    async fn list_by_business(
        &self,
        business_id: &str,
        scope: EntryScope,
    ) -> Result<Vec<QueueEntry>> {
        let filter = match scope {
            EntryScope::Active => "AND status IN ('waiting', 'serving')",
            EntryScope::All => "",
        };
        let sql = format!(
            r#"{} WHERE business_id = ? {}
            ORDER BY CASE WHEN status IN ('waiting', 'serving') THEN 0 ELSE 1 END,
                     position ASC, joined_at ASC, id ASC"#,
            SELECT_COLUMNS, filter
        );

        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(business_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(business_id, rows = rows.len(), ?scope, "Listed queue entries");
        rows.into_iter().map(EntryRow::into_entry).collect()
    }
}

#[async_trait]
impl TransactionalEntryRepository for SqliteEntryRepository {
    async fn begin_transaction(&self) -> Result<Box<dyn EntryTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteEntryTransaction::new(tx, self.changes.clone())))
    }
}

impl ChangeStream for SqliteEntryRepository {
    fn subscribe_changes(&self) -> broadcast::Receiver<RowChange> {
        self.changes.subscribe()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: String,
    business_id: String,
    customer_name: String,
    phone_number: Option<String>,
    position: i64,
    status: String,
    joined_at: i64,
    serving_started_at: Option<i64>,
    finished_at: Option<i64>,
    expected_wait_time_minutes: i64,
}

impl EntryRow {
    fn into_entry(self) -> Result<QueueEntry> {
        let status: EntryStatus = self.status.parse().map_err(|_| {
            AppError::Storage(format!(
                "Entry {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        let position = column_u32(&self.id, "position", self.position)?;
        let expected_wait_time_minutes =
            column_u32(&self.id, "expected_wait_time_minutes", self.expected_wait_time_minutes)?;

        Ok(QueueEntry {
            id: self.id,
            business_id: self.business_id,
            customer_name: self.customer_name,
            phone_number: self.phone_number,
            position,
            status,
            joined_at: self.joined_at,
            serving_started_at: self.serving_started_at,
            finished_at: self.finished_at,
            expected_wait_time_minutes,
        })
    }
}

fn column_u32(id: &str, column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        AppError::Storage(format!("Entry {} has out-of-range {} {}", id, column, value))
    })
}

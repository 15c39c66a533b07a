// Queueline Infrastructure - SQLite Adapter
// Implements: EntryRepository, TransactionalEntryRepository, ChangeStream

mod connection;
mod entry_repository;
mod migration;
mod transaction;

pub use connection::create_pool;
pub use entry_repository::SqliteEntryRepository;
pub use migration::run_migrations;
pub use transaction::SqliteEntryTransaction;

// Note: sqlx::Error conversion is handled by a helper function (map_sqlx_error)
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)

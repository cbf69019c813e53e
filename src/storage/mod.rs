//! Persistence layer.
//!
//! Everything the bot remembers lives in one SQLite database: users and
//! their download counters, admins with permission flags, mandatory
//! channels, editable settings and an action log.

mod backup;
mod database;
pub mod models;

use std::path::PathBuf;

pub use backup::create_database_backup;
pub use database::Database;
pub use models::{
    ActivityPeriods, AdminPermission, AdminPermissions, AdminRecord, Channel, DetailedStatistics,
    LogEntry, UserCounts, UserRecord,
};

/// Errors raised by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database file not found: {}", .0.display())]
    MissingDatabase(PathBuf),

    #[error("Unknown admin permission: {0}")]
    UnknownPermission(String),
}

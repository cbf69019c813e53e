//! Point-in-time database backups.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use super::{Database, StorageError};

/// Writes a consistent copy of the database into `backup_dir`.
///
/// The copy is produced with `VACUUM INTO`, so pages still sitting in the
/// write-ahead log are included and the file is compacted.
pub async fn create_database_backup(
    db: &Database,
    backup_dir: impl AsRef<Path>,
) -> Result<PathBuf, StorageError> {
    if !db.path().exists() {
        return Err(StorageError::MissingDatabase(db.path().to_path_buf()));
    }

    let backup_dir = backup_dir.as_ref();
    std::fs::create_dir_all(backup_dir)?;

    let target = backup_dir.join(backup_file_name(Utc::now()));
    if target.exists() {
        std::fs::remove_file(&target)?;
    }

    sqlx::query("VACUUM INTO ?")
        .bind(target.to_string_lossy().into_owned())
        .execute(db.pool())
        .await?;

    info!("Database backup written to {}", target.display());
    Ok(target)
}

/// `bot_backup_YYYYmmdd_HHMMSS.db`
fn backup_file_name(at: chrono::DateTime<Utc>) -> String {
    format!("bot_backup_{}.db", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_file_name() {
        let at = chrono::DateTime::parse_from_rfc3339("2024-03-09T07:05:01Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(backup_file_name(at), "bot_backup_20240309_070501.db");
    }

    #[tokio::test]
    async fn test_backup_contains_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("bot.db")).await.unwrap();
        db.add_or_update_user(99, Some("keeper"), None).await.unwrap();

        let path = create_database_backup(&db, dir.path().join("backups"))
            .await
            .unwrap();
        assert!(path.exists());
        assert!(path.starts_with(dir.path().join("backups")));

        let copy = Database::open(&path).await.unwrap();
        assert_eq!(copy.user_ids().await.unwrap(), vec![99]);
    }

    #[tokio::test]
    async fn test_backup_requires_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("bot.db")).await.unwrap();
        std::fs::remove_file(db.path()).unwrap();

        let result = create_database_backup(&db, dir.path().join("backups")).await;
        assert!(matches!(result, Err(StorageError::MissingDatabase(_))));
    }
}

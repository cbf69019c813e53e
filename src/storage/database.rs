//! SQLite-backed persistence for users, admins, channels, settings and logs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::StorageError;
use super::models::{
    ActivityPeriods, AdminPermission, AdminPermissions, AdminRecord, Channel, DetailedStatistics,
    LogEntry, UserCounts, UserRecord, format_timestamp,
};
use crate::config::defaults::{DEFAULT_SETTINGS, default_setting};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        join_date TEXT,
        last_active TEXT,
        downloads_count INTEGER DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS admins (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        can_manage_users INTEGER DEFAULT 0,
        can_manage_channels INTEGER DEFAULT 0,
        can_broadcast INTEGER DEFAULT 0,
        can_view_stats INTEGER DEFAULT 0,
        can_manage_admins INTEGER DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS channels (
        channel_id TEXT PRIMARY KEY,
        title TEXT,
        link TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT
    )",
    "CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        action TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )",
];

const USER_COLUMNS: &str =
    "user_id, username, first_name, join_date, last_active, downloads_count";

/// Handle to the bot database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and brings the schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool, path };
        db.initialize().await?;
        info!("Database ready at {}", db.path.display());
        Ok(db)
    }

    /// Path of the underlying database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Direct pool access for maintenance statements such as `VACUUM INTO`.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        self.ensure_admin_permission_columns().await?;

        for &(key, value) in DEFAULT_SETTINGS {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Databases created before permissions existed only have `user_id` and `username`.
    async fn ensure_admin_permission_columns(&self) -> Result<(), StorageError> {
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('admins')")
                .fetch_all(&self.pool)
                .await?;

        for permission in AdminPermission::ALL {
            let column = permission.column();
            if !existing.iter().any(|c| c == column) {
                debug!("Adding missing admins column {}", column);
                sqlx::query(&format!(
                    "ALTER TABLE admins ADD COLUMN {column} INTEGER DEFAULT 0"
                ))
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Inserts a user or refreshes their names and activity. `join_date` is kept.
    pub async fn add_or_update_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO users (user_id, username, first_name, join_date, last_active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_active = excluded.last_active",
        )
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_last_active(&self, user_id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE users SET last_active = ? WHERE user_id = ?")
            .bind(format_timestamp(Utc::now()))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_downloads(&self, user_id: i64, count: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE users SET downloads_count = downloads_count + ? WHERE user_id = ?")
            .bind(count)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every known user id, used as the broadcast audience.
    pub async fn user_ids(&self) -> Result<Vec<i64>, StorageError> {
        Ok(sqlx::query_scalar("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn user(&self, user_id: i64) -> Result<Option<UserRecord>, StorageError> {
        Ok(
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Totals and active-user windows for today, 7 days and 30 days.
    pub async fn user_counts(&self) -> Result<UserCounts, StorageError> {
        self.user_counts_at(Utc::now().date_naive()).await
    }

    async fn user_counts_at(&self, today: NaiveDate) -> Result<UserCounts, StorageError> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let total_downloads: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(downloads_count), 0) FROM users")
                .fetch_one(&self.pool)
                .await?;

        Ok(UserCounts {
            total_users,
            active_today: self.active_since(window_start(today, 1)).await?,
            active_week: self.active_since(window_start(today, 7)).await?,
            active_month: self.active_since(window_start(today, 30)).await?,
            total_downloads,
        })
    }

    async fn active_since(&self, day: NaiveDate) -> Result<i64, StorageError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE DATE(last_active) >= ?")
                .bind(day.to_string())
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Join days of users who joined within the last `limit_days` days.
    pub async fn join_days(&self, limit_days: u32) -> Result<Vec<NaiveDate>, StorageError> {
        let threshold = Utc::now() - chrono::Duration::days(i64::from(limit_days));
        let rows: Vec<Option<String>> = sqlx::query_scalar(
            "SELECT DATE(join_date) FROM users WHERE datetime(join_date) >= datetime(?)",
        )
        .bind(format_timestamp(threshold))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .flatten()
            .filter_map(|day| day.parse().ok())
            .collect())
    }

    /// Users active within the last 30 days, most recent first.
    pub async fn monthly_active_users(&self, limit: u32) -> Result<Vec<UserRecord>, StorageError> {
        let threshold = Utc::now() - chrono::Duration::days(30);
        Ok(sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE datetime(last_active) >= datetime(?)
             ORDER BY datetime(last_active) DESC
             LIMIT ?"
        ))
        .bind(format_timestamp(threshold))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?)
    }

    /// Number of users active in the last 30 days.
    pub async fn monthly_active_count(&self) -> Result<i64, StorageError> {
        let threshold = Utc::now() - chrono::Duration::days(30);
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE datetime(last_active) >= datetime(?)",
        )
        .bind(format_timestamp(threshold))
        .fetch_one(&self.pool)
        .await?)
    }

    /// Full breakdown for the detailed statistics screen.
    pub async fn detailed_statistics(&self) -> Result<DetailedStatistics, StorageError> {
        self.detailed_statistics_at(Utc::now()).await
    }

    async fn detailed_statistics_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DetailedStatistics, StorageError> {
        let today = now.date_naive();

        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let (total_downloads, avg_downloads): (i64, f64) = sqlx::query_as(
            "SELECT COALESCE(SUM(downloads_count), 0), COALESCE(AVG(downloads_count), 0.0)
             FROM users WHERE downloads_count > 0",
        )
        .fetch_one(&self.pool)
        .await?;

        // "Yesterday" spans the two days before today.
        let activity = ActivityPeriods {
            today: self.active_since(today).await?,
            yesterday: sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE DATE(last_active) BETWEEN ? AND ?",
            )
            .bind(window_start(today, 3).to_string())
            .bind(window_start(today, 2).to_string())
            .fetch_one(&self.pool)
            .await?,
            week: self.active_since(window_start(today, 7)).await?,
            month: self.active_since(window_start(today, 30)).await?,
            three_months: self.active_since(window_start(today, 90)).await?,
        };

        let daily_activity = self.per_day_counts("last_active", today, 30).await?;
        let new_users_weekly = self.per_day_counts("join_date", today, 7).await?;

        let mut hourly_activity = [0_i64; 24];
        let hourly: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT CAST(strftime('%H', datetime(last_active)) AS INTEGER) AS hour, COUNT(*)
             FROM users
             WHERE DATE(last_active) = ?
             GROUP BY hour",
        )
        .bind(today.to_string())
        .fetch_all(&self.pool)
        .await?;
        for (hour, count) in hourly {
            if let Some(slot) = usize::try_from(hour).ok().and_then(|h| hourly_activity.get_mut(h))
            {
                *slot = count;
            }
        }

        let top_downloaders = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE downloads_count > 0
             ORDER BY downloads_count DESC
             LIMIT 5"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(DetailedStatistics {
            total_users,
            total_downloads,
            avg_downloads: (avg_downloads * 10.0).round() / 10.0,
            activity,
            daily_activity,
            hourly_activity,
            new_users_weekly,
            top_downloaders,
            generated_at: now,
        })
    }

    /// Per-day row counts over the `days` calendar days ending today, zero-filled.
    async fn per_day_counts(
        &self,
        column: &'static str,
        today: NaiveDate,
        days: u64,
    ) -> Result<Vec<(NaiveDate, i64)>, StorageError> {
        let start = window_start(today, days);
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT DATE({column}) AS day, COUNT(*)
             FROM users
             WHERE DATE({column}) >= ? AND DATE({column}) <= ?
             GROUP BY day"
        ))
        .bind(start.to_string())
        .bind(today.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(start
            .iter_days()
            .take_while(|day| *day <= today)
            .map(|day| {
                let key = day.to_string();
                let count = rows
                    .iter()
                    .find(|(d, _)| *d == key)
                    .map_or(0, |(_, c)| *c);
                (day, count)
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Admins
    // ------------------------------------------------------------------

    /// Adds an admin. An existing entry is left untouched.
    pub async fn add_admin(&self, user_id: i64, username: Option<&str>) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO admins (user_id, username) VALUES (?, ?)")
            .bind(user_id)
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes an admin. Returns whether a row was deleted.
    pub async fn remove_admin(&self, user_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM admins WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn admins(&self) -> Result<Vec<AdminRecord>, StorageError> {
        Ok(
            sqlx::query_as("SELECT user_id, username FROM admins ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn is_admin(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admins WHERE user_id = ?)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Permission flags of an admin, or `None` if the user is not an admin.
    pub async fn admin_permissions(
        &self,
        user_id: i64,
    ) -> Result<Option<AdminPermissions>, StorageError> {
        Ok(sqlx::query_as(
            "SELECT can_manage_users, can_manage_channels, can_broadcast,
                    can_view_stats, can_manage_admins
             FROM admins WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn set_admin_permission(
        &self,
        user_id: i64,
        permission: AdminPermission,
        value: bool,
    ) -> Result<(), StorageError> {
        // Column names come from a closed enum, never from user input.
        sqlx::query(&format!(
            "UPDATE admins SET {} = ? WHERE user_id = ?",
            permission.column()
        ))
        .bind(i64::from(value))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn has_permission(
        &self,
        user_id: i64,
        permission: AdminPermission,
    ) -> Result<bool, StorageError> {
        Ok(self
            .admin_permissions(user_id)
            .await?
            .is_some_and(|p| p.get(permission)))
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Adds or replaces a mandatory channel.
    pub async fn add_channel(
        &self,
        channel_id: &str,
        title: &str,
        link: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO channels (channel_id, title, link) VALUES (?, ?, ?)")
            .bind(channel_id)
            .bind(title)
            .bind(link)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes a channel. Returns whether a row was deleted.
    pub async fn remove_channel(&self, channel_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM channels WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Channels ordered by title, case-insensitively.
    pub async fn channels(&self) -> Result<Vec<Channel>, StorageError> {
        Ok(sqlx::query_as(
            "SELECT channel_id, title, link FROM channels ORDER BY title COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    /// Stored value, or the factory default when the key was never set.
    pub async fn setting_or_default(&self, key: &str) -> Result<String, StorageError> {
        Ok(self
            .setting(key)
            .await?
            .or_else(|| default_setting(key).map(str::to_owned))
            .unwrap_or_default())
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Action log
    // ------------------------------------------------------------------

    pub async fn add_log(&self, user_id: Option<i64>, action: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO logs (user_id, action, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(action)
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent log entries, newest first.
    pub async fn recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>, StorageError> {
        Ok(sqlx::query_as(
            "SELECT user_id, action, created_at FROM logs ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?)
    }
}

/// First day of a window of `days` calendar days ending on `today`.
fn window_start(today: NaiveDate, days: u64) -> NaiveDate {
    today
        .checked_sub_days(Days::new(days.saturating_sub(1)))
        .unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::{SHARE_BUTTON_TEXT, START_TEXT, SUBSCRIPTION_ENABLED};

    async fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("data").join("bot.db"))
            .await
            .unwrap();
        (dir, db)
    }

    async fn set_user_times(db: &Database, user_id: i64, joined: &str, active: &str) {
        sqlx::query("UPDATE users SET join_date = ?, last_active = ? WHERE user_id = ?")
            .bind(joined)
            .bind(active)
            .bind(user_id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_seeds_default_settings() {
        let (_dir, db) = open_temp().await;
        let start = db.setting(START_TEXT).await.unwrap().unwrap();
        assert!(start.starts_with("Assalomu alaykum"));
        assert_eq!(
            db.setting(SHARE_BUTTON_TEXT).await.unwrap().as_deref(),
            Some("♻️ Do'stlarga ulashish")
        );
        assert_eq!(db.setting(SUBSCRIPTION_ENABLED).await.unwrap(), None);
        assert_eq!(db.setting_or_default(SUBSCRIPTION_ENABLED).await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_reopen_keeps_edited_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");

        let db = Database::open(&path).await.unwrap();
        db.set_setting(START_TEXT, "Salom").await.unwrap();
        db.close().await;

        let db = Database::open(&path).await.unwrap();
        assert_eq!(db.setting(START_TEXT).await.unwrap().as_deref(), Some("Salom"));
    }

    #[tokio::test]
    async fn test_legacy_admins_table_gains_permission_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let options = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true);
            let pool = SqlitePool::connect_with(options).await.unwrap();
            sqlx::query("CREATE TABLE admins (user_id INTEGER PRIMARY KEY, username TEXT)")
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query("INSERT INTO admins (user_id, username) VALUES (7, 'old')")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let db = Database::open(&path).await.unwrap();
        let perms = db.admin_permissions(7).await.unwrap().unwrap();
        assert_eq!(perms, AdminPermissions::default());

        db.set_admin_permission(7, AdminPermission::Broadcast, true)
            .await
            .unwrap();
        assert!(db.has_permission(7, AdminPermission::Broadcast).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_keeps_join_date() {
        let (_dir, db) = open_temp().await;
        db.add_or_update_user(1, Some("first"), Some("One")).await.unwrap();
        set_user_times(&db, 1, "2020-01-01T00:00:00Z", "2020-01-01T00:00:00Z").await;

        db.add_or_update_user(1, Some("renamed"), Some("Uno")).await.unwrap();
        let user = db.user(1).await.unwrap().unwrap();

        assert_eq!(user.username.as_deref(), Some("renamed"));
        assert_eq!(user.first_name.as_deref(), Some("Uno"));
        assert_eq!(
            user.join_date.map(format_timestamp).as_deref(),
            Some("2020-01-01T00:00:00Z")
        );
        assert!(user.last_active.unwrap() > user.join_date.unwrap());
    }

    #[tokio::test]
    async fn test_increment_downloads_and_counts() {
        let (_dir, db) = open_temp().await;
        db.add_or_update_user(1, None, Some("A")).await.unwrap();
        db.add_or_update_user(2, None, Some("B")).await.unwrap();
        db.add_or_update_user(3, None, Some("C")).await.unwrap();
        db.increment_downloads(1, 1).await.unwrap();
        db.increment_downloads(1, 2).await.unwrap();
        db.increment_downloads(2, 1).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        set_user_times(&db, 1, "2024-06-01T00:00:00Z", "2024-06-30T09:00:00Z").await;
        set_user_times(&db, 2, "2024-06-01T00:00:00Z", "2024-06-25T09:00:00Z").await;
        set_user_times(&db, 3, "2024-05-01T00:00:00Z", "2024-05-15T09:00:00Z").await;

        let counts = db.user_counts_at(today).await.unwrap();
        assert_eq!(
            counts,
            UserCounts {
                total_users: 3,
                active_today: 1,
                active_week: 2,
                active_month: 2,
                total_downloads: 4,
            }
        );
        assert_eq!(db.user_ids().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_monthly_active_users_ordering() {
        let (_dir, db) = open_temp().await;
        for id in 1..=3 {
            db.add_or_update_user(id, None, None).await.unwrap();
        }
        let now = Utc::now();
        let recent = format_timestamp(now - chrono::Duration::hours(1));
        let older = format_timestamp(now - chrono::Duration::days(3));
        let stale = format_timestamp(now - chrono::Duration::days(45));
        set_user_times(&db, 1, &stale, &older).await;
        set_user_times(&db, 2, &stale, &recent).await;
        set_user_times(&db, 3, &stale, &stale).await;

        let users = db.monthly_active_users(25).await.unwrap();
        let ids: Vec<i64> = users.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(db.monthly_active_count().await.unwrap(), 2);
        assert!(db.join_days(30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_yesterday_window_covers_two_days() {
        let (_dir, db) = open_temp().await;
        for id in 1..=4 {
            db.add_or_update_user(id, None, None).await.unwrap();
        }
        let now = DateTime::parse_from_rfc3339("2024-06-30T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        set_user_times(&db, 1, "2024-06-01T08:00:00Z", "2024-06-30T09:00:00Z").await;
        set_user_times(&db, 2, "2024-06-01T08:00:00Z", "2024-06-29T23:00:00Z").await;
        set_user_times(&db, 3, "2024-06-01T08:00:00Z", "2024-06-28T00:30:00Z").await;
        set_user_times(&db, 4, "2024-06-01T08:00:00Z", "2024-06-27T12:00:00Z").await;

        let stats = db.detailed_statistics_at(now).await.unwrap();
        assert_eq!(stats.activity.today, 1);
        assert_eq!(stats.activity.yesterday, 2);
    }

    #[tokio::test]
    async fn test_detailed_statistics_breakdown() {
        let (_dir, db) = open_temp().await;
        for id in 1..=3 {
            db.add_or_update_user(id, Some(&format!("u{id}")), None).await.unwrap();
        }
        db.increment_downloads(1, 4).await.unwrap();
        db.increment_downloads(2, 1).await.unwrap();

        let now = DateTime::parse_from_rfc3339("2024-06-30T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        set_user_times(&db, 1, "2024-06-30T08:00:00Z", "2024-06-30T14:10:00Z").await;
        set_user_times(&db, 2, "2024-06-28T08:00:00Z", "2024-06-29T10:00:00Z").await;
        set_user_times(&db, 3, "2024-04-15T08:00:00Z", "2024-04-15T08:00:00Z").await;

        let stats = db.detailed_statistics_at(now).await.unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.total_downloads, 5);
        assert!((stats.avg_downloads - 2.5).abs() < f64::EPSILON);
        assert_eq!(stats.activity.today, 1);
        assert_eq!(stats.activity.yesterday, 1);
        assert_eq!(stats.activity.week, 2);
        assert_eq!(stats.activity.three_months, 3);
        assert_eq!(stats.hourly_activity[14], 1);
        assert_eq!(stats.hourly_activity.iter().sum::<i64>(), 1);

        assert_eq!(stats.daily_activity.len(), 30);
        assert_eq!(
            stats.daily_activity.last(),
            Some(&(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(), 1))
        );
        assert_eq!(stats.new_users_weekly.len(), 7);
        assert_eq!(stats.new_users_weekly.iter().map(|(_, c)| c).sum::<i64>(), 2);

        let top: Vec<i64> = stats.top_downloaders.iter().map(|u| u.user_id).collect();
        assert_eq!(top, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_admin_lifecycle() {
        let (_dir, db) = open_temp().await;
        db.add_admin(10, Some("boss")).await.unwrap();
        db.add_admin(10, Some("ignored")).await.unwrap();
        db.add_admin(5, None).await.unwrap();

        let admins = db.admins().await.unwrap();
        assert_eq!(admins.len(), 2);
        assert_eq!(admins[0].user_id, 5);
        assert_eq!(admins[1].username.as_deref(), Some("boss"));

        assert!(db.is_admin(10).await.unwrap());
        assert!(db.remove_admin(10).await.unwrap());
        assert!(!db.remove_admin(10).await.unwrap());
        assert!(!db.is_admin(10).await.unwrap());
        assert_eq!(db.admin_permissions(10).await.unwrap(), None);
        assert!(!db.has_permission(10, AdminPermission::ViewStats).await.unwrap());
    }

    #[tokio::test]
    async fn test_channels_sorted_and_replaced() {
        let (_dir, db) = open_temp().await;
        db.add_channel("-1002", "beta", "https://t.me/beta").await.unwrap();
        db.add_channel("-1001", "Alpha", "https://t.me/alpha").await.unwrap();
        db.add_channel("-1002", "Beta News", "https://t.me/beta").await.unwrap();

        let channels = db.channels().await.unwrap();
        let titles: Vec<&str> = channels.iter().map(Channel::label).collect();
        assert_eq!(titles, vec!["Alpha", "Beta News"]);

        assert!(db.remove_channel("-1001").await.unwrap());
        assert_eq!(db.channels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_logs_newest_first() {
        let (_dir, db) = open_temp().await;
        db.add_log(Some(1), "start_command").await.unwrap();
        db.add_log(None, "backup_created").await.unwrap();
        db.add_log(Some(2), "download:https://youtu.be/x").await.unwrap();

        let logs = db.recent_logs(2).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "download:https://youtu.be/x");
        assert_eq!(logs[1].user_id, None);
        assert!(logs[0].created_at.is_some());
    }
}

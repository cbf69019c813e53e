//! Row types returned by the database layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::StorageError;

/// Formats a timestamp the way every table stores it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a stored timestamp. Rows written by older deployments may carry
/// fractional seconds or an explicit `+00:00` offset; both are accepted.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .ok()
}

fn timestamp_column(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// A bot user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub join_date: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub downloads_count: i64,
}

impl UserRecord {
    /// `@username`, else the first name, else the numeric id.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return format!("@{username}");
        }
        self.first_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

impl sqlx::FromRow<'_, SqliteRow> for UserRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            first_name: row.try_get("first_name")?,
            join_date: timestamp_column(row, "join_date")?,
            last_active: timestamp_column(row, "last_active")?,
            downloads_count: row.try_get::<Option<i64>, _>("downloads_count")?.unwrap_or(0),
        })
    }
}

/// Aggregate user counters shown on the statistics screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounts {
    pub total_users: i64,
    pub active_today: i64,
    pub active_week: i64,
    pub active_month: i64,
    pub total_downloads: i64,
}

/// An admin entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRecord {
    pub user_id: i64,
    pub username: Option<String>,
}

impl AdminRecord {
    /// Username when known, else the numeric id.
    #[must_use]
    pub fn label(&self) -> String {
        self.username
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

impl sqlx::FromRow<'_, SqliteRow> for AdminRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
        })
    }
}

/// Fine-grained admin capability. Stored as one column per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminPermission {
    ManageUsers,
    ManageChannels,
    Broadcast,
    ViewStats,
    ManageAdmins,
}

impl AdminPermission {
    /// Every permission, in display order.
    pub const ALL: [Self; 5] = [
        Self::ManageUsers,
        Self::ManageChannels,
        Self::Broadcast,
        Self::ViewStats,
        Self::ManageAdmins,
    ];

    /// Column name in the `admins` table.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::ManageUsers => "can_manage_users",
            Self::ManageChannels => "can_manage_channels",
            Self::Broadcast => "can_broadcast",
            Self::ViewStats => "can_view_stats",
            Self::ManageAdmins => "can_manage_admins",
        }
    }

    /// Human-readable label used on permission buttons.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ManageUsers => "👥 Foydalanuvchilar",
            Self::ManageChannels => "📢 Kanallar",
            Self::Broadcast => "📨 Xabar yuborish",
            Self::ViewStats => "📊 Statistika",
            Self::ManageAdmins => "👑 Adminlar",
        }
    }

    /// Full name shown on the permissions screen.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::ManageUsers => "👥 Foydalanuvchilarni boshqarish",
            Self::ManageChannels => "📢 Kanallarni boshqarish",
            Self::Broadcast => "📨 Xabar yuborish",
            Self::ViewStats => "📊 Statistikani ko'rish",
            Self::ManageAdmins => "👑 Adminlarni boshqarish",
        }
    }
}

impl fmt::Display for AdminPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for AdminPermission {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.column() == s)
            .ok_or_else(|| StorageError::UnknownPermission(s.to_owned()))
    }
}

/// Permission flags of one admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminPermissions {
    pub manage_users: bool,
    pub manage_channels: bool,
    pub broadcast: bool,
    pub view_stats: bool,
    pub manage_admins: bool,
}

impl AdminPermissions {
    /// Returns whether the given permission is granted.
    #[must_use]
    pub const fn get(&self, permission: AdminPermission) -> bool {
        match permission {
            AdminPermission::ManageUsers => self.manage_users,
            AdminPermission::ManageChannels => self.manage_channels,
            AdminPermission::Broadcast => self.broadcast,
            AdminPermission::ViewStats => self.view_stats,
            AdminPermission::ManageAdmins => self.manage_admins,
        }
    }
}

impl sqlx::FromRow<'_, SqliteRow> for AdminPermissions {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let flag = |column: &str| -> Result<bool, sqlx::Error> {
            Ok(row.try_get::<Option<i64>, _>(column)?.unwrap_or(0) != 0)
        };
        Ok(Self {
            manage_users: flag(AdminPermission::ManageUsers.column())?,
            manage_channels: flag(AdminPermission::ManageChannels.column())?,
            broadcast: flag(AdminPermission::Broadcast.column())?,
            view_stats: flag(AdminPermission::ViewStats.column())?,
            manage_admins: flag(AdminPermission::ManageAdmins.column())?,
        })
    }
}

/// A mandatory-subscription channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Numeric chat id (`-100…`) or `@username`, as accepted by `getChatMember`.
    pub channel_id: String,
    pub title: Option<String>,
    /// Public or invite link shown to users.
    pub link: String,
}

impl Channel {
    /// Title when set, else the link.
    #[must_use]
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.link)
    }
}

impl sqlx::FromRow<'_, SqliteRow> for Channel {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            channel_id: row.try_get("channel_id")?,
            title: row.try_get("title")?,
            link: row.try_get("link")?,
        })
    }
}

/// One entry of the action log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub user_id: Option<i64>,
    pub action: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, SqliteRow> for LogEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            action: row.try_get::<Option<String>, _>("action")?.unwrap_or_default(),
            created_at: timestamp_column(row, "created_at")?,
        })
    }
}

/// Active-user counts over fixed windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityPeriods {
    pub today: i64,
    pub yesterday: i64,
    pub week: i64,
    pub month: i64,
    pub three_months: i64,
}

/// Everything the detailed statistics screen renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedStatistics {
    pub total_users: i64,
    pub total_downloads: i64,
    /// Mean downloads among users with at least one download, one decimal.
    pub avg_downloads: f64,
    pub activity: ActivityPeriods,
    /// Active users per day, oldest first, 30 entries.
    pub daily_activity: Vec<(NaiveDate, i64)>,
    /// Users last active in each hour of today (UTC).
    pub hourly_activity: [i64; 24],
    /// Users joined per day, oldest first, 7 entries.
    pub new_users_weekly: Vec<(NaiveDate, i64)>,
    pub top_downloaders: Vec<UserRecord>,
    pub generated_at: DateTime<Utc>,
}

//! Settings repository implementation

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::rows::read_required_timestamp;
use crate::error::Result;
use crate::models::{Setting, CURRENT_USER_ID_KEY, LAST_SYNC_SUCCESS_KEY, LAST_SYNC_TIME_KEY};
use crate::util::{epoch, format_timestamp, parse_timestamp};

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load one setting by name
    fn get(&self, name: &str) -> Result<Option<Setting>>;

    /// Insert or replace a setting, keeping its original `created_at`
    fn set(&self, name: &str, value: serde_json::Value, now: DateTime<Utc>) -> Result<()>;

    /// The sync watermark; the epoch when never synced
    fn last_sync_time(&self) -> Result<DateTime<Utc>> {
        let Some(setting) = self.get(LAST_SYNC_TIME_KEY)? else {
            return Ok(epoch());
        };
        match setting.as_str() {
            Some(raw) => parse_timestamp(raw),
            None => Ok(epoch()),
        }
    }

    fn set_last_sync_time(&self, watermark: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        self.set(
            LAST_SYNC_TIME_KEY,
            serde_json::Value::String(format_timestamp(&watermark)),
            now,
        )
    }

    /// When this device last applied a sync response, by its own clock.
    ///
    /// Unlike the watermark this is comparable with local `now`.
    fn last_sync_success(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(setting) = self.get(LAST_SYNC_SUCCESS_KEY)? else {
            return Ok(None);
        };
        setting.as_str().map(parse_timestamp).transpose()
    }

    fn set_last_sync_success(&self, now: DateTime<Utc>) -> Result<()> {
        self.set(
            LAST_SYNC_SUCCESS_KEY,
            serde_json::Value::String(format_timestamp(&now)),
            now,
        )
    }

    /// Id stamped into new records' `user_id`
    fn current_user_id(&self) -> Result<Option<String>> {
        Ok(self
            .get(CURRENT_USER_ID_KEY)?
            .and_then(|setting| setting.as_str().map(str::to_string))
            .filter(|user_id| !user_id.trim().is_empty()))
    }
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get(&self, name: &str) -> Result<Option<Setting>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, value, created_at, updated_at FROM settings WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        read_required_timestamp(row, 2)?,
                        read_required_timestamp(row, 3)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, raw, created_at, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Setting {
            name,
            value: serde_json::from_str(&raw)?,
            created_at,
            updated_at,
        }))
    }

    fn set(&self, name: &str, value: serde_json::Value, now: DateTime<Utc>) -> Result<()> {
        let now = format_timestamp(&now);
        self.conn.execute(
            "INSERT INTO settings (name, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![name, serde_json::to_string(&value)?, now],
        )?;
        Ok(())
    }
}

//! LWW conflict audit

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::rows::{read_id, read_required_timestamp};
use crate::error::Result;
use crate::models::{EntityId, EntityKind, SyncConflict, LWW_STRATEGY};
use crate::util::format_timestamp;

/// `SQLite` storage for rejected remote versions
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record that an incoming version lost to a newer local row.
    pub fn record(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        local_updated_at: DateTime<Utc>,
        incoming_updated_at: DateTime<Utc>,
        resolved_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_conflicts (
                entity_kind, entity_id, local_updated_at, incoming_updated_at, resolved_at, strategy
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                kind.as_str(),
                entity_id.as_str(),
                format_timestamp(&local_updated_at),
                format_timestamp(&incoming_updated_at),
                format_timestamp(&resolved_at),
                LWW_STRATEGY,
            ],
        )?;
        Ok(())
    }

    /// Most recently resolved conflicts first
    pub fn list(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_kind, entity_id, local_updated_at, incoming_updated_at, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let kind: String = row.get(1)?;
            let entity_kind = kind.parse::<EntityKind>().map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?;
            Ok(SyncConflict {
                id: row.get(0)?,
                entity_kind,
                entity_id: read_id(row, 2)?,
                local_updated_at: read_required_timestamp(row, 3)?,
                incoming_updated_at: read_required_timestamp(row, 4)?,
                resolved_at: read_required_timestamp(row, 5)?,
                strategy: row.get(6)?,
            })
        })?;

        let mut conflicts = Vec::new();
        for row in rows {
            conflicts.push(row?);
        }
        Ok(conflicts)
    }
}

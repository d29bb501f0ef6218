//! Pending outgoing changes for the log sync strategy

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};

use super::rows::read_required_timestamp;
use crate::error::Result;
use crate::models::{Change, ChangeLogEntry};
use crate::util::format_timestamp;

/// `SQLite` storage for the change log
pub struct SqliteChangeLog<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteChangeLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append one change; returns its sequence number.
    pub fn append(&self, change: &Change, now: DateTime<Utc>) -> Result<i64> {
        let payload = serde_json::to_string(change)?;
        self.conn.execute(
            "INSERT INTO change_log (entity_kind, entity_id, payload, logged_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                change.kind.as_str(),
                change.id.as_str(),
                payload,
                format_timestamp(&now)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All pending entries in log order
    pub fn pending(&self) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, payload, logged_at FROM change_log ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                read_required_timestamp(row, 2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, payload, logged_at) = row?;
            entries.push(ChangeLogEntry {
                seq,
                change: serde_json::from_str(&payload)?,
                logged_at,
            });
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM change_log", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Delete exactly the given entries; rows appended later are kept.
    pub fn remove(&self, seqs: &[i64]) -> Result<usize> {
        let mut removed = 0;
        for chunk in seqs.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            removed += self.conn.execute(
                &format!("DELETE FROM change_log WHERE seq IN ({placeholders})"),
                params_from_iter(chunk),
            )?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntityKind;
    use crate::util::now_millis;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_and_read_back_in_order() {
        let db = Database::open_in_memory().unwrap();
        let log = SqliteChangeLog::new(db.connection());
        let now = now_millis();

        let mut first = Change::new(EntityKind::Task, "t1".parse().unwrap());
        first.title = Some("one".into());
        let mut second = Change::new(EntityKind::Note, "n1".parse().unwrap());
        second.content = Some("two".into());

        let a = log.append(&first, now).unwrap();
        let b = log.append(&second, now).unwrap();
        assert!(a < b);

        let pending = log.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].change, first);
        assert_eq!(pending[1].change, second);
        assert_eq!(pending[1].logged_at, now);
    }

    #[test]
    fn remove_keeps_entries_not_listed() {
        let db = Database::open_in_memory().unwrap();
        let log = SqliteChangeLog::new(db.connection());
        let now = now_millis();
        let change = Change::new(EntityKind::Task, "t1".parse().unwrap());

        let flushed = log.append(&change, now).unwrap();
        let late = log.append(&change, now).unwrap();

        assert_eq!(log.remove(&[flushed]).unwrap(), 1);
        let pending = log.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seq, late);
        assert_eq!(log.count().unwrap(), 1);
    }
}

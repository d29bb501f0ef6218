//! Row mapping between entity models and their tables

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;

use crate::models::{Collection, Entity, EntityId, Note, Project, Stamps, Task};
use crate::util::{format_timestamp, parse_timestamp};

/// An entity that lives in its own table.
///
/// `COLUMNS` lists every column in the order `to_values` produces and
/// `from_row` reads them; `id` is always first and the four lifecycle stamps
/// always last.
pub trait StoredEntity: Entity {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    /// Column filtered by `ListQuery::parent_id`
    const PARENT_COLUMN: Option<&'static str> = None;
    const HAS_RANK: bool = false;
    const HAS_VIEWED_AT: bool = false;

    fn to_values(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

fn id_value(value: Option<&EntityId>) -> Value {
    text(value.map(EntityId::as_str))
}

fn timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(format_timestamp(&value)))
}

fn stamp_values(stamps: &Stamps) -> [Value; 4] {
    [
        timestamp(Some(stamps.created_at)),
        timestamp(Some(stamps.updated_at)),
        timestamp(stamps.deleted_at),
        timestamp(stamps.synced_at),
    ]
}

/// Read an optional timestamp column.
pub(crate) fn read_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let Some(raw) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    parse_timestamp(&raw)
        .map(Some)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error)))
}

/// Read a timestamp column declared `NOT NULL`.
pub(crate) fn read_required_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    read_timestamp(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "timestamp".to_string(),
        Type::Null,
    ))
}

pub(crate) fn read_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityId> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error)))
}

fn read_optional_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<EntityId>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|raw| raw.parse().ok()))
}

fn read_stamps(row: &Row<'_>, start: usize) -> rusqlite::Result<Stamps> {
    Ok(Stamps {
        created_at: read_required_timestamp(row, start)?,
        updated_at: read_required_timestamp(row, start + 1)?,
        deleted_at: read_timestamp(row, start + 2)?,
        synced_at: read_timestamp(row, start + 3)?,
    })
}

impl StoredEntity for Task {
    const TABLE: &'static str = "tasks";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "project_id",
        "title",
        "description",
        "status",
        "sort_order",
        "due_date",
        "created_at",
        "updated_at",
        "deleted_at",
        "synced_at",
    ];
    const PARENT_COLUMN: Option<&'static str> = Some("project_id");
    const HAS_RANK: bool = true;

    fn to_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Text(self.id.as_str().to_string()),
            text(self.user_id.as_deref()),
            id_value(self.project_id.as_ref()),
            text(self.title.as_deref()),
            text(self.description.as_deref()),
            Value::Integer(i64::from(self.status)),
            text(self.sort_order.as_deref()),
            timestamp(self.due_date),
        ];
        values.extend(stamp_values(&self.stamps));
        values
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: read_id(row, 0)?,
            user_id: row.get(1)?,
            project_id: read_optional_id(row, 2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            sort_order: row.get(6)?,
            due_date: read_timestamp(row, 7)?,
            stamps: read_stamps(row, 8)?,
        })
    }
}

impl StoredEntity for Project {
    const TABLE: &'static str = "projects";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "title",
        "description",
        "color",
        "viewed_at",
        "created_at",
        "updated_at",
        "deleted_at",
        "synced_at",
    ];
    const HAS_VIEWED_AT: bool = true;

    fn to_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Text(self.id.as_str().to_string()),
            text(self.user_id.as_deref()),
            text(self.title.as_deref()),
            text(self.description.as_deref()),
            text(self.color.as_deref()),
            timestamp(self.viewed_at),
        ];
        values.extend(stamp_values(&self.stamps));
        values
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: read_id(row, 0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            color: row.get(4)?,
            viewed_at: read_timestamp(row, 5)?,
            stamps: read_stamps(row, 6)?,
        })
    }
}

impl StoredEntity for Note {
    const TABLE: &'static str = "notes";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "collection_id",
        "title",
        "content",
        "viewed_at",
        "created_at",
        "updated_at",
        "deleted_at",
        "synced_at",
    ];
    const PARENT_COLUMN: Option<&'static str> = Some("collection_id");
    const HAS_VIEWED_AT: bool = true;

    fn to_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Text(self.id.as_str().to_string()),
            text(self.user_id.as_deref()),
            id_value(self.collection_id.as_ref()),
            text(self.title.as_deref()),
            text(self.content.as_deref()),
            timestamp(self.viewed_at),
        ];
        values.extend(stamp_values(&self.stamps));
        values
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: read_id(row, 0)?,
            user_id: row.get(1)?,
            collection_id: read_optional_id(row, 2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            viewed_at: read_timestamp(row, 5)?,
            stamps: read_stamps(row, 6)?,
        })
    }
}

impl StoredEntity for Collection {
    const TABLE: &'static str = "collections";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "title",
        "description",
        "color",
        "viewed_at",
        "created_at",
        "updated_at",
        "deleted_at",
        "synced_at",
    ];
    const HAS_VIEWED_AT: bool = true;

    fn to_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Text(self.id.as_str().to_string()),
            text(self.user_id.as_deref()),
            text(self.title.as_deref()),
            text(self.description.as_deref()),
            text(self.color.as_deref()),
            timestamp(self.viewed_at),
        ];
        values.extend(stamp_values(&self.stamps));
        values
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: read_id(row, 0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            color: row.get(4)?,
            viewed_at: read_timestamp(row, 5)?,
            stamps: read_stamps(row, 6)?,
        })
    }
}

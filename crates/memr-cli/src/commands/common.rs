use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memr_core::config::SyncSettings;
use memr_core::models::{Collection, EntityId, EntityKind, Note, Project, SyncConflict, Task};
use memr_core::services::DatabaseService;
use memr_core::util::{format_timestamp, parse_timestamp};
use serde::Serialize;

use crate::error::CliError;

pub const DB_PATH_VAR: &str = "MEMR_DB_PATH";

#[derive(Debug, Serialize)]
pub struct EntityListItem {
    pub id: String,
    pub kind: EntityKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
    pub updated_at: String,
    pub relative_time: String,
    pub synced: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub local_updated_at: String,
    pub incoming_updated_at: String,
    pub resolved_at: String,
    pub strategy: String,
}

pub fn load_settings() -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::from_env()?)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_VAR).map(PathBuf::from))
        .map_or_else(default_db_path, Ok)
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("memr").join("memr.db"))
        .ok_or(CliError::DataDirUnavailable)
}

/// Open the local store, tracking changes when the change-log strategy is
/// configured.
pub async fn open_database(
    path: &Path,
    settings: &SyncSettings,
) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path.to_path_buf())
        .await?
        .with_change_tracking(settings.strategy.tracks_changes()))
}

pub fn parse_entity_id(id: &str) -> Result<EntityId, CliError> {
    id.parse().map_err(|_| CliError::EmptyId)
}

/// Join positional words into one value; blank input yields `None`.
pub fn join_text(parts: &[String]) -> Option<String> {
    normalize_content(&parts.join(" "))
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, CliError> {
    parse_timestamp(raw.trim()).map_err(|_| CliError::InvalidDueDate(raw.to_string()))
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn list_item(
    kind: EntityKind,
    id: &EntityId,
    title: &str,
    parent_id: Option<&EntityId>,
    stamps: &memr_core::models::Stamps,
    now: DateTime<Utc>,
) -> EntityListItem {
    EntityListItem {
        id: id.to_string(),
        kind,
        title: preview(title, 80),
        parent_id: parent_id.map(ToString::to_string),
        status: None,
        sort_order: None,
        updated_at: format_timestamp(&stamps.updated_at),
        relative_time: format_relative_time(stamps.updated_at, now),
        synced: !stamps.is_dirty(),
    }
}

pub fn task_to_list_item(task: &Task, now: DateTime<Utc>) -> EntityListItem {
    EntityListItem {
        status: Some(task.status),
        sort_order: task.sort_order.clone(),
        ..list_item(
            EntityKind::Task,
            &task.id,
            task.display_title(),
            task.project_id.as_ref(),
            &task.stamps,
            now,
        )
    }
}

pub fn project_to_list_item(project: &Project, now: DateTime<Utc>) -> EntityListItem {
    list_item(
        EntityKind::Project,
        &project.id,
        project.title.as_deref().unwrap_or(""),
        None,
        &project.stamps,
        now,
    )
}

pub fn note_to_list_item(note: &Note, now: DateTime<Utc>) -> EntityListItem {
    list_item(
        EntityKind::Note,
        &note.id,
        &note.title_preview(80),
        note.collection_id.as_ref(),
        &note.stamps,
        now,
    )
}

pub fn collection_to_list_item(collection: &Collection, now: DateTime<Utc>) -> EntityListItem {
    list_item(
        EntityKind::Collection,
        &collection.id,
        collection.title.as_deref().unwrap_or(""),
        None,
        &collection.stamps,
        now,
    )
}

pub const fn status_label(status: i32) -> &'static str {
    match status {
        Task::STATUS_ARCHIVED => "archived",
        Task::STATUS_TODO => "todo",
        Task::STATUS_IN_PROGRESS => "doing",
        Task::STATUS_DONE => "done",
        _ => "?",
    }
}

pub fn format_list_lines(items: &[EntityListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short_id = item.id.chars().take(13).collect::<String>();
            let marker = if item.synced { ' ' } else { '*' };
            let title = preview(&item.title, 40);
            match item.status {
                Some(status) => format!(
                    "{short_id:<13}{marker} {:<8}  {title:<40}  {}",
                    status_label(status),
                    item.relative_time
                ),
                None => format!("{short_id:<13}{marker} {title:<40}  {}", item.relative_time),
            }
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entity_kind: conflict.entity_kind,
        entity_id: conflict.entity_id.to_string(),
        local_updated_at: format_timestamp(&conflict.local_updated_at),
        incoming_updated_at: format_timestamp(&conflict.incoming_updated_at),
        resolved_at: format_timestamp(&conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.entity_kind,
                conflict.entity_id,
                format_timestamp(&conflict.local_updated_at),
                format_timestamp(&conflict.incoming_updated_at)
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now
        .signed_duration_since(timestamp)
        .num_milliseconds()
        .max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

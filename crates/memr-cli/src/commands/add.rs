use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::models::{
    CollectionDraft, EntityKind, NoteDraft, ProjectDraft, TaskDraft,
};
use memr_core::{Collection, EntityId, Note, Project};

use crate::cli::FieldArgs;
use crate::commands::common::{join_text, open_database, parse_due_date, parse_entity_id};
use crate::error::CliError;

pub async fn run_add(
    kind: EntityKind,
    text: &[String],
    fields: &FieldArgs,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let db = open_database(db_path, settings).await?;
    let id: EntityId = match kind {
        EntityKind::Task => db.create_task(task_draft(text, fields)?).await?.id,
        EntityKind::Project => db.create::<Project>(project_draft(text, fields)?).await?.id,
        EntityKind::Note => db.create::<Note>(note_draft(text, fields)?).await?.id,
        EntityKind::Collection => {
            db.create::<Collection>(collection_draft(text, fields)?)
                .await?
                .id
        }
    };

    println!("{id}");
    Ok(())
}

/// Reject flags that have no field on `kind`.
pub fn ensure_fields_apply(kind: EntityKind, fields: &FieldArgs) -> Result<(), CliError> {
    let unsupported = |field: &'static str| CliError::UnsupportedField { field, kind };

    if fields.content.is_some() && kind != EntityKind::Note {
        return Err(unsupported("content"));
    }
    if fields.description.is_some() && kind == EntityKind::Note {
        return Err(unsupported("description"));
    }
    if fields.color.is_some() && matches!(kind, EntityKind::Task | EntityKind::Note) {
        return Err(unsupported("color"));
    }
    if (fields.parent.is_some() || fields.no_parent)
        && matches!(kind, EntityKind::Project | EntityKind::Collection)
    {
        return Err(unsupported("parent"));
    }
    if fields.status.is_some() && kind != EntityKind::Task {
        return Err(unsupported("status"));
    }
    if fields.due.is_some() && kind != EntityKind::Task {
        return Err(unsupported("due"));
    }
    Ok(())
}

fn parent(fields: &FieldArgs) -> Result<Option<EntityId>, CliError> {
    fields.parent.as_deref().map(parse_entity_id).transpose()
}

pub fn task_draft(text: &[String], fields: &FieldArgs) -> Result<TaskDraft, CliError> {
    ensure_fields_apply(EntityKind::Task, fields)?;
    Ok(TaskDraft {
        project_id: parent(fields)?,
        title: fields.title.clone().or_else(|| join_text(text)),
        description: fields.description.clone(),
        status: fields.status.map(crate::cli::StatusArg::code),
        sort_order: None,
        due_date: fields.due.as_deref().map(parse_due_date).transpose()?,
    })
}

pub fn project_draft(text: &[String], fields: &FieldArgs) -> Result<ProjectDraft, CliError> {
    ensure_fields_apply(EntityKind::Project, fields)?;
    Ok(ProjectDraft {
        title: fields.title.clone().or_else(|| join_text(text)),
        description: fields.description.clone(),
        color: fields.color.clone(),
    })
}

/// Positional text is the note body; `--title` is optional.
pub fn note_draft(text: &[String], fields: &FieldArgs) -> Result<NoteDraft, CliError> {
    ensure_fields_apply(EntityKind::Note, fields)?;
    Ok(NoteDraft {
        collection_id: parent(fields)?,
        title: fields.title.clone(),
        content: fields.content.clone().or_else(|| join_text(text)),
    })
}

pub fn collection_draft(
    text: &[String],
    fields: &FieldArgs,
) -> Result<CollectionDraft, CliError> {
    ensure_fields_apply(EntityKind::Collection, fields)?;
    Ok(CollectionDraft {
        title: fields.title.clone().or_else(|| join_text(text)),
        description: fields.description.clone(),
        color: fields.color.clone(),
    })
}

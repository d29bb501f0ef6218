use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::models::{CollectionPatch, EntityKind, NotePatch, ProjectPatch, TaskPatch};
use memr_core::{Collection, EntityId, Note, Project, Task};

use crate::cli::{FieldArgs, StatusArg};
use crate::commands::add::ensure_fields_apply;
use crate::commands::common::{open_database, parse_due_date, parse_entity_id};
use crate::error::CliError;

pub async fn run_update(
    kind: EntityKind,
    id: &str,
    fields: &FieldArgs,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let id = parse_entity_id(id)?;
    if fields == &FieldArgs::default() {
        return Err(CliError::NothingToUpdate);
    }

    let db = open_database(db_path, settings).await?;
    match kind {
        EntityKind::Task => {
            db.update::<Task>(&id, &task_patch(fields)?).await?;
        }
        EntityKind::Project => {
            db.update::<Project>(&id, &project_patch(fields)?).await?;
        }
        EntityKind::Note => {
            db.update::<Note>(&id, &note_patch(fields)?).await?;
        }
        EntityKind::Collection => {
            db.update::<Collection>(&id, &collection_patch(fields)?)
                .await?;
        }
    }

    println!("{id}");
    Ok(())
}

/// `Some(None)` when `--no-parent` was given.
fn parent_patch(fields: &FieldArgs) -> Result<Option<Option<EntityId>>, CliError> {
    if fields.no_parent {
        return Ok(Some(None));
    }
    fields
        .parent
        .as_deref()
        .map(|id| parse_entity_id(id).map(Some))
        .transpose()
}

pub fn task_patch(fields: &FieldArgs) -> Result<TaskPatch, CliError> {
    ensure_fields_apply(EntityKind::Task, fields)?;
    Ok(TaskPatch {
        project_id: parent_patch(fields)?,
        title: fields.title.clone(),
        description: fields.description.clone(),
        status: fields.status.map(StatusArg::code),
        sort_order: None,
        due_date: fields.due.as_deref().map(parse_due_date).transpose()?,
    })
}

pub fn project_patch(fields: &FieldArgs) -> Result<ProjectPatch, CliError> {
    ensure_fields_apply(EntityKind::Project, fields)?;
    Ok(ProjectPatch {
        title: fields.title.clone(),
        description: fields.description.clone(),
        color: fields.color.clone(),
    })
}

pub fn note_patch(fields: &FieldArgs) -> Result<NotePatch, CliError> {
    ensure_fields_apply(EntityKind::Note, fields)?;
    Ok(NotePatch {
        collection_id: parent_patch(fields)?,
        title: fields.title.clone(),
        content: fields.content.clone(),
    })
}

pub fn collection_patch(fields: &FieldArgs) -> Result<CollectionPatch, CliError> {
    ensure_fields_apply(EntityKind::Collection, fields)?;
    Ok(CollectionPatch {
        title: fields.title.clone(),
        description: fields.description.clone(),
        color: fields.color.clone(),
    })
}

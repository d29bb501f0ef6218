use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::EntityId;

use crate::commands::common::{open_database, parse_entity_id};
use crate::error::CliError;

/// `None` keeps the task's project, `Some(None)` detaches it.
pub fn target_project(
    project: Option<&str>,
    no_project: bool,
) -> Result<Option<Option<EntityId>>, CliError> {
    if no_project {
        return Ok(Some(None));
    }
    project
        .map(|id| parse_entity_id(id).map(Some))
        .transpose()
}

pub async fn run_move(
    id: &str,
    index: usize,
    project: Option<&str>,
    no_project: bool,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let id = parse_entity_id(id)?;
    let to_project = target_project(project, no_project)?;

    let db = open_database(db_path, settings).await?;
    let task = db.move_task(&id, to_project, index).await?;

    println!("{}  {}", task.id, task.sort_order.unwrap_or_default());
    Ok(())
}

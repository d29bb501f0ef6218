use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::models::EntityKind;
use memr_core::{Collection, Note, Project, Task};

use crate::commands::common::{open_database, parse_entity_id};
use crate::error::CliError;

pub async fn run_delete(
    kind: EntityKind,
    id: &str,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let id = parse_entity_id(id)?;
    let db = open_database(db_path, settings).await?;
    match kind {
        EntityKind::Task => {
            db.delete::<Task>(&id).await?;
        }
        EntityKind::Project => {
            db.delete::<Project>(&id).await?;
        }
        EntityKind::Note => {
            db.delete::<Note>(&id).await?;
        }
        EntityKind::Collection => {
            db.delete::<Collection>(&id).await?;
        }
    }

    println!("{id}");
    Ok(())
}

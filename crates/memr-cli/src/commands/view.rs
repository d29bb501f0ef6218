use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::models::EntityKind;
use memr_core::{Collection, Note, Project};

use crate::commands::common::{open_database, parse_entity_id};
use crate::error::CliError;

pub async fn run_view(
    kind: EntityKind,
    id: &str,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let id = parse_entity_id(id)?;
    let db = open_database(db_path, settings).await?;
    match kind {
        EntityKind::Project => {
            db.mark_viewed::<Project>(&id).await?;
        }
        EntityKind::Note => {
            db.mark_viewed::<Note>(&id).await?;
        }
        EntityKind::Collection => {
            db.mark_viewed::<Collection>(&id).await?;
        }
        EntityKind::Task => {
            return Err(CliError::NotViewable(kind));
        }
    }

    println!("{id}");
    Ok(())
}

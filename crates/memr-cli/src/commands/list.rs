use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::models::{EntityKind, ListQuery, SortBy};
use memr_core::util::now_millis;
use memr_core::{Collection, Note, Project, Task};

use crate::commands::common::{
    collection_to_list_item, format_list_lines, note_to_list_item, open_database,
    parse_entity_id, project_to_list_item, task_to_list_item, EntityListItem,
};
use crate::error::CliError;

pub fn build_query(
    parent: Option<&str>,
    sort_by: Option<SortBy>,
    unsynced_only: bool,
) -> Result<ListQuery, CliError> {
    Ok(ListQuery {
        parent_id: parent.map(parse_entity_id).transpose()?,
        sort_by,
        unsynced_only,
    })
}

pub async fn run_list(
    kind: EntityKind,
    parent: Option<&str>,
    sort_by: Option<SortBy>,
    unsynced_only: bool,
    as_json: bool,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let query = build_query(parent, sort_by, unsynced_only)?;
    let db = open_database(db_path, settings).await?;
    let now = now_millis();

    let items: Vec<EntityListItem> = match kind {
        EntityKind::Task => db
            .list::<Task>(&query)
            .await?
            .iter()
            .map(|task| task_to_list_item(task, now))
            .collect(),
        EntityKind::Project => db
            .list::<Project>(&query)
            .await?
            .iter()
            .map(|project| project_to_list_item(project, now))
            .collect(),
        EntityKind::Note => db
            .list::<Note>(&query)
            .await?
            .iter()
            .map(|note| note_to_list_item(note, now))
            .collect(),
        EntityKind::Collection => db
            .list::<Collection>(&query)
            .await?
            .iter()
            .map(|collection| collection_to_list_item(collection, now))
            .collect(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_list_lines(&items) {
            println!("{line}");
        }
    }

    Ok(())
}

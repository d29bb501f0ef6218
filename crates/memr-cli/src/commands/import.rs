use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::models::{Task, TaskDraft};
use memr_core::EntityId;
use tokio::io::AsyncReadExt;

use crate::commands::common::{normalize_content, open_database, parse_entity_id};
use crate::error::CliError;

/// One task per non-blank line, in file order.
///
/// Markdown bullets are stripped; `[x]` checkboxes import as done.
pub fn task_drafts_from_lines(text: &str, project_id: Option<&EntityId>) -> Vec<TaskDraft> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line
                .strip_prefix(['-', '*'])
                .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
                .unwrap_or(line)
                .trim_start();
            let (status, title) = if let Some(rest) = line.strip_prefix("[ ]") {
                (Some(Task::STATUS_TODO), rest)
            } else if let Some(rest) = line
                .strip_prefix("[x]")
                .or_else(|| line.strip_prefix("[X]"))
            {
                (Some(Task::STATUS_DONE), rest)
            } else {
                (None, line)
            };
            normalize_content(title).map(|title| TaskDraft {
                project_id: project_id.cloned(),
                title: Some(title),
                status,
                ..TaskDraft::default()
            })
        })
        .collect()
}

pub async fn run_import(
    file: Option<&Path>,
    project: Option<&str>,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let project_id = project.map(parse_entity_id).transpose()?;
    let text = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };

    let drafts = task_drafts_from_lines(&text, project_id.as_ref());
    if drafts.is_empty() {
        println!("Nothing to import");
        return Ok(());
    }

    let db = open_database(db_path, settings).await?;
    let tasks = db.create_tasks(drafts).await?;
    for task in &tasks {
        println!("{}  {}", task.id, task.title.as_deref().unwrap_or_default());
    }
    tracing::info!("Imported {} tasks", tasks.len());
    Ok(())
}

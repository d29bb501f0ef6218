use std::path::Path;
use std::time::Duration;

use memr_core::config::SyncSettings;
use memr_core::models::{EntityKind, NotePatch};
use memr_core::services::{AutosaveDebouncer, DatabaseService};
use memr_core::{EntityId, Note};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::commands::common::{open_database, parse_entity_id};
use crate::error::CliError;

/// Replace a note's content with lines read from `input`, saving as it
/// arrives.
///
/// Every line schedules an autosave of the text so far; the last one is
/// flushed when the input ends. Returns the saved note, unchanged when the
/// input was empty.
pub async fn stream_note_content<R>(
    db: &DatabaseService,
    id: &EntityId,
    input: R,
    autosave_interval: Duration,
) -> Result<Note, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let not_found = || memr_core::Error::not_found(EntityKind::Note, id.as_str());
    db.get::<Note>(id).await?.ok_or_else(not_found)?;

    let autosave = AutosaveDebouncer::<Note>::new(db.clone(), autosave_interval);
    let mut lines = input.lines();
    let mut content = String::new();
    let mut line_count = 0_usize;
    while let Some(line) = lines.next_line().await? {
        if line_count > 0 {
            content.push('\n');
        }
        content.push_str(&line);
        line_count += 1;
        let patch = NotePatch {
            content: Some(content.clone()),
            ..NotePatch::default()
        };
        autosave.schedule(id.clone(), patch).await;
    }
    autosave.flush().await;
    tracing::debug!("Streamed {line_count} lines into note {id}");

    Ok(db.get::<Note>(id).await?.ok_or_else(not_found)?)
}

pub async fn run_write(id: &str, db_path: &Path, settings: &SyncSettings) -> Result<(), CliError> {
    let id = parse_entity_id(id)?;
    let db = open_database(db_path, settings).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    let note = stream_note_content(&db, &id, stdin, settings.autosave_interval).await?;

    println!(
        "{}  {} chars",
        note.id,
        note.content.as_deref().map_or(0, |content| content.chars().count())
    );
    Ok(())
}

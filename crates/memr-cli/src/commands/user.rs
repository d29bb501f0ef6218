use std::path::Path;

use memr_core::config::SyncSettings;

use crate::commands::common::{normalize_content, open_database};
use crate::error::CliError;

/// Print the current user, or store a new one for future records.
pub async fn run_user(
    id: Option<&str>,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let db = open_database(db_path, settings).await?;

    if let Some(id) = id {
        let id = normalize_content(id).ok_or(CliError::EmptyId)?;
        db.set_current_user(&id).await?;
        println!("{id}");
        return Ok(());
    }

    match db.current_user().await? {
        Some(user_id) => println!("{user_id}"),
        None => println!("No current user set."),
    }
    Ok(())
}

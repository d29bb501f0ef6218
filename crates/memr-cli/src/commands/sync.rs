use std::path::Path;

use memr_core::config::SyncSettings;
use memr_core::sync::{HttpSyncEndpoint, SyncCoordinator, SyncOutcome};
use tokio::sync::watch;

use crate::commands::common::{
    format_sync_conflict_lines, open_database, sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

async fn coordinator(
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<SyncCoordinator<HttpSyncEndpoint>, CliError> {
    let endpoint =
        HttpSyncEndpoint::from_settings(settings)?.ok_or(CliError::SyncNotConfigured)?;
    tracing::debug!("Using sync endpoint {}", endpoint.url());
    let db = open_database(db_path, settings).await?;
    Ok(SyncCoordinator::new(db, endpoint, settings)?)
}

pub async fn run_sync(db_path: &Path, settings: &SyncSettings) -> Result<(), CliError> {
    let coordinator = coordinator(db_path, settings).await?;
    match coordinator.sync_once().await? {
        SyncOutcome::Completed(report) => println!(
            "Sync completed: sent {}, received {}, kept {} newer local",
            report.sent, report.received, report.applied.stale
        ),
        SyncOutcome::Skipped => println!("Sync already running"),
    }
    Ok(())
}

pub async fn run_sync_watch(db_path: &Path, settings: &SyncSettings) -> Result<(), CliError> {
    let coordinator = coordinator(db_path, settings).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    println!(
        "Syncing every {} ms; press Ctrl-C to stop",
        settings.interval.as_millis()
    );
    coordinator.run(shutdown_rx).await;
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let db = open_database(db_path, settings).await?;
    let conflicts = db.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

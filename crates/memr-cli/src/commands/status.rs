use std::path::Path;

use chrono::{DateTime, Utc};
use memr_core::config::{SyncSettings, SyncStrategy};
use memr_core::services::DatabaseService;
use memr_core::util::{epoch, format_timestamp, now_millis};
use serde::Serialize;

use crate::commands::common::{format_relative_time, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub strategy: String,
    pub endpoint: Option<String>,
    pub user_id: Option<String>,
    /// Local clock time of the last successful sync; `None` before the first
    pub last_sync_at: Option<String>,
    /// Server-assigned watermark sent with the next request
    pub watermark: Option<String>,
    pub pending: usize,
    pub unsynced_records: usize,
    pub overdue: bool,
}

/// Whether a configured remote has not answered within interval + grace.
///
/// `last_sync` must come from this device's clock, never the watermark.
pub fn is_overdue(
    settings: &SyncSettings,
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if !settings.is_remote_configured() {
        return false;
    }
    let Some(last_sync) = last_sync else {
        return true;
    };
    let threshold = chrono::Duration::from_std(settings.overdue_after())
        .unwrap_or_else(|_| chrono::Duration::MAX);
    now.signed_duration_since(last_sync) > threshold
}

pub async fn status_report(
    db: &DatabaseService,
    db_path: &Path,
    settings: &SyncSettings,
    now: DateTime<Utc>,
) -> Result<StatusReport, CliError> {
    let unsynced_records = db.dirty_count().await?;
    let pending = match settings.strategy {
        SyncStrategy::ChangeLog => db.change_log_len().await?,
        SyncStrategy::Snapshot => unsynced_records,
    };
    let last_sync = db.last_sync_success().await?;
    let watermark = Some(db.last_sync_time().await?).filter(|time| *time != epoch());

    Ok(StatusReport {
        db_path: db_path.display().to_string(),
        strategy: settings.strategy.to_string(),
        endpoint: settings.endpoint.clone(),
        user_id: db.current_user().await?,
        last_sync_at: last_sync.as_ref().map(format_timestamp),
        watermark: watermark.as_ref().map(format_timestamp),
        pending,
        unsynced_records,
        overdue: is_overdue(settings, last_sync, now),
    })
}

pub async fn run_status(
    as_json: bool,
    db_path: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let db = open_database(db_path, settings).await?;
    let now = now_millis();
    let report = status_report(&db, db_path, settings, now).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Database:   {}", report.db_path);
    println!(
        "Remote:     {}",
        report.endpoint.as_deref().unwrap_or("(local only)")
    );
    println!("Strategy:   {}", report.strategy);
    println!("User:       {}", report.user_id.as_deref().unwrap_or("(none)"));
    match db.last_sync_success().await? {
        Some(time) => println!("Last sync:  {}", format_relative_time(time, now)),
        None => println!("Last sync:  never"),
    }
    println!(
        "Pending:    {} ({} unsynced records)",
        report.pending, report.unsynced_records
    );
    if report.overdue {
        println!("Sync is overdue");
    }
    Ok(())
}

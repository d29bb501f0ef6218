//! memr CLI - tasks, projects, notes and collections from the terminal
//!
//! Works against the local store; `memr sync` exchanges changes with the
//! configured remote.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::common::{load_settings, resolve_db_path};
use crate::commands::delete::run_delete;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::move_cmd::run_move;
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_watch};
use crate::commands::update::run_update;
use crate::commands::user::run_user;
use crate::commands::view::run_view;
use crate::commands::write::run_write;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "memr=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let settings = load_settings()?;

    match cli.command {
        Commands::Add { kind, text, fields } => {
            run_add(kind.into(), &text, &fields, &db_path, &settings).await?;
        }
        Commands::List {
            kind,
            parent,
            sort,
            unsynced,
            json,
        } => {
            run_list(
                kind.into(),
                parent.as_deref(),
                sort.map(Into::into),
                unsynced,
                json,
                &db_path,
                &settings,
            )
            .await?;
        }
        Commands::Update { kind, id, fields } => {
            run_update(kind.into(), &id, &fields, &db_path, &settings).await?;
        }
        Commands::Move {
            id,
            index,
            project,
            no_project,
        } => {
            run_move(&id, index, project.as_deref(), no_project, &db_path, &settings).await?;
        }
        Commands::Import { file, project } => {
            run_import(file.as_deref(), project.as_deref(), &db_path, &settings).await?;
        }
        Commands::Write { id } => run_write(&id, &db_path, &settings).await?,
        Commands::Delete { kind, id } => {
            run_delete(kind.into(), &id, &db_path, &settings).await?;
        }
        Commands::View { kind, id } => {
            run_view(kind.into(), &id, &db_path, &settings).await?;
        }
        Commands::Sync { command } => match command {
            None => run_sync(&db_path, &settings).await?,
            Some(SyncCommands::Watch) => run_sync_watch(&db_path, &settings).await?,
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path, &settings).await?;
            }
        },
        Commands::Status { json } => run_status(json, &db_path, &settings).await?,
        Commands::User { id } => run_user(id.as_deref(), &db_path, &settings).await?,
    }

    Ok(())
}

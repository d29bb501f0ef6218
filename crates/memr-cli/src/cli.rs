use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use memr_core::models::{EntityKind, SortBy, Task};

#[derive(Parser)]
#[command(name = "memr")]
#[command(about = "Local-first tasks, projects, notes and collections")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a record
    #[command(alias = "new")]
    Add {
        #[arg(value_enum)]
        kind: KindArg,
        /// Title (note content for notes)
        text: Vec<String>,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// List live records
    #[command(alias = "ls")]
    List {
        #[arg(value_enum)]
        kind: KindArg,
        /// Only children of this project (tasks) or collection (notes)
        #[arg(long, value_name = "ID")]
        parent: Option<String>,
        /// Sort order; defaults to rank for tasks, last update otherwise
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        /// Only records not yet acknowledged by the remote
        #[arg(long)]
        unsynced: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of a record
    #[command(alias = "edit")]
    Update {
        #[arg(value_enum)]
        kind: KindArg,
        /// Record ID
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Move a task to a position within a project column
    Move {
        /// Task ID
        id: String,
        /// Zero-based target position among the other tasks
        index: usize,
        /// Move into this project
        #[arg(long, value_name = "ID", conflicts_with = "no_project")]
        project: Option<String>,
        /// Move out of any project
        #[arg(long)]
        no_project: bool,
    },
    /// Create tasks from a list, one per line
    Import {
        /// Text or Markdown checklist; reads stdin when omitted
        file: Option<PathBuf>,
        /// Append the tasks to this project
        #[arg(long, value_name = "ID")]
        project: Option<String>,
    },
    /// Replace a note's content with stdin, autosaving while it streams
    Write {
        /// Note ID
        id: String,
    },
    /// Delete a record (kept as a tombstone until synced)
    #[command(alias = "rm")]
    Delete {
        #[arg(value_enum)]
        kind: KindArg,
        /// Record ID
        id: String,
    },
    /// Record that a project, note or collection was opened
    View {
        #[arg(value_enum)]
        kind: KindArg,
        /// Record ID
        id: String,
    },
    /// Run one sync cycle with the configured remote
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show local store and sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or set the user stamped on new records
    User {
        /// New user ID
        id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Sync periodically until interrupted
    Watch,
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Field flags shared by `add` and `update`.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Note body
    #[arg(long)]
    pub content: Option<String>,
    /// Project or collection color
    #[arg(long)]
    pub color: Option<String>,
    /// Project (tasks) or collection (notes)
    #[arg(long, value_name = "ID", conflicts_with = "no_parent")]
    pub parent: Option<String>,
    /// Clear the project or collection
    #[arg(long)]
    pub no_parent: bool,
    /// Task status
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
    /// Task due date (RFC 3339)
    #[arg(long, value_name = "DATE")]
    pub due: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Task,
    Project,
    Note,
    Collection,
}

impl From<KindArg> for EntityKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Task => Self::Task,
            KindArg::Project => Self::Project,
            KindArg::Note => Self::Note,
            KindArg::Collection => Self::Collection,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortArg {
    Rank,
    Updated,
    Created,
    Viewed,
}

impl From<SortArg> for SortBy {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Rank => Self::Rank,
            SortArg::Updated => Self::UpdatedAt,
            SortArg::Created => Self::CreatedAt,
            SortArg::Viewed => Self::ViewedAt,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Todo,
    InProgress,
    Done,
    Archived,
}

impl StatusArg {
    pub const fn code(self) -> i32 {
        match self {
            Self::Todo => Task::STATUS_TODO,
            Self::InProgress => Task::STATUS_IN_PROGRESS,
            Self::Done => Task::STATUS_DONE,
            Self::Archived => Task::STATUS_ARCHIVED,
        }
    }
}

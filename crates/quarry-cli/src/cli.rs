//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quarry - document extraction queue, worker and case reconciliation.
#[derive(Debug, Parser)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides the configuration)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (IDs only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the extraction worker
    Worker(WorkerArgs),

    /// Enqueue a document for extraction
    Enqueue(EnqueueArgs),

    /// Show the job of a document
    Status {
        /// Document ID
        document_id: String,
    },

    /// List jobs
    Jobs(JobsArgs),

    /// Show the extraction result of a document
    Result {
        /// Document ID
        document_id: String,
    },

    /// Show the reconciled field snapshot of a case
    Snapshot(SnapshotArgs),

    /// Reset a document's job with a fresh attempt budget (enqueue if absent)
    Retry {
        /// Document ID
        document_id: String,
    },

    /// Retry a failed job now, keeping its attempt count
    Resume {
        /// Document ID
        document_id: String,
    },

    /// Inspect or flip the extraction kill switch
    KillSwitch {
        #[command(subcommand)]
        action: KillSwitchAction,
    },

    /// List the known extraction fields
    Fields,

    /// Show recent audit events
    Audit(AuditArgs),
}

/// Arguments for the worker command.
#[derive(Debug, Parser)]
pub struct WorkerArgs {
    /// Run a single tick and exit
    #[arg(long, conflicts_with = "cycles")]
    pub once: bool,

    /// Run this many ticks and exit
    #[arg(long)]
    pub cycles: Option<usize>,

    /// Override the configured concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the enqueue command.
#[derive(Debug, Parser)]
pub struct EnqueueArgs {
    /// Document ID
    pub document_id: String,

    /// Case the document belongs to
    pub case_id: String,

    /// Register a document version stored at this content reference first
    #[arg(long)]
    pub content: Option<String>,

    /// MIME type (guessed from the content reference if omitted)
    #[arg(long, requires = "content")]
    pub mime: Option<String>,

    /// Document category (e.g. bank_statement, tax_return)
    #[arg(long, default_value = "unknown")]
    pub category: String,

    /// Original file name (defaults to the last segment of the content reference)
    #[arg(long, requires = "content")]
    pub name: Option<String>,
}

/// Arguments for the jobs command.
#[derive(Debug, Parser)]
pub struct JobsArgs {
    /// Only jobs with this status
    #[arg(short, long, value_enum)]
    pub status: Option<StatusArg>,

    /// Maximum number of jobs
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Arguments for the snapshot command.
#[derive(Debug, Parser)]
pub struct SnapshotArgs {
    /// Case ID
    pub case_id: String,

    /// Recompute and persist the snapshot before showing it
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the audit command.
#[derive(Debug, Parser)]
pub struct AuditArgs {
    /// Only events of this kind (e.g. storage_input_rejected)
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Maximum number of events
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Kill switch actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum KillSwitchAction {
    /// Show whether extraction is disabled
    Status,
    /// Disable extraction
    On,
    /// Enable extraction
    Off,
}

/// Job status argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StatusArg {
    /// Waiting for the first claim
    Queued,
    /// Owned by a worker
    Processing,
    /// Finished
    Succeeded,
    /// Waiting for a retry
    Failed,
    /// Attempts exhausted
    Canceled,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

impl From<StatusArg> for quarry_domain::JobStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Queued => quarry_domain::JobStatus::Queued,
            StatusArg::Processing => quarry_domain::JobStatus::Processing,
            StatusArg::Succeeded => quarry_domain::JobStatus::Succeeded,
            StatusArg::Failed => quarry_domain::JobStatus::Failed,
            StatusArg::Canceled => quarry_domain::JobStatus::Canceled,
        }
    }
}

//! Conversion of a rig from independent clones to workspaces attached to one
//! anchor repository, optionally switching VCS backend on the way.
//!
//! The migration is a persisted state machine:
//!
//! ```text
//! PreCheck -> Freeze -> ConvertRepository -> ConvertWorkspaces -> UpdateConfig -> Resume
//! ```
//!
//! The record is written after every transition and every per-worker state
//! change, so an interrupted run can be resumed by running the controller
//! again. Until `UpdateConfig` has completed the migration can be aborted,
//! which reverses everything it created.

mod controller;
mod record;

use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;
use vcs::{VcsBackendType, VcsError};

pub use controller::MigrationController;
pub use record::{
    Artifact, JsonMigrationStore, MigrationPhase, MigrationRecord, MigrationStore,
    PreMigrationManifest, PreservedRef, WorkspaceProgress, WorkspaceState, aside_path,
    MANIFEST_FILE, RECORD_FILE, RUNTIME_DIR,
};

use super::{backup::BackupError, rig_config::RigConfigError, rig_config::RigConfigStore};

pub const DEFAULT_BUSY_MARKER: &str = ".task-in-progress";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("pre-check failed: {}", join(.0))]
    PreconditionFailed(Vec<WorkerIssue>),
    #[error(
        "{} workspace(s) failed to convert ({}); rerun to retry",
        .failed.len(),
        join(.failed)
    )]
    PartialConversion {
        converted: Vec<String>,
        failed: Vec<WorkerFailure>,
    },
    #[error(
        "migration aborted during {phase}: {cause}; removed {}",
        removed_list(.removed)
    )]
    Aborted {
        phase: MigrationPhase,
        removed: Vec<Artifact>,
        cause: String,
    },
    #[error("rig config already switched to {0}; abort is no longer possible")]
    PastCommitPoint(VcsBackendType),
    #[error("no migration in progress")]
    NotInProgress,
    #[error("migration in progress targets {recorded}, not {requested}")]
    TargetMismatch {
        recorded: VcsBackendType,
        requested: VcsBackendType,
    },
    #[error("rig already uses {0} workspaces")]
    AlreadyMigrated(VcsBackendType),
    #[error("anchor path {0} already exists")]
    AnchorExists(PathBuf),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Config(#[from] RigConfigError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid migration record: {0}")]
    Record(#[source] serde_json::Error),
}

fn removed_list(removed: &[Artifact]) -> String {
    if removed.is_empty() {
        return "nothing".to_string();
    }
    removed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a worker blocks the migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerProblem {
    /// Busy marker present
    Busy,
    /// Uncommitted, stashed or unpushed work
    Dirty(String),
    Missing,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIssue {
    pub worker: String,
    pub path: PathBuf,
    pub problem: WorkerProblem,
}

impl fmt::Display for WorkerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            WorkerProblem::Busy => write!(f, "{} is busy", self.worker),
            WorkerProblem::Dirty(summary) => write!(f, "{} has {}", self.worker, summary),
            WorkerProblem::Missing => {
                write!(f, "{} missing at {}", self.worker, self.path.display())
            }
            WorkerProblem::Unreadable(e) => write!(f, "{} unreadable: {}", self.worker, e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: String,
    pub error: String,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.worker, self.error)
    }
}

/// Outcome of an abort, newest artifact first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReport {
    pub phase: MigrationPhase,
    pub removed: Vec<Artifact>,
}

/// Outcome of a completed migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub rig: String,
    pub source: VcsBackendType,
    pub target: VcsBackendType,
    pub anchor: PathBuf,
    pub converted: Vec<String>,
    /// Kept for manual rollback
    pub backup_dir: PathBuf,
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub target: VcsBackendType,
    /// Defaults to `anchor` next to the current store
    pub anchor_path: Option<PathBuf>,
    /// Also archive the whole rig before starting
    pub archive: bool,
    pub max_attempts: u32,
    pub busy_marker: String,
    pub timeout: Option<Duration>,
}

impl MigrationOptions {
    pub fn new(target: VcsBackendType) -> Self {
        Self {
            target,
            anchor_path: None,
            archive: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            busy_marker: DEFAULT_BUSY_MARKER.to_string(),
            timeout: None,
        }
    }

    pub fn with_anchor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.anchor_path = Some(path.into());
        self
    }

    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Read-only view for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// `None` when no migration is in progress
    pub phase: Option<MigrationPhase>,
    pub frozen: bool,
    pub source: Option<VcsBackendType>,
    pub target: Option<VcsBackendType>,
    pub converted: Vec<String>,
    pub failed: Vec<String>,
    pub last_outcome: Option<String>,
}

pub fn read_migration_status(
    records: &dyn MigrationStore,
    config: &dyn RigConfigStore,
) -> Result<MigrationStatus, MigrationError> {
    let frozen = config.load()?.frozen;
    Ok(match records.load()? {
        Some(record) => MigrationStatus {
            phase: Some(record.phase),
            frozen: frozen || record.frozen,
            source: Some(record.source),
            target: Some(record.target),
            converted: record.converted(),
            failed: record.workspaces_in(WorkspaceState::Failed),
            last_outcome: record.last_outcome,
        },
        None => MigrationStatus {
            phase: None,
            frozen,
            source: None,
            target: None,
            converted: Vec::new(),
            failed: Vec::new(),
            last_outcome: None,
        },
    })
}

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vcs::VcsBackendType;

use super::MigrationError;
use crate::services::rig_config::{
    JsonFileError, RigLayout, WorkerEntry, read_json, write_json_atomic,
};

pub const RUNTIME_DIR: &str = ".runtime";
pub const RECORD_FILE: &str = "migration.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Phase a migration will run next
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    PreCheck,
    Freeze,
    ConvertRepository,
    ConvertWorkspaces,
    UpdateConfig,
    Resume,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCheck => "pre-check",
            Self::Freeze => "freeze",
            Self::ConvertRepository => "convert-repository",
            Self::ConvertWorkspaces => "convert-workspaces",
            Self::UpdateConfig => "update-config",
            Self::Resume => "resume",
        }
    }

    /// Once the config has been switched the old layout is gone
    pub fn past_commit_point(&self) -> bool {
        *self >= Self::Resume
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the migration created, undone in reverse order on abort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Copy of the whole rig taken before anything changed
    RigArchive { path: PathBuf },
    /// Store copy plus manifest
    StoreBackup { path: PathBuf },
    DispatchFrozen,
    Anchor { path: PathBuf },
    /// Worker clone moved aside and replaced by a workspace
    Workspace {
        worker: String,
        path: PathBuf,
        aside: PathBuf,
    },
    /// Rig config settings from before the switch to the target backend
    RigConfig {
        vcs: Option<VcsBackendType>,
        store: PathBuf,
        layout: RigLayout,
    },
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RigArchive { path } => write!(f, "rig archive {}", path.display()),
            Self::StoreBackup { path } => write!(f, "store backup {}", path.display()),
            Self::DispatchFrozen => f.write_str("dispatch freeze"),
            Self::Anchor { path } => write!(f, "anchor {}", path.display()),
            Self::Workspace { worker, path, .. } => {
                write!(f, "workspace {worker} at {}", path.display())
            }
            Self::RigConfig { store, layout, .. } => {
                write!(f, "config switch (was {layout:?} on {})", store.display())
            }
        }
    }
}

/// Branch and commit a worker was on before migrating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservedRef {
    pub worker: String,
    /// `None` for a detached worker
    pub branch: Option<String>,
    pub commit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState {
    Pending,
    /// Clone moved aside, workspace not attached or not verified yet
    MovedAside,
    Converted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceProgress {
    pub worker: String,
    pub path: PathBuf,
    pub state: WorkspaceState,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WorkspaceProgress {
    pub fn pending(worker: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            worker: worker.into(),
            path: path.into(),
            state: WorkspaceState::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn aside_path(&self) -> PathBuf {
        aside_path(&self.path)
    }
}

/// `<path>.pre-migration`
pub fn aside_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".pre-migration");
    path.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: Uuid,
    pub rig: String,
    pub source: VcsBackendType,
    pub target: VcsBackendType,
    pub phase: MigrationPhase,
    pub frozen: bool,
    /// Original shared store
    pub store: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    pub anchor: PathBuf,
    /// Holds `store/` and the manifest
    pub backup_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    /// Creation order
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub preserved_refs: Vec<PreservedRef>,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn store_backup(&self) -> PathBuf {
        self.backup_dir.join("store")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.backup_dir.join(MANIFEST_FILE)
    }

    pub fn preserved_ref(&self, worker: &str) -> Option<&PreservedRef> {
        self.preserved_refs.iter().find(|r| r.worker == worker)
    }

    pub fn owns(&self, artifact: &Artifact) -> bool {
        self.artifacts.contains(artifact)
    }

    /// Record `artifact` unless it is already there
    pub fn track(&mut self, artifact: Artifact) {
        if !self.owns(&artifact) {
            self.artifacts.push(artifact);
        }
    }

    pub fn converted(&self) -> Vec<String> {
        self.workspaces_in(WorkspaceState::Converted)
    }

    pub fn workspaces_in(&self, state: WorkspaceState) -> Vec<String> {
        self.workspaces
            .iter()
            .filter(|w| w.state == state)
            .map(|w| w.worker.clone())
            .collect()
    }
}

/// Everything manual rollback needs to rebuild the clone layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreMigrationManifest {
    pub migration_id: Uuid,
    pub rig: String,
    pub source: VcsBackendType,
    pub layout: RigLayout,
    /// Where the store lived (absolute)
    pub store: PathBuf,
    /// Store path as written in the rig config
    pub store_config: PathBuf,
    pub store_backup: PathBuf,
    pub workers: Vec<WorkerEntry>,
    pub refs: Vec<PreservedRef>,
    pub created_at: DateTime<Utc>,
}

impl PreMigrationManifest {
    pub fn load(path: &Path) -> Result<Self, MigrationError> {
        match read_json(path) {
            Ok(Some(manifest)) => Ok(manifest),
            Ok(None) => Err(MigrationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("manifest not found at {}", path.display()),
            ))),
            Err(e) => Err(file_error(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), MigrationError> {
        write_json_atomic(path, self).map_err(file_error)
    }

    pub fn preserved_ref(&self, worker: &str) -> Option<&PreservedRef> {
        self.refs.iter().find(|r| r.worker == worker)
    }
}

fn file_error(err: JsonFileError) -> MigrationError {
    match err {
        JsonFileError::Io(e) => MigrationError::Io(e),
        JsonFileError::Parse(e) => MigrationError::Record(e),
    }
}

/// Durable home of the record; at most one migration per rig
pub trait MigrationStore: Send + Sync {
    fn load(&self) -> Result<Option<MigrationRecord>, MigrationError>;

    fn save(&self, record: &MigrationRecord) -> Result<(), MigrationError>;

    fn clear(&self) -> Result<(), MigrationError>;
}

/// `<rig>/.runtime/migration.json`
#[derive(Debug, Clone)]
pub struct JsonMigrationStore {
    path: PathBuf,
}

impl JsonMigrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_rig(root: &Path) -> Self {
        Self::new(root.join(RUNTIME_DIR).join(RECORD_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MigrationStore for JsonMigrationStore {
    fn load(&self) -> Result<Option<MigrationRecord>, MigrationError> {
        read_json(&self.path).map_err(file_error)
    }

    fn save(&self, record: &MigrationRecord) -> Result<(), MigrationError> {
        write_json_atomic(&self.path, record).map_err(file_error)
    }

    fn clear(&self) -> Result<(), MigrationError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

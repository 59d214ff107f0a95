use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;
use vcs::VcsBackendType;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum RigConfigError {
    #[error("rig config not found at {0}")]
    NotFound(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rig config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How workers get their working directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RigLayout {
    /// Every worker owns an independent clone of the store
    #[default]
    Clones,
    /// Workers are workspaces attached to one anchor repository
    Workspaces,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub name: String,
    /// Relative to the rig root unless absolute
    pub path: PathBuf,
}

impl WorkerEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigConfig {
    pub name: String,
    /// `None` means auto-detect from the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsBackendType>,
    /// Shared object store (bare repository or anchor)
    pub store: PathBuf,
    #[serde(default)]
    pub layout: RigLayout,
    #[serde(default)]
    pub workers: Vec<WorkerEntry>,
    /// Dispatch freeze, persisted so other processes observe it
    #[serde(default)]
    pub frozen: bool,
}

impl RigConfig {
    pub fn new(name: impl Into<String>, store: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            vcs: None,
            store: store.into(),
            layout: RigLayout::default(),
            workers: Vec::new(),
            frozen: false,
        }
    }

    pub fn store_path(&self, root: &Path) -> PathBuf {
        root.join(&self.store)
    }

    pub fn worker_path(&self, root: &Path, worker: &WorkerEntry) -> PathBuf {
        root.join(&worker.path)
    }
}

/// Source of truth for a rig's configuration
pub trait RigConfigStore: Send + Sync {
    /// Rig root; relative paths in the config resolve against it
    fn root(&self) -> &Path;

    fn load(&self) -> Result<RigConfig, RigConfigError>;

    fn save(&self, config: &RigConfig) -> Result<(), RigConfigError>;

    /// Load, apply `edit`, save. Returns the saved config.
    fn update(&self, edit: &mut dyn FnMut(&mut RigConfig)) -> Result<RigConfig, RigConfigError> {
        let mut config = self.load()?;
        edit(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}

/// `<rig>/config.json`
#[derive(Debug, Clone)]
pub struct JsonRigConfigStore {
    root: PathBuf,
}

impl JsonRigConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

impl RigConfigStore for JsonRigConfigStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn load(&self) -> Result<RigConfig, RigConfigError> {
        let path = self.path();
        match read_json(&path) {
            Ok(Some(config)) => Ok(config),
            Ok(None) => Err(RigConfigError::NotFound(path)),
            Err(JsonFileError::Io(source)) => Err(RigConfigError::Io { path, source }),
            Err(JsonFileError::Parse(source)) => Err(RigConfigError::Parse { path, source }),
        }
    }

    fn save(&self, config: &RigConfig) -> Result<(), RigConfigError> {
        let path = self.path();
        debug!("Writing rig config {}", path.display());
        write_json_atomic(&path, config).map_err(|e| match e {
            JsonFileError::Io(source) => RigConfigError::Io { path, source },
            JsonFileError::Parse(source) => RigConfigError::Parse { path, source },
        })
    }
}

#[derive(Debug, Error)]
pub(crate) enum JsonFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

/// `Ok(None)` when the file does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, JsonFileError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write to a sibling temp file, then rename over `path`
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), JsonFileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

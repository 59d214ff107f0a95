//! Manual ways back to the pre-migration layout, from cheapest to most
//! drastic. None of them run automatically.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use vcs::{VcsBackendType, VcsConfig, VcsError, VcsFactory};

use super::{
    backup::{BackupError, BackupFacility, DirectoryBackup},
    migration::{MigrationError, MigrationStore, PreMigrationManifest},
    rig_config::{RigConfigError, RigConfigStore},
};

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("anchor {anchor} still has workspaces attached: {}", display_paths(.workspaces))]
    AnchorInUse {
        anchor: PathBuf,
        workspaces: Vec<PathBuf>,
    },
    #[error("a migration is still recorded for this rig; abort it first")]
    MigrationInProgress,
    #[error(transparent)]
    Manifest(#[from] MigrationError),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Config(#[from] RigConfigError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Level (a): delete a new anchor nobody uses
///
/// Refused while any workspace other than the anchor itself is registered.
pub fn discard_anchor(
    anchor: &Path,
    backend: Option<VcsBackendType>,
) -> Result<(), RollbackError> {
    let vcs = VcsFactory::from_config(anchor, backend)?;
    let attached: Vec<PathBuf> = vcs
        .workspace_list()?
        .into_iter()
        .map(|ws| ws.path)
        .filter(|path| !same_path(path, anchor))
        .collect();
    if !attached.is_empty() {
        return Err(RollbackError::AnchorInUse {
            anchor: anchor.to_path_buf(),
            workspaces: attached,
        });
    }
    info!("Discarding anchor {}", anchor.display());
    fs::remove_dir_all(anchor)?;
    Ok(())
}

/// What [`restore_store_backup`] rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub store: PathBuf,
    /// One per worker, on its recorded ref
    pub clones: Vec<PathBuf>,
    /// Directories that stood where a clone had to go
    pub moved_aside: Vec<PathBuf>,
}

/// Level (b): put the store back from its backup and give every worker an
/// independent clone again, on the branch and commit recorded before the
/// migration. The rig config returns to the source backend and layout.
pub fn restore_store_backup(
    config: &dyn RigConfigStore,
    records: &dyn MigrationStore,
    manifest_path: &Path,
) -> Result<RestoreReport, RollbackError> {
    if records.load()?.is_some() {
        return Err(RollbackError::MigrationInProgress);
    }
    let manifest = PreMigrationManifest::load(manifest_path)?;
    let root = config.root().to_path_buf();
    info!(
        "Restoring rig '{}' to {} clones from {}",
        manifest.rig,
        manifest.source,
        manifest_path.display()
    );

    DirectoryBackup.restore(&manifest.store_backup, &manifest.store)?;
    let store_url = manifest.store.to_string_lossy().into_owned();

    let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let mut clones = Vec::new();
    let mut moved_aside = Vec::new();
    for worker in &manifest.workers {
        let path = root.join(&worker.path);
        if fs::symlink_metadata(&path).is_ok() {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(format!(".rolled-back-{stamp}"));
            let aside = path.with_file_name(name);
            warn!("Moving {} aside to {}", path.display(), aside.display());
            fs::rename(&path, &aside)?;
            moved_aside.push(aside);
        }

        let vcs = VcsFactory::create(&VcsConfig::new(manifest.source, &path))?;
        vcs.clone_from(&store_url, &path)?;
        if let Some(preserved) = manifest.preserved_ref(&worker.name) {
            match &preserved.branch {
                Some(branch) => {
                    if !vcs.branch_exists(branch)? {
                        vcs.create_branch_from(branch, &preserved.commit)?;
                    }
                    vcs.checkout(branch)?;
                    if vcs.rev("HEAD")? != preserved.commit {
                        vcs.reset_branch(branch, &preserved.commit)?;
                    }
                }
                None => vcs.checkout(&preserved.commit)?,
            }
        }
        info!("Recreated clone for '{}' at {}", worker.name, path.display());
        clones.push(path);
    }

    let source = manifest.source;
    let layout = manifest.layout;
    let store = manifest.store_config.clone();
    config.update(&mut |c| {
        c.vcs = Some(source);
        c.store = store.clone();
        c.layout = layout;
        c.frozen = false;
    })?;

    Ok(RestoreReport {
        store: manifest.store,
        clones,
        moved_aside,
    })
}

/// Level (c): swap the whole rig for its pre-migration archive
///
/// The current rig is moved aside, not deleted; its new location is returned.
pub fn restore_archive(root: &Path, archive: &Path) -> Result<PathBuf, RollbackError> {
    if !archive.is_dir() {
        return Err(BackupError::MissingSource(archive.to_path_buf()).into());
    }
    let mut name = root.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".rolled-back-{}", Utc::now().format("%Y%m%d%H%M%S")));
    let aside = root.with_file_name(name);

    info!(
        "Replacing rig {} with archive {} (current rig kept at {})",
        root.display(),
        archive.display(),
        aside.display()
    );
    fs::rename(root, &aside)?;
    if let Err(e) = DirectoryBackup.restore(archive, root) {
        warn!("Restoring archive failed, putting the rig back: {}", e);
        if fs::symlink_metadata(root).is_ok() {
            fs::remove_dir_all(root)?;
        }
        fs::rename(&aside, root)?;
        return Err(e.into());
    }
    Ok(aside)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::migration::JsonMigrationStore;
    use crate::services::rig_config::{JsonRigConfigStore, RigConfig};
    use tempfile::TempDir;

    #[test]
    fn test_restore_archive_swaps_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rig");
        let archive = dir.path().join("rig.archive-1");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("config.json"), "new").unwrap();
        fs::create_dir_all(archive.join("workers/a")).unwrap();
        fs::write(archive.join("config.json"), "old").unwrap();

        let aside = restore_archive(&root, &archive).unwrap();
        assert_eq!(fs::read_to_string(root.join("config.json")).unwrap(), "old");
        assert!(root.join("workers/a").is_dir());
        assert_eq!(fs::read_to_string(aside.join("config.json")).unwrap(), "new");
        assert!(archive.exists());
    }

    #[test]
    fn test_restore_archive_requires_archive() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rig");
        fs::create_dir_all(&root).unwrap();
        let err = restore_archive(&root, &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, RollbackError::Backup(BackupError::MissingSource(_))));
        assert!(root.is_dir());
    }

    #[test]
    fn test_unreadable_record_blocks_restore() {
        let dir = TempDir::new().unwrap();
        let config = JsonRigConfigStore::new(dir.path());
        config.save(&RigConfig::new("demo", "anchor")).unwrap();
        let records = JsonMigrationStore::for_rig(dir.path());
        fs::create_dir_all(records.path().parent().unwrap()).unwrap();
        fs::write(records.path(), "{}").unwrap();

        let err = restore_store_backup(&config, &records, &dir.path().join("manifest.json"))
            .unwrap_err();
        assert!(matches!(err, RollbackError::Manifest(MigrationError::Record(_))));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let config = JsonRigConfigStore::new(dir.path());
        config.save(&RigConfig::new("demo", "anchor")).unwrap();
        let records = JsonMigrationStore::for_rig(dir.path());
        let err = restore_store_backup(&config, &records, &dir.path().join("manifest.json"))
            .unwrap_err();
        assert!(matches!(err, RollbackError::Manifest(MigrationError::Io(_))));
    }
}

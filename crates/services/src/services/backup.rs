use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup source {0} does not exist")]
    MissingSource(PathBuf),
    #[error("backup destination {0} already exists")]
    DestinationExists(PathBuf),
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whole-directory snapshots taken before destructive work
pub trait BackupFacility: Send + Sync {
    /// Copy `source` to `dest`, which must not exist yet
    fn backup(&self, source: &Path, dest: &Path) -> Result<(), BackupError>;

    /// Replace `dest` with the contents of `backup`
    fn restore(&self, backup: &Path, dest: &Path) -> Result<(), BackupError>;

    /// Delete a backup; missing backups are not an error
    fn discard(&self, backup: &Path) -> Result<(), BackupError>;
}

/// Plain recursive copies on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryBackup;

impl BackupFacility for DirectoryBackup {
    fn backup(&self, source: &Path, dest: &Path) -> Result<(), BackupError> {
        if !source.exists() {
            return Err(BackupError::MissingSource(source.to_path_buf()));
        }
        if dest.exists() {
            return Err(BackupError::DestinationExists(dest.to_path_buf()));
        }
        info!("Backing up {} to {}", source.display(), dest.display());
        // A destination inside the source must not be copied into itself
        copy_tree(source, dest, |path| path.starts_with(dest))?;
        Ok(())
    }

    fn restore(&self, backup: &Path, dest: &Path) -> Result<(), BackupError> {
        if !backup.exists() {
            return Err(BackupError::MissingSource(backup.to_path_buf()));
        }
        info!("Restoring {} from {}", dest.display(), backup.display());
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(BackupError::io(dest))?;
        }
        copy_tree(backup, dest, |_| false)?;
        Ok(())
    }

    fn discard(&self, backup: &Path) -> Result<(), BackupError> {
        if !backup.exists() {
            return Ok(());
        }
        debug!("Discarding backup {}", backup.display());
        fs::remove_dir_all(backup).map_err(BackupError::io(backup))
    }
}

/// Recursively copy `src` into `dst`, skipping entries for which `skip`
/// returns true (a skipped directory is not descended into). Files already
/// present in `dst` are left alone. Returns the number of files copied.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    skip: impl Fn(&Path) -> bool,
) -> Result<usize, BackupError> {
    let mut copied = 0;
    for entry in WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.path() == src || !skip(e.path()))
    {
        let entry = entry.map_err(|source| BackupError::Walk {
            path: src.to_path_buf(),
            source,
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(BackupError::io(&target))?;
        } else if target.symlink_metadata().is_ok() {
            continue;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            copied += 1;
        } else {
            fs::copy(entry.path(), &target).map_err(BackupError::io(&target))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), BackupError> {
    let points_to = fs::read_link(link).map_err(BackupError::io(link))?;
    std::os::unix::fs::symlink(points_to, target).map_err(BackupError::io(target))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), BackupError> {
    fs::copy(link, target)
        .map(|_| ())
        .map_err(BackupError::io(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("objects/ab")).unwrap();
        fs::write(root.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(root.join("objects/ab/cdef"), "blob").unwrap();
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store.git");
        let backup = dir.path().join("backup");
        populate(&store);

        DirectoryBackup.backup(&store, &backup).unwrap();
        assert_eq!(fs::read_to_string(backup.join("objects/ab/cdef")).unwrap(), "blob");

        fs::write(store.join("HEAD"), "ref: refs/heads/broken\n").unwrap();
        fs::write(store.join("stray"), "x").unwrap();
        DirectoryBackup.restore(&backup, &store).unwrap();
        assert_eq!(
            fs::read_to_string(store.join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert!(!store.join("stray").exists());
        assert!(backup.exists());

        DirectoryBackup.discard(&backup).unwrap();
        assert!(!backup.exists());
        DirectoryBackup.discard(&backup).unwrap();
    }

    #[test]
    fn test_backup_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        populate(&dir.path().join("src"));
        fs::create_dir(dir.path().join("dst")).unwrap();
        let err = DirectoryBackup
            .backup(&dir.path().join("src"), &dir.path().join("dst"))
            .unwrap_err();
        assert!(matches!(err, BackupError::DestinationExists(_)));

        let err = DirectoryBackup
            .backup(&dir.path().join("missing"), &dir.path().join("other"))
            .unwrap_err();
        assert!(matches!(err, BackupError::MissingSource(_)));
    }

    #[test]
    fn test_backup_into_own_subdirectory() {
        let dir = TempDir::new().unwrap();
        let rig = dir.path().join("rig");
        populate(&rig);
        let dest = rig.join(".runtime/archive");

        DirectoryBackup.backup(&rig, &dest).unwrap();
        assert!(dest.join("HEAD").exists());
        assert!(!dest.join(".runtime/archive").exists());
    }

    #[test]
    fn test_copy_tree_skips_and_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join(".git/config"), "x").unwrap();
        fs::write(src.join("kept.txt"), "from src").unwrap();
        fs::create_dir_all(src.join("target/debug")).unwrap();
        fs::write(src.join("target/debug/app"), "bin").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("kept.txt"), "from dst").unwrap();

        let copied = copy_tree(&src, &dst, |p| p.ends_with(".git")).unwrap();
        assert_eq!(copied, 1);
        assert!(!dst.join(".git").exists());
        assert_eq!(fs::read_to_string(dst.join("kept.txt")).unwrap(), "from dst");
        assert_eq!(fs::read_to_string(dst.join("target/debug/app")).unwrap(), "bin");
    }
}

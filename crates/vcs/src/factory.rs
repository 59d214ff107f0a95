use crate::backend::git::GitVcs;
use crate::backend::jj::JjVcs;
use crate::error::VcsError;
use crate::traits::Vcs;
use crate::types::VcsBackendType;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for VCS backend
#[derive(Debug, Clone)]
pub struct VcsConfig {
    pub backend_type: VcsBackendType,
    /// Working directory the handle is bound to
    pub path: PathBuf,
    /// Explicit metadata directory (`.git`/bare store, or `.jj`)
    pub git_dir: Option<PathBuf>,
    /// Deadline applied to every subprocess the handle runs
    pub timeout: Option<Duration>,
}

impl VcsConfig {
    pub fn new(backend_type: VcsBackendType, path: impl Into<PathBuf>) -> Self {
        Self {
            backend_type,
            path: path.into(),
            git_dir: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Factory for creating VCS backends
pub struct VcsFactory;

impl VcsFactory {
    /// Create a backend based on configuration
    ///
    /// The directory is not probed, so this also yields handles for
    /// directories that do not exist yet (clone destinations, setup calls).
    pub fn create(config: &VcsConfig) -> Result<Box<dyn Vcs>, VcsError> {
        tracing::debug!(
            backend = %config.backend_type,
            path = ?config.path,
            git_dir = ?config.git_dir,
            "creating VCS handle"
        );
        let vcs: Box<dyn Vcs> = match config.backend_type {
            VcsBackendType::Git => {
                let vcs = match &config.git_dir {
                    Some(git_dir) => {
                        let work = (config.path != *git_dir).then(|| config.path.clone());
                        GitVcs::with_git_dir(git_dir.clone(), work)
                    }
                    None => GitVcs::new(config.path.clone()),
                };
                Box::new(vcs.with_timeout(config.timeout))
            }
            VcsBackendType::Jujutsu => {
                let vcs = match &config.git_dir {
                    Some(jj_dir) => JjVcs::with_repo_dir(jj_dir.clone(), Some(config.path.clone())),
                    None => JjVcs::new(config.path.clone()),
                };
                Box::new(vcs.with_timeout(config.timeout))
            }
        };
        Ok(vcs)
    }

    /// Open an existing repository, auto-detecting its backend
    pub fn open(dir: &Path) -> Result<Box<dyn Vcs>, VcsError> {
        let backend_type = detect_vcs_type(dir)?;
        Self::create(&VcsConfig::new(backend_type, dir))
    }

    /// Explicit type wins; `None` auto-detects
    pub fn from_config(
        dir: &Path,
        backend_type: Option<VcsBackendType>,
    ) -> Result<Box<dyn Vcs>, VcsError> {
        match backend_type {
            Some(backend_type) => Self::create(&VcsConfig::new(backend_type, dir)),
            None => Self::open(dir),
        }
    }

    /// Handle over an explicit metadata directory, e.g. a bare store with an
    /// optional attached working directory. The type cannot be guessed here.
    pub fn with_git_dir(
        git_dir: &Path,
        work_dir: Option<&Path>,
        backend_type: Option<VcsBackendType>,
    ) -> Result<Box<dyn Vcs>, VcsError> {
        let backend_type = backend_type.ok_or_else(|| {
            VcsError::InvalidOperation("VCS type required for explicit git dir".to_string())
        })?;
        let path = work_dir.unwrap_or(git_dir).to_path_buf();
        Self::create(&VcsConfig {
            backend_type,
            path,
            git_dir: Some(git_dir.to_path_buf()),
            timeout: None,
        })
    }

    /// Auto-detect backend from existing repository
    pub fn detect(path: &Path) -> Result<VcsBackendType, VcsError> {
        detect_vcs_type(path)
    }
}

/// Backend used by `dir`.
///
/// jj is checked first: a colocated repository carries both markers.
pub fn detect_vcs_type(dir: &Path) -> Result<VcsBackendType, VcsError> {
    if dir.join(".jj").is_dir() {
        Ok(VcsBackendType::Jujutsu)
    } else if dir.join(".git").exists() || is_bare_git_dir(dir) {
        // `.git` is a file in linked worktrees
        Ok(VcsBackendType::Git)
    } else {
        Err(VcsError::not_a_repo(dir))
    }
}

fn is_bare_git_dir(dir: &Path) -> bool {
    dir.join("HEAD").is_file() && dir.join("objects").is_dir() && dir.join("refs").is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_prefers_jj_when_colocated() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        assert_eq!(detect_vcs_type(dir.path()).unwrap(), VcsBackendType::Git);

        fs::create_dir(dir.path().join(".jj")).unwrap();
        assert_eq!(detect_vcs_type(dir.path()).unwrap(), VcsBackendType::Jujutsu);
    }

    #[test]
    fn test_detect_git_worktree_file_and_bare() {
        let worktree = TempDir::new().unwrap();
        fs::write(worktree.path().join(".git"), "gitdir: /elsewhere\n").unwrap();
        assert_eq!(detect_vcs_type(worktree.path()).unwrap(), VcsBackendType::Git);

        let bare = TempDir::new().unwrap();
        fs::write(bare.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::create_dir(bare.path().join("objects")).unwrap();
        fs::create_dir(bare.path().join("refs")).unwrap();
        assert_eq!(detect_vcs_type(bare.path()).unwrap(), VcsBackendType::Git);
    }

    #[test]
    fn test_detect_plain_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            detect_vcs_type(dir.path()),
            Err(VcsError::NotARepository(_))
        ));
        assert!(VcsFactory::open(dir.path()).is_err());
    }

    #[test]
    fn test_from_config_explicit_type_wins() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let vcs = VcsFactory::from_config(dir.path(), Some(VcsBackendType::Jujutsu)).unwrap();
        assert_eq!(vcs.vcs_type(), VcsBackendType::Jujutsu);

        let vcs = VcsFactory::from_config(dir.path(), None).unwrap();
        assert_eq!(vcs.vcs_type(), VcsBackendType::Git);
        assert_eq!(vcs.work_dir(), dir.path());
    }

    #[test]
    fn test_with_git_dir_requires_type() {
        let err = VcsFactory::with_git_dir(Path::new("/rig/.repo.git"), None, None)
            .err()
            .unwrap();
        assert!(matches!(err, VcsError::InvalidOperation(_)));

        let vcs = VcsFactory::with_git_dir(
            Path::new("/rig/.repo.git"),
            Some(Path::new("/rig/workers/a")),
            Some(VcsBackendType::Git),
        )
        .unwrap();
        assert_eq!(vcs.work_dir(), Path::new("/rig/workers/a"));
    }
}

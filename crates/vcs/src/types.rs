use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Type of VCS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VcsBackendType {
    #[serde(rename = "git")]
    Git,
    #[serde(rename = "jj")]
    Jujutsu,
}

impl VcsBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Jujutsu => "jj",
        }
    }
}

impl fmt::Display for VcsBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "jj" | "jujutsu" => Ok(Self::Jujutsu),
            other => Err(format!("unknown VCS type: {other}")),
        }
    }
}

/// Working directory state at one point in time.
///
/// The four path lists are disjoint. `clean` is derived from them and cannot
/// disagree with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub clean: bool,
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
}

impl Status {
    pub fn from_paths(
        modified: Vec<String>,
        added: Vec<String>,
        deleted: Vec<String>,
        untracked: Vec<String>,
    ) -> Self {
        let clean =
            modified.is_empty() && added.is_empty() && deleted.is_empty() && untracked.is_empty();
        Self {
            clean,
            modified,
            added,
            deleted,
            untracked,
        }
    }

    /// Tracked paths with changes (modified, added or deleted).
    pub fn changed_paths(&self) -> Vec<String> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.deleted)
            .cloned()
            .collect()
    }
}

/// A git worktree or jj workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub path: PathBuf,
    /// Branch (git) or bookmark (jj); `None` only when detached
    pub branch: Option<String>,
    pub commit: String,
}

/// Summary of everything that would be lost if a working copy were deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UncommittedWork {
    pub has_changes: bool,
    pub stash_count: usize,
    pub unpushed_commits: usize,
    pub modified_files: Vec<String>,
    pub untracked_files: Vec<String>,
}

impl UncommittedWork {
    pub fn is_clean(&self) -> bool {
        !self.has_changes && self.stash_count == 0 && self.unpushed_commits == 0
    }

    /// Short human-readable description, e.g. `2 modified, 1 unpushed`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.modified_files.is_empty() {
            parts.push(format!("{} modified", self.modified_files.len()));
        }
        if !self.untracked_files.is_empty() {
            parts.push(format!("{} untracked", self.untracked_files.len()));
        }
        if self.stash_count > 0 {
            parts.push(format!("{} stashed", self.stash_count));
        }
        if self.unpushed_commits > 0 {
            parts.push(format!("{} unpushed", self.unpushed_commits));
        }
        if parts.is_empty() {
            "clean".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Result of comparing a local branch with its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushState {
    pub pushed: bool,
    /// Commits on the local branch that the remote does not have
    pub unpushed: usize,
}

/// Backend features that cannot be hidden behind the common interface.
///
/// Callers should not need this for ordinary work; it exists for the few
/// places that must branch on a real semantic difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `add` selects what the next commit records
    pub staging_area: bool,
    /// `stash_count` can be non-zero
    pub stash: bool,
    /// The backend can record conflicts inside commits
    pub first_class_conflicts: bool,
}

/// Restorable repository state captured before a trial merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// git: the checked-out branch, or the commit of a detached HEAD
    GitHead {
        branch: Option<String>,
        commit: String,
    },
    /// jj: operation log entry to restore
    JjOperation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_clean_invariant() {
        assert!(Status::from_paths(vec![], vec![], vec![], vec![]).clean);
        assert!(!Status::from_paths(vec![], vec![], vec![], vec!["x".into()]).clean);
        assert!(!Status::from_paths(vec!["m".into()], vec![], vec![], vec![]).clean);
    }

    #[test]
    fn test_uncommitted_work_is_clean() {
        let mut work = UncommittedWork::default();
        assert!(work.is_clean());
        assert_eq!(work.summary(), "clean");

        work.stash_count = 1;
        assert!(!work.is_clean());

        work.stash_count = 0;
        work.unpushed_commits = 2;
        assert!(!work.is_clean());
        assert_eq!(work.summary(), "2 unpushed");
    }

    #[test]
    fn test_backend_type_serde_and_parse() {
        assert_eq!(
            serde_json::to_string(&VcsBackendType::Jujutsu).unwrap(),
            "\"jj\""
        );
        assert_eq!(
            serde_json::from_str::<VcsBackendType>("\"git\"").unwrap(),
            VcsBackendType::Git
        );
        assert_eq!("JJ".parse::<VcsBackendType>().unwrap(), VcsBackendType::Jujutsu);
        assert!("svn".parse::<VcsBackendType>().is_err());
    }
}

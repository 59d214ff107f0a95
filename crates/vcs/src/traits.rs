use crate::error::VcsError;
use crate::types::*;
use std::path::Path;

/// Core repository identity
///
/// A handle is bound to one directory and one backend for its whole life.
///
/// Note: handles are `Send` but not `Sync`. Operations against one working
/// directory must be serialised by the caller; use one handle per worker.
pub trait VcsRepository: Send {
    /// Get backend type
    fn vcs_type(&self) -> VcsBackendType;

    /// Get the working directory path
    fn work_dir(&self) -> &Path;

    /// Backend features that differ semantically
    fn capabilities(&self) -> Capabilities;
}

/// Creating new repositories from a remote
pub trait VcsSetup: VcsRepository {
    /// Clone `url` into `dest` as an ordinary working copy
    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), VcsError>;

    /// Clone into a structure that several workspaces can share
    ///
    /// For Git: a bare repository
    /// For Jujutsu: a colocated repository used as the shared anchor
    fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), VcsError>;
}

/// Branch (git) / bookmark (jj) management
pub trait VcsRefs: VcsRepository {
    /// Current branch, `None` when detached
    fn current_branch(&self) -> Result<Option<String>, VcsError>;

    /// Default branch name, e.g. `main`
    fn default_branch(&self) -> String;

    /// Switch the working copy to `reference`
    fn checkout(&self, reference: &str) -> Result<(), VcsError>;

    /// Create a branch at HEAD; fails if it already exists locally
    fn create_branch(&self, name: &str) -> Result<(), VcsError>;

    /// Create a branch at `reference`; fails if it already exists locally
    fn create_branch_from(&self, name: &str, reference: &str) -> Result<(), VcsError>;

    /// Delete a local branch; without `force` an unmerged branch is kept
    fn delete_branch(&self, name: &str, force: bool) -> Result<(), VcsError>;

    /// Local branches matching a glob pattern (`*` for all)
    fn list_branches(&self, pattern: &str) -> Result<Vec<String>, VcsError>;

    fn branch_exists(&self, name: &str) -> Result<bool, VcsError>;

    fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool, VcsError>;

    /// Force-move `name` to `reference`, creating it if needed
    fn reset_branch(&self, name: &str, reference: &str) -> Result<(), VcsError>;
}

/// Remote repository operations
pub trait VcsRemotes: VcsRepository {
    fn fetch(&self, remote: &str) -> Result<(), VcsError>;

    fn fetch_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError>;

    /// Fetch `branch` and integrate it into the current branch
    fn pull(&self, remote: &str, branch: &str) -> Result<(), VcsError>;

    fn push(&self, remote: &str, branch: &str, force: bool) -> Result<(), VcsError>;

    fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError>;

    fn remote_url(&self, remote: &str) -> Result<String, VcsError>;

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<(), VcsError>;
}

/// Recording changes
pub trait VcsStaging: VcsRepository {
    /// Stage paths for the next commit
    ///
    /// For Git: `git add`
    /// For Jujutsu: no-op, every file is tracked automatically
    fn add(&self, paths: &[&str]) -> Result<(), VcsError>;

    /// Record every outstanding change, untracked files included, as a new
    /// change described by `message`
    fn commit(&self, message: &str) -> Result<(), VcsError>;

    /// Same observable effect as `commit`
    fn commit_all(&self, message: &str) -> Result<(), VcsError>;
}

/// Read-only working copy state, computed fresh on every call
pub trait VcsStatus: VcsRepository {
    fn status(&self) -> Result<Status, VcsError>;

    fn has_uncommitted_changes(&self) -> Result<bool, VcsError>;

    /// Status plus stashes and unpushed commits
    fn check_uncommitted_work(&self) -> Result<UncommittedWork, VcsError>;
}

/// Merge and rebase, normalised to block on conflict
///
/// A conflict is always reported as `MergeConflict`/`RebaseConflict`, even on
/// backends that could record it in a commit.
pub trait VcsMerge: VcsRepository {
    fn merge(&self, branch: &str) -> Result<(), VcsError>;

    /// Merge with an explicit merge commit and message
    fn merge_no_ff(&self, branch: &str, message: &str) -> Result<(), VcsError>;

    fn rebase(&self, onto: &str) -> Result<(), VcsError>;

    fn abort_merge(&self) -> Result<(), VcsError>;

    fn abort_rebase(&self) -> Result<(), VcsError>;
}

/// Primitives behind [`crate::check_conflicts`]
///
/// These mutate the working copy. Use them through
/// [`crate::TrialMergeGuard`], which guarantees `restore` runs.
pub trait VcsTrialMerge: VcsRepository {
    /// Capture the state a trial merge must return to
    fn checkpoint(&self) -> Result<Checkpoint, VcsError>;

    /// Merge `source` into a disposable copy of `target`, returning the
    /// conflicted paths. Leaves the repository in the trial state.
    fn trial_merge(&self, source: &str, target: &str) -> Result<Vec<String>, VcsError>;

    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), VcsError>;
}

/// Git worktrees / jj workspaces sharing one object store
pub trait VcsWorkspaces: VcsRepository {
    /// Create `branch` at HEAD and a new workspace on it
    fn workspace_add(&self, path: &Path, branch: &str) -> Result<(), VcsError>;

    fn workspace_add_detached(&self, path: &Path, reference: &str) -> Result<(), VcsError>;

    /// Attach a workspace to an existing branch; fails if the branch is
    /// checked out in another workspace
    fn workspace_add_existing(&self, path: &Path, branch: &str) -> Result<(), VcsError>;

    fn workspace_add_existing_force(&self, path: &Path, branch: &str) -> Result<(), VcsError>;

    fn workspace_remove(&self, path: &Path, force: bool) -> Result<(), VcsError>;

    /// Forget registry entries whose directory no longer exists
    fn workspace_prune(&self) -> Result<(), VcsError>;

    /// The backend's workspace registry
    fn workspace_list(&self) -> Result<Vec<Workspace>, VcsError>;
}

/// Comparison and history queries
pub trait VcsHistory: VcsRepository {
    /// Commit id for a ref
    fn rev(&self, reference: &str) -> Result<String, VcsError>;

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, VcsError>;

    /// Commits on `branch` that are not on `base`
    fn commits_ahead(&self, base: &str, branch: &str) -> Result<usize, VcsError>;

    /// Date (YYYY-MM-DD) of the first commit unique to `branch`
    fn branch_created_date(&self, branch: &str) -> Result<String, VcsError>;

    fn branch_pushed_to_remote(&self, branch: &str, remote: &str) -> Result<PushState, VcsError>;

    /// Always 0 on backends without stashes
    fn stash_count(&self) -> Result<usize, VcsError>;

    fn unpushed_commits(&self) -> Result<usize, VcsError>;
}

/// Combined trait representing a full VCS backend
///
/// This is the main trait that callers interact with.
pub trait Vcs:
    VcsRepository
    + VcsSetup
    + VcsRefs
    + VcsRemotes
    + VcsStaging
    + VcsStatus
    + VcsMerge
    + VcsTrialMerge
    + VcsWorkspaces
    + VcsHistory
{
    /// Get a human-readable description of this backend
    fn description(&self) -> String {
        format!("{} backend at {}", self.vcs_type(), self.work_dir().display())
    }
}

//! Git backend implementation for the VCS abstraction layer
//!
//! Every operation shells out to the `git` executable. Nothing is cached
//! between calls, so two handles on the same repository always agree.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::branch_matcher;
use crate::backend::cmd::{lines, CommandOutput, CommandRunner};
use crate::error::VcsError;
use crate::traits::*;
use crate::types::*;

/// Git implementation of the VCS backend
#[derive(Debug, Clone)]
pub struct GitVcs {
    work_dir: PathBuf,
    /// Explicit metadata directory, for bare stores and detached work trees
    git_dir: Option<PathBuf>,
    explicit_work_tree: bool,
    runner: CommandRunner,
}

impl GitVcs {
    /// Handle for an ordinary working copy (or a bare repository opened by
    /// its own path).
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            git_dir: None,
            explicit_work_tree: false,
            runner: Self::runner(),
        }
    }

    /// Handle with an explicit git directory.
    ///
    /// With `work_dir` the pair is passed as `--git-dir`/`--work-tree`;
    /// without it the handle operates on the git directory alone.
    pub fn with_git_dir(git_dir: impl Into<PathBuf>, work_dir: Option<PathBuf>) -> Self {
        let git_dir = git_dir.into();
        let explicit_work_tree = work_dir.is_some();
        Self {
            work_dir: work_dir.unwrap_or_else(|| git_dir.clone()),
            git_dir: Some(git_dir),
            explicit_work_tree,
            runner: Self::runner(),
        }
    }

    /// Bound every command to `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    fn runner() -> CommandRunner {
        CommandRunner::new("git")
            .with_env("GIT_TERMINAL_PROMPT", "0")
            .with_env("LC_ALL", "C")
    }

    fn args<I, S>(&self, args: I) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut full: Vec<OsString> = vec!["-c".into(), "core.quotepath=off".into()];
        if let Some(git_dir) = &self.git_dir {
            full.push("--git-dir".into());
            full.push(git_dir.clone().into_os_string());
            if self.explicit_work_tree {
                full.push("--work-tree".into());
                full.push(self.work_dir.clone().into_os_string());
            }
        }
        full.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        full
    }

    fn git<I, S>(&self, operation: &'static str, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.runner.run(operation, &self.work_dir, self.args(args))
    }

    fn probe<I, S>(&self, operation: &'static str, args: I) -> Result<CommandOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.runner.probe(operation, &self.work_dir, self.args(args))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    /// Run a git command outside any repository (clone)
    fn run_detached(
        &self,
        operation: &'static str,
        dest: &Path,
        args: Vec<OsString>,
    ) -> Result<(), VcsError> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&parent)?;
        self.runner.run(operation, &parent, args)?;
        Ok(())
    }

    fn conflicted_files(&self) -> Result<Vec<String>, VcsError> {
        let out = self.git("conflicts", ["diff", "--name-only", "--diff-filter=U"])?;
        Ok(lines(&out).map(String::from).collect())
    }

    fn ref_exists(&self, full_ref: &str) -> Result<bool, VcsError> {
        Ok(self
            .probe("show-ref", ["show-ref", "--verify", "--quiet", full_ref])?
            .success)
    }

    fn count(&self, operation: &'static str, args: &[&str]) -> Result<usize, VcsError> {
        let out = self.git(operation, args)?;
        out.trim().parse::<usize>().map_err(|e| VcsError::Command {
            operation,
            command: format!("git {}", args.join(" ")),
            output: format!("unexpected count {:?}: {e}", out.trim()),
        })
    }

    fn has_head(&self) -> Result<bool, VcsError> {
        Ok(self
            .probe("rev-parse", ["rev-parse", "--verify", "--quiet", "HEAD"])?
            .success)
    }

    /// Turn a failed merge-like command into a conflict error when the
    /// index has unmerged paths.
    fn conflict_or(
        &self,
        result: Result<String, VcsError>,
        to_conflict: fn(Vec<String>) -> VcsError,
    ) -> Result<(), VcsError> {
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let conflicts = self.conflicted_files().unwrap_or_default();
                if conflicts.is_empty() {
                    Err(err)
                } else {
                    tracing::debug!(repo = ?self.work_dir, ?conflicts, "git reported conflicts");
                    Err(to_conflict(conflicts))
                }
            }
        }
    }
}

/// Parse `git status --porcelain` output into a [`Status`].
pub(crate) fn parse_porcelain_status(output: &str) -> Status {
    let mut modified = Vec::new();
    let mut added = Vec::new();
    let mut deleted = Vec::new();
    let mut untracked = Vec::new();

    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let (code, rest) = line.split_at(2);
        let mut path = rest[1..].to_string();
        if let Some((_, renamed_to)) = path.split_once(" -> ") {
            path = renamed_to.to_string();
        }
        let path = path.trim_matches('"').to_string();

        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        match (x, y) {
            ('?', '?') => untracked.push(path),
            ('!', '!') => {}
            _ if x == 'A' || y == 'A' => added.push(path),
            _ if x == 'D' || y == 'D' => deleted.push(path),
            _ => modified.push(path),
        }
    }

    Status::from_paths(modified, added, deleted, untracked)
}

/// Parse `git worktree list --porcelain`, skipping the bare entry.
pub(crate) fn parse_worktree_list(output: &str) -> Vec<Workspace> {
    let mut workspaces = Vec::new();
    for block in output.split("\n\n") {
        let mut path = None;
        let mut commit = String::new();
        let mut branch = None;
        let mut bare = false;
        for line in block.lines() {
            if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(p));
            } else if let Some(c) = line.strip_prefix("HEAD ") {
                commit = c.to_string();
            } else if let Some(b) = line.strip_prefix("branch ") {
                branch = Some(b.strip_prefix("refs/heads/").unwrap_or(b).to_string());
            } else if line == "bare" {
                bare = true;
            }
        }
        if let Some(path) = path {
            if !bare {
                workspaces.push(Workspace {
                    path,
                    branch,
                    commit,
                });
            }
        }
    }
    workspaces
}

// ============================================================================
// VcsRepository Implementation
// ============================================================================

impl VcsRepository for GitVcs {
    fn vcs_type(&self) -> VcsBackendType {
        VcsBackendType::Git
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            staging_area: true,
            stash: true,
            first_class_conflicts: false,
        }
    }
}

impl VcsSetup for GitVcs {
    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        self.run_detached(
            "clone",
            dest,
            vec!["clone".into(), url.into(), dest.as_os_str().to_owned()],
        )
    }

    fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        self.run_detached(
            "clone",
            dest,
            vec![
                "clone".into(),
                "--bare".into(),
                url.into(),
                dest.as_os_str().to_owned(),
            ],
        )?;
        // A bare clone has no fetch refspec; add one so remote-tracking refs
        // exist for the workspaces attached later.
        let mut bare = GitVcs::with_git_dir(dest, None);
        bare.runner = self.runner.clone();
        bare.git(
            "clone",
            [
                "config",
                "remote.origin.fetch",
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// VcsRefs Implementation
// ============================================================================

impl VcsRefs for GitVcs {
    fn current_branch(&self) -> Result<Option<String>, VcsError> {
        let out = self.probe("current-branch", ["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        match out.code {
            Some(0) => Ok(Some(out.stdout.trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(crate::error::classify_failure(
                "current-branch",
                "git symbolic-ref --quiet --short HEAD".into(),
                out.combined(),
            )),
        }
    }

    fn default_branch(&self) -> String {
        if let Ok(out) = self.probe(
            "default-branch",
            ["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"],
        ) {
            if out.success {
                let name = out.stdout.trim();
                if let Some(branch) = name.strip_prefix("origin/") {
                    return branch.to_string();
                }
            }
        }
        for candidate in ["main", "master"] {
            if matches!(self.branch_exists(candidate), Ok(true)) {
                return candidate.to_string();
            }
        }
        "main".to_string()
    }

    fn checkout(&self, reference: &str) -> Result<(), VcsError> {
        self.git("checkout", ["checkout", "-q", reference])?;
        Ok(())
    }

    fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.create_branch_from(name, "HEAD")
    }

    fn create_branch_from(&self, name: &str, reference: &str) -> Result<(), VcsError> {
        if self.branch_exists(name)? {
            return Err(VcsError::BranchExists(name.to_string()));
        }
        self.git("create-branch", ["branch", name, reference])?;
        Ok(())
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<(), VcsError> {
        if !self.branch_exists(name)? {
            return Err(VcsError::BranchNotFound(name.to_string()));
        }
        let flag = if force { "-D" } else { "-d" };
        self.git("delete-branch", ["branch", flag, name])?;
        Ok(())
    }

    fn list_branches(&self, pattern: &str) -> Result<Vec<String>, VcsError> {
        let matcher = branch_matcher(pattern)?;
        let out = self.git(
            "list-branches",
            ["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
        )?;
        Ok(lines(&out)
            .filter(|name| matcher.is_match(name))
            .map(String::from)
            .collect())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        self.ref_exists(&format!("refs/heads/{name}"))
    }

    fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool, VcsError> {
        let out = self.probe(
            "remote-branch-exists",
            ["ls-remote", "--exit-code", "--heads", remote, branch],
        )?;
        match out.code {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            _ => Err(crate::error::classify_failure(
                "remote-branch-exists",
                format!("git ls-remote --exit-code --heads {remote} {branch}"),
                out.combined(),
            )),
        }
    }

    fn reset_branch(&self, name: &str, reference: &str) -> Result<(), VcsError> {
        let commit = self.rev(reference)?;
        if self.current_branch()?.as_deref() == Some(name) {
            // The branch is checked out here: move it together with the
            // working copy.
            self.git("reset-branch", ["reset", "--hard", "-q", commit.as_str()])?;
        } else {
            let full_ref = format!("refs/heads/{name}");
            self.git("reset-branch", ["update-ref", full_ref.as_str(), commit.as_str()])?;
        }
        Ok(())
    }
}

// ============================================================================
// VcsRemotes Implementation
// ============================================================================

impl VcsRemotes for GitVcs {
    fn fetch(&self, remote: &str) -> Result<(), VcsError> {
        self.git("fetch", ["fetch", "--prune", remote])?;
        Ok(())
    }

    fn fetch_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.git("fetch", ["fetch", remote, branch])?;
        Ok(())
    }

    fn pull(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        let result = self.git("pull", ["pull", "--no-rebase", "--no-edit", remote, branch]);
        self.conflict_or(result, VcsError::MergeConflict)
    }

    fn push(&self, remote: &str, branch: &str, force: bool) -> Result<(), VcsError> {
        let mut args = vec!["push", "--set-upstream"];
        if force {
            args.push("--force");
        }
        args.push(remote);
        args.push(branch);
        self.git("push", args)?;
        Ok(())
    }

    fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.git("delete-remote-branch", ["push", remote, "--delete", branch])?;
        Ok(())
    }

    fn remote_url(&self, remote: &str) -> Result<String, VcsError> {
        Ok(self
            .git("remote-url", ["remote", "get-url", remote])?
            .trim()
            .to_string())
    }

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<(), VcsError> {
        let remotes = self.git("remote-url", ["remote"])?;
        if lines(&remotes).any(|r| r == remote) {
            self.git("remote-url", ["remote", "set-url", remote, url])?;
        } else {
            self.git("remote-url", ["remote", "add", remote, url])?;
        }
        Ok(())
    }
}

// ============================================================================
// VcsStaging Implementation
// ============================================================================

impl VcsStaging for GitVcs {
    fn add(&self, paths: &[&str]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.git("add", args)?;
        Ok(())
    }

    /// Stages every outstanding modification, untracked files included
    fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.commit_all(message)
    }

    fn commit_all(&self, message: &str) -> Result<(), VcsError> {
        self.git("commit", ["add", "-A"])?;
        self.git("commit", ["commit", "-q", "-m", message])?;
        Ok(())
    }
}

// ============================================================================
// VcsStatus Implementation
// ============================================================================

impl VcsStatus for GitVcs {
    fn status(&self) -> Result<Status, VcsError> {
        let out = self.git("status", ["status", "--porcelain", "--untracked-files=all"])?;
        Ok(parse_porcelain_status(&out))
    }

    fn has_uncommitted_changes(&self) -> Result<bool, VcsError> {
        Ok(!self.status()?.clean)
    }

    fn check_uncommitted_work(&self) -> Result<UncommittedWork, VcsError> {
        let status = self.status()?;
        Ok(UncommittedWork {
            has_changes: !status.clean,
            stash_count: self.stash_count()?,
            unpushed_commits: self.unpushed_commits()?,
            modified_files: status.changed_paths(),
            untracked_files: status.untracked,
        })
    }
}

// ============================================================================
// VcsMerge Implementation
// ============================================================================

impl VcsMerge for GitVcs {
    fn merge(&self, branch: &str) -> Result<(), VcsError> {
        let result = self.git("merge", ["merge", "--no-edit", branch]);
        self.conflict_or(result, VcsError::MergeConflict)
    }

    fn merge_no_ff(&self, branch: &str, message: &str) -> Result<(), VcsError> {
        let result = self.git("merge", ["merge", "--no-ff", "-m", message, branch]);
        self.conflict_or(result, VcsError::MergeConflict)
    }

    fn rebase(&self, onto: &str) -> Result<(), VcsError> {
        let result = self.git("rebase", ["rebase", onto]);
        self.conflict_or(result, VcsError::RebaseConflict)
    }

    fn abort_merge(&self) -> Result<(), VcsError> {
        self.git("abort-merge", ["merge", "--abort"])?;
        Ok(())
    }

    fn abort_rebase(&self) -> Result<(), VcsError> {
        self.git("abort-rebase", ["rebase", "--abort"])?;
        Ok(())
    }
}

// ============================================================================
// VcsTrialMerge Implementation
// ============================================================================

impl VcsTrialMerge for GitVcs {
    fn checkpoint(&self) -> Result<Checkpoint, VcsError> {
        // Untracked files survive the trial untouched; tracked edits would
        // be lost by the final reset.
        if !self.status()?.changed_paths().is_empty() {
            return Err(VcsError::DirtyWorkingCopy);
        }
        Ok(Checkpoint::GitHead {
            branch: self.current_branch()?,
            commit: self.rev("HEAD")?,
        })
    }

    fn trial_merge(&self, source: &str, target: &str) -> Result<Vec<String>, VcsError> {
        let target_commit = self.rev(target)?;
        self.git(
            "check-conflicts",
            ["checkout", "-q", "--detach", target_commit.as_str()],
        )?;

        let out = self.probe(
            "check-conflicts",
            ["merge", "--no-commit", "--no-ff", source],
        )?;
        if out.success {
            return Ok(Vec::new());
        }

        let conflicts = self.conflicted_files()?;
        if conflicts.is_empty() {
            return Err(crate::error::classify_failure(
                "check-conflicts",
                format!("git merge --no-commit --no-ff {source}"),
                out.combined(),
            ));
        }
        Ok(conflicts)
    }

    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), VcsError> {
        let Checkpoint::GitHead { branch, commit } = checkpoint else {
            return Err(VcsError::InvalidOperation(format!(
                "git cannot restore checkpoint {checkpoint:?}"
            )));
        };

        let merging = self
            .probe("restore", ["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])?
            .success;
        if merging {
            self.git("restore", ["merge", "--abort"])?;
        }
        self.git("restore", ["reset", "--hard", "-q"])?;
        match branch {
            Some(branch) => self.git("restore", ["checkout", "-q", branch.as_str()])?,
            None => self.git("restore", ["checkout", "-q", "--detach", commit.as_str()])?,
        };
        Ok(())
    }
}

// ============================================================================
// VcsWorkspaces Implementation
// ============================================================================

impl VcsWorkspaces for GitVcs {
    fn workspace_add(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        if self.branch_exists(branch)? {
            return Err(VcsError::BranchExists(branch.to_string()));
        }
        let path = self.absolute(path);
        let result = self.git(
            "workspace-add",
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("-b"),
                OsStr::new(branch),
                path.as_os_str(),
            ],
        );
        if let Err(e) = result {
            // `worktree add -b` creates the branch before checking out
            if self.branch_exists(branch).unwrap_or(false) {
                if let Err(cleanup) = self.git("workspace-add", ["branch", "-D", branch]) {
                    tracing::warn!("failed to delete branch {} after worktree error: {}", branch, cleanup);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn workspace_add_detached(&self, path: &Path, reference: &str) -> Result<(), VcsError> {
        let path = self.absolute(path);
        self.git(
            "workspace-add",
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("--detach"),
                path.as_os_str(),
                OsStr::new(reference),
            ],
        )?;
        Ok(())
    }

    fn workspace_add_existing(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        if !self.branch_exists(branch)? {
            return Err(VcsError::BranchNotFound(branch.to_string()));
        }
        let path = self.absolute(path);
        self.git(
            "workspace-add",
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                path.as_os_str(),
                OsStr::new(branch),
            ],
        )?;
        Ok(())
    }

    fn workspace_add_existing_force(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        if !self.branch_exists(branch)? {
            return Err(VcsError::BranchNotFound(branch.to_string()));
        }
        let path = self.absolute(path);
        self.git(
            "workspace-add",
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("--force"),
                path.as_os_str(),
                OsStr::new(branch),
            ],
        )?;
        Ok(())
    }

    fn workspace_remove(&self, path: &Path, force: bool) -> Result<(), VcsError> {
        let path = self.absolute(path);
        let mut args: Vec<&OsStr> = vec![OsStr::new("worktree"), OsStr::new("remove")];
        if force {
            args.push(OsStr::new("--force"));
        }
        args.push(path.as_os_str());
        self.git("workspace-remove", args)?;
        Ok(())
    }

    fn workspace_prune(&self) -> Result<(), VcsError> {
        self.git("workspace-prune", ["worktree", "prune"])?;
        Ok(())
    }

    fn workspace_list(&self) -> Result<Vec<Workspace>, VcsError> {
        let out = self.git("workspace-list", ["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }
}

// ============================================================================
// VcsHistory Implementation
// ============================================================================

impl VcsHistory for GitVcs {
    fn rev(&self, reference: &str) -> Result<String, VcsError> {
        let spec = format!("{reference}^{{commit}}");
        let out = self.probe("rev", ["rev-parse", "--verify", "--quiet", spec.as_str()])?;
        if out.success {
            Ok(out.stdout.trim().to_string())
        } else if out.code == Some(1) {
            Err(VcsError::BranchNotFound(reference.to_string()))
        } else {
            Err(crate::error::classify_failure(
                "rev",
                format!("git rev-parse --verify --quiet {spec}"),
                out.combined(),
            ))
        }
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, VcsError> {
        let out = self.probe("is-ancestor", ["merge-base", "--is-ancestor", ancestor, descendant])?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(crate::error::classify_failure(
                "is-ancestor",
                format!("git merge-base --is-ancestor {ancestor} {descendant}"),
                out.combined(),
            )),
        }
    }

    fn commits_ahead(&self, base: &str, branch: &str) -> Result<usize, VcsError> {
        let range = format!("{base}..{branch}");
        self.count("commits-ahead", &["rev-list", "--count", range.as_str()])
    }

    fn branch_created_date(&self, branch: &str) -> Result<String, VcsError> {
        let base = self.default_branch();
        let range = format!("{base}..{branch}");
        let out = self.git(
            "branch-created-date",
            ["log", "--reverse", "--date=short", "--format=%cd", range.as_str()],
        )?;
        if let Some(first) = lines(&out).next() {
            return Ok(first.to_string());
        }
        // No unique commits: fall back to the tip
        let out = self.git(
            "branch-created-date",
            ["log", "-1", "--date=short", "--format=%cd", branch],
        )?;
        Ok(out.trim().to_string())
    }

    fn branch_pushed_to_remote(&self, branch: &str, remote: &str) -> Result<PushState, VcsError> {
        let tracking = format!("refs/remotes/{remote}/{branch}");
        if self.ref_exists(&tracking)? {
            let range = format!("{tracking}..refs/heads/{branch}");
            let unpushed = self.count("branch-pushed", &["rev-list", "--count", range.as_str()])?;
            Ok(PushState {
                pushed: unpushed == 0,
                unpushed,
            })
        } else {
            let local = format!("refs/heads/{branch}");
            let not_remote = format!("--remotes={remote}");
            let unpushed = self.count(
                "branch-pushed",
                &["rev-list", "--count", local.as_str(), "--not", not_remote.as_str()],
            )?;
            Ok(PushState {
                pushed: false,
                unpushed,
            })
        }
    }

    fn stash_count(&self) -> Result<usize, VcsError> {
        let out = self.git("stash-count", ["stash", "list"])?;
        Ok(lines(&out).count())
    }

    fn unpushed_commits(&self) -> Result<usize, VcsError> {
        if !self.has_head()? {
            return Ok(0);
        }
        let upstream = self.probe("unpushed", ["rev-list", "--count", "@{u}..HEAD"])?;
        if upstream.success {
            if let Ok(n) = upstream.stdout.trim().parse::<usize>() {
                return Ok(n);
            }
        }
        // No upstream configured: count commits no remote has seen
        self.count("unpushed", &["rev-list", "--count", "HEAD", "--not", "--remotes"])
    }
}

impl Vcs for GitVcs {}

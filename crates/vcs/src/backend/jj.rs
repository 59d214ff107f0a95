//! Jujutsu backend implementation for the VCS abstraction layer
//!
//! Wraps the `jj` command-line tool. The differences from git that matter
//! to callers are normalised here:
//! - there is no staging area, `add` is a no-op and every file is tracked
//! - the working copy is itself a change (`@`), so "HEAD" maps to `@-`
//! - bookmarks do not follow new commits; `commit` advances them explicitly
//! - conflicts are blocking: a conflicted merge or rebase is undone through
//!   the operation log and reported as an error
//! - jj's workspace registry stores names, not paths, so a path index is
//!   kept next to it in the repo store

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::branch_matcher;
use crate::backend::cmd::{lines, CommandOutput, CommandRunner};
use crate::error::{classify_failure, VcsError};
use crate::traits::*;
use crate::types::*;

const WORKSPACE_INDEX_FILE: &str = "workspace-index.json";
const DEFAULT_WORKSPACE: &str = "default";

/// Jujutsu implementation of the VCS backend
#[derive(Debug, Clone)]
pub struct JjVcs {
    work_dir: PathBuf,
    runner: CommandRunner,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkspaceIndex {
    #[serde(default)]
    workspaces: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    path: PathBuf,
    #[serde(default)]
    branch: Option<String>,
}

impl JjVcs {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            runner: CommandRunner::new("jj"),
        }
    }

    /// Handle for an explicit `.jj` directory, optionally run from a
    /// different workspace root.
    pub fn with_repo_dir(jj_dir: impl Into<PathBuf>, work_dir: Option<PathBuf>) -> Self {
        let jj_dir = jj_dir.into();
        let work_dir = work_dir.unwrap_or_else(|| {
            if jj_dir.file_name().is_some_and(|name| name == ".jj") {
                jj_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| jj_dir.clone())
            } else {
                jj_dir.clone()
            }
        });
        Self::new(work_dir)
    }

    /// Bound every command to `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    fn args<I, S>(args: I) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut full: Vec<OsString> = vec!["--color".into(), "never".into()];
        full.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        full
    }

    fn jj<I, S>(&self, operation: &'static str, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.runner.run(operation, &self.work_dir, Self::args(args))
    }

    fn probe<I, S>(&self, operation: &'static str, args: I) -> Result<CommandOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.runner.probe(operation, &self.work_dir, Self::args(args))
    }

    fn run_detached(&self, operation: &'static str, dest: &Path, args: Vec<OsString>) -> Result<(), VcsError> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        fs::create_dir_all(&parent)?;
        self.runner.run(operation, &parent, Self::args(args))?;
        Ok(())
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    /// Commit ids selected by `revset`, newest first
    fn commit_ids(&self, operation: &'static str, revset: &str) -> Result<Vec<String>, VcsError> {
        let out = self.jj(
            operation,
            ["log", "--no-graph", "-r", revset, "-T", "commit_id ++ \"\\n\""],
        )?;
        Ok(lines(&out).map(String::from).collect())
    }

    fn current_operation(&self) -> Result<String, VcsError> {
        let out = self.jj(
            "op-log",
            ["op", "log", "--no-graph", "--limit", "1", "-T", "id ++ \"\\n\""],
        )?;
        let id = lines(&out).next().map(String::from);
        id.ok_or_else(|| VcsError::InvalidOperation("jj operation log is empty".into()))
    }

    fn restore_operation(&self, operation_id: &str) -> Result<(), VcsError> {
        tracing::debug!(repo = ?self.work_dir, operation_id, "restoring jj operation");
        self.jj("restore", ["op", "restore", operation_id])?;
        Ok(())
    }

    fn is_conflicted(&self, revset: &str) -> Result<bool, VcsError> {
        let query = format!("({revset}) & conflicts()");
        Ok(!self.commit_ids("conflicts", &query)?.is_empty())
    }

    fn conflicted_files(&self, revision: &str) -> Result<Vec<String>, VcsError> {
        let out = self.probe("conflicts", ["resolve", "--list", "-r", revision])?;
        if !out.success {
            // "No conflicts found at this revision"
            return Ok(Vec::new());
        }
        Ok(parse_resolve_list(&out.stdout))
    }

    fn bookmarks_at(&self, revset: &str) -> Result<Vec<String>, VcsError> {
        let out = self.jj("list-branches", ["bookmark", "list", "-r", revset])?;
        Ok(parse_bookmark_list(&out))
    }

    fn all_bookmarks(&self) -> Result<Vec<String>, VcsError> {
        let out = self.jj("list-branches", ["bookmark", "list"])?;
        Ok(parse_bookmark_list(&out))
    }

    fn set_bookmark(&self, name: &str, revset: &str) -> Result<(), VcsError> {
        self.jj(
            "set-bookmark",
            ["bookmark", "set", name, "-r", revset, "--allow-backwards"],
        )?;
        Ok(())
    }

    /// Move the bookmark tracking the working copy to `@-`, if there is one
    fn advance_bookmark(&self, bookmark: Option<String>) -> Result<(), VcsError> {
        if let Some(bookmark) = bookmark {
            self.jj("commit", ["bookmark", "set", bookmark.as_str(), "-r", "@-"])?;
        }
        Ok(())
    }

    fn ensure_clean(&self) -> Result<(), VcsError> {
        if self.has_uncommitted_changes()? {
            return Err(VcsError::DirtyWorkingCopy);
        }
        Ok(())
    }

    fn count(&self, operation: &'static str, revset: &str) -> Result<usize, VcsError> {
        Ok(self.commit_ids(operation, revset)?.len())
    }

    fn merge_into_current(&self, branch: &str, message: &str, allow_fast_forward: bool) -> Result<(), VcsError> {
        self.ensure_clean()?;
        let target = revset(branch);
        let bookmark = self.current_branch()?;

        if self.is_ancestor(branch, "HEAD")? {
            tracing::debug!(repo = ?self.work_dir, branch, "already up to date");
            return Ok(());
        }

        if allow_fast_forward && self.is_ancestor("HEAD", branch)? {
            self.jj("merge", ["new", target.as_str()])?;
            return self.advance_bookmark(bookmark);
        }

        let operation = self.current_operation()?;
        self.jj("merge", ["new", "@-", target.as_str(), "-m", message])?;
        if self.is_conflicted("@")? {
            let conflicts = self.conflicted_files("@")?;
            self.restore_operation(&operation)?;
            return Err(VcsError::MergeConflict(conflicts));
        }
        self.jj("merge", ["new"])?;
        self.advance_bookmark(bookmark)
    }

    fn store_dir(&self) -> Result<PathBuf, VcsError> {
        let jj_dir = self.work_dir.join(".jj");
        let repo = jj_dir.join("repo");
        if repo.is_dir() {
            Ok(repo)
        } else if repo.is_file() {
            let pointer = PathBuf::from(fs::read_to_string(&repo)?.trim());
            Ok(if pointer.is_absolute() {
                pointer
            } else {
                jj_dir.join(pointer)
            })
        } else {
            Err(VcsError::not_a_repo(&self.work_dir))
        }
    }

    fn load_index(&self) -> Result<WorkspaceIndex, VcsError> {
        let path = self.store_dir()?.join(WORKSPACE_INDEX_FILE);
        if !path.exists() {
            return Ok(WorkspaceIndex::default());
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            VcsError::InvalidOperation(format!("corrupt workspace index {}: {e}", path.display()))
        })
    }

    fn save_index(&self, index: &WorkspaceIndex) -> Result<(), VcsError> {
        let path = self.store_dir()?.join(WORKSPACE_INDEX_FILE);
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| VcsError::InvalidOperation(format!("serialize workspace index: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Index key for the workspace this handle runs in, if it is known
    fn own_entry_name(&self, index: &WorkspaceIndex) -> Result<Option<String>, VcsError> {
        let named = index
            .workspaces
            .iter()
            .find(|(name, entry)| {
                *name != DEFAULT_WORKSPACE && same_path(&entry.path, &self.work_dir)
            })
            .map(|(name, _)| name.clone());
        if named.is_some() {
            return Ok(named);
        }
        if same_path(&self.default_workspace_root()?, &self.work_dir) {
            return Ok(Some(DEFAULT_WORKSPACE.to_string()));
        }
        Ok(None)
    }

    /// Bookmark this workspace was last put on by `clone_from`, `workspace_add*`
    /// or `checkout`
    fn recorded_bookmark(&self) -> Result<Option<String>, VcsError> {
        let index = self.load_index()?;
        Ok(self
            .own_entry_name(&index)?
            .and_then(|name| index.workspaces.get(&name))
            .and_then(|entry| entry.branch.clone()))
    }

    fn record_bookmark(&self, branch: Option<&str>) -> Result<(), VcsError> {
        let mut index = self.load_index()?;
        let Some(name) = self.own_entry_name(&index)? else {
            return Ok(());
        };
        let entry = index.workspaces.entry(name).or_insert_with(|| IndexEntry {
            path: self.work_dir.clone(),
            branch: None,
        });
        entry.branch = branch.map(String::from);
        self.save_index(&index)
    }

    /// Root of the workspace that owns the repo store
    fn default_workspace_root(&self) -> Result<PathBuf, VcsError> {
        let store = self.store_dir()?;
        store
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .ok_or_else(|| VcsError::not_a_repo(&self.work_dir))
    }

    fn add_workspace(
        &self,
        path: &Path,
        revision: &str,
        branch: Option<&str>,
    ) -> Result<(), VcsError> {
        let path = self.absolute(path);
        let mut index = self.load_index()?;
        let name = unique_workspace_name(&path, &index);

        self.jj(
            "workspace-add",
            [
                OsStr::new("workspace"),
                OsStr::new("add"),
                OsStr::new("--name"),
                OsStr::new(&name),
                OsStr::new("-r"),
                OsStr::new(revision),
                path.as_os_str(),
            ],
        )?;

        index.workspaces.insert(
            name,
            IndexEntry {
                path,
                branch: branch.map(String::from),
            },
        );
        self.save_index(&index)
    }

    fn add_existing(&self, path: &Path, branch: &str, force: bool) -> Result<(), VcsError> {
        if !self.branch_exists(branch)? {
            return Err(VcsError::BranchNotFound(branch.to_string()));
        }
        if !force {
            if let Some(holder) = self
                .workspace_list()?
                .into_iter()
                .find(|ws| ws.branch.as_deref() == Some(branch))
            {
                return Err(VcsError::InvalidOperation(format!(
                    "bookmark {branch} is already checked out in {}",
                    holder.path.display()
                )));
            }
        }
        self.add_workspace(path, &revset(branch), Some(branch))
    }

    fn workspace_info(
        &self,
        name: &str,
        path: PathBuf,
        recorded: Option<&str>,
    ) -> Result<Workspace, VcsError> {
        let working_copy = format!("{name}@");
        let parent = format!("{name}@-");
        let branch = pick_bookmark(
            recorded,
            self.bookmarks_at(&working_copy)?,
            self.bookmarks_at(&parent)?,
        );
        let commit = self
            .commit_ids("workspace-list", &parent)?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(Workspace {
            path,
            branch,
            commit,
        })
    }
}

/// Translate a git-style reference into a jj revset.
pub(crate) fn revset(reference: &str) -> String {
    if reference == "HEAD" {
        return "@-".to_string();
    }
    if reference.starts_with('@') {
        return reference.to_string();
    }
    if let Some(branch) = reference.strip_prefix("origin/") {
        return format!("{}@origin", quote_symbol(branch));
    }
    if let Some((name, remote)) = reference.split_once('@') {
        if !name.is_empty() && is_plain_symbol(remote) {
            return format!("{}@{}", quote_symbol(name), remote);
        }
    }
    quote_symbol(reference)
}

fn is_plain_symbol(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_symbol(name: &str) -> String {
    if is_plain_symbol(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Workspace names are restricted to symbol characters so that `name@`
/// needs no quoting in revsets.
/// Several bookmarks can share a commit (a fresh worker bookmark sits on
/// main's tip), so the workspace's recorded bookmark wins when it is still
/// at `@` or `@-`.
fn pick_bookmark(recorded: Option<&str>, at: Vec<String>, below: Vec<String>) -> Option<String> {
    if let Some(own) = recorded {
        if at.iter().chain(&below).any(|b| b == own) {
            return Some(own.to_string());
        }
    }
    at.into_iter().next().or_else(|| below.into_iter().next())
}

fn workspace_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "workspace".to_string());
    let name: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name == DEFAULT_WORKSPACE {
        format!("ws_{name}")
    } else {
        name
    }
}

fn unique_workspace_name(path: &Path, index: &WorkspaceIndex) -> String {
    let base = workspace_name(path);
    if !index.workspaces.contains_key(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !index.workspaces.contains_key(candidate))
        .unwrap_or(base)
}

/// Local bookmark names from `jj bookmark list`.
///
/// Remote tracking lines are indented; deleted bookmarks are skipped.
pub(crate) fn parse_bookmark_list(output: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in output.lines() {
        if line.is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some((head, _)) = line.split_once(':') else {
            continue;
        };
        if head.ends_with("(deleted)") {
            continue;
        }
        let name = head.trim_end_matches("(conflicted)").trim().trim_matches('"');
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Paths from `jj resolve --list` (`<path>    2-sided conflict`).
pub(crate) fn parse_resolve_list(output: &str) -> Vec<String> {
    lines(output)
        .filter_map(|line| line.split("  ").next())
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect()
}

/// Parse `jj diff --summary` into a [`Status`].
pub(crate) fn parse_diff_summary(output: &str) -> Status {
    let mut modified = Vec::new();
    let mut added = Vec::new();
    let mut deleted = Vec::new();

    for line in lines(output) {
        let Some((kind, path)) = line.split_once(' ') else {
            continue;
        };
        let path = path.trim();
        match kind {
            "A" | "C" => added.push(renamed_target(path)),
            "D" => deleted.push(path.to_string()),
            "R" => modified.push(renamed_target(path)),
            _ => modified.push(path.to_string()),
        }
    }

    Status::from_paths(modified, added, deleted, Vec::new())
}

/// Destination of a rename/copy summary such as `src/{a.rs => b.rs}`
fn renamed_target(path: &str) -> String {
    match (path.find('{'), path.find(" => "), path.rfind('}')) {
        (Some(open), Some(arrow), Some(close)) if open < arrow && arrow < close => {
            let prefix = &path[..open];
            let to = &path[arrow + 4..close];
            let suffix = &path[close + 1..];
            format!("{prefix}{to}{suffix}").replace("//", "/")
        }
        _ => path.to_string(),
    }
}

/// Workspace names from `jj workspace list` (`name: <change> <commit> ...`).
pub(crate) fn parse_workspace_names(output: &str) -> Vec<String> {
    lines(output)
        .filter_map(|line| line.split_once(':').map(|(name, _)| name.trim().to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}

// ============================================================================
// VcsRepository Implementation
// ============================================================================

impl VcsRepository for JjVcs {
    fn vcs_type(&self) -> VcsBackendType {
        VcsBackendType::Jujutsu
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            staging_area: false,
            stash: false,
            first_class_conflicts: true,
        }
    }
}

impl VcsSetup for JjVcs {
    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        self.run_detached(
            "clone",
            dest,
            vec![
                "git".into(),
                "clone".into(),
                "--colocate".into(),
                url.into(),
                dest.as_os_str().to_owned(),
            ],
        )?;

        // The fresh working copy sits on the remote's default bookmark
        let clone = JjVcs {
            work_dir: dest.to_path_buf(),
            runner: self.runner.clone(),
        };
        let below = clone.bookmarks_at("@-")?;
        let base = clone.default_branch();
        let start = if below.contains(&base) {
            Some(base)
        } else {
            below.into_iter().next()
        };
        clone.record_bookmark(start.as_deref())
    }

    /// jj has no bare repositories; a colocated clone serves as the anchor
    fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        self.clone_from(url, dest)
    }
}

// ============================================================================
// VcsRefs Implementation
// ============================================================================

impl VcsRefs for JjVcs {
    fn current_branch(&self) -> Result<Option<String>, VcsError> {
        let at = self.bookmarks_at("@")?;
        let below = self.bookmarks_at("@-")?;
        let recorded = self.recorded_bookmark()?;
        Ok(pick_bookmark(recorded.as_deref(), at, below))
    }

    fn default_branch(&self) -> String {
        let bookmarks = self.all_bookmarks().unwrap_or_default();
        ["main", "master", "trunk"]
            .into_iter()
            .find(|candidate| bookmarks.iter().any(|b| b == candidate))
            .unwrap_or("main")
            .to_string()
    }

    fn checkout(&self, reference: &str) -> Result<(), VcsError> {
        self.jj("checkout", ["new", revset(reference).as_str()])?;
        let bookmark = self.branch_exists(reference)?.then_some(reference);
        self.record_bookmark(bookmark)
    }

    fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.create_branch_from(name, "HEAD")
    }

    fn create_branch_from(&self, name: &str, reference: &str) -> Result<(), VcsError> {
        if self.branch_exists(name)? {
            return Err(VcsError::BranchExists(name.to_string()));
        }
        self.jj(
            "create-branch",
            ["bookmark", "create", name, "-r", revset(reference).as_str()],
        )?;
        Ok(())
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<(), VcsError> {
        if !self.branch_exists(name)? {
            return Err(VcsError::BranchNotFound(name.to_string()));
        }
        if !force {
            let base = self.default_branch();
            if base != name && !self.is_ancestor(name, &base)? {
                return Err(VcsError::InvalidOperation(format!(
                    "bookmark {name} is not merged into {base}"
                )));
            }
        }
        self.jj("delete-branch", ["bookmark", "delete", name])?;
        Ok(())
    }

    fn list_branches(&self, pattern: &str) -> Result<Vec<String>, VcsError> {
        let matcher = branch_matcher(pattern)?;
        Ok(self
            .all_bookmarks()?
            .into_iter()
            .filter(|name| matcher.is_match(name))
            .collect())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        Ok(self.all_bookmarks()?.iter().any(|b| b == name))
    }

    /// Answers from the last fetch; call `fetch` first for a live view
    fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool, VcsError> {
        let query = format!(
            "remote_bookmarks(exact:{}, exact:{})",
            quote_string(branch),
            quote_string(remote)
        );
        Ok(!self.commit_ids("remote-branch-exists", &query)?.is_empty())
    }

    fn reset_branch(&self, name: &str, reference: &str) -> Result<(), VcsError> {
        self.set_bookmark(name, &revset(reference))
    }
}

fn quote_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

// ============================================================================
// VcsRemotes Implementation
// ============================================================================

impl VcsRemotes for JjVcs {
    fn fetch(&self, remote: &str) -> Result<(), VcsError> {
        self.jj("fetch", ["git", "fetch", "--remote", remote])?;
        Ok(())
    }

    fn fetch_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.jj("fetch", ["git", "fetch", "--remote", remote, "-b", branch])?;
        Ok(())
    }

    /// Fetch, then rebase the working change onto the (fast-forwarded)
    /// bookmark. Tracked bookmarks move on fetch.
    fn pull(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.fetch_branch(remote, branch)?;
        let onto = if self.branch_exists(branch)? {
            branch.to_string()
        } else {
            format!("{branch}@{remote}")
        };
        self.rebase(&onto)
    }

    /// jj push is always lease-checked: it rewrites the remote bookmark only
    /// if the remote still matches the last fetch, and it moves bookmarks
    /// backwards or sideways without a flag. `force` therefore changes
    /// nothing; a stale remote is an error either way and needs a `fetch`.
    fn push(&self, remote: &str, branch: &str, force: bool) -> Result<(), VcsError> {
        if force {
            tracing::debug!(repo = ?self.work_dir, branch, "jj push is lease-checked, force has no effect");
        }
        let result = self.jj(
            "push",
            ["git", "push", "--remote", remote, "--bookmark", branch, "--allow-new"],
        );
        match result {
            Err(VcsError::Command { output, .. }) if output.contains("--allow-new") => {
                // Newer jj dropped the flag in favour of configuration
                self.jj(
                    "push",
                    [
                        "git",
                        "push",
                        "--config",
                        "git.push-new-bookmarks=true",
                        "--remote",
                        remote,
                        "--bookmark",
                        branch,
                    ],
                )?;
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        let local = if self.branch_exists(branch)? {
            self.commit_ids("delete-remote-branch", &revset(branch))?
                .into_iter()
                .next()
        } else {
            None
        };
        self.jj("delete-remote-branch", ["bookmark", "delete", branch])?;
        self.jj(
            "delete-remote-branch",
            ["git", "push", "--remote", remote, "--bookmark", branch],
        )?;
        // Deleting in jj is global; put the local bookmark back untracked
        if let Some(commit) = local {
            self.jj(
                "delete-remote-branch",
                ["bookmark", "create", branch, "-r", commit.as_str()],
            )?;
        }
        Ok(())
    }

    fn remote_url(&self, remote: &str) -> Result<String, VcsError> {
        let out = self.jj("remote-url", ["git", "remote", "list"])?;
        let url = lines(&out)
            .filter_map(|line| line.split_once(char::is_whitespace))
            .find(|(name, _)| *name == remote)
            .map(|(_, url)| url.trim().to_string());
        url.ok_or_else(|| VcsError::InvalidOperation(format!("no remote named {remote}")))
    }

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<(), VcsError> {
        match self.remote_url(remote) {
            Ok(_) => self.jj("remote-url", ["git", "remote", "set-url", remote, url])?,
            Err(VcsError::InvalidOperation(_)) => {
                self.jj("remote-url", ["git", "remote", "add", remote, url])?
            }
            Err(e) => return Err(e),
        };
        Ok(())
    }
}

// ============================================================================
// VcsStaging Implementation
// ============================================================================

impl VcsStaging for JjVcs {
    fn add(&self, _paths: &[&str]) -> Result<(), VcsError> {
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), VcsError> {
        let bookmark = self.current_branch()?;
        self.jj("commit", ["commit", "-m", message])?;
        self.advance_bookmark(bookmark)
    }

    /// Same as `commit`: every file in the working copy is already tracked
    fn commit_all(&self, message: &str) -> Result<(), VcsError> {
        self.commit(message)
    }
}

// ============================================================================
// VcsStatus Implementation
// ============================================================================

impl VcsStatus for JjVcs {
    fn status(&self) -> Result<Status, VcsError> {
        let out = self.jj("status", ["diff", "--summary", "-r", "@"])?;
        Ok(parse_diff_summary(&out))
    }

    fn has_uncommitted_changes(&self) -> Result<bool, VcsError> {
        Ok(!self.status()?.clean)
    }

    fn check_uncommitted_work(&self) -> Result<UncommittedWork, VcsError> {
        let status = self.status()?;
        Ok(UncommittedWork {
            has_changes: !status.clean,
            stash_count: 0,
            unpushed_commits: self.unpushed_commits()?,
            modified_files: status.changed_paths(),
            untracked_files: Vec::new(),
        })
    }
}

// ============================================================================
// VcsMerge Implementation
// ============================================================================

impl VcsMerge for JjVcs {
    fn merge(&self, branch: &str) -> Result<(), VcsError> {
        let message = format!("Merge {branch}");
        self.merge_into_current(branch, &message, true)
    }

    fn merge_no_ff(&self, branch: &str, message: &str) -> Result<(), VcsError> {
        self.merge_into_current(branch, message, false)
    }

    fn rebase(&self, onto: &str) -> Result<(), VcsError> {
        let onto = revset(onto);
        let operation = self.current_operation()?;
        self.jj("rebase", ["rebase", "-b", "@", "-d", onto.as_str()])?;

        let rebased = format!("({onto})..@");
        let conflicted = self.commit_ids("rebase", &format!("({rebased}) & conflicts()"))?;
        if let Some(first) = conflicted.last() {
            let conflicts = self.conflicted_files(first)?;
            self.restore_operation(&operation)?;
            return Err(VcsError::RebaseConflict(conflicts));
        }
        Ok(())
    }

    fn abort_merge(&self) -> Result<(), VcsError> {
        if self.is_conflicted("@")? {
            self.jj("abort-merge", ["undo"])?;
        }
        Ok(())
    }

    fn abort_rebase(&self) -> Result<(), VcsError> {
        if self.is_conflicted("@")? {
            self.jj("abort-rebase", ["undo"])?;
        }
        Ok(())
    }
}

// ============================================================================
// VcsTrialMerge Implementation
// ============================================================================

impl VcsTrialMerge for JjVcs {
    fn checkpoint(&self) -> Result<Checkpoint, VcsError> {
        // Snapshot the working copy first so the recorded operation
        // includes any pending edits.
        self.jj("check-conflicts", ["status"])?;
        Ok(Checkpoint::JjOperation(self.current_operation()?))
    }

    fn trial_merge(&self, source: &str, target: &str) -> Result<Vec<String>, VcsError> {
        let target = revset(target);
        let source = revset(source);
        self.jj(
            "check-conflicts",
            [
                "new",
                target.as_str(),
                source.as_str(),
                "-m",
                "conflict check",
            ],
        )?;
        if self.is_conflicted("@")? {
            self.conflicted_files("@")
        } else {
            Ok(Vec::new())
        }
    }

    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), VcsError> {
        match checkpoint {
            Checkpoint::JjOperation(id) => self.restore_operation(id),
            other => Err(VcsError::InvalidOperation(format!(
                "jj cannot restore checkpoint {other:?}"
            ))),
        }
    }
}

// ============================================================================
// VcsWorkspaces Implementation
// ============================================================================

impl VcsWorkspaces for JjVcs {
    fn workspace_add(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        self.create_branch(branch)?;
        let target = revset(branch);
        if let Err(e) = self.add_workspace(path, &target, Some(branch)) {
            if let Err(cleanup) = self.jj("workspace-add", ["bookmark", "delete", branch]) {
                tracing::warn!("failed to delete bookmark {} after workspace error: {}", branch, cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    fn workspace_add_detached(&self, path: &Path, reference: &str) -> Result<(), VcsError> {
        self.add_workspace(path, &revset(reference), None)
    }

    fn workspace_add_existing(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        self.add_existing(path, branch, false)
    }

    fn workspace_add_existing_force(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        self.add_existing(path, branch, true)
    }

    fn workspace_remove(&self, path: &Path, force: bool) -> Result<(), VcsError> {
        let path = self.absolute(path);
        let mut index = self.load_index()?;
        let name = index
            .workspaces
            .iter()
            .find(|(_, entry)| same_path(&entry.path, &path))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| {
                VcsError::InvalidOperation(format!("no workspace registered at {}", path.display()))
            })?;

        if !force && path.exists() {
            let workspace = JjVcs {
                work_dir: path.clone(),
                runner: self.runner.clone(),
            };
            if workspace.has_uncommitted_changes()? {
                return Err(VcsError::DirtyWorkingCopy);
            }
        }

        self.jj("workspace-remove", ["workspace", "forget", name.as_str()])?;
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        index.workspaces.remove(&name);
        self.save_index(&index)
    }

    fn workspace_prune(&self) -> Result<(), VcsError> {
        let mut index = self.load_index()?;
        let missing: Vec<String> = index
            .workspaces
            .iter()
            .filter(|(_, entry)| !entry.path.exists())
            .map(|(name, _)| name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let registered = parse_workspace_names(&self.jj("workspace-prune", ["workspace", "list"])?);
        for name in &missing {
            if registered.contains(name) {
                self.jj("workspace-prune", ["workspace", "forget", name.as_str()])?;
            }
            index.workspaces.remove(name);
        }
        tracing::debug!(repo = ?self.work_dir, pruned = ?missing, "pruned jj workspaces");
        self.save_index(&index)
    }

    fn workspace_list(&self) -> Result<Vec<Workspace>, VcsError> {
        let index = self.load_index()?;
        let registered = parse_workspace_names(&self.jj("workspace-list", ["workspace", "list"])?);

        let mut workspaces = Vec::new();
        for name in registered {
            let entry = index.workspaces.get(&name);
            let path = if name == DEFAULT_WORKSPACE {
                self.default_workspace_root()?
            } else if let Some(entry) = entry {
                entry.path.clone()
            } else {
                tracing::debug!(workspace = %name, "jj workspace missing from path index");
                continue;
            };
            let recorded = entry.and_then(|e| e.branch.as_deref());
            workspaces.push(self.workspace_info(&name, path, recorded)?);
        }
        Ok(workspaces)
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// ============================================================================
// VcsHistory Implementation
// ============================================================================

impl VcsHistory for JjVcs {
    fn rev(&self, reference: &str) -> Result<String, VcsError> {
        let query = revset(reference);
        let out = self.probe(
            "rev",
            [
                "log",
                "--no-graph",
                "--limit",
                "1",
                "-r",
                query.as_str(),
                "-T",
                "commit_id ++ \"\\n\"",
            ],
        )?;
        if out.success {
            return lines(&out.stdout)
                .next()
                .map(String::from)
                .ok_or_else(|| VcsError::BranchNotFound(reference.to_string()));
        }
        let combined = out.combined();
        if combined.contains("doesn't exist") || combined.contains("not found") {
            Err(VcsError::BranchNotFound(reference.to_string()))
        } else {
            Err(classify_failure(
                "rev",
                format!("jj log -r {query}"),
                combined,
            ))
        }
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, VcsError> {
        let query = format!("({}) & ::({})", revset(ancestor), revset(descendant));
        Ok(!self.commit_ids("is-ancestor", &query)?.is_empty())
    }

    fn commits_ahead(&self, base: &str, branch: &str) -> Result<usize, VcsError> {
        let query = format!("({})..({})", revset(base), revset(branch));
        self.count("commits-ahead", &query)
    }

    fn branch_created_date(&self, branch: &str) -> Result<String, VcsError> {
        let base = revset(&self.default_branch());
        let tip = revset(branch);
        let template = "committer.timestamp().format(\"%Y-%m-%d\") ++ \"\\n\"";
        for query in [format!("roots(({base})..({tip}))"), tip.clone()] {
            let out = self.jj(
                "branch-created-date",
                ["log", "--no-graph", "--limit", "1", "-r", query.as_str(), "-T", template],
            )?;
            let date = lines(&out).next().map(str::to_string);
            if let Some(date) = date {
                return Ok(date);
            }
        }
        Err(VcsError::BranchNotFound(branch.to_string()))
    }

    fn branch_pushed_to_remote(&self, branch: &str, remote: &str) -> Result<PushState, VcsError> {
        let local = revset(branch);
        if self.remote_branch_exists(remote, branch)? {
            let query = format!("({}@{})..({local})", quote_symbol(branch), quote_symbol(remote));
            let unpushed = self.count("branch-pushed", &query)?;
            Ok(PushState {
                pushed: unpushed == 0,
                unpushed,
            })
        } else {
            let query = format!(
                "(remote_bookmarks(remote=exact:{})..({local})) ~ root()",
                quote_string(remote)
            );
            Ok(PushState {
                pushed: false,
                unpushed: self.count("branch-pushed", &query)?,
            })
        }
    }

    /// jj has no stash
    fn stash_count(&self) -> Result<usize, VcsError> {
        Ok(0)
    }

    fn unpushed_commits(&self) -> Result<usize, VcsError> {
        self.count(
            "unpushed",
            "((remote_bookmarks()..@-) ~ empty()) ~ root()",
        )
    }
}

impl Vcs for JjVcs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revset_translation() {
        assert_eq!(revset("HEAD"), "@-");
        assert_eq!(revset("@"), "@");
        assert_eq!(revset("main"), "main");
        assert_eq!(revset("origin/main"), "main@origin");
        assert_eq!(revset("origin/worker/a"), "\"worker/a\"@origin");
        assert_eq!(revset("worker/a"), "\"worker/a\"");
        assert_eq!(revset("feature@origin"), "feature@origin");
        assert_eq!(revset("fix-1"), "\"fix-1\"");
    }

    #[test]
    fn test_parse_bookmark_list() {
        let out = "main: qpvuntsm 230dd059 initial\n  @origin: qpvuntsm 230dd059 initial\n\
                   worker/a: kkmpptxz 4a1b2c3d work on a\n\
                   stale (deleted)\n  @origin: zzzzzzzz 00000000 gone\n\
                   split (conflicted):\n  + abc\n  + def\n";
        assert_eq!(parse_bookmark_list(out), vec!["main", "worker/a", "split"]);
    }

    #[test]
    fn test_parse_diff_summary() {
        let out = "M src/lib.rs\nA new.txt\nD gone.txt\nR src/{old.rs => new.rs}\n";
        let status = parse_diff_summary(out);
        assert_eq!(status.modified, vec!["src/lib.rs", "src/new.rs"]);
        assert_eq!(status.added, vec!["new.txt"]);
        assert_eq!(status.deleted, vec!["gone.txt"]);
        assert!(status.untracked.is_empty());
        assert!(!status.clean);
        assert!(parse_diff_summary("").clean);
    }

    #[test]
    fn test_parse_resolve_list() {
        let out = "shared.txt    2-sided conflict\nsrc/main.rs    2-sided conflict including 1 deletion\n";
        assert_eq!(parse_resolve_list(out), vec!["shared.txt", "src/main.rs"]);
    }

    #[test]
    fn test_parse_workspace_names() {
        let out = "default: qpvuntsm 230dd059 (empty) (no description set)\nworker_a: kkmpptxz 4a1b2c3d (empty) (no description set)\n";
        assert_eq!(parse_workspace_names(out), vec!["default", "worker_a"]);
    }

    #[test]
    fn test_workspace_names_are_symbols() {
        assert_eq!(workspace_name(Path::new("/rig/workers/polecat-1")), "polecat_1");
        assert_eq!(workspace_name(Path::new("/rig/default")), "ws_default");

        let mut index = WorkspaceIndex::default();
        index.workspaces.insert(
            "a".into(),
            IndexEntry {
                path: PathBuf::from("/one/a"),
                branch: None,
            },
        );
        assert_eq!(unique_workspace_name(Path::new("/two/a"), &index), "a_2");
    }

    #[test]
    fn test_recorded_bookmark_wins_over_name_order() {
        let shared = || vec!["main".to_string(), "worker/a".to_string()];
        assert_eq!(
            pick_bookmark(Some("worker/a"), vec![], shared()).as_deref(),
            Some("worker/a")
        );
        assert_eq!(pick_bookmark(None, vec![], shared()).as_deref(), Some("main"));
        // A bookmark that moved away no longer counts
        assert_eq!(
            pick_bookmark(Some("gone"), vec!["tip".into()], shared()).as_deref(),
            Some("tip")
        );
        assert_eq!(pick_bookmark(Some("gone"), vec![], vec![]), None);
    }

    #[test]
    fn test_with_repo_dir_resolves_root() {
        let vcs = JjVcs::with_repo_dir("/rig/anchor/.jj", None);
        assert_eq!(vcs.work_dir(), Path::new("/rig/anchor"));
        let vcs = JjVcs::with_repo_dir("/rig/anchor/.jj", Some(PathBuf::from("/rig/w")));
        assert_eq!(vcs.work_dir(), Path::new("/rig/w"));
    }
}

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during VCS operations
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Not a repository: {0}")]
    NotARepository(String),

    #[error("Merge conflict in files: {0:?}")]
    MergeConflict(Vec<String>),

    #[error("Rebase conflict in files: {0:?}")]
    RebaseConflict(Vec<String>),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Branch already exists: {0}")]
    BranchExists(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Uncommitted changes in working copy")]
    DirtyWorkingCopy,

    #[error("{0} executable not found or not runnable")]
    ExecutableNotFound(&'static str),

    /// The command was killed after exceeding its deadline. Whatever it was
    /// doing may have been partially applied.
    #[error("{operation} timed out after {timeout:?}: {command}")]
    Timeout {
        operation: &'static str,
        command: String,
        timeout: Duration,
    },

    /// Backend failure that does not map onto a recognised category.
    #[error("{operation} failed: `{command}`: {output}")]
    Command {
        operation: &'static str,
        command: String,
        output: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl VcsError {
    /// Create a NotARepository error from a path
    pub fn not_a_repo(path: &Path) -> Self {
        Self::NotARepository(path.display().to_string())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::MergeConflict(_) | Self::RebaseConflict(_))
    }

    /// Paths reported by a merge or rebase conflict, empty otherwise.
    pub fn conflicted_paths(&self) -> &[String] {
        match self {
            Self::MergeConflict(paths) | Self::RebaseConflict(paths) => paths,
            _ => &[],
        }
    }

    /// True when the directory must be probed with `status` before reuse.
    ///
    /// A timed-out mutating call leaves the working copy in an unknown state;
    /// it is neither a success nor a clean failure.
    pub fn requires_probe(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Map backend output onto the shared error categories.
///
/// Conflicts are detected by the operations themselves, since both backends
/// report them through state rather than a stable message.
pub(crate) fn classify_failure(
    operation: &'static str,
    command: String,
    output: String,
) -> VcsError {
    let lower = output.to_ascii_lowercase();

    if lower.contains("not a git repository")
        || lower.contains("there is no jj repo")
        || lower.contains("no jj repo in")
        || lower.contains("not a jj repo")
    {
        VcsError::NotARepository(output)
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("invalid username or password")
        || lower.contains("permission denied (publickey")
        || lower.contains("terminal prompts disabled")
    {
        VcsError::AuthenticationFailed(output)
    } else {
        VcsError::Command {
            operation,
            command,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_a_repo() {
        let err = classify_failure(
            "status",
            "git status".into(),
            "fatal: not a git repository (or any of the parent directories): .git".into(),
        );
        assert!(matches!(err, VcsError::NotARepository(_)));

        let err = classify_failure(
            "status",
            "jj status".into(),
            "Error: There is no jj repo in \".\"".into(),
        );
        assert!(matches!(err, VcsError::NotARepository(_)));
    }

    #[test]
    fn test_classify_auth() {
        let err = classify_failure(
            "fetch",
            "git fetch origin".into(),
            "fatal: could not read Username for 'https://github.com': terminal prompts disabled"
                .into(),
        );
        assert!(matches!(err, VcsError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_classify_opaque_keeps_context() {
        let err = classify_failure("push", "git push origin main".into(), "boom".into());
        match err {
            VcsError::Command {
                operation,
                command,
                output,
            } => {
                assert_eq!(operation, "push");
                assert_eq!(command, "git push origin main");
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_conflicted_paths() {
        let err = VcsError::MergeConflict(vec!["a.txt".into()]);
        assert!(err.is_conflict());
        assert_eq!(err.conflicted_paths(), ["a.txt".to_string()]);
        assert!(VcsError::DirtyWorkingCopy.conflicted_paths().is_empty());
    }
}

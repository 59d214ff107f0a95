pub(crate) mod cmd;
pub mod git;
pub mod jj;

use globset::{Glob, GlobMatcher};

use crate::error::VcsError;

/// Compile a branch pattern; an empty pattern matches everything.
pub(crate) fn branch_matcher(pattern: &str) -> Result<GlobMatcher, VcsError> {
    let pattern = if pattern.trim().is_empty() { "*" } else { pattern };
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| VcsError::InvalidOperation(format!("invalid branch pattern {pattern}: {e}")))
}

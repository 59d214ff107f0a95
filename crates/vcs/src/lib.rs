//! VCS Abstraction Layer
//!
//! This crate provides a trait-based abstraction over version control systems,
//! supporting both Git and Jujutsu (jj) through their command-line tools.
//!
//! # Design Goals
//!
//! - **Clean trait interface**: Operations are grouped by concern
//! - **Same behaviour on both backends**: differences in staging, bookmarks
//!   and conflict representation are normalised inside the adapters
//! - **Explicit escape hatch**: [`VcsRepository::capabilities`] for the few
//!   callers that must know which model they are on
//! - **Shared stores**: bare git stores and jj anchors with attached
//!   workspaces
//!
//! # Example
//!
//! ```no_run
//! use vcs::{check_conflicts, VcsFactory, VcsMerge};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut vcs = VcsFactory::open(Path::new("/path/to/repo"))?;
//! let conflicts = check_conflicts(&mut *vcs, "feature", "main")?;
//! if conflicts.is_empty() {
//!     vcs.merge("feature")?;
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod conflict;
mod error;
mod factory;
mod traits;
mod types;

pub use backend::git::GitVcs;
pub use backend::jj::JjVcs;
pub use conflict::{check_conflicts, TrialMergeGuard};
pub use error::VcsError;
pub use factory::{detect_vcs_type, VcsConfig, VcsFactory};
pub use traits::{
    Vcs, VcsHistory, VcsMerge, VcsRefs, VcsRemotes, VcsRepository, VcsSetup, VcsStaging,
    VcsStatus, VcsTrialMerge, VcsWorkspaces,
};
pub use types::{
    Capabilities, Checkpoint, PushState, Status, UncommittedWork, VcsBackendType, Workspace,
};

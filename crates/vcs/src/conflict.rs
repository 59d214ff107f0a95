//! Non-destructive "would `source` merge cleanly into `target`?"

use crate::error::VcsError;
use crate::traits::VcsTrialMerge;
use crate::types::Checkpoint;

/// Scoped trial merge.
///
/// Holds the repository exclusively from [`begin`](Self::begin) until it is
/// finished or dropped. Dropping without [`finish`](Self::finish), including
/// during a panic, restores the checkpoint and logs any failure.
pub struct TrialMergeGuard<'a, V: VcsTrialMerge + ?Sized> {
    vcs: &'a mut V,
    checkpoint: Option<Checkpoint>,
}

impl<'a, V: VcsTrialMerge + ?Sized> TrialMergeGuard<'a, V> {
    pub fn begin(vcs: &'a mut V) -> Result<Self, VcsError> {
        let checkpoint = vcs.checkpoint()?;
        tracing::trace!(repo = ?vcs.work_dir(), ?checkpoint, "trial merge checkpoint");
        Ok(Self {
            vcs,
            checkpoint: Some(checkpoint),
        })
    }

    /// Conflicted paths of merging `source` into `target`
    pub fn trial_merge(&mut self, source: &str, target: &str) -> Result<Vec<String>, VcsError> {
        self.vcs.trial_merge(source, target)
    }

    /// Restore the checkpoint, reporting failure to the caller
    pub fn finish(mut self) -> Result<(), VcsError> {
        match self.checkpoint.take() {
            Some(checkpoint) => self.vcs.restore(&checkpoint),
            None => Ok(()),
        }
    }
}

impl<V: VcsTrialMerge + ?Sized> Drop for TrialMergeGuard<'_, V> {
    fn drop(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            if let Err(e) = self.vcs.restore(&checkpoint) {
                tracing::error!(
                    repo = ?self.vcs.work_dir(),
                    ?checkpoint,
                    "failed to restore after trial merge: {}",
                    e
                );
            }
        }
    }
}

/// Conflicting paths if `source` were merged into `target`; empty when the
/// merge would be clean.
///
/// Refs, the working copy and the status the caller sees afterwards are
/// the same as before the call, whatever the outcome.
pub fn check_conflicts<V: VcsTrialMerge + ?Sized>(
    vcs: &mut V,
    source: &str,
    target: &str,
) -> Result<Vec<String>, VcsError> {
    let mut guard = TrialMergeGuard::begin(vcs)?;
    let result = guard.trial_merge(source, target);
    let restored = guard.finish();

    match (result, restored) {
        (Ok(conflicts), Ok(())) => Ok(conflicts),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            tracing::error!("restore after failed trial merge also failed: {}", restore_err);
            Err(e)
        }
    }
}

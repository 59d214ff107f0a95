use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vcs::{Vcs, VcsBackendType, VcsConfig, VcsError, VcsFactory, detect_vcs_type};

use super::{
    AbortReport, Artifact, JsonMigrationStore, MigrationError, MigrationOptions, MigrationPhase,
    MigrationRecord, MigrationReport, MigrationStatus, MigrationStore, PreMigrationManifest,
    PreservedRef, RUNTIME_DIR, WorkerFailure, WorkerIssue, WorkerProblem, WorkspaceProgress,
    WorkspaceState, read_migration_status,
};
use crate::services::{
    backup::{BackupFacility, DirectoryBackup, copy_tree},
    dispatch_gate::DispatchGate,
    rig_config::{JsonRigConfigStore, RigConfig, RigConfigStore, RigLayout, WorkerEntry},
};

const ANCHOR_REMOTE: &str = "migration-anchor";

/// Drives a rig through the migration phases, one phase at a time, persisting
/// the record in between.
pub struct MigrationController {
    root: PathBuf,
    config: Arc<dyn RigConfigStore>,
    records: Arc<dyn MigrationStore>,
    backup: Arc<dyn BackupFacility>,
    gate: DispatchGate,
    options: MigrationOptions,
}

impl MigrationController {
    pub fn new(
        config: Arc<dyn RigConfigStore>,
        records: Arc<dyn MigrationStore>,
        backup: Arc<dyn BackupFacility>,
        gate: DispatchGate,
        options: MigrationOptions,
    ) -> Self {
        Self {
            root: config.root().to_path_buf(),
            config,
            records,
            backup,
            gate,
            options,
        }
    }

    /// JSON config and record under `root`, directory copies for backups
    pub fn for_rig(root: impl Into<PathBuf>, gate: DispatchGate, options: MigrationOptions) -> Self {
        let root = root.into();
        Self::new(
            Arc::new(JsonRigConfigStore::new(&root)),
            Arc::new(JsonMigrationStore::for_rig(&root)),
            Arc::new(DirectoryBackup),
            gate,
            options,
        )
    }

    pub fn gate(&self) -> &DispatchGate {
        &self.gate
    }

    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        read_migration_status(self.records.as_ref(), self.config.as_ref())
    }

    /// Start a migration, or continue the one recorded for this rig
    pub fn run(&self) -> Result<MigrationReport, MigrationError> {
        let mut record = match self.records.load()? {
            Some(record) => {
                if record.target != self.options.target {
                    return Err(MigrationError::TargetMismatch {
                        recorded: record.target,
                        requested: self.options.target,
                    });
                }
                info!(
                    "Resuming migration {} of rig '{}' at {}",
                    record.id, record.rig, record.phase
                );
                if record.frozen {
                    self.gate.freeze();
                }
                record
            }
            None => self.pre_check()?,
        };

        loop {
            let phase = record.phase;
            match phase {
                MigrationPhase::PreCheck => self.advance(&mut record, MigrationPhase::Freeze)?,
                MigrationPhase::Freeze => {
                    self.freeze(&mut record)?;
                    self.advance(&mut record, MigrationPhase::ConvertRepository)?;
                }
                MigrationPhase::ConvertRepository => {
                    if let Err(e) = self.convert_repository(&mut record) {
                        error!("Converting repository for rig '{}' failed: {}", record.rig, e);
                        let report = self.abort_record(record)?;
                        return Err(MigrationError::Aborted {
                            phase,
                            removed: report.removed,
                            cause: e.to_string(),
                        });
                    }
                    self.advance(&mut record, MigrationPhase::ConvertWorkspaces)?;
                }
                MigrationPhase::ConvertWorkspaces => {
                    self.convert_workspaces(&mut record)?;
                    self.advance(&mut record, MigrationPhase::UpdateConfig)?;
                }
                MigrationPhase::UpdateConfig => {
                    self.update_config(&mut record)?;
                    self.advance(&mut record, MigrationPhase::Resume)?;
                }
                MigrationPhase::Resume => return self.resume(record),
            }
        }
    }

    /// Undo everything the recorded migration created
    pub fn abort(&self) -> Result<AbortReport, MigrationError> {
        let record = self
            .records
            .load()?
            .ok_or(MigrationError::NotInProgress)?;
        if record.phase.past_commit_point() {
            return Err(MigrationError::PastCommitPoint(record.target));
        }
        self.abort_record(record)
    }

    fn advance(
        &self,
        record: &mut MigrationRecord,
        next: MigrationPhase,
    ) -> Result<(), MigrationError> {
        info!(
            "Migration {} of rig '{}': {} -> {}",
            record.id, record.rig, record.phase, next
        );
        record.last_outcome = Some(format!("{} completed", record.phase));
        record.phase = next;
        self.persist(record)
    }

    fn persist(&self, record: &mut MigrationRecord) -> Result<(), MigrationError> {
        record.updated_at = Utc::now();
        self.records.save(record)
    }

    // ========================================================================
    // PreCheck
    // ========================================================================

    fn pre_check(&self) -> Result<MigrationRecord, MigrationError> {
        let config = self.config.load()?;
        let store = config.store_path(&self.root);
        let source = match config.vcs {
            Some(vcs) => vcs,
            None => detect_vcs_type(&store)?,
        };
        let target = self.options.target;
        if config.layout == RigLayout::Workspaces && source == target {
            return Err(MigrationError::AlreadyMigrated(target));
        }
        info!(
            "Pre-checking rig '{}' for migration {} -> {}",
            config.name, source, target
        );

        let mut issues = Vec::new();
        let mut refs = Vec::new();
        for worker in &config.workers {
            match self.inspect_worker(worker, &config.worker_path(&self.root, worker)) {
                Ok(preserved) => refs.push(preserved),
                Err(problems) => issues.extend(problems),
            }
        }
        if !issues.is_empty() {
            warn!(
                "Rig '{}' is not ready for migration: {} issue(s)",
                config.name,
                issues.len()
            );
            return Err(MigrationError::PreconditionFailed(issues));
        }

        let anchor = self.anchor_path(&store);
        if anchor.exists() {
            return Err(MigrationError::AnchorExists(anchor));
        }

        let origin_url = self.open_store(&store, source)?.remote_url("origin").ok();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut record = MigrationRecord {
            id,
            rig: config.name.clone(),
            source,
            target,
            phase: MigrationPhase::Freeze,
            frozen: false,
            store,
            origin_url,
            anchor,
            backup_dir: self
                .root
                .join(RUNTIME_DIR)
                .join("backups")
                .join(id.to_string()),
            archive: None,
            artifacts: Vec::new(),
            preserved_refs: refs,
            workspaces: config
                .workers
                .iter()
                .map(|w| WorkspaceProgress::pending(&w.name, config.worker_path(&self.root, w)))
                .collect(),
            last_outcome: Some("pre-check passed".to_string()),
            started_at: now,
            updated_at: now,
        };

        let saved = self
            .take_backups(&mut record, &config)
            .and_then(|()| self.records.save(&record));
        if let Err(e) = saved {
            error!("Preparing migration of rig '{}' failed: {}", record.rig, e);
            self.discard_backups(&record);
            return Err(e);
        }
        Ok(record)
    }

    /// Everything wrong with one worker, or the ref it has checked out
    fn inspect_worker(
        &self,
        worker: &WorkerEntry,
        path: &Path,
    ) -> Result<PreservedRef, Vec<WorkerIssue>> {
        let issue = |problem| WorkerIssue {
            worker: worker.name.clone(),
            path: path.to_path_buf(),
            problem,
        };
        if !path.is_dir() {
            return Err(vec![issue(WorkerProblem::Missing)]);
        }

        let mut problems = Vec::new();
        if path.join(&self.options.busy_marker).exists() {
            problems.push(issue(WorkerProblem::Busy));
        }
        let vcs = match self.open_detected(path) {
            Ok(vcs) => vcs,
            Err(e) => {
                problems.push(issue(WorkerProblem::Unreadable(e.to_string())));
                return Err(problems);
            }
        };
        match vcs.check_uncommitted_work() {
            Ok(work) if work.is_clean() => {}
            Ok(work) => problems.push(issue(WorkerProblem::Dirty(work.summary()))),
            Err(e) => problems.push(issue(WorkerProblem::Unreadable(e.to_string()))),
        }
        if !problems.is_empty() {
            return Err(problems);
        }

        let unreadable = |e: VcsError| vec![issue(WorkerProblem::Unreadable(e.to_string()))];
        let commit = vcs.rev("HEAD").map_err(unreadable)?;
        let branch = vcs.current_branch().map_err(unreadable)?;
        debug!(
            "Worker '{}' on {} at {}",
            worker.name,
            branch.as_deref().unwrap_or("(detached)"),
            commit
        );
        Ok(PreservedRef {
            worker: worker.name.clone(),
            branch,
            commit,
        })
    }

    fn take_backups(
        &self,
        record: &mut MigrationRecord,
        config: &RigConfig,
    ) -> Result<(), MigrationError> {
        if self.options.archive {
            let archive = self.archive_path(&record.id);
            self.backup.backup(&self.root, &archive)?;
            record.archive = Some(archive.clone());
            record.track(Artifact::RigArchive { path: archive });
        }

        let store_backup = record.store_backup();
        self.backup.backup(&record.store, &store_backup)?;
        record.track(Artifact::StoreBackup {
            path: record.backup_dir.clone(),
        });

        let manifest = PreMigrationManifest {
            migration_id: record.id,
            rig: config.name.clone(),
            source: record.source,
            layout: config.layout,
            store: record.store.clone(),
            store_config: config.store.clone(),
            store_backup,
            workers: config.workers.clone(),
            refs: record.preserved_refs.clone(),
            created_at: Utc::now(),
        };
        manifest.save(&record.manifest_path())
    }

    fn discard_backups(&self, record: &MigrationRecord) {
        for artifact in record.artifacts.iter().rev() {
            if let Artifact::StoreBackup { path } | Artifact::RigArchive { path } = artifact {
                if let Err(e) = self.backup.discard(path) {
                    error!("Failed to discard {}: {}", artifact, e);
                }
            }
        }
    }

    // ========================================================================
    // Freeze
    // ========================================================================

    fn freeze(&self, record: &mut MigrationRecord) -> Result<(), MigrationError> {
        self.gate.freeze();
        record.frozen = true;
        record.track(Artifact::DispatchFrozen);
        self.persist(record)?;
        self.config.update(&mut |c| c.frozen = true)?;
        Ok(())
    }

    // ========================================================================
    // ConvertRepository
    // ========================================================================

    fn convert_repository(&self, record: &mut MigrationRecord) -> Result<(), MigrationError> {
        let anchor = record.anchor.clone();
        let owned = Artifact::Anchor {
            path: anchor.clone(),
        };
        if anchor.exists() {
            if !record.owns(&owned) {
                return Err(MigrationError::AnchorExists(anchor));
            }
            debug!("Removing partial anchor {}", anchor.display());
            fs::remove_dir_all(&anchor)?;
        }
        record.track(owned);
        self.persist(record)?;

        let backup = record.store_backup();
        info!(
            "Cloning {} anchor {} from {}",
            record.target,
            anchor.display(),
            backup.display()
        );
        let vcs = self.open(&anchor, record.target)?;
        vcs.clone_from(&backup.to_string_lossy(), &anchor)?;

        let origin = record
            .origin_url
            .clone()
            .unwrap_or_else(|| record.store.to_string_lossy().into_owned());
        vcs.set_remote_url("origin", &origin)?;

        self.verify_anchor(vcs.as_ref(), record)
    }

    fn verify_anchor(&self, vcs: &dyn Vcs, record: &MigrationRecord) -> Result<(), MigrationError> {
        let status = vcs.status()?;
        if !status.clean {
            return Err(MigrationError::Verification(format!(
                "fresh anchor {} is not clean",
                vcs.work_dir().display()
            )));
        }
        let head = vcs.rev("HEAD")?;

        let probe = format!("migration-probe-{}", record.id.simple());
        vcs.create_branch(&probe)?;
        let probe_commit = vcs.rev(&probe)?;
        vcs.delete_branch(&probe, true)?;
        if probe_commit != head || vcs.branch_exists(&probe)? {
            return Err(MigrationError::Verification(format!(
                "branch round trip in anchor {} misbehaved",
                vcs.work_dir().display()
            )));
        }
        debug!("Anchor {} verified at {}", vcs.work_dir().display(), head);
        Ok(())
    }

    // ========================================================================
    // ConvertWorkspaces
    // ========================================================================

    fn convert_workspaces(&self, record: &mut MigrationRecord) -> Result<(), MigrationError> {
        self.gate.freeze();
        let anchor = self.open(&record.anchor, record.target)?;
        let max_attempts = self.options.max_attempts.max(1);

        for idx in 0..record.workspaces.len() {
            if record.workspaces[idx].state == WorkspaceState::Converted {
                debug!("Workspace '{}' already converted", record.workspaces[idx].worker);
                continue;
            }
            if record.workspaces[idx].state == WorkspaceState::Failed {
                let moved = record.owns(&workspace_artifact(&record.workspaces[idx]));
                record.workspaces[idx].state = if moved {
                    WorkspaceState::MovedAside
                } else {
                    WorkspaceState::Pending
                };
            }
            record.workspaces[idx].attempts = 0;

            loop {
                let result = self.convert_workspace(anchor.as_ref(), record, idx);
                let progress = &mut record.workspaces[idx];
                progress.attempts += 1;
                match result {
                    Ok(()) => {
                        info!(
                            "Workspace '{}' converted at {}",
                            progress.worker,
                            progress.path.display()
                        );
                        progress.state = WorkspaceState::Converted;
                        progress.last_error = None;
                        self.persist(record)?;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "Converting workspace '{}' failed (attempt {}/{}): {}",
                            progress.worker, progress.attempts, max_attempts, e
                        );
                        progress.last_error = Some(e.to_string());
                        let exhausted = progress.attempts >= max_attempts;
                        if exhausted {
                            progress.state = WorkspaceState::Failed;
                        }
                        self.persist(record)?;
                        if exhausted {
                            break;
                        }
                    }
                }
            }
        }

        let failed: Vec<WorkerFailure> = record
            .workspaces
            .iter()
            .filter(|w| w.state == WorkspaceState::Failed)
            .map(|w| WorkerFailure {
                worker: w.worker.clone(),
                error: w.last_error.clone().unwrap_or_default(),
            })
            .collect();
        if !failed.is_empty() {
            record.last_outcome = Some(format!("{} workspace(s) failed", failed.len()));
            self.persist(record)?;
            return Err(MigrationError::PartialConversion {
                converted: record.converted(),
                failed,
            });
        }

        self.restore_preserved_refs(anchor.as_ref(), record)?;
        self.validate_workspaces(anchor.as_ref(), record)
    }

    fn convert_workspace(
        &self,
        anchor: &dyn Vcs,
        record: &mut MigrationRecord,
        idx: usize,
    ) -> Result<(), MigrationError> {
        let progress = record.workspaces[idx].clone();
        let path = progress.path.clone();
        let aside = progress.aside_path();
        let preserved = record
            .preserved_ref(&progress.worker)
            .cloned()
            .ok_or_else(|| {
                MigrationError::Verification(format!(
                    "no preserved ref for worker '{}'",
                    progress.worker
                ))
            })?;
        let artifact = workspace_artifact(&progress);
        let moved = record.owns(&artifact);

        // The commit has to be reachable from the anchor before the clone goes
        self.ensure_ref_in_anchor(anchor, &preserved, if moved { &aside } else { &path })?;

        if !moved {
            if fs::symlink_metadata(&aside).is_ok() {
                return Err(MigrationError::Verification(format!(
                    "aside path {} already exists",
                    aside.display()
                )));
            }
            debug!("Moving {} aside to {}", path.display(), aside.display());
            fs::rename(&path, &aside)?;
            record.track(artifact);
            record.workspaces[idx].state = WorkspaceState::MovedAside;
            self.persist(record)?;
        }

        // Leftovers of an earlier attempt
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        anchor.workspace_prune()?;
        match &preserved.branch {
            Some(branch) => anchor.workspace_add_existing_force(&path, branch)?,
            None => anchor.workspace_add_detached(&path, &preserved.commit)?,
        }

        let carried = copy_tree(&aside, &path, is_vcs_metadata)?;
        if carried > 0 {
            debug!("Carried {} file(s) over into {}", carried, path.display());
        }

        self.verify_workspace(&path, record.target, &preserved)
    }

    fn ensure_ref_in_anchor(
        &self,
        anchor: &dyn Vcs,
        preserved: &PreservedRef,
        worker_dir: &Path,
    ) -> Result<(), MigrationError> {
        if anchor.rev(&preserved.commit).is_err() {
            info!(
                "Commit {} of worker '{}' missing from anchor, pushing it",
                preserved.commit, preserved.worker
            );
            self.push_into_anchor(anchor.work_dir(), preserved, worker_dir)?;
        }

        if let Some(branch) = &preserved.branch {
            if !anchor.branch_exists(branch)? {
                anchor.create_branch_from(branch, &preserved.commit)?;
            } else if anchor.rev(branch)? != preserved.commit {
                anchor.reset_branch(branch, &preserved.commit)?;
            }
        }
        Ok(())
    }

    fn push_into_anchor(
        &self,
        anchor_dir: &Path,
        preserved: &PreservedRef,
        worker_dir: &Path,
    ) -> Result<(), MigrationError> {
        let worker = self.open_detected(worker_dir)?;
        worker.set_remote_url(ANCHOR_REMOTE, &anchor_dir.to_string_lossy())?;
        let branch = match &preserved.branch {
            Some(branch) => branch.clone(),
            None => {
                let carrier = format!("migration/{}", preserved.worker);
                if !worker.branch_exists(&carrier)? {
                    worker.create_branch_from(&carrier, &preserved.commit)?;
                }
                carrier
            }
        };
        worker.push(ANCHOR_REMOTE, &branch, false)?;
        Ok(())
    }

    fn verify_workspace(
        &self,
        path: &Path,
        target: VcsBackendType,
        preserved: &PreservedRef,
    ) -> Result<(), MigrationError> {
        let ws = self.open(path, target)?;
        let head = ws.rev("HEAD")?;
        if head != preserved.commit {
            return Err(MigrationError::Verification(format!(
                "{} is at {}, expected {}",
                path.display(),
                head,
                preserved.commit
            )));
        }
        if let Some(branch) = &preserved.branch {
            let current = ws.current_branch()?;
            if current.as_deref() != Some(branch.as_str()) {
                return Err(MigrationError::Verification(format!(
                    "{} is on {:?}, expected {}",
                    path.display(),
                    current,
                    branch
                )));
            }
        }
        Ok(())
    }

    fn restore_preserved_refs(
        &self,
        anchor: &dyn Vcs,
        record: &MigrationRecord,
    ) -> Result<(), MigrationError> {
        for preserved in &record.preserved_refs {
            let Some(branch) = &preserved.branch else {
                continue;
            };
            if !anchor.branch_exists(branch)? {
                info!("Recreating {} at {} in the anchor", branch, preserved.commit);
                anchor.create_branch_from(branch, &preserved.commit)?;
            }
        }
        Ok(())
    }

    fn validate_workspaces(
        &self,
        anchor: &dyn Vcs,
        record: &MigrationRecord,
    ) -> Result<(), MigrationError> {
        let listed = anchor.workspace_list()?;
        let missing: Vec<&str> = record
            .workspaces
            .iter()
            .filter(|w| !listed.iter().any(|ws| same_path(&ws.path, &w.path)))
            .map(|w| w.worker.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(MigrationError::Verification(format!(
                "workspaces not registered with the anchor: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    // ========================================================================
    // UpdateConfig / Resume
    // ========================================================================

    /// The settings being replaced are tracked before the write, so a run
    /// that stops between the write and the Resume transition can still be
    /// aborted back to a consistent rig.
    fn update_config(&self, record: &mut MigrationRecord) -> Result<(), MigrationError> {
        let switching = record
            .artifacts
            .iter()
            .any(|a| matches!(a, Artifact::RigConfig { .. }));
        if !switching {
            let current = self.config.load()?;
            record.track(Artifact::RigConfig {
                vcs: current.vcs,
                store: current.store,
                layout: current.layout,
            });
            self.persist(record)?;
        }

        let store = record
            .anchor
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| record.anchor.clone());
        let target = record.target;
        self.config.update(&mut |c| {
            c.vcs = Some(target);
            c.store = store.clone();
            c.layout = RigLayout::Workspaces;
        })?;
        info!(
            "Rig '{}' now uses {} workspaces on {}",
            record.rig,
            target,
            record.anchor.display()
        );
        Ok(())
    }

    fn resume(&self, record: MigrationRecord) -> Result<MigrationReport, MigrationError> {
        self.gate.thaw();
        self.config.update(&mut |c| c.frozen = false)?;

        for progress in &record.workspaces {
            let aside = progress.aside_path();
            if record.owns(&workspace_artifact(progress)) && aside.is_dir() {
                debug!("Removing aside copy {}", aside.display());
                fs::remove_dir_all(&aside)?;
            }
        }
        self.records.clear()?;

        info!("Migration {} of rig '{}' complete", record.id, record.rig);
        Ok(MigrationReport {
            converted: record.converted(),
            rig: record.rig,
            source: record.source,
            target: record.target,
            anchor: record.anchor,
            backup_dir: record.backup_dir,
            archive: record.archive,
        })
    }

    // ========================================================================
    // Abort
    // ========================================================================

    fn abort_record(&self, mut record: MigrationRecord) -> Result<AbortReport, MigrationError> {
        info!(
            "Aborting migration {} of rig '{}' during {}",
            record.id, record.rig, record.phase
        );
        let mut removed = Vec::new();
        while let Some(artifact) = record.artifacts.pop() {
            if let Err(e) = self.undo(&artifact) {
                error!("Failed to undo {}: {}", artifact, e);
                // Keep the rest recorded so a later abort can finish
                record.artifacts.push(artifact);
                record.last_outcome = Some(format!("abort failed: {e}"));
                self.persist(&mut record)?;
                return Err(e);
            }
            info!("Removed {}", artifact);
            removed.push(artifact);
        }
        self.records.clear()?;
        Ok(AbortReport {
            phase: record.phase,
            removed,
        })
    }

    fn undo(&self, artifact: &Artifact) -> Result<(), MigrationError> {
        match artifact {
            Artifact::Workspace { worker, path, aside } => {
                if !aside.is_dir() {
                    warn!("Aside copy of '{}' is gone, leaving {}", worker, path.display());
                    return Ok(());
                }
                if fs::symlink_metadata(path).is_ok() {
                    fs::remove_dir_all(path)?;
                }
                fs::rename(aside, path)?;
            }
            Artifact::Anchor { path } => {
                if path.exists() {
                    fs::remove_dir_all(path)?;
                }
            }
            Artifact::DispatchFrozen => {
                self.gate.thaw();
                self.config.update(&mut |c| c.frozen = false)?;
            }
            Artifact::StoreBackup { path } | Artifact::RigArchive { path } => {
                self.backup.discard(path)?;
            }
            Artifact::RigConfig { vcs, store, layout } => {
                let (vcs, layout) = (*vcs, *layout);
                self.config.update(&mut |c| {
                    c.vcs = vcs;
                    c.store = store.clone();
                    c.layout = layout;
                })?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Handles
    // ========================================================================

    fn open(&self, path: &Path, backend: VcsBackendType) -> Result<Box<dyn Vcs>, MigrationError> {
        let mut config = VcsConfig::new(backend, path);
        config.timeout = self.options.timeout;
        Ok(VcsFactory::create(&config)?)
    }

    fn open_detected(&self, path: &Path) -> Result<Box<dyn Vcs>, MigrationError> {
        self.open(path, detect_vcs_type(path)?)
    }

    /// Bare git stores need an explicit git dir
    fn open_store(
        &self,
        store: &Path,
        backend: VcsBackendType,
    ) -> Result<Box<dyn Vcs>, MigrationError> {
        let mut config = VcsConfig::new(backend, store);
        if backend == VcsBackendType::Git && !store.join(".git").exists() {
            config.git_dir = Some(store.to_path_buf());
        }
        config.timeout = self.options.timeout;
        Ok(VcsFactory::create(&config)?)
    }

    fn anchor_path(&self, store: &Path) -> PathBuf {
        match &self.options.anchor_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => store.parent().unwrap_or(&self.root).join("anchor"),
        }
    }

    fn archive_path(&self, id: &Uuid) -> PathBuf {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rig".to_string());
        self.root
            .with_file_name(format!("{}.archive-{}", name, id.simple()))
    }
}

fn workspace_artifact(progress: &WorkspaceProgress) -> Artifact {
    Artifact::Workspace {
        worker: progress.worker.clone(),
        path: progress.path.clone(),
        aside: progress.aside_path(),
    }
}

fn is_vcs_metadata(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(".git" | ".jj")
    )
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

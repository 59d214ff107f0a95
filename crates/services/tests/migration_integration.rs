//! End-to-end runs of the migration controller against scratch rigs.

mod rig_fixture;

use std::{fs, sync::Arc};

use rig_fixture::*;
use services::services::{
    backup::DirectoryBackup,
    dispatch_gate::DispatchGate,
    migration::{
        Artifact, MANIFEST_FILE, MigrationController, MigrationError, MigrationOptions,
        MigrationPhase, MigrationStore, WorkerProblem, WorkspaceState, aside_path,
        read_migration_status,
    },
    rig_config::{RigConfigStore, RigLayout},
    rollback::{RollbackError, discard_anchor, restore_store_backup},
};
use vcs::{VcsBackendType, VcsFactory, detect_vcs_type};

#[test]
fn test_migrates_clones_to_workspaces() {
    for target in available_targets() {
        println!("Migrating to {target}");
        let rig = RigFixture::new(&["a", "b"]);
        let heads: Vec<String> = ["a", "b"].iter().map(|w| rig.clone_head(w)).collect();
        write_file(rig.worker("a"), "target/cache.bin", "build output\n");
        let files: Vec<_> = ["a", "b"]
            .iter()
            .map(|w| snapshot_files(&rig.worker(w)))
            .collect();
        let statuses: Vec<_> = ["a", "b"]
            .iter()
            .map(|w| rig.open_worker(w).status().unwrap())
            .collect();

        let controller = rig.controller(MigrationOptions::new(target));
        let report = controller.run().unwrap();
        assert_eq!(report.converted, vec!["a", "b"]);
        assert_eq!(report.anchor, rig.root.join("anchor"));

        let config = rig.load_config();
        assert_eq!(config.vcs, Some(target));
        assert_eq!(config.layout, RigLayout::Workspaces);
        assert_eq!(config.store, std::path::PathBuf::from("anchor"));
        assert!(!config.frozen);
        assert!(!controller.gate().is_frozen());

        for (i, (name, head)) in ["a", "b"].iter().zip(&heads).enumerate() {
            let path = rig.worker(name);
            assert_eq!(detect_vcs_type(&path).unwrap(), target, "{target}: {name}");
            // No work lost: same files, same contents, same status
            assert_eq!(snapshot_files(&path), files[i], "{target}: {name}");
            assert_eq!(rig.open_worker(name).status().unwrap(), statuses[i]);
            let ws = rig.open_worker(name);
            assert_eq!(
                ws.current_branch().unwrap().as_deref(),
                Some(format!("worker/{name}").as_str())
            );
            assert_eq!(&ws.rev("HEAD").unwrap(), head);
            assert!(path.join(format!("{name}.txt")).exists());
            assert!(!aside_path(&path).exists());
        }
        // Ignored files travel with the worker
        assert_eq!(
            fs::read_to_string(rig.worker("a").join("target/cache.bin")).unwrap(),
            "build output\n"
        );

        let status = controller.status().unwrap();
        assert_eq!(status.phase, None);
        assert!(!status.frozen);
        assert!(rig.records().load().unwrap().is_none());
        assert!(report.backup_dir.join(MANIFEST_FILE).is_file());

        // Level (a) rollback refuses while workspaces hang off the anchor
        let err = discard_anchor(&report.anchor, Some(target)).unwrap_err();
        assert!(matches!(err, RollbackError::AnchorInUse { .. }), "{err:?}");
        assert!(report.anchor.exists());
    }
}

#[test]
fn test_pre_check_rejection_writes_nothing() {
    let rig = RigFixture::new(&["a", "b"]);
    write_file(rig.worker("a"), ".task-in-progress", "");
    write_file(rig.worker("b"), "b.txt", "half done\n");

    let controller = rig.controller(MigrationOptions::new(VcsBackendType::Git));
    let issues = match controller.run() {
        Err(MigrationError::PreconditionFailed(issues)) => issues,
        other => panic!("unexpected: {other:?}"),
    };
    assert!(issues
        .iter()
        .any(|i| i.worker == "a" && i.problem == WorkerProblem::Busy));
    assert!(issues
        .iter()
        .any(|i| i.worker == "b" && matches!(i.problem, WorkerProblem::Dirty(_))));

    assert!(!rig.root.join(".runtime").exists());
    assert!(!rig.root.join("anchor").exists());
    assert!(!rig.load_config().frozen);
    assert!(!controller.gate().is_frozen());
    assert!(rig.worker("a").join(".git").is_dir());
}

#[test]
fn test_failed_anchor_clone_aborts_cleanly() {
    let rig = RigFixture::new(&["a", "b"]);
    let heads: Vec<String> = ["a", "b"].iter().map(|w| rig.clone_head(w)).collect();
    // A regular file where the anchor's parent directory should be
    let blocker = rig.tmp.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let anchor = blocker.join("anchor");

    let controller =
        rig.controller(MigrationOptions::new(VcsBackendType::Git).with_anchor_path(&anchor));
    match controller.run() {
        Err(MigrationError::Aborted { phase, removed, .. }) => {
            assert_eq!(phase, MigrationPhase::ConvertRepository);
            assert_eq!(removed.len(), 3, "{removed:?}");
            assert_eq!(removed[0], Artifact::Anchor { path: anchor.clone() });
            assert_eq!(removed[1], Artifact::DispatchFrozen);
            assert!(matches!(removed[2], Artifact::StoreBackup { .. }));
        }
        other => panic!("unexpected: {other:?}"),
    }

    assert!(!anchor.exists());
    assert!(rig.records().load().unwrap().is_none());
    assert!(rig.backups_are_empty());
    assert!(!rig.load_config().frozen);
    assert!(!controller.gate().is_frozen());
    assert_eq!(rig.load_config().layout, RigLayout::Clones);
    for (name, head) in ["a", "b"].iter().zip(&heads) {
        assert!(rig.worker(name).join(".git").is_dir());
        assert_eq!(&rig.clone_head(name), head);
        assert!(rig.open_worker(name).status().unwrap().clean);
    }
}

#[test]
fn test_rerun_converts_only_remaining_workers() {
    let rig = RigFixture::new(&["a", "b", "c"]);
    let blocker = aside_path(&rig.worker("c"));
    fs::write(&blocker, "in the way").unwrap();

    let first = rig.controller(MigrationOptions::new(VcsBackendType::Git));
    match first.run() {
        Err(MigrationError::PartialConversion { converted, failed }) => {
            assert_eq!(converted, vec!["a", "b"]);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].worker, "c");
        }
        other => panic!("unexpected: {other:?}"),
    }

    let status = read_migration_status(&rig.records(), &rig.config()).unwrap();
    assert_eq!(status.phase, Some(MigrationPhase::ConvertWorkspaces));
    assert!(status.frozen);
    assert_eq!(status.converted, vec!["a", "b"]);
    assert_eq!(status.failed, vec!["c"]);
    assert!(first.gate().is_frozen());
    // c was never touched
    assert!(rig.worker("c").join(".git").is_dir());
    // a and b keep their aside copies until the migration resumes
    assert!(aside_path(&rig.worker("a")).is_dir());

    fs::remove_file(&blocker).unwrap();
    let second = rig.controller(MigrationOptions::new(VcsBackendType::Git));
    let report = second.run().unwrap();
    assert_eq!(report.converted, vec!["a", "b", "c"]);
    assert!(!second.gate().is_frozen());

    for name in ["a", "b", "c"] {
        let ws = rig.open_worker(name);
        assert_eq!(
            ws.current_branch().unwrap().as_deref(),
            Some(format!("worker/{name}").as_str())
        );
        assert!(!aside_path(&rig.worker(name)).exists());
    }
    assert!(rig.records().load().unwrap().is_none());
    assert_eq!(rig.load_config().layout, RigLayout::Workspaces);
}

#[test]
fn test_resume_retries_only_pending_worker() {
    let rig = RigFixture::new(&["a", "b", "c"]);
    let blocker = aside_path(&rig.worker("c"));
    fs::write(&blocker, "in the way").unwrap();
    assert!(matches!(
        rig.controller(MigrationOptions::new(VcsBackendType::Git)).run(),
        Err(MigrationError::PartialConversion { .. })
    ));
    fs::remove_file(&blocker).unwrap();

    // Stopped before c was ever attempted
    let mut record = rig.records().load().unwrap().unwrap();
    assert_eq!(record.converted(), vec!["a", "b"]);
    let c = record.workspaces.iter_mut().find(|w| w.worker == "c").unwrap();
    c.state = WorkspaceState::Pending;
    c.attempts = 0;
    c.last_error = None;
    rig.records().save(&record).unwrap();

    // Ignored, so it keeps a clean; lost if a were converted again
    write_file(rig.worker("a"), "target/marker", "kept\n");

    let recording = Arc::new(RecordingStore::new(rig.records()));
    let controller = MigrationController::new(
        Arc::new(rig.config()),
        recording.clone(),
        Arc::new(DirectoryBackup),
        DispatchGate::new(),
        MigrationOptions::new(VcsBackendType::Git),
    );
    let report = controller.run().unwrap();
    assert_eq!(report.converted, vec!["a", "b", "c"]);

    let saves = recording.saves.lock().unwrap();
    assert!(!saves.is_empty());
    for saved in saves.iter() {
        for progress in &saved.workspaces {
            if progress.worker != "c" {
                assert_eq!(progress.state, WorkspaceState::Converted);
                assert_eq!(progress.attempts, 1, "{} was retried", progress.worker);
            }
        }
    }
    let last = saves.last().unwrap();
    let c = last.workspaces.iter().find(|w| w.worker == "c").unwrap();
    assert_eq!(c.state, WorkspaceState::Converted);
    assert_eq!(c.attempts, 1);

    assert_eq!(
        fs::read_to_string(rig.worker("a").join("target/marker")).unwrap(),
        "kept\n"
    );
    assert_eq!(
        rig.open_worker("c").current_branch().unwrap().as_deref(),
        Some("worker/c")
    );
    assert!(rig.records().load().unwrap().is_none());
}

fn crash_during_config_switch(rig: &RigFixture) -> MigrationController {
    let controller = MigrationController::new(
        Arc::new(CrashAfterSwitch::new(rig.config())),
        Arc::new(rig.records()),
        Arc::new(DirectoryBackup),
        DispatchGate::new(),
        MigrationOptions::new(VcsBackendType::Git),
    );
    match controller.run() {
        Err(MigrationError::Config(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
    // The switch reached disk but the record never moved past it
    assert_eq!(rig.load_config().layout, RigLayout::Workspaces);
    let record = rig.records().load().unwrap().unwrap();
    assert_eq!(record.phase, MigrationPhase::UpdateConfig);
    controller
}

#[test]
fn test_abort_after_interrupted_config_switch() {
    let rig = RigFixture::new(&["a", "b"]);
    let heads: Vec<String> = ["a", "b"].iter().map(|w| rig.clone_head(w)).collect();
    let controller = crash_during_config_switch(&rig);

    let report = controller.abort().unwrap();
    assert_eq!(report.phase, MigrationPhase::UpdateConfig);
    assert!(
        matches!(report.removed[0], Artifact::RigConfig { .. }),
        "{:?}",
        report.removed
    );

    let config = rig.load_config();
    assert_eq!(config.layout, RigLayout::Clones);
    assert_eq!(config.store, std::path::PathBuf::from(".repo.git"));
    assert_eq!(config.vcs, Some(VcsBackendType::Git));
    assert!(!config.frozen);
    assert!(!rig.root.join("anchor").exists());
    for (name, head) in ["a", "b"].iter().zip(&heads) {
        assert!(rig.worker(name).join(".git").is_dir());
        assert_eq!(&rig.clone_head(name), head);
    }
}

#[test]
fn test_rerun_after_interrupted_config_switch() {
    let rig = RigFixture::new(&["a", "b"]);
    crash_during_config_switch(&rig);

    let report = rig
        .controller(MigrationOptions::new(VcsBackendType::Git))
        .run()
        .unwrap();
    assert_eq!(report.converted, vec!["a", "b"]);
    let config = rig.config().load().unwrap();
    assert_eq!(config.layout, RigLayout::Workspaces);
    assert_eq!(config.store, std::path::PathBuf::from("anchor"));
    assert!(!config.frozen);
    assert!(rig.records().load().unwrap().is_none());
}

#[test]
fn test_manual_abort_restores_clones() {
    let rig = RigFixture::new(&["a", "b"]);
    let head_a = rig.clone_head("a");
    fs::write(aside_path(&rig.worker("b")), "in the way").unwrap();

    let controller = rig.controller(MigrationOptions::new(VcsBackendType::Git));
    assert!(matches!(
        controller.run(),
        Err(MigrationError::PartialConversion { .. })
    ));

    let report = controller.abort().unwrap();
    assert_eq!(report.phase, MigrationPhase::ConvertWorkspaces);
    assert!(matches!(
        &report.removed[0],
        Artifact::Workspace { worker, .. } if worker == "a"
    ));
    assert!(report
        .removed
        .iter()
        .any(|a| matches!(a, Artifact::Anchor { .. })));

    // a is an independent clone again, b never moved
    assert!(rig.worker("a").join(".git").is_dir());
    assert_eq!(rig.clone_head("a"), head_a);
    assert!(!aside_path(&rig.worker("a")).exists());
    assert!(rig.worker("b").join(".git").is_dir());
    assert!(!rig.root.join("anchor").exists());
    assert!(rig.records().load().unwrap().is_none());
    assert!(rig.backups_are_empty());
    assert!(!rig.load_config().frozen);
    assert!(!controller.gate().is_frozen());

    assert!(matches!(
        controller.abort(),
        Err(MigrationError::NotInProgress)
    ));
}

#[test]
fn test_restore_store_backup_rebuilds_clones() {
    let rig = RigFixture::new(&["a", "b"]);
    let heads: Vec<String> = ["a", "b"].iter().map(|w| rig.clone_head(w)).collect();
    let report = rig
        .controller(MigrationOptions::new(VcsBackendType::Git))
        .run()
        .unwrap();

    let restored = restore_store_backup(
        &rig.config(),
        &rig.records(),
        &report.backup_dir.join(MANIFEST_FILE),
    )
    .unwrap();
    assert_eq!(restored.clones.len(), 2);
    assert_eq!(restored.moved_aside.len(), 2);

    let config = rig.load_config();
    assert_eq!(config.vcs, Some(VcsBackendType::Git));
    assert_eq!(config.layout, RigLayout::Clones);
    assert_eq!(config.store, std::path::PathBuf::from(".repo.git"));

    for (name, head) in ["a", "b"].iter().zip(&heads) {
        assert!(rig.worker(name).join(".git").is_dir(), "{name} is a clone");
        assert_eq!(&rig.clone_head(name), head);
        let vcs = VcsFactory::open(&rig.worker(name)).unwrap();
        assert_eq!(
            vcs.current_branch().unwrap().as_deref(),
            Some(format!("worker/{name}").as_str())
        );
    }
}

#[test]
fn test_discard_unused_anchor() {
    let rig = RigFixture::new(&[]);
    let lonely = rig.tmp.path().join("lonely");
    let setup = VcsFactory::create(&vcs::VcsConfig::new(VcsBackendType::Git, &lonely)).unwrap();
    setup
        .clone_from(&rig.store().display().to_string(), &lonely)
        .unwrap();

    discard_anchor(&lonely, Some(VcsBackendType::Git)).unwrap();
    assert!(!lonely.exists());
}

//! Scratch rigs for migration tests: a bare `.repo.git` store cloned from an
//! upstream seed, plus one git clone per worker on `worker/<name>` with one
//! pushed commit that also ignores `target/`.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Mutex, Once,
        atomic::{AtomicBool, Ordering},
    },
};

use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
use services::services::{
    dispatch_gate::DispatchGate,
    migration::{
        JsonMigrationStore, MigrationController, MigrationError, MigrationOptions,
        MigrationRecord, MigrationStore,
    },
    rig_config::{
        JsonRigConfigStore, RigConfig, RigConfigError, RigConfigStore, RigLayout, WorkerEntry,
    },
};
use tempfile::TempDir;
use walkdir::WalkDir;
use vcs::{GitVcs, Vcs, VcsBackendType, VcsConfig, VcsFactory, VcsSetup};

pub const TEST_USER: &str = "Test User";
pub const TEST_EMAIL: &str = "test@example.com";

static ENV: Once = Once::new();

pub fn init_test_env() {
    ENV.call_once(|| {
        for (key, value) in [
            ("GIT_AUTHOR_NAME", TEST_USER),
            ("GIT_AUTHOR_EMAIL", TEST_EMAIL),
            ("GIT_COMMITTER_NAME", TEST_USER),
            ("GIT_COMMITTER_EMAIL", TEST_EMAIL),
            ("JJ_USER", TEST_USER),
            ("JJ_EMAIL", TEST_EMAIL),
        ] {
            std::env::set_var(key, value);
        }
    });
}

/// Targets to exercise: git always, jj when installed
pub fn available_targets() -> Vec<VcsBackendType> {
    let mut targets = vec![VcsBackendType::Git];
    if utils::shell::is_executable_available("jj") {
        targets.push(VcsBackendType::Jujutsu);
    }
    targets
}

pub struct RigFixture {
    pub tmp: TempDir,
    pub root: PathBuf,
}

impl RigFixture {
    pub fn new(workers: &[&str]) -> Self {
        init_test_env();
        let tmp = TempDir::new().expect("create temp dir");
        let upstream = tmp.path().join("upstream");
        seed_repo(&upstream);

        let root = tmp.path().join("rig");
        let store = root.join(".repo.git");
        GitVcs::new(&upstream)
            .clone_bare(&upstream.display().to_string(), &store)
            .expect("bare store");

        let mut config = RigConfig::new("demo", ".repo.git");
        config.vcs = Some(VcsBackendType::Git);
        for name in workers {
            let rel = PathBuf::from("workers").join(name);
            let path = root.join(&rel);
            let setup = VcsFactory::create(&VcsConfig::new(VcsBackendType::Git, &path)).unwrap();
            setup
                .clone_from(&store.display().to_string(), &path)
                .expect("worker clone");

            let vcs = VcsFactory::open(&path).unwrap();
            let branch = format!("worker/{name}");
            vcs.create_branch(&branch).unwrap();
            vcs.checkout(&branch).unwrap();
            write_file(&path, &format!("{name}.txt"), &format!("work of {name}\n"));
            write_file(&path, ".gitignore", "target/\n");
            vcs.commit_all(&format!("{name}: first task")).unwrap();
            vcs.push("origin", &branch, false).unwrap();
            config.workers.push(WorkerEntry::new(*name, rel));
        }
        JsonRigConfigStore::new(&root).save(&config).unwrap();

        Self { tmp, root }
    }

    pub fn store(&self) -> PathBuf {
        self.root.join(".repo.git")
    }

    pub fn worker(&self, name: &str) -> PathBuf {
        self.root.join("workers").join(name)
    }

    pub fn config(&self) -> JsonRigConfigStore {
        JsonRigConfigStore::new(&self.root)
    }

    pub fn load_config(&self) -> RigConfig {
        self.config().load().unwrap()
    }

    pub fn records(&self) -> JsonMigrationStore {
        JsonMigrationStore::for_rig(&self.root)
    }

    pub fn controller(&self, options: MigrationOptions) -> MigrationController {
        MigrationController::for_rig(&self.root, DispatchGate::new(), options)
    }

    pub fn open_worker(&self, name: &str) -> Box<dyn Vcs> {
        VcsFactory::open(&self.worker(name)).unwrap()
    }

    /// Commit the worker clone has checked out, read with git2
    pub fn clone_head(&self, name: &str) -> String {
        let repo = Repository::open(self.worker(name)).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        head.id().to_string()
    }

    pub fn backups_are_empty(&self) -> bool {
        let backups = self.root.join(".runtime").join("backups");
        match fs::read_dir(&backups) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}

pub fn seed_repo(path: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(path, &opts).expect("init upstream");
    {
        let mut cfg = repo.config().unwrap();
        cfg.set_str("user.name", TEST_USER).unwrap();
        cfg.set_str("user.email", TEST_EMAIL).unwrap();
    }
    write_file(path, "README.md", "# rig\n");

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    {
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now(TEST_USER, TEST_EMAIL).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])
            .unwrap();
    }
    repo
}

pub fn write_file<P: AsRef<Path>>(base: P, rel: &str, content: &str) {
    let path = base.as_ref().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
}

/// Contents of every file under `dir`, VCS metadata excluded
pub fn snapshot_files(dir: &Path) -> BTreeMap<String, String> {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git" && e.file_name() != ".jj")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap();
            (
                rel.to_string_lossy().into_owned(),
                fs::read_to_string(e.path()).unwrap(),
            )
        })
        .collect()
}

/// Config store that writes the switch to workspaces, then fails once as
/// if the process died before reporting success
pub struct CrashAfterSwitch {
    pub inner: JsonRigConfigStore,
    armed: AtomicBool,
}

impl CrashAfterSwitch {
    pub fn new(inner: JsonRigConfigStore) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
        }
    }
}

impl RigConfigStore for CrashAfterSwitch {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn load(&self) -> Result<RigConfig, RigConfigError> {
        self.inner.load()
    }

    fn save(&self, config: &RigConfig) -> Result<(), RigConfigError> {
        self.inner.save(config)?;
        if config.layout == RigLayout::Workspaces && self.armed.swap(false, Ordering::SeqCst) {
            return Err(RigConfigError::Io {
                path: self.inner.path(),
                source: std::io::Error::other("crash"),
            });
        }
        Ok(())
    }
}

/// Record store that keeps a copy of every saved record
pub struct RecordingStore {
    pub inner: JsonMigrationStore,
    pub saves: Mutex<Vec<MigrationRecord>>,
}

impl RecordingStore {
    pub fn new(inner: JsonMigrationStore) -> Self {
        Self {
            inner,
            saves: Mutex::new(Vec::new()),
        }
    }
}

impl MigrationStore for RecordingStore {
    fn load(&self) -> Result<Option<MigrationRecord>, MigrationError> {
        self.inner.load()
    }

    fn save(&self, record: &MigrationRecord) -> Result<(), MigrationError> {
        self.saves.lock().unwrap().push(record.clone());
        self.inner.save(record)
    }

    fn clear(&self) -> Result<(), MigrationError> {
        self.inner.clear()
    }
}

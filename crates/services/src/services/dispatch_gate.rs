use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;
use tracing::info;

use super::rig_config::{RigConfigError, RigConfigStore};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch is frozen while the rig is being migrated")]
    Frozen,
    #[error(transparent)]
    Config(#[from] RigConfigError),
}

/// Shared switch that stops new work from being dispatched to workers.
///
/// Clones share one flag. When built with a config store, the persisted
/// `frozen` flag is honoured too, so a freeze set by another process is seen.
#[derive(Clone, Default)]
pub struct DispatchGate {
    frozen: Arc<AtomicBool>,
    config: Option<Arc<dyn RigConfigStore>>,
}

impl DispatchGate {
    /// An open gate
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Arc<dyn RigConfigStore>) -> Self {
        Self {
            frozen: Arc::new(AtomicBool::new(false)),
            config: Some(config),
        }
    }

    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            info!("Dispatch frozen");
        }
    }

    pub fn thaw(&self) {
        if self.frozen.swap(false, Ordering::SeqCst) {
            info!("Dispatch resumed");
        }
    }

    /// In-process flag only
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Called by dispatchers before handing out work
    pub fn ensure_open(&self) -> Result<(), DispatchError> {
        if self.is_frozen() {
            return Err(DispatchError::Frozen);
        }
        if let Some(config) = &self.config {
            if config.load()?.frozen {
                return Err(DispatchError::Frozen);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DispatchGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchGate")
            .field("frozen", &self.is_frozen())
            .field("config", &self.config.as_ref().map(|c| c.root().to_path_buf()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rig_config::{JsonRigConfigStore, RigConfig};
    use tempfile::TempDir;

    #[test]
    fn test_constructed_open() {
        let gate = DispatchGate::new();
        assert!(!gate.is_frozen());
        assert!(gate.ensure_open().is_ok());
    }

    #[test]
    fn test_clones_share_flag() {
        let gate = DispatchGate::new();
        let dispatcher = gate.clone();

        gate.freeze();
        assert!(matches!(dispatcher.ensure_open(), Err(DispatchError::Frozen)));

        gate.thaw();
        assert!(dispatcher.ensure_open().is_ok());
    }

    #[test]
    fn test_persisted_flag_is_polled() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonRigConfigStore::new(dir.path()));
        store.save(&RigConfig::new("demo", ".repo.git")).unwrap();

        let gate = DispatchGate::with_config(store.clone());
        assert!(gate.ensure_open().is_ok());

        // Another process freezes the rig
        store.update(&mut |c| c.frozen = true).unwrap();
        assert!(!gate.is_frozen());
        assert!(matches!(gate.ensure_open(), Err(DispatchError::Frozen)));

        store.update(&mut |c| c.frozen = false).unwrap();
        assert!(gate.ensure_open().is_ok());
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let gate = DispatchGate::with_config(Arc::new(JsonRigConfigStore::new(dir.path())));
        assert!(matches!(gate.ensure_open(), Err(DispatchError::Config(_))));
    }
}

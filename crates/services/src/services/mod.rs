pub mod backup;
pub mod dispatch_gate;
pub mod migration;
pub mod rig_config;
pub mod rollback;

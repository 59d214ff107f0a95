//! Example: migrate a rig from independent clones to shared workspaces
//!
//! Run with: cargo run -p services --example migrate_rig -- <rig-dir> [git|jj] [--abort|--status]

use std::path::PathBuf;

use anyhow::{Context, bail};
use services::services::{
    dispatch_gate::DispatchGate,
    migration::{MigrationController, MigrationError, MigrationOptions},
};
use vcs::VcsBackendType;

fn main() -> anyhow::Result<()> {
    utils::log::init_tracing("info");

    let mut args = std::env::args().skip(1);
    let Some(root) = args.next().map(PathBuf::from) else {
        bail!("usage: migrate_rig <rig-dir> [git|jj] [--abort|--status]");
    };
    let target: VcsBackendType = match args.next() {
        Some(t) => t.parse().map_err(anyhow::Error::msg)?,
        None => VcsBackendType::Jujutsu,
    };
    let action = args.next();

    let controller =
        MigrationController::for_rig(&root, DispatchGate::new(), MigrationOptions::new(target));

    match action.as_deref() {
        Some("--status") => {
            let status = controller.status()?;
            match status.phase {
                Some(phase) => println!(
                    "migration {} -> {} at {} (frozen: {}, converted: {:?}, failed: {:?})",
                    status.source.map(|s| s.to_string()).unwrap_or_default(),
                    status.target.map(|t| t.to_string()).unwrap_or_default(),
                    phase,
                    status.frozen,
                    status.converted,
                    status.failed
                ),
                None => println!("no migration in progress (frozen: {})", status.frozen),
            }
        }
        Some("--abort") => {
            let report = controller.abort().context("abort failed")?;
            println!("aborted during {}", report.phase);
            for artifact in report.removed {
                println!("  removed {artifact}");
            }
        }
        Some(other) => bail!("unknown action {other}"),
        None => match controller.run() {
            Ok(report) => {
                println!(
                    "{} migrated from {} to {} workspaces on {}",
                    report.rig,
                    report.source,
                    report.target,
                    report.anchor.display()
                );
                println!("backups kept in {}", report.backup_dir.display());
            }
            Err(MigrationError::PartialConversion { converted, failed }) => {
                println!("converted: {}", converted.join(", "));
                for failure in &failed {
                    println!("failed: {failure}");
                }
                bail!("{} workspace(s) left to convert; rerun to continue", failed.len());
            }
            Err(e) => return Err(e).context("migration failed"),
        },
    }
    Ok(())
}

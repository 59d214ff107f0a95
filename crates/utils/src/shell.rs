//! Locating external executables on `PATH`.

use std::path::PathBuf;

/// Resolve an executable name to an absolute path using `PATH`.
///
/// Returns `None` when nothing runnable is found.
pub fn resolve_executable_path_blocking(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!(executable = name, "executable not found on PATH: {}", e);
            None
        }
    }
}

/// Check whether `name` resolves and answers `--version` successfully.
pub fn is_executable_available(name: &str) -> bool {
    resolve_executable_path_blocking(name)
        .and_then(|path| {
            std::process::Command::new(path)
                .arg("--version")
                .output()
                .ok()
                .map(|output| output.status.success())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_none() {
        assert!(resolve_executable_path_blocking("definitely-not-a-real-binary-4821").is_none());
        assert!(!is_executable_available("definitely-not-a-real-binary-4821"));
    }
}

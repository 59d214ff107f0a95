//! Subprocess execution shared by the CLI-backed adapters.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use utils::shell::resolve_executable_path_blocking;
use wait_timeout::ChildExt;

use crate::error::{classify_failure, VcsError};

/// Captured result of a finished command, successful or not.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stderr and stdout joined, for error reports
    pub fn combined(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        match (stderr.is_empty(), stdout.is_empty()) {
            (false, false) => format!("{stderr}\n{stdout}"),
            (false, true) => stderr.to_string(),
            _ => stdout.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CommandRunner {
    program: &'static str,
    timeout: Option<Duration>,
    envs: Vec<(&'static str, &'static str)>,
}

impl CommandRunner {
    pub fn new(program: &'static str) -> Self {
        Self {
            program,
            timeout: None,
            envs: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: &'static str, value: &'static str) -> Self {
        self.envs.push((key, value));
        self
    }

    /// Run and return stdout; a non-zero exit becomes a classified error.
    pub fn run<I, S>(&self, operation: &'static str, cwd: &Path, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let output = self.output(operation, cwd, &args)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify_failure(
                operation,
                self.command_line(&args),
                output.combined(),
            ))
        }
    }

    /// Run and return the output regardless of exit status.
    ///
    /// Used for probes whose exit code is the answer (`merge-base
    /// --is-ancestor`, `show-ref --verify`). Spawn failures and timeouts are
    /// still errors.
    pub fn probe<I, S>(
        &self,
        operation: &'static str,
        cwd: &Path,
        args: I,
    ) -> Result<CommandOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        self.output(operation, cwd, &args)
    }

    pub fn command_line(&self, args: &[OsString]) -> String {
        let mut line = self.program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn output(
        &self,
        operation: &'static str,
        cwd: &Path,
        args: &[OsString],
    ) -> Result<CommandOutput, VcsError> {
        if !cwd.is_dir() {
            return Err(VcsError::not_a_repo(cwd));
        }

        let executable = resolve_executable_path_blocking(self.program)
            .ok_or(VcsError::ExecutableNotFound(self.program))?;

        let mut cmd = Command::new(&executable);
        cmd.current_dir(cwd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        tracing::trace!(
            repo = ?cwd,
            operation,
            "Running {} command: {:?}",
            self.program,
            args
        );

        let mut child = cmd.spawn()?;

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait on it.
        let stdout_reader = child.stdout.take().map(|pipe| thread::spawn(move || drain(pipe)));
        let stderr_reader = child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe)));

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    if let Err(e) = child.kill() {
                        tracing::warn!("failed to kill timed out {} process: {}", self.program, e);
                    }
                    let _ = child.wait();
                    return Err(VcsError::Timeout {
                        operation,
                        command: self.command_line(args),
                        timeout,
                    });
                }
            },
            None => child.wait()?,
        };

        let stdout = stdout_reader
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = stderr_reader
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }
}

fn drain<R: Read>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf) {
        tracing::warn!("failed to read command output: {}", e);
    }
    buf
}

/// Non-empty trimmed lines of command output
pub(crate) fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        let runner = CommandRunner::new("git");
        let args: Vec<OsString> = vec!["merge".into(), "--no-ff".into(), "feature".into()];
        assert_eq!(runner.command_line(&args), "git merge --no-ff feature");
    }

    #[test]
    fn test_missing_directory_is_not_a_repo() {
        let runner = CommandRunner::new("git");
        let err = runner
            .run("status", Path::new("/definitely/not/here"), ["status"])
            .unwrap_err();
        assert!(matches!(err, VcsError::NotARepository(_)));
    }

    #[test]
    fn test_combined_output_prefers_both() {
        let out = CommandOutput {
            success: false,
            code: Some(1),
            stdout: "CONFLICT (content)\n".into(),
            stderr: "error: merge failed".into(),
        };
        assert_eq!(out.combined(), "error: merge failed\nCONFLICT (content)");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let runner = CommandRunner::new("sleep").with_timeout(Some(Duration::from_millis(100)));
        let dir = std::env::temp_dir();
        let err = runner.run("sleep", &dir, ["5"]).unwrap_err();
        assert!(err.requires_probe(), "expected timeout, got {err:?}");
    }
}

//! Bounded subprocess execution

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("`{program}` is not installed or not on PATH")]
    NotFound { program: String },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// Stdout as produced, for file contents that may not be UTF-8
    pub raw_stdout: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Best single-line description of a failure
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        let detail = if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        };
        if detail.is_empty() {
            format!("exited with {}", self.status)
        } else {
            detail.to_string()
        }
    }
}

/// Runs commands with a fixed working directory, environment and timeout.
/// A command that outlives the timeout is killed.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cwd: None,
            envs: Vec::new(),
            timeout,
        }
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command = format!("{program} {}", args.join(" "));
        debug!(command = %command, "Running command");

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(CommandError::TimedOut {
                    command,
                    timeout: self.timeout,
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CommandError::NotFound {
                    program: program.to_string(),
                })
            }
            Ok(Err(source)) => return Err(CommandError::Spawn { command, source }),
            Ok(Ok(output)) => output,
        };

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            raw_stdout: output.stdout,
        })
    }
}

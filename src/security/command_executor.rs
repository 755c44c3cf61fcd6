//! SafeCommandExecutor: whitelisted, shell-free process execution
//!
//! shipbin only ever runs `npm publish` inside an assembled package directory
//! and `git describe` to read the release tag. Both go through
//! [`CommandRunner`], so registry plugins can be exercised with a fake runner.
//!
//! # Example
//!
//! ```rust,no_run
//! use shipbin::security::{CommandRunner, SafeCommandExecutor};
//!
//! # async fn run() -> Result<(), shipbin::security::CommandError> {
//! let executor = SafeCommandExecutor::new();
//! let args = vec!["--version".to_string()];
//! let output = executor.run("npm", &args, &std::env::temp_dir()).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Only these programs can be executed
const ALLOWED_COMMANDS: &[&str] = &["npm", "git"];

/// Upper bound for one `npm publish`
pub const NPM_PUBLISH_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bound for one `git` query
pub const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not a directory
    #[error("working directory does not exist: {}", .0.display())]
    InvalidWorkingDirectory(PathBuf),

    /// Spawning failed (binary not found, permission denied)
    #[error("failed to run {command}: {message}")]
    ExecutionFailed { command: String, message: String },

    /// Command exceeded the timeout duration
    #[error("command timeout after {0:?}")]
    Timeout(Duration),
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, the way a terminal would show them
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Runs an external program without a shell
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        dir: &Path,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runner backed by `tokio::process::Command`
#[derive(Debug, Default, Clone)]
pub struct SafeCommandExecutor {
    timeout: Option<Duration>,
}

impl SafeCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    fn program(command: &str) -> String {
        // npm ships as a .cmd shim on windows
        if cfg!(windows) && command == "npm" {
            format!("{}.cmd", command)
        } else {
            command.to_string()
        }
    }
}

#[async_trait]
impl CommandRunner for SafeCommandExecutor {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        dir: &Path,
    ) -> Result<CommandOutput, CommandError> {
        if !ALLOWED_COMMANDS.contains(&command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }
        if !dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(dir.to_path_buf()));
        }

        debug!(command, ?args, dir = %dir.display(), "running command");

        let child = Command::new(Self::program(command))
            .args(args)
            .current_dir(dir)
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| CommandError::Timeout(limit))?,
            None => child.await,
        }
        .map_err(|e| CommandError::ExecutionFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

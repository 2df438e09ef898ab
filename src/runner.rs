//! Command Runner
//!
//! Executes one command line to completion in a working directory and folds
//! every outcome, including spawn failures, into an `ExecutionResult`.
//!
//! # Process lifecycle
//!
//! `ShellRunner` spawns `sh -c <command>` in a new process group and registers
//! the child PID with `ChildRegistry::global()`, so a workbench that exits
//! mid-run takes the wrangler/prisma process tree with it. The runner itself
//! never interrupts a run and imposes no timeout.

use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Outcome of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the command spawned and exited with status 0.
    pub succeeded: bool,
    /// Stdout on success; the failure message followed by stderr otherwise.
    pub output: String,
    /// Exit code (None if terminated by signal or never spawned).
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
            exit_code: Some(0),
        }
    }

    /// Failure with `message` first, then whatever the command wrote to stderr.
    pub fn failure(message: &str, stderr: &str, exit_code: Option<i32>) -> Self {
        Self {
            succeeded: false,
            output: format!("{}\n{}", message, stderr),
            exit_code,
        }
    }
}

/// Something that can run a command line in a directory.
///
/// Implementations must not panic or return early on command failure; the
/// whole outcome goes into the result.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, working_directory: &Path) -> ExecutionResult;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, working_directory: &Path) -> ExecutionResult {
        info!(
            "Running command: {} in directory: {}",
            command,
            working_directory.display()
        );

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn command '{}': {}", command, e);
                return ExecutionResult::failure(&e.to_string(), "", None);
            }
        };
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        let waited = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed waiting for command '{}': {}", command, e);
                return ExecutionResult::failure(&e.to_string(), "", None);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if output.status.success() {
            info!("Command output: {}", stdout.trim_end());
            ExecutionResult::success(stdout)
        } else {
            let message = match exit_code {
                Some(code) => format!("Command failed: {} (exit code {})", command, code),
                None => format!("Command failed: {} (terminated by signal)", command),
            };
            info!("{}", message);
            ExecutionResult::failure(&message, &stderr, exit_code)
        }
    }
}

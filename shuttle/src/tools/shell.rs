//! External command execution boundary.
//!
//! Four-step protocol per call: confirmation, spawn in a fresh shell
//! (`sh -c` on Unix, `cmd /C` on Windows; state such as `cd` does not
//! persist between invocations), race against the timeout, and cooperative
//! cancellation. Failures never raise except for cancellation: they come
//! back as a [`ShellResult`] with `exit_code = None` and a descriptive
//! output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;

/// Arguments for one shell invocation. Callers pass `working_directory`
/// instead of relying on `cd`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShellArgs {
    pub command: String,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
}

/// Outcome of one shell invocation. `exit_code` is None when the command
/// was denied, timed out, or failed to start.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShellResult {
    pub command: String,
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Decision from the confirmation handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Approved,
    Denied { reason: String },
}

/// Asked before every command runs.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(
        &self,
        command: &str,
        working_directory: Option<&Path>,
        timeout_seconds: u64,
    ) -> Confirmation;
}

/// Handler that approves everything; for trusted environments and tests.
pub struct AlwaysApprove;

#[async_trait]
impl ConfirmationHandler for AlwaysApprove {
    async fn confirm(&self, _: &str, _: Option<&Path>, _: u64) -> Confirmation {
        Confirmation::Approved
    }
}

/// Runs external commands through the four-step protocol.
pub struct ShellExecutor {
    confirmation: Arc<dyn ConfirmationHandler>,
}

impl ShellExecutor {
    pub fn new(confirmation: Arc<dyn ConfirmationHandler>) -> Self {
        Self { confirmation }
    }

    /// Runs one command. Only cancellation raises; every other failure is
    /// folded into the result's `output`.
    pub async fn run(
        &self,
        args: &ShellArgs,
        cancel: &CancellationToken,
    ) -> Result<ShellResult, RuntimeError> {
        let decision = self
            .confirmation
            .confirm(
                &args.command,
                args.working_directory.as_deref(),
                args.timeout_seconds,
            )
            .await;
        if let Confirmation::Denied { reason } = decision {
            return Ok(ShellResult {
                command: args.command.clone(),
                exit_code: None,
                output: format!("denied by user: {}", reason),
            });
        }

        let mut cmd = shell_command(&args.command);
        if let Some(dir) = &args.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(ShellResult {
                    command: args.command.clone(),
                    exit_code: None,
                    output: format!("Failed to execute command: {}", e),
                })
            }
        };

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let _ = tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            (out, err)
        });

        enum Outcome {
            Cancelled,
            TimedOut,
            Done(std::io::Result<std::process::ExitStatus>),
        }

        let timeout = Duration::from_secs(args.timeout_seconds);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            status = child.wait() => Outcome::Done(status),
        };

        match outcome {
            Outcome::Cancelled => {
                kill_tree(&mut child).await;
                Err(RuntimeError::Cancelled)
            }
            Outcome::TimedOut => {
                kill_tree(&mut child).await;
                let partial = match reader.await {
                    Ok((out, err)) => combine_output(&out, &err),
                    Err(_) => String::new(),
                };
                Ok(ShellResult {
                    command: args.command.clone(),
                    exit_code: None,
                    output: if partial.is_empty() {
                        "Command timed out".to_string()
                    } else {
                        format!("Command timed out\n{}", partial)
                    },
                })
            }
            Outcome::Done(Ok(status)) => {
                let (out, err) = reader.await.unwrap_or_default();
                Ok(ShellResult {
                    command: args.command.clone(),
                    exit_code: status.code(),
                    output: combine_output(&out, &err),
                })
            }
            Outcome::Done(Err(e)) => Ok(ShellResult {
                command: args.command.clone(),
                exit_code: None,
                output: format!("Failed to execute command: {}", e),
            }),
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

async fn kill_tree(child: &mut Child) {
    let _ = child.kill().await;
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    if stderr.is_empty() {
        stdout.into_owned()
    } else if stdout.is_empty() {
        format!("stderr:\n{}", stderr)
    } else {
        format!("stdout:\n{}\nstderr:\n{}", stdout, stderr)
    }
}

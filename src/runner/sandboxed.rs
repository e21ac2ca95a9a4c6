//! Sandboxed runner implementation
//!
//! Executes untrusted user code in a request-scoped workspace with
//! kernel resource ceilings and a wall-clock deadline.

use std::process::Stdio;

use anyhow::{Context, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ExecutionResult, RunLimits, RunStatus, Submission, MAX_CAPTURE_BYTES};
use crate::languages::{self, LanguageConfig};

/// Wall-clock deadline for the external compiler.
const COMPILE_TIMEOUT_SECS: u64 = 30;

/// Result of a compilation attempt
#[derive(Debug)]
pub struct CompileResult {
    pub success: bool,
    pub message: Option<String>,
}

impl CompileResult {
    fn clean() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

/// Runner that executes one submission in an isolated workspace.
///
/// Every runner owns a freshly named temporary directory keyed to the
/// request, so concurrent submissions never share a source path or a
/// compiled artifact. The directory, and everything in it, is removed
/// when the runner drops, on every exit path.
pub struct SandboxRunner {
    workspace: TempDir,
    lang: LanguageConfig,
    limits: RunLimits,
}

impl SandboxRunner {
    /// Materialize the submission's source into a fresh workspace.
    pub async fn new(submission: &Submission, limits: RunLimits) -> Result<Self> {
        let lang = languages::get_language_config(submission.language)
            .ok_or_else(|| anyhow::anyhow!("Language table not initialized"))?;

        let workspace = tempfile::tempdir().context("Failed to create workspace")?;
        let source_path = workspace.path().join(&lang.source_file);
        tokio::fs::write(&source_path, &submission.source)
            .await
            .context("Failed to write source file")?;

        debug!("Materialized submission at {:?}", source_path);

        Ok(Self {
            workspace,
            lang,
            limits,
        })
    }

    /// Invoke the external compiler on the materialized source.
    ///
    /// A non-zero compiler exit or a non-empty diagnostic stream is a
    /// compile failure; interpreted languages always compile clean.
    pub async fn compile(&self) -> Result<CompileResult> {
        let Some(compile_cmd) = &self.lang.compile_command else {
            return Ok(CompileResult::clean());
        };

        debug!("Compiling with {:?}", compile_cmd);

        let mut command = Command::new(&compile_cmd[0]);
        command
            .args(&compile_cmd[1..])
            .current_dir(self.workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(
            std::time::Duration::from_secs(COMPILE_TIMEOUT_SECS),
            command.output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Compiler timed out after {}s", COMPILE_TIMEOUT_SECS))?
        .context("Failed to run compiler")?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if output.status.success() && stderr.trim().is_empty() {
            return Ok(CompileResult::clean());
        }

        let message = if !stderr.trim().is_empty() {
            stderr
        } else if !stdout.trim().is_empty() {
            stdout
        } else {
            format!(
                "Compilation failed with exit code {}",
                output.status.code().unwrap_or(-1)
            )
        };

        Ok(CompileResult {
            success: false,
            message: Some(message),
        })
    }

    /// Run one execution attempt with the given process arguments.
    ///
    /// The caller is responsible for having compiled first; the run
    /// phase only launches the artifact or interpreter-plus-source.
    pub async fn run(&self, args: &[String]) -> Result<ExecutionResult> {
        let mut command = Command::new(&self.lang.run_command[0]);
        command
            .args(&self.lang.run_command[1..])
            .args(args)
            .current_dir(self.workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so the deadline kill reaches children too.
            .process_group(0)
            .kill_on_drop(true);

        // Ceilings install in the child pre-exec; if that fails, spawn
        // fails and no untrusted instruction ever runs.
        self.limits.ceilings().install(&mut command);

        let mut child = command.spawn().context("Failed to spawn submission")?;
        let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));

        // Drain both pipes concurrently under a byte cap, so a
        // submission flooding stdout never grows the captured buffers
        // past the cap and never blocks on a full pipe either.
        let stdout_pipe = child.stdout.take().context("Child stdout not captured")?;
        let stderr_pipe = child.stderr.take().context("Child stderr not captured")?;
        let stdout_task = tokio::spawn(read_capped(stdout_pipe));
        let stderr_task = tokio::spawn(read_capped(stderr_pipe));

        match timeout(self.limits.deadline(), child.wait()).await {
            Ok(wait_result) => {
                let status = wait_result.context("Failed to wait for submission")?;
                let stdout = stdout_task
                    .await
                    .context("Capture task failed")?
                    .context("Failed to read submission stdout")?;
                let stderr = stderr_task
                    .await
                    .context("Capture task failed")?
                    .context("Failed to read submission stderr")?;
                Ok(classify(status, stdout, stderr))
            }
            Err(_elapsed) => {
                // Deadline expired: kill the whole process tree, then
                // reap the direct child so nothing lingers in the
                // process table after this returns.
                if let Some(pgid) = pgid {
                    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                        warn!("Failed to kill process group {}: {}", pgid, e);
                    }
                }
                match timeout(std::time::Duration::from_secs(2), child.wait()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Failed to reap timed-out child: {}", e),
                    Err(_) => warn!("Timed-out child not reaped within the grace period"),
                }
                stdout_task.abort();
                stderr_task.abort();
                Ok(ExecutionResult::timeout())
            }
        }
    }

    /// Compile (when required) and run once. Entry point for the raw
    /// execute operation; the harness calls `compile` and `run`
    /// separately so one artifact serves all test cases.
    pub async fn execute(&self, args: &[String]) -> Result<ExecutionResult> {
        let compiled = self.compile().await?;
        if !compiled.success {
            return Ok(ExecutionResult::compile_error(
                compiled.message.unwrap_or_else(|| "Compilation failed".into()),
            ));
        }
        self.run(args).await
    }
}

/// Read a pipe to EOF, keeping at most [`MAX_CAPTURE_BYTES`].
///
/// Bytes past the cap are still drained, so the child can always make
/// progress, but they are dropped instead of buffered.
async fn read_capped<R: AsyncRead + Unpin>(mut pipe: R) -> std::io::Result<String> {
    let mut captured: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
        if room > 0 {
            captured.extend_from_slice(&chunk[..n.min(room)]);
        }
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

/// Classify a finished process into an execution status.
fn classify(status: std::process::ExitStatus, stdout: String, stderr: String) -> ExecutionResult {
    use std::os::unix::process::ExitStatusExt;

    let status = if status.success() {
        RunStatus::Success
    } else if let Some(sig) = status.signal() {
        // SIGXCPU is the CPU soft ceiling; SIGKILL the hard backstop.
        match Signal::try_from(sig) {
            Ok(Signal::SIGXCPU) | Ok(Signal::SIGKILL) => RunStatus::ResourceExceeded,
            _ => RunStatus::RuntimeError,
        }
    } else if allocation_failure(&stderr) {
        // Address-space exhaustion surfaces as an allocation failure
        // inside the runtime rather than a kernel kill.
        RunStatus::ResourceExceeded
    } else {
        RunStatus::RuntimeError
    };

    ExecutionResult {
        status,
        stdout,
        stderr,
    }
}

fn allocation_failure(stderr: &str) -> bool {
    stderr.contains("MemoryError") || stderr.contains("bad_alloc")
}

//! Runner module - sandboxed execution of untrusted submissions
//!
//! This module materializes a submission into a request-scoped
//! workspace, compiles it when the language requires it, and runs it
//! under kernel resource ceilings plus a wall-clock deadline.
//!
//! The runner module does NOT:
//! - Compare outputs or determine verdicts
//! - Know about problems or test-case semantics

pub mod sandboxed;

use serde::{Deserialize, Serialize};

use crate::languages::Language;

/// Cap on captured stdout/stderr bytes. The pipes are drained past the
/// cap so the child never blocks on a full pipe, but the excess is
/// discarded instead of buffered.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Compiler diagnostics surfaced to users are bounded too.
pub const MAX_DIAGNOSTIC_CHARS: usize = 8 * 1024;

/// One user submission; created per request, discarded after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Source text
    pub source: String,
    /// Target language tag
    pub language: Language,
}

/// Resource limits for one execution
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    /// Wall-clock deadline in milliseconds
    pub time_ms: u32,
    /// Address-space ceiling in MB
    pub memory_mb: u32,
}

impl RunLimits {
    pub fn new(time_ms: u32, memory_mb: u32) -> Self {
        Self { time_ms, memory_mb }
    }

    /// CPU ceiling in whole seconds, one second past the wall deadline.
    ///
    /// The deadline, not the kernel accounting, decides timeouts near
    /// the boundary; the CPU ceiling is the backstop for processes that
    /// burn CPU in children the deadline kill might miss.
    pub fn cpu_ceiling_secs(&self) -> u64 {
        (self.time_ms as u64).div_ceil(1000) + 1
    }

    pub fn ceilings(&self) -> crate::limits::ResourceCeilings {
        crate::limits::ResourceCeilings::new(self.cpu_ceiling_secs(), self.memory_mb as u64)
    }

    pub fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.time_ms as u64)
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            time_ms: 1000,
            memory_mb: 100,
        }
    }
}

/// Classified outcome of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Exited with code 0
    Success,
    /// The external compiler rejected the source
    CompileError,
    /// Non-zero exit or a crash signal
    RuntimeError,
    /// Wall-clock deadline expired
    Timeout,
    /// Killed or starved by a resource ceiling
    ResourceExceeded,
}

/// Result of one Sandbox Runner invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: RunStatus,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error (compiler diagnostics for compile errors)
    pub stderr: String,
}

impl ExecutionResult {
    pub(crate) fn compile_error(diagnostics: String) -> Self {
        Self {
            status: RunStatus::CompileError,
            stdout: String::new(),
            stderr: truncate_chars(diagnostics, MAX_DIAGNOSTIC_CHARS),
        }
    }

    pub(crate) fn timeout() -> Self {
        Self {
            status: RunStatus::Timeout,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Cap a string at `max` characters.
pub(crate) fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

// Re-exports
pub use sandboxed::SandboxRunner;

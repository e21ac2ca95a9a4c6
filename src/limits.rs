//! Kernel resource ceilings for spawned untrusted processes.
//!
//! Ceilings are a plain value handed to each spawn rather than ambient
//! process state, so concurrent spawns never race on shared limiter
//! configuration. They are installed in the child between `fork` and
//! `exec`, before any untrusted instruction runs.

use nix::sys::resource::{setrlimit, Resource};
use tokio::process::Command;

/// Default CPU ceiling in seconds.
pub const DEFAULT_CPU_SECS: u64 = 1;
/// Default address-space ceiling in MB.
pub const DEFAULT_MEMORY_MB: u64 = 100;

/// Hard ceilings applied to one spawned child.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCeilings {
    /// Cumulative CPU time in seconds.
    pub cpu_secs: u64,
    /// Maximum address-space size in MB.
    pub memory_mb: u64,
}

impl Default for ResourceCeilings {
    fn default() -> Self {
        Self {
            cpu_secs: DEFAULT_CPU_SECS,
            memory_mb: DEFAULT_MEMORY_MB,
        }
    }
}

impl ResourceCeilings {
    pub fn new(cpu_secs: u64, memory_mb: u64) -> Self {
        Self {
            cpu_secs,
            memory_mb,
        }
    }

    /// Install the ceilings on the command's future child.
    ///
    /// If `setrlimit` is denied, the closure errors and the spawn fails,
    /// so execution aborts before untrusted code runs instead of
    /// degrading silently to unlimited.
    pub fn install(self, command: &mut Command) {
        let cpu_soft = self.cpu_secs;
        // Soft limit delivers SIGXCPU first; the hard limit one second
        // later is the kernel's SIGKILL backstop.
        let cpu_hard = self.cpu_secs + 1;
        let memory_bytes = self.memory_mb * 1024 * 1024;

        // Safety: the closure only calls async-signal-safe setrlimit.
        unsafe {
            command.pre_exec(move || {
                setrlimit(Resource::RLIMIT_CPU, cpu_soft, cpu_hard)
                    .map_err(std::io::Error::from)?;
                setrlimit(Resource::RLIMIT_AS, memory_bytes, memory_bytes)
                    .map_err(std::io::Error::from)?;
                // No core dumps from crashing submissions.
                setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(std::io::Error::from)?;
                Ok(())
            });
        }
    }
}

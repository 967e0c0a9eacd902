//! Process enumeration, termination and launching.

use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, Process, ProcessStatus, System};

use crate::error::{InstallError, Result};

/// Interval between checks while waiting for terminated processes to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest time to wait for terminated processes to exit.
const EXIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Executable name of the target application on this platform.
#[must_use]
pub fn default_target_process() -> &'static str {
    if cfg!(windows) { "steam.exe" } else { "steam" }
}

/// Case-insensitive exact comparison of a process name against `name`.
///
/// Only the base name of `name` is compared, so a full path is accepted.
#[must_use]
pub fn matches_process_name(process_name: &str, name: &str) -> bool {
    let wanted = name.rsplit(['/', '\\']).next().unwrap_or(name);
    !wanted.is_empty() && process_name.eq_ignore_ascii_case(wanted)
}

fn process_snapshot() -> System {
    let mut system = System::new();
    system.refresh_processes();
    system
}

/// Killed processes linger as zombies until their parent reaps them.
fn is_live(process: &Process) -> bool {
    process.status() != ProcessStatus::Zombie
}

/// Returns true when a process named `name` is running.
#[must_use]
pub fn is_running(name: &str) -> bool {
    process_snapshot()
        .processes()
        .values()
        .any(|process| is_live(process) && matches_process_name(process.name(), name))
}

/// Which matching processes accepted or refused the kill signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Termination {
    /// Pids that were signalled.
    pub signalled: Vec<u32>,
    /// Pids the kill was refused for, e.g. for lack of permission.
    pub refused: Vec<u32>,
}

impl Termination {
    /// Returns true when at least one process was signalled.
    #[must_use]
    pub fn terminated(&self) -> bool {
        !self.signalled.is_empty()
    }

    /// Returns true when no matching process was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signalled.is_empty() && self.refused.is_empty()
    }
}

/// Terminates every process named `name`.
///
/// Waits up to ten seconds for the signalled processes to exit. Whether any
/// survived is for the caller to check with [`is_running`].
pub fn terminate_by_name(name: &str) -> Termination {
    let mut system = process_snapshot();
    let mut termination = Termination::default();

    for (pid, process) in system.processes() {
        if !is_live(process) || !matches_process_name(process.name(), name) {
            continue;
        }
        if process.kill() {
            tracing::info!("Terminated {} (pid {})", process.name(), pid);
            termination.signalled.push(pid.as_u32());
        } else {
            tracing::warn!("Could not terminate {} (pid {})", process.name(), pid);
            termination.refused.push(pid.as_u32());
        }
    }

    if termination.is_empty() {
        tracing::debug!("No running process named {}", name);
        return termination;
    }

    let started = Instant::now();
    while !termination.signalled.is_empty() {
        system.refresh_processes();
        let remaining = termination
            .signalled
            .iter()
            .filter(|pid| system.process(Pid::from_u32(**pid)).is_some_and(is_live))
            .count();
        if remaining == 0 {
            break;
        }
        if started.elapsed() >= EXIT_TIMEOUT {
            tracing::warn!("{} process(es) named {} still running", remaining, name);
            break;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
    termination
}

/// Access to the process table, replaceable in tests.
pub trait ProcessControl: Send + Sync {
    /// See [`terminate_by_name`].
    fn terminate_by_name(&self, name: &str) -> Termination;

    /// See [`is_running`].
    fn is_running(&self, name: &str) -> bool;
}

/// The real process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn terminate_by_name(&self, name: &str) -> Termination {
        terminate_by_name(name)
    }

    fn is_running(&self, name: &str) -> bool {
        is_running(name)
    }
}

/// Starts `executable` detached from the installer, in `working_dir`.
pub fn launch(executable: &Path, working_dir: &Path) -> Result<()> {
    tracing::info!("Launching {}", executable.display());
    Command::new(executable)
        .current_dir(working_dir)
        .spawn()
        .map(|_child| ())
        .map_err(|e| {
            InstallError::Process(format!("failed to launch {}: {e}", executable.display()))
        })
}

/// Starts `executable` and exits the installer.
///
/// Returns only when the launch fails.
pub fn launch_and_exit(executable: &Path, working_dir: &Path) -> Result<()> {
    launch(executable, working_dir)?;
    std::process::exit(0);
}

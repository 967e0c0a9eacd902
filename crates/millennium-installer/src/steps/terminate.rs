//! Stopping the target application before touching its files.

use crate::error::{InstallError, Result};
use crate::process::{ProcessControl, Termination};
use crate::scheduler::TaskContext;

/// Terminates every process named `name` and checks that none survived.
///
/// Succeeds when nothing was running. Any surviving match fails the step,
/// whether its kill was refused or it did not exit in time.
pub fn stop_target(ctx: &TaskContext, processes: &dyn ProcessControl, name: &str) -> Result<()> {
    ctx.progress().reset();
    let termination = processes.terminate_by_name(name);
    if processes.is_running(name) {
        return Err(InstallError::Process(still_running(name, &termination)));
    }
    ctx.progress().complete();
    Ok(())
}

fn still_running(name: &str, termination: &Termination) -> String {
    if termination.refused.is_empty() {
        return format!("{name} is still running");
    }
    let pids: Vec<String> = termination.refused.iter().map(u32::to_string).collect();
    format!(
        "{name} is still running; termination refused for pid {}",
        pids.join(", ")
    )
}

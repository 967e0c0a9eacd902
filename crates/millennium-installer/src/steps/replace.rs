//! Swapping in a downloaded installer binary.

use std::fs;
use std::path::Path;

use crate::error::{InstallError, Result};
use crate::scheduler::TaskContext;
use crate::self_replace::{Relauncher, ReplaceState, replace_and_relaunch};

/// Replaces `current_exe` with the binary at `download` and relaunches it.
///
/// The download is removed whether or not the replacement succeeds.
pub fn replace_installer(
    ctx: &TaskContext,
    download: &Path,
    current_exe: &Path,
    temp_dir: &Path,
    relauncher: &dyn Relauncher,
) -> Result<ReplaceState> {
    ctx.progress().reset();
    let new_binary = fs::read(download).map_err(|e| {
        InstallError::SelfUpdate(format!("failed to read {}: {e}", download.display()))
    })?;
    let _ = fs::remove_file(download);
    if new_binary.is_empty() {
        return Err(InstallError::SelfUpdate("downloaded binary is empty".to_string()));
    }

    let state = replace_and_relaunch(current_exe, &new_binary, temp_dir, relauncher)?;
    ctx.progress().complete();
    Ok(state)
}

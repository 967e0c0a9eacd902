//! Replacing the installer's own executable.
//!
//! A running executable usually cannot be overwritten in place, so the
//! replacement is a small compensating transaction:
//!
//! 1. Stash: move the current binary to a temp location
//! 2. Write: put the new binary at the original path
//! 3. Relaunch the new binary, or restore the stashed one on any failure

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, Result};
use crate::process;

/// Temp subdirectory holding the stashed binary.
const STASH_DIR: &str = "MillenniumInstallerUpdate";

/// Starts the freshly written binary.
pub trait Relauncher: Send + Sync {
    /// Launches `executable`.
    fn relaunch(&self, executable: &Path) -> Result<()>;
}

/// Launches the new binary as a detached process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRelauncher;

impl Relauncher for ProcessRelauncher {
    fn relaunch(&self, executable: &Path) -> Result<()> {
        let working_dir = executable.parent().unwrap_or(Path::new("."));
        process::launch(executable, working_dir)
    }
}

/// Where a replacement transaction currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceState {
    /// The current binary has been moved aside.
    Stashed,
    /// The new binary is in place.
    Written,
    /// The new binary was started.
    Relaunched,
    /// The original binary was put back.
    Restored,
}

/// Stash path for `target`: `<temp_dir>/MillenniumInstallerUpdate/old_<file name>`.
#[must_use]
pub fn stash_path_for(temp_dir: &Path, target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "installer".to_string());
    temp_dir.join(STASH_DIR).join(format!("old_{name}"))
}

/// Moves a file, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// One replacement of an executable file.
#[derive(Debug)]
pub struct SelfReplace {
    target: PathBuf,
    stash: PathBuf,
    state: ReplaceState,
}

impl SelfReplace {
    /// Stashes `target` at `stash`. A previous stash is overwritten.
    pub fn begin_with_stash(target: &Path, stash: &Path) -> Result<Self> {
        if let Some(dir) = stash.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                InstallError::SelfUpdate(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        if stash.exists() {
            fs::remove_file(stash).map_err(|e| {
                InstallError::SelfUpdate(format!("failed to remove old stash: {e}"))
            })?;
        }
        move_file(target, stash).map_err(|e| {
            InstallError::SelfUpdate(format!(
                "failed to move {} aside: {e}",
                target.display()
            ))
        })?;
        tracing::info!("Stashed {} at {}", target.display(), stash.display());

        Ok(Self {
            target: target.to_path_buf(),
            stash: stash.to_path_buf(),
            state: ReplaceState::Stashed,
        })
    }

    /// Current transaction state.
    #[must_use]
    pub fn state(&self) -> ReplaceState {
        self.state
    }

    /// Location of the stashed original.
    #[must_use]
    pub fn stash_path(&self) -> &Path {
        &self.stash
    }

    /// Writes the new binary. Restores the original on failure.
    pub fn write(&mut self, new_binary: &[u8]) -> Result<()> {
        if let Err(e) = self.write_target(new_binary) {
            return Err(self.abort(format!("failed to write new binary: {e}")));
        }
        self.state = ReplaceState::Written;
        tracing::info!(
            "Wrote {} bytes to {}",
            new_binary.len(),
            self.target.display()
        );
        Ok(())
    }

    fn write_target(&self, new_binary: &[u8]) -> std::io::Result<()> {
        fs::write(&self.target, new_binary)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.target, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }

    /// Starts the new binary. Restores the original on failure.
    pub fn relaunch(&mut self, relauncher: &dyn Relauncher) -> Result<()> {
        if self.state != ReplaceState::Written {
            return Err(InstallError::SelfUpdate(
                "new binary has not been written".to_string(),
            ));
        }
        if let Err(e) = relauncher.relaunch(&self.target) {
            return Err(self.abort(format!("failed to launch new version: {e}")));
        }
        self.state = ReplaceState::Relaunched;
        Ok(())
    }

    /// Puts the stashed original back at the target path.
    pub fn restore(&mut self) -> Result<()> {
        if self.target.exists() {
            let _ = fs::remove_file(&self.target);
        }
        move_file(&self.stash, &self.target).map_err(|e| {
            InstallError::SelfUpdate(format!("failed to restore previous version: {e}"))
        })?;
        self.state = ReplaceState::Restored;
        tracing::info!("Restored previous version at {}", self.target.display());
        Ok(())
    }

    fn abort(&mut self, reason: String) -> InstallError {
        tracing::error!("{}; restoring previous version", reason);
        match self.restore() {
            Ok(()) => InstallError::SelfUpdate(reason),
            Err(restore) => InstallError::SelfUpdate(format!("{reason} ({restore})")),
        }
    }
}

/// Replaces `target` with `new_binary` and relaunches it.
///
/// The original is stashed below `temp_dir` and restored on failure.
pub fn replace_and_relaunch(
    target: &Path,
    new_binary: &[u8],
    temp_dir: &Path,
    relauncher: &dyn Relauncher,
) -> Result<ReplaceState> {
    let mut transaction = SelfReplace::begin_with_stash(target, &stash_path_for(temp_dir, target))?;
    transaction.write(new_binary)?;
    transaction.relaunch(relauncher)?;
    Ok(transaction.state())
}

//! Installer settings.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InstallError, Result};
use crate::process::default_target_process;

/// Hours between automatic self-update checks.
pub const UPDATE_CHECK_INTERVAL_HOURS: i64 = 24;

/// Settings read from a JSON file. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Product name used in asset file names.
    pub product: String,

    /// Owner of the product and installer repositories.
    pub repo_owner: String,

    /// Repository publishing product releases.
    pub repo_name: String,

    /// Repository publishing installer releases.
    pub installer_repo: String,

    /// Executable name of the application to stop and restart.
    pub target_process: String,

    /// Install root. Detected when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// Whether the installer looks for a newer version of itself.
    pub check_for_updates: bool,

    /// Whether a found installer update is applied without asking.
    pub auto_install_updates: bool,

    /// Fail the install when any archive entry could not be extracted.
    pub strict_extraction: bool,

    /// Install assets that carry no digest instead of refusing them.
    pub allow_unverified: bool,

    /// Last time we checked for installer updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_check: Option<DateTime<Utc>>,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            product: crate::PRODUCT.to_string(),
            repo_owner: crate::REPO_OWNER.to_string(),
            repo_name: crate::REPO_NAME.to_string(),
            installer_repo: crate::INSTALLER_REPO.to_string(),
            target_process: default_target_process().to_string(),
            install_dir: None,
            check_for_updates: true,
            auto_install_updates: true,
            strict_extraction: false,
            allow_unverified: false,
            last_update_check: None,
        }
    }
}

impl InstallerSettings {
    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map_err(|e| InstallError::JsonParse(format!("{}: {e}", path.display())))
    }

    /// Writes settings to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The install root: the configured directory, else the detected Steam path.
    #[must_use]
    pub fn resolve_install_dir(&self) -> Option<PathBuf> {
        self.install_dir.clone().or_else(default_steam_path)
    }

    /// Returns true when an automatic installer update check is due.
    #[must_use]
    pub fn should_check_for_updates(&self) -> bool {
        self.should_check_for_updates_at(Utc::now())
    }

    /// Like [`should_check_for_updates`](Self::should_check_for_updates) at a fixed time.
    #[must_use]
    pub fn should_check_for_updates_at(&self, now: DateTime<Utc>) -> bool {
        if !self.check_for_updates {
            return false;
        }
        match self.last_update_check {
            None => true,
            Some(last) => now.signed_duration_since(last).num_hours() >= UPDATE_CHECK_INTERVAL_HOURS,
        }
    }

    /// Record that we just checked for updates.
    pub fn record_update_check(&mut self) {
        self.last_update_check = Some(Utc::now());
    }
}

/// The usual Steam location for this platform, if it can be derived.
///
/// On Linux this is `~/.steam/steam`. Windows keeps the path in the registry,
/// so it has to be configured there.
#[must_use]
pub fn default_steam_path() -> Option<PathBuf> {
    if cfg!(windows) {
        return None;
    }
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".steam").join("steam"))
}

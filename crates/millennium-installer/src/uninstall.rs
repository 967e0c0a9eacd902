//! Removable components of an installation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Progress of one component through an uninstall.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ComponentState {
    /// Not touched yet.
    #[default]
    Idle,
    /// Queued or being removed.
    Uninstalling,
    /// All paths are gone.
    Success,
    /// A path could not be removed. Holds the OS error message.
    Failed(String),
}

impl ComponentState {
    /// Returns true for `Success` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed(_))
    }

    /// Short label for display.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Uninstalling => "Uninstalling",
            Self::Success => "Removed",
            Self::Failed(_) => "Failed",
        }
    }
}

/// A named, user-selectable group of installed paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Display name.
    pub name: String,
    /// Paths that existed when the component was built.
    pub paths: Vec<PathBuf>,
    /// Combined size of all paths, in bytes.
    pub total_size: u64,
    /// Whether the component will be removed.
    pub selected: bool,
    /// Uninstall progress.
    pub state: ComponentState,
}

impl Component {
    /// Builds a selected component from candidate paths.
    ///
    /// Sizes are accumulated eagerly; candidates that do not exist are dropped,
    /// so an empty `paths` means the component is already gone.
    pub fn new(name: impl Into<String>, candidates: impl IntoIterator<Item = PathBuf>) -> Self {
        let candidates: Vec<PathBuf> = candidates.into_iter().collect();
        let total_size = candidates.iter().map(|path| dir_size(path)).sum();
        let paths = candidates
            .into_iter()
            .filter(|path| path.symlink_metadata().is_ok())
            .collect();
        Self {
            name: name.into(),
            paths,
            total_size,
            selected: true,
            state: ComponentState::Idle,
        }
    }

    /// Returns true when at least one path is still present.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        !self.paths.is_empty()
    }
}

/// Recursive size of a file or directory. Unreadable entries count as zero.
#[must_use]
pub fn dir_size(path: &Path) -> u64 {
    let Ok(metadata) = path.symlink_metadata() else {
        return 0;
    };
    if !metadata.is_dir() {
        return metadata.len();
    }
    fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| dir_size(&entry.path()))
                .sum()
        })
        .unwrap_or(0)
}

/// The components a Millennium installation consists of, in display order.
#[must_use]
pub fn default_components(steam_root: &Path) -> Vec<Component> {
    let ext = steam_root.join("ext");
    let data = ext.join("data");
    vec![
        Component::new(
            "Millennium",
            [
                steam_root.join("user32.dll"),
                steam_root.join("version.dll"),
                ext.join("compat32").join("millennium_x86.dll"),
                ext.join("compat32").join("python311.dll"),
                ext.join("compat64").join("millennium_x64.dll"),
                ext.join("compat64").join("python311.dll"),
                steam_root.join("millennium.hhx64.dll"),
                steam_root.join("millennium.dll"),
                steam_root.join("python311.dll"),
            ],
        ),
        Component::new(
            "Custom Steam Components",
            [data.join("assets"), data.join("shims")],
        ),
        Component::new("Dependencies", [data.join("cache"), data.join("pyx64")]),
        Component::new("Themes", [steam_root.join("steamui").join("skins")]),
        Component::new("Plugins", [steam_root.join("plugins")]),
    ]
}

fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match path.symlink_metadata() {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Removes every path of `component` and records the outcome in its state.
///
/// All paths are attempted; the first error decides the failure message.
pub fn uninstall_component(component: &mut Component) {
    if component.paths.is_empty() {
        tracing::debug!("{} is already removed", component.name);
        component.state = ComponentState::Success;
        return;
    }

    let mut first_error = None;
    for path in &component.paths {
        match remove_path(path) {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) => {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
                first_error.get_or_insert_with(|| format!("{}: {e}", path.display()));
            }
        }
    }

    component.state = match first_error {
        Some(message) => ComponentState::Failed(message),
        None => ComponentState::Success,
    };
}

/// Bytes freed by removing the selected components.
#[must_use]
pub fn reclaimed_space(components: &[Component]) -> u64 {
    components
        .iter()
        .filter(|component| component.selected)
        .map(|component| component.total_size)
        .sum()
}

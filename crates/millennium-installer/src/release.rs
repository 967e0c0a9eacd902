//! Release selection and per-platform asset matching.

use crate::error::{InstallError, Result};
use crate::github::types::{Asset, Release};

/// Operating system and architecture names used in asset file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// OS name as it appears in asset names ("windows", "linux").
    pub os: &'static str,
    /// Architecture name ("x86_64", "aarch64").
    pub arch: &'static str,
    /// Archive extension for release payloads, without the leading dot.
    pub archive_ext: &'static str,
}

impl Platform {
    /// Windows on x86_64.
    pub const WINDOWS_X86_64: Self = Self {
        os: "windows",
        arch: "x86_64",
        archive_ext: "zip",
    };

    /// Linux on x86_64.
    pub const LINUX_X86_64: Self = Self {
        os: "linux",
        arch: "x86_64",
        archive_ext: "tar.gz",
    };

    /// The platform this binary was built for.
    #[must_use]
    pub fn current() -> Self {
        let os = std::env::consts::OS;
        let archive_ext = if os == "windows" { "zip" } else { "tar.gz" };
        Self {
            os,
            arch: std::env::consts::ARCH,
            archive_ext,
        }
    }

    /// Returns true for Windows.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Name of the release payload, e.g. `millennium-v2.17.0-windows-x86_64.zip`.
    #[must_use]
    pub fn asset_name(&self, product: &str, tag: &str) -> String {
        format!(
            "{product}-{tag}-{}-{}.{}",
            self.os, self.arch, self.archive_ext
        )
    }

    /// Name of the sidecar holding the installed size of the payload.
    #[must_use]
    pub fn install_size_name(&self, product: &str, tag: &str) -> String {
        format!("{product}-{tag}-{}-{}.installsize", self.os, self.arch)
    }

    /// Finds the self-update binary among a release's assets.
    ///
    /// On Windows this is the first `.exe`; elsewhere the first non-sidecar
    /// asset whose name mentions `<os>-<arch>`.
    #[must_use]
    pub fn find_installer_asset<'a>(&self, release: &'a Release) -> Option<&'a Asset> {
        let mut uploaded = release.assets.iter().filter(|asset| asset.is_uploaded());
        if self.is_windows() {
            return uploaded.find(|asset| asset.name.to_lowercase().contains(".exe"));
        }
        let marker = format!("{}-{}", self.os, self.arch);
        uploaded.find(|asset| {
            asset.name.contains(&marker)
                && !asset.name.ends_with(".installsize")
                && !asset.name.ends_with(".sha256")
        })
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Picks the newest stable release, or the first release when all are pre-releases.
///
/// `releases` is expected newest first, as GitHub returns them. Drafts are ignored.
#[must_use]
pub fn select_default_release(releases: &[Release]) -> Option<usize> {
    let published = || releases.iter().enumerate().filter(|(_, r)| !r.draft);
    published()
        .find(|(_, release)| !release.prerelease)
        .or_else(|| published().next())
        .map(|(index, _)| index)
}

/// All fetched releases plus the one the user is about to install.
#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    releases: Vec<Release>,
    selected: usize,
    latest: usize,
}

impl ReleaseCatalog {
    /// Builds a catalog, selecting the default release.
    pub fn new(releases: Vec<Release>) -> Result<Self> {
        let latest = select_default_release(&releases)
            .ok_or_else(|| InstallError::NoReleases("the release feed".to_string()))?;
        Ok(Self {
            releases,
            selected: latest,
            latest,
        })
    }

    /// All releases, newest first.
    #[must_use]
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// The release currently selected for installation.
    #[must_use]
    pub fn selected(&self) -> &Release {
        &self.releases[self.selected]
    }

    /// The default ("latest") release.
    #[must_use]
    pub fn latest(&self) -> &Release {
        &self.releases[self.latest]
    }

    /// Returns true when `tag` is the default release.
    #[must_use]
    pub fn is_latest(&self, tag: &str) -> bool {
        self.latest().tag_name == tag
    }

    /// Selects the release tagged `tag`. Leaves the selection unchanged when absent.
    pub fn select(&mut self, tag: &str) -> Result<&Release> {
        let index = self
            .releases
            .iter()
            .position(|release| release.tag_name == tag && !release.draft)
            .ok_or_else(|| InstallError::NoReleases(format!("tag {tag}")))?;
        self.selected = index;
        Ok(self.selected())
    }

    /// The payload asset of the selected release for `platform`.
    pub fn selected_asset(&self, product: &str, platform: &Platform) -> Result<&Asset> {
        let release = self.selected();
        let name = platform.asset_name(product, &release.tag_name);
        release
            .find_asset(&name)
            .ok_or(InstallError::NoAssetFound(name))
    }

    /// The `.installsize` sidecar of the selected release, if published.
    #[must_use]
    pub fn selected_install_size_asset(&self, product: &str, platform: &Platform) -> Option<&Asset> {
        let release = self.selected();
        release.find_asset(&platform.install_size_name(product, &release.tag_name))
    }
}

/// Parses the body of an `.installsize` sidecar.
#[must_use]
pub fn parse_install_size(body: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(body).ok()?.trim();
    text.parse::<u64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

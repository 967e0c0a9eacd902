//! GitHub API types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::verify::strip_digest_prefix;
use crate::version::Version;

/// Release data from the GitHub releases endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Release {
    /// The release tag name (e.g., "v2.17.0").
    pub tag_name: String,

    /// The release title.
    #[serde(default)]
    pub name: Option<String>,

    /// Whether this is a pre-release.
    #[serde(default)]
    pub prerelease: bool,

    /// Whether this is a draft release.
    #[serde(default)]
    pub draft: bool,

    /// Publication timestamp.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    /// HTML URL to the release page.
    #[serde(default)]
    pub html_url: String,

    /// Release assets.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    /// Parses the tag as a version.
    pub fn version(&self) -> Result<Version> {
        Version::from_tag(&self.tag_name)
    }

    /// Returns the release title, falling back to the tag.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.tag_name)
    }

    /// Finds an uploaded asset by exact file name.
    #[must_use]
    pub fn find_asset(&self, name: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|asset| asset.name == name && asset.is_uploaded())
    }
}

/// Release asset data from the GitHub API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    /// Asset file name (e.g., "millennium-v2.17.0-windows-x86_64.zip").
    pub name: String,

    /// File size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Direct download URL.
    pub browser_download_url: String,

    /// Digest in the form "sha256:<hex>". Null until GitHub computes it.
    #[serde(default)]
    pub digest: Option<String>,

    /// Upload state: "uploaded" (complete) or "open" (still uploading).
    #[serde(default = "default_state")]
    pub state: String,
}

fn default_state() -> String {
    "uploaded".to_string()
}

impl Asset {
    /// Returns whether this asset is fully uploaded.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.state == "uploaded"
    }

    /// Returns the hex SHA256 from the digest field, if present.
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .filter(|d| d.starts_with("sha256:") || !d.contains(':'))
            .and_then(strip_digest_prefix)
    }
}

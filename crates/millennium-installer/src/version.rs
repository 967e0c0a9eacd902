//! Semantic versioning for release tags.
//!
//! Handles tags such as "v2.17.0", "V1.0.0-beta.2" and "1.2.3+build.5", and
//! orders them by semantic-version precedence.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{InstallError, Result};

/// One dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Purely numeric identifier, compared numerically.
    Numeric(u64),
    /// Identifier containing letters or hyphens, compared lexically.
    AlphaNumeric(String),
}

impl Identifier {
    fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return None;
        }
        Some(match s.parse::<u64>() {
            Ok(n) => Self::Numeric(n),
            Err(_) => Self::AlphaNumeric(s.to_string()),
        })
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::AlphaNumeric(_)) => Ordering::Less,
            (Self::AlphaNumeric(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::AlphaNumeric(a), Self::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::AlphaNumeric(s) => write!(f, "{s}"),
        }
    }
}

/// A semantic version. Build metadata is accepted but ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    /// Major version number.
    pub major: u64,
    /// Minor version number.
    pub minor: u64,
    /// Patch version number.
    pub patch: u64,
    /// Pre-release identifiers; empty for a stable release.
    pub pre_release: Vec<Identifier>,
}

impl Version {
    /// Create a new stable version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: Vec::new(),
        }
    }

    /// Check if this version is a pre-release.
    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// Parse a version from a release tag, accepting a leading `v` or `V`.
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::from_str(tag)
    }
}

/// Strips one leading `v` or `V` from a tag.
#[must_use]
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Returns true when `latest_tag` is strictly newer than `current`.
pub fn is_update_available(current: &str, latest_tag: &str) -> Result<bool> {
    let current = Version::from_tag(current)?;
    let latest = Version::from_tag(latest_tag)?;
    Ok(latest > current)
}

impl FromStr for Version {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || InstallError::InvalidVersion(s.to_string());
        let core = normalize_tag(s);
        let core = core.split_once('+').map_or(core, |(version, _build)| version);

        let (numbers, pre) = match core.split_once('-') {
            Some((numbers, pre)) => (numbers, Some(pre)),
            None => (core, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let parse_part = |part: &str| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u64>().map_err(|_| invalid())
        };

        let pre_release = match pre {
            Some(pre) => pre
                .split('.')
                .map(Identifier::parse)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?,
            None => Vec::new(),
        };

        Ok(Self {
            major: parse_part(parts[0])?,
            minor: parse_part(parts[1])?,
            patch: parse_part(parts[2])?,
            pre_release,
        })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.is_pre_release(), other.is_pre_release()) {
                (false, false) => Ordering::Equal,
                (false, true) => Ordering::Greater,
                (true, false) => Ordering::Less,
                (true, true) => self.pre_release.cmp(&other.pre_release),
            })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some((first, rest)) = self.pre_release.split_first() {
            write!(f, "-{first}")?;
            for id in rest {
                write!(f, ".{id}")?;
            }
        }
        Ok(())
    }
}

//! Error types for the installer pipeline.

use thiserror::Error;

/// Errors that can occur while installing, uninstalling or self-updating.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// Network request failed or returned nothing.
    #[error("network error: {0}")]
    Network(String),

    /// GitHub API rate limit exceeded.
    #[error("GitHub API rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited {
        /// Seconds until the rate limit resets.
        retry_after: u64,
    },

    /// Release metadata could not be parsed.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// The release endpoint returned no releases.
    #[error("no releases published for {0}")]
    NoReleases(String),

    /// No release asset matches the current platform.
    #[error("no release asset named {0}")]
    NoAssetFound(String),

    /// The selected asset carries no digest to verify against.
    #[error("no digest available for {0}")]
    NoDigestAvailable(String),

    /// SHA256 verification of a downloaded file failed.
    #[error("checksum verification failed: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected digest from the release metadata.
        expected: String,
        /// Digest of the file on disk.
        actual: String,
    },

    /// The archive could not be opened or read.
    #[error("archive extraction error: {0}")]
    ArchiveExtraction(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Terminating or launching a process failed.
    #[error("process error: {0}")]
    Process(String),

    /// Replacing the installer executable failed.
    #[error("self-update error: {0}")]
    SelfUpdate(String),

    /// A version string could not be parsed.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    /// Another flow is still running.
    #[error("another {0} is already running")]
    Busy(&'static str),
}

impl InstallError {
    /// Returns a short message suitable for display in the UI.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network(_) => {
                "Failed to reach GitHub. Make sure you have a valid internet connection."
            }
            Self::RateLimited { .. } => "GitHub API rate limit reached. Please try again later.",
            Self::JsonParse(_) => {
                "Failed to parse version information. You are likely rate limited, try again shortly."
            }
            Self::NoReleases(_) | Self::NoAssetFound(_) => {
                "No release is available for your platform."
            }
            Self::NoDigestAvailable(_) | Self::ChecksumMismatch { .. } => {
                "Security verification failed. The download may have been tampered with."
            }
            Self::ArchiveExtraction(_) => "Could not extract the release archive.",
            Self::Process(_) => "Could not stop or start the target application.",
            Self::SelfUpdate(_) => "Could not update the installer. The previous version was kept.",
            Self::Busy(_) => "Please wait for the current operation to finish.",
            Self::InvalidVersion(_) | Self::Io(_) => "An unexpected error occurred.",
        }
    }

    /// Returns whether retrying the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Io(_) | Self::Busy(_)
        )
    }
}

impl From<reqwest::Error> for InstallError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<std::io::Error> for InstallError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for InstallError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

impl From<zip::result::ZipError> for InstallError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveExtraction(err.to_string())
    }
}

/// Result type alias for installer operations.
pub type Result<T> = std::result::Result<T, InstallError>;

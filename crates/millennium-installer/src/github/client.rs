//! Paginated access to a repository's release list.

use std::sync::Arc;

use super::types::{Asset, Release};
use crate::error::{InstallError, Result};
use crate::http::HttpClient;
use crate::release::parse_install_size;

/// GitHub API base URL.
const GITHUB_API_URL: &str = "https://api.github.com";

/// Releases requested per page.
const PER_PAGE: u32 = 100;

/// Reads releases of one repository through an [`HttpClient`].
#[derive(Clone)]
pub struct ReleaseClient {
    http: Arc<dyn HttpClient>,
    owner: String,
    repo: String,
}

impl std::fmt::Debug for ReleaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseClient")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl ReleaseClient {
    /// Creates a client for `owner/repo`.
    ///
    /// # Arguments
    /// * `owner` - The repository owner (e.g., "SteamClientHomebrew")
    /// * `repo` - The repository name (e.g., "Millennium")
    pub fn new(http: Arc<dyn HttpClient>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            http,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// The `owner/repo` slug.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// URL of one page of the release list.
    #[must_use]
    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}/repos/{}/{}/releases?per_page={}&page={}",
            GITHUB_API_URL, self.owner, self.repo, PER_PAGE, page
        )
    }

    /// Fetches every release, newest first.
    ///
    /// Pages are requested until one comes back empty. A failure on the first
    /// page is an error; a failure on a later page ends the listing with the
    /// releases gathered so far.
    pub fn fetch_releases(&self) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        let mut page = 1;

        loop {
            let url = self.page_url(page);
            tracing::debug!("Fetching releases from {}", url);

            let body = match self.http.get(&url) {
                Ok(body) => body,
                Err(e) if page > 1 => {
                    tracing::warn!("Stopping release listing at page {}: {}", page, e);
                    break;
                }
                Err(e) => return Err(e),
            };

            let batch: Vec<Release> = serde_json::from_slice(&body)
                .map_err(|e| InstallError::JsonParse(format!("{} page {page}: {e}", self.slug())))?;
            if batch.is_empty() {
                break;
            }
            let full_page = batch.len() >= PER_PAGE as usize;
            releases.extend(batch);
            if !full_page {
                break;
            }
            page += 1;
        }

        tracing::info!("Fetched {} releases of {}", releases.len(), self.slug());
        if releases.is_empty() {
            return Err(InstallError::NoReleases(self.slug()));
        }
        Ok(releases)
    }

    /// Reads an `.installsize` sidecar. Any failure yields `None`.
    #[must_use]
    pub fn fetch_install_size(&self, asset: &Asset) -> Option<u64> {
        match self.http.get(&asset.browser_download_url) {
            Ok(body) => parse_install_size(&body),
            Err(e) => {
                tracing::debug!("No install size for {}: {}", asset.name, e);
                None
            }
        }
    }
}

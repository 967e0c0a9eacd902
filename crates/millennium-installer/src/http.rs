//! Blocking HTTP access used by the pipeline.
//!
//! The pipeline only needs two operations, so they sit behind [`HttpClient`]
//! and tests can serve releases and archives from memory.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;

use crate::error::{InstallError, Result};

/// User agent string for every request.
const USER_AGENT_VALUE: &str = concat!(
    "millennium-installer/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/SteamClientHomebrew/Installer)"
);

/// Chunk size while streaming a download to disk.
const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Connection timeout for all requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches bytes and streams downloads. Calls block the current thread.
pub trait HttpClient: Send + Sync {
    /// Fetches the body at `url`. An empty body is an error.
    fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Streams `url` into `dest`, calling `on_progress(downloaded, total)` per chunk.
    ///
    /// `expected_size` is used as the total when the server sends no length.
    /// A partially written file is removed on failure.
    fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        on_progress: &mut dyn FnMut(u64, u64),
        follow_redirects: bool,
    ) -> Result<()>;
}

/// [`HttpClient`] backed by `reqwest`'s blocking client.
///
/// API requests carry GitHub's JSON headers; asset downloads only send a
/// user agent.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    api_client: Client,
    download_client: Client,
    no_redirect_download_client: Client,
}

impl ReqwestClient {
    /// Creates the API and download clients.
    pub fn new() -> Result<Self> {
        Ok(Self {
            api_client: build_client(api_headers(), Policy::default())?,
            download_client: build_client(download_headers(), Policy::default())?,
            no_redirect_download_client: build_client(download_headers(), Policy::none())?,
        })
    }

    fn send(client: &Client, url: &str) -> Result<Response> {
        tracing::debug!("GET {}", url);
        let response = client.get(url).send()?;
        check_status(response)
    }
}

/// Headers for GitHub REST API requests.
fn api_headers() -> HeaderMap {
    let mut headers = download_headers();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        "X-GitHub-Api-Version",
        HeaderValue::from_static("2022-11-28"),
    );
    headers
}

/// Headers for release asset downloads.
fn download_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers
}

fn build_client(headers: HeaderMap, policy: Policy) -> Result<Client> {
    Client::builder()
        .default_headers(headers)
        .redirect(policy)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| InstallError::Network(format!("failed to create HTTP client: {e}")))
}

/// Maps error statuses, including GitHub rate limiting, to [`InstallError`].
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if status == reqwest::StatusCode::FORBIDDEN
        && response
            .headers()
            .get("x-ratelimit-remaining")
            .is_some_and(|remaining| remaining.to_str().unwrap_or("1") == "0")
    {
        let retry_after = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(|reset| (reset - chrono::Utc::now().timestamp()).max(0) as u64)
            .unwrap_or(60);

        return Err(InstallError::RateLimited { retry_after });
    }

    if !status.is_success() {
        return Err(InstallError::Network(format!(
            "{} returned {}",
            response.url(),
            status
        )));
    }

    Ok(response)
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let body = Self::send(&self.api_client, url)?.bytes()?;
        if body.is_empty() {
            return Err(InstallError::Network(format!("empty response from {url}")));
        }
        Ok(body.to_vec())
    }

    fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        on_progress: &mut dyn FnMut(u64, u64),
        follow_redirects: bool,
    ) -> Result<()> {
        let client = if follow_redirects {
            &self.download_client
        } else {
            &self.no_redirect_download_client
        };
        let mut response = Self::send(client, url)?;
        let total = response
            .content_length()
            .filter(|len| *len > 0)
            .unwrap_or(expected_size);

        let result = stream_to_file(&mut response, dest, total, on_progress);
        if result.is_err() {
            let _ = fs::remove_file(dest);
        }
        let downloaded = result?;

        if downloaded == 0 {
            let _ = fs::remove_file(dest);
            return Err(InstallError::Network(format!("empty download from {url}")));
        }
        tracing::info!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(())
    }
}

/// Copies `reader` into a new file at `dest`, returning the byte count.
pub(crate) fn stream_to_file(
    reader: &mut dyn Read,
    dest: &Path,
    total: u64,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(dest)?;
    let mut buffer = vec![0u8; DOWNLOAD_CHUNK_SIZE];
    let mut downloaded = 0u64;

    on_progress(0, total);
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(InstallError::Network(format!("download interrupted: {e}"))),
        };
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        on_progress(downloaded, total.max(downloaded));
    }
    file.flush()?;
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(ReqwestClient::new().is_ok());
    }

    #[test]
    fn test_download_headers_omit_api_headers() {
        let download = download_headers();
        assert_eq!(download.len(), 1);
        assert_eq!(download.get(USER_AGENT).unwrap(), USER_AGENT_VALUE);
        assert!(download.get(ACCEPT).is_none());
        assert!(download.get("X-GitHub-Api-Version").is_none());

        let api = api_headers();
        assert_eq!(api.get(ACCEPT).unwrap(), "application/vnd.github+json");
        assert_eq!(api.get("X-GitHub-Api-Version").unwrap(), "2022-11-28");
        assert_eq!(api.get(USER_AGENT).unwrap(), USER_AGENT_VALUE);
    }

    #[test]
    fn test_stream_to_file_reports_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("nested/asset.zip");
        let data = vec![1u8; DOWNLOAD_CHUNK_SIZE + 10];
        let mut calls = Vec::new();

        let written = stream_to_file(
            &mut data.as_slice(),
            &dest,
            data.len() as u64,
            &mut |done, total| calls.push((done, total)),
        )
        .unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), data);
        assert_eq!(calls.first(), Some(&(0, data.len() as u64)));
        assert_eq!(calls.last(), Some(&(data.len() as u64, data.len() as u64)));
    }

    #[test]
    fn test_stream_to_file_grows_unknown_total() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("asset.bin");
        let mut calls = Vec::new();

        stream_to_file(&mut &b"abcdef"[..], &dest, 0, &mut |done, total| {
            calls.push((done, total));
        })
        .unwrap();

        assert_eq!(calls.last(), Some(&(6, 6)));
    }
}

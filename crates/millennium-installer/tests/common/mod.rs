//! Shared fixtures: an in-memory HTTP client and archive builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use millennium_installer::{HttpClient, InstallError, InstallerSettings, Orchestrator, Platform, Result};
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;

/// Serves fixed bodies by URL and records every request.
#[derive(Default)]
pub struct FakeHttp {
    bodies: HashMap<String, Vec<u8>>,
    gate: Mutex<Option<Receiver<()>>>,
    pub requests: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Makes the next download block until `gate` receives a message.
    pub fn gated(self, gate: Receiver<()>) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl HttpClient for FakeHttp {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| InstallError::Network(format!("empty response from {url}")))
    }

    fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        on_progress: &mut dyn FnMut(u64, u64),
        _follow_redirects: bool,
    ) -> Result<()> {
        self.downloads.lock().unwrap().push(url.to_string());
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.recv().ok();
        }
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| InstallError::Network(format!("empty download from {url}")))?;
        let total = expected_size.max(body.len() as u64);
        on_progress(0, total);
        let half = body.len() / 2;
        fs::write(dest, body)?;
        on_progress(half as u64, total);
        on_progress(body.len() as u64, total);
        Ok(())
    }
}

pub fn releases_url(owner: &str, repo: &str) -> String {
    format!("https://api.github.com/repos/{owner}/{repo}/releases?per_page=100&page=1")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// JSON for one release with `(name, url, digest)` assets.
pub fn release_json(tag: &str, prerelease: bool, assets: &[(&str, &str, Option<String>)]) -> String {
    let assets: Vec<String> = assets
        .iter()
        .map(|(name, url, digest)| {
            let digest = digest
                .as_ref()
                .map_or_else(|| "null".to_string(), |d| format!("\"{d}\""));
            format!(
                r#"{{"name": "{name}", "size": 0, "browser_download_url": "{url}", "digest": {digest}, "state": "uploaded"}}"#
            )
        })
        .collect();
    format!(
        r#"{{"tag_name": "{tag}", "prerelease": {prerelease}, "draft": false, "published_at": "2025-06-01T12:00:00Z", "assets": [{}]}}"#,
        assets.join(",")
    )
}

pub fn release_list(releases: &[String]) -> Vec<u8> {
    format!("[{}]", releases.join(",")).into_bytes()
}

/// Builds a zip archive from `(path, contents)` pairs; `None` marks a directory.
pub fn build_zip(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, contents) in entries {
        match contents {
            None => writer.add_directory(*path, options).unwrap(),
            Some(data) => {
                writer.start_file(*path, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Settings that never match a real process.
pub fn test_settings() -> InstallerSettings {
    InstallerSettings {
        target_process: "millennium-test-target-7c1e".to_string(),
        ..InstallerSettings::default()
    }
}

pub fn orchestrator(http: Arc<FakeHttp>, temp_dir: &Path) -> Orchestrator {
    Orchestrator::new(http, test_settings())
        .with_platform(Platform::WINDOWS_X86_64)
        .with_temp_dir(temp_dir)
}

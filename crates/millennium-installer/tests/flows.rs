//! End-to-end runs of the install, uninstall and self-update flows.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::{
    FakeHttp, build_zip, orchestrator, release_json, release_list, releases_url, sha256_hex,
};
use millennium_installer::process::{ProcessControl, Termination};
use millennium_installer::self_replace::{Relauncher, stash_path_for};
use millennium_installer::{
    Component, ComponentState, Flow, InstallError, Phase, Result, SelfUpdateOutcome,
};

const ASSET_URL: &str = "https://example.com/millennium-v2.17.0-windows-x86_64.zip";
const ASSET_NAME: &str = "millennium-v2.17.0-windows-x86_64.zip";

fn millennium_http(archive: &[u8], digest: Option<String>) -> FakeHttp {
    let releases = release_list(&[
        release_json("v2.18.0-beta.1", true, &[]),
        release_json("v2.17.0", false, &[(ASSET_NAME, ASSET_URL, digest)]),
    ]);
    FakeHttp::new()
        .serve(releases_url("SteamClientHomebrew", "Millennium"), releases)
        .serve(ASSET_URL, archive.to_vec())
}

fn sample_archive() -> Vec<u8> {
    build_zip(&[
        ("ext/", None),
        ("ext/compat64/", None),
        ("ext/compat64/millennium_x64.dll", Some(b"sixty-four bit".as_slice())),
        ("millennium.dll", Some(b"core library".as_slice())),
        ("user32.dll", Some(&[])),
    ])
}

#[test]
fn install_extracts_verified_release() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let archive = sample_archive();
    let http = Arc::new(millennium_http(
        &archive,
        Some(format!("sha256:{}", sha256_hex(&archive))),
    ));

    let mut orchestrator = orchestrator(Arc::clone(&http), temp.path());
    let catalog = orchestrator.fetch_catalog().unwrap();
    assert_eq!(catalog.selected().tag_name, "v2.17.0");

    let plan = orchestrator.plan_install(&catalog, steam.path()).unwrap();
    assert_eq!(plan.download_path, temp.path().join(ASSET_NAME));
    orchestrator.start_install(plan).unwrap();

    let status = orchestrator.wait().unwrap();
    assert_eq!(status.flow, Flow::Install);
    assert_eq!(status.phase, Phase::Complete);
    assert_eq!(status.snapshot.progress, 1.0);
    assert_eq!(status.snapshot.step_count, 4);

    assert_eq!(
        fs::read(steam.path().join("ext/compat64/millennium_x64.dll")).unwrap(),
        b"sixty-four bit"
    );
    assert_eq!(fs::read(steam.path().join("millennium.dll")).unwrap(), b"core library");
    assert!(steam.path().join("user32.dll").is_file());
    assert!(!temp.path().join(ASSET_NAME).exists());
}

#[test]
fn install_overwrites_existing_files() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    fs::write(steam.path().join("millennium.dll"), b"previous version, longer").unwrap();
    let archive = sample_archive();
    let http = Arc::new(millennium_http(
        &archive,
        Some(format!("sha256:{}", sha256_hex(&archive))),
    ));

    let mut orchestrator = orchestrator(http, temp.path());
    let catalog = orchestrator.fetch_catalog().unwrap();
    let plan = orchestrator.plan_install(&catalog, steam.path()).unwrap();
    orchestrator.start_install(plan).unwrap();

    assert_eq!(orchestrator.wait().unwrap().phase, Phase::Complete);
    assert_eq!(fs::read(steam.path().join("millennium.dll")).unwrap(), b"core library");
}

#[test]
fn checksum_mismatch_stops_before_extraction() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let archive = sample_archive();
    let http = Arc::new(millennium_http(
        &archive,
        Some(format!("sha256:{}", sha256_hex(b"something else"))),
    ));

    let mut orchestrator = orchestrator(http, temp.path());
    let catalog = orchestrator.fetch_catalog().unwrap();
    let plan = orchestrator.plan_install(&catalog, steam.path()).unwrap();
    orchestrator.start_install(plan).unwrap();

    let status = orchestrator.wait().unwrap();
    assert!(status.snapshot.failed);
    assert_eq!(status.snapshot.step, 3);
    match status.phase {
        Phase::Failed(reason) => assert!(reason.contains("checksum verification failed")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(fs::read_dir(steam.path()).unwrap().count(), 0);
    assert!(!temp.path().join(ASSET_NAME).exists());
}

/// A target process that refuses to be killed.
struct StubbornTarget;

impl ProcessControl for StubbornTarget {
    fn terminate_by_name(&self, _name: &str) -> Termination {
        Termination {
            signalled: Vec::new(),
            refused: vec![1234],
        }
    }

    fn is_running(&self, _name: &str) -> bool {
        true
    }
}

#[test]
fn surviving_target_stops_install_before_download() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let archive = sample_archive();
    let http = Arc::new(millennium_http(
        &archive,
        Some(format!("sha256:{}", sha256_hex(&archive))),
    ));

    let mut orchestrator =
        orchestrator(Arc::clone(&http), temp.path()).with_process_control(Arc::new(StubbornTarget));
    let catalog = orchestrator.fetch_catalog().unwrap();
    let plan = orchestrator.plan_install(&catalog, steam.path()).unwrap();
    orchestrator.start_install(plan).unwrap();

    let status = orchestrator.wait().unwrap();
    assert_eq!(status.snapshot.step, 1);
    match status.phase {
        Phase::Failed(reason) => {
            assert!(reason.contains("still running"));
            assert!(reason.contains("pid 1234"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(http.download_count(), 0);
    assert_eq!(fs::read_dir(steam.path()).unwrap().count(), 0);
}

#[test]
fn missing_digest_is_refused_unless_allowed() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let archive = sample_archive();
    let http = Arc::new(millennium_http(&archive, None));

    let mut orchestrator = orchestrator(Arc::clone(&http), temp.path());
    let catalog = orchestrator.fetch_catalog().unwrap();
    let plan = orchestrator.plan_install(&catalog, steam.path()).unwrap();
    orchestrator.start_install(plan).unwrap();
    let reason = orchestrator.wait().unwrap().snapshot.failure_reason.unwrap();
    assert!(reason.contains("no digest available"));

    let mut settings = common::test_settings();
    settings.allow_unverified = true;
    let mut lenient = millennium_installer::Orchestrator::new(http, settings)
        .with_platform(millennium_installer::Platform::WINDOWS_X86_64)
        .with_temp_dir(temp.path());
    let catalog = lenient.fetch_catalog().unwrap();
    let plan = lenient.plan_install(&catalog, steam.path()).unwrap();
    lenient.start_install(plan).unwrap();
    assert_eq!(lenient.wait().unwrap().phase, Phase::Complete);
    assert!(steam.path().join("millennium.dll").is_file());
}

#[test]
fn second_flow_is_rejected_while_busy() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let archive = sample_archive();
    let (release, gate) = std::sync::mpsc::channel();
    let http = Arc::new(
        millennium_http(&archive, Some(format!("sha256:{}", sha256_hex(&archive)))).gated(gate),
    );

    let mut orchestrator = orchestrator(http, temp.path());
    let catalog = orchestrator.fetch_catalog().unwrap();
    let plan = orchestrator.plan_install(&catalog, steam.path()).unwrap();
    orchestrator.start_install(plan).unwrap();
    assert!(orchestrator.is_busy());

    let err = orchestrator.start_uninstall(Vec::new()).unwrap_err();
    assert!(matches!(err, InstallError::Busy("install")));
    assert!(err.is_retryable());

    release.send(()).unwrap();
    assert_eq!(orchestrator.wait().unwrap().phase, Phase::Complete);
    assert!(!orchestrator.is_busy());
    orchestrator.start_uninstall(Vec::new()).unwrap();
    assert_eq!(orchestrator.wait().unwrap().flow, Flow::Uninstall);
}

fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn uninstall_continues_past_failed_component() {
    let steam = tempfile::tempdir().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let root = steam.path();
    write(&root.join("millennium.dll"), b"dll");
    write(&root.join("plugins/example/plugin.json"), b"{}");
    write(&root.join("steamui/skins/dark/theme.css"), b"body{}");
    write(&root.join("blocker"), b"x");

    let mut components = millennium_installer::default_components(root);
    let themes = components.iter().position(|c| c.name == "Themes").unwrap();
    components[themes].selected = false;
    components.insert(
        1,
        Component {
            name: "Broken".to_string(),
            paths: vec![root.join("blocker/child")],
            total_size: 0,
            selected: true,
            state: ComponentState::Idle,
        },
    );

    let http = Arc::new(FakeHttp::new());
    let mut orchestrator = orchestrator(http, temp.path());
    let shared = orchestrator.start_uninstall(components).unwrap();
    let status = orchestrator.wait().unwrap();
    assert_eq!(status.phase, Phase::Complete);

    let components = shared.lock().unwrap().clone();
    let state_of = |name: &str| {
        components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.state.clone())
            .unwrap()
    };
    assert_eq!(state_of("Millennium"), ComponentState::Success);
    assert_eq!(state_of("Plugins"), ComponentState::Success);
    assert_eq!(state_of("Dependencies"), ComponentState::Success);
    assert_eq!(state_of("Themes"), ComponentState::Idle);
    assert!(matches!(state_of("Broken"), ComponentState::Failed(msg) if !msg.is_empty()));

    assert!(!root.join("millennium.dll").exists());
    assert!(!root.join("plugins").exists());
    assert!(root.join("steamui/skins/dark/theme.css").exists());
    assert_eq!(orchestrator.components(), components);
}

#[derive(Default)]
struct RecordingRelauncher {
    launched: Mutex<Vec<PathBuf>>,
}

impl Relauncher for RecordingRelauncher {
    fn relaunch(&self, executable: &Path) -> Result<()> {
        self.launched.lock().unwrap().push(executable.to_path_buf());
        Ok(())
    }
}

const INSTALLER_URL: &str = "https://example.com/MillenniumInstaller-Windows.exe";

fn installer_http(tag: &str, binary: &[u8]) -> FakeHttp {
    let releases = release_list(&[release_json(
        tag,
        false,
        &[
            ("MillenniumInstaller-Linux", "https://example.com/linux", None),
            (
                "MillenniumInstaller-Windows.exe",
                INSTALLER_URL,
                Some(format!("sha256:{}", sha256_hex(binary))),
            ),
        ],
    )]);
    FakeHttp::new()
        .serve(releases_url("SteamClientHomebrew", "Installer"), releases)
        .serve(INSTALLER_URL, binary.to_vec())
}

#[test]
fn self_update_equal_version_is_a_no_op() {
    let temp = tempfile::tempdir().unwrap();
    let exe = temp.path().join("MillenniumInstaller.exe");
    fs::write(&exe, b"installer 1.2.0").unwrap();
    let http = Arc::new(installer_http("v1.2.0", b"installer 1.2.0 rebuilt"));
    let relauncher = Arc::new(RecordingRelauncher::default());

    let mut orchestrator = orchestrator(Arc::clone(&http), temp.path())
        .with_current_version("1.2.0")
        .with_current_exe(&exe)
        .with_relauncher(relauncher.clone());
    orchestrator.start_self_update().unwrap();

    let status = orchestrator.wait().unwrap();
    assert_eq!(status.phase, Phase::Complete);
    // Only the version check ran.
    assert_eq!(status.snapshot.step, 1);
    assert_eq!(status.snapshot.step_count, 4);
    assert_eq!(status.snapshot.status, "Installer is up to date");
    assert_eq!(
        orchestrator.self_update_outcome(),
        Some(SelfUpdateOutcome::UpToDate {
            current: "1.2.0".to_string(),
            latest: "v1.2.0".to_string(),
        })
    );
    assert_eq!(http.download_count(), 0);
    assert!(relauncher.launched.lock().unwrap().is_empty());
    assert_eq!(fs::read(&exe).unwrap(), b"installer 1.2.0");
}

#[test]
fn self_update_newer_version_replaces_and_relaunches() {
    let temp = tempfile::tempdir().unwrap();
    let exe = temp.path().join("MillenniumInstaller.exe");
    fs::write(&exe, b"installer 1.2.0").unwrap();
    let http = Arc::new(installer_http("v1.3.0", b"installer 1.3.0"));
    let relauncher = Arc::new(RecordingRelauncher::default());

    let mut orchestrator = orchestrator(Arc::clone(&http), temp.path())
        .with_current_version("1.2.0")
        .with_current_exe(&exe)
        .with_relauncher(relauncher.clone());
    orchestrator.start_self_update().unwrap();

    assert_eq!(orchestrator.wait().unwrap().phase, Phase::Complete);
    assert_eq!(
        orchestrator.self_update_outcome(),
        Some(SelfUpdateOutcome::Relaunched {
            version: "v1.3.0".to_string()
        })
    );
    assert_eq!(*http.downloads.lock().unwrap(), vec![INSTALLER_URL.to_string()]);
    assert_eq!(*relauncher.launched.lock().unwrap(), vec![exe.clone()]);
    assert_eq!(fs::read(&exe).unwrap(), b"installer 1.3.0");
    assert_eq!(
        fs::read(stash_path_for(temp.path(), &exe)).unwrap(),
        b"installer 1.2.0"
    );
}

struct FailingRelauncher;

impl Relauncher for FailingRelauncher {
    fn relaunch(&self, _executable: &Path) -> Result<()> {
        Err(InstallError::Process("access denied".to_string()))
    }
}

#[test]
fn self_update_restores_binary_when_relaunch_fails() {
    let temp = tempfile::tempdir().unwrap();
    let exe = temp.path().join("MillenniumInstaller.exe");
    fs::write(&exe, b"installer 1.2.0").unwrap();
    let http = Arc::new(installer_http("v1.3.0", b"installer 1.3.0"));

    let mut orchestrator = orchestrator(http, temp.path())
        .with_current_version("1.2.0")
        .with_current_exe(&exe)
        .with_relauncher(Arc::new(FailingRelauncher));
    orchestrator.start_self_update().unwrap();

    let status = orchestrator.wait().unwrap();
    assert_eq!(status.snapshot.step, 4);
    assert!(matches!(status.phase, Phase::Failed(ref reason) if reason.contains("access denied")));
    assert_eq!(orchestrator.self_update_outcome(), None);
    assert_eq!(fs::read(&exe).unwrap(), b"installer 1.2.0");
}

#[test]
fn update_check_reports_newer_installer_without_downloading() {
    let temp = tempfile::tempdir().unwrap();
    let http = Arc::new(installer_http("v1.3.0", b"installer 1.3.0"));

    let newer = orchestrator(Arc::clone(&http), temp.path()).with_current_version("1.2.0");
    assert_eq!(newer.check_self_update().unwrap(), Some("v1.3.0".to_string()));

    let current = orchestrator(Arc::clone(&http), temp.path()).with_current_version("v1.3.0");
    assert_eq!(current.check_self_update().unwrap(), None);
    assert_eq!(http.download_count(), 0);
}

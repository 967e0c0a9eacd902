//! Install, uninstall and self-update flows.
//!
//! The [`Orchestrator`] owns at most one running [`Scheduler`] at a time.
//! Starting a flow returns immediately; the caller polls [`Orchestrator::poll`]
//! once per frame until the returned status is terminal.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::InstallerSettings;
use crate::error::{InstallError, Result};
use crate::github::ReleaseClient;
use crate::github::types::Asset;
use crate::http::HttpClient;
use crate::process::{self, ProcessControl, SystemProcesses};
use crate::release::{Platform, ReleaseCatalog};
use crate::scheduler::{Scheduler, SchedulerHandle, Snapshot, TaskResult};
use crate::self_replace::{ProcessRelauncher, Relauncher};
use crate::steps;
use crate::uninstall::{Component, ComponentState, reclaimed_space, uninstall_component};
use crate::version::{Version, normalize_tag};

/// The three flows the orchestrator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Download, verify and extract a release.
    Install,
    /// Remove selected components.
    Uninstall,
    /// Replace the installer with its newest release.
    SelfUpdate,
}

impl Flow {
    /// Lowercase name used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::SelfUpdate => "self-update",
        }
    }

    /// Phase of each step, in step order.
    #[must_use]
    pub fn phases(self) -> &'static [Phase] {
        match self {
            Self::Install => INSTALL_PHASES,
            Self::Uninstall => UNINSTALL_PHASES,
            Self::SelfUpdate => SELF_UPDATE_PHASES,
        }
    }
}

const INSTALL_PHASES: &[Phase] = &[
    Phase::Terminating,
    Phase::Downloading,
    Phase::Verifying,
    Phase::Extracting,
];

const UNINSTALL_PHASES: &[Phase] = &[Phase::Terminating, Phase::Uninstalling];

const SELF_UPDATE_PHASES: &[Phase] = &[
    Phase::CheckingVersion,
    Phase::Downloading,
    Phase::Verifying,
    Phase::Replacing,
];

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a flow currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Started but no step has begun.
    Idle,
    /// Stopping the target application.
    Terminating,
    /// Downloading an asset.
    Downloading,
    /// Checking a download's digest.
    Verifying,
    /// Unpacking the archive.
    Extracting,
    /// Removing components.
    Uninstalling,
    /// Comparing the installer version with the newest release.
    CheckingVersion,
    /// Swapping and relaunching the installer binary.
    Replacing,
    /// Every step succeeded.
    Complete,
    /// A step failed with this reason.
    Failed(String),
}

impl Phase {
    fn of(flow: Flow, snapshot: &Snapshot) -> Self {
        if snapshot.failed {
            return Self::Failed(snapshot.failure_reason.clone().unwrap_or_default());
        }
        if snapshot.finished {
            return Self::Complete;
        }
        snapshot
            .step
            .checked_sub(1)
            .and_then(|index| flow.phases().get(index))
            .cloned()
            .unwrap_or(Self::Idle)
    }
}

/// What the poller sees each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStatus {
    /// The running flow.
    pub flow: Flow,
    /// Phase derived from the snapshot.
    pub phase: Phase,
    /// Raw scheduler snapshot.
    pub snapshot: Snapshot,
}

impl FlowStatus {
    /// Returns true once the flow completed or failed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.snapshot.is_done()
    }
}

/// Everything the install flow needs, resolved before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallPlan {
    /// Tag of the release being installed.
    pub tag: String,
    /// Archive asset for this platform.
    pub asset: Asset,
    /// Directory the archive is extracted into.
    pub install_dir: PathBuf,
    /// Where the archive is downloaded to.
    pub download_path: PathBuf,
}

/// Result of a self-update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    /// No newer installer exists.
    UpToDate {
        /// Running version.
        current: String,
        /// Newest published tag.
        latest: String,
    },
    /// The new installer was written and started.
    Relaunched {
        /// Tag of the started installer.
        version: String,
    },
}

#[derive(Debug, Clone)]
struct SelfUpdatePlan {
    tag: String,
    asset: Asset,
    download_path: PathBuf,
}

enum UpdateCheck {
    Available(SelfUpdatePlan),
    UpToDate(SelfUpdateOutcome),
}

/// Shared, mutex-guarded component list updated by the uninstall flow.
pub type SharedComponents = Arc<Mutex<Vec<Component>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveFlow {
    flow: Flow,
    handle: SchedulerHandle,
}

/// Runs one flow at a time on a background thread.
pub struct Orchestrator {
    http: Arc<dyn HttpClient>,
    settings: InstallerSettings,
    platform: Platform,
    relauncher: Arc<dyn Relauncher>,
    processes: Arc<dyn ProcessControl>,
    current_version: String,
    current_exe: Option<PathBuf>,
    temp_dir: PathBuf,
    active: Option<ActiveFlow>,
    components: SharedComponents,
    self_update: Arc<Mutex<Option<SelfUpdateOutcome>>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("platform", &self.platform)
            .field("current_version", &self.current_version)
            .field("temp_dir", &self.temp_dir)
            .field("active", &self.active.as_ref().map(|a| a.flow))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator for the running installer.
    pub fn new(http: Arc<dyn HttpClient>, settings: InstallerSettings) -> Self {
        Self {
            http,
            settings,
            platform: Platform::current(),
            relauncher: Arc::new(ProcessRelauncher),
            processes: Arc::new(SystemProcesses),
            current_version: crate::VERSION.to_string(),
            current_exe: None,
            temp_dir: std::env::temp_dir(),
            active: None,
            components: Arc::default(),
            self_update: Arc::default(),
        }
    }

    /// Overrides the platform used for asset matching.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Overrides how a replaced installer is started.
    #[must_use]
    pub fn with_relauncher(mut self, relauncher: Arc<dyn Relauncher>) -> Self {
        self.relauncher = relauncher;
        self
    }

    /// Overrides how the target application is found and stopped.
    #[must_use]
    pub fn with_process_control(mut self, processes: Arc<dyn ProcessControl>) -> Self {
        self.processes = processes;
        self
    }

    /// Overrides the version compared against installer releases.
    #[must_use]
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Overrides the executable replaced by a self-update.
    #[must_use]
    pub fn with_current_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.current_exe = Some(exe.into());
        self
    }

    /// Overrides the directory downloads and the stashed binary go to.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &InstallerSettings {
        &self.settings
    }

    /// Platform used for asset matching.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Release client for the product repository.
    #[must_use]
    pub fn product_releases(&self) -> ReleaseClient {
        ReleaseClient::new(
            Arc::clone(&self.http),
            &self.settings.repo_owner,
            &self.settings.repo_name,
        )
    }

    /// Release client for the installer repository.
    #[must_use]
    pub fn installer_releases(&self) -> ReleaseClient {
        ReleaseClient::new(
            Arc::clone(&self.http),
            &self.settings.repo_owner,
            &self.settings.installer_repo,
        )
    }

    /// Tag of a newer installer release, if one exists. Downloads nothing.
    pub fn check_self_update(&self) -> Result<Option<String>> {
        let checked = check_installer_update(
            &self.installer_releases(),
            self.platform,
            &self.current_version,
            &self.temp_dir,
        )?;
        Ok(match checked {
            UpdateCheck::Available(plan) => Some(plan.tag),
            UpdateCheck::UpToDate(_) => None,
        })
    }

    /// Fetches all product releases and selects the default one.
    pub fn fetch_catalog(&self) -> Result<ReleaseCatalog> {
        ReleaseCatalog::new(self.product_releases().fetch_releases()?)
    }

    /// Installed size of the selected release, from its sidecar.
    #[must_use]
    pub fn install_size(&self, catalog: &ReleaseCatalog) -> Option<u64> {
        let asset = catalog.selected_install_size_asset(&self.settings.product, &self.platform)?;
        self.product_releases().fetch_install_size(asset)
    }

    /// Resolves the asset and paths for installing the selected release.
    pub fn plan_install(&self, catalog: &ReleaseCatalog, install_dir: &Path) -> Result<InstallPlan> {
        let asset = catalog.selected_asset(&self.settings.product, &self.platform)?;
        Ok(InstallPlan {
            tag: catalog.selected().tag_name.clone(),
            download_path: self.temp_dir.join(&asset.name),
            asset: asset.clone(),
            install_dir: install_dir.to_path_buf(),
        })
    }

    /// Returns true while a flow has not reached a terminal state.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.snapshot().is_done())
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.active {
            Some(active) if !active.handle.snapshot().is_done() => {
                Err(InstallError::Busy(active.flow.name()))
            }
            _ => Ok(()),
        }
    }

    fn launch(&mut self, flow: Flow, scheduler: Scheduler) -> Result<()> {
        tracing::info!("Starting {} ({} steps)", flow, scheduler.len());
        // Joins the previous, already finished worker.
        self.active = None;
        let handle = scheduler.spawn()?;
        self.active = Some(ActiveFlow { flow, handle });
        Ok(())
    }

    /// Starts the install flow: stop target, download, verify, extract.
    pub fn start_install(&mut self, plan: InstallPlan) -> Result<()> {
        self.ensure_idle()?;

        let target = self.settings.target_process.clone();
        let allow_unverified = self.settings.allow_unverified;
        let strict = self.settings.strict_extraction;
        let http = Arc::clone(&self.http);
        let plan = Arc::new(plan);

        let processes = Arc::clone(&self.processes);

        let mut scheduler = Scheduler::new();
        scheduler.add_task("Stopping Steam...", move |ctx| {
            steps::terminate::stop_target(ctx, processes.as_ref(), &target).into()
        });
        {
            let plan = Arc::clone(&plan);
            scheduler.add_task(format!("Downloading {}...", plan.tag), move |ctx| {
                steps::download::download_asset(ctx, http.as_ref(), &plan.asset, &plan.download_path)
                    .into()
            });
        }
        {
            let plan = Arc::clone(&plan);
            scheduler.add_task("Verifying checksum...", move |ctx| {
                steps::verify::verify_download(ctx, &plan.download_path, &plan.asset, allow_unverified)
                    .into()
            });
        }
        scheduler.add_task("Extracting files...", move |ctx| {
            steps::extract::extract_archive(ctx, &plan.download_path, &plan.install_dir, strict)
                .map(|_report| ())
                .into()
        });

        self.launch(Flow::Install, scheduler)
    }

    /// Starts the uninstall flow over `components`, removing the selected ones.
    ///
    /// The returned list is updated in place as components finish.
    pub fn start_uninstall(&mut self, components: Vec<Component>) -> Result<SharedComponents> {
        self.ensure_idle()?;

        tracing::info!(
            "Reclaiming {} bytes",
            reclaimed_space(&components)
        );
        *lock(&self.components) = components;
        let shared = Arc::clone(&self.components);
        let target = self.settings.target_process.clone();

        let processes = Arc::clone(&self.processes);

        let mut scheduler = Scheduler::new();
        scheduler.add_task("Stopping Steam...", move |ctx| {
            steps::terminate::stop_target(ctx, processes.as_ref(), &target).into()
        });
        {
            let shared = Arc::clone(&shared);
            scheduler.add_task("Removing components...", move |ctx| {
                remove_selected(ctx, &shared);
                TaskResult::ok()
            });
        }

        self.launch(Flow::Uninstall, scheduler)?;
        Ok(shared)
    }

    /// Copy of the component list driven by the last uninstall.
    #[must_use]
    pub fn components(&self) -> Vec<Component> {
        lock(&self.components).clone()
    }

    /// Starts the self-update flow.
    ///
    /// Finishes after the version check, without side effects, when the
    /// installer is already current.
    pub fn start_self_update(&mut self) -> Result<()> {
        self.ensure_idle()?;
        *lock(&self.self_update) = None;

        let plan: Arc<Mutex<Option<SelfUpdatePlan>>> = Arc::default();
        let client = self.installer_releases();
        let platform = self.platform;
        let current = self.current_version.clone();
        let temp_dir = self.temp_dir.clone();

        let mut scheduler = Scheduler::new();
        {
            let plan = Arc::clone(&plan);
            let outcome = Arc::clone(&self.self_update);
            let temp_dir = temp_dir.clone();
            scheduler.add_task("Checking for updates...", move |ctx| {
                ctx.progress().reset();
                let checked = check_installer_update(&client, platform, &current, &temp_dir);
                ctx.progress().complete();
                match checked {
                    Ok(UpdateCheck::Available(next)) => {
                        *lock(&plan) = Some(next);
                        TaskResult::ok()
                    }
                    Ok(UpdateCheck::UpToDate(up_to_date)) => {
                        ctx.set_status("Installer is up to date");
                        *lock(&outcome) = Some(up_to_date);
                        TaskResult::finish("no newer installer release")
                    }
                    Err(e) => TaskResult::failed(e.to_string()),
                }
            });
        }
        {
            let plan = Arc::clone(&plan);
            let http = Arc::clone(&self.http);
            scheduler.add_task("Downloading update...", move |ctx| {
                let Some(plan) = lock(&plan).clone() else {
                    return TaskResult::failed("no installer update was planned");
                };
                steps::download::download_asset(ctx, http.as_ref(), &plan.asset, &plan.download_path)
                    .into()
            });
        }
        {
            let plan = Arc::clone(&plan);
            scheduler.add_task("Verifying update...", move |ctx| {
                let Some(plan) = lock(&plan).clone() else {
                    return TaskResult::failed("no installer update was planned");
                };
                // Verified only when the asset carries a digest.
                steps::verify::verify_download(ctx, &plan.download_path, &plan.asset, true).into()
            });
        }
        {
            let outcome = Arc::clone(&self.self_update);
            let relauncher = Arc::clone(&self.relauncher);
            let current_exe = self.current_exe.clone();
            scheduler.add_task("Replacing installer...", move |ctx| {
                let Some(plan) = lock(&plan).clone() else {
                    return TaskResult::failed("no installer update was planned");
                };
                let exe = match current_exe.map_or_else(std::env::current_exe, Ok) {
                    Ok(exe) => exe,
                    Err(e) => {
                        return TaskResult::failed(format!("cannot locate running installer: {e}"));
                    }
                };
                let replaced = steps::replace::replace_installer(
                    ctx,
                    &plan.download_path,
                    &exe,
                    &temp_dir,
                    relauncher.as_ref(),
                );
                match replaced {
                    Ok(_) => {
                        *lock(&outcome) = Some(SelfUpdateOutcome::Relaunched { version: plan.tag });
                        TaskResult::ok()
                    }
                    Err(e) => TaskResult::failed(e.to_string()),
                }
            });
        }

        self.launch(Flow::SelfUpdate, scheduler)
    }

    /// Outcome of the last self-update, once known.
    #[must_use]
    pub fn self_update_outcome(&self) -> Option<SelfUpdateOutcome> {
        lock(&self.self_update).clone()
    }

    /// Polls the running or last flow without blocking.
    #[must_use]
    pub fn poll(&self) -> Option<FlowStatus> {
        self.active.as_ref().map(|active| {
            let snapshot = active.handle.snapshot();
            FlowStatus {
                flow: active.flow,
                phase: Phase::of(active.flow, &snapshot),
                snapshot,
            }
        })
    }

    /// Blocks until the current flow's worker exits.
    pub fn wait(&mut self) -> Option<FlowStatus> {
        let active = self.active.as_mut()?;
        active.handle.wait();
        self.poll()
    }

    /// Starts the target application from `install_dir` and exits the installer.
    ///
    /// Returns only when the launch fails.
    pub fn launch_target(&self, install_dir: &Path) -> Result<()> {
        let name = &self.settings.target_process;
        let local = install_dir.join(name);
        let executable = if local.is_file() {
            local
        } else {
            PathBuf::from(name)
        };
        process::launch_and_exit(&executable, install_dir)
    }
}

/// Marks selected components as uninstalling, then removes them in order.
fn remove_selected(ctx: &crate::scheduler::TaskContext, shared: &SharedComponents) {
    let selected: Vec<usize> = {
        let mut components = lock(shared);
        components
            .iter_mut()
            .enumerate()
            .filter(|(_, component)| component.selected)
            .map(|(index, component)| {
                component.state = ComponentState::Uninstalling;
                index
            })
            .collect()
    };

    ctx.progress().reset();
    for (done, index) in selected.iter().enumerate() {
        let Some(mut component) = lock(shared).get(*index).cloned() else {
            continue;
        };
        ctx.set_status(format!("Removing {}...", component.name));
        uninstall_component(&mut component);
        if let ComponentState::Failed(reason) = &component.state {
            tracing::warn!("{} was not fully removed: {}", component.name, reason);
        }
        if let Some(slot) = lock(shared).get_mut(*index) {
            slot.state = component.state;
        }
        ctx.progress().set_ratio(done as u64 + 1, selected.len() as u64);
    }
    ctx.progress().complete();
}

/// Compares the running installer with the newest installer release.
fn check_installer_update(
    client: &ReleaseClient,
    platform: Platform,
    current: &str,
    temp_dir: &Path,
) -> Result<UpdateCheck> {
    let catalog = ReleaseCatalog::new(client.fetch_releases()?)?;
    let latest = catalog.latest();
    let current_version = Version::from_tag(current)?;
    let latest_version = latest.version()?;

    if current_version >= latest_version {
        tracing::info!(
            "Installer is up to date (current: {}, latest: {})",
            current,
            latest.tag_name
        );
        return Ok(UpdateCheck::UpToDate(SelfUpdateOutcome::UpToDate {
            current: normalize_tag(current).to_string(),
            latest: latest.tag_name.clone(),
        }));
    }

    tracing::info!("Update available: {} -> {}", current, latest.tag_name);
    let asset = platform
        .find_installer_asset(latest)
        .ok_or_else(|| InstallError::NoAssetFound(format!("installer for {platform}")))?;
    Ok(UpdateCheck::Available(SelfUpdatePlan {
        tag: latest.tag_name.clone(),
        download_path: temp_dir.join(&asset.name),
        asset: asset.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_snapshot() {
        let mut snapshot = Snapshot::default();
        assert_eq!(Phase::of(Flow::Install, &snapshot), Phase::Idle);

        snapshot.step = 2;
        assert_eq!(Phase::of(Flow::Install, &snapshot), Phase::Downloading);
        snapshot.step = 4;
        assert_eq!(Phase::of(Flow::Install, &snapshot), Phase::Extracting);
        assert_eq!(Phase::of(Flow::SelfUpdate, &snapshot), Phase::Replacing);

        snapshot.failed = true;
        snapshot.failure_reason = Some("disk full".to_string());
        assert_eq!(
            Phase::of(Flow::Install, &snapshot),
            Phase::Failed("disk full".to_string())
        );

        snapshot.failed = false;
        snapshot.finished = true;
        assert_eq!(Phase::of(Flow::Uninstall, &snapshot), Phase::Complete);
    }

    #[test]
    fn test_flow_names() {
        assert_eq!(Flow::SelfUpdate.to_string(), "self-update");
        assert_eq!(Flow::Uninstall.phases().len(), 2);
        assert_eq!(
            InstallError::Busy(Flow::Install.name()).to_string(),
            "another install is already running"
        );
    }
}

//! Install, uninstall and self-update pipeline for Millennium.
//!
//! This crate downloads Millennium releases from GitHub, verifies them with
//! SHA256, extracts them over a Steam installation and removes them again.
//! It can also replace the installer binary with its newest release.
//!
//! # Architecture
//!
//! Every flow is a chain of steps run by a [`Scheduler`] on one background
//! thread. The caller never blocks on I/O; it polls a [`Snapshot`] once per
//! frame:
//!
//! - [`Orchestrator::start_install`] - stop Steam, download, verify, extract
//! - [`Orchestrator::start_uninstall`] - stop Steam, remove selected components
//! - [`Orchestrator::start_self_update`] - check version, download, verify, replace and relaunch
//!
//! Only one flow runs at a time; starting a second one fails with
//! [`InstallError::Busy`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use millennium_installer::{InstallerSettings, Orchestrator, ReqwestClient};
//!
//! fn install() -> millennium_installer::Result<()> {
//!     let settings = InstallerSettings::default();
//!     let install_dir = settings.resolve_install_dir().expect("steam path");
//!     let mut orchestrator = Orchestrator::new(Arc::new(ReqwestClient::new()?), settings);
//!
//!     let catalog = orchestrator.fetch_catalog()?;
//!     let plan = orchestrator.plan_install(&catalog, &install_dir)?;
//!     orchestrator.start_install(plan)?;
//!
//!     while let Some(status) = orchestrator.poll() {
//!         println!("{} {:.0}%", status.snapshot.status, status.snapshot.progress * 100.0);
//!         if status.is_done() {
//!             break;
//!         }
//!         std::thread::sleep(Duration::from_millis(16));
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod progress;
pub mod release;
pub mod version;

// Pipeline building blocks
pub mod extract;
pub mod process;
pub mod scheduler;
pub mod self_replace;
pub mod uninstall;
pub mod verify;

// Individual steps and the flows composing them
pub mod orchestrator;
pub mod steps;

// GitHub API
pub mod github;

// Re-export main types for convenience
pub use config::InstallerSettings;
pub use error::{InstallError, Result};
pub use extract::{ArchiveType, ExtractReport, detect_archive_type, extract};
pub use github::{Asset, Release, ReleaseClient};
pub use http::{HttpClient, ReqwestClient};
pub use orchestrator::{
    Flow, FlowStatus, InstallPlan, Orchestrator, Phase, SelfUpdateOutcome, SharedComponents,
};
pub use progress::ProgressCell;
pub use release::{Platform, ReleaseCatalog};
pub use scheduler::{Scheduler, SchedulerHandle, Snapshot, TaskContext, TaskResult};
pub use uninstall::{Component, ComponentState, default_components};
pub use verify::{verify, verify_digest};
pub use version::Version;

/// Current version of the installer.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name used in release asset names.
pub const PRODUCT: &str = "millennium";

/// GitHub repository owner.
pub const REPO_OWNER: &str = "SteamClientHomebrew";

/// GitHub repository publishing Millennium releases.
pub const REPO_NAME: &str = "Millennium";

/// GitHub repository publishing installer releases.
pub const INSTALLER_REPO: &str = "Installer";

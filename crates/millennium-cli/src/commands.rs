use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use millennium_cli::cli::{ComponentsArgs, InstallArgs, SelfUpdateArgs, UninstallArgs};
use millennium_cli::summary::{components_table, install_banner, releases_table};
use millennium_installer::format::format_bytes;
use millennium_installer::uninstall::reclaimed_space;
use millennium_installer::{
    ComponentState, InstallerSettings, Orchestrator, Phase, ReqwestClient, SelfUpdateOutcome,
    default_components,
};

use crate::render::{drive, spinner};

/// Settings plus where they were loaded from.
pub struct Session {
    settings: InstallerSettings,
    config_path: Option<PathBuf>,
}

impl Session {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let settings = match config_path {
            Some(path) => InstallerSettings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => InstallerSettings::default(),
        };
        Ok(Self {
            settings,
            config_path: config_path.map(Path::to_path_buf),
        })
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let http = ReqwestClient::new().context("failed to create HTTP client")?;
        Ok(Orchestrator::new(Arc::new(http), self.settings.clone()))
    }

    fn install_dir(&self, requested: Option<&Path>) -> Result<PathBuf> {
        let dir = requested
            .map(Path::to_path_buf)
            .or_else(|| self.settings.resolve_install_dir())
            .context("could not detect the Steam directory; pass --install-dir")?;
        if !dir.is_dir() {
            bail!("Steam directory {} does not exist", dir.display());
        }
        Ok(dir)
    }

    fn persist(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(error) = self.settings.save(path) {
            warn!("Could not save settings to {}: {}", path.display(), error);
        }
    }

    /// Runs the periodic installer update check.
    ///
    /// Returns true when a new installer was started and this one should exit.
    pub fn check_for_updates_on_start(&mut self) -> Result<bool> {
        if !self.settings.should_check_for_updates_at(Utc::now()) {
            return Ok(false);
        }
        let orchestrator = self.orchestrator()?;
        let available = match orchestrator.check_self_update() {
            Ok(available) => available,
            Err(error) => {
                warn!("Installer update check failed: {}", error);
                return Ok(false);
            }
        };
        self.settings.record_update_check();
        self.persist();

        let Some(tag) = available else {
            return Ok(false);
        };
        if !self.settings.auto_install_updates {
            println!("Installer {tag} is available. Run `self-update` to install it.");
            return Ok(false);
        }
        println!("Updating installer to {tag}...");
        let outcome = self.run_self_update()?;
        Ok(matches!(outcome, Some(SelfUpdateOutcome::Relaunched { .. })))
    }

    pub fn install(&self, args: &InstallArgs) -> Result<bool> {
        let install_dir = self.install_dir(args.install_dir.as_deref())?;
        let mut orchestrator = self.orchestrator()?;

        let fetching = spinner("Fetching releases...");
        let catalog = orchestrator.fetch_catalog();
        fetching.finish_and_clear();
        let mut catalog = catalog?;
        if let Some(tag) = &args.version {
            catalog.select(tag)?;
        }

        let install_size = orchestrator.install_size(&catalog);
        println!("{}", install_banner(catalog.selected(), install_size));
        println!("Target: {}", install_dir.display());

        let plan = orchestrator.plan_install(&catalog, &install_dir)?;
        let tag = plan.tag.clone();
        orchestrator.start_install(plan)?;
        let status = drive(&mut orchestrator).context("install did not start")?;

        match status.phase {
            Phase::Complete => {
                println!("Millennium {tag} installed.");
                if args.launch {
                    orchestrator.launch_target(&install_dir)?;
                }
                Ok(true)
            }
            Phase::Failed(reason) => {
                eprintln!("error: {reason}");
                Ok(false)
            }
            other => bail!("install stopped in phase {other:?}"),
        }
    }

    pub fn uninstall(&self, args: &UninstallArgs) -> Result<bool> {
        let install_dir = self.install_dir(args.install_dir.as_deref())?;
        let mut components = default_components(&install_dir);

        for name in &args.keep {
            let component = components
                .iter_mut()
                .find(|component| component.name.eq_ignore_ascii_case(name))
                .with_context(|| format!("unknown component: {name}"))?;
            component.selected = false;
        }
        // Nothing on disk means nothing to do.
        for component in &mut components {
            component.selected &= component.is_installed();
        }

        if !components.iter().any(|component| component.selected) {
            println!("Nothing to remove from {}.", install_dir.display());
            return Ok(true);
        }

        println!("{}", components_table(&components));
        if !args.yes
            && !confirm(&format!(
                "Remove the selected components ({})?",
                format_bytes(reclaimed_space(&components))
            ))?
        {
            println!("Aborted.");
            return Ok(true);
        }

        let mut orchestrator = self.orchestrator()?;
        orchestrator.start_uninstall(components)?;
        let status = drive(&mut orchestrator).context("uninstall did not start")?;
        let components = orchestrator.components();
        println!("{}", components_table(&components));

        if let Phase::Failed(reason) = status.phase {
            eprintln!("error: {reason}");
            return Ok(false);
        }
        let failed = components
            .iter()
            .filter(|component| matches!(component.state, ComponentState::Failed(_)))
            .count();
        if failed > 0 {
            eprintln!("error: {failed} component(s) could not be fully removed");
            return Ok(false);
        }
        info!("Uninstall finished");
        Ok(true)
    }

    pub fn self_update(&mut self, args: &SelfUpdateArgs) -> Result<bool> {
        if args.check {
            let available = self.orchestrator()?.check_self_update()?;
            self.settings.record_update_check();
            self.persist();
            match available {
                Some(tag) => println!(
                    "Installer {tag} is available (running {}).",
                    millennium_installer::VERSION
                ),
                None => println!("Installer {} is up to date.", millennium_installer::VERSION),
            }
            return Ok(true);
        }

        match self.run_self_update()? {
            Some(SelfUpdateOutcome::UpToDate { current, latest }) => {
                println!("Installer {current} is up to date (latest: {latest}).");
                Ok(true)
            }
            Some(SelfUpdateOutcome::Relaunched { version }) => {
                println!("Installer updated to {version}; the new version has been started.");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs the self-update flow. `None` means it failed and the reason was printed.
    fn run_self_update(&mut self) -> Result<Option<SelfUpdateOutcome>> {
        let mut orchestrator = self.orchestrator()?;
        orchestrator.start_self_update()?;
        let status = drive(&mut orchestrator).context("self-update did not start")?;
        if let Phase::Failed(reason) = status.phase {
            eprintln!("error: {reason}");
            return Ok(None);
        }

        self.settings.record_update_check();
        self.persist();
        orchestrator
            .self_update_outcome()
            .map(Some)
            .context("self-update finished without an outcome")
    }

    pub fn releases(&self) -> Result<()> {
        let orchestrator = self.orchestrator()?;
        let fetching = spinner("Fetching releases...");
        let catalog = orchestrator.fetch_catalog();
        fetching.finish_and_clear();
        let catalog = catalog?;

        println!(
            "{}",
            releases_table(
                &catalog,
                &self.settings.product,
                &orchestrator.platform(),
                Utc::now()
            )
        );
        Ok(())
    }

    pub fn components(&self, args: &ComponentsArgs) -> Result<()> {
        let install_dir = self.install_dir(args.install_dir.as_deref())?;
        let components = default_components(&install_dir);
        println!("Steam directory: {}", install_dir.display());
        println!("{}", components_table(&components));
        Ok(())
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

//! CLI argument definitions for the Millennium installer.

use std::path::PathBuf;

use clap::{ColorChoice, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use tracing::level_filters::LevelFilter;

use crate::logging::{LogConfig, LogFormat};

#[derive(Parser)]
#[command(
    name = "millennium-cli",
    version,
    about = "Millennium installer - install, update and remove Millennium for Steam",
    long_about = "Install, update and remove Millennium for the Steam client.\n\n\
                  Releases are downloaded from GitHub and verified against their\n\
                  published SHA256 digest before anything is written."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (JSON). Defaults apply when absent.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download, verify and install a Millennium release.
    Install(InstallArgs),

    /// Remove installed Millennium components.
    Uninstall(UninstallArgs),

    /// Replace this installer with its newest release.
    SelfUpdate(SelfUpdateArgs),

    /// List published Millennium releases.
    Releases,

    /// Show installed components and their sizes.
    Components(ComponentsArgs),
}

#[derive(Parser)]
pub struct InstallArgs {
    /// Release tag to install (default: newest stable release).
    #[arg(long = "version", value_name = "TAG")]
    pub version: Option<String>,

    /// Steam directory to install into (default: detected Steam path).
    #[arg(long = "install-dir", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Start Steam once the install finished.
    #[arg(long = "launch")]
    pub launch: bool,
}

#[derive(Parser)]
pub struct UninstallArgs {
    /// Steam directory Millennium is installed in.
    #[arg(long = "install-dir", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Component to leave in place (repeatable, case-insensitive).
    #[arg(long = "keep", value_name = "NAME")]
    pub keep: Vec<String>,

    /// Skip the confirmation prompt.
    #[arg(long = "yes", short = 'y')]
    pub yes: bool,
}

#[derive(Parser)]
pub struct SelfUpdateArgs {
    /// Only report whether a newer installer exists.
    #[arg(long = "check")]
    pub check: bool,
}

#[derive(Parser)]
pub struct ComponentsArgs {
    /// Steam directory to inspect.
    #[arg(long = "install-dir", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl Cli {
    /// Build logging configuration from CLI flags with consistent precedence.
    ///
    /// `--log-level` beats `-v`/`-q`, which beat `RUST_LOG`.
    #[must_use]
    pub fn log_config(&self, stderr_is_terminal: bool) -> LogConfig {
        let mut config = LogConfig {
            level_filter: self.verbosity.tracing_level_filter(),
            ..LogConfig::default()
        };
        config.use_env_filter = !(self.verbosity.is_present() || self.log_level.is_some());
        if let Some(level) = self.log_level {
            config.level_filter = match level {
                LogLevelArg::Error => LevelFilter::ERROR,
                LogLevelArg::Warn => LevelFilter::WARN,
                LogLevelArg::Info => LevelFilter::INFO,
                LogLevelArg::Debug => LevelFilter::DEBUG,
                LogLevelArg::Trace => LevelFilter::TRACE,
            };
        }
        config.format = match self.log_format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        };
        config.log_file.clone_from(&self.log_file);
        config.with_ansi = match self.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.log_file.is_none() && stderr_is_terminal,
        };
        config
    }
}

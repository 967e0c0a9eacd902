//! Millennium installer CLI.

use std::io::{self, IsTerminal};
use std::path::Path;

use clap::Parser;
use millennium_cli::cli::{Cli, Command};
use millennium_cli::logging::init_logging;

mod commands;
mod render;

use crate::commands::Session;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = cli.log_config(io::stderr().is_terminal());
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(cli.command, cli.config.as_deref()) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

/// Runs one command. `Ok(false)` means it ran but did not succeed.
fn run(command: Command, config: Option<&Path>) -> anyhow::Result<bool> {
    let mut session = Session::load(config)?;
    if !matches!(command, Command::SelfUpdate(_)) && session.check_for_updates_on_start()? {
        return Ok(true);
    }
    match command {
        Command::Install(args) => session.install(&args),
        Command::Uninstall(args) => session.uninstall(&args),
        Command::SelfUpdate(args) => session.self_update(&args),
        Command::Releases => session.releases().map(|()| true),
        Command::Components(args) => session.components(&args).map(|()| true),
    }
}

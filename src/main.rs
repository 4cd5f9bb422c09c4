//! `ptrtar`: tar archives whose file contents are replaced by pointers.

mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use ptrtar_config::Config;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", *err);
            if cli.verbose > 0 {
                eprintln!("{err:?}");
            }
            ExitCode::from(err.exit_code())
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load().map_err(ErrorKind::config)?;
    logging::init(&config, cli.verbose, cli.quiet)?;
    match &cli.command {
        Command::Create(args) => commands::create(args, &config),
        Command::ToTar(args) => commands::to_tar(args),
        Command::ListPtrs(args) => commands::list_ptrs(args),
    }
}

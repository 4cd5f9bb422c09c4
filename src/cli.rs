//! Command line arguments.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ptrtar", version, about = "Tar archives with file contents replaced by pointers")]
pub struct Cli {
    /// More log output (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Less log output (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "verbose")]
    pub quiet: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a pointer archive of files and directories to stdout
    #[command(visible_alias = "c")]
    Create(CreateArgs),
    /// Expand a pointer archive on stdin into a standard tar on stdout
    #[command(name = "to-tar", visible_aliases = ["expand", "x"])]
    ToTar(ToTarArgs),
    /// Write the pointers of a pointer archive on stdin to stdout
    #[command(name = "list-ptrs")]
    ListPtrs(ListPtrsArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// File or directory to archive; can be given multiple times [default: .]
    #[arg(short, long = "dir", value_name = "PATH")]
    pub dirs: Vec<PathBuf>,
    /// Path to leave out of the archive, with everything below it; can be
    /// given multiple times
    #[arg(short, long = "exclude", value_name = "PATH")]
    pub excludes: Vec<PathBuf>,
    /// Pointer cache file (created if missing; delete it to invalidate)
    #[arg(short, long, value_name = "FILE")]
    pub cache: Option<PathBuf>,
    /// Pointer command: gets a file's contents on stdin, writes its pointer
    /// to stdout
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    pub command: Vec<OsString>,
}

#[derive(Args, Debug)]
pub struct ToTarArgs {
    /// Expansion command: gets a pointer on stdin, writes the file contents
    /// to stdout
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    pub command: Vec<OsString>,
}

#[derive(Args, Debug)]
pub struct ListPtrsArgs {
    /// Print a newline after each pointer
    #[arg(short = 'n', long)]
    pub newline: bool,
}

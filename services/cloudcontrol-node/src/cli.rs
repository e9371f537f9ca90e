//! Command-line handling for the node binary.

use cloudcontrol_core::{Config, NodePaths};
use cloudcontrol_identity::{generate_local_keypair, LocalKeypair};
use std::path::PathBuf;

use crate::error::NodeResult;

pub const USAGE: &str = "\
Usage: cloudcontrol [--dir <path>] [COMMAND]

Commands:
  --help                 show this help
  --create-config        create config file and self key in the node directory
  --add-remote <host>    add remote to the config file
  --webadmin             allow users to connect to a web admin interface on port 2001

Options:
  --dir <path>           node directory (default: current working directory)

Without a command the node loads its config and keys and serves until stopped.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    CreateConfig,
    AddRemote(String),
    Serve { webadmin: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub command: Command,
    pub dir: Option<PathBuf>,
}

impl Cli {
    pub fn paths(&self) -> NodePaths {
        match &self.dir {
            Some(dir) => NodePaths::new(dir),
            None => NodePaths::current_dir(),
        }
    }
}

/// Parse arguments, excluding the program name.
pub fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut command = None;
    let mut webadmin = false;
    let mut dir = None;

    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Cli { command: Command::Help, dir }),
            "--create-config" => set_command(&mut command, Command::CreateConfig)?,
            "--add-remote" => match args_iter.next() {
                Some(host) if !host.starts_with("--") => {
                    set_command(&mut command, Command::AddRemote(host.clone()))?
                }
                _ => return Err("--add-remote was provided without a host".into()),
            },
            "--webadmin" => webadmin = true,
            "--dir" => match args_iter.next() {
                Some(path) => dir = Some(PathBuf::from(path)),
                None => return Err("--dir was provided without a path".into()),
            },
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    let command = match command {
        Some(command) if webadmin => {
            return Err(format!("--webadmin cannot be combined with {command:?}"))
        }
        Some(command) => command,
        None => Command::Serve { webadmin },
    };
    Ok(Cli { command, dir })
}

fn set_command(slot: &mut Option<Command>, command: Command) -> Result<(), String> {
    if slot.is_some() {
        return Err("only one command may be given".into());
    }
    *slot = Some(command);
    Ok(())
}

/// Write an empty config plus key directories, then a fresh local keypair.
pub fn create_config(paths: &NodePaths) -> NodeResult<LocalKeypair> {
    Config::default().write(paths)?;
    Ok(generate_local_keypair(paths)?)
}

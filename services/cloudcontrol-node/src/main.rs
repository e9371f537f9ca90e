use anyhow::Context;
use cloudcontrol_core::{logging, Config, NodeSettings};
use cloudcontrol_node::cli::{self, Command};
use cloudcontrol_node::{server, NodeError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match cli::parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };
    let paths = cli.paths();

    match cli.command {
        Command::Help => {
            println!("{}", cli::USAGE);
            Ok(())
        }
        Command::CreateConfig => {
            cli::create_config(&paths).with_context(|| {
                format!("cannot create config in '{}'", paths.base().display())
            })?;
            println!("Created {}", paths.config_file().display());
            Ok(())
        }
        Command::AddRemote(host) => {
            Config::add_remote(&paths, &host).context("cannot add remote")?;
            println!("Added remote '{host}'");
            Ok(())
        }
        Command::Serve { webadmin } => {
            logging::init_from_env();
            info!(
                version = env!("CARGO_PKG_VERSION"),
                dir = %paths.base().display(),
                "Starting CloudControl node"
            );

            match server::run(&paths, NodeSettings::default(), webadmin).await {
                Ok(()) => Ok(()),
                Err(NodeError::Config(e)) if e.is_not_found() => {
                    error!(error = %e, "Cannot load config");
                    error!("Run with --create-config to create a config in the node directory");
                    Err(e).context("cannot load config")
                }
                Err(e) => {
                    error!(error = %e, "Node failed");
                    Err(e.into())
                }
            }
        }
    }
}

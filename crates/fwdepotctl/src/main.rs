//! fwdepotctl - firmware depot administration CLI
//!
//! Uploads cabinet archives, moves packages between targets, and maintains
//! the signed metadata feeds of a local depot.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use fwdepot_repository::ActorCapabilities;
use fwdepot_service::{DepotConfig, FirmwareDepot};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{Commands, Context};

#[derive(Parser, Debug)]
#[command(name = "fwdepotctl")]
#[command(about = "Firmware depot administration - ingest, promote and publish firmware")]
#[command(version)]
#[command(long_about = "
fwdepotctl administers a firmware depot: it ingests vendor cabinet archives,
moves packages through the private, embargo, testing and stable targets, and
keeps the signed metadata feeds up to date.

Capabilities are given explicitly with --group, --qa and --admin.
Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(long, global = true, env = "FWDEPOT_CONFIG", default_value = "/etc/fwdepot/config.json")]
    config: PathBuf,

    /// Override the storage root from the configuration
    #[arg(long, global = true, env = "FWDEPOT_ROOT")]
    root: Option<PathBuf>,

    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Group the caller acts for
    #[arg(long, global = true)]
    group: Option<String>,

    /// Caller holds QA capability for --group
    #[arg(long, global = true)]
    qa: bool,

    /// Caller is an administrator
    #[arg(long, global = true)]
    admin: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn actor(&self) -> ActorCapabilities {
        ActorCapabilities {
            group: self.group.clone(),
            qa: self.qa,
            admin: self.admin,
        }
    }

    async fn load_config(&self) -> Result<DepotConfig> {
        let mut config = DepotConfig::load_from_path(&self.config).await?;
        if let Some(root) = &self.root {
            config.storage.root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fwdepotctl={log_level},fwdepot_service={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = error::exit_code(&e);
            if cli.json {
                output::print_error_json(&e, code);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(code)
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    if let Commands::Completion { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "fwdepotctl", &mut std::io::stdout());
        return Ok(());
    }

    let config = cli.load_config().await?;
    debug!(root = %config.storage.root.display(), "Opening depot");
    let ctx = Context {
        depot: FirmwareDepot::open(config).await?,
        actor: cli.actor(),
        json: cli.json,
    };
    commands::execute(&cli.command, &ctx).await
}

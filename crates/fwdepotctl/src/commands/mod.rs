//! Command implementations for fwdepotctl

pub mod feed;
pub mod maintenance;
pub mod package;

use anyhow::Result;
use clap::{Args, Subcommand};
use fwdepot_repository::{ActorCapabilities, PackageFilter, PackageId, Target};
use fwdepot_service::FirmwareDepot;
use std::path::PathBuf;

use crate::error::CliError;

/// Everything a command needs to run
pub struct Context {
    pub depot: FirmwareDepot,
    pub actor: ActorCapabilities,
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a cabinet archive on behalf of --group
    Ingest {
        /// Cabinet archive to upload
        file: PathBuf,
        /// Initial target
        #[arg(long, default_value_t = Target::Private)]
        target: Target,
        /// Address recorded as the upload origin
        #[arg(long)]
        origin: Option<String>,
    },

    /// Move a package to another target
    Promote {
        /// Package identifier
        id: String,
        /// New target
        target: Target,
    },

    /// Delete a package and its artifacts
    Delete {
        /// Package identifier
        id: String,
    },

    /// Show one package
    Show {
        /// Package identifier
        id: String,
    },

    /// List packages
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Regenerate feeds for the selected packages
    Rebuild {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Re-derive package metadata from the stored uploads
    Refresh {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Re-derive the artifact digest cache
    CacheRebuild,

    /// Newest stable firmware per device
    Devices,

    /// Verify a published feed against its detached signature
    VerifyFeed {
        /// Feed file name, e.g. firmware.xml.gz
        filename: String,
        /// Print the feed XML after verification
        #[arg(long)]
        xml: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Package selection shared by list, rebuild and refresh
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Owning group
    #[arg(long)]
    pub owner: Option<String>,
    /// Exact target
    #[arg(long)]
    pub target: Option<Target>,
    /// Device GUID shipped by the package
    #[arg(long)]
    pub device: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> PackageFilter {
        let mut filter = PackageFilter::all();
        if let Some(owner) = &self.owner {
            filter = filter.with_group(owner.clone());
        }
        if let Some(target) = self.target {
            filter = filter.with_target(target);
        }
        if let Some(device) = &self.device {
            filter = filter.with_device(device.clone());
        }
        filter
    }
}

/// Parse a package identifier argument
pub fn parse_package_id(id: &str) -> Result<PackageId, CliError> {
    PackageId::new(id.trim().to_ascii_lowercase()).map_err(|e| CliError::InvalidArgument(e.to_string()))
}

/// Run a depot command
pub async fn execute(cmd: &Commands, ctx: &Context) -> Result<()> {
    match cmd {
        Commands::Ingest { file, target, origin } => {
            package::ingest(ctx, file, *target, origin.as_deref()).await
        }
        Commands::Promote { id, target } => package::promote(ctx, id, *target).await,
        Commands::Delete { id } => package::delete(ctx, id).await,
        Commands::Show { id } => package::show(ctx, id).await,
        Commands::List { filter } => package::list(ctx, &filter.to_filter()).await,
        Commands::Rebuild { filter } => maintenance::rebuild(ctx, &filter.to_filter()).await,
        Commands::Refresh { filter } => maintenance::refresh(ctx, &filter.to_filter()).await,
        Commands::CacheRebuild => maintenance::cache_rebuild(ctx).await,
        Commands::Devices => feed::devices(ctx),
        Commands::VerifyFeed { filename, xml } => feed::verify(ctx, filename, *xml).await,
        Commands::Completion { .. } => Err(CliError::InvalidArgument(
            "completion does not need a depot".to_string(),
        )
        .into()),
    }
}

//! Package commands: ingest, promote, delete, show, list

use anyhow::Result;
use fwdepot_repository::{PackageFilter, Target};
use fwdepot_service::UploadRequest;
use std::path::Path;
use tracing::debug;

use crate::commands::{Context, parse_package_id};
use crate::error::CliError;
use crate::output;

/// Upload an archive for the actor's group
pub async fn ingest(ctx: &Context, file: &Path, target: Target, origin: Option<&str>) -> Result<()> {
    let group = ctx
        .actor
        .group
        .clone()
        .ok_or_else(|| CliError::MissingCapability("--group is required to upload".to_string()))?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CliError::InvalidArgument(format!("{} has no file name", file.display())))?
        .to_string();

    let data = tokio::fs::read(file).await.map_err(CliError::from)?;
    debug!(file = %file.display(), bytes = data.len(), "Read upload");

    let mut request = UploadRequest::new(filename, data, group).with_target(target);
    if let Some(origin) = origin {
        request = request.with_origin(origin);
    }

    let id = ctx.depot.ingest(request, &ctx.actor).await?;
    let view = ctx.depot.get_package(&id, &ctx.actor).await?;
    output::print_package(&view, ctx.json, "Ingested")
}

/// Move a package to `target`
pub async fn promote(ctx: &Context, id: &str, target: Target) -> Result<()> {
    let id = parse_package_id(id)?;
    let previous = ctx.depot.promote(&id, target, &ctx.actor).await?;
    output::print_promotion(&id, previous, target, ctx.json)
}

/// Delete a package
pub async fn delete(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_package_id(id)?;
    ctx.depot.delete(&id, &ctx.actor).await?;
    output::print_deleted(&id, ctx.json)
}

/// Show one package
pub async fn show(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_package_id(id)?;
    let view = ctx.depot.get_package(&id, &ctx.actor).await?;
    output::print_package(&view, ctx.json, "Package")
}

/// List packages visible to the actor
pub async fn list(ctx: &Context, filter: &PackageFilter) -> Result<()> {
    let packages = ctx.depot.list_packages(filter, &ctx.actor).await?;
    output::print_package_list(&packages, ctx.json)
}

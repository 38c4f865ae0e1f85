//! Administrative maintenance commands

use anyhow::Result;
use fwdepot_repository::PackageFilter;

use crate::commands::Context;
use crate::output;

/// Regenerate feeds, reporting the files actually written
pub async fn rebuild(ctx: &Context, filter: &PackageFilter) -> Result<()> {
    let written = ctx.depot.rebuild_all(filter, &ctx.actor).await?;
    output::print_written_feeds(&written, ctx.json)
}

/// Re-derive package metadata from stored uploads
pub async fn refresh(ctx: &Context, filter: &PackageFilter) -> Result<()> {
    let refreshed = ctx.depot.refresh_metadata(filter, &ctx.actor).await?;
    output::print_count("refreshed", refreshed, "packages refreshed", ctx.json)
}

/// Re-derive the digest cache
pub async fn cache_rebuild(ctx: &Context) -> Result<()> {
    let entries = ctx.depot.rebuild_cache(&ctx.actor).await?;
    output::print_count("entries", entries, "cache entries", ctx.json)
}

//! Feed inspection commands

use anyhow::Result;

use crate::commands::Context;
use crate::output;

/// Print the public device list
pub fn devices(ctx: &Context) -> Result<()> {
    output::print_devices(&ctx.depot.device_list(), ctx.json)
}

/// Verify a feed and report its signer
pub async fn verify(ctx: &Context, filename: &str, print_xml: bool) -> Result<()> {
    let (xml, info) = ctx.depot.verify_feed(filename).await?;
    output::print_feed_verified(filename, &info, print_xml.then_some(xml.as_str()), ctx.json)
}

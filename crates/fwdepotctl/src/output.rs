//! Output formatting for CLI responses

use anyhow::{Error, Result};
use colored::*;
use fwdepot_crypto::SignatureInfo;
use fwdepot_repository::{PackageId, Target};
use fwdepot_service::{DeviceGroup, PackageView};
use serde::Serialize;
use serde_json::json;

use crate::error::CliError;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(CliError::from)?;
    println!("{text}");
    Ok(())
}

/// Print error in JSON format
pub fn print_error_json(error: &Error, exit_code: u8) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": format!("{error:#}"),
            "exit_code": exit_code,
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
    }
}

fn target_label(target: Target) -> ColoredString {
    match target {
        Target::Private => target.as_str().dimmed(),
        Target::Embargo => target.as_str().magenta(),
        Target::Testing => target.as_str().yellow(),
        Target::Stable => target.as_str().green(),
    }
}

fn print_package_human(view: &PackageView) {
    let package = &view.package;
    println!(
        "  {} {} [{}]",
        package.package_id.as_str().dimmed(),
        view.original_filename.bold(),
        target_label(package.target)
    );
    println!("    Group: {}", package.owning_group);
    println!("    Submitted: {}", package.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(version) = package.version() {
        println!("    Version: {version}");
    }
    println!("    Download: {}", view.download_path);
    for component in &package.components {
        println!(
            "    {} {} {} ({})",
            "•".cyan(),
            component.name,
            component.version,
            component.device_guid
        );
    }
}

/// Print one package
pub fn print_package(view: &PackageView, json: bool, heading: &str) -> Result<()> {
    if json {
        return print_json(&json!({ "success": true, "package": view }));
    }

    println!("{}", format!("{heading}:").bold());
    print_package_human(view);
    Ok(())
}

/// Print a package list
pub fn print_package_list(packages: &[PackageView], json: bool) -> Result<()> {
    if json {
        return print_json(&json!({ "success": true, "packages": packages }));
    }

    if packages.is_empty() {
        println!("{}", "No packages found".yellow());
        return Ok(());
    }

    println!("{}", format!("{} packages:", packages.len()).bold());
    for view in packages {
        print_package_human(view);
    }
    Ok(())
}

/// Print the outcome of a promotion
pub fn print_promotion(id: &PackageId, previous: Target, target: Target, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "success": true,
            "package_id": id,
            "previous": previous,
            "target": target,
        }));
    }

    if previous == target {
        println!("{} {} already in {}", "✓".green(), id, target_label(target));
    } else {
        println!(
            "{} {} moved {} → {}",
            "✓".green(),
            id,
            target_label(previous),
            target_label(target)
        );
    }
    Ok(())
}

/// Print a deletion
pub fn print_deleted(id: &PackageId, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({ "success": true, "deleted": id }));
    }
    println!("{} Deleted {}", "✓".green(), id);
    Ok(())
}

/// Print feed files written by a rebuild
pub fn print_written_feeds(written: &[String], json: bool) -> Result<()> {
    if json {
        return print_json(&json!({ "success": true, "written": written }));
    }

    if written.is_empty() {
        println!("{}", "All feeds up to date".green());
        return Ok(());
    }
    for file in written {
        println!("  {} {}", "wrote".cyan(), file);
    }
    Ok(())
}

/// Print a counted result
pub fn print_count(key: &str, count: usize, label: &str, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({ "success": true, key: count }));
    }
    println!("{} {count} {label}", "✓".green());
    Ok(())
}

/// Print the public device list
pub fn print_devices(groups: &[DeviceGroup], json: bool) -> Result<()> {
    if json {
        return print_json(&json!({ "success": true, "vendors": groups }));
    }

    if groups.is_empty() {
        println!("{}", "No stable firmware published".yellow());
        return Ok(());
    }

    for group in groups {
        println!("{}", group.developer_name.bold());
        for device in &group.devices {
            println!(
                "  {} {} ({}) {}",
                device.name,
                device.version.green(),
                device.device_guid.dimmed(),
                device.filename
            );
        }
    }
    Ok(())
}

/// Print a verified feed
pub fn print_feed_verified(filename: &str, info: &SignatureInfo, xml: Option<&str>, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "success": true,
            "feed": filename,
            "signature": info,
            "xml": xml,
        }));
    }

    println!("{} {} signed by {}", "✓".green(), filename.bold(), info.signer);
    println!("  Key: {}", info.key_fingerprint);
    println!("  Signed: {}", info.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(xml) = xml {
        println!("{xml}");
    }
    Ok(())
}

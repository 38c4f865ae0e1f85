//! Firmware ingestion and feed publication for fwdepot
//!
//! Ties the archive, metadata, signing and repository crates together into
//! the operations the web layer and `fwdepotctl` call:
//!
//! - [`ingest`]: validate an uploaded cabinet, checksum and sign its payloads
//! - [`feed`]: render, sign and publish the per-audience AppStream feeds
//! - [`depot`]: the [`FirmwareDepot`] facade with ingest, promote, delete and
//!   maintenance operations
//! - [`checkpoint`]: snapshot of the repository after every mutation
//! - [`cache`]: digest and size of every published file
//! - [`audit`]: the audit trail collaborator
//!
//! # Example
//!
//! ```no_run
//! use fwdepot_service::prelude::*;
//!
//! # async fn example(data: Vec<u8>) -> DepotResult<()> {
//! let depot = FirmwareDepot::open(DepotConfig::with_root("/var/lib/fwdepot")).await?;
//!
//! let request = UploadRequest::new("widget.cab", data, "acme");
//! let id = depot.ingest(request, &ActorCapabilities::member("acme")).await?;
//! depot.promote(&id, Target::Stable, &ActorCapabilities::qa("acme")).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod audit;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod depot;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod prelude;
pub mod signing;

pub use config::DepotConfig;
pub use depot::{DeviceEntry, DeviceGroup, FirmwareDepot, PackageView};
pub use error::{DepotError, DepotResult, ValidationError};
pub use ingest::UploadRequest;

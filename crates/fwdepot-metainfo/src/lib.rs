//! Firmware metadata for fwdepot
//!
//! An uploaded cabinet carries two kinds of metadata next to the payload: an
//! optional Windows INF driver description and one or more AppStream
//! `*.metainfo.xml` component descriptors. This crate parses both from
//! untrusted bytes and applies the rules a submission must satisfy.
//!
//! - [`inf`]: INF decoding and key/value lookup
//! - [`driver`]: firmware class, `DriverVer` and registry version checks
//! - [`component`]: AppStream component model and schema validation
//! - [`descriptor`]: structural checks on a submitted descriptor
//!
//! ```
//! use fwdepot_metainfo::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let inf = b"[Version]\nClass=Firmware\nClassGuid={f2e7dd72-6468-4e36-b6f1-6488f42c1b52}\nDriverVer=01/01/2020,1.2.3\n";
//! let driver = DriverInfo::from_bytes("firmware.inf", inf)?;
//! assert_eq!(driver.display_version(), Some("1.2.3"));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod component;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod inf;
pub mod prelude;

pub use component::{Checksum, Component, Provide, Release};
pub use descriptor::validate_descriptor;
pub use driver::{DriverInfo, DriverVer};
pub use error::{MetainfoError, MetainfoResult};
pub use inf::InfFile;

//! Firmware package repository for fwdepot
//!
//! Holds every validated [`FirmwarePackage`], keyed by the content hash of the
//! uploaded archive, and enforces the repository-wide invariants:
//!
//! - package identifiers are unique
//! - no two components share a `(device_guid, version)` pair
//! - a component identifier stays bound to the first device GUID it was used for
//!
//! # Architecture
//!
//! - [`model`]: packages, components, targets and filters
//! - [`audience`]: feed visibility scopes and which ones a change affects
//! - [`promotion`]: actor capabilities and the authorization rules
//! - [`repository`]: snapshot reads and serialized, atomically persisted writes
//! - [`storage`]: flat artifact directories with atomic replacement
//!
//! # Example
//!
//! ```no_run
//! use fwdepot_repository::prelude::*;
//!
//! # async fn example(package: FirmwarePackage) -> RepositoryResult<()> {
//! let repo = FirmwareRepository::open("/var/lib/fwdepot/db".as_ref()).await?;
//!
//! let mut txn = repo.begin().await;
//! txn.insert(package)?;
//! let generation = txn.commit().await?;
//! assert_eq!(repo.generation(), generation);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod audience;
pub mod error;
pub mod model;
pub mod prelude;
pub mod promotion;
pub mod repository;
pub mod storage;

pub use audience::Audience;
pub use error::{PermissionError, RepositoryError, RepositoryResult};
pub use model::{ComponentRecord, FirmwarePackage, PackageFilter, PackageId, Target};
pub use promotion::{ActorCapabilities, PromotionPolicy};
pub use repository::{FirmwareRepository, RepositoryState, Transaction};
pub use storage::FileStorage;

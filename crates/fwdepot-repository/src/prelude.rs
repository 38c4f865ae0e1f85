//! Convenience re-exports for common types

pub use crate::audience::Audience;
pub use crate::error::{PermissionError, RepositoryError, RepositoryResult};
pub use crate::model::{ComponentRecord, FirmwarePackage, PackageFilter, PackageId, Target};
pub use crate::promotion::{ActorCapabilities, PromotionPolicy};
pub use crate::repository::{FirmwareRepository, RepositoryState, Transaction};
pub use crate::storage::FileStorage;

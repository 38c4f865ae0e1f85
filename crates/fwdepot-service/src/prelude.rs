//! Convenience re-exports for common types

pub use crate::audit::{AuditEvent, AuditKind, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use crate::cache::{CacheEntry, FileCache};
pub use crate::checkpoint::{Checkpointer, FileCheckpointer};
pub use crate::config::{ArchiveCompression, DepotConfig};
pub use crate::depot::{DeviceEntry, DeviceGroup, FirmwareDepot, PackageView};
pub use crate::error::{DepotError, DepotResult, ValidationError};
pub use crate::feed::{FeedAggregator, feed_filename};
pub use crate::ingest::{IngestPipeline, UploadRequest};
pub use crate::signing::SigningEngine;
pub use fwdepot_repository::{ActorCapabilities, Audience, PackageFilter, PackageId, PermissionError, Target};

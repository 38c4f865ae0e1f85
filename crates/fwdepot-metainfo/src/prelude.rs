//! Prelude for fwdepot-metainfo

pub use crate::component::{
    CHECKSUM_KIND_SHA256, CHECKSUM_TARGET_CONTAINER, CHECKSUM_TARGET_CONTENT, Checksum, Component,
    Provide, Release,
};
pub use crate::descriptor::{
    DEFAULT_CONTENT_FILENAME, DESCRIPTOR_SUFFIX, PLACEHOLDER, content_filename, validate_descriptor,
};
pub use crate::driver::{
    DriverInfo, DriverVer, FIRMWARE_CLASS, FIRMWARE_CLASS_GUID, normalize_firmware_version,
};
pub use crate::error::{MetainfoError, MetainfoResult};
pub use crate::inf::InfFile;

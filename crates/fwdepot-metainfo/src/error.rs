//! Error types for metadata parsing and validation

use thiserror::Error;

/// Metadata errors
///
/// Every variant describes a problem with submitted data and is meant to be shown
/// to the submitter as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetainfoError {
    /// A required INF key is absent
    #[error("The inf file {section}:{key} was missing")]
    MissingKey {
        /// Section name
        section: String,
        /// Key name
        key: String,
    },

    /// INF text could not be decoded
    #[error("The inf file could not be decoded: {0}")]
    InvalidEncoding(String),

    /// `Version.Class` is not `Firmware`
    #[error("The inf file Version:Class was invalid: '{0}'")]
    InvalidClass(String),

    /// `Version.ClassGuid` is not the firmware class GUID
    #[error("The inf file Version:ClassGuid was invalid: '{0}'")]
    InvalidClassGuid(String),

    /// `Version.DriverVer` does not split into date and version
    #[error("The inf file Version:DriverVer was invalid: '{0}'")]
    InvalidDriverVer(String),

    /// `HKR->FirmwareVersion` is not a number
    #[error("The inf Firmware_AddReg[HKR->FirmwareVersion] '{0}' is not a valid number")]
    InvalidFirmwareVersion(String),

    /// INF firmware version disagrees with the metainfo release
    #[error(
        "The inf Firmware_AddReg[HKR->FirmwareVersion] '{inf}' did not match the metainfo.xml value '{metainfo}'"
    )]
    FirmwareVersionMismatch {
        /// Normalized INF value
        inf: String,
        /// Release version from the descriptor
        metainfo: String,
    },

    /// Descriptor is not well-formed XML
    #[error("The metadata could not be parsed: {0}")]
    Parse(String),

    /// Descriptor is well-formed but violates the schema
    #[error("The metadata file did not validate: {}", .0.join("; "))]
    SchemaValidation(Vec<String>),

    /// A file still contains a template placeholder
    #[error("The file {file} was not complete; any FIXME text must be replaced with the correct values")]
    UnresolvedPlaceholder {
        /// File containing the placeholder
        file: String,
    },

    /// Descriptor provides no device GUID
    #[error("The metadata file did not provide any GUID")]
    NoProvides,

    /// Descriptor has no release
    #[error("The metadata file did not provide any releases")]
    NoReleases,
}

impl MetainfoError {
    /// Create a missing-key error
    pub fn missing_key(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            section: section.into(),
            key: key.into(),
        }
    }
}

/// Result type for metadata operations
pub type MetainfoResult<T> = std::result::Result<T, MetainfoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_display() {
        let err = MetainfoError::missing_key("Version", "Class");
        assert_eq!(err.to_string(), "The inf file Version:Class was missing");
    }

    #[test]
    fn test_schema_errors_joined() {
        let err = MetainfoError::SchemaValidation(vec!["a".into(), "b".into()]);
        assert!(err.to_string().ends_with("a; b"));
    }
}

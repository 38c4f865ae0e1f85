//! Error types for repository operations

use thiserror::Error;

/// Errors raised by the firmware repository
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A package with the same content hash already exists
    #[error("A firmware file with hash {0} already exists")]
    DuplicateIdentity(String),

    /// Another component already ships this version for the device
    #[error("A firmware file for device {device_guid} version {version} already exists in {existing}")]
    DuplicateDeviceVersion {
        /// Device GUID
        device_guid: String,
        /// Release version
        version: String,
        /// Package already holding the pair
        existing: String,
    },

    /// A component identifier is bound to another device
    #[error(
        "The component {component_id} was previously used for device {existing_guid} and cannot be reassigned to {device_guid}"
    )]
    IdentifierReassigned {
        /// Component identifier
        component_id: String,
        /// Device GUID in the new submission
        device_guid: String,
        /// Device GUID the identifier is bound to
        existing_guid: String,
    },

    /// Package does not exist
    #[error("No firmware with ID {0} exists")]
    NotFound(String),

    /// Package identifier is not a SHA-256 digest
    #[error("Invalid package ID: {0}")]
    InvalidPackageId(String),

    /// Unknown target name
    #[error("Invalid target '{0}'; expected private, embargo, testing or stable")]
    InvalidTarget(String),

    /// Package has no components
    #[error("Package {0} has no components")]
    EmptyPackage(String),

    /// An update tried to change an identity or checksum field
    #[error("Field {field} of package {package_id} cannot be changed")]
    ImmutableField {
        /// Package identifier
        package_id: String,
        /// Field that changed
        field: &'static str,
    },

    /// Persisted state has an unknown layout
    #[error("Unsupported repository schema version: {0}")]
    UnsupportedSchema(u32),

    /// Persisted state could not be (de)serialized
    #[error("Repository state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl RepositoryError {
    /// Whether this error reports a uniqueness invariant violation
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIdentity(_)
                | Self::DuplicateDeviceVersion { .. }
                | Self::IdentifierReassigned { .. }
        )
    }

    /// Check if this error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(_) => true,
            Self::DuplicateIdentity(_)
            | Self::DuplicateDeviceVersion { .. }
            | Self::IdentifierReassigned { .. }
            | Self::NotFound(_)
            | Self::InvalidPackageId(_)
            | Self::InvalidTarget(_)
            | Self::EmptyPackage(_)
            | Self::ImmutableField { .. }
            | Self::UnsupportedSchema(_)
            | Self::Serialization(_) => false,
        }
    }

    /// Create a not-found error
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }
}

/// Authorization failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Actor does not belong to the package's group
    #[error("Insufficient permissions to access firmware of group {group}")]
    NoGroupAccess {
        /// Owning group
        group: String,
    },

    /// Action needs QA capability for the group
    #[error("Unable to {action} as not QA")]
    QaRequired {
        /// Attempted action
        action: String,
    },

    /// Action needs administrator capability
    #[error("Unable to {operation} as not admin")]
    AdminRequired {
        /// Attempted operation
        operation: String,
    },
}

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_classification() {
        assert!(RepositoryError::DuplicateIdentity("a".into()).is_invariant_violation());
        assert!(!RepositoryError::not_found("a").is_invariant_violation());
        assert!(RepositoryError::Storage(anyhow::anyhow!("disk full")).is_recoverable());
        assert!(!RepositoryError::InvalidTarget("x".into()).is_recoverable());
    }

    #[test]
    fn test_permission_messages() {
        let err = PermissionError::QaRequired {
            action: "move firmware to stable".into(),
        };
        assert_eq!(err.to_string(), "Unable to move firmware to stable as not QA");
    }
}

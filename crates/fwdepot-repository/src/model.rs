//! Firmware package data model

use crate::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use fwdepot_crypto::utils::{compute_sha256_hex, is_sha256_hex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Package identifier, the SHA-256 of the uploaded archive
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Validate a lowercase hex digest
    pub fn new(value: impl Into<String>) -> RepositoryResult<Self> {
        let value = value.into();
        if is_sha256_hex(&value) && !value.bytes().any(|b| b.is_ascii_uppercase()) {
            Ok(Self(value))
        } else {
            Err(RepositoryError::InvalidPackageId(value))
        }
    }

    /// Identifier for an uploaded archive
    pub fn from_content(data: &[u8]) -> Self {
        Self(compute_sha256_hex(data))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageId {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = RepositoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

/// Trust stage a package occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Visible to the owning group only
    #[default]
    Private,
    /// Published in the group feed
    Embargo,
    /// Published to testing clients
    Testing,
    /// Published to everyone
    Stable,
}

impl Target {
    /// Every target, least to most public
    pub const ALL: [Target; 4] = [Self::Private, Self::Embargo, Self::Testing, Self::Stable];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Embargo => "embargo",
            Self::Testing => "testing",
            Self::Stable => "stable",
        }
    }

    /// Whether moving into this target needs QA capability at upload
    pub fn requires_qa_on_upload(self) -> bool {
        matches!(self, Self::Testing | Self::Stable)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RepositoryError::InvalidTarget(s.to_string()))
    }
}

/// One validated firmware component of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Vendor-chosen component identifier
    pub component_id: String,
    /// Device the firmware targets
    pub device_guid: String,
    /// Display name
    pub name: String,
    /// One-line summary
    pub summary: String,
    /// Component description markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Vendor name
    pub developer_name: String,
    /// License of the metadata
    pub metadata_license: String,
    /// License of the firmware
    pub project_license: String,
    /// Homepage URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Release version
    pub version: String,
    /// Release notes markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_description: Option<String>,
    /// Release time as a Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_timestamp: Option<i64>,
    /// Payload size in bytes
    pub installed_size: u64,
    /// Uploaded archive size in bytes
    pub download_size: u64,
    /// SHA-256 of the payload member
    pub content_checksum: String,
    /// Payload member name
    pub content_filename: String,
    /// SHA-256 of the distributed archive
    pub container_checksum: String,
}

/// Validated firmware package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwarePackage {
    /// Content hash of the uploaded archive
    pub package_id: PackageId,
    /// Artifact name, `{package_id}-{original filename}`
    pub stored_filename: String,
    /// Address the upload came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,
    /// Upload time
    pub submitted_at: DateTime<Utc>,
    /// Vendor or QA group owning the package
    pub owning_group: String,
    /// Current trust stage
    pub target: Target,
    /// Version shown to users instead of the component version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_version: Option<String>,
    /// Components, never empty
    pub components: Vec<ComponentRecord>,
}

impl FirmwarePackage {
    /// Artifact name for an upload
    pub fn stored_filename_for(package_id: &PackageId, original_filename: &str) -> String {
        format!("{package_id}-{original_filename}")
    }

    /// Filename the vendor uploaded
    pub fn original_filename(&self) -> &str {
        self.stored_filename
            .strip_prefix(self.package_id.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(&self.stored_filename)
    }

    /// Version to show for the package
    pub fn version(&self) -> Option<&str> {
        self.display_version
            .as_deref()
            .or_else(|| self.components.first().map(|c| c.version.as_str()))
    }

    /// Component for a device
    pub fn component_for(&self, device_guid: &str) -> Option<&ComponentRecord> {
        self.components.iter().find(|c| c.device_guid == device_guid)
    }
}

/// Package selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFilter {
    /// Owning group
    pub group: Option<String>,
    /// Exact target
    pub target: Option<Target>,
    /// Packages with a component for this device
    pub device_guid: Option<String>,
}

impl PackageFilter {
    /// Match every package
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Restrict to a target
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Restrict to a device
    pub fn with_device(mut self, device_guid: impl Into<String>) -> Self {
        self.device_guid = Some(device_guid.into());
        self
    }

    /// Whether `package` is selected
    pub fn matches(&self, package: &FirmwarePackage) -> bool {
        self.group.as_ref().is_none_or(|g| *g == package.owning_group)
            && self.target.is_none_or(|t| t == package.target)
            && self
                .device_guid
                .as_ref()
                .is_none_or(|guid| package.component_for(guid).is_some())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_package_id_validation() -> Result<(), Box<dyn std::error::Error>> {
        let id = PackageId::from_content(b"archive");
        assert_eq!(PackageId::new(id.as_str())?, id);
        assert!(PackageId::new("abc").is_err());
        assert!(PackageId::new(id.as_str().to_ascii_uppercase()).is_err());
        let prefix = id.as_str().get(..62).unwrap_or_default();
        assert!(PackageId::new(format!("{prefix}/x")).is_err());
        Ok(())
    }

    #[test]
    fn test_package_id_serde() -> Result<(), Box<dyn std::error::Error>> {
        let id = PackageId::from_content(b"archive");
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, format!("\"{id}\""));
        assert_eq!(serde_json::from_str::<PackageId>(&json)?, id);
        assert!(serde_json::from_str::<PackageId>("\"../etc/passwd\"").is_err());
        Ok(())
    }

    #[test]
    fn test_target_parse_and_order() -> Result<(), Box<dyn std::error::Error>> {
        for target in Target::ALL {
            assert_eq!(target.as_str().parse::<Target>()?, target);
        }
        assert!("Stable".parse::<Target>().is_err());
        assert!(Target::Private < Target::Stable);
        assert_eq!(serde_json::to_string(&Target::Embargo)?, "\"embargo\"");
        Ok(())
    }

    #[test]
    fn test_original_filename_and_version() {
        let mut pkg = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        assert_eq!(pkg.original_filename(), "firmware.cab");
        assert_eq!(pkg.version(), Some("1.0"));

        pkg.display_version = Some("1.0 (build 7)".into());
        assert_eq!(pkg.version(), Some("1.0 (build 7)"));
    }

    #[test]
    fn test_filter() {
        let mut pkg = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        pkg.target = Target::Testing;

        assert!(PackageFilter::all().matches(&pkg));
        assert!(PackageFilter::all().with_group("acme").with_target(Target::Testing).matches(&pkg));
        assert!(!PackageFilter::all().with_group("other").matches(&pkg));
        assert!(!PackageFilter::all().with_target(Target::Stable).matches(&pkg));
        assert!(PackageFilter::all().with_device("g1").matches(&pkg));
        assert!(!PackageFilter::all().with_device("g2").matches(&pkg));
    }
}

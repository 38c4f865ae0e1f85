//! Driver information checks
//!
//! Applies the firmware-specific rules on top of a parsed [`InfFile`]: the
//! device class must be firmware, `DriverVer` must be well formed, and an
//! optional registry firmware version is normalized for comparison with the
//! descriptor release.

use crate::descriptor::PLACEHOLDER;
use crate::error::{MetainfoError, MetainfoResult};
use crate::inf::{self, InfFile};
use tracing::debug;

/// Required `Version.Class` value
pub const FIRMWARE_CLASS: &str = "Firmware";

/// Required `Version.ClassGuid` value, compared case-insensitively
pub const FIRMWARE_CLASS_GUID: &str = "{f2e7dd72-6468-4e36-b6f1-6488f42c1b52}";

const VERSION_SECTION: &str = "Version";
const ADD_REG_SECTION: &str = "Firmware_AddReg";
const FIRMWARE_VERSION_KEY: &str = "HKR->FirmwareVersion";

/// Parsed `Version.DriverVer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverVer {
    /// Release date as written, e.g. `01/01/2020`
    pub date: String,
    /// Human-readable version
    pub version: String,
}

impl DriverVer {
    /// Parse `date,version`
    pub fn parse(value: &str) -> MetainfoResult<Self> {
        let fields: Vec<&str> = value.split(',').collect();
        match fields.as_slice() {
            [date, version] => Ok(Self {
                date: date.trim().to_string(),
                version: version.trim().to_string(),
            }),
            _ => Err(MetainfoError::InvalidDriverVer(value.to_string())),
        }
    }
}

/// Normalize a registry firmware version
///
/// `0x`-prefixed values are converted to decimal and every other value is
/// kept as written. A literal `0` means the value is unset and yields `None`.
pub fn normalize_firmware_version(raw: &str) -> MetainfoResult<Option<String>> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16)
            .map_err(|_parse| MetainfoError::InvalidFirmwareVersion(raw.to_string()))?
            .to_string(),
        None => raw.to_string(),
    };

    Ok((value != "0").then_some(value))
}

/// Validated driver information from an INF member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Class GUID as written in the file
    pub class_guid: String,
    /// `DriverVer`, when present
    pub driver_ver: Option<DriverVer>,
    /// Normalized registry firmware version, when present and non-zero
    pub firmware_version: Option<String>,
}

impl DriverInfo {
    /// Decode, parse and check an INF member named `name`
    pub fn from_bytes(name: &str, bytes: &[u8]) -> MetainfoResult<Self> {
        let text = inf::decode(bytes)?;
        if text.contains(PLACEHOLDER) {
            return Err(MetainfoError::UnresolvedPlaceholder {
                file: name.to_string(),
            });
        }
        Self::from_inf(&InfFile::parse_str(&text))
    }

    /// Check an already parsed INF file
    pub fn from_inf(inf: &InfFile) -> MetainfoResult<Self> {
        let class = inf.get(VERSION_SECTION, "Class")?;
        if class != FIRMWARE_CLASS {
            return Err(MetainfoError::InvalidClass(class.to_string()));
        }

        let class_guid = inf.get(VERSION_SECTION, "ClassGuid")?;
        if !class_guid.eq_ignore_ascii_case(FIRMWARE_CLASS_GUID) {
            return Err(MetainfoError::InvalidClassGuid(class_guid.to_string()));
        }

        let driver_ver = inf
            .get_optional(VERSION_SECTION, "DriverVer")
            .map(DriverVer::parse)
            .transpose()?;

        let firmware_version = match inf.get_optional(ADD_REG_SECTION, FIRMWARE_VERSION_KEY) {
            Some(raw) => normalize_firmware_version(raw)?,
            None => None,
        };

        debug!(
            driver_ver = ?driver_ver,
            firmware_version = ?firmware_version,
            "Validated driver information"
        );

        Ok(Self {
            class_guid: class_guid.to_string(),
            driver_ver,
            firmware_version,
        })
    }

    /// Version shown to users, taken from `DriverVer`
    pub fn display_version(&self) -> Option<&str> {
        self.driver_ver.as_ref().map(|d| d.version.as_str())
    }

    /// Require the registry firmware version, when set, to equal `version`
    pub fn check_release_version(&self, version: &str) -> MetainfoResult<()> {
        match &self.firmware_version {
            Some(inf) if inf != version => Err(MetainfoError::FirmwareVersionMismatch {
                inf: inf.clone(),
                metainfo: version.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

//! Ingestion pipeline
//!
//! Turns an uploaded archive into a validated [`FirmwarePackage`] plus the
//! signed distribution archive, without touching any store. The caller inserts
//! the package and writes the artifacts inside one repository transaction.

use crate::config::IngestConfig;
use crate::error::{DepotResult, ValidationError};
use crate::signing::SigningEngine;
use chrono::{DateTime, Utc};
use fwdepot_cabinet::{ArchiveReader, CabArchive, CabFile, ExternalDecompressor};
use fwdepot_crypto::detached::signature_name;
use fwdepot_crypto::utils::compute_sha256_hex;
use fwdepot_metainfo::prelude::*;
use fwdepot_repository::{ComponentRecord, FirmwarePackage, PackageId, Target};
use tracing::{debug, info, warn};

/// Pattern selecting driver-info members
pub const INF_PATTERN: &str = "*.inf";

/// Pattern selecting component descriptor members
pub const DESCRIPTOR_PATTERN: &str = "*.metainfo.xml";

/// One upload as received from a vendor
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Filename the vendor uploaded
    pub filename: String,
    /// Raw archive bytes
    pub data: Vec<u8>,
    /// Group the upload is made for
    pub group: String,
    /// Requested initial target
    pub target: Target,
    /// Address the upload came from
    pub origin_address: Option<String>,
}

impl UploadRequest {
    /// Private upload for `group`
    pub fn new(filename: impl Into<String>, data: Vec<u8>, group: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            data,
            group: group.into(),
            target: Target::Private,
            origin_address: None,
        }
    }

    /// Request a different initial target
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Record the origin address
    pub fn with_origin(mut self, address: impl Into<String>) -> Self {
        self.origin_address = Some(address.into());
        self
    }
}

/// A component descriptor matched with its payload
#[derive(Debug, Clone)]
pub struct DescribedComponent {
    /// Validated descriptor
    pub component: Component,
    /// Archive member holding the payload
    pub payload_name: String,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl DescribedComponent {
    /// Shipped release version
    pub fn version(&self) -> &str {
        self.component.release().map_or("", |r| r.version.as_str())
    }
}

/// Metadata extracted from an archive, before signing
#[derive(Debug, Clone)]
pub struct ArchiveMetadata {
    /// Driver information, when the archive has an INF member
    pub driver: Option<DriverInfo>,
    /// Components in descriptor member order
    pub components: Vec<DescribedComponent>,
}

impl ArchiveMetadata {
    /// Version shown to users, from `DriverVer`
    pub fn display_version(&self) -> Option<String> {
        self.driver
            .as_ref()
            .and_then(DriverInfo::display_version)
            .map(str::to_string)
    }
}

/// Validated upload ready to be stored
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    /// Package record to insert
    pub package: FirmwarePackage,
    /// Original uploaded bytes
    pub upload: Vec<u8>,
    /// Signed, re-serialized archive
    pub distribution: Vec<u8>,
}

/// Archive validation and signing
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    config: IngestConfig,
    reader: ArchiveReader,
    signer: SigningEngine,
}

impl IngestPipeline {
    /// Build the pipeline
    ///
    /// The external decompressor is only used when it exists on this host;
    /// otherwise only natively supported compression is accepted.
    pub fn new(config: IngestConfig, signer: SigningEngine) -> Self {
        let decompressor = ExternalDecompressor::new(&config.decompressor_path, config.decompressor_timeout());
        if !decompressor.is_available() {
            warn!(
                program = %config.decompressor_path.display(),
                "External decompressor not found, using native decompression only"
            );
        }

        let reader = ArchiveReader::new()
            .with_max_uncompressed_size(config.max_uncompressed_size)
            .with_decompressor(decompressor);

        Self {
            config,
            reader,
            signer,
        }
    }

    /// Reject uploads outside the configured size bounds
    pub fn check_size(&self, len: usize) -> Result<(), ValidationError> {
        let size = len as u64;
        if size == 0 {
            Err(ValidationError::UploadEmpty)
        } else if size < self.config.min_upload_size {
            Err(ValidationError::UploadTooSmall {
                size,
                min: self.config.min_upload_size,
            })
        } else if size > self.config.max_upload_size {
            Err(ValidationError::UploadTooLarge {
                size,
                max: self.config.max_upload_size,
            })
        } else {
            Ok(())
        }
    }

    /// Parse an archive
    pub async fn read_archive(&self, data: &[u8]) -> DepotResult<CabArchive> {
        let archive = self.reader.read(data).await?;
        debug!(members = archive.len(), bytes = archive.uncompressed_size(), "Archive parsed");
        Ok(archive)
    }

    /// Validate driver info and descriptors and locate each payload
    pub fn describe(&self, archive: &CabArchive) -> DepotResult<ArchiveMetadata> {
        let driver = archive
            .find_matching(INF_PATTERN)
            .map(|inf| DriverInfo::from_bytes(&inf.name, &inf.data))
            .transpose()?;

        let descriptors = archive.find_files(DESCRIPTOR_PATTERN);
        if descriptors.is_empty() {
            return Err(ValidationError::NoDescriptor.into());
        }

        let mut components = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let component = validate_descriptor(&descriptor.name, &descriptor.data)?;
            let filename = content_filename(&component).unwrap_or(DEFAULT_CONTENT_FILENAME);
            let payload = find_payload(archive, filename).ok_or_else(|| ValidationError::PayloadMissing {
                filename: filename.to_string(),
            })?;

            if let (Some(driver), Some(release)) = (&driver, component.release()) {
                driver.check_release_version(&release.version)?;
            }

            debug!(
                descriptor = %descriptor.name,
                component_id = %component.id,
                payload = %payload.name,
                "Descriptor validated"
            );
            components.push(DescribedComponent {
                payload_name: payload.name.clone(),
                payload: payload.data.clone(),
                component,
            });
        }

        Ok(ArchiveMetadata { driver, components })
    }

    /// Validate, checksum and sign an upload
    ///
    /// Payloads that already carry a detached signature member are verified
    /// against the trusted keyring; the others get a fresh signature added to
    /// the distribution archive.
    pub async fn prepare(&self, request: &UploadRequest, submitted_at: DateTime<Utc>) -> DepotResult<PreparedUpload> {
        self.check_size(request.data.len())?;
        let package_id = PackageId::from_content(&request.data);

        let mut archive = self.read_archive(&request.data).await?;
        let metadata = self.describe(&archive)?;

        for described in &metadata.components {
            let signature_member = signature_name(&described.payload_name);
            match archive.find_file(&signature_member) {
                Some(existing) => {
                    self.signer
                        .verify(described.payload.clone(), existing.data.clone())
                        .await?;
                }
                None => {
                    let signature = self.signer.sign(described.payload.clone()).await?;
                    archive.add_file(CabFile::new(signature_member, signature));
                }
            }
        }

        let distribution = archive.save(self.config.compression.into())?;
        let container_checksum = compute_sha256_hex(&distribution);
        let download_size = request.data.len() as u64;

        let components = metadata
            .components
            .iter()
            .map(|described| component_record(described, download_size, &container_checksum))
            .collect::<Vec<_>>();

        let package = FirmwarePackage {
            stored_filename: FirmwarePackage::stored_filename_for(&package_id, &request.filename),
            package_id,
            origin_address: request.origin_address.clone(),
            submitted_at,
            owning_group: request.group.clone(),
            target: request.target,
            display_version: metadata.display_version(),
            components,
        };

        info!(
            package_id = %package.package_id,
            components = package.components.len(),
            bytes = distribution.len(),
            "Upload prepared"
        );

        Ok(PreparedUpload {
            package,
            upload: request.data.clone(),
            distribution,
        })
    }
}

fn find_payload<'a>(archive: &'a CabArchive, filename: &str) -> Option<&'a CabFile> {
    archive
        .find_file(filename)
        .or_else(|| archive.files().iter().find(|f| f.basename() == filename))
}

/// Build the stored record of one component
///
/// The content checksum always comes from the payload bytes.
pub fn component_record(described: &DescribedComponent, download_size: u64, container_checksum: &str) -> ComponentRecord {
    let component = &described.component;
    let release = component.release();
    let content_filename = content_filename(component).unwrap_or(DEFAULT_CONTENT_FILENAME);

    ComponentRecord {
        component_id: component.id.clone(),
        device_guid: component.device_guid().unwrap_or_default().to_string(),
        name: component.name.clone().unwrap_or_default(),
        summary: component.summary.clone().unwrap_or_default(),
        description: component.description.clone(),
        developer_name: component.developer_name.clone().unwrap_or_default(),
        metadata_license: component.metadata_license.clone().unwrap_or_default(),
        project_license: component.project_license.clone().unwrap_or_default(),
        homepage: component.homepage().map(str::to_string),
        version: described.version().to_string(),
        release_description: release.and_then(|r| r.description.clone()),
        release_timestamp: release.and_then(|r| r.timestamp),
        installed_size: described.payload.len() as u64,
        download_size,
        content_checksum: compute_sha256_hex(&described.payload),
        content_filename: content_filename.to_string(),
        container_checksum: container_checksum.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepotError;
    use fwdepot_cabinet::Compression;
    use fwdepot_crypto::{KeyPair, Keyring};
    use std::time::Duration;

    const GUID: &str = "2082b5e0-7a64-478a-b1b2-e3404fab6dad";

    fn descriptor(version: &str, extra: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<component type="firmware">
  <id>com.acme.Widget.firmware</id>
  <name>Widget</name>
  <summary>Firmware for the ACME Widget</summary>
  <developer_name>ACME</developer_name>
  <metadata_license>CC0-1.0</metadata_license>
  <project_license>proprietary</project_license>
  <provides><firmware type="flashed">{GUID}</firmware></provides>
  <releases>
    <release version="{version}" date="2020-01-01">
      <description><p>Initial</p></description>
      {extra}
    </release>
  </releases>
</component>"#
        )
    }

    fn payload() -> Vec<u8> {
        (0..2048u32).map(|i| (i % 251) as u8).collect()
    }

    fn cabinet(files: Vec<(&str, Vec<u8>)>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut archive = CabArchive::new();
        for (name, data) in files {
            archive.add_file(CabFile::new(name, data));
        }
        Ok(archive.save(Compression::None)?)
    }

    fn pipeline() -> Result<IngestPipeline, Box<dyn std::error::Error>> {
        let mut keyring = Keyring::new_in_memory();
        keyring.add_signing_key("fwdepot", KeyPair::generate()?);
        let signer = SigningEngine::new(keyring, "fwdepot", Duration::from_secs(5));
        let config = IngestConfig {
            decompressor_path: "/nonexistent/cabextract".into(),
            ..IngestConfig::default()
        };
        Ok(IngestPipeline::new(config, signer))
    }

    #[test]
    fn test_size_bounds() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline()?;
        assert_eq!(pipeline.check_size(0), Err(ValidationError::UploadEmpty));
        assert!(matches!(pipeline.check_size(1023), Err(ValidationError::UploadTooSmall { .. })));
        assert!(matches!(pipeline.check_size(50_000_001), Err(ValidationError::UploadTooLarge { .. })));
        assert_eq!(pipeline.check_size(1024), Ok(()));
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_signs_and_checksums_payload() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline()?;
        let data = cabinet(vec![
            ("firmware.bin", payload()),
            ("widget.metainfo.xml", descriptor("1.2.3", "").into_bytes()),
        ])?;
        let request = UploadRequest::new("widget.cab", data.clone(), "acme");

        let prepared = pipeline.prepare(&request, Utc::now()).await?;
        let component = prepared.package.components.first().ok_or("no component")?;

        assert_eq!(prepared.package.package_id, PackageId::from_content(&data));
        assert_eq!(component.device_guid, GUID);
        assert_eq!(component.content_checksum, compute_sha256_hex(&payload()));
        assert_eq!(component.installed_size, 2048);
        assert_eq!(component.download_size, data.len() as u64);
        assert_eq!(component.container_checksum, compute_sha256_hex(&prepared.distribution));
        assert_eq!(component.release_timestamp, Some(1_577_836_800));
        assert_eq!(prepared.package.display_version, None);

        let distributed = CabArchive::parse(&prepared.distribution)?;
        let signature = distributed.find_file("firmware.bin.sig").ok_or("no signature")?;
        fwdepot_crypto::detached::verify(&payload(), &signature.data, pipeline.signer.keyring())?;
        Ok(())
    }

    #[tokio::test]
    async fn test_submitted_checksum_is_not_trusted() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline()?;
        let bogus = format!(
            r#"<checksum type="sha256" filename="fw.bin" target="content">{}</checksum>"#,
            "0".repeat(64)
        );
        let data = cabinet(vec![
            ("fw.bin", payload()),
            ("widget.metainfo.xml", descriptor("1.0", &bogus).into_bytes()),
        ])?;

        let prepared = pipeline.prepare(&UploadRequest::new("w.cab", data, "acme"), Utc::now()).await?;
        let component = prepared.package.components.first().ok_or("no component")?;
        assert_eq!(component.content_filename, "fw.bin");
        assert_eq!(component.content_checksum, compute_sha256_hex(&payload()));
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_tampered_existing_signature() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline()?;
        let mut signature = fwdepot_crypto::detached::sign(&payload(), "fwdepot", pipeline.signer.keyring())?;
        if let Some(last) = signature.last_mut() {
            *last ^= 0x01;
        }
        let data = cabinet(vec![
            ("firmware.bin", payload()),
            ("firmware.bin.sig", signature),
            ("widget.metainfo.xml", descriptor("1.0", "").into_bytes()),
        ])?;

        let result = pipeline.prepare(&UploadRequest::new("w.cab", data, "acme"), Utc::now()).await;
        assert!(matches!(result, Err(DepotError::Trust(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_structural_rejections() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline()?;

        let no_descriptor = cabinet(vec![("firmware.bin", payload())])?;
        assert!(matches!(
            pipeline.prepare(&UploadRequest::new("a.cab", no_descriptor, "acme"), Utc::now()).await,
            Err(DepotError::Validation(ValidationError::NoDescriptor))
        ));

        let no_payload = cabinet(vec![
            ("padding.txt", payload()),
            ("widget.metainfo.xml", descriptor("1.0", "").into_bytes()),
        ])?;
        assert!(matches!(
            pipeline.prepare(&UploadRequest::new("b.cab", no_payload, "acme"), Utc::now()).await,
            Err(DepotError::Validation(ValidationError::PayloadMissing { filename })) if filename == "firmware.bin"
        ));

        let mut garbage = b"MSCF".to_vec();
        garbage.extend(payload());
        assert!(matches!(
            pipeline.prepare(&UploadRequest::new("c.cab", garbage, "acme"), Utc::now()).await,
            Err(DepotError::Corruption(_) | DepotError::UnsupportedFormat(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_inf_version_must_match_release() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline()?;
        let inf = format!(
            "[Version]\nClass=Firmware\nClassGuid={FIRMWARE_CLASS_GUID}\nDriverVer=01/01/2020,1.2.3\n\n[Firmware_AddReg]\nHKR,,FirmwareVersion,%REG_DWORD%,0x10203\n\n[Strings]\nREG_DWORD=0x00010001\n"
        );
        let data = cabinet(vec![
            ("firmware.bin", payload()),
            ("firmware.inf", inf.into_bytes()),
            ("widget.metainfo.xml", descriptor("1.2.3", "").into_bytes()),
        ])?;

        let result = pipeline.prepare(&UploadRequest::new("w.cab", data, "acme"), Utc::now()).await;
        assert!(matches!(
            result,
            Err(DepotError::Validation(ValidationError::Metadata(
                MetainfoError::FirmwareVersionMismatch { .. }
            )))
        ));
        Ok(())
    }
}

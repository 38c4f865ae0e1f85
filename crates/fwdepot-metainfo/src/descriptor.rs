//! Submitted descriptor validation
//!
//! Wraps [`Component::parse`] and [`Component::validate`] with the structural
//! rules a descriptor must meet before it can be ingested.

use crate::component::{CHECKSUM_TARGET_CONTENT, Checksum, Component};
use crate::error::{MetainfoError, MetainfoResult};
use tracing::debug;

/// Payload member assumed when the release names no content checksum
pub const DEFAULT_CONTENT_FILENAME: &str = "firmware.bin";

/// Template text that must not survive into a submitted file
pub const PLACEHOLDER: &str = "FIXME";

/// Suffix identifying descriptor members in an archive
pub const DESCRIPTOR_SUFFIX: &str = ".metainfo.xml";

/// Validate descriptor member `name`
///
/// On success the shipped release carries a content checksum entry; one naming
/// [`DEFAULT_CONTENT_FILENAME`] is added when the document has none. Its value
/// is left for the caller to compute from the payload.
pub fn validate_descriptor(name: &str, raw: &[u8]) -> MetainfoResult<Component> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| MetainfoError::Parse(format!("{name} is not valid UTF-8: {e}")))?;

    let mut component = Component::parse(text)?;
    component.validate()?;

    if text.contains(PLACEHOLDER) {
        return Err(MetainfoError::UnresolvedPlaceholder {
            file: name.to_string(),
        });
    }
    if component.provides.is_empty() {
        return Err(MetainfoError::NoProvides);
    }
    let release = component.release_mut().ok_or(MetainfoError::NoReleases)?;

    match release.checksum_by_target_mut(CHECKSUM_TARGET_CONTENT) {
        Some(existing) => {
            if existing.filename.is_none() {
                existing.filename = Some(DEFAULT_CONTENT_FILENAME.to_string());
            }
        }
        None => {
            debug!(descriptor = name, "Adding default content checksum");
            release.add_checksum(Checksum::content(DEFAULT_CONTENT_FILENAME));
        }
    }

    Ok(component)
}

/// Content member named by the shipped release
pub fn content_filename(component: &Component) -> Option<&str> {
    component
        .release()?
        .checksum_by_target(CHECKSUM_TARGET_CONTENT)?
        .filename
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(body: &str) -> String {
        format!(
            r#"<component type="firmware">
  <id>com.acme.Widget.firmware</id>
  <name>Widget</name>
  <summary>Widget firmware</summary>
  <developer_name>ACME</developer_name>
  <metadata_license>CC0-1.0</metadata_license>
  <project_license>proprietary</project_license>
  {body}
</component>"#
        )
    }

    const PROVIDES: &str = "<provides><firmware type=\"flashed\">guid-1</firmware></provides>";

    #[test]
    fn test_content_checksum_synthesized() -> Result<(), Box<dyn std::error::Error>> {
        let raw = descriptor(&format!(
            "{PROVIDES}<releases><release version=\"1.0\"/></releases>"
        ));
        let component = validate_descriptor("a.metainfo.xml", raw.as_bytes())?;
        assert_eq!(content_filename(&component), Some(DEFAULT_CONTENT_FILENAME));
        Ok(())
    }

    #[test]
    fn test_existing_content_checksum_kept() -> Result<(), Box<dyn std::error::Error>> {
        let raw = descriptor(&format!(
            "{PROVIDES}<releases><release version=\"1.0\"><checksum target=\"content\" filename=\"widget.rom\"/></release></releases>"
        ));
        let component = validate_descriptor("a.metainfo.xml", raw.as_bytes())?;
        assert_eq!(content_filename(&component), Some("widget.rom"));
        Ok(())
    }

    #[test]
    fn test_structural_failures() {
        let no_provides = descriptor("<releases><release version=\"1.0\"/></releases>");
        assert_eq!(
            validate_descriptor("a.metainfo.xml", no_provides.as_bytes()),
            Err(MetainfoError::NoProvides)
        );

        let no_releases = descriptor(PROVIDES);
        assert_eq!(
            validate_descriptor("a.metainfo.xml", no_releases.as_bytes()),
            Err(MetainfoError::NoReleases)
        );

        let placeholder = descriptor(&format!(
            "{PROVIDES}<releases><release version=\"1.0\"><description><p>FIXME</p></description></release></releases>"
        ));
        assert_eq!(
            validate_descriptor("a.metainfo.xml", placeholder.as_bytes()),
            Err(MetainfoError::UnresolvedPlaceholder {
                file: "a.metainfo.xml".into()
            })
        );
    }

    #[test]
    fn test_placeholder_match_is_case_sensitive() -> Result<(), Box<dyn std::error::Error>> {
        let raw = descriptor(&format!(
            "{PROVIDES}<releases><release version=\"1.0\"><description><p>fixme later</p></description></release></releases>"
        ));
        validate_descriptor("a.metainfo.xml", raw.as_bytes())?;
        Ok(())
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            validate_descriptor("a.metainfo.xml", b"<component>\xff</component>"),
            Err(MetainfoError::Parse(_))
        ));
    }
}

//! INF driver description parser
//!
//! Reads the key/value subset of the Windows INF format used by firmware
//! packages:
//!
//! ```text
//! ; comment
//! [Version]
//! Class = Firmware
//! ClassGuid = {f2e7dd72-6468-4e36-b6f1-6488f42c1b52}
//! DriverVer = 01/01/2020,1.2.3
//!
//! [Firmware_AddReg]
//! HKR,,FirmwareVersion,%REG_DWORD%,0x00010203
//!
//! [Strings]
//! REG_DWORD = 0x00010001
//! ```
//!
//! Registry lines are exposed as keys named `HKR-><ValueName>` holding the last
//! field. `%token%` references are replaced from `[Strings]`. Section and key
//! lookups ignore ASCII case.

use crate::error::{MetainfoError, MetainfoResult};
use std::collections::HashMap;
use tracing::debug;

const STRINGS_SECTION: &str = "strings";

#[derive(Debug, Clone, Default)]
struct InfSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl InfSection {
    fn set(&mut self, key: String, value: String) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed INF file
#[derive(Debug, Clone, Default)]
pub struct InfFile {
    sections: Vec<InfSection>,
}

/// Decode INF bytes to text
///
/// Handles UTF-16LE and UTF-8 byte order marks; BOM-less input is read as UTF-8,
/// falling back to Latin-1 for legacy single-byte files.
pub fn decode(bytes: &[u8]) -> MetainfoResult<String> {
    if let Some(utf16) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        if utf16.len() % 2 != 0 {
            return Err(MetainfoError::InvalidEncoding(
                "odd number of bytes in UTF-16 text".to_string(),
            ));
        }
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair.first().copied().unwrap_or(0), pair.get(1).copied().unwrap_or(0)]))
            .collect();
        return String::from_utf16(&units).map_err(|e| MetainfoError::InvalidEncoding(e.to_string()));
    }

    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => Ok(bytes.iter().copied().map(char::from).collect()),
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return line.get(..i).unwrap_or(line),
            _ => {}
        }
    }
    line
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_registry_line(line: &str) -> Option<(String, String)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let name = unquote(fields.get(2)?);
    if name.is_empty() {
        return None;
    }
    let value = if fields.len() > 3 {
        unquote(fields.last().copied().unwrap_or_default())
    } else {
        ""
    };
    Some((format!("HKR->{name}"), value.to_string()))
}

impl InfFile {
    /// Decode and parse INF bytes
    pub fn parse(bytes: &[u8]) -> MetainfoResult<Self> {
        Ok(Self::parse_str(&decode(bytes)?))
    }

    /// Parse INF text
    ///
    /// Parsing is lenient: lines that are neither sections, assignments nor
    /// registry entries are kept as keys with an empty value.
    pub fn parse_str(text: &str) -> Self {
        let mut sections: Vec<InfSection> = Vec::new();

        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim();
                if !sections.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                    sections.push(InfSection {
                        name: name.to_string(),
                        entries: Vec::new(),
                    });
                }
                // Repeated headers continue the existing section
                if let Some(index) = sections.iter().position(|s| s.name.eq_ignore_ascii_case(name)) {
                    let section = sections.remove(index);
                    sections.push(section);
                }
                continue;
            }

            let Some(section) = sections.last_mut() else {
                continue;
            };

            let is_registry = line
                .get(..3)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("HKR"))
                && line.get(3..).is_some_and(|rest| rest.trim_start().starts_with(','));
            if is_registry {
                if let Some((key, value)) = parse_registry_line(line) {
                    section.set(key, value);
                }
            } else if let Some((key, value)) = line.split_once('=') {
                section.set(key.trim().to_string(), unquote(value).to_string());
            } else {
                section.set(line.to_string(), String::new());
            }
        }

        let mut inf = Self { sections };
        inf.substitute_strings();
        debug!(sections = inf.sections.len(), "Parsed INF file");
        inf
    }

    fn substitute_strings(&mut self) {
        let strings: HashMap<String, String> = self
            .section(STRINGS_SECTION)
            .map(|s| {
                s.entries
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        if strings.is_empty() {
            return;
        }

        for section in &mut self.sections {
            if section.name.eq_ignore_ascii_case(STRINGS_SECTION) {
                continue;
            }
            for (_, value) in &mut section.entries {
                if value.contains('%') {
                    *value = substitute(value, &strings);
                }
            }
        }
    }

    fn section(&self, name: &str) -> Option<&InfSection> {
        self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Look up a key, failing with [`MetainfoError::MissingKey`]
    pub fn get(&self, section: &str, key: &str) -> MetainfoResult<&str> {
        self.get_optional(section, key)
            .ok_or_else(|| MetainfoError::missing_key(section, key))
    }

    /// Look up a key that may be absent
    pub fn get_optional(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    /// Whether a section exists
    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// Section names in file order of first appearance
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }
}

fn substitute(value: &str, strings: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('%') {
        out.push_str(rest.get(..start).unwrap_or_default());
        let after = rest.get(start + 1..).unwrap_or_default();
        match after.find('%') {
            Some(0) => {
                out.push('%');
                rest = after.get(1..).unwrap_or_default();
            }
            Some(end) => {
                let token = after.get(..end).unwrap_or_default();
                match strings.get(&token.to_ascii_lowercase()) {
                    Some(replacement) => out.push_str(replacement),
                    None => {
                        out.push('%');
                        out.push_str(token);
                        out.push('%');
                    }
                }
                rest = after.get(end + 1..).unwrap_or_default();
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
; Example firmware INF
[Version]
Signature = \"$WINDOWS NT$\"
Class = Firmware ; trailing comment
ClassGuid = {f2e7dd72-6468-4e36-b6f1-6488f42c1b52}
DriverVer = 01/01/2020,1.2.3
Provider = %Provider%

[Firmware_AddReg]
HKR,,FirmwareFilename,,firmware.bin
HKR,,FirmwareVersion,%REG_DWORD%,0x00010203

[SourceDisksFiles]
firmware.bin = 1

[Strings]
Provider = \"ACME; Inc\"
REG_DWORD = 0x00010001
";

    #[test]
    fn test_basic_lookup() -> Result<(), Box<dyn std::error::Error>> {
        let inf = InfFile::parse_str(SAMPLE);
        assert_eq!(inf.get("Version", "Class")?, "Firmware");
        assert_eq!(inf.get("version", "CLASSGUID")?, "{f2e7dd72-6468-4e36-b6f1-6488f42c1b52}");
        assert_eq!(inf.get("Version", "Signature")?, "$WINDOWS NT$");
        Ok(())
    }

    #[test]
    fn test_missing_key() {
        let inf = InfFile::parse_str(SAMPLE);
        assert_eq!(
            inf.get("Version", "CatalogFile"),
            Err(MetainfoError::missing_key("Version", "CatalogFile"))
        );
        assert!(inf.get("Nope", "Class").is_err());
    }

    #[test]
    fn test_registry_lines() -> Result<(), Box<dyn std::error::Error>> {
        let inf = InfFile::parse_str(SAMPLE);
        assert_eq!(inf.get("Firmware_AddReg", "HKR->FirmwareVersion")?, "0x00010203");
        assert_eq!(inf.get("Firmware_AddReg", "HKR->FirmwareFilename")?, "firmware.bin");
        Ok(())
    }

    #[test]
    fn test_strings_substitution() -> Result<(), Box<dyn std::error::Error>> {
        let inf = InfFile::parse_str(SAMPLE);
        assert_eq!(inf.get("Version", "Provider")?, "ACME; Inc");
        assert_eq!(substitute("100%% %unknown%", &HashMap::new()), "100% %unknown%");
        Ok(())
    }

    #[test]
    fn test_utf16_with_bom() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "[Version]\r\nClass=Firmware\r\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let inf = InfFile::parse(&bytes)?;
        assert_eq!(inf.get("Version", "Class")?, "Firmware");
        Ok(())
    }

    #[test]
    fn test_odd_utf16_rejected() {
        assert!(matches!(
            InfFile::parse(&[0xFF, 0xFE, 0x41]),
            Err(MetainfoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_latin1_fallback() -> Result<(), Box<dyn std::error::Error>> {
        let inf = InfFile::parse(b"[Strings]\nVendor=Caf\xe9\n")?;
        assert_eq!(inf.get("Strings", "Vendor")?, "Café");
        Ok(())
    }

    #[test]
    fn test_repeated_sections_merge() -> Result<(), Box<dyn std::error::Error>> {
        let inf = InfFile::parse_str("[A]\nx=1\n[B]\ny=2\n[a]\nz=3\nx=4\n");
        assert_eq!(inf.get("A", "x")?, "4");
        assert_eq!(inf.get("A", "z")?, "3");
        assert_eq!(inf.section_names().count(), 2);
        Ok(())
    }

    #[test]
    fn test_keys_before_any_section_ignored() {
        let inf = InfFile::parse_str("Class=Firmware\n[Version]\n");
        assert!(inf.get("Version", "Class").is_err());
        assert!(inf.has_section("Version"));
    }
}

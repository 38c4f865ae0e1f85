//! AppStream firmware component model
//!
//! The document is read into a small element tree first, then the fields the
//! depot needs are pulled out of it. Translated elements (those carrying
//! `xml:lang`) are ignored. Release and component descriptions keep their
//! inner markup (`<p>`, `<ul>`, `<li>`, ...) re-serialized with collapsed
//! whitespace.

use crate::error::{MetainfoError, MetainfoResult};
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use tracing::debug;

/// Checksum target for the raw firmware payload
pub const CHECKSUM_TARGET_CONTENT: &str = "content";

/// Checksum target for the distributed archive
pub const CHECKSUM_TARGET_CONTAINER: &str = "container";

/// Checksum algorithm written by the depot
pub const CHECKSUM_KIND_SHA256: &str = "sha256";

/// Component type accepted by the depot
pub const COMPONENT_TYPE_FIRMWARE: &str = "firmware";

const MAX_DEPTH: usize = 32;
const LANG_ATTRIBUTE: &str = "xml:lang";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> MetainfoResult<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| MetainfoError::Parse(e.to_string()))?
            .to_string();

        let mut attributes = Vec::new();
        for attr in start.attributes().with_checks(false) {
            let attr = attr.map_err(|e| MetainfoError::Parse(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| MetainfoError::Parse(e.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| MetainfoError::Parse(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn is_translation(&self) -> bool {
        self.attribute(LANG_ATTRIBUTE).is_some()
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
        self.elements()
            .filter(move |e| e.name == name && !e.is_translation())
    }

    fn child<'a>(&'a self, name: &str) -> Option<&'a Element> {
        self.children_named(name).next()
    }

    fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => out.push_str(&element.text()),
            }
        }
        out.trim().to_string()
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(Element::text)
            .filter(|text| !text.is_empty())
    }

    fn inner_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(text) => {
                    if !text.trim().is_empty() {
                        out.push_str(&escape(collapse_whitespace(text).as_str()));
                    }
                }
                Node::Element(element) if element.is_translation() => {}
                Node::Element(element) => {
                    out.push('<');
                    out.push_str(&element.name);
                    out.push('>');
                    out.push_str(&element.inner_markup());
                    out.push_str("</");
                    out.push_str(&element.name);
                    out.push('>');
                }
            }
        }
        out.trim().to_string()
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn parse_tree(raw: &str) -> MetainfoResult<Element> {
    let mut reader = Reader::from_str(raw);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            MetainfoError::Parse(format!("{e} at byte {}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(MetainfoError::Parse(format!(
                        "elements nested deeper than {MAX_DEPTH}"
                    )));
                }
                if root.is_some() {
                    return Err(MetainfoError::Parse("multiple root elements".to_string()));
                }
                stack.push(Element::from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| MetainfoError::Parse("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| MetainfoError::Parse(e.to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Text(text.into_owned())),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(MetainfoError::Parse(
                            "text outside the root element".to_string(),
                        ));
                    }
                }
            }
            Event::CData(cdata) => {
                let text = std::str::from_utf8(cdata.as_ref())
                    .map_err(|e| MetainfoError::Parse(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.to_string()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(MetainfoError::Parse("unclosed elements at end of document".to_string()));
    }
    root.ok_or_else(|| MetainfoError::Parse("document has no root element".to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) -> MetainfoResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => match node {
            Node::Element(element) if root.is_none() => *root = Some(element),
            _ => return Err(MetainfoError::Parse("multiple root elements".to_string())),
        },
    }
    Ok(())
}

/// Device identifier provided by a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provide {
    /// `type` attribute, `flashed` when unset
    pub kind: String,
    /// Device GUID
    pub value: String,
}

/// Checksum recorded for a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    /// Hash algorithm, e.g. `sha256`
    pub kind: String,
    /// `content` or `container`
    pub target: String,
    /// Archive member the checksum refers to
    pub filename: Option<String>,
    /// Lowercase hex digest, empty until computed
    pub value: String,
}

impl Checksum {
    /// Content checksum for `filename` with no value yet
    pub fn content(filename: impl Into<String>) -> Self {
        Self {
            kind: CHECKSUM_KIND_SHA256.to_string(),
            target: CHECKSUM_TARGET_CONTENT.to_string(),
            filename: Some(filename.into()),
            value: String::new(),
        }
    }
}

/// One release entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Release {
    /// Release version
    pub version: String,
    /// Unix timestamp from `timestamp`, or from `date` at midnight UTC
    pub timestamp: Option<i64>,
    /// Release notes markup
    pub description: Option<String>,
    /// Checksums in document order
    pub checksums: Vec<Checksum>,
    /// `size[@type=installed]`
    pub size_installed: Option<u64>,
    /// `size[@type=download]`
    pub size_download: Option<u64>,
}

impl Release {
    fn from_element(element: &Element) -> Self {
        let timestamp = element
            .attribute("timestamp")
            .and_then(|t| t.trim().parse::<i64>().ok())
            .or_else(|| {
                element
                    .attribute("date")
                    .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc().timestamp())
            });

        let checksums = element
            .children_named("checksum")
            .map(|c| Checksum {
                kind: c.attribute("type").unwrap_or_default().to_string(),
                target: c.attribute("target").unwrap_or_default().to_string(),
                filename: c.attribute("filename").map(str::to_string),
                value: c.text(),
            })
            .collect();

        let size = |kind: &str| {
            element
                .children_named("size")
                .find(|s| s.attribute("type") == Some(kind))
                .and_then(|s| s.text().parse::<u64>().ok())
        };

        Self {
            version: element.attribute("version").unwrap_or_default().trim().to_string(),
            timestamp,
            description: element
                .child("description")
                .map(Element::inner_markup)
                .filter(|d| !d.is_empty()),
            checksums,
            size_installed: size("installed"),
            size_download: size("download"),
        }
    }

    /// First checksum with the given target
    pub fn checksum_by_target(&self, target: &str) -> Option<&Checksum> {
        self.checksums.iter().find(|c| c.target == target)
    }

    /// Mutable access to the first checksum with the given target
    pub fn checksum_by_target_mut(&mut self, target: &str) -> Option<&mut Checksum> {
        self.checksums.iter_mut().find(|c| c.target == target)
    }

    /// Add a checksum, replacing any existing one with the same target
    pub fn add_checksum(&mut self, checksum: Checksum) {
        match self.checksum_by_target_mut(&checksum.target) {
            Some(existing) => *existing = checksum,
            None => self.checksums.push(checksum),
        }
    }
}

/// Parsed firmware component descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Component {
    /// Root element name
    pub root: String,
    /// `type` attribute of the root
    pub kind: Option<String>,
    /// Component identifier
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// One-line summary
    pub summary: Option<String>,
    /// Description markup
    pub description: Option<String>,
    /// Vendor name
    pub developer_name: Option<String>,
    /// SPDX license of the metadata
    pub metadata_license: Option<String>,
    /// SPDX license of the firmware
    pub project_license: Option<String>,
    /// URLs keyed by `type`
    pub urls: BTreeMap<String, String>,
    /// Provided device identifiers
    pub provides: Vec<Provide>,
    /// Releases in document order, newest first by convention
    pub releases: Vec<Release>,
}

impl Component {
    /// Parse descriptor text
    pub fn parse(raw: &str) -> MetainfoResult<Self> {
        let root = parse_tree(raw)?;

        let urls = root
            .children_named("url")
            .filter_map(|u| {
                let text = u.text();
                (!text.is_empty()).then(|| (u.attribute("type").unwrap_or("homepage").to_string(), text))
            })
            .collect();

        let provides = root
            .children_named("provides")
            .flat_map(|p| p.children_named("firmware"))
            .map(|f| Provide {
                kind: f.attribute("type").unwrap_or("flashed").to_string(),
                value: f.text(),
            })
            .collect();

        let releases = root
            .child("releases")
            .map(|r| r.children_named("release").map(Release::from_element).collect())
            .unwrap_or_default();

        let component = Self {
            kind: root.attribute("type").map(str::to_string),
            id: root.child("id").map(Element::text).unwrap_or_default(),
            name: root.child_text("name"),
            summary: root.child_text("summary"),
            description: root
                .child("description")
                .map(Element::inner_markup)
                .filter(|d| !d.is_empty()),
            developer_name: root.child_text("developer_name"),
            metadata_license: root.child_text("metadata_license"),
            project_license: root.child_text("project_license"),
            urls,
            provides,
            releases,
            root: root.name,
        };

        debug!(
            id = %component.id,
            provides = component.provides.len(),
            releases = component.releases.len(),
            "Parsed component descriptor"
        );
        Ok(component)
    }

    /// Check the descriptor against the firmware component schema
    ///
    /// Every problem found is reported in a single
    /// [`MetainfoError::SchemaValidation`].
    pub fn validate(&self) -> MetainfoResult<()> {
        let mut problems = Vec::new();

        if self.root != "component" {
            problems.push(format!("root element is <{}>, expected <component>", self.root));
        }
        if self.kind.as_deref() != Some(COMPONENT_TYPE_FIRMWARE) {
            problems.push(format!(
                "component type is '{}', expected '{COMPONENT_TYPE_FIRMWARE}'",
                self.kind.as_deref().unwrap_or_default()
            ));
        }
        if self.id.is_empty() {
            problems.push("<id> is missing".to_string());
        } else if self.id.chars().any(char::is_whitespace) {
            problems.push(format!("<id> '{}' contains whitespace", self.id));
        }

        let required = [
            ("name", &self.name),
            ("summary", &self.summary),
            ("developer_name", &self.developer_name),
            ("metadata_license", &self.metadata_license),
            ("project_license", &self.project_license),
        ];
        for (tag, value) in required {
            if value.is_none() {
                problems.push(format!("<{tag}> is missing"));
            }
        }

        for (index, release) in self.releases.iter().enumerate() {
            if release.version.is_empty() {
                problems.push(format!("<release> {index} has no version"));
            }
        }
        if self.provides.iter().any(|p| p.value.is_empty()) {
            problems.push("<provides> contains an empty <firmware>".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MetainfoError::SchemaValidation(problems))
        }
    }

    /// Device GUID, the first provided value
    pub fn device_guid(&self) -> Option<&str> {
        self.provides.first().map(|p| p.value.as_str())
    }

    /// Release being shipped, the first listed
    pub fn release(&self) -> Option<&Release> {
        self.releases.first()
    }

    /// Mutable access to the shipped release
    pub fn release_mut(&mut self) -> Option<&mut Release> {
        self.releases.first_mut()
    }

    /// Homepage URL
    pub fn homepage(&self) -> Option<&str> {
        self.urls.get("homepage").map(String::as_str)
    }
}

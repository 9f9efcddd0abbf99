//! OPC package plumbing: ZIP parts, relationships, content types and part
//! name arithmetic.

use crate::xml::{self, escape, XML_DECLARATION};
use quick_xml::events::Event;
use quick_xml::Reader;
use slidemaker_core::types::{RawPart, Relationship};
use slidemaker_core::{Error, Result};
use std::fmt::Write as _;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";

/// Relationship type URIs.
pub(crate) mod rel_type {
    const STRICT_BASE: &str = "http://purl.oclc.org/ooxml/officeDocument/relationships/";

    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const SLIDE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
    pub const SLIDE_LAYOUT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
    pub const THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const CHART: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart";

    /// Whether a relationship type is `kind` in the transitional or strict
    /// namespace.
    pub fn is(rel_type: &str, kind: &str) -> bool {
        rel_type == kind
            || (rel_type.starts_with(STRICT_BASE)
                && rel_type.rsplit('/').next() == kind.rsplit('/').next())
    }
}

/// Content type strings.
pub(crate) mod content_type {
    pub const SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
    pub const CHART: &str = "application/vnd.openxmlformats-officedocument.drawingml.chart+xml";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
}

/// Read every file of a ZIP archive, in archive order.
pub(crate) fn read_parts(bytes: &[u8]) -> Result<Vec<RawPart>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::MalformedPackage(format!("not a ZIP archive: {}", e)))?;

    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::MalformedPackage(format!("unreadable ZIP entry {}: {}", i, e)))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().trim_start_matches('/').to_string();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| Error::MalformedPackage(format!("failed to read '{}': {}", name, e)))?;
        parts.push(RawPart {
            name,
            data: Arc::from(data),
        });
    }
    Ok(parts)
}

/// Write parts into a new ZIP archive, in the order given.
pub(crate) fn write_parts<'a, I>(parts: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in parts {
        // Already-compressed media gains nothing from deflate.
        let method = if is_compressed_media(name) {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let options = FileOptions::default().compression_method(method);
        writer
            .start_file(name, options)
            .map_err(|e| Error::ZipError(format!("failed to start '{}': {}", name, e)))?;
        writer.write_all(data)?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| Error::ZipError(format!("failed to finish archive: {}", e)))?;
    Ok(cursor.into_inner())
}

fn is_compressed_media(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".png", ".jpg", ".jpeg", ".gif"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Part content as UTF-8 with any byte-order mark removed.
pub(crate) fn part_text<'a>(name: &str, data: &'a [u8]) -> Result<&'a str> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::MalformedPackage(format!("'{}' is not UTF-8: {}", name, e)))?;
    Ok(text.trim_start_matches('\u{feff}'))
}

/// Parse a relationships part.
pub(crate) fn parse_relationships(name: &str, data: &[u8]) -> Result<Vec<Relationship>> {
    let content = part_text(name, data)?;
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut rels = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if xml::local_name(&String::from_utf8_lossy(e.name().as_ref())) == "Relationship" =>
            {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                    external: false,
                };
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                    match attr.key.as_ref() {
                        b"Id" => rel.id = value,
                        b"Type" => rel.rel_type = value,
                        b"Target" => rel.target = value,
                        b"TargetMode" => rel.external = value == "External",
                        _ => {}
                    }
                }
                if rel.id.is_empty() || rel.target.is_empty() {
                    return Err(Error::MalformedPackage(format!(
                        "relationship without Id or Target in '{}'",
                        name
                    )));
                }
                rels.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::MalformedPackage(format!(
                    "error parsing relationships '{}': {}",
                    name, e
                )));
            }
            _ => {}
        }
    }
    Ok(rels)
}

/// Serialize a relationships part.
pub(crate) fn write_relationships(rels: &[Relationship]) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for rel in rels {
        let _ = write!(
            out,
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"{}/>",
            escape(&rel.id),
            escape(&rel.rel_type),
            escape(&rel.target),
            if rel.external {
                " TargetMode=\"External\""
            } else {
                ""
            }
        );
    }
    out.push_str("</Relationships>");
    out
}

/// First free `rIdN`.
pub(crate) fn next_rel_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// `ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`.
pub(crate) fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the part that owns it.
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }
    let base = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    if base.is_empty() {
        normalize(target)
    } else {
        normalize(&format!("{}/{}", base, target))
    }
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Relative target from one part to another.
pub(crate) fn relative_target(source_part: &str, target_part: &str) -> String {
    let from: Vec<&str> = source_part.split('/').collect();
    let from_dir = &from[..from.len().saturating_sub(1)];
    let to: Vec<&str> = target_part.split('/').collect();

    let common = from_dir
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from_dir.len() - common];
    parts.extend_from_slice(&to[common..]);
    parts.join("/")
}

/// Trailing number of a part name, e.g. 3 for `slide3.xml`.
pub(crate) fn part_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".rels").trim_end_matches(".xml");
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

/// File extension of a part name, lowercased.
pub(crate) fn extension(part: &str) -> Option<String> {
    let file = part.rsplit('/').next()?;
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// The `[Content_Types].xml` part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentTypes {
    /// Extension -> content type.
    pub defaults: Vec<(String, String)>,
    /// Part name (without leading slash) -> content type.
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = part_text(CONTENT_TYPES_PART, data)?;
        let root = xml::parse(text)
            .map_err(|e| Error::MalformedPackage(format!("unparsable content types: {}", e)))?;

        let mut types = ContentTypes::default();
        for child in &root.children {
            match (child.local(), child.attr("ContentType")) {
                ("Default", Some(ct)) => {
                    if let Some(ext) = child.attr("Extension") {
                        types
                            .defaults
                            .push((ext.to_ascii_lowercase(), ct.to_string()));
                    }
                }
                ("Override", Some(ct)) => {
                    if let Some(part) = child.attr("PartName") {
                        types
                            .overrides
                            .push((part.trim_start_matches('/').to_string(), ct.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// Content type of a part: override first, then extension default.
    pub fn content_type_for(&self, part: &str) -> Option<&str> {
        if let Some((_, ct)) = self.overrides.iter().find(|(p, _)| p == part) {
            return Some(ct);
        }
        let ext = extension(part)?;
        self.defaults
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn set_override(&mut self, part: &str, content_type: &str) {
        match self.overrides.iter_mut().find(|(p, _)| p == part) {
            Some(entry) => entry.1 = content_type.to_string(),
            None => self
                .overrides
                .push((part.to_string(), content_type.to_string())),
        }
    }

    pub fn remove_override(&mut self, part: &str) {
        self.overrides.retain(|(p, _)| p != part);
    }

    /// Register an extension default unless the extension already has one.
    pub fn ensure_default(&mut self, ext: &str, content_type: &str) {
        let ext = ext.to_ascii_lowercase();
        if !self.defaults.iter().any(|(e, _)| *e == ext) {
            self.defaults.push((ext, content_type.to_string()));
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        out.push_str(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
        );
        for (ext, ct) in &self.defaults {
            let _ = write!(
                out,
                "<Default Extension=\"{}\" ContentType=\"{}\"/>",
                escape(ext),
                escape(ct)
            );
        }
        for (part, ct) in &self.overrides {
            let _ = write!(
                out,
                "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
                escape(part),
                escape(ct)
            );
        }
        out.push_str("</Types>");
        out
    }
}

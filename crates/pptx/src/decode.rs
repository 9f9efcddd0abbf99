//! PPTX bytes to [`Deck`].

use crate::chart::read_chart;
use crate::package::{
    self, content_type, part_number, part_text, rel_type, rels_part_for, resolve_target,
    ContentTypes, CONTENT_TYPES_PART, ROOT_RELS_PART,
};
use crate::slide::{read_slide, SlideContext};
use crate::template;
use crate::xml::{self, XmlNode};
use slidemaker_core::types::{
    ChartData, Deck, LayoutInfo, MediaPart, PackageSource, RawPart, Relationship, Slide,
    SlideOrigin, SlideSize, StyleRegistry, DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE,
};
use slidemaker_core::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Decode a PPTX package. Empty input yields a deck built from the
/// built-in template.
pub fn decode(bytes: &[u8]) -> Result<Deck> {
    if bytes.is_empty() {
        log::debug!("Empty input, starting from the built-in template");
        return decode_parts(template::parts());
    }
    decode_parts(package::read_parts(bytes)?)
}

/// A part parsed into an element tree, with its text kept for raw slices.
struct ParsedPart<'a> {
    text: &'a str,
    root: XmlNode,
}

fn parse_part<'a>(name: &str, data: &'a [u8]) -> Result<ParsedPart<'a>> {
    let text = part_text(name, data)?;
    let root = xml::parse(text)
        .map_err(|e| Error::MalformedPackage(format!("'{}' is not valid XML: {}", name, e)))?;
    Ok(ParsedPart { text, root })
}

fn required<'a>(parts: &'a HashMap<String, Arc<[u8]>>, name: &str) -> Result<&'a [u8]> {
    parts
        .get(name)
        .map(|data| data.as_ref())
        .ok_or_else(|| Error::MalformedPackage(format!("missing required part '{}'", name)))
}

pub(crate) fn decode_parts(raw: Vec<RawPart>) -> Result<Deck> {
    let parts: HashMap<String, Arc<[u8]>> = raw
        .iter()
        .map(|p| (p.name.clone(), Arc::clone(&p.data)))
        .collect();

    let content_types = ContentTypes::parse(required(&parts, CONTENT_TYPES_PART)?)?;

    let root_rels = package::parse_relationships(ROOT_RELS_PART, required(&parts, ROOT_RELS_PART)?)?;
    let presentation_part = root_rels
        .iter()
        .find(|r| rel_type::is(&r.rel_type, rel_type::OFFICE_DOCUMENT) && !r.external)
        .map(|r| resolve_target("", &r.target))
        .ok_or_else(|| {
            Error::MalformedPackage("package has no officeDocument relationship".into())
        })?;

    let presentation = parse_part(&presentation_part, required(&parts, &presentation_part)?)?;
    if presentation.root.local() != "presentation" {
        return Err(Error::MalformedPackage(format!(
            "'{}' is not a presentation part",
            presentation_part
        )));
    }
    let presentation_rels_part = rels_part_for(&presentation_part);
    let presentation_rels = package::parse_relationships(
        &presentation_rels_part,
        required(&parts, &presentation_rels_part)?,
    )?;

    let slide_size = read_slide_size(&presentation.root);
    let mut styles = presentation_rels
        .iter()
        .find(|r| rel_type::is(&r.rel_type, rel_type::THEME))
        .map(|r| resolve_target(&presentation_part, &r.target))
        .and_then(|theme| parts.get(&theme).map(|data| (theme, data)))
        .map(|(theme, data)| read_theme(&theme, data))
        .transpose()?
        .unwrap_or_default();
    styles.default_size = presentation
        .root
        .path(&["defaultTextStyle", "lvl1pPr", "defRPr"])
        .and_then(|n| n.attr("sz"))
        .and_then(|sz| sz.parse::<f32>().ok())
        .map(|sz| sz / 100.0)
        .unwrap_or(DEFAULT_FONT_SIZE);

    let media: BTreeMap<String, MediaPart> = raw
        .iter()
        .filter(|p| p.name.starts_with("ppt/media/"))
        .map(|p| {
            let content_type = content_types
                .content_type_for(&p.name)
                .unwrap_or("application/octet-stream")
                .to_string();
            (
                p.name.clone(),
                MediaPart {
                    content_type,
                    data: Arc::clone(&p.data),
                },
            )
        })
        .collect();

    let layouts = read_layouts(&raw)?;
    let charts = read_charts(&raw, &content_types);

    let mut slides = Vec::new();
    let mut slide_parts: HashSet<String> = HashSet::new();
    if let Some(list) = presentation.root.child("sldIdLst") {
        for entry in list.children_named("sldId") {
            let slide_id = entry
                .attr("id")
                .and_then(|id| id.parse::<u32>().ok())
                .ok_or_else(|| Error::MalformedPackage("slide entry without a valid id".into()))?;
            let rel_id = entry
                .attr("r:id")
                .ok_or_else(|| Error::MalformedPackage(format!("slide {} has no r:id", slide_id)))?;
            let part_name = presentation_rels
                .iter()
                .find(|r| r.id == rel_id && rel_type::is(&r.rel_type, rel_type::SLIDE))
                .map(|r| resolve_target(&presentation_part, &r.target))
                .ok_or_else(|| {
                    Error::MalformedPackage(format!("slide relationship '{}' not found", rel_id))
                })?;

            let slide = read_slide_part(&parts, &part_name, slide_id, &layouts, &charts, &media)?;
            slide_parts.insert(rels_part_for(&part_name));
            slide_parts.insert(part_name);
            slides.push(slide);
        }
    }

    let source_parts: Vec<RawPart> = raw
        .into_iter()
        .filter(|p| !slide_parts.contains(&p.name) && !media.contains_key(&p.name))
        .collect();

    log::debug!(
        "Decoded {} slides, {} layouts, {} media parts, {} carried parts",
        slides.len(),
        layouts.len(),
        media.len(),
        source_parts.len()
    );

    Ok(Deck {
        slides,
        styles,
        slide_size,
        layouts,
        media,
        source: PackageSource {
            parts: source_parts,
            presentation_part,
            chart_data: charts,
        },
    })
}

fn read_slide_size(presentation: &XmlNode) -> SlideSize {
    let default = SlideSize::default();
    let Some(size) = presentation.child("sldSz") else {
        return default;
    };
    let dim = |attr: &str| size.attr(attr).and_then(|v| v.parse::<i64>().ok());
    SlideSize {
        width: dim("cx").unwrap_or(default.width),
        height: dim("cy").unwrap_or(default.height),
    }
}

fn read_theme(name: &str, data: &[u8]) -> Result<StyleRegistry> {
    let theme = parse_part(name, data)?;
    let mut styles = StyleRegistry::default();
    let Some(elements) = theme.root.child("themeElements") else {
        return Ok(styles);
    };

    if let Some(scheme) = elements.child("clrScheme") {
        for slot in &scheme.children {
            let color = slot.children.first().and_then(|c| match c.local() {
                "srgbClr" => c.attr("val"),
                "sysClr" => c.attr("lastClr"),
                _ => None,
            });
            if let Some(color) = color {
                styles
                    .theme_colors
                    .insert(slot.local().to_string(), color.to_string());
            }
        }
    }

    let typeface = |which: &str| {
        elements
            .path(&["fontScheme", which, "latin"])
            .and_then(|n| n.attr("typeface"))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };
    styles.major_font = typeface("majorFont");
    styles.minor_font = typeface("minorFont");
    styles.default_font = styles
        .minor_font
        .clone()
        .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string());
    Ok(styles)
}

fn read_layouts(raw: &[RawPart]) -> Result<Vec<LayoutInfo>> {
    let mut layouts: Vec<(usize, LayoutInfo)> = Vec::new();
    for part in raw {
        if !part.name.starts_with("ppt/slideLayouts/") || !part.name.ends_with(".xml") {
            continue;
        }
        let layout = parse_part(&part.name, &part.data)?;
        let name = layout
            .root
            .child("cSld")
            .and_then(|c| c.attr("name"))
            .unwrap_or_default()
            .to_string();
        layouts.push((
            part_number(&part.name).unwrap_or(usize::MAX),
            LayoutInfo {
                part_name: part.name.clone(),
                name,
            },
        ));
    }
    layouts.sort_by_key(|(n, _)| *n);
    Ok(layouts.into_iter().map(|(_, l)| l).collect())
}

fn read_charts(raw: &[RawPart], content_types: &ContentTypes) -> BTreeMap<String, ChartData> {
    raw.iter()
        .filter(|p| content_types.content_type_for(&p.name) == Some(content_type::CHART))
        .filter_map(|p| {
            let text = part_text(&p.name, &p.data).ok()?;
            match read_chart(text) {
                Some(mut chart) => {
                    chart.part = Some(p.name.clone());
                    Some((p.name.clone(), chart))
                }
                None => {
                    log::debug!("Chart '{}' is not editable, keeping it opaque", p.name);
                    None
                }
            }
        })
        .collect()
}

fn read_slide_part(
    parts: &HashMap<String, Arc<[u8]>>,
    part_name: &str,
    slide_id: u32,
    layouts: &[LayoutInfo],
    charts: &BTreeMap<String, ChartData>,
    media: &BTreeMap<String, MediaPart>,
) -> Result<Slide> {
    let data = required(parts, part_name)?;
    let text = part_text(part_name, data)?;

    let rels_part = rels_part_for(part_name);
    let rels_xml = parts.get(&rels_part).cloned();
    let relationships: Vec<Relationship> = match &rels_xml {
        Some(rels) => package::parse_relationships(&rels_part, rels)?,
        None => Vec::new(),
    };

    let content = read_slide(
        text,
        &SlideContext {
            part_name,
            rels: &relationships,
            charts,
            media,
        },
    )?;

    let layout_hint = relationships
        .iter()
        .find(|r| rel_type::is(&r.rel_type, rel_type::SLIDE_LAYOUT))
        .map(|r| resolve_target(part_name, &r.target))
        .and_then(|target| layouts.iter().find(|l| l.part_name == target))
        .map(|l| l.name.clone());

    let mut slide = Slide {
        elements: content.elements,
        background: content.background,
        layout_hint,
        preserved: content.preserved,
        origin: None,
    };
    slide.origin = Some(SlideOrigin {
        part_name: part_name.to_string(),
        slide_id,
        xml: Arc::from(data),
        rels_xml,
        relationships,
        shell: content.shell,
        snapshot: Box::new(slide.clone()),
    });
    Ok(slide)
}

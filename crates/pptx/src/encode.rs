//! [`Deck`] to PPTX bytes.
//!
//! Only what changed is regenerated: pristine slides, untouched charts and
//! every part the model does not own are copied through byte for byte.

use crate::chart::write_chart;
use crate::decode::decode_parts;
use crate::package::{
    content_type, next_rel_id, parse_relationships, part_text, rel_type,
    relative_target, rels_part_for, resolve_target, write_parts, write_relationships,
    ContentTypes, CONTENT_TYPES_PART,
};
use crate::template;
use crate::writer::{new_slide_shell, write_slide, RelAllocator};
use regex::Regex;
use slidemaker_core::types::{Deck, ElementKind, Relationship, Slide};
use slidemaker_core::{Error, Result};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static SLD_ID_LST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<p:sldIdLst\s*/>|<p:sldIdLst\b[^>]*>.*?</p:sldIdLst>").unwrap()
});

static SLD_SZ_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p:sldSz\b[^>]*>").unwrap());

static CX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bcx="\d+""#).unwrap());

static CY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bcy="\d+""#).unwrap());

/// Section-list entries (`p14:sldId`) that name slides by id.
static SECTION_SLIDE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<p14:sldId\s+id="(\d+)"\s*/>"#).unwrap());

/// Lowest id PowerPoint assigns to slides.
const MIN_SLIDE_ID: u32 = 256;

/// Where one slide goes in the output package.
struct SlidePlan {
    part_name: String,
    slide_id: u32,
    rel_id: String,
}

/// Encode a deck to PPTX bytes.
pub fn encode(deck: &Deck) -> Result<Vec<u8>> {
    if deck.source.parts.is_empty() {
        log::debug!("Deck has no source package, encoding onto the built-in template");
        let base = decode_parts(template::parts())?;
        let mut merged = deck.clone();
        merged.source = base.source;
        if merged.layouts.is_empty() {
            merged.layouts = base.layouts;
        }
        return encode_with_source(&merged);
    }
    encode_with_source(deck)
}

fn encode_with_source(deck: &Deck) -> Result<Vec<u8>> {
    deck.check_references()?;
    if deck.layouts.is_empty() && !deck.slides.is_empty() {
        return Err(Error::MalformedPackage("package has no slide layouts".into()));
    }

    let source = &deck.source;
    let source_part = |name: &str| {
        source
            .part(name)
            .ok_or_else(|| Error::MalformedPackage(format!("missing required part '{}'", name)))
    };

    let types_part = source_part(CONTENT_TYPES_PART)?;
    let original_types = ContentTypes::parse(&types_part.data)?;
    let mut types = original_types.clone();

    let presentation_part = source.presentation_part.as_str();
    let presentation_rels_part = rels_part_for(presentation_part);
    let presentation_rels_raw = source_part(&presentation_rels_part)?;
    let original_rels = parse_relationships(&presentation_rels_part, &presentation_rels_raw.data)?;

    // Slide part names ever used by this package, so new slides never
    // collide with parts (or stale notes) of deleted ones.
    let mut used_names: HashSet<String> = source.parts.iter().map(|p| p.name.clone()).collect();
    used_names.extend(
        original_rels
            .iter()
            .filter(|r| rel_type::is(&r.rel_type, rel_type::SLIDE))
            .map(|r| resolve_target(presentation_part, &r.target)),
    );
    used_names.extend(deck.slides.iter().filter_map(|s| s.origin.as_ref()).map(|o| o.part_name.clone()));

    let (plans, presentation_rels) = plan_slides(deck, &original_rels, &mut used_names);
    let planned_parts: HashSet<&str> = plans.iter().map(|p| p.part_name.as_str()).collect();

    // Chart parts: assign names to new charts, regenerate changed ones.
    let mut slides: Vec<Cow<'_, Slide>> = deck.slides.iter().map(Cow::Borrowed).collect();
    let mut chart_parts: BTreeMap<String, String> = BTreeMap::new();
    for slide in slides.iter_mut() {
        let needs_part = slide.elements.iter().any(|e| {
            matches!(&e.kind, ElementKind::Chart(chart) if chart.part.is_none())
        });
        if needs_part {
            for element in slide.to_mut().elements.iter_mut() {
                if let ElementKind::Chart(chart) = &mut element.kind {
                    if chart.part.is_none() {
                        let name = free_name(&used_names, "ppt/charts/chart", "xml");
                        used_names.insert(name.clone());
                        chart.part = Some(name);
                    }
                }
            }
        }
        for element in &slide.elements {
            if let ElementKind::Chart(chart) = &element.kind {
                if let Some(part) = &chart.part {
                    if source.chart_data.get(part) != Some(chart) {
                        log::debug!("Regenerating chart part {}", part);
                        chart_parts.insert(part.clone(), write_chart(chart));
                        types.set_override(part, content_type::CHART);
                    }
                }
            }
        }
    }

    // Slides.
    let mut slide_outputs: Vec<(String, Vec<u8>)> = Vec::new();
    for (slide, plan) in slides.iter().zip(&plans) {
        types.set_override(&plan.part_name, content_type::SLIDE);
        let origin = slide
            .origin
            .as_ref()
            .filter(|o| o.part_name == plan.part_name);

        if let Some(origin) = origin.filter(|_| slide.is_pristine()) {
            log::debug!("Slide {} unchanged, copying", plan.part_name);
            slide_outputs.push((plan.part_name.clone(), origin.xml.to_vec()));
            if let Some(rels) = &origin.rels_xml {
                slide_outputs.push((rels_part_for(&plan.part_name), rels.to_vec()));
            }
            continue;
        }

        log::debug!("Regenerating slide {}", plan.part_name);
        let existing = origin.map(|o| o.relationships.clone()).unwrap_or_default();
        let mut rels = RelAllocator::new(&plan.part_name, existing);
        let layout_changed = match origin {
            Some(o) => o.snapshot.layout_hint != slide.layout_hint,
            None => true,
        };
        if layout_changed {
            let layout = layout_part(deck, slide.layout_hint.as_deref())?;
            rels.retarget(rel_type::SLIDE_LAYOUT, &layout);
        }

        let shell = match origin {
            Some(o) => Cow::Borrowed(&o.shell),
            None => Cow::Owned(new_slide_shell()),
        };
        let xml = write_slide(slide, &shell, &mut rels)?;
        slide_outputs.push((plan.part_name.clone(), xml.into_bytes()));
        slide_outputs.push((
            rels_part_for(&plan.part_name),
            write_relationships(&rels.into_rels()).into_bytes(),
        ));
    }

    // Overrides of slides that no longer exist, and their orphaned notes.
    let dropped_notes = orphaned_notes(deck, &planned_parts)?;
    types.overrides.retain(|(part, ct)| {
        !(ct == content_type::SLIDE && !planned_parts.contains(part.as_str()) && !source.has_part(part))
            && !dropped_notes.contains(part)
    });

    for (name, media) in &deck.media {
        match name.rsplit_once('.') {
            Some((_, ext)) if types.content_type_for(name).is_none() => {
                types.ensure_default(ext, &media.content_type)
            }
            Some(_) => {}
            None => types.set_override(name, &media.content_type),
        }
    }

    // Presentation part and its relationships.
    let presentation_raw = source_part(presentation_part)?;
    let presentation_xml = part_text(presentation_part, &presentation_raw.data)?;
    let kept_ids: HashSet<u32> = plans.iter().map(|p| p.slide_id).collect();
    let patched = patch_presentation(presentation_xml, &plans, deck, &kept_ids);

    let mut replaced: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    if patched != presentation_xml {
        log::debug!("Patching {}", presentation_part);
        replaced.insert(presentation_part, patched.into_bytes());
    }
    if presentation_rels != original_rels {
        replaced.insert(
            presentation_rels_part.as_str(),
            write_relationships(&presentation_rels).into_bytes(),
        );
    }
    if types != original_types {
        replaced.insert(CONTENT_TYPES_PART, types.to_xml().into_bytes());
    }
    for (part, xml) in &chart_parts {
        if source.has_part(part) {
            replaced.insert(part.as_str(), xml.clone().into_bytes());
        }
    }

    // Assemble: content types first, carried parts in their original order.
    let mut output: Vec<(&str, &[u8])> = Vec::new();
    output.push((
        CONTENT_TYPES_PART,
        replaced
            .get(CONTENT_TYPES_PART)
            .map(Vec::as_slice)
            .unwrap_or(&types_part.data[..]),
    ));
    for part in &source.parts {
        if part.name == CONTENT_TYPES_PART || dropped_notes.contains(&part.name) {
            continue;
        }
        let data = replaced
            .get(part.name.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&part.data[..]);
        output.push((part.name.as_str(), data));
    }
    for (name, data) in &slide_outputs {
        output.push((name.as_str(), data.as_slice()));
    }
    for (name, xml) in &chart_parts {
        if !source.has_part(name) {
            output.push((name.as_str(), xml.as_bytes()));
        }
    }
    for (name, media) in &deck.media {
        output.push((name.as_str(), &media.data[..]));
    }

    log::debug!(
        "Encoding {} parts ({} slides, {} replaced carried parts)",
        output.len(),
        plans.len(),
        replaced.len()
    );
    write_parts(output)
}

/// Decide part names, slide ids and presentation relationships for every
/// slide, reusing what the source package already had.
fn plan_slides(
    deck: &Deck,
    original_rels: &[Relationship],
    used_names: &mut HashSet<String>,
) -> (Vec<SlidePlan>, Vec<Relationship>) {
    let presentation_part = deck.source.presentation_part.as_str();
    let mut rels: Vec<Relationship> = original_rels
        .iter()
        .filter(|r| !rel_type::is(&r.rel_type, rel_type::SLIDE))
        .cloned()
        .collect();

    let mut next_id = deck
        .slides
        .iter()
        .filter_map(|s| s.origin.as_ref().map(|o| o.slide_id))
        .max()
        .map_or(MIN_SLIDE_ID, |max| max.max(MIN_SLIDE_ID - 1) + 1);

    // First pass: slides that keep their source part keep their rel id.
    let mut claimed: HashSet<String> = HashSet::new();
    let mut parts: Vec<Option<(String, u32, Option<String>)>> = Vec::new();
    for slide in &deck.slides {
        let planned = slide.origin.as_ref().and_then(|origin| {
            if !claimed.insert(origin.part_name.clone()) {
                return None;
            }
            let rel_id = original_rels
                .iter()
                .find(|r| {
                    rel_type::is(&r.rel_type, rel_type::SLIDE)
                        && resolve_target(presentation_part, &r.target) == origin.part_name
                })
                .map(|r| r.id.clone());
            Some((origin.part_name.clone(), origin.slide_id, rel_id))
        });
        parts.push(planned);
    }
    for (_, _, rel_id) in parts.iter().flatten() {
        if let Some(id) = rel_id {
            if let Some(rel) = original_rels.iter().find(|r| &r.id == id) {
                rels.push(rel.clone());
            }
        }
    }

    // Second pass: everything else gets fresh names and ids.
    let mut plans = Vec::with_capacity(parts.len());
    for planned in parts {
        let (part_name, slide_id, rel_id) = match planned {
            Some(planned) => planned,
            None => {
                let name = free_name(used_names, "ppt/slides/slide", "xml");
                used_names.insert(name.clone());
                let id = next_id;
                next_id += 1;
                (name, id, None)
            }
        };
        let rel_id = match rel_id {
            Some(id) => id,
            None => {
                let id = next_rel_id(&rels);
                rels.push(Relationship {
                    id: id.clone(),
                    rel_type: rel_type::SLIDE.to_string(),
                    target: relative_target(presentation_part, &part_name),
                    external: false,
                });
                id
            }
        };
        plans.push(SlidePlan {
            part_name,
            slide_id,
            rel_id,
        });
    }

    // Unchanged slide lists keep the original relationship order.
    if rels.len() == original_rels.len() && original_rels.iter().all(|r| rels.contains(r)) {
        rels = original_rels.to_vec();
    }
    (plans, rels)
}

/// First `{prefix}{n}.{ext}` not in use.
fn free_name(used: &HashSet<String>, prefix: &str, ext: &str) -> String {
    (1..)
        .map(|n| format!("{}{}.{}", prefix, n, ext))
        .find(|name| !used.contains(name))
        .unwrap_or_else(|| format!("{}0.{}", prefix, ext))
}

/// Layout part for a hint: the named layout, else `Blank`, else the first.
fn layout_part(deck: &Deck, hint: Option<&str>) -> Result<String> {
    hint.and_then(|h| deck.find_layout(h))
        .or_else(|| deck.find_layout("Blank"))
        .or_else(|| deck.layouts.first())
        .map(|l| l.part_name.clone())
        .ok_or_else(|| Error::MalformedPackage("package has no slide layouts".into()))
}

/// Notes slides (and their rels) whose slide is gone.
fn orphaned_notes(deck: &Deck, planned: &HashSet<&str>) -> Result<HashSet<String>> {
    let mut dropped = HashSet::new();
    for part in &deck.source.parts {
        if !part.name.starts_with("ppt/notesSlides/") || !part.name.ends_with(".xml.rels") {
            continue;
        }
        let rels = parse_relationships(&part.name, &part.data)?;
        let notes_part = part
            .name
            .replace("/_rels/", "/")
            .trim_end_matches(".rels")
            .to_string();
        let orphaned = rels
            .iter()
            .filter(|r| rel_type::is(&r.rel_type, rel_type::SLIDE))
            .map(|r| resolve_target(&notes_part, &r.target))
            .any(|slide| !planned.contains(slide.as_str()));
        if orphaned {
            log::debug!("Dropping notes {} of a deleted slide", notes_part);
            dropped.insert(notes_part);
            dropped.insert(part.name.clone());
        }
    }
    Ok(dropped)
}

/// Replace `p:sldIdLst`, update `p:sldSz` and drop section entries of
/// deleted slides.
fn patch_presentation(xml: &str, plans: &[SlidePlan], deck: &Deck, kept: &HashSet<u32>) -> String {
    let list = if plans.is_empty() {
        String::new()
    } else {
        let mut list = String::from("<p:sldIdLst>");
        for plan in plans {
            list.push_str(&format!(
                "<p:sldId id=\"{}\" r:id=\"{}\"/>",
                plan.slide_id, plan.rel_id
            ));
        }
        list.push_str("</p:sldIdLst>");
        list
    };

    let mut out = if SLD_ID_LST_REGEX.is_match(xml) {
        SLD_ID_LST_REGEX
            .replace(xml, regex::NoExpand(&list))
            .into_owned()
    } else if list.is_empty() {
        xml.to_string()
    } else {
        let at = insertion_point(xml);
        format!("{}{}{}", &xml[..at], list, &xml[at..])
    };

    let size_tag = SLD_SZ_REGEX
        .find(&out)
        .map(|m| (m.range(), m.as_str().to_string()));
    if let Some((range, tag)) = size_tag {
        let cx = format!("cx=\"{}\"", deck.slide_size.width);
        let cy = format!("cy=\"{}\"", deck.slide_size.height);
        let new_tag = CX_REGEX.replace(&tag, regex::NoExpand(&cx));
        let new_tag = CY_REGEX.replace(&new_tag, regex::NoExpand(&cy)).into_owned();
        if new_tag != tag {
            out.replace_range(range, &new_tag);
        }
    }

    SECTION_SLIDE_REGEX
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            match caps[1].parse::<u32>() {
                Ok(id) if !kept.contains(&id) => String::new(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// After the master/notes/handout id lists, else before `p:sldSz`.
fn insertion_point(xml: &str) -> usize {
    ["</p:handoutMasterIdLst>", "</p:notesMasterIdLst>", "</p:sldMasterIdLst>"]
        .iter()
        .find_map(|tag| xml.find(tag).map(|pos| pos + tag.len()))
        .or_else(|| xml.find("<p:sldSz"))
        .unwrap_or(xml.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::package::read_parts;
    use serde_json::{json, Value};
    use slidemaker_core::types::{Background, ChartKind, ChartSeries, Rect};
    use slidemaker_core::{Engine, FontDescriptor, FontFile, FontResolve, Operation, Provenance, Resolution};
    use std::collections::HashMap;

    struct LocalFonts;

    impl FontResolve for LocalFonts {
        fn resolve(&self, descriptor: &FontDescriptor) -> Resolution {
            Resolution {
                file: FontFile {
                    path: None,
                    family: descriptor.family.clone(),
                    weight: descriptor.weight,
                    italic: descriptor.italic,
                    provenance: Provenance::Bundled,
                    generation: 1,
                },
                warning: None,
            }
        }
    }

    fn apply(deck: &mut Deck, op: Value) {
        let engine = Engine::new(&LocalFonts);
        engine
            .apply(deck, Operation::from_json(op).unwrap())
            .unwrap();
    }

    fn text_box(deck: &mut Deck, slide_index: usize, text: &str) {
        apply(
            deck,
            json!({
                "op": "add_element",
                "slide_index": slide_index,
                "element": {
                    "kind": "text_box",
                    "box": {"x": 457200, "y": 457200, "width": 4572000, "height": 914400},
                    "text": text
                }
            }),
        );
    }

    fn parts_of(bytes: &[u8]) -> HashMap<String, Vec<u8>> {
        read_parts(bytes)
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.data.to_vec()))
            .collect()
    }

    fn body_text(kind: &ElementKind) -> String {
        match kind {
            ElementKind::TextBox(body) | ElementKind::BulletList(body) => body.plain_text(),
            other => panic!("expected text, got {}", other.label()),
        }
    }

    /// Two slides with one text box each, encoded and decoded once.
    fn two_slide_package() -> Vec<u8> {
        let mut deck = Deck::new();
        apply(&mut deck, json!({"op": "add_slide"}));
        apply(&mut deck, json!({"op": "add_slide"}));
        text_box(&mut deck, 0, "first");
        text_box(&mut deck, 1, "second");
        encode(&deck).unwrap()
    }

    #[test]
    fn test_empty_input_decodes_to_template_deck() {
        let deck = decode(&[]).unwrap();
        assert_eq!(deck.slide_count(), 0);
        let names: Vec<&str> = deck.layouts.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Title Slide", "Title and Content", "Blank"]);
        assert_eq!(deck.styles.default_font, "Calibri");
        assert_eq!(deck.styles.major_font.as_deref(), Some("Calibri Light"));
        assert_eq!(
            deck.styles.theme_colors.get("accent1").map(String::as_str),
            Some("4472C4")
        );
    }

    #[test]
    fn test_garbage_and_incomplete_packages_are_malformed() {
        assert!(matches!(
            decode(b"definitely not a zip"),
            Err(Error::MalformedPackage(_))
        ));

        let parts = read_parts(&template::package().unwrap()).unwrap();
        let without_presentation: Vec<(&str, &[u8])> = parts
            .iter()
            .filter(|p| p.name != "ppt/presentation.xml")
            .map(|p| (p.name.as_str(), &p.data[..]))
            .collect();
        let bytes = write_parts(without_presentation).unwrap();
        assert!(matches!(decode(&bytes), Err(Error::MalformedPackage(_))));
    }

    #[test]
    fn test_structural_round_trip() {
        let mut deck = Deck::new();
        apply(&mut deck, json!({"op": "add_slide", "layout_hint": "Blank"}));
        apply(
            &mut deck,
            json!({
                "op": "add_element",
                "slide_index": 0,
                "element": {
                    "kind": "text_box",
                    "box": {"x": 0, "y": 0, "width": 3000000, "height": 600000},
                    "text": "Hello\nWorld",
                    "style": {"color": "#FF0000", "bold": true}
                }
            }),
        );
        apply(
            &mut deck,
            json!({
                "op": "add_element",
                "slide_index": 0,
                "element": {
                    "kind": "bullet_list",
                    "box": {"x": 0, "y": 700000, "width": 3000000, "height": 1200000},
                    "items": ["one", "two", "three"]
                }
            }),
        );
        apply(
            &mut deck,
            json!({
                "op": "add_element",
                "slide_index": 0,
                "element": {
                    "kind": "table",
                    "box": {"x": 0, "y": 2000000, "width": 4000000, "height": 800000},
                    "cells": [["a", "b"], ["c", "d"]]
                }
            }),
        );
        apply(
            &mut deck,
            json!({
                "op": "add_element",
                "slide_index": 0,
                "element": {
                    "kind": "chart",
                    "box": {"x": 4500000, "y": 0, "width": 4000000, "height": 3000000},
                    "chart_kind": "column",
                    "title": "Sales",
                    "categories": ["Q1", "Q2"],
                    "series": [{"name": "2024", "values": [1.5, 2.0]}]
                }
            }),
        );
        apply(
            &mut deck,
            json!({
                "op": "add_element",
                "slide_index": 0,
                "element": {
                    "kind": "image",
                    "box": {"x": 4500000, "y": 3500000, "width": 1000000, "height": 1000000},
                    "data": "iVBORw0KGgo=",
                    "description": "logo"
                }
            }),
        );
        apply(
            &mut deck,
            json!({"op": "modify_slide", "slide_index": 0, "background": {"type": "color", "color": "112233"}}),
        );

        let bytes = encode(&deck).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.slide_count(), 1);
        let slide = &decoded.slides[0];
        assert_eq!(slide.layout_hint.as_deref(), Some("Blank"));
        assert_eq!(
            slide.background,
            Background::Color {
                color: "112233".into()
            }
        );
        assert_eq!(slide.elements.len(), 5);

        let kinds: Vec<&str> = slide.elements.iter().map(|e| e.kind.label()).collect();
        assert_eq!(kinds, ["text_box", "bullet_list", "table", "chart", "image"]);
        assert_eq!(body_text(&slide.elements[0].kind), "Hello\nWorld");
        assert_eq!(body_text(&slide.elements[1].kind), "one\ntwo\nthree");
        assert_eq!(
            slide.elements[0].frame,
            Some(Rect::new(0, 0, 3000000, 600000))
        );

        let ElementKind::TextBox(body) = &slide.elements[0].kind else {
            unreachable!()
        };
        let style = &body.paragraphs[0].runs[0].style;
        assert_eq!(style.color.as_deref(), Some("FF0000"));
        assert_eq!(style.bold, Some(true));

        let ElementKind::Table(table) = &slide.elements[2].kind else {
            unreachable!()
        };
        assert_eq!((table.row_count(), table.column_count()), (2, 2));
        assert_eq!(table.rows[1].cells[0].body.plain_text(), "c");

        let ElementKind::Chart(chart) = &slide.elements[3].kind else {
            unreachable!()
        };
        assert_eq!(chart.kind, ChartKind::Column);
        assert_eq!(chart.title.as_deref(), Some("Sales"));
        assert_eq!(chart.categories, ["Q1", "Q2"]);
        assert_eq!(
            chart.series,
            [ChartSeries {
                name: "2024".into(),
                values: vec![1.5, 2.0]
            }]
        );
        assert!(chart.part.is_some());

        let ElementKind::Image(image) = &slide.elements[4].kind else {
            unreachable!()
        };
        assert_eq!(image.description, "logo");
        assert_eq!(
            decoded.media.get(&image.media).map(|m| m.content_type.as_str()),
            Some("image/png")
        );
    }

    #[test]
    fn test_pristine_slide_is_copied_byte_for_byte() {
        let bytes = two_slide_package();
        let mut deck = decode(&bytes).unwrap();
        let first = deck.slides[0].origin.as_ref().unwrap().part_name.clone();
        let second = deck.slides[1].origin.as_ref().unwrap().part_name.clone();

        apply(
            &mut deck,
            json!({
                "op": "modify_element",
                "slide_index": 1,
                "element_index": 0,
                "patch": {"content": {"kind": "text", "text": "changed"}}
            }),
        );
        let again = encode(&deck).unwrap();

        let before = parts_of(&bytes);
        let after = parts_of(&again);
        assert_eq!(before[&first], after[&first]);
        assert_eq!(before[&rels_part_for(&first)], after[&rels_part_for(&first)]);
        assert_ne!(before[&second], after[&second]);

        let redecoded = decode(&again).unwrap();
        assert_eq!(body_text(&redecoded.slides[1].elements[0].kind), "changed");
    }

    #[test]
    fn test_unchanged_deck_keeps_presentation_parts() {
        let bytes = two_slide_package();
        let deck = decode(&bytes).unwrap();
        let again = encode(&deck).unwrap();

        let before = parts_of(&bytes);
        let after = parts_of(&again);
        assert_eq!(before.len(), after.len());
        for name in [
            "ppt/presentation.xml",
            "ppt/_rels/presentation.xml.rels",
            CONTENT_TYPES_PART,
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
        ] {
            assert_eq!(before[name], after[name], "{} changed", name);
        }
    }

    #[test]
    fn test_unknown_part_is_carried_through() {
        let custom = b"<?xml version=\"1.0\"?><custom xmlns=\"urn:example\">kept</custom>";
        let parts = read_parts(&two_slide_package()).unwrap();
        let mut entries: Vec<(&str, &[u8])> = parts
            .iter()
            .map(|p| (p.name.as_str(), &p.data[..]))
            .collect();
        entries.push(("customXml/item1.xml", &custom[..]));
        let bytes = write_parts(entries).unwrap();

        let mut deck = decode(&bytes).unwrap();
        apply(&mut deck, json!({"op": "delete_slide", "slide_index": 0}));
        let again = parts_of(&encode(&deck).unwrap());
        assert_eq!(again["customXml/item1.xml"], custom.to_vec());
    }

    #[test]
    fn test_dangling_media_reference_is_rejected() {
        let mut deck = Deck::new();
        apply(&mut deck, json!({"op": "add_slide"}));
        apply(
            &mut deck,
            json!({
                "op": "add_element",
                "slide_index": 0,
                "element": {
                    "kind": "image",
                    "box": {"x": 0, "y": 0, "width": 100, "height": 100},
                    "data": "iVBORw0KGgo="
                }
            }),
        );
        deck.media.clear();
        assert!(matches!(encode(&deck), Err(Error::DanglingReference(_))));
    }

    #[test]
    fn test_deleting_a_slide_drops_its_notes() {
        let notes = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
            <p:notes xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"/>";
        let notes_rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
            <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
            <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide\" Target=\"../slides/slide1.xml\"/>\
            </Relationships>";
        let parts = read_parts(&two_slide_package()).unwrap();
        let mut entries: Vec<(&str, &[u8])> = parts
            .iter()
            .map(|p| (p.name.as_str(), &p.data[..]))
            .collect();
        entries.push(("ppt/notesSlides/notesSlide1.xml", notes.as_bytes()));
        entries.push((
            "ppt/notesSlides/_rels/notesSlide1.xml.rels",
            notes_rels.as_bytes(),
        ));
        let bytes = write_parts(entries).unwrap();

        let mut deck = decode(&bytes).unwrap();
        assert_eq!(
            deck.slides[0].origin.as_ref().unwrap().part_name,
            "ppt/slides/slide1.xml"
        );
        apply(&mut deck, json!({"op": "delete_slide", "slide_index": 0}));
        let again = parts_of(&encode(&deck).unwrap());

        assert!(!again.contains_key("ppt/notesSlides/notesSlide1.xml"));
        assert!(!again.contains_key("ppt/notesSlides/_rels/notesSlide1.xml.rels"));
        assert!(!again.contains_key("ppt/slides/slide1.xml"));
        assert!(again.contains_key("ppt/slides/slide2.xml"));

        let redecoded = decode(&encode(&deck).unwrap()).unwrap();
        assert_eq!(redecoded.slide_count(), 1);
        assert_eq!(body_text(&redecoded.slides[0].elements[0].kind), "second");
    }

    /// Rewrite one part of a package with a string edit.
    fn patch_part(bytes: &[u8], name: &str, edit: impl Fn(&str) -> String) -> Vec<u8> {
        let parts = read_parts(bytes).unwrap();
        let patched: Vec<(String, Vec<u8>)> = parts
            .iter()
            .map(|p| {
                let data = if p.name == name {
                    edit(std::str::from_utf8(&p.data).unwrap()).into_bytes()
                } else {
                    p.data.to_vec()
                };
                (p.name.clone(), data)
            })
            .collect();
        write_parts(
            patched
                .iter()
                .map(|(name, data)| (name.as_str(), data.as_slice())),
        )
        .unwrap()
    }

    #[test]
    fn test_unmodeled_shapes_keep_stacking_order() {
        let backdrop = "<p:sp><p:nvSpPr><p:cNvPr id=\"40\" name=\"Backdrop\"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>\
            <p:spPr><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr></p:sp>";
        let connector = "<p:cxnSp><p:nvCxnSpPr><p:cNvPr id=\"50\" name=\"Connector\"/>\
            <p:cNvCxnSpPr/><p:nvPr/></p:nvCxnSpPr><p:spPr/></p:cxnSp>";
        let bytes = patch_part(&two_slide_package(), "ppt/slides/slide1.xml", |text| {
            text.replacen("</p:grpSpPr>", &format!("</p:grpSpPr>{}", backdrop), 1)
                .replace("</p:spTree>", &format!("{}</p:spTree>", connector))
        });

        let mut deck = decode(&bytes).unwrap();
        assert_eq!(deck.slides[0].preserved.len(), 2);
        apply(
            &mut deck,
            json!({
                "op": "modify_element",
                "slide_index": 0,
                "element_index": 0,
                "patch": {"content": {"kind": "text", "text": "edited"}}
            }),
        );

        let again = encode(&deck).unwrap();
        let slide_xml = String::from_utf8(parts_of(&again)["ppt/slides/slide1.xml"].clone()).unwrap();
        let backdrop_at = slide_xml.find("name=\"Backdrop\"").unwrap();
        let text_at = slide_xml.find("edited").unwrap();
        let connector_at = slide_xml.find("name=\"Connector\"").unwrap();
        assert!(backdrop_at < text_at);
        assert!(text_at < connector_at);

        let redecoded = decode(&again).unwrap();
        let anchors: Vec<usize> = redecoded.slides[0].preserved.iter().map(|p| p.anchor).collect();
        assert_eq!(anchors, [0, 1]);
        assert_eq!(body_text(&redecoded.slides[0].elements[0].kind), "edited");
    }

    #[test]
    fn test_shape_attributes_survive_regeneration() {
        let bytes = patch_part(&two_slide_package(), "ppt/slides/slide1.xml", |text| {
            text.replacen(
                "/><p:cNvSpPr txBox=\"1\"/><p:nvPr/>",
                " hidden=\"1\"><a:hlinkClick r:id=\"rId9\"/></p:cNvPr><p:cNvSpPr txBox=\"1\"/>\
                 <p:nvPr><p:custDataLst><p:tags r:id=\"rId10\"/></p:custDataLst></p:nvPr>",
                1,
            )
        });
        let mut deck = decode(&bytes).unwrap();
        assert_eq!(deck.slides[0].elements[0].extras.c_nv_pr_attrs, " hidden=\"1\"");
        apply(
            &mut deck,
            json!({
                "op": "modify_element",
                "slide_index": 0,
                "element_index": 0,
                "patch": {"style": {"bold": true}}
            }),
        );
        assert!(!deck.slides[0].is_pristine());

        let again = encode(&deck).unwrap();
        let slide_xml = String::from_utf8(parts_of(&again)["ppt/slides/slide1.xml"].clone()).unwrap();
        assert!(slide_xml.contains("hidden=\"1\"><a:hlinkClick r:id=\"rId9\"/></p:cNvPr>"));
        assert!(slide_xml.contains("<p:nvPr><p:custDataLst><p:tags r:id=\"rId10\"/></p:custDataLst></p:nvPr>"));
        assert!(slide_xml.contains(" b=\"1\""));
    }

    #[test]
    fn test_slide_size_change_patches_presentation() {
        let mut deck = decode(&two_slide_package()).unwrap();
        deck.slide_size.width = 9144000;
        deck.slide_size.height = 6858000;
        let again = encode(&deck).unwrap();

        let presentation =
            String::from_utf8(parts_of(&again)["ppt/presentation.xml"].clone()).unwrap();
        assert!(presentation.contains("cx=\"9144000\""));
        let redecoded = decode(&again).unwrap();
        assert_eq!(redecoded.slide_size.width, 9144000);
        assert_eq!(redecoded.slide_size.height, 6858000);
    }

    #[test]
    fn test_presentation_patch_inserts_list_after_master_ids() {
        let xml = "<p:presentation><p:sldMasterIdLst><p:sldMasterId id=\"1\"/></p:sldMasterIdLst>\
            <p:sldSz cx=\"1\" cy=\"2\"/></p:presentation>";
        let mut deck = Deck::new();
        deck.slide_size.width = 10;
        deck.slide_size.height = 20;
        let plans = [SlidePlan {
            part_name: "ppt/slides/slide1.xml".into(),
            slide_id: 256,
            rel_id: "rId7".into(),
        }];
        let kept: HashSet<u32> = [256].into_iter().collect();
        let patched = patch_presentation(xml, &plans, &deck, &kept);
        assert_eq!(
            patched,
            "<p:presentation><p:sldMasterIdLst><p:sldMasterId id=\"1\"/></p:sldMasterIdLst>\
             <p:sldIdLst><p:sldId id=\"256\" r:id=\"rId7\"/></p:sldIdLst>\
             <p:sldSz cx=\"10\" cy=\"20\"/></p:presentation>"
        );
    }
}

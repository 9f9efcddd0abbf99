//! Slide part reader.
//!
//! Text shapes, pictures, tables and charts become model elements; every
//! other shape-tree child is kept as raw XML and written back unchanged.

use crate::package::{rel_type, resolve_target};
use crate::text::{read_body, BodyShell};
use crate::xml::{self, push_attrs, XmlNode};
use slidemaker_core::types::{
    Background, Bullet, ChartData, Element, ElementKind, ImageData, LayoutSlot, MediaPart,
    PreservedShape, Rect, Relationship, ShapeExtras, SlideShell, TableCell, TableData, TableRow,
};
use slidemaker_core::{Error, Result};
use std::collections::BTreeMap;

/// What a slide part refers to outside itself.
pub(crate) struct SlideContext<'a> {
    pub part_name: &'a str,
    pub rels: &'a [Relationship],
    pub charts: &'a BTreeMap<String, ChartData>,
    pub media: &'a BTreeMap<String, MediaPart>,
}

impl SlideContext<'_> {
    /// Package part targeted by an internal relationship of the given type.
    fn target(&self, id: &str, kind: &str) -> Option<String> {
        self.rels
            .iter()
            .find(|r| r.id == id && !r.external && rel_type::is(&r.rel_type, kind))
            .map(|r| resolve_target(self.part_name, &r.target))
    }
}

/// Decoded content of one slide part.
#[derive(Debug)]
pub(crate) struct SlideContent {
    pub elements: Vec<Element>,
    pub background: Background,
    pub preserved: Vec<PreservedShape>,
    pub shell: SlideShell,
}

pub(crate) fn read_slide(content: &str, ctx: &SlideContext<'_>) -> Result<SlideContent> {
    let malformed = |what: &str| Error::MalformedPackage(format!("{}: {}", ctx.part_name, what));

    let root = xml::parse(content).map_err(|e| malformed(&e.to_string()))?;
    if root.local() != "sld" {
        return Err(malformed("root element is not a slide"));
    }
    let csld = root.child("cSld").ok_or_else(|| malformed("missing cSld"))?;
    let tree = csld
        .child("spTree")
        .ok_or_else(|| malformed("missing shape tree"))?;

    let root_close = content
        .rfind("</")
        .filter(|&pos| pos >= csld.span.end)
        .ok_or_else(|| malformed("unterminated root element"))?;

    let mut shell = SlideShell {
        root_open: root.raw_open(content).to_string(),
        csld_open: csld.raw_open(content).to_string(),
        tail: content[csld.span.end..root_close].to_string(),
        ..SlideShell::default()
    };

    let mut after_tree = false;
    for child in &csld.children {
        if after_tree {
            shell.csld_tail.push_str(child.raw(content));
        } else if child.local() == "spTree" {
            after_tree = true;
        }
    }

    let background = csld
        .child("bg")
        .map(|bg| read_background(bg, content, ctx))
        .unwrap_or_default();

    let mut elements = Vec::new();
    let mut preserved = Vec::new();
    for child in &tree.children {
        match child.local() {
            "nvGrpSpPr" | "grpSpPr" => shell.tree_head.push_str(child.raw(content)),
            _ => match read_element(child, content, ctx) {
                Some(element) => elements.push(element),
                None => preserved.push(PreservedShape {
                    anchor: elements.len(),
                    xml: child.raw(content).to_string(),
                }),
            },
        }
    }

    Ok(SlideContent {
        elements,
        background,
        preserved,
        shell,
    })
}

fn read_background(bg: &XmlNode, content: &str, ctx: &SlideContext<'_>) -> Background {
    let preserved = || Background::Preserved {
        xml: bg.raw(content).to_string(),
    };
    let Some(props) = bg.child("bgPr") else {
        return preserved();
    };
    let fills: Vec<&XmlNode> = props
        .children
        .iter()
        .filter(|c| c.local() != "effectLst" && c.local() != "effectDag")
        .collect();

    match fills.as_slice() {
        [fill] if fill.local() == "solidFill" => match fill.children.as_slice() {
            [clr] if clr.local() == "srgbClr" && clr.children.is_empty() => clr
                .attr("val")
                .map(|val| Background::Color {
                    color: val.to_string(),
                })
                .unwrap_or_else(preserved),
            _ => preserved(),
        },
        [fill] if fill.local() == "blipFill" => fill
            .child("blip")
            .and_then(|blip| blip.attr("r:embed"))
            .and_then(|id| ctx.target(id, rel_type::IMAGE))
            .filter(|part| ctx.media.contains_key(part))
            .map(|media| Background::Image { media })
            .unwrap_or_else(preserved),
        _ => preserved(),
    }
}

fn read_element(node: &XmlNode, content: &str, ctx: &SlideContext<'_>) -> Option<Element> {
    match node.local() {
        "sp" => read_shape(node, content),
        "pic" => read_picture(node, content, ctx),
        "graphicFrame" => read_graphic_frame(node, content, ctx),
        _ => None,
    }
}

/// `cNvPr`, the non-visual properties element and the placeholder binding.
/// Everything else found there is carried in `extras`.
struct NonVisual {
    id: u32,
    name: String,
    description: String,
    placeholder: Option<LayoutSlot>,
    extras: ShapeExtras,
}

fn read_non_visual(nv: &XmlNode, content: &str, props_tag: &str) -> Option<NonVisual> {
    let c_nv_pr = nv.child("cNvPr")?;
    let nv_pr = nv.child("nvPr");
    Some(NonVisual {
        id: c_nv_pr.attr("id").and_then(|v| v.parse().ok()).unwrap_or(0),
        name: c_nv_pr.attr("name").unwrap_or_default().to_string(),
        description: c_nv_pr.attr("descr").unwrap_or_default().to_string(),
        placeholder: nv_pr.and_then(|n| n.child("ph")).map(|ph| LayoutSlot {
            attrs: ph.attrs.clone(),
        }),
        extras: ShapeExtras {
            non_visual: nv.child(props_tag).map(|n| n.raw(content).to_string()),
            c_nv_pr_attrs: attrs_except(c_nv_pr, &["id", "name", "descr"]),
            c_nv_pr_children: children_except(c_nv_pr, content, &[]),
            nv_pr_attrs: nv_pr.map(|n| attrs_except(n, &[])).unwrap_or_default(),
            nv_pr_children: nv_pr
                .map(|n| children_except(n, content, &["ph"]))
                .unwrap_or_default(),
            ..ShapeExtras::default()
        },
    })
}

/// Raw attributes of a node, minus the named ones.
fn attrs_except(node: &XmlNode, skip: &[&str]) -> String {
    let kept: Vec<(String, String)> = node
        .attrs
        .iter()
        .filter(|(key, _)| !skip.contains(&key.as_str()))
        .cloned()
        .collect();
    let mut out = String::new();
    push_attrs(&mut out, &kept);
    out
}

/// Raw children of a node, minus those with the named local names.
fn children_except(node: &XmlNode, content: &str, skip: &[&str]) -> String {
    node.children
        .iter()
        .filter(|c| !skip.contains(&c.local()))
        .map(|c| c.raw(content))
        .collect()
}

/// Frame and extra transform attributes of an `a:xfrm` / `p:xfrm`.
fn read_xfrm(xfrm: Option<&XmlNode>) -> (Option<Rect>, String) {
    let Some(xfrm) = xfrm else {
        return (None, String::new());
    };
    let coord = |tag: &str, attr: &str| -> Option<i64> {
        xfrm.child(tag)
            .and_then(|n| n.attr(attr))
            .and_then(|v| v.parse().ok())
    };
    let frame = match (
        coord("off", "x"),
        coord("off", "y"),
        coord("ext", "cx"),
        coord("ext", "cy"),
    ) {
        (Some(x), Some(y), Some(width), Some(height)) => Some(Rect::new(x, y, width, height)),
        _ => None,
    };
    let mut attrs = String::new();
    push_attrs(&mut attrs, &xfrm.attrs);
    (frame, attrs)
}

/// `p:spPr` split into the transform and everything after it.
fn read_shape_props(sp_pr: Option<&XmlNode>, content: &str) -> (Option<Rect>, String, Option<String>) {
    let Some(sp_pr) = sp_pr else {
        return (None, String::new(), None);
    };
    let (frame, xfrm_attrs) = read_xfrm(sp_pr.child("xfrm"));
    let rest: String = sp_pr
        .children
        .iter()
        .filter(|c| c.local() != "xfrm")
        .map(|c| c.raw(content))
        .collect();
    (frame, xfrm_attrs, Some(rest))
}

fn read_shape(sp: &XmlNode, content: &str) -> Option<Element> {
    let tx_body = sp.child("txBody")?;
    let nv = read_non_visual(sp.child("nvSpPr")?, content, "cNvSpPr")?;
    let (frame, xfrm_attrs, shape_props) = read_shape_props(sp.child("spPr"), content);
    let (body, BodyShell {
        body_props,
        list_style,
    }) = read_body(tx_body, content);

    let bulleted = nv.placeholder.as_ref().is_some_and(LayoutSlot::is_body)
        || body.paragraphs.iter().any(|p| {
            matches!(p.bullet, Some(Bullet::Char(_)) | Some(Bullet::Number(_)))
        });
    let kind = if bulleted {
        ElementKind::BulletList(body)
    } else {
        ElementKind::TextBox(body)
    };

    Some(Element {
        id: nv.id,
        name: nv.name,
        frame,
        placeholder: nv.placeholder,
        kind,
        extras: ShapeExtras {
            xfrm_attrs,
            shape_props,
            style: sp.child("style").map(|n| n.raw(content).to_string()),
            body_props,
            list_style,
            ..nv.extras
        },
    })
}

fn read_picture(pic: &XmlNode, content: &str, ctx: &SlideContext<'_>) -> Option<Element> {
    let nv = read_non_visual(pic.child("nvPicPr")?, content, "cNvPicPr")?;
    let blip_fill = pic.child("blipFill")?;
    let blip = blip_fill.child("blip")?;
    let media = blip
        .attr("r:embed")
        .and_then(|id| ctx.target(id, rel_type::IMAGE))
        .filter(|part| ctx.media.contains_key(part))?;
    let blip_tail: String = blip_fill
        .children
        .iter()
        .filter(|c| c.local() != "blip")
        .map(|c| c.raw(content))
        .collect();
    let (frame, xfrm_attrs, shape_props) = read_shape_props(pic.child("spPr"), content);

    Some(Element {
        id: nv.id,
        name: nv.name,
        frame,
        placeholder: nv.placeholder,
        kind: ElementKind::Image(ImageData {
            media,
            description: nv.description,
        }),
        extras: ShapeExtras {
            xfrm_attrs,
            shape_props,
            style: pic.child("style").map(|n| n.raw(content).to_string()),
            blip_attrs: attrs_except(blip, &["r:embed"]),
            blip_children: children_except(blip, content, &[]),
            blip_tail: Some(blip_tail),
            ..nv.extras
        },
    })
}

fn read_graphic_frame(frame: &XmlNode, content: &str, ctx: &SlideContext<'_>) -> Option<Element> {
    let nv = read_non_visual(frame.child("nvGraphicFramePr")?, content, "cNvGraphicFramePr")?;
    let data = frame.path(&["graphic", "graphicData"])?;

    let kind = if let Some(tbl) = data.child("tbl") {
        ElementKind::Table(read_table(tbl, content))
    } else if let Some(chart) = data.child("chart") {
        let part = chart
            .attr("r:id")
            .and_then(|id| ctx.target(id, rel_type::CHART))?;
        let mut chart = ctx.charts.get(&part)?.clone();
        chart.part = Some(part);
        ElementKind::Chart(chart)
    } else {
        return None;
    };

    let (rect, xfrm_attrs) = read_xfrm(frame.child("xfrm"));
    Some(Element {
        id: nv.id,
        name: nv.name,
        frame: rect,
        placeholder: nv.placeholder,
        kind,
        extras: ShapeExtras {
            xfrm_attrs,
            ..nv.extras
        },
    })
}

fn read_table(tbl: &XmlNode, content: &str) -> TableData {
    let columns = tbl
        .child("tblGrid")
        .map(|grid| {
            grid.children_named("gridCol")
                .map(|col| col.attr("w").and_then(|w| w.parse().ok()).unwrap_or(0))
                .collect()
        })
        .unwrap_or_default();

    let rows = tbl
        .children_named("tr")
        .map(|tr| TableRow {
            height: tr.attr("h").and_then(|h| h.parse().ok()).unwrap_or(0),
            cells: tr
                .children_named("tc")
                .map(|tc| TableCell {
                    body: tc
                        .child("txBody")
                        .map(|tx| read_body(tx, content).0)
                        .unwrap_or_default(),
                    attrs: tc.attrs.clone(),
                    props: tc.child("tcPr").map(|n| n.raw(content).to_string()),
                })
                .collect(),
        })
        .collect();

    TableData {
        columns,
        rows,
        props: tbl.child("tblPr").map(|n| n.raw(content).to_string()),
    }
}

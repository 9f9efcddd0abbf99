//! Slide part writer.

use crate::package::{next_rel_id, rel_type, relative_target, resolve_target};
use crate::text::{write_body, BodyShell};
use crate::xml::{escape, push_attrs, push_element, XML_DECLARATION};
use slidemaker_core::types::{
    Background, Element, ElementKind, Rect, Relationship, Slide, SlideShell, TableData,
};
use slidemaker_core::{Error, Result};
use std::fmt::Write as _;

const NS_DECLS: &str = "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
     xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
     xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"";

const TABLE_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/table";
const CHART_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";

const TEXT_BOX_BODY_PROPS: &str =
    "<a:bodyPr wrap=\"square\" rtlCol=\"0\"><a:spAutoFit/></a:bodyPr>";
const PLAIN_RECT: &str = "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom>";

/// Shell used for slides that have no source part.
pub(crate) fn new_slide_shell() -> SlideShell {
    SlideShell {
        root_open: format!("<p:sld {}>", NS_DECLS),
        csld_open: "<p:cSld>".to_string(),
        tree_head: "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
                    <p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/>\
                    <a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr>"
            .to_string(),
        csld_tail: String::new(),
        tail: "<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>".to_string(),
    }
}

/// Hands out relationship ids for one part, reusing existing entries.
#[derive(Debug)]
pub(crate) struct RelAllocator {
    part_name: String,
    rels: Vec<Relationship>,
}

impl RelAllocator {
    pub fn new(part_name: &str, existing: Vec<Relationship>) -> Self {
        Self {
            part_name: part_name.to_string(),
            rels: existing,
        }
    }

    /// Id of an internal relationship to `target_part`, created if needed.
    pub fn target(&mut self, kind: &str, target_part: &str) -> String {
        if let Some(rel) = self.rels.iter().find(|r| {
            !r.external
                && rel_type::is(&r.rel_type, kind)
                && resolve_target(&self.part_name, &r.target) == target_part
        }) {
            return rel.id.clone();
        }
        let id = next_rel_id(&self.rels);
        self.rels.push(Relationship {
            id: id.clone(),
            rel_type: kind.to_string(),
            target: relative_target(&self.part_name, target_part),
            external: false,
        });
        id
    }

    /// Point the first relationship of a type at a new part, or add one.
    pub fn retarget(&mut self, kind: &str, target_part: &str) {
        let target = relative_target(&self.part_name, target_part);
        match self
            .rels
            .iter_mut()
            .find(|r| !r.external && rel_type::is(&r.rel_type, kind))
        {
            Some(rel) => {
                if resolve_target(&self.part_name, &rel.target) != target_part {
                    rel.target = target;
                }
            }
            None => {
                let id = next_rel_id(&self.rels);
                self.rels.push(Relationship {
                    id,
                    rel_type: kind.to_string(),
                    target,
                    external: false,
                });
            }
        }
    }

    pub fn into_rels(self) -> Vec<Relationship> {
        self.rels
    }
}

/// Serialize a slide; relationships it needs are taken from `rels`.
pub(crate) fn write_slide(slide: &Slide, shell: &SlideShell, rels: &mut RelAllocator) -> Result<String> {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(&shell.root_open);
    out.push_str(&shell.csld_open);
    write_background(&mut out, &slide.background, rels);

    out.push_str("<p:spTree>");
    out.push_str(&shell.tree_head);
    let mut preserved = slide.preserved.iter().peekable();
    for (index, element) in slide.elements.iter().enumerate() {
        while let Some(shape) = preserved.next_if(|s| s.anchor <= index) {
            out.push_str(&shape.xml);
        }
        write_element(&mut out, element, rels)?;
    }
    for shape in preserved {
        out.push_str(&shape.xml);
    }
    out.push_str("</p:spTree>");
    out.push_str(&shell.csld_tail);
    out.push_str("</p:cSld>");
    out.push_str(&shell.tail);
    let _ = write!(out, "</{}>", root_name(&shell.root_open));
    Ok(out)
}

fn root_name(root_open: &str) -> &str {
    let name = root_open.trim_start_matches('<');
    let end = name
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(name.len());
    &name[..end]
}

fn write_background(out: &mut String, background: &Background, rels: &mut RelAllocator) {
    match background {
        Background::Inherit => {}
        Background::Color { color } => {
            let _ = write!(
                out,
                "<p:bg><p:bgPr><a:solidFill><a:srgbClr val=\"{}\"/></a:solidFill><a:effectLst/></p:bgPr></p:bg>",
                escape(color)
            );
        }
        Background::Image { media } => {
            let id = rels.target(rel_type::IMAGE, media);
            let _ = write!(
                out,
                "<p:bg><p:bgPr><a:blipFill dpi=\"0\" rotWithShape=\"1\"><a:blip r:embed=\"{}\"/><a:srcRect/><a:stretch><a:fillRect/></a:stretch></a:blipFill><a:effectLst/></p:bgPr></p:bg>",
                id
            );
        }
        Background::Preserved { xml } => out.push_str(xml),
    }
}

fn write_element(out: &mut String, element: &Element, rels: &mut RelAllocator) -> Result<()> {
    match &element.kind {
        ElementKind::TextBox(body) | ElementKind::BulletList(body) => {
            let extras = &element.extras;
            out.push_str("<p:sp><p:nvSpPr>");
            write_c_nv_pr(out, element, None);
            let default_nv = if element.placeholder.is_some() {
                "<p:cNvSpPr/>"
            } else {
                "<p:cNvSpPr txBox=\"1\"/>"
            };
            out.push_str(extras.non_visual.as_deref().unwrap_or(default_nv));
            write_nv_pr(out, element);
            out.push_str("</p:nvSpPr>");

            out.push_str("<p:spPr>");
            write_xfrm(out, "a:xfrm", element.frame.as_ref(), &extras.xfrm_attrs);
            out.push_str(
                extras
                    .shape_props
                    .as_deref()
                    .unwrap_or("<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/>"),
            );
            out.push_str("</p:spPr>");
            if let Some(style) = &extras.style {
                out.push_str(style);
            }

            let shell = BodyShell {
                body_props: extras.body_props.clone(),
                list_style: extras.list_style.clone(),
            };
            let default_body_props = if element.placeholder.is_some() {
                "<a:bodyPr/>"
            } else {
                TEXT_BOX_BODY_PROPS
            };
            write_body(out, "p:txBody", body, &shell, default_body_props);
            out.push_str("</p:sp>");
        }
        ElementKind::Image(image) => {
            let extras = &element.extras;
            out.push_str("<p:pic><p:nvPicPr>");
            write_c_nv_pr(out, element, Some(&image.description));
            out.push_str(extras.non_visual.as_deref().unwrap_or(
                "<p:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></p:cNvPicPr>",
            ));
            write_nv_pr(out, element);
            out.push_str("</p:nvPicPr>");

            let id = rels.target(rel_type::IMAGE, &image.media);
            out.push_str("<p:blipFill>");
            push_element(
                out,
                "a:blip",
                &format!(" r:embed=\"{}\"{}", id, extras.blip_attrs),
                &extras.blip_children,
            );
            out.push_str(
                extras
                    .blip_tail
                    .as_deref()
                    .unwrap_or("<a:stretch><a:fillRect/></a:stretch>"),
            );
            out.push_str("</p:blipFill>");

            out.push_str("<p:spPr>");
            write_xfrm(out, "a:xfrm", element.frame.as_ref(), &extras.xfrm_attrs);
            out.push_str(extras.shape_props.as_deref().unwrap_or(PLAIN_RECT));
            out.push_str("</p:spPr>");
            if let Some(style) = &extras.style {
                out.push_str(style);
            }
            out.push_str("</p:pic>");
        }
        ElementKind::Table(table) => {
            write_frame_open(out, element);
            let _ = write!(out, "<a:graphic><a:graphicData uri=\"{}\">", TABLE_URI);
            write_table(out, table);
            out.push_str("</a:graphicData></a:graphic></p:graphicFrame>");
        }
        ElementKind::Chart(chart) => {
            let part = chart.part.as_deref().ok_or_else(|| {
                Error::DanglingReference(format!("chart '{}' has no chart part", element.name))
            })?;
            let id = rels.target(rel_type::CHART, part);
            write_frame_open(out, element);
            let _ = write!(
                out,
                "<a:graphic><a:graphicData uri=\"{0}\"><c:chart xmlns:c=\"{0}\" r:id=\"{1}\"/></a:graphicData></a:graphic></p:graphicFrame>",
                CHART_URI, id
            );
        }
    }
    Ok(())
}

fn write_c_nv_pr(out: &mut String, element: &Element, description: Option<&str>) {
    let _ = write!(
        out,
        "<p:cNvPr id=\"{}\" name=\"{}\"",
        element.id,
        escape(&element.name)
    );
    if let Some(descr) = description.filter(|d| !d.is_empty()) {
        let _ = write!(out, " descr=\"{}\"", escape(descr));
    }
    out.push_str(&element.extras.c_nv_pr_attrs);
    if element.extras.c_nv_pr_children.is_empty() {
        out.push_str("/>");
    } else {
        let _ = write!(out, ">{}</p:cNvPr>", element.extras.c_nv_pr_children);
    }
}

/// `p:nvPr`: the placeholder binding, then whatever else the source had.
fn write_nv_pr(out: &mut String, element: &Element) {
    let mut inner = String::new();
    if let Some(slot) = &element.placeholder {
        inner.push_str("<p:ph");
        push_attrs(&mut inner, &slot.attrs);
        inner.push_str("/>");
    }
    inner.push_str(&element.extras.nv_pr_children);
    push_element(out, "p:nvPr", &element.extras.nv_pr_attrs, &inner);
}

fn write_xfrm(out: &mut String, tag: &str, frame: Option<&Rect>, attrs: &str) {
    if let Some(frame) = frame {
        let _ = write!(
            out,
            "<{tag}{attrs}><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></{tag}>",
            frame.x,
            frame.y,
            frame.width,
            frame.height,
            tag = tag,
            attrs = attrs
        );
    }
}

fn write_frame_open(out: &mut String, element: &Element) {
    out.push_str("<p:graphicFrame><p:nvGraphicFramePr>");
    write_c_nv_pr(out, element, None);
    out.push_str(element.extras.non_visual.as_deref().unwrap_or(
        "<p:cNvGraphicFramePr><a:graphicFrameLocks noGrp=\"1\"/></p:cNvGraphicFramePr>",
    ));
    write_nv_pr(out, element);
    out.push_str("</p:nvGraphicFramePr>");
    // The transform is mandatory on graphic frames.
    let frame = element.frame.unwrap_or(Rect::new(0, 0, 0, 0));
    write_xfrm(out, "p:xfrm", Some(&frame), &element.extras.xfrm_attrs);
}

fn write_table(out: &mut String, table: &TableData) {
    out.push_str("<a:tbl>");
    out.push_str(
        table
            .props
            .as_deref()
            .unwrap_or("<a:tblPr firstRow=\"1\" bandRow=\"1\"/>"),
    );
    out.push_str("<a:tblGrid>");
    for width in &table.columns {
        let _ = write!(out, "<a:gridCol w=\"{}\"/>", width);
    }
    out.push_str("</a:tblGrid>");

    for row in &table.rows {
        let _ = write!(out, "<a:tr h=\"{}\">", row.height);
        for cell in &row.cells {
            out.push_str("<a:tc");
            push_attrs(out, &cell.attrs);
            out.push('>');
            write_body(out, "a:txBody", &cell.body, &BodyShell::default(), "<a:bodyPr/>");
            out.push_str(cell.props.as_deref().unwrap_or("<a:tcPr/>"));
            out.push_str("</a:tc>");
        }
        out.push_str("</a:tr>");
    }
    out.push_str("</a:tbl>");
}

//! DrawingML text bodies: `txBody`, paragraphs, runs and run properties.

use crate::xml::{escape, push_attrs, push_element, XmlNode};
use slidemaker_core::types::{
    Alignment, Bullet, Paragraph, ParagraphExtras, RunKind, RunStyle, StyleExtras, TextBody,
    TextRun,
};
use std::fmt::Write as _;

/// Hanging indent given to bullets the engine created.
const BULLET_INDENT: i64 = 285_750;

/// Body-level XML kept beside the paragraphs.
#[derive(Debug, Default)]
pub(crate) struct BodyShell {
    pub body_props: Option<String>,
    pub list_style: Option<String>,
}

/// Read a `p:txBody` / `a:txBody` element.
pub(crate) fn read_body(tx: &XmlNode, xml: &str) -> (TextBody, BodyShell) {
    let shell = BodyShell {
        body_props: tx.child("bodyPr").map(|n| n.raw(xml).to_string()),
        list_style: tx.child("lstStyle").map(|n| n.raw(xml).to_string()),
    };
    let body = TextBody {
        paragraphs: tx
            .children_named("p")
            .map(|p| read_paragraph(p, xml))
            .collect(),
    };
    (body, shell)
}

fn read_paragraph(p: &XmlNode, xml: &str) -> Paragraph {
    let mut paragraph = Paragraph::default();

    if let Some(ppr) = p.child("pPr") {
        for (key, value) in &ppr.attrs {
            match key.as_str() {
                "algn" if Alignment::from_xml(value).is_some() => {
                    paragraph.alignment = Alignment::from_xml(value)
                }
                "lvl" if value.parse::<u8>().is_ok() => {
                    paragraph.level = value.parse().unwrap_or(0)
                }
                _ => paragraph
                    .extras
                    .attrs
                    .push((key.clone(), value.clone())),
            }
        }

        for child in &ppr.children {
            match child.local() {
                "buChar" => {
                    paragraph.bullet =
                        Some(Bullet::Char(child.attr("char").unwrap_or("\u{2022}").to_string()))
                }
                "buAutoNum" => {
                    paragraph.bullet = Some(Bullet::Number(
                        child.attr("type").unwrap_or("arabicPeriod").to_string(),
                    ))
                }
                "buNone" => paragraph.bullet = Some(Bullet::Off),
                "buBlip" | "tabLst" | "defRPr" | "extLst" => {
                    paragraph.extras.post_bullet.push_str(child.raw(xml))
                }
                _ => paragraph.extras.pre_bullet.push_str(child.raw(xml)),
            }
        }
    }

    for child in &p.children {
        match child.local() {
            "r" => paragraph.runs.push(TextRun {
                text: child.texts_of("t"),
                style: read_run_props(child.child("rPr"), xml),
                kind: RunKind::Text,
            }),
            "br" => paragraph.runs.push(TextRun {
                text: "\n".to_string(),
                style: read_run_props(child.child("rPr"), xml),
                kind: RunKind::Break,
            }),
            "fld" => paragraph.runs.push(TextRun {
                text: child.texts_of("t"),
                style: read_run_props(child.child("rPr"), xml),
                kind: RunKind::Field {
                    field_id: child.attr("id").unwrap_or_default().to_string(),
                    field_type: child.attr("type").map(str::to_string),
                },
            }),
            "endParaRPr" => paragraph.extras.end_props = Some(child.raw(xml).to_string()),
            "pPr" => {}
            _ => paragraph
                .extras
                .inline
                .push((paragraph.runs.len(), child.raw(xml).to_string())),
        }
    }

    paragraph
}

/// Read an `a:rPr` (or `a:defRPr`) element into a run style.
pub(crate) fn read_run_props(rpr: Option<&XmlNode>, xml: &str) -> RunStyle {
    let mut style = RunStyle::default();
    let Some(rpr) = rpr else {
        return style;
    };

    for (key, value) in &rpr.attrs {
        match key.as_str() {
            "sz" => match value.parse::<f32>() {
                Ok(sz) => style.size = Some(sz / 100.0),
                Err(_) => style.extras.attrs.push((key.clone(), value.clone())),
            },
            "b" => style.bold = Some(parse_bool(value)),
            "i" => style.italic = Some(parse_bool(value)),
            _ => style.extras.attrs.push((key.clone(), value.clone())),
        }
    }

    for child in &rpr.children {
        match child.local() {
            "ln" => style.extras.line = Some(child.raw(xml).to_string()),
            "solidFill" => match plain_rgb(child) {
                Some(rgb) => style.color = Some(rgb.to_string()),
                None => style.extras.fill = Some(child.raw(xml).to_string()),
            },
            "noFill" | "gradFill" | "blipFill" | "pattFill" | "grpFill" => {
                style.extras.fill = Some(child.raw(xml).to_string())
            }
            "effectLst" | "effectDag" | "highlight" | "uLnTx" | "uLn" | "uFillTx" | "uFill" => {
                style.extras.effects.push_str(child.raw(xml))
            }
            "latin" => {
                style.extras.latin = Some(child.raw(xml).to_string());
                style.font_family = child
                    .attr("typeface")
                    .filter(|t| !t.is_empty() && !t.starts_with('+'))
                    .map(str::to_string);
            }
            _ => style.extras.trailing.push_str(child.raw(xml)),
        }
    }

    style
}

/// `<a:solidFill><a:srgbClr val="..."/></a:solidFill>` without modifiers.
fn plain_rgb(fill: &XmlNode) -> Option<&str> {
    match fill.children.as_slice() {
        [clr] if clr.local() == "srgbClr" && clr.children.is_empty() => clr.attr("val"),
        _ => None,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true")
}

/// Write a text body. `default_body_props` is used when the body has none.
pub(crate) fn write_body(
    out: &mut String,
    tag: &str,
    body: &TextBody,
    shell: &BodyShell,
    default_body_props: &str,
) {
    let _ = write!(out, "<{}>", tag);
    out.push_str(shell.body_props.as_deref().unwrap_or(default_body_props));
    out.push_str(shell.list_style.as_deref().unwrap_or("<a:lstStyle/>"));
    if body.paragraphs.is_empty() {
        out.push_str("<a:p/>");
    }
    for paragraph in &body.paragraphs {
        write_paragraph(out, paragraph);
    }
    let _ = write!(out, "</{}>", tag);
}

fn write_paragraph(out: &mut String, paragraph: &Paragraph) {
    let mut attrs = String::new();
    push_attrs(&mut attrs, &paragraph.extras.attrs);
    if paragraph.extras == ParagraphExtras::default()
        && matches!(paragraph.bullet, Some(Bullet::Char(_)) | Some(Bullet::Number(_)))
    {
        let _ = write!(
            attrs,
            " marL=\"{}\" indent=\"-{}\"",
            BULLET_INDENT * (i64::from(paragraph.level) + 1),
            BULLET_INDENT
        );
    }
    if paragraph.level > 0 {
        let _ = write!(attrs, " lvl=\"{}\"", paragraph.level);
    }
    if let Some(alignment) = paragraph.alignment {
        let _ = write!(attrs, " algn=\"{}\"", alignment.to_xml());
    }

    let mut inner = paragraph.extras.pre_bullet.clone();
    match &paragraph.bullet {
        Some(Bullet::Char(c)) => {
            let _ = write!(inner, "<a:buChar char=\"{}\"/>", escape(c));
        }
        Some(Bullet::Number(scheme)) => {
            let _ = write!(inner, "<a:buAutoNum type=\"{}\"/>", escape(scheme));
        }
        Some(Bullet::Off) => inner.push_str("<a:buNone/>"),
        None => {}
    }
    inner.push_str(&paragraph.extras.post_bullet);

    out.push_str("<a:p>");
    if !attrs.is_empty() || !inner.is_empty() {
        push_element(out, "a:pPr", &attrs, &inner);
    }

    let mut inline = paragraph.extras.inline.iter().peekable();
    for (index, run) in paragraph.runs.iter().enumerate() {
        while let Some((_, raw)) = inline.next_if(|(at, _)| *at <= index) {
            out.push_str(raw);
        }
        match &run.kind {
            RunKind::Text => {
                out.push_str("<a:r>");
                write_run_props(out, "a:rPr", &run.style);
                let _ = write!(out, "<a:t>{}</a:t></a:r>", escape(&run.text));
            }
            RunKind::Break => {
                let mut props = String::new();
                write_run_props(&mut props, "a:rPr", &run.style);
                push_element(out, "a:br", "", &props);
            }
            RunKind::Field {
                field_id,
                field_type,
            } => {
                let _ = write!(out, "<a:fld id=\"{}\"", escape(field_id));
                if let Some(field_type) = field_type {
                    let _ = write!(out, " type=\"{}\"", escape(field_type));
                }
                out.push('>');
                write_run_props(out, "a:rPr", &run.style);
                let _ = write!(out, "<a:t>{}</a:t></a:fld>", escape(&run.text));
            }
        }
    }

    for (_, raw) in inline {
        out.push_str(raw);
    }
    if let Some(end) = &paragraph.extras.end_props {
        out.push_str(end);
    }
    out.push_str("</a:p>");
}

/// Write run properties; nothing is written for an empty style.
pub(crate) fn write_run_props(out: &mut String, tag: &str, style: &RunStyle) {
    let mut attrs = String::new();
    push_attrs(&mut attrs, &style.extras.attrs);
    if let Some(size) = style.size {
        let _ = write!(attrs, " sz=\"{}\"", (size * 100.0).round() as i64);
    }
    if let Some(bold) = style.bold {
        let _ = write!(attrs, " b=\"{}\"", u8::from(bold));
    }
    if let Some(italic) = style.italic {
        let _ = write!(attrs, " i=\"{}\"", u8::from(italic));
    }

    let StyleExtras {
        line,
        fill,
        latin,
        effects,
        trailing,
        ..
    } = &style.extras;

    let mut inner = String::new();
    if let Some(line) = line {
        inner.push_str(line);
    }
    match (&style.color, fill) {
        (Some(color), _) => {
            let _ = write!(
                inner,
                "<a:solidFill><a:srgbClr val=\"{}\"/></a:solidFill>",
                escape(color)
            );
        }
        (None, Some(fill)) => inner.push_str(fill),
        (None, None) => {}
    }
    inner.push_str(effects);
    match (&style.font_family, latin) {
        (Some(family), Some(raw)) if latin_typeface(raw) == Some(family.as_str()) => {
            inner.push_str(raw)
        }
        (Some(family), _) => {
            let _ = write!(inner, "<a:latin typeface=\"{}\"/>", escape(family));
        }
        (None, Some(raw)) => inner.push_str(raw),
        (None, None) => {}
    }
    inner.push_str(trailing);

    if !attrs.is_empty() || !inner.is_empty() {
        push_element(out, tag, &attrs, &inner);
    }
}

fn latin_typeface(raw: &str) -> Option<&str> {
    let start = raw.find("typeface=\"")? + "typeface=\"".len();
    let len = raw[start..].find('"')?;
    Some(&raw[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn body_of(xml: &str) -> (TextBody, BodyShell) {
        let root = parse(xml).unwrap();
        read_body(&root, xml)
    }

    fn rewrite(body: &TextBody, shell: &BodyShell) -> String {
        let mut out = String::new();
        write_body(&mut out, "p:txBody", body, shell, "<a:bodyPr/>");
        out
    }

    #[test]
    fn test_read_runs_and_styles() {
        let xml = r#"<p:txBody><a:bodyPr wrap="none"/><a:lstStyle/><a:p><a:pPr algn="ctr" lvl="1"><a:buChar char="-"/></a:pPr><a:r><a:rPr lang="en-US" sz="2400" b="1"><a:solidFill><a:srgbClr val="FF0000"/></a:solidFill><a:latin typeface="Arial"/></a:rPr><a:t>Hello {{name}}</a:t></a:r><a:br/><a:fld id="{X}" type="slidenum"><a:t>3</a:t></a:fld><a:endParaRPr lang="en-US"/></a:p></p:txBody>"#;
        let (body, shell) = body_of(xml);
        assert_eq!(shell.body_props.as_deref(), Some(r#"<a:bodyPr wrap="none"/>"#));

        let p = &body.paragraphs[0];
        assert_eq!(p.alignment, Some(Alignment::Center));
        assert_eq!(p.level, 1);
        assert_eq!(p.bullet, Some(Bullet::Char("-".into())));
        assert_eq!(p.text(), "Hello {{name}}\n3");

        let style = &p.runs[0].style;
        assert_eq!(style.size, Some(24.0));
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.color.as_deref(), Some("FF0000"));
        assert_eq!(style.font_family.as_deref(), Some("Arial"));
        assert_eq!(style.extras.attrs, vec![("lang".to_string(), "en-US".to_string())]);
        assert_eq!(p.runs[1].kind, RunKind::Break);
        assert!(matches!(&p.runs[2].kind, RunKind::Field { field_type: Some(t), .. } if t == "slidenum"));
    }

    #[test]
    fn test_theme_font_reference_has_no_family() {
        let xml = r#"<a:rPr><a:schemeClr val="tx1"/><a:latin typeface="+mn-lt"/></a:rPr>"#;
        let root = parse(xml).unwrap();
        let style = read_run_props(Some(&root), xml);
        assert_eq!(style.font_family, None);
        assert_eq!(style.extras.latin.as_deref(), Some(r#"<a:latin typeface="+mn-lt"/>"#));
    }

    #[test]
    fn test_write_then_read_keeps_model() {
        let xml = r#"<p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:pPr marL="0" algn="r"><a:spcBef><a:spcPts val="600"/></a:spcBef><a:buNone/><a:defRPr/></a:pPr><a:r><a:rPr sz="1050" i="1"><a:solidFill><a:schemeClr val="accent1"/></a:solidFill><a:effectLst/><a:latin typeface="+mj-lt"/><a:ea typeface="+mj-ea"/></a:rPr><a:t>Tom &amp; Jerry </a:t></a:r></a:p><a:p><a:endParaRPr/></a:p></p:txBody>"#;
        let (body, shell) = body_of(xml);
        let written = rewrite(&body, &shell);
        let (again, _) = body_of(&written);
        assert_eq!(again, body);
        assert_eq!(again.paragraphs[0].runs[0].text, "Tom & Jerry ");
        assert_eq!(again.paragraphs[0].runs[0].style.size, Some(10.5));
    }

    #[test]
    fn test_unknown_paragraph_children_stay_in_place() {
        let xml = r#"<p:txBody><a:bodyPr/><a:p><a:r><a:t>x = </a:t></a:r><a14:m xmlns:a14="urn:a14"><m:oMath xmlns:m="urn:m"/></a14:m><a:r><a:t>!</a:t></a:r><a:extLst><a:ext uri="{1}"/></a:extLst><a:endParaRPr/></a:p></p:txBody>"#;
        let (body, shell) = body_of(xml);
        let paragraph = &body.paragraphs[0];
        assert_eq!(paragraph.text(), "x = !");
        let anchors: Vec<usize> = paragraph.extras.inline.iter().map(|(at, _)| *at).collect();
        assert_eq!(anchors, [1, 2]);

        let written = rewrite(&body, &shell);
        assert!(written.contains(
            "<a:t>x = </a:t></a:r><a14:m xmlns:a14=\"urn:a14\"><m:oMath xmlns:m=\"urn:m\"/></a14:m><a:r>"
        ));
        assert!(written.contains("</a:r><a:extLst><a:ext uri=\"{1}\"/></a:extLst><a:endParaRPr/></a:p>"));
    }

    #[test]
    fn test_color_replaces_raw_fill() {
        let mut style = RunStyle::default();
        style.extras.fill = Some("<a:solidFill><a:schemeClr val=\"tx1\"/></a:solidFill>".into());
        style.color = Some("00FF00".into());
        style.font_family = Some("Lato".into());
        style.extras.latin = Some("<a:latin typeface=\"Arial\" pitchFamily=\"34\"/>".into());

        let mut out = String::new();
        write_run_props(&mut out, "a:rPr", &style);
        assert_eq!(
            out,
            "<a:rPr><a:solidFill><a:srgbClr val=\"00FF00\"/></a:solidFill><a:latin typeface=\"Lato\"/></a:rPr>"
        );
    }

    #[test]
    fn test_new_bullets_get_indent() {
        let mut paragraph = Paragraph::plain("item", RunStyle::default());
        paragraph.bullet = Some(Bullet::Char("\u{2022}".into()));
        let body = TextBody {
            paragraphs: vec![paragraph],
        };
        let written = rewrite(&body, &BodyShell::default());
        assert!(written.contains("<a:pPr marL=\"285750\" indent=\"-285750\"><a:buChar char=\"\u{2022}\"/></a:pPr>"));
        assert!(written.contains("<a:r><a:t>item</a:t></a:r>"));
    }

    #[test]
    fn test_empty_body_writes_one_paragraph() {
        let written = rewrite(&TextBody::default(), &BodyShell::default());
        assert_eq!(written, "<p:txBody><a:bodyPr/><a:lstStyle/><a:p/></p:txBody>");
    }
}

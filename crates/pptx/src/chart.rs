//! Chart parts (`c:chartSpace`).
//!
//! Only single-group charts of the supported kinds are lifted into the
//! model; anything else stays an opaque graphic frame. Regenerated charts
//! carry their data as literals, so no embedded workbook is needed.

use crate::xml::{self, escape, XmlNode, XML_DECLARATION};
use slidemaker_core::types::{ChartData, ChartKind, ChartSeries};
use std::fmt::Write as _;

const CHART_GROUPS: &[&str] = &[
    "barChart",
    "bar3DChart",
    "lineChart",
    "line3DChart",
    "pieChart",
    "pie3DChart",
    "ofPieChart",
    "doughnutChart",
    "areaChart",
    "area3DChart",
    "scatterChart",
    "radarChart",
    "bubbleChart",
    "stockChart",
    "surfaceChart",
    "surface3DChart",
];

const CAT_AX_ID: u32 = 500_000_001;
const VAL_AX_ID: u32 = 500_000_002;

/// Read chart data from a chart part, if it is a kind the model supports.
pub(crate) fn read_chart(content: &str) -> Option<ChartData> {
    let root = xml::parse(content).ok()?;
    let chart = root.child("chart")?;
    let plot = chart.child("plotArea")?;

    let mut groups = plot
        .children
        .iter()
        .filter(|c| CHART_GROUPS.contains(&c.local()));
    let group = groups.next()?;
    if groups.next().is_some() {
        return None;
    }

    let kind = match group.local() {
        "barChart" => match group.child("barDir").and_then(|d| d.attr("val")) {
            Some("bar") => ChartKind::Bar,
            _ => ChartKind::Column,
        },
        "lineChart" => ChartKind::Line,
        "pieChart" => ChartKind::Pie,
        "doughnutChart" => ChartKind::Doughnut,
        "areaChart" => ChartKind::Area,
        "scatterChart" => ChartKind::Scatter,
        _ => return None,
    };

    let (cat_tag, val_tag) = if kind == ChartKind::Scatter {
        ("xVal", "yVal")
    } else {
        ("cat", "val")
    };

    let mut categories: Vec<String> = Vec::new();
    let mut series = Vec::new();
    for ser in group.children_named("ser") {
        if categories.is_empty() {
            if let Some(cat) = ser.child(cat_tag) {
                categories = points(cat);
            }
        }
        let name = ser
            .child("tx")
            .map(|tx| tx.texts_of("v"))
            .unwrap_or_default();
        let values = ser
            .child(val_tag)
            .map(points)
            .unwrap_or_default()
            .iter()
            .map(|v| v.trim().parse::<f64>().unwrap_or(0.0))
            .collect();
        series.push(ChartSeries { name, values });
    }

    if !categories.is_empty() {
        for s in &mut series {
            s.values.resize(categories.len(), 0.0);
        }
    }

    let title = chart
        .child("title")
        .map(|t| t.texts_of("t"))
        .filter(|t| !t.is_empty());

    Some(ChartData {
        kind,
        title,
        categories,
        series,
        part: None,
    })
}

/// Point values of a `c:cat` / `c:val` / `c:tx` element, indexed by `idx`.
fn points(node: &XmlNode) -> Vec<String> {
    let Some(cache) = ["strCache", "numCache", "strLit", "numLit", "lvl"]
        .iter()
        .find_map(|tag| node.descendant(tag))
    else {
        return Vec::new();
    };

    let count = cache
        .child("ptCount")
        .and_then(|c| c.attr("val"))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let pts: Vec<(usize, String)> = cache
        .children_named("pt")
        .enumerate()
        .map(|(i, pt)| {
            let idx = pt.attr("idx").and_then(|v| v.parse().ok()).unwrap_or(i);
            (idx, pt.texts_of("v"))
        })
        .collect();

    let len = pts.iter().map(|(idx, _)| idx + 1).max().unwrap_or(0).max(count);
    let mut out = vec![String::new(); len];
    for (idx, value) in pts {
        out[idx] = value;
    }
    out
}

/// Serialize a complete chart part.
pub(crate) fn write_chart(chart: &ChartData) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(
        "<c:chartSpace xmlns:c=\"http://schemas.openxmlformats.org/drawingml/2006/chart\" \
         xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    );
    out.push_str("<c:roundedCorners val=\"0\"/><c:chart>");

    match &chart.title {
        Some(title) => {
            let _ = write!(
                out,
                "<c:title><c:tx><c:rich><a:bodyPr/><a:lstStyle/><a:p><a:r><a:t>{}</a:t></a:r></a:p></c:rich></c:tx><c:overlay val=\"0\"/></c:title><c:autoTitleDeleted val=\"0\"/>",
                escape(title)
            );
        }
        None => out.push_str("<c:autoTitleDeleted val=\"1\"/>"),
    }

    out.push_str("<c:plotArea><c:layout/>");
    write_group(&mut out, chart);
    write_axes(&mut out, chart.kind);
    out.push_str("</c:plotArea>");

    out.push_str(
        "<c:legend><c:legendPos val=\"r\"/><c:overlay val=\"0\"/></c:legend><c:plotVisOnly val=\"1\"/><c:dispBlanksAs val=\"gap\"/>",
    );
    out.push_str("</c:chart></c:chartSpace>");
    out
}

fn write_group(out: &mut String, chart: &ChartData) {
    let (tag, head) = match chart.kind {
        ChartKind::Bar => (
            "c:barChart",
            "<c:barDir val=\"bar\"/><c:grouping val=\"clustered\"/><c:varyColors val=\"0\"/>",
        ),
        ChartKind::Column => (
            "c:barChart",
            "<c:barDir val=\"col\"/><c:grouping val=\"clustered\"/><c:varyColors val=\"0\"/>",
        ),
        ChartKind::Line => (
            "c:lineChart",
            "<c:grouping val=\"standard\"/><c:varyColors val=\"0\"/>",
        ),
        ChartKind::Pie => ("c:pieChart", "<c:varyColors val=\"1\"/>"),
        ChartKind::Doughnut => ("c:doughnutChart", "<c:varyColors val=\"1\"/>"),
        ChartKind::Area => (
            "c:areaChart",
            "<c:grouping val=\"standard\"/><c:varyColors val=\"0\"/>",
        ),
        ChartKind::Scatter => (
            "c:scatterChart",
            "<c:scatterStyle val=\"lineMarker\"/><c:varyColors val=\"0\"/>",
        ),
    };

    let _ = write!(out, "<{}>{}", tag, head);
    for (i, series) in chart.series.iter().enumerate() {
        write_series(out, chart, i, series);
    }
    match chart.kind {
        ChartKind::Bar | ChartKind::Column => out.push_str("<c:gapWidth val=\"150\"/>"),
        ChartKind::Line => out.push_str("<c:marker val=\"1\"/>"),
        ChartKind::Pie => out.push_str("<c:firstSliceAng val=\"0\"/>"),
        ChartKind::Doughnut => {
            out.push_str("<c:firstSliceAng val=\"0\"/><c:holeSize val=\"50\"/>")
        }
        ChartKind::Area | ChartKind::Scatter => {}
    }
    if has_axes(chart.kind) {
        let _ = write!(
            out,
            "<c:axId val=\"{}\"/><c:axId val=\"{}\"/>",
            CAT_AX_ID, VAL_AX_ID
        );
    }
    let _ = write!(out, "</{}>", tag);
}

fn write_series(out: &mut String, chart: &ChartData, index: usize, series: &ChartSeries) {
    let _ = write!(
        out,
        "<c:ser><c:idx val=\"{0}\"/><c:order val=\"{0}\"/>",
        index
    );
    out.push_str("<c:tx><c:strRef><c:f></c:f><c:strCache><c:ptCount val=\"1\"/><c:pt idx=\"0\">");
    let _ = write!(out, "<c:v>{}</c:v>", escape(&series.name));
    out.push_str("</c:pt></c:strCache></c:strRef></c:tx>");

    match chart.kind {
        ChartKind::Bar | ChartKind::Column => out.push_str("<c:invertIfNegative val=\"0\"/>"),
        ChartKind::Line => out.push_str("<c:marker><c:symbol val=\"none\"/></c:marker>"),
        ChartKind::Scatter => out.push_str("<c:marker><c:symbol val=\"circle\"/></c:marker>"),
        _ => {}
    }

    let values: Vec<String> = series.values.iter().map(|v| v.to_string()).collect();
    if chart.kind == ChartKind::Scatter {
        out.push_str("<c:xVal>");
        if chart.categories.iter().all(|c| c.trim().parse::<f64>().is_ok()) {
            write_literal(out, "c:numLit", &chart.categories);
        } else {
            write_literal(out, "c:strLit", &chart.categories);
        }
        out.push_str("</c:xVal><c:yVal>");
        write_literal(out, "c:numLit", &values);
        out.push_str("</c:yVal><c:smooth val=\"0\"/>");
    } else {
        out.push_str("<c:cat>");
        write_literal(out, "c:strLit", &chart.categories);
        out.push_str("</c:cat><c:val>");
        write_literal(out, "c:numLit", &values);
        out.push_str("</c:val>");
        if chart.kind == ChartKind::Line {
            out.push_str("<c:smooth val=\"0\"/>");
        }
    }
    out.push_str("</c:ser>");
}

fn write_literal(out: &mut String, tag: &str, values: &[String]) {
    let _ = write!(out, "<{}>", tag);
    if tag == "c:numLit" {
        out.push_str("<c:formatCode>General</c:formatCode>");
    }
    let _ = write!(out, "<c:ptCount val=\"{}\"/>", values.len());
    for (i, value) in values.iter().enumerate() {
        let _ = write!(out, "<c:pt idx=\"{}\"><c:v>{}</c:v></c:pt>", i, escape(value));
    }
    let _ = write!(out, "</{}>", tag);
}

fn has_axes(kind: ChartKind) -> bool {
    !matches!(kind, ChartKind::Pie | ChartKind::Doughnut)
}

fn write_axes(out: &mut String, kind: ChartKind) {
    if !has_axes(kind) {
        return;
    }
    let (cat_pos, val_pos) = if kind == ChartKind::Bar {
        ("l", "b")
    } else {
        ("b", "l")
    };

    if kind == ChartKind::Scatter {
        write_val_axis(out, CAT_AX_ID, VAL_AX_ID, cat_pos, false, "midCat");
    } else {
        let _ = write!(
            out,
            "<c:catAx><c:axId val=\"{}\"/><c:scaling><c:orientation val=\"minMax\"/></c:scaling><c:delete val=\"0\"/><c:axPos val=\"{}\"/><c:numFmt formatCode=\"General\" sourceLinked=\"1\"/><c:majorTickMark val=\"out\"/><c:minorTickMark val=\"none\"/><c:tickLblPos val=\"nextTo\"/><c:crossAx val=\"{}\"/><c:crosses val=\"autoZero\"/><c:auto val=\"1\"/><c:lblAlgn val=\"ctr\"/><c:lblOffset val=\"100\"/><c:noMultiLvlLbl val=\"0\"/></c:catAx>",
            CAT_AX_ID, cat_pos, VAL_AX_ID
        );
    }
    let cross_between = if kind == ChartKind::Scatter {
        "midCat"
    } else {
        "between"
    };
    write_val_axis(out, VAL_AX_ID, CAT_AX_ID, val_pos, true, cross_between);
}

fn write_val_axis(
    out: &mut String,
    id: u32,
    cross: u32,
    pos: &str,
    gridlines: bool,
    cross_between: &str,
) {
    let _ = write!(
        out,
        "<c:valAx><c:axId val=\"{}\"/><c:scaling><c:orientation val=\"minMax\"/></c:scaling><c:delete val=\"0\"/><c:axPos val=\"{}\"/>{}<c:numFmt formatCode=\"General\" sourceLinked=\"1\"/><c:majorTickMark val=\"out\"/><c:minorTickMark val=\"none\"/><c:tickLblPos val=\"nextTo\"/><c:crossAx val=\"{}\"/><c:crosses val=\"autoZero\"/><c:crossBetween val=\"{}\"/></c:valAx>",
        id,
        pos,
        if gridlines { "<c:majorGridlines/>" } else { "" },
        cross,
        cross_between
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: ChartKind) -> ChartData {
        ChartData {
            kind,
            title: Some("Revenue & Cost".into()),
            categories: vec!["Q1".into(), "Q2".into(), "Q3".into()],
            series: vec![
                ChartSeries {
                    name: "Revenue".into(),
                    values: vec![1.5, 2.0, 3.25],
                },
                ChartSeries {
                    name: "Cost".into(),
                    values: vec![1.0, 1.0, -2.0],
                },
            ],
            part: None,
        }
    }

    #[test]
    fn test_written_charts_read_back() {
        for kind in [
            ChartKind::Bar,
            ChartKind::Column,
            ChartKind::Line,
            ChartKind::Pie,
            ChartKind::Doughnut,
            ChartKind::Area,
        ] {
            let chart = sample(kind);
            let xml = write_chart(&chart);
            assert_eq!(read_chart(&xml), Some(chart), "{:?}", kind);
        }
    }

    #[test]
    fn test_scatter_uses_x_values() {
        let mut chart = sample(ChartKind::Scatter);
        chart.categories = vec!["1".into(), "2.5".into(), "4".into()];
        let xml = write_chart(&chart);
        assert!(xml.contains("<c:xVal><c:numLit>"));
        assert_eq!(read_chart(&xml), Some(chart));
    }

    #[test]
    fn test_read_cached_references() {
        let xml = r#"<c:chartSpace xmlns:c="c" xmlns:a="a"><c:chart><c:autoTitleDeleted val="1"/><c:plotArea><c:layout/><c:lineChart><c:grouping val="standard"/>
<c:ser><c:idx val="0"/><c:order val="0"/><c:tx><c:strRef><c:f>Sheet1!$B$1</c:f><c:strCache><c:ptCount val="1"/><c:pt idx="0"><c:v>Sales</c:v></c:pt></c:strCache></c:strRef></c:tx>
<c:cat><c:strRef><c:f>Sheet1!$A$2:$A$4</c:f><c:strCache><c:ptCount val="3"/><c:pt idx="0"><c:v>Jan</c:v></c:pt><c:pt idx="2"><c:v>Mar</c:v></c:pt></c:strCache></c:strRef></c:cat>
<c:val><c:numRef><c:f>Sheet1!$B$2:$B$4</c:f><c:numCache><c:formatCode>General</c:formatCode><c:ptCount val="3"/><c:pt idx="0"><c:v>4.3</c:v></c:pt><c:pt idx="1"><c:v>2.5</c:v></c:pt></c:numCache></c:numRef></c:val></c:ser>
<c:axId val="1"/><c:axId val="2"/></c:lineChart></c:plotArea></c:chart></c:chartSpace>"#;
        let chart = read_chart(xml).unwrap();
        assert_eq!(chart.kind, ChartKind::Line);
        assert_eq!(chart.title, None);
        assert_eq!(chart.categories, vec!["Jan", "", "Mar"]);
        assert_eq!(chart.series[0].name, "Sales");
        assert_eq!(chart.series[0].values, vec![4.3, 2.5, 0.0]);
    }

    #[test]
    fn test_unsupported_charts_stay_opaque() {
        let combo = r#"<c:chartSpace xmlns:c="c"><c:chart><c:plotArea><c:barChart/><c:lineChart/></c:plotArea></c:chart></c:chartSpace>"#;
        assert_eq!(read_chart(combo), None);
        let bubble = r#"<c:chartSpace xmlns:c="c"><c:chart><c:plotArea><c:bubbleChart/></c:plotArea></c:chart></c:chartSpace>"#;
        assert_eq!(read_chart(bubble), None);
    }
}

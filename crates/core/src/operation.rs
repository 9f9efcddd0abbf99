//! Operation arguments accepted by the mutation engine.
//!
//! Operations arrive as JSON objects tagged by `op`, for example
//! `{"op": "add_slide", "after_index": 0}`.

use crate::error::{Error, Result};
use crate::font::Warning;
use crate::types::{Alignment, ChartKind, ChartSeries, Rect, RunStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One mutation of a deck.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    AddSlide {
        #[serde(default)]
        after_index: Option<usize>,
        #[serde(default)]
        layout_hint: Option<String>,
    },
    DeleteSlide {
        slide_index: usize,
    },
    AddElement {
        slide_index: usize,
        element: ElementSpec,
    },
    ModifyElement {
        slide_index: usize,
        element_index: usize,
        patch: ElementPatch,
    },
    DeleteElement {
        slide_index: usize,
        element_index: usize,
    },
    ModifySlide {
        slide_index: usize,
        #[serde(default)]
        background: Option<BackgroundSpec>,
        #[serde(default)]
        layout_hint: Option<String>,
    },
    FillPlaceholders {
        values: BTreeMap<String, String>,
    },
    SetTableCell {
        slide_index: usize,
        element_index: usize,
        row: usize,
        col: usize,
        text: String,
    },
    ResizeTable {
        slide_index: usize,
        element_index: usize,
        rows: usize,
        cols: usize,
    },
    SetChartSeries {
        slide_index: usize,
        element_index: usize,
        series_index: usize,
        #[serde(default)]
        name: Option<String>,
        values: Vec<f64>,
    },
    SetChartData {
        slide_index: usize,
        element_index: usize,
        categories: Vec<String>,
        series: Vec<ChartSeries>,
    },
}

impl Operation {
    /// Parse an operation from JSON.
    ///
    /// An element of unknown kind is reported as `InvalidElement`; any other
    /// shape problem as `InvalidArguments`.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if let Some(element) = value.get("element") {
            ElementSpec::deserialize(element)
                .map_err(|e| Error::InvalidElement(e.to_string()))?;
        }
        Operation::deserialize(value).map_err(|e| Error::InvalidArguments(e.to_string()))
    }

    /// Operation name as it appears in the `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddSlide { .. } => "add_slide",
            Self::DeleteSlide { .. } => "delete_slide",
            Self::AddElement { .. } => "add_element",
            Self::ModifyElement { .. } => "modify_element",
            Self::DeleteElement { .. } => "delete_element",
            Self::ModifySlide { .. } => "modify_slide",
            Self::FillPlaceholders { .. } => "fill_placeholders",
            Self::SetTableCell { .. } => "set_table_cell",
            Self::ResizeTable { .. } => "resize_table",
            Self::SetChartSeries { .. } => "set_chart_series",
            Self::SetChartData { .. } => "set_chart_data",
        }
    }
}

/// A new element: box plus variant payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementSpec {
    #[serde(rename = "box")]
    pub frame: Rect,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub payload: PayloadSpec,
}

/// Variant payload of a new element.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadSpec {
    TextBox {
        text: String,
        #[serde(default)]
        style: StyleSpec,
    },
    BulletList {
        items: Vec<String>,
        #[serde(default)]
        style: StyleSpec,
    },
    Image {
        #[serde(deserialize_with = "base64_bytes::deserialize")]
        data: Vec<u8>,
        #[serde(default)]
        description: String,
    },
    Table {
        cells: Vec<Vec<String>>,
        #[serde(default)]
        style: StyleSpec,
    },
    Chart {
        chart_kind: ChartKind,
        #[serde(default)]
        title: Option<String>,
        categories: Vec<String>,
        series: Vec<ChartSeries>,
    },
}

/// Partial update of an element; unspecified fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementPatch {
    #[serde(default, rename = "box")]
    pub frame: Option<Rect>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub style: Option<StyleSpec>,
    #[serde(default)]
    pub content: Option<ContentPatch>,
}

/// Replacement content; must match the element's variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPatch {
    /// Text for a text box or bullet list, one paragraph per line.
    Text { text: String },
    /// Items for a bullet list or text box, one paragraph each.
    Items { items: Vec<String> },
    Image {
        #[serde(default, deserialize_with = "base64_bytes::deserialize_opt")]
        data: Option<Vec<u8>>,
        #[serde(default)]
        description: Option<String>,
    },
    /// Cell texts; the grid shape must match the table.
    Table { cells: Vec<Vec<String>> },
    /// Chart values; category and series counts must match the chart.
    Chart {
        categories: Vec<String>,
        series: Vec<ChartSeries>,
    },
}

/// Character and paragraph formatting to apply; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StyleSpec {
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub size: Option<f32>,
    #[serde(default)]
    pub bold: Option<bool>,
    #[serde(default)]
    pub italic: Option<bool>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub alignment: Option<Alignment>,
}

impl StyleSpec {
    /// Reject malformed values before anything is touched.
    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.size {
            if !(size > 0.0 && size <= 4000.0) {
                return Err(Error::InvalidElement(format!("font size {} out of range", size)));
            }
        }
        if let Some(color) = &self.color {
            normalize_color(color)?;
        }
        if let Some(family) = &self.font_family {
            if family.trim().is_empty() {
                return Err(Error::InvalidElement("font family is empty".into()));
            }
        }
        Ok(())
    }

    /// Merge the provided fields into a run style.
    pub fn apply_to(&self, style: &mut RunStyle) {
        if let Some(family) = &self.font_family {
            style.font_family = Some(family.trim().to_string());
        }
        if let Some(size) = self.size {
            style.size = Some(size);
        }
        if let Some(bold) = self.bold {
            style.bold = Some(bold);
        }
        if let Some(italic) = self.italic {
            style.italic = Some(italic);
        }
        if let Some(color) = &self.color {
            if let Ok(color) = normalize_color(color) {
                style.color = Some(color);
                style.extras.fill = None;
            }
        }
    }

    /// A fresh run style from this spec.
    pub fn to_run_style(&self) -> RunStyle {
        let mut style = RunStyle::default();
        self.apply_to(&mut style);
        style
    }
}

/// Slide background request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundSpec {
    Inherit,
    Color {
        color: String,
    },
    Image {
        #[serde(deserialize_with = "base64_bytes::deserialize")]
        data: Vec<u8>,
    },
}

/// Accept `#rrggbb` or `RRGGBB`; return uppercase `RRGGBB`.
pub fn normalize_color(color: &str) -> Result<String> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex.to_ascii_uppercase())
    } else {
        Err(Error::InvalidElement(format!("'{}' is not an RGB hex color", color)))
    }
}

/// What an operation produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OperationResult {
    SlideAdded {
        slide_index: usize,
        slide_count: usize,
    },
    SlideDeleted {
        slide_count: usize,
    },
    ElementAdded {
        slide_index: usize,
        element_index: usize,
    },
    ElementModified {
        slide_index: usize,
        element_index: usize,
    },
    ElementDeleted {
        slide_index: usize,
        element_count: usize,
    },
    SlideModified {
        slide_index: usize,
    },
    PlaceholdersFilled {
        filled: usize,
        names: Vec<String>,
    },
    TableCellSet {
        slide_index: usize,
        element_index: usize,
        row: usize,
        col: usize,
    },
    TableResized {
        rows: usize,
        cols: usize,
    },
    ChartSeriesSet {
        series_index: usize,
    },
    ChartDataSet {
        categories: usize,
        series: usize,
    },
}

/// A committed operation and the warnings it raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applied {
    pub result: OperationResult,
    pub warnings: Vec<Warning>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }

    pub fn deserialize_opt<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_add_slide() {
        let op = Operation::from_json(json!({"op": "add_slide"})).unwrap();
        assert!(matches!(
            op,
            Operation::AddSlide {
                after_index: None,
                layout_hint: None
            }
        ));
    }

    #[test]
    fn test_parse_add_text_box() {
        let op = Operation::from_json(json!({
            "op": "add_element",
            "slide_index": 0,
            "element": {
                "kind": "text_box",
                "box": {"x": 0, "y": 0, "width": 100, "height": 50},
                "text": "Hello",
                "style": {"bold": true, "color": "#ff0000"}
            }
        }))
        .unwrap();
        match op {
            Operation::AddElement { element, .. } => {
                assert_eq!(element.frame, Rect::new(0, 0, 100, 50));
                match element.payload {
                    PayloadSpec::TextBox { text, style } => {
                        assert_eq!(text, "Hello");
                        assert_eq!(style.bold, Some(true));
                    }
                    other => panic!("unexpected payload {:?}", other),
                }
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_unknown_element_kind_is_invalid_element() {
        let err = Operation::from_json(json!({
            "op": "add_element",
            "slide_index": 0,
            "element": {"kind": "hologram", "box": {"x": 0, "y": 0, "width": 1, "height": 1}}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidElement(_)));
    }

    #[test]
    fn test_unknown_op_is_invalid_arguments() {
        let err = Operation::from_json(json!({"op": "explode"})).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn test_image_payload_decodes_base64() {
        let op = Operation::from_json(json!({
            "op": "add_element",
            "slide_index": 0,
            "element": {
                "kind": "image",
                "box": {"x": 0, "y": 0, "width": 10, "height": 10},
                "data": "iVBORw=="
            }
        }))
        .unwrap();
        match op {
            Operation::AddElement {
                element: ElementSpec {
                    payload: PayloadSpec::Image { data, .. },
                    ..
                },
                ..
            } => assert_eq!(data, vec![0x89, b'P', b'N', b'G']),
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_normalize_color() {
        assert_eq!(normalize_color("#a1b2c3").unwrap(), "A1B2C3");
        assert_eq!(normalize_color("FFFFFF").unwrap(), "FFFFFF");
        assert!(normalize_color("red").is_err());
        assert!(normalize_color("#12345").is_err());
    }

    #[test]
    fn test_style_spec_apply_clears_raw_fill_on_color() {
        let mut style = RunStyle::default();
        style.extras.fill = Some("<a:solidFill><a:schemeClr val=\"tx1\"/></a:solidFill>".into());
        StyleSpec {
            color: Some("00ff00".into()),
            ..StyleSpec::default()
        }
        .apply_to(&mut style);
        assert_eq!(style.color.as_deref(), Some("00FF00"));
        assert!(style.extras.fill.is_none());
    }
}

//! Domain types for the in-memory deck model.

use crate::error::{Error, Result};
use crate::font::FontDescriptor;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

/// English Metric Units per inch.
pub const EMU_PER_INCH: i64 = 914_400;

/// English Metric Units per typographic point.
pub const EMU_PER_POINT: i64 = 12_700;

/// Default slide width (16:9, 13.333in).
pub const DEFAULT_SLIDE_WIDTH: i64 = 12_192_000;

/// Default slide height (16:9, 7.5in).
pub const DEFAULT_SLIDE_HEIGHT: i64 = 6_858_000;

/// Deck default font family when the theme does not name one.
pub const DEFAULT_FONT_FAMILY: &str = "Calibri";

/// Deck default font size in points.
pub const DEFAULT_FONT_SIZE: f32 = 18.0;

static SHAPE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<(?:\w+:)?cNvPr\b[^>]*?\bid="(\d+)""#).unwrap());

/// An entire presentation held in memory for the duration of one call.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    /// Slides in presentation order.
    pub slides: Vec<Slide>,

    /// Theme colors and fonts shared by every slide.
    pub styles: StyleRegistry,

    /// Slide dimensions in EMU.
    pub slide_size: SlideSize,

    /// Slide layouts available in the package, in master order.
    pub layouts: Vec<LayoutInfo>,

    /// Media parts keyed by part name (e.g. `ppt/media/image1.png`).
    pub media: BTreeMap<String, MediaPart>,

    /// Package state the codec needs to write untouched parts back.
    pub source: PackageSource,
}

impl Deck {
    /// Create an empty deck with no slides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slides.
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Element count for every slide, in slide order.
    pub fn element_counts(&self) -> Vec<usize> {
        self.slides.iter().map(|s| s.elements.len()).collect()
    }

    /// Get a slide by 0-based index.
    pub fn slide(&self, index: usize) -> Result<&Slide> {
        let len = self.slides.len();
        self.slides
            .get(index)
            .ok_or_else(|| Error::slide_out_of_bounds(index, len))
    }

    /// Get a mutable slide by 0-based index.
    pub fn slide_mut(&mut self, index: usize) -> Result<&mut Slide> {
        let len = self.slides.len();
        self.slides
            .get_mut(index)
            .ok_or_else(|| Error::slide_out_of_bounds(index, len))
    }

    /// Store image bytes as a new media part and return its part name.
    pub fn add_media(&mut self, data: Vec<u8>) -> Result<String> {
        let format = ImageFormat::from_magic(&data).ok_or_else(|| {
            Error::InvalidElement("image data is not a recognized PNG, JPEG, GIF or BMP".into())
        })?;

        let mut n = self.media.len() + 1;
        let name = loop {
            let candidate = format!("ppt/media/image{}.{}", n, format.extension());
            if !self.media.contains_key(&candidate) && !self.source.has_part(&candidate) {
                break candidate;
            }
            n += 1;
        };

        self.media.insert(
            name.clone(),
            MediaPart {
                content_type: format.content_type().to_string(),
                data: Arc::from(data),
            },
        );
        Ok(name)
    }

    /// Verify every media reference resolves to a media part.
    pub fn check_references(&self) -> Result<()> {
        for (slide_index, slide) in self.slides.iter().enumerate() {
            if let Background::Image { media } = &slide.background {
                if !self.media.contains_key(media) {
                    return Err(Error::DanglingReference(format!(
                        "slide {} background references missing media part '{}'",
                        slide_index, media
                    )));
                }
            }
            for (element_index, element) in slide.elements.iter().enumerate() {
                if let ElementKind::Image(image) = &element.kind {
                    if !self.media.contains_key(&image.media) {
                        return Err(Error::DanglingReference(format!(
                            "slide {} element {} references missing media part '{}'",
                            slide_index, element_index, image.media
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Find a layout whose name contains the hint (case-insensitive).
    pub fn find_layout(&self, hint: &str) -> Option<&LayoutInfo> {
        let hint = hint.to_lowercase();
        self.layouts
            .iter()
            .find(|l| l.name.to_lowercase() == hint)
            .or_else(|| {
                self.layouts
                    .iter()
                    .find(|l| l.name.to_lowercase().contains(&hint))
            })
    }
}

/// Theme colors and fonts shared across all slides of a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRegistry {
    /// Theme color scheme, e.g. `accent1 -> 4472C4`.
    pub theme_colors: BTreeMap<String, String>,

    /// Theme heading font.
    pub major_font: Option<String>,

    /// Theme body font.
    pub minor_font: Option<String>,

    /// Family used for runs that do not name one.
    pub default_font: String,

    /// Size in points used for runs that do not name one.
    pub default_size: f32,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self {
            theme_colors: BTreeMap::new(),
            major_font: None,
            minor_font: None,
            default_font: DEFAULT_FONT_FAMILY.to_string(),
            default_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// Slide dimensions in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSize {
    pub width: i64,
    pub height: i64,
}

impl Default for SlideSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_SLIDE_WIDTH,
            height: DEFAULT_SLIDE_HEIGHT,
        }
    }
}

/// A slide layout available to new slides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    /// Part name, e.g. `ppt/slideLayouts/slideLayout1.xml`.
    pub part_name: String,

    /// Display name from `<p:cSld name="...">`.
    pub name: String,
}

/// Binary media owned by the package.
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub content_type: String,
    pub data: Arc<[u8]>,
}

/// Image formats accepted for new media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF8") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"BM") {
            Some(Self::Bmp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }
}

/// Parts of the source package that are not lifted into the model.
///
/// Maintained by the package codec; the engine only reads it to avoid
/// part-name collisions.
#[derive(Debug, Clone, Default)]
pub struct PackageSource {
    /// Every part not represented by slides or media, in archive order.
    pub parts: Vec<RawPart>,

    /// Name of the main presentation part.
    pub presentation_part: String,

    /// Chart data as decoded, keyed by chart part name.
    pub chart_data: BTreeMap<String, ChartData>,
}

impl PackageSource {
    /// Look up a raw part by name.
    pub fn part(&self, name: &str) -> Option<&RawPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// Whether a raw part exists.
    pub fn has_part(&self, name: &str) -> bool {
        self.part(name).is_some()
    }
}

/// A package part carried through opaquely.
#[derive(Debug, Clone)]
pub struct RawPart {
    pub name: String,
    pub data: Arc<[u8]>,
}

/// One entry of an OPC relationships part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// A single slide.
#[derive(Debug, Clone, Default)]
pub struct Slide {
    /// Elements in z-order (first is bottom-most).
    pub elements: Vec<Element>,

    /// Slide background.
    pub background: Background,

    /// Display name of the slide layout this slide uses.
    pub layout_hint: Option<String>,

    /// Shape-tree children the engine does not model, kept as raw XML.
    pub preserved: Vec<PreservedShape>,

    /// Where this slide came from in the source package, if anywhere.
    pub origin: Option<SlideOrigin>,
}

impl PartialEq for Slide {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
            && self.background == other.background
            && self.layout_hint == other.layout_hint
            && self.preserved == other.preserved
    }
}

impl Slide {
    /// Create a blank slide using the named layout.
    pub fn blank(layout_hint: Option<String>) -> Self {
        Self {
            layout_hint,
            ..Self::default()
        }
    }

    /// Get an element by 0-based index.
    pub fn element(&self, index: usize) -> Result<&Element> {
        let len = self.elements.len();
        self.elements
            .get(index)
            .ok_or_else(|| Error::element_out_of_bounds(index, len))
    }

    /// Get a mutable element by 0-based index.
    pub fn element_mut(&mut self, index: usize) -> Result<&mut Element> {
        let len = self.elements.len();
        self.elements
            .get_mut(index)
            .ok_or_else(|| Error::element_out_of_bounds(index, len))
    }

    /// True when the slide still equals what was decoded from its source part.
    pub fn is_pristine(&self) -> bool {
        self.origin
            .as_ref()
            .is_some_and(|origin| *origin.snapshot == *self)
    }

    /// Remove an element, keeping preserved shapes at their place in the
    /// stacking order.
    pub fn remove_element(&mut self, index: usize) -> Result<Element> {
        self.element(index)?;
        for shape in &mut self.preserved {
            if shape.anchor > index {
                shape.anchor -= 1;
            }
        }
        Ok(self.elements.remove(index))
    }

    /// Next free shape id, counting preserved raw shapes too.
    pub fn next_shape_id(&self) -> u32 {
        let modeled = self.elements.iter().map(|e| e.id).max().unwrap_or(1);
        let preserved = self
            .preserved
            .iter()
            .flat_map(|shape| SHAPE_ID_REGEX.captures_iter(&shape.xml))
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(1);
        modeled.max(preserved) + 1
    }
}

/// A shape-tree child the engine does not model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedShape {
    /// Number of modeled elements below it in the shape tree.
    pub anchor: usize,
    pub xml: String,
}

/// Source-package details of a decoded slide.
#[derive(Debug, Clone)]
pub struct SlideOrigin {
    /// Part name, e.g. `ppt/slides/slide3.xml`.
    pub part_name: String,

    /// `<p:sldId id>` value.
    pub slide_id: u32,

    /// Original slide XML bytes.
    pub xml: Arc<[u8]>,

    /// Original relationships part bytes.
    pub rels_xml: Option<Arc<[u8]>>,

    /// Parsed relationships of the slide part.
    pub relationships: Vec<Relationship>,

    /// Raw XML around the shape tree, reused when the slide is regenerated.
    pub shell: SlideShell,

    /// The slide as decoded, for change detection.
    pub snapshot: Box<Slide>,
}

/// Raw XML fragments surrounding a slide's shape tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlideShell {
    /// Root start tag with its namespace declarations.
    pub root_open: String,

    /// `<p:cSld ...>` start tag.
    pub csld_open: String,

    /// `p:nvGrpSpPr` and `p:grpSpPr` of the shape tree.
    pub tree_head: String,

    /// `p:cSld` children after the shape tree.
    pub csld_tail: String,

    /// Everything after `</p:cSld>` up to the root end tag.
    pub tail: String,
}

/// Slide background fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Background {
    /// No slide-level background; the layout/master applies.
    #[default]
    Inherit,

    /// Solid RGB fill (`RRGGBB`).
    Color { color: String },

    /// Stretched picture fill referencing a media part.
    Image { media: String },

    /// A background the engine does not model, kept as raw `<p:bg>` XML.
    Preserved { xml: String },
}

/// Position and size in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Positive width and height.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// One visual object on a slide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    /// Shape id (`cNvPr id`), unique within the slide.
    pub id: u32,

    /// Shape display name.
    pub name: String,

    /// Bounding box; `None` when inherited from the layout placeholder.
    pub frame: Option<Rect>,

    /// Layout placeholder this shape is bound to.
    pub placeholder: Option<LayoutSlot>,

    /// Variant-specific payload.
    pub kind: ElementKind,

    /// Raw XML the model does not interpret.
    #[serde(skip)]
    pub extras: ShapeExtras,
}

/// Closed set of element variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementKind {
    TextBox(TextBody),
    BulletList(TextBody),
    Image(ImageData),
    Table(TableData),
    Chart(ChartData),
}

impl ElementKind {
    /// Short label used in summaries and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TextBox(_) => "text_box",
            Self::BulletList(_) => "bullet_list",
            Self::Image(_) => "image",
            Self::Table(_) => "table",
            Self::Chart(_) => "chart",
        }
    }
}

/// `<p:ph>` binding of a shape to a layout placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LayoutSlot {
    /// Raw `<p:ph>` attributes in document order.
    pub attrs: Vec<(String, String)>,
}

impl LayoutSlot {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Placeholder type; OOXML defaults a missing type to `obj`.
    pub fn slot_type(&self) -> &str {
        self.attr("type").unwrap_or("obj")
    }

    /// Placeholder index, if any.
    pub fn idx(&self) -> Option<u32> {
        self.attr("idx").and_then(|v| v.parse().ok())
    }

    /// Name reported by the scanner, e.g. `title` or `body:1`.
    pub fn display_name(&self) -> String {
        match self.idx() {
            Some(idx) => format!("{}:{}", self.slot_type(), idx),
            None => self.slot_type().to_string(),
        }
    }

    /// Whether this slot holds a title.
    pub fn is_title(&self) -> bool {
        matches!(self.slot_type(), "title" | "ctrTitle")
    }

    /// Whether this slot holds bulleted body content by default.
    pub fn is_body(&self) -> bool {
        matches!(self.slot_type(), "body" | "obj")
    }
}

/// Raw shape XML kept so regenerated slides keep what the model ignores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeExtras {
    /// `p:cNvSpPr` / `p:cNvPicPr` / `p:cNvGraphicFramePr` element.
    pub non_visual: Option<String>,

    /// `p:cNvPr` attributes other than `id`, `name` and `descr` (`hidden`,
    /// `title`), raw.
    pub c_nv_pr_attrs: String,

    /// `p:cNvPr` children (`a:hlinkClick`, `a:hlinkHover`, `a:extLst`).
    pub c_nv_pr_children: String,

    /// `p:nvPr` attributes, raw.
    pub nv_pr_attrs: String,

    /// `p:nvPr` children after the placeholder (media, custom data).
    pub nv_pr_children: String,

    /// `a:blip` attributes other than `r:embed`, raw.
    pub blip_attrs: String,

    /// `a:blip` children (alpha, duotone, extensions).
    pub blip_children: String,

    /// Extra attributes of the transform (rotation, flips), raw.
    pub xfrm_attrs: String,

    /// `p:spPr` children other than the transform.
    pub shape_props: Option<String>,

    /// `p:style` element.
    pub style: Option<String>,

    /// `a:bodyPr` element.
    pub body_props: Option<String>,

    /// `a:lstStyle` element.
    pub list_style: Option<String>,

    /// `p:blipFill` children after `a:blip` (crop, stretch).
    pub blip_tail: Option<String>,
}

/// Paragraphs of a text box, bullet list or table cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextBody {
    pub paragraphs: Vec<Paragraph>,
}

impl TextBody {
    /// Build a body with one paragraph per line, each a single run.
    pub fn from_lines<S: AsRef<str>>(lines: &[S], style: &RunStyle) -> Self {
        Self {
            paragraphs: lines
                .iter()
                .map(|line| Paragraph::plain(line.as_ref(), style.clone()))
                .collect(),
        }
    }

    /// Paragraph texts joined by newlines.
    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every run in document order.
    pub fn runs_mut(&mut self) -> impl Iterator<Item = &mut TextRun> {
        self.paragraphs.iter_mut().flat_map(|p| p.runs.iter_mut())
    }
}

/// A paragraph: an ordered sequence of runs plus paragraph properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Paragraph {
    pub runs: Vec<TextRun>,
    pub alignment: Option<Alignment>,
    pub level: u8,
    pub bullet: Option<Bullet>,
    #[serde(skip)]
    pub extras: ParagraphExtras,
}

impl Paragraph {
    /// A paragraph holding one text run.
    pub fn plain(text: &str, style: RunStyle) -> Self {
        Self {
            runs: vec![TextRun::new(text, style)],
            ..Self::default()
        }
    }

    /// Concatenated run text; breaks contribute a newline.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Raw paragraph-property XML the model does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphExtras {
    /// `a:pPr` attributes other than `algn` and `lvl`.
    pub attrs: Vec<(String, String)>,

    /// Children that precede the bullet (spacing, bullet color/size/font).
    pub pre_bullet: String,

    /// Children that follow the bullet (tabs, default run props).
    pub post_bullet: String,

    /// `a:endParaRPr` element.
    pub end_props: Option<String>,

    /// Paragraph children that are not runs, each with the number of runs
    /// before it.
    pub inline: Vec<(usize, String)>,
}

/// Horizontal paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn from_xml(value: &str) -> Option<Self> {
        match value {
            "l" => Some(Self::Left),
            "ctr" => Some(Self::Center),
            "r" => Some(Self::Right),
            "just" => Some(Self::Justify),
            _ => None,
        }
    }

    pub fn to_xml(self) -> &'static str {
        match self {
            Self::Left => "l",
            Self::Center => "ctr",
            Self::Right => "r",
            Self::Justify => "just",
        }
    }
}

/// Explicit paragraph bullet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bullet {
    /// `a:buChar`
    Char(String),
    /// `a:buAutoNum` with its numbering scheme.
    Number(String),
    /// `a:buNone`
    Off,
}

/// A styled run of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub text: String,
    pub style: RunStyle,
    pub kind: RunKind,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
            kind: RunKind::Text,
        }
    }
}

/// What a run stands for in the XML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// `a:r`
    Text,
    /// `a:br`; its text is `"\n"`.
    Break,
    /// `a:fld` (slide number, date, ...).
    Field {
        field_id: String,
        field_type: Option<String>,
    },
}

/// Character formatting of a run. `None` means inherited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    pub font_family: Option<String>,
    /// Size in points.
    pub size: Option<f32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    /// RGB hex (`RRGGBB`).
    pub color: Option<String>,
    #[serde(skip)]
    pub extras: StyleExtras,
}

impl RunStyle {
    /// Numeric weight: 700 when bold, else 400.
    pub fn weight(&self) -> u16 {
        if self.bold.unwrap_or(false) {
            700
        } else {
            400
        }
    }

    /// Font request for this run, falling back to the deck default family.
    pub fn descriptor(&self, default_family: &str) -> FontDescriptor {
        FontDescriptor::new(
            self.font_family.as_deref().unwrap_or(default_family),
            self.weight(),
            self.italic.unwrap_or(false),
        )
    }
}

/// Raw run-property XML the model does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleExtras {
    /// `a:rPr` attributes other than `sz`, `b` and `i`.
    pub attrs: Vec<(String, String)>,

    /// `a:ln` element.
    pub line: Option<String>,

    /// A fill other than a plain RGB solid fill (scheme color, gradient).
    pub fill: Option<String>,

    /// `a:latin` element as read; theme font references live only here.
    pub latin: Option<String>,

    /// Effect, highlight and underline children.
    pub effects: String,

    /// `a:ea`, `a:cs`, `a:sym`, hyperlinks and extensions.
    pub trailing: String,
}

/// Image payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageData {
    /// Media part name.
    pub media: String,

    /// Alternative text.
    pub description: String,
}

/// Table payload: a row-major grid of text cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableData {
    /// Column widths in EMU.
    pub columns: Vec<i64>,
    pub rows: Vec<TableRow>,
    /// `a:tblPr` element.
    #[serde(skip)]
    pub props: Option<String>,
}

impl TableData {
    /// Build a table with evenly sized rows and columns from cell texts.
    pub fn from_cells(cells: &[Vec<String>], frame: &Rect, style: &RunStyle) -> Self {
        let row_count = cells.len().max(1) as i64;
        let col_count = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let col_width = frame.width / col_count as i64;
        let row_height = frame.height / row_count;

        Self {
            columns: vec![col_width; col_count],
            rows: cells
                .iter()
                .map(|row| TableRow {
                    height: row_height,
                    cells: (0..col_count)
                        .map(|c| {
                            let text = row.get(c).map(String::as_str).unwrap_or("");
                            TableCell::with_text(text, style)
                        })
                        .collect(),
                })
                .collect(),
            props: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get a mutable cell, bounds-checked against the existing grid.
    pub fn cell_mut(&mut self, row: usize, col: usize) -> Result<&mut TableCell> {
        let rows = self.rows.len();
        let cols = self.columns.len();
        let r = self.rows.get_mut(row).ok_or(Error::IndexOutOfBounds {
            what: "row",
            index: row,
            len: rows,
        })?;
        let len = r.cells.len().min(cols);
        if col >= len {
            return Err(Error::IndexOutOfBounds {
                what: "column",
                index: col,
                len,
            });
        }
        Ok(&mut r.cells[col])
    }
}

/// One table row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableRow {
    /// Row height in EMU.
    pub height: i64,
    pub cells: Vec<TableCell>,
}

/// One table cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableCell {
    pub body: TextBody,
    /// `a:tc` attributes (spans, merges).
    #[serde(skip)]
    pub attrs: Vec<(String, String)>,
    /// `a:tcPr` element.
    #[serde(skip)]
    pub props: Option<String>,
}

impl TableCell {
    pub fn with_text(text: &str, style: &RunStyle) -> Self {
        Self {
            body: TextBody {
                paragraphs: vec![Paragraph::plain(text, style.clone())],
            },
            ..Self::default()
        }
    }
}

/// Chart payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub kind: ChartKind,
    pub title: Option<String>,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
    /// Chart part name; `None` until first encoded.
    pub part: Option<String>,
}

/// Supported chart kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Column,
    Line,
    Pie,
    Doughnut,
    Area,
    Scatter,
}

/// A named series of values, one per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_element(id: u32) -> Element {
        Element {
            id,
            name: format!("TextBox {}", id),
            frame: Some(Rect::new(0, 0, 100, 100)),
            placeholder: None,
            kind: ElementKind::TextBox(TextBody::from_lines(&["hi"], &RunStyle::default())),
            extras: ShapeExtras::default(),
        }
    }

    #[test]
    fn test_image_format_from_magic() {
        assert_eq!(
            ImageFormat::from_magic(&[0x89, b'P', b'N', b'G', 0x0D]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_magic(b"GIF89a"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_magic(b"nope"), None);
    }

    #[test]
    fn test_add_media_picks_free_name() {
        let mut deck = Deck::new();
        let png = vec![0x89, b'P', b'N', b'G', 0, 0];
        let first = deck.add_media(png.clone()).unwrap();
        let second = deck.add_media(png).unwrap();
        assert_eq!(first, "ppt/media/image1.png");
        assert_eq!(second, "ppt/media/image2.png");
        assert!(deck.add_media(b"text".to_vec()).is_err());
    }

    #[test]
    fn test_check_references_reports_dangling_media() {
        let mut deck = Deck::new();
        let mut slide = Slide::default();
        slide.elements.push(Element {
            kind: ElementKind::Image(ImageData {
                media: "ppt/media/missing.png".into(),
                description: String::new(),
            }),
            ..text_element(2)
        });
        deck.slides.push(slide);
        assert!(matches!(
            deck.check_references(),
            Err(Error::DanglingReference(_))
        ));
    }

    #[test]
    fn test_next_shape_id_counts_preserved_xml() {
        let mut slide = Slide::default();
        slide.elements.push(text_element(4));
        assert_eq!(slide.next_shape_id(), 5);
        slide.preserved.push(PreservedShape {
            anchor: 1,
            xml: r#"<p:grpSp><p:nvGrpSpPr><p:cNvPr id="9" name="Group"/></p:nvGrpSpPr></p:grpSp>"#.into(),
        });
        assert_eq!(slide.next_shape_id(), 10);
    }

    #[test]
    fn test_remove_element_keeps_preserved_stacking() {
        let mut slide = Slide::default();
        for id in [2, 3, 4] {
            slide.elements.push(text_element(id));
        }
        for anchor in [0, 1, 3] {
            slide.preserved.push(PreservedShape {
                anchor,
                xml: String::new(),
            });
        }

        let removed = slide.remove_element(0).unwrap();
        assert_eq!(removed.id, 2);
        let anchors: Vec<usize> = slide.preserved.iter().map(|p| p.anchor).collect();
        assert_eq!(anchors, [0, 0, 2]);
        assert!(matches!(
            slide.remove_element(5),
            Err(Error::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_slide_equality_ignores_origin() {
        let mut slide = Slide::default();
        slide.elements.push(text_element(2));
        let mut other = slide.clone();
        other.origin = Some(SlideOrigin {
            part_name: "ppt/slides/slide1.xml".into(),
            slide_id: 256,
            xml: Arc::from(Vec::new()),
            rels_xml: None,
            relationships: Vec::new(),
            shell: SlideShell::default(),
            snapshot: Box::new(slide.clone()),
        });
        assert_eq!(slide, other);
        assert!(other.is_pristine());
        other.elements.clear();
        assert!(!other.is_pristine());
    }

    #[test]
    fn test_layout_slot_names() {
        let slot = LayoutSlot {
            attrs: vec![("type".into(), "title".into())],
        };
        assert_eq!(slot.display_name(), "title");
        assert!(slot.is_title());

        let slot = LayoutSlot {
            attrs: vec![("idx".into(), "1".into())],
        };
        assert_eq!(slot.display_name(), "obj:1");
        assert!(slot.is_body());
    }

    #[test]
    fn test_find_layout() {
        let mut deck = Deck::new();
        deck.layouts = vec![
            LayoutInfo {
                part_name: "ppt/slideLayouts/slideLayout1.xml".into(),
                name: "Title Slide".into(),
            },
            LayoutInfo {
                part_name: "ppt/slideLayouts/slideLayout2.xml".into(),
                name: "Blank".into(),
            },
        ];
        assert_eq!(
            deck.find_layout("blank").map(|l| l.part_name.as_str()),
            Some("ppt/slideLayouts/slideLayout2.xml")
        );
        assert_eq!(
            deck.find_layout("title").map(|l| l.name.as_str()),
            Some("Title Slide")
        );
        assert!(deck.find_layout("missing").is_none());
    }
}

//! Element mutation engine.
//!
//! Every operation is applied to a staged copy of the deck and committed
//! only when it succeeds, so a failed operation never leaves a partial
//! change behind.

use crate::error::{Error, Result};
use crate::font::{FontResolve, Warning};
use crate::operation::{
    normalize_color, Applied, BackgroundSpec, ContentPatch, ElementPatch, ElementSpec,
    Operation, OperationResult, PayloadSpec, StyleSpec,
};
use crate::placeholder::fill_paragraph;
use crate::types::{
    Background, Bullet, ChartData, ChartSeries, Deck, Element, ElementKind, ImageData, Paragraph,
    RunKind, RunStyle, ShapeExtras, Slide, TableCell, TableData, TableRow, TextBody, TextRun,
};
use std::collections::{BTreeMap, BTreeSet};

/// Bullet character for engine-created lists.
const DEFAULT_BULLET: &str = "\u{2022}";

/// Applies operations to decks, resolving fonts for the runs it styles.
pub struct Engine<'a> {
    fonts: &'a dyn FontResolve,
}

impl<'a> Engine<'a> {
    /// Create an engine backed by the given font resolver.
    pub fn new(fonts: &'a dyn FontResolve) -> Self {
        Self { fonts }
    }

    /// Apply one operation atomically.
    pub fn apply(&self, deck: &mut Deck, op: Operation) -> Result<Applied> {
        let name = op.name();
        let mut staged = deck.clone();
        let mut warnings = Vec::new();

        let result = self.apply_staged(&mut staged, op, &mut warnings).map_err(|e| {
            log::debug!("{} rejected: {}", name, e);
            e
        })?;

        *deck = staged;
        log::debug!("{} committed: {:?}", name, result);
        Ok(Applied { result, warnings })
    }

    /// Insert a blank slide after `after_index`, or append.
    pub fn add_slide(&self, deck: &mut Deck, after_index: Option<usize>) -> Result<usize> {
        match self
            .apply(
                deck,
                Operation::AddSlide {
                    after_index,
                    layout_hint: None,
                },
            )?
            .result
        {
            OperationResult::SlideAdded { slide_index, .. } => Ok(slide_index),
            other => Err(Error::InvalidArguments(format!(
                "add_slide produced {:?}",
                other
            ))),
        }
    }

    /// Append an element to a slide and return its index.
    pub fn add_element(
        &self,
        deck: &mut Deck,
        slide_index: usize,
        element: ElementSpec,
    ) -> Result<usize> {
        match self
            .apply(
                deck,
                Operation::AddElement {
                    slide_index,
                    element,
                },
            )?
            .result
        {
            OperationResult::ElementAdded { element_index, .. } => Ok(element_index),
            other => Err(Error::InvalidArguments(format!(
                "add_element produced {:?}",
                other
            ))),
        }
    }

    /// Merge a partial update into an element.
    pub fn modify_element(
        &self,
        deck: &mut Deck,
        slide_index: usize,
        element_index: usize,
        patch: ElementPatch,
    ) -> Result<Applied> {
        self.apply(
            deck,
            Operation::ModifyElement {
                slide_index,
                element_index,
                patch,
            },
        )
    }

    /// Remove an element; later elements shift down by one.
    pub fn delete_element(
        &self,
        deck: &mut Deck,
        slide_index: usize,
        element_index: usize,
    ) -> Result<Applied> {
        self.apply(
            deck,
            Operation::DeleteElement {
                slide_index,
                element_index,
            },
        )
    }

    /// Replace mapped `{{name}}` tokens everywhere in the deck.
    pub fn fill_placeholders(
        &self,
        deck: &mut Deck,
        values: BTreeMap<String, String>,
    ) -> Result<Applied> {
        self.apply(deck, Operation::FillPlaceholders { values })
    }

    fn apply_staged(
        &self,
        deck: &mut Deck,
        op: Operation,
        warnings: &mut Vec<Warning>,
    ) -> Result<OperationResult> {
        match op {
            Operation::AddSlide {
                after_index,
                layout_hint,
            } => {
                check_layout(deck, layout_hint.as_deref())?;
                let slide_index = match after_index {
                    Some(after) => {
                        deck.slide(after)?;
                        after + 1
                    }
                    None => deck.slides.len(),
                };
                deck.slides.insert(slide_index, Slide::blank(layout_hint));
                Ok(OperationResult::SlideAdded {
                    slide_index,
                    slide_count: deck.slides.len(),
                })
            }
            Operation::DeleteSlide { slide_index } => {
                deck.slide(slide_index)?;
                deck.slides.remove(slide_index);
                Ok(OperationResult::SlideDeleted {
                    slide_count: deck.slides.len(),
                })
            }
            Operation::AddElement {
                slide_index,
                element,
            } => {
                deck.slide(slide_index)?;
                let element = self.build_element(deck, slide_index, element, warnings)?;
                let slide = deck.slide_mut(slide_index)?;
                slide.elements.push(element);
                Ok(OperationResult::ElementAdded {
                    slide_index,
                    element_index: slide.elements.len() - 1,
                })
            }
            Operation::ModifyElement {
                slide_index,
                element_index,
                patch,
            } => {
                self.modify(deck, slide_index, element_index, patch, warnings)?;
                Ok(OperationResult::ElementModified {
                    slide_index,
                    element_index,
                })
            }
            Operation::DeleteElement {
                slide_index,
                element_index,
            } => {
                let slide = deck.slide_mut(slide_index)?;
                slide.remove_element(element_index)?;
                Ok(OperationResult::ElementDeleted {
                    slide_index,
                    element_count: slide.elements.len(),
                })
            }
            Operation::ModifySlide {
                slide_index,
                background,
                layout_hint,
            } => {
                deck.slide(slide_index)?;
                check_layout(deck, layout_hint.as_deref())?;
                let background = match background {
                    Some(spec) => Some(build_background(deck, spec)?),
                    None => None,
                };
                let slide = deck.slide_mut(slide_index)?;
                if let Some(background) = background {
                    slide.background = background;
                }
                if layout_hint.is_some() {
                    slide.layout_hint = layout_hint;
                }
                Ok(OperationResult::SlideModified { slide_index })
            }
            Operation::FillPlaceholders { values } => self.fill(deck, &values, warnings),
            Operation::SetTableCell {
                slide_index,
                element_index,
                row,
                col,
                text,
            } => {
                let default_family = deck.styles.default_font.clone();
                let table = table_mut(deck, slide_index, element_index)?;
                let cell = table.cell_mut(row, col)?;
                replace_text(&mut cell.body, &split_lines(&text), false);
                self.resolve_body(&cell.body, &default_family, warnings);
                Ok(OperationResult::TableCellSet {
                    slide_index,
                    element_index,
                    row,
                    col,
                })
            }
            Operation::ResizeTable {
                slide_index,
                element_index,
                rows,
                cols,
            } => {
                if rows == 0 || cols == 0 {
                    return Err(Error::InvalidElement(format!(
                        "table must keep at least one row and column (got {}x{})",
                        rows, cols
                    )));
                }
                let style = default_run_style(deck, &StyleSpec::default());
                let table = table_mut(deck, slide_index, element_index)?;
                resize_table(table, rows, cols, &style);
                Ok(OperationResult::TableResized { rows, cols })
            }
            Operation::SetChartSeries {
                slide_index,
                element_index,
                series_index,
                name,
                values,
            } => {
                let chart = chart_mut(deck, slide_index, element_index)?;
                let len = chart.series.len();
                let category_count = chart.categories.len();
                let series = chart.series.get_mut(series_index).ok_or(Error::IndexOutOfBounds {
                    what: "series",
                    index: series_index,
                    len,
                })?;
                if values.len() > category_count {
                    return Err(Error::IndexOutOfBounds {
                        what: "category",
                        index: values.len() - 1,
                        len: category_count,
                    });
                }
                if values.len() < category_count {
                    return Err(Error::InvalidElement(format!(
                        "series needs {} values, got {}",
                        category_count,
                        values.len()
                    )));
                }
                series.values = values;
                if let Some(name) = name {
                    series.name = name;
                }
                Ok(OperationResult::ChartSeriesSet { series_index })
            }
            Operation::SetChartData {
                slide_index,
                element_index,
                categories,
                series,
            } => {
                validate_chart(&categories, &series)?;
                let chart = chart_mut(deck, slide_index, element_index)?;
                let result = OperationResult::ChartDataSet {
                    categories: categories.len(),
                    series: series.len(),
                };
                chart.categories = categories;
                chart.series = series;
                Ok(result)
            }
        }
    }

    fn build_element(
        &self,
        deck: &mut Deck,
        slide_index: usize,
        spec: ElementSpec,
        warnings: &mut Vec<Warning>,
    ) -> Result<Element> {
        if !spec.frame.has_area() {
            return Err(Error::InvalidElement(format!(
                "box {}x{} has no area",
                spec.frame.width, spec.frame.height
            )));
        }

        let kind = match spec.payload {
            PayloadSpec::TextBox { text, style } => {
                style.validate()?;
                let run_style = default_run_style(deck, &style);
                let mut body = TextBody::from_lines(&split_lines(&text), &run_style);
                set_alignment(&mut body, &style);
                ElementKind::TextBox(body)
            }
            PayloadSpec::BulletList { items, style } => {
                style.validate()?;
                let run_style = default_run_style(deck, &style);
                let mut body = TextBody::from_lines(&items, &run_style);
                for paragraph in &mut body.paragraphs {
                    paragraph.bullet = Some(Bullet::Char(DEFAULT_BULLET.to_string()));
                }
                set_alignment(&mut body, &style);
                ElementKind::BulletList(body)
            }
            PayloadSpec::Image { data, description } => ElementKind::Image(ImageData {
                media: deck.add_media(data)?,
                description,
            }),
            PayloadSpec::Table { cells, style } => {
                style.validate()?;
                if cells.is_empty() || cells.iter().all(Vec::is_empty) {
                    return Err(Error::InvalidElement("table needs at least one cell".into()));
                }
                let run_style = default_run_style(deck, &style);
                let mut table = TableData::from_cells(&cells, &spec.frame, &run_style);
                for row in &mut table.rows {
                    for cell in &mut row.cells {
                        set_alignment(&mut cell.body, &style);
                    }
                }
                ElementKind::Table(table)
            }
            PayloadSpec::Chart {
                chart_kind,
                title,
                categories,
                series,
            } => {
                validate_chart(&categories, &series)?;
                ElementKind::Chart(ChartData {
                    kind: chart_kind,
                    title,
                    categories,
                    series,
                    part: None,
                })
            }
        };

        let slide = deck.slide(slide_index)?;
        let id = slide.next_shape_id();
        let element = Element {
            id,
            name: spec
                .name
                .unwrap_or_else(|| format!("{} {}", display_label(&kind), id)),
            frame: Some(spec.frame),
            placeholder: None,
            kind,
            extras: ShapeExtras::default(),
        };

        self.resolve_element(&element, &deck.styles.default_font, warnings);
        Ok(element)
    }

    fn modify(
        &self,
        deck: &mut Deck,
        slide_index: usize,
        element_index: usize,
        patch: ElementPatch,
        warnings: &mut Vec<Warning>,
    ) -> Result<()> {
        deck.slide(slide_index)?.element(element_index)?;

        if let Some(frame) = &patch.frame {
            if !frame.has_area() {
                return Err(Error::InvalidElement(format!(
                    "box {}x{} has no area",
                    frame.width, frame.height
                )));
            }
        }
        if let Some(style) = &patch.style {
            style.validate()?;
        }

        // New image bytes must land in the media store before the element
        // borrows the slide.
        let new_media = match &patch.content {
            Some(ContentPatch::Image {
                data: Some(data), ..
            }) => {
                let kind = &deck.slide(slide_index)?.element(element_index)?.kind;
                if !matches!(kind, ElementKind::Image(_)) {
                    return Err(kind_mismatch("image", kind));
                }
                Some(deck.add_media(data.clone())?)
            }
            _ => None,
        };

        let default_family = deck.styles.default_font.clone();
        let element = deck.slide_mut(slide_index)?.element_mut(element_index)?;

        if let Some(content) = patch.content {
            apply_content(element, content, new_media)?;
        }
        if let Some(style) = &patch.style {
            apply_style(element, style)?;
        }
        if let Some(frame) = patch.frame {
            element.frame = Some(frame);
        }
        if let Some(name) = patch.name {
            element.name = name;
        }

        self.resolve_element(element, &default_family, warnings);
        Ok(())
    }

    fn fill(
        &self,
        deck: &mut Deck,
        values: &BTreeMap<String, String>,
        warnings: &mut Vec<Warning>,
    ) -> Result<OperationResult> {
        let default_family = deck.styles.default_font.clone();
        let mut filled = 0;
        let mut names = BTreeSet::new();

        for slide in &mut deck.slides {
            for element in &mut slide.elements {
                let bodies: Vec<&mut TextBody> = match &mut element.kind {
                    ElementKind::TextBox(body) | ElementKind::BulletList(body) => vec![body],
                    ElementKind::Table(table) => table
                        .rows
                        .iter_mut()
                        .flat_map(|r| r.cells.iter_mut().map(|c| &mut c.body))
                        .collect(),
                    ElementKind::Image(_) | ElementKind::Chart(_) => Vec::new(),
                };
                for body in bodies {
                    for paragraph in &mut body.paragraphs {
                        for (name, style) in fill_paragraph(paragraph, values)? {
                            self.resolve_style(&style, &default_family, warnings);
                            names.insert(name);
                            filled += 1;
                        }
                    }
                }
            }
        }

        Ok(OperationResult::PlaceholdersFilled {
            filled,
            names: names.into_iter().collect(),
        })
    }

    fn resolve_element(&self, element: &Element, default_family: &str, warnings: &mut Vec<Warning>) {
        match &element.kind {
            ElementKind::TextBox(body) | ElementKind::BulletList(body) => {
                self.resolve_body(body, default_family, warnings)
            }
            ElementKind::Table(table) => {
                for cell in table.rows.iter().flat_map(|r| r.cells.iter()) {
                    self.resolve_body(&cell.body, default_family, warnings);
                }
            }
            ElementKind::Image(_) | ElementKind::Chart(_) => {}
        }
    }

    fn resolve_body(&self, body: &TextBody, default_family: &str, warnings: &mut Vec<Warning>) {
        for run in body.paragraphs.iter().flat_map(|p| p.runs.iter()) {
            self.resolve_style(&run.style, default_family, warnings);
        }
    }

    /// Resolve the effective font of a run; the deck default fills in an
    /// unset family.
    fn resolve_style(&self, style: &RunStyle, default_family: &str, warnings: &mut Vec<Warning>) {
        let descriptor = style.descriptor(default_family);
        let resolution = self.fonts.resolve(&descriptor);
        if let Some(warning) = resolution.warning {
            if !warnings.contains(&warning) {
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }
}

fn check_layout(deck: &Deck, hint: Option<&str>) -> Result<()> {
    match hint {
        Some(hint) if !deck.layouts.is_empty() && deck.find_layout(hint).is_none() => {
            Err(Error::InvalidArguments(format!(
                "no slide layout matches '{}' (available: {})",
                hint,
                deck.layouts
                    .iter()
                    .map(|l| l.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
        _ => Ok(()),
    }
}

fn build_background(deck: &mut Deck, spec: BackgroundSpec) -> Result<Background> {
    Ok(match spec {
        BackgroundSpec::Inherit => Background::Inherit,
        BackgroundSpec::Color { color } => Background::Color {
            color: normalize_color(&color)?,
        },
        BackgroundSpec::Image { data } => Background::Image {
            media: deck.add_media(data)?,
        },
    })
}

/// Run style for engine-created text: the requested style over the deck defaults, with
/// an explicit family always set.
fn default_run_style(deck: &Deck, spec: &StyleSpec) -> RunStyle {
    let mut style = spec.to_run_style();
    if style.font_family.is_none() {
        style.font_family = Some(deck.styles.default_font.clone());
    }
    if style.size.is_none() {
        style.size = Some(deck.styles.default_size);
    }
    style
}

fn display_label(kind: &ElementKind) -> &'static str {
    match kind {
        ElementKind::TextBox(_) => "TextBox",
        ElementKind::BulletList(_) => "Content",
        ElementKind::Image(_) => "Picture",
        ElementKind::Table(_) => "Table",
        ElementKind::Chart(_) => "Chart",
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

fn set_alignment(body: &mut TextBody, style: &StyleSpec) {
    if let Some(alignment) = style.alignment {
        for paragraph in &mut body.paragraphs {
            paragraph.alignment = Some(alignment);
        }
    }
}

fn kind_mismatch(expected: &str, actual: &ElementKind) -> Error {
    Error::InvalidElement(format!(
        "{} content cannot be applied to a {}",
        expected,
        actual.label()
    ))
}

/// Replace the text of a body, keeping paragraph properties and the first
/// run's style of the paragraph each new line lands in.
fn replace_text(body: &mut TextBody, lines: &[String], bulleted: bool) {
    let templates: Vec<Paragraph> = body.paragraphs.clone();
    body.paragraphs = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let template = templates
                .get(i)
                .or_else(|| templates.last())
                .cloned()
                .unwrap_or_default();
            let style = template
                .runs
                .iter()
                .find(|r| r.kind == RunKind::Text)
                .map(|r| r.style.clone())
                .unwrap_or_default();
            let mut paragraph = Paragraph {
                runs: vec![TextRun::new(line.clone(), style)],
                ..template
            };
            if bulleted && paragraph.bullet.is_none() && templates.is_empty() {
                paragraph.bullet = Some(Bullet::Char(DEFAULT_BULLET.to_string()));
            }
            paragraph
        })
        .collect();
}

fn apply_content(
    element: &mut Element,
    content: ContentPatch,
    new_media: Option<String>,
) -> Result<()> {
    match (&mut element.kind, content) {
        (ElementKind::TextBox(body), ContentPatch::Text { text }) => {
            replace_text(body, &split_lines(&text), false)
        }
        (ElementKind::TextBox(body), ContentPatch::Items { items }) => {
            replace_text(body, &items, false)
        }
        (ElementKind::BulletList(body), ContentPatch::Text { text }) => {
            replace_text(body, &split_lines(&text), true)
        }
        (ElementKind::BulletList(body), ContentPatch::Items { items }) => {
            replace_text(body, &items, true)
        }
        (ElementKind::Image(image), ContentPatch::Image { description, .. }) => {
            if let Some(media) = new_media {
                image.media = media;
            }
            if let Some(description) = description {
                image.description = description;
            }
        }
        (ElementKind::Table(table), ContentPatch::Table { cells }) => {
            let rows = table.row_count();
            let cols = table.column_count();
            if cells.len() != rows || cells.iter().any(|r| r.len() != cols) {
                return Err(Error::InvalidElement(format!(
                    "table content must be {}x{}; use resize_table to change the grid",
                    rows, cols
                )));
            }
            for (r, row) in cells.iter().enumerate() {
                for (c, text) in row.iter().enumerate() {
                    replace_text(&mut table.cell_mut(r, c)?.body, &split_lines(text), false);
                }
            }
        }
        (ElementKind::Chart(chart), ContentPatch::Chart { categories, series }) => {
            if categories.len() != chart.categories.len() || series.len() != chart.series.len() {
                return Err(Error::InvalidElement(format!(
                    "chart content must keep {} categories and {} series; use set_chart_data to reshape",
                    chart.categories.len(),
                    chart.series.len()
                )));
            }
            validate_chart(&categories, &series)?;
            chart.categories = categories;
            chart.series = series;
        }
        (kind, content) => {
            let expected = match content {
                ContentPatch::Text { .. } => "text",
                ContentPatch::Items { .. } => "items",
                ContentPatch::Image { .. } => "image",
                ContentPatch::Table { .. } => "table",
                ContentPatch::Chart { .. } => "chart",
            };
            return Err(kind_mismatch(expected, kind));
        }
    }
    Ok(())
}

fn apply_style(element: &mut Element, style: &StyleSpec) -> Result<()> {
    let restyle = |body: &mut TextBody| {
        for paragraph in &mut body.paragraphs {
            if let Some(alignment) = style.alignment {
                paragraph.alignment = Some(alignment);
            }
            for run in &mut paragraph.runs {
                style.apply_to(&mut run.style);
            }
        }
    };

    match &mut element.kind {
        ElementKind::TextBox(body) | ElementKind::BulletList(body) => restyle(body),
        ElementKind::Table(table) => {
            for cell in table.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                restyle(&mut cell.body);
            }
        }
        other => return Err(kind_mismatch("text style", other)),
    }
    Ok(())
}

fn table_mut(deck: &mut Deck, slide_index: usize, element_index: usize) -> Result<&mut TableData> {
    let element = deck.slide_mut(slide_index)?.element_mut(element_index)?;
    match &mut element.kind {
        ElementKind::Table(table) => Ok(table),
        other => Err(Error::InvalidElement(format!(
            "element {} is a {}, not a table",
            element_index,
            other.label()
        ))),
    }
}

fn chart_mut(deck: &mut Deck, slide_index: usize, element_index: usize) -> Result<&mut ChartData> {
    let element = deck.slide_mut(slide_index)?.element_mut(element_index)?;
    match &mut element.kind {
        ElementKind::Chart(chart) => Ok(chart),
        other => Err(Error::InvalidElement(format!(
            "element {} is a {}, not a chart",
            element_index,
            other.label()
        ))),
    }
}

fn validate_chart(categories: &[String], series: &[ChartSeries]) -> Result<()> {
    if categories.is_empty() || series.is_empty() {
        return Err(Error::InvalidElement(
            "chart needs at least one category and one series".into(),
        ));
    }
    for s in series {
        if s.values.len() != categories.len() {
            return Err(Error::InvalidElement(format!(
                "series '{}' has {} values for {} categories",
                s.name,
                s.values.len(),
                categories.len()
            )));
        }
        if s.values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidElement(format!(
                "series '{}' contains a non-finite value",
                s.name
            )));
        }
    }
    Ok(())
}

fn resize_table(table: &mut TableData, rows: usize, cols: usize, style: &RunStyle) {
    let fallback_width = table.columns.last().copied().unwrap_or(914_400);
    table.columns.resize(cols, fallback_width);

    let fallback_height = table.rows.last().map(|r| r.height).unwrap_or(370_840);
    table.rows.resize_with(rows, || TableRow {
        height: fallback_height,
        cells: Vec::new(),
    });
    for row in &mut table.rows {
        let cell_style = row
            .cells
            .first()
            .and_then(|c| c.body.paragraphs.first())
            .and_then(|p| p.runs.first())
            .map(|r| r.style.clone())
            .unwrap_or_else(|| style.clone());
        row.cells
            .resize_with(cols, || TableCell::with_text("", &cell_style));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{FontDescriptor, FontFile, Provenance, Resolution};
    use crate::operation::ElementSpec;
    use crate::placeholder::scan;
    use crate::types::{ChartKind, Rect};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolves everything except families named "Unknown*", which degrade.
    struct StubFonts {
        calls: AtomicUsize,
    }

    impl StubFonts {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FontResolve for StubFonts {
        fn resolve(&self, descriptor: &FontDescriptor) -> Resolution {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let degraded = descriptor.family.starts_with("Unknown");
            let family = if degraded {
                "Open Sans".to_string()
            } else {
                descriptor.family.clone()
            };
            Resolution {
                file: FontFile {
                    path: None,
                    family: family.clone(),
                    weight: descriptor.weight,
                    italic: descriptor.italic,
                    provenance: if degraded {
                        Provenance::Substituted
                    } else {
                        Provenance::Bundled
                    },
                    generation: 0,
                },
                warning: degraded.then(|| Warning::FontResolutionDegraded {
                    requested: descriptor.clone(),
                    resolved_family: family,
                    reason: "stub".into(),
                }),
            }
        }
    }

    fn frame(x: i64, y: i64, width: i64, height: i64) -> Rect {
        Rect::new(x, y, width, height)
    }

    fn text_spec(text: &str) -> ElementSpec {
        ElementSpec {
            frame: frame(0, 0, 1000, 500),
            name: None,
            payload: PayloadSpec::TextBox {
                text: text.into(),
                style: StyleSpec::default(),
            },
        }
    }

    fn deck_with_slide(engine: &Engine) -> Deck {
        let mut deck = Deck::new();
        engine.add_slide(&mut deck, None).unwrap();
        deck
    }

    fn body(deck: &Deck, slide: usize, element: usize) -> &TextBody {
        match &deck.slides[slide].elements[element].kind {
            ElementKind::TextBox(body) | ElementKind::BulletList(body) => body,
            other => panic!("not text: {:?}", other),
        }
    }

    #[test]
    fn test_add_slide_scenario() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = Deck::new();

        let first = engine.add_slide(&mut deck, None).unwrap();
        assert_eq!(first, 0);
        assert_eq!(deck.slide_count(), 1);
        deck.slides[0].layout_hint = Some("marker".into());

        let second = engine.add_slide(&mut deck, Some(0)).unwrap();
        assert_eq!(second, 1);
        assert_eq!(deck.slide_count(), 2);
        assert_eq!(deck.slides[0].layout_hint.as_deref(), Some("marker"));
    }

    #[test]
    fn test_add_slide_after_missing_index_fails() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = Deck::new();
        let err = engine.add_slide(&mut deck, Some(0)).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds { what: "slide", .. }));
        assert_eq!(deck.slide_count(), 0);
    }

    #[test]
    fn test_add_element_then_modify() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);

        let index = engine.add_element(&mut deck, 0, text_spec("Hello")).unwrap();
        assert_eq!(index, 0);

        let patch = ElementPatch {
            frame: Some(frame(10, 10, 20, 20)),
            ..ElementPatch::default()
        };
        engine.modify_element(&mut deck, 0, index, patch.clone()).unwrap();
        assert_eq!(deck.slides[0].elements[0].frame, Some(frame(10, 10, 20, 20)));

        assert!(matches!(
            engine.modify_element(&mut deck, 0, 1, patch.clone()),
            Err(Error::IndexOutOfBounds { what: "element", .. })
        ));
        assert!(matches!(
            engine.modify_element(&mut deck, 1, 0, patch),
            Err(Error::IndexOutOfBounds { what: "slide", .. })
        ));
    }

    #[test]
    fn test_engine_created_runs_have_explicit_family() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine.add_element(&mut deck, 0, text_spec("a\nb")).unwrap();

        let body = body(&deck, 0, 0);
        assert_eq!(body.paragraphs.len(), 2);
        for run in body.paragraphs.iter().flat_map(|p| p.runs.iter()) {
            assert_eq!(run.style.font_family.as_deref(), Some("Calibri"));
        }
        assert!(fonts.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_add_element_rejects_empty_box() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        let mut spec = text_spec("x");
        spec.frame = frame(0, 0, 0, 10);
        assert!(matches!(
            engine.add_element(&mut deck, 0, spec),
            Err(Error::InvalidElement(_))
        ));
        let mut spec = text_spec("x");
        spec.frame = frame(0, 0, 10, -5);
        assert!(matches!(
            engine.add_element(&mut deck, 0, spec),
            Err(Error::InvalidElement(_))
        ));
        assert!(deck.slides[0].elements.is_empty());
    }

    #[test]
    fn test_delete_element_shifts_indices() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        for text in ["zero", "one", "two"] {
            engine.add_element(&mut deck, 0, text_spec(text)).unwrap();
        }

        engine.delete_element(&mut deck, 0, 1).unwrap();
        assert_eq!(deck.slides[0].elements.len(), 2);
        assert_eq!(body(&deck, 0, 1).plain_text(), "two");
        assert!(engine.delete_element(&mut deck, 0, 2).is_err());
    }

    #[test]
    fn test_modify_is_partial() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine.add_element(&mut deck, 0, text_spec("Title")).unwrap();

        let patch = ElementPatch {
            style: Some(StyleSpec {
                bold: Some(true),
                ..StyleSpec::default()
            }),
            ..ElementPatch::default()
        };
        engine.modify_element(&mut deck, 0, 0, patch).unwrap();

        let element = &deck.slides[0].elements[0];
        assert_eq!(element.frame, Some(frame(0, 0, 1000, 500)));
        let run = &body(&deck, 0, 0).paragraphs[0].runs[0];
        assert_eq!(run.text, "Title");
        assert_eq!(run.style.bold, Some(true));
        assert_eq!(run.style.font_family.as_deref(), Some("Calibri"));
    }

    #[test]
    fn test_modify_content_keeps_style() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        let mut spec = text_spec("old");
        spec.payload = PayloadSpec::TextBox {
            text: "old".into(),
            style: StyleSpec {
                italic: Some(true),
                ..StyleSpec::default()
            },
        };
        engine.add_element(&mut deck, 0, spec).unwrap();

        let patch = ElementPatch {
            content: Some(ContentPatch::Text { text: "new".into() }),
            ..ElementPatch::default()
        };
        engine.modify_element(&mut deck, 0, 0, patch).unwrap();
        let run = &body(&deck, 0, 0).paragraphs[0].runs[0];
        assert_eq!(run.text, "new");
        assert_eq!(run.style.italic, Some(true));
    }

    #[test]
    fn test_mismatched_content_is_rejected_without_change() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine.add_element(&mut deck, 0, text_spec("keep")).unwrap();

        let patch = ElementPatch {
            frame: Some(frame(5, 5, 5, 5)),
            content: Some(ContentPatch::Table { cells: vec![] }),
            ..ElementPatch::default()
        };
        assert!(matches!(
            engine.modify_element(&mut deck, 0, 0, patch),
            Err(Error::InvalidElement(_))
        ));
        assert_eq!(deck.slides[0].elements[0].frame, Some(frame(0, 0, 1000, 500)));
    }

    #[test]
    fn test_fill_scenario_and_idempotence() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine
            .add_element(&mut deck, 0, text_spec("Hello {{name}}, welcome"))
            .unwrap();
        let before = scan(&deck, true);
        let captured = before.all().next().unwrap().style.clone();

        let values = BTreeMap::from([("name".to_string(), "Ada".to_string())]);
        let applied = engine.fill_placeholders(&mut deck, values.clone()).unwrap();
        assert_eq!(
            applied.result,
            OperationResult::PlaceholdersFilled {
                filled: 1,
                names: vec!["name".into()]
            }
        );
        let text = body(&deck, 0, 0).plain_text();
        assert_eq!(text, "Hello Ada, welcome");
        for run in &body(&deck, 0, 0).paragraphs[0].runs {
            assert_eq!(run.style, captured);
        }

        let again = engine.fill_placeholders(&mut deck, values).unwrap();
        assert_eq!(
            again.result,
            OperationResult::PlaceholdersFilled {
                filled: 0,
                names: vec![]
            }
        );
        assert_eq!(body(&deck, 0, 0).plain_text(), text);
    }

    #[test]
    fn test_fill_leaves_unmapped_tokens() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine
            .add_element(&mut deck, 0, text_spec("{{a}} {{b}}"))
            .unwrap();
        engine
            .fill_placeholders(&mut deck, BTreeMap::from([("a".into(), "1".into())]))
            .unwrap();
        assert_eq!(body(&deck, 0, 0).plain_text(), "1 {{b}}");
    }

    #[test]
    fn test_fill_with_token_valued_mapping_is_rejected_atomically() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine
            .add_element(&mut deck, 0, text_spec("{{b}} then"))
            .unwrap();
        engine
            .add_element(&mut deck, 0, text_spec("Dear {{a}}"))
            .unwrap();
        let before = deck.clone();

        let values = BTreeMap::from([
            ("a".to_string(), "{{b}}".to_string()),
            ("b".to_string(), "x".to_string()),
        ]);
        let err = engine.fill_placeholders(&mut deck, values).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert_eq!(deck.slides, before.slides);
    }

    #[test]
    fn test_unknown_font_degrades_but_succeeds() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        let spec = ElementSpec {
            frame: frame(0, 0, 10, 10),
            name: None,
            payload: PayloadSpec::TextBox {
                text: "x\ny".into(),
                style: StyleSpec {
                    font_family: Some("Unknown Grotesk".into()),
                    ..StyleSpec::default()
                },
            },
        };
        let applied = engine
            .apply(
                &mut deck,
                Operation::AddElement {
                    slide_index: 0,
                    element: spec,
                },
            )
            .unwrap();
        assert_eq!(applied.warnings.len(), 1);
        assert_eq!(deck.slides[0].elements.len(), 1);
    }

    fn add_table(engine: &Engine, deck: &mut Deck) {
        let spec = ElementSpec {
            frame: frame(0, 0, 3000, 1000),
            name: None,
            payload: PayloadSpec::Table {
                cells: vec![
                    vec!["a".into(), "b".into()],
                    vec!["c".into(), "d".into()],
                ],
                style: StyleSpec::default(),
            },
        };
        engine.add_element(deck, 0, spec).unwrap();
    }

    #[test]
    fn test_set_table_cell_and_bounds() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        add_table(&engine, &mut deck);

        let set = |row, col| Operation::SetTableCell {
            slide_index: 0,
            element_index: 0,
            row,
            col,
            text: "z".into(),
        };
        engine.apply(&mut deck, set(1, 1)).unwrap();
        assert!(matches!(
            engine.apply(&mut deck, set(2, 0)),
            Err(Error::IndexOutOfBounds { what: "row", .. })
        ));
        assert!(matches!(
            engine.apply(&mut deck, set(0, 2)),
            Err(Error::IndexOutOfBounds { what: "column", .. })
        ));

        match &deck.slides[0].elements[0].kind {
            ElementKind::Table(table) => {
                assert_eq!(table.rows[1].cells[1].body.plain_text(), "z");
                assert_eq!(table.rows[0].cells[0].body.plain_text(), "a");
            }
            other => panic!("not a table: {:?}", other),
        }
    }

    #[test]
    fn test_resize_table() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        add_table(&engine, &mut deck);

        engine
            .apply(
                &mut deck,
                Operation::ResizeTable {
                    slide_index: 0,
                    element_index: 0,
                    rows: 3,
                    cols: 1,
                },
            )
            .unwrap();
        match &deck.slides[0].elements[0].kind {
            ElementKind::Table(table) => {
                assert_eq!(table.row_count(), 3);
                assert_eq!(table.column_count(), 1);
                assert!(table.rows.iter().all(|r| r.cells.len() == 1));
                assert_eq!(table.rows[1].cells[0].body.plain_text(), "c");
            }
            other => panic!("not a table: {:?}", other),
        }
    }

    #[test]
    fn test_chart_series_edits() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        let spec = ElementSpec {
            frame: frame(0, 0, 3000, 2000),
            name: None,
            payload: PayloadSpec::Chart {
                chart_kind: ChartKind::Bar,
                title: None,
                categories: vec!["Q1".into(), "Q2".into()],
                series: vec![ChartSeries {
                    name: "Sales".into(),
                    values: vec![1.0, 2.0],
                }],
            },
        };
        engine.add_element(&mut deck, 0, spec).unwrap();

        let set = |series_index, values: Vec<f64>| Operation::SetChartSeries {
            slide_index: 0,
            element_index: 0,
            series_index,
            name: Some("Revenue".into()),
            values,
        };
        engine.apply(&mut deck, set(0, vec![3.0, 4.0])).unwrap();
        assert!(matches!(
            engine.apply(&mut deck, set(1, vec![1.0, 1.0])),
            Err(Error::IndexOutOfBounds { what: "series", .. })
        ));
        assert!(matches!(
            engine.apply(&mut deck, set(0, vec![1.0, 1.0, 1.0])),
            Err(Error::IndexOutOfBounds { what: "category", .. })
        ));

        match &deck.slides[0].elements[0].kind {
            ElementKind::Chart(chart) => {
                assert_eq!(chart.series[0].name, "Revenue");
                assert_eq!(chart.series[0].values, vec![3.0, 4.0]);
            }
            other => panic!("not a chart: {:?}", other),
        }
    }

    #[test]
    fn test_modify_slide_background() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        engine
            .apply(
                &mut deck,
                Operation::ModifySlide {
                    slide_index: 0,
                    background: Some(BackgroundSpec::Color {
                        color: "#336699".into(),
                    }),
                    layout_hint: None,
                },
            )
            .unwrap();
        assert_eq!(
            deck.slides[0].background,
            Background::Color {
                color: "336699".into()
            }
        );
        assert!(engine
            .apply(
                &mut deck,
                Operation::ModifySlide {
                    slide_index: 3,
                    background: Some(BackgroundSpec::Inherit),
                    layout_hint: None,
                },
            )
            .is_err());
    }

    #[test]
    fn test_add_bullet_list_sets_bullets() {
        let fonts = StubFonts::new();
        let engine = Engine::new(&fonts);
        let mut deck = deck_with_slide(&engine);
        let spec = ElementSpec {
            frame: frame(0, 0, 10, 10),
            name: Some("Agenda".into()),
            payload: PayloadSpec::BulletList {
                items: vec!["one".into(), "two".into()],
                style: StyleSpec::default(),
            },
        };
        engine.add_element(&mut deck, 0, spec).unwrap();
        let element = &deck.slides[0].elements[0];
        assert_eq!(element.name, "Agenda");
        let body = body(&deck, 0, 0);
        assert!(body
            .paragraphs
            .iter()
            .all(|p| p.bullet == Some(Bullet::Char(DEFAULT_BULLET.into()))));
    }
}

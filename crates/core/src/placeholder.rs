//! Template placeholder detection across styled text runs.
//!
//! Authoring tools split text into runs at arbitrary formatting boundaries,
//! so a token such as `{{name}}` may arrive as `{{na` + `me}}`. Each
//! paragraph is first coalesced into one text stream that remembers, for
//! every byte, which run it came from. Tokens are matched against that
//! stream and mapped back to runs; a token spanning several runs takes the
//! style of the run holding its first character.

use crate::error::{Error, Result};
use crate::types::{Deck, Element, ElementKind, Paragraph, RunStyle, TextBody, TextRun};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Strict token grammar: `{{name}}`, name case-sensitive.
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_.\-]*)\}\}").unwrap());

/// A template slot found in a deck.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placeholder {
    /// Token name (`name` for `{{name}}`) or layout slot name (`title`).
    pub name: String,
    pub slide_index: usize,
    pub element_index: usize,
    /// Table cell holding the token, for tables.
    pub cell: Option<CellRef>,
    pub paragraph_index: usize,
    /// Run holding the first character.
    pub run_index: usize,
    /// Character offset within the coalesced paragraph text.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
    /// Style of the first character's run.
    pub style: RunStyle,
    /// True for `{{name}}` tokens; false for layout slots.
    pub is_fillable: bool,
    /// Surrounding paragraph text, when requested.
    pub content: Option<String>,
}

/// Row/column of a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

/// Placeholders of one slide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideScan {
    pub slide_index: usize,
    pub placeholders: Vec<Placeholder>,
}

/// Placeholders of a whole deck, grouped by slide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckScan {
    pub slides: Vec<SlideScan>,
}

impl DeckScan {
    /// Every placeholder in slide order.
    pub fn all(&self) -> impl Iterator<Item = &Placeholder> {
        self.slides.iter().flat_map(|s| s.placeholders.iter())
    }

    /// Distinct names of fillable tokens.
    pub fn fillable_names(&self) -> BTreeSet<&str> {
        self.all()
            .filter(|p| p.is_fillable)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// A paragraph flattened into one string with per-byte run provenance.
pub(crate) struct Coalesced {
    pub text: String,
    owners: Vec<usize>,
}

impl Coalesced {
    pub fn new(paragraph: &Paragraph) -> Self {
        let mut text = String::new();
        let mut owners = Vec::new();
        for (index, run) in paragraph.runs.iter().enumerate() {
            text.push_str(&run.text);
            owners.extend(std::iter::repeat(index).take(run.text.len()));
        }
        Self { text, owners }
    }

    /// Run that owns the byte at `offset`.
    pub fn owner(&self, offset: usize) -> usize {
        self.owners[offset]
    }

    fn char_offset(&self, byte: usize) -> usize {
        self.text[..byte].chars().count()
    }

    /// Re-split a byte range into runs cloned from their source runs.
    fn push_segments(&self, start: usize, end: usize, runs: &[TextRun], out: &mut Vec<TextRun>) {
        let mut seg_start = start;
        while seg_start < end {
            let owner = self.owners[seg_start];
            let mut seg_end = seg_start;
            while seg_end < end && self.owners[seg_end] == owner {
                seg_end += 1;
            }
            let mut run = runs[owner].clone();
            run.text = self.text[seg_start..seg_end].to_string();
            out.push(run);
            seg_start = seg_end;
        }
    }
}

/// A `{{name}}` match in a coalesced paragraph (byte offsets).
pub(crate) struct TokenMatch {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn find_tokens(coalesced: &Coalesced) -> Vec<TokenMatch> {
    TOKEN_REGEX
        .captures_iter(&coalesced.text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(TokenMatch {
                name: caps[1].to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Scan a deck for placeholders. Read-only.
pub fn scan(deck: &Deck, include_content: bool) -> DeckScan {
    let slides = deck
        .slides
        .iter()
        .enumerate()
        .map(|(slide_index, slide)| {
            let mut placeholders = Vec::new();
            for (element_index, element) in slide.elements.iter().enumerate() {
                scan_element(
                    element,
                    slide_index,
                    element_index,
                    include_content,
                    &mut placeholders,
                );
            }
            SlideScan {
                slide_index,
                placeholders,
            }
        })
        .collect();

    DeckScan { slides }
}

fn scan_element(
    element: &Element,
    slide_index: usize,
    element_index: usize,
    include_content: bool,
    out: &mut Vec<Placeholder>,
) {
    let scan_body = |body: &TextBody, cell: Option<CellRef>, out: &mut Vec<Placeholder>| {
        for (paragraph_index, paragraph) in body.paragraphs.iter().enumerate() {
            let coalesced = Coalesced::new(paragraph);
            for token in find_tokens(&coalesced) {
                let run_index = coalesced.owner(token.start);
                out.push(Placeholder {
                    name: token.name,
                    slide_index,
                    element_index,
                    cell,
                    paragraph_index,
                    run_index,
                    offset: coalesced.char_offset(token.start),
                    length: coalesced.text[token.start..token.end].chars().count(),
                    style: paragraph.runs[run_index].style.clone(),
                    is_fillable: true,
                    content: include_content.then(|| coalesced.text.clone()),
                });
            }
        }
    };

    match &element.kind {
        ElementKind::TextBox(body) | ElementKind::BulletList(body) => {
            if let Some(slot) = &element.placeholder {
                let first_run = body.paragraphs.iter().flat_map(|p| p.runs.first()).next();
                let text = body.plain_text();
                out.push(Placeholder {
                    name: slot.display_name(),
                    slide_index,
                    element_index,
                    cell: None,
                    paragraph_index: 0,
                    run_index: 0,
                    offset: 0,
                    length: text.chars().count(),
                    style: first_run.map(|r| r.style.clone()).unwrap_or_default(),
                    is_fillable: false,
                    content: include_content.then_some(text),
                });
            }
            scan_body(body, None, out);
        }
        ElementKind::Table(table) => {
            for (row, table_row) in table.rows.iter().enumerate() {
                for (col, cell) in table_row.cells.iter().enumerate() {
                    scan_body(&cell.body, Some(CellRef { row, col }), out);
                }
            }
        }
        ElementKind::Image(_) | ElementKind::Chart(_) => {}
    }
}

/// Replace mapped tokens in one paragraph. Returns the names filled.
///
/// The replacement run carries the style of the token's first character.
/// Tokens whose names are not mapped are left as they are. A fill whose
/// result still holds a mapped token (the value itself reads as a token,
/// or joins with neighbouring text into one) is rejected and the paragraph
/// is left untouched, so filling twice with the same values is a no-op.
pub(crate) fn fill_paragraph(
    paragraph: &mut Paragraph,
    values: &BTreeMap<String, String>,
) -> Result<Vec<(String, RunStyle)>> {
    let coalesced = Coalesced::new(paragraph);
    let matches: Vec<TokenMatch> = find_tokens(&coalesced)
        .into_iter()
        .filter(|m| values.contains_key(&m.name))
        .collect();
    if matches.is_empty() {
        return Ok(Vec::new());
    }

    let mut filled = Vec::with_capacity(matches.len());
    let mut runs = Vec::with_capacity(paragraph.runs.len() + matches.len());
    let mut cursor = 0;
    for token in matches {
        coalesced.push_segments(cursor, token.start, &paragraph.runs, &mut runs);
        let style = paragraph.runs[coalesced.owner(token.start)].style.clone();
        runs.push(TextRun::new(values[&token.name].clone(), style.clone()));
        filled.push((token.name, style));
        cursor = token.end;
    }
    coalesced.push_segments(cursor, coalesced.text.len(), &paragraph.runs, &mut runs);

    let original = std::mem::replace(&mut paragraph.runs, runs);
    let refilled = Coalesced::new(paragraph);
    if let Some(token) = find_tokens(&refilled)
        .into_iter()
        .find(|m| values.contains_key(&m.name))
    {
        paragraph.runs = original;
        return Err(Error::InvalidArguments(format!(
            "filling would produce the token {{{{{}}}}}; values must not contain mapped tokens",
            token.name
        )));
    }
    Ok(filled)
}

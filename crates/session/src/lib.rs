//! Call-level operation surface for the slide engine.
//!
//! Every call is self-contained: the caller passes package bytes in, one
//! operation is applied, and the re-encoded bytes come back together with a
//! content-hash identifier the caller can use to correlate successive calls.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use slidemaker_core::{
    scan, DeckScan, Engine, Error, FontDescriptor, FontResolve, Operation, OperationResult,
    Provenance, Result, Warning,
};
use std::path::PathBuf;

/// SHA-256 of the package bytes, hex encoded.
pub fn package_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Options for a new deck.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOptions {
    /// Slide width in EMU; the built-in 16:9 size when unset.
    #[serde(default)]
    pub slide_width: Option<i64>,
    /// Slide height in EMU.
    #[serde(default)]
    pub slide_height: Option<i64>,
    /// Blank slides to start with.
    #[serde(default)]
    pub slide_count: usize,
}

/// A freshly created package.
#[derive(Debug, Clone, Serialize)]
pub struct Created {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub package_id: String,
    pub slide_count: usize,
}

/// Shape of one slide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideSummary {
    pub slide_index: usize,
    pub layout: Option<String>,
    pub element_count: usize,
    pub element_kinds: Vec<&'static str>,
}

/// Shape of a whole package.
#[derive(Debug, Clone, Serialize)]
pub struct Description {
    pub package_id: String,
    pub slide_count: usize,
    pub slide_width: i64,
    pub slide_height: i64,
    pub layouts: Vec<String>,
    pub slides: Vec<SlideSummary>,
}

/// Outcome of one mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Mutated {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub package_id: String,
    pub result: OperationResult,
    pub warnings: Vec<Warning>,
}

/// Placeholders of a package, grouped by slide.
#[derive(Debug, Clone, Serialize)]
pub struct Scanned {
    pub package_id: String,
    #[serde(flatten)]
    pub scan: DeckScan,
}

/// Where a font request landed.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedFont {
    pub path: Option<PathBuf>,
    pub family: String,
    pub weight: u16,
    pub italic: bool,
    pub provenance: Provenance,
    pub warning: Option<Warning>,
}

/// Operation surface bound to a font resolver.
pub struct Session<'a> {
    fonts: &'a dyn FontResolve,
}

impl<'a> Session<'a> {
    pub fn new(fonts: &'a dyn FontResolve) -> Self {
        Self { fonts }
    }

    /// Build a new package from the built-in template.
    pub fn create(&self, options: &CreateOptions) -> Result<Created> {
        let mut deck = slidemaker_pptx::new_deck()?;
        if let Some(width) = options.slide_width {
            deck.slide_size.width = positive("slide_width", width)?;
        }
        if let Some(height) = options.slide_height {
            deck.slide_size.height = positive("slide_height", height)?;
        }

        let engine = Engine::new(self.fonts);
        for _ in 0..options.slide_count {
            engine.add_slide(&mut deck, None)?;
        }

        let bytes = slidemaker_pptx::encode(&deck)?;
        let package_id = package_id(&bytes);
        log::info!(
            "[{}] created with {} slides",
            short(&package_id),
            deck.slide_count()
        );
        Ok(Created {
            bytes,
            package_id,
            slide_count: deck.slide_count(),
        })
    }

    /// Decode a package and summarize its slides.
    pub fn decode_and_describe(&self, bytes: &[u8]) -> Result<Description> {
        let package_id = package_id(bytes);
        let deck = slidemaker_pptx::decode(bytes)?;
        log::info!("[{}] described", short(&package_id));

        let slides = deck
            .slides
            .iter()
            .enumerate()
            .map(|(slide_index, slide)| SlideSummary {
                slide_index,
                layout: slide.layout_hint.clone(),
                element_count: slide.elements.len(),
                element_kinds: slide.elements.iter().map(|e| e.kind.label()).collect(),
            })
            .collect();

        Ok(Description {
            package_id,
            slide_count: deck.slide_count(),
            slide_width: deck.slide_size.width,
            slide_height: deck.slide_size.height,
            layouts: deck.layouts.iter().map(|l| l.name.clone()).collect(),
            slides,
        })
    }

    /// Apply one JSON operation (`{"op": "add_slide", ...}`) to a package.
    ///
    /// Empty bytes with no identifier start from the built-in template; an
    /// identifier without bytes is an error, since no state is kept between
    /// calls.
    pub fn mutate(
        &self,
        bytes: &[u8],
        package_id: Option<&str>,
        operation: serde_json::Value,
    ) -> Result<Mutated> {
        if bytes.is_empty() {
            if let Some(id) = package_id {
                return Err(Error::MissingPackageBytes(id.to_string()));
            }
        }
        let input_id = package_id
            .map(str::to_string)
            .unwrap_or_else(|| self::package_id(bytes));

        let op = Operation::from_json(operation)?;
        log::info!("[{}] {}", short(&input_id), op.name());

        let mut deck = slidemaker_pptx::decode(bytes)?;
        let applied = Engine::new(self.fonts).apply(&mut deck, op)?;
        for warning in &applied.warnings {
            log::warn!("[{}] {}", short(&input_id), warning);
        }

        let out = slidemaker_pptx::encode(&deck)?;
        let output_id = self::package_id(&out);
        log::info!(
            "[{}] -> [{}] {:?}",
            short(&input_id),
            short(&output_id),
            applied.result
        );
        Ok(Mutated {
            bytes: out,
            package_id: output_id,
            result: applied.result,
            warnings: applied.warnings,
        })
    }

    /// Every placeholder in the package, in slide order.
    pub fn scan_placeholders(&self, bytes: &[u8], include_content: bool) -> Result<Scanned> {
        let package_id = package_id(bytes);
        let deck = slidemaker_pptx::decode(bytes)?;
        let scan = scan(&deck, include_content);
        log::info!(
            "[{}] scanned {} placeholders",
            short(&package_id),
            scan.all().count()
        );
        Ok(Scanned { package_id, scan })
    }

    /// Resolve one font request.
    pub fn resolve_font(&self, descriptor: &FontDescriptor) -> ResolvedFont {
        let resolution = self.fonts.resolve(descriptor);
        if let Some(warning) = &resolution.warning {
            log::warn!("{}", warning);
        }
        ResolvedFont {
            path: resolution.file.path,
            family: resolution.file.family,
            weight: resolution.file.weight,
            italic: resolution.file.italic,
            provenance: resolution.file.provenance,
            warning: resolution.warning,
        }
    }
}

fn positive(what: &str, value: i64) -> Result<i64> {
    if value > 0 {
        Ok(value)
    } else {
        Err(Error::InvalidArguments(format!(
            "{} must be positive, got {}",
            what, value
        )))
    }
}

/// Log prefix for a package id.
fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

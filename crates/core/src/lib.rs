//! Core deck model, placeholder scanning and the element mutation engine
//! for PowerPoint presentations.

pub mod engine;
pub mod error;
pub mod font;
pub mod operation;
pub mod placeholder;
pub mod types;

pub use engine::Engine;
pub use error::{Error, Result};
pub use font::{FontDescriptor, FontFile, FontResolve, Provenance, Resolution, Warning};
pub use operation::{Applied, ElementPatch, ElementSpec, Operation, OperationResult};
pub use placeholder::{scan, DeckScan, Placeholder};
pub use types::{Deck, Element, ElementKind, Slide};

//! PPTX (Office Open XML) package codec.
//!
//! A .pptx file is a ZIP archive of XML parts linked by relationship parts.
//! [`decode`] lifts slides into the [`Deck`] model and carries everything
//! else opaquely; [`encode`] writes the deck back, regenerating only what
//! changed.

mod chart;
mod decode;
mod encode;
mod package;
mod slide;
mod template;
mod text;
mod writer;
mod xml;

pub use decode::decode;
pub use encode::encode;
pub use template::package as template_package;

use slidemaker_core::{Deck, Result};

/// A new deck with the built-in master, layouts and theme and no slides.
pub fn new_deck() -> Result<Deck> {
    decode(&[])
}

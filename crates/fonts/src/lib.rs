//! Font resolution for the slide engine.
//!
//! [`FontResolver`] maps a requested (family, weight, italic) descriptor to a
//! local font file: cache, then bundled/system fonts, then the alias table,
//! then a download from the configured [`FontSource`]. It never fails;
//! anything short of the requested font comes back with a warning.

pub mod alias;
pub mod cache;
pub mod config;
pub mod resolver;
pub mod source;

pub use cache::{CacheKey, FontCache};
pub use config::ResolverConfig;
pub use resolver::FontResolver;
pub use source::{FetchError, FetchedFont, FontSource, GoogleFontsSource, OfflineSource};

//! Font request and resolution types shared by the engine and the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A (family, weight, italic) font request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontDescriptor {
    pub family: String,
    #[serde(default = "default_weight")]
    pub weight: u16,
    #[serde(default)]
    pub italic: bool,
}

fn default_weight() -> u16 {
    400
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>, weight: u16, italic: bool) -> Self {
        Self {
            family: family.into(),
            weight,
            italic,
        }
    }

    /// Same weight and style, different family.
    pub fn with_family(&self, family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for FontDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.family,
            self.weight,
            if self.italic { " italic" } else { "" }
        )
    }
}

/// Where a resolved font file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Shipped with the application or installed on the system.
    Bundled,
    /// Fetched from the font host and stored in the cache.
    Downloaded,
    /// A different family or weight stood in for the request.
    Substituted,
}

/// A concrete font file answering a [`FontDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontFile {
    /// Local file path; `None` only when even the default family has no
    /// local file.
    pub path: Option<PathBuf>,
    pub family: String,
    pub weight: u16,
    pub italic: bool,
    pub provenance: Provenance,
    /// Cache generation the entry was recorded in.
    pub generation: u64,
}

/// Non-fatal issues reported next to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    /// The requested font was substituted.
    FontResolutionDegraded {
        requested: FontDescriptor,
        resolved_family: String,
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::FontResolutionDegraded {
                requested,
                resolved_family,
                reason,
            } => write!(
                f,
                "font '{}' resolved to '{}' ({})",
                requested, resolved_family, reason
            ),
        }
    }
}

/// Outcome of one font resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub file: FontFile,
    pub warning: Option<Warning>,
}

/// Maps font requests to font files. Never fails: problems degrade to a
/// substitute and a warning.
pub trait FontResolve: Send + Sync {
    fn resolve(&self, descriptor: &FontDescriptor) -> Resolution;
}

//! On-disk font cache.
//!
//! Files are named `{family}-{weight}-{normal|italic}.{ext}` where the
//! family is a normalized slug, so the directory itself is the index and
//! survives restarts. Entries never expire; [`FontCache::clear`] is the only
//! invalidation and bumps the generation.

use parking_lot::RwLock;
use slidemaker_core::FontDescriptor;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalized (family, weight, italic) cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub family: String,
    pub weight: u16,
    pub italic: bool,
}

impl CacheKey {
    pub fn new(descriptor: &FontDescriptor) -> Self {
        Self {
            family: slug(&descriptor.family),
            weight: descriptor.weight,
            italic: descriptor.italic,
        }
    }

    fn style(&self) -> &'static str {
        if self.italic {
            "italic"
        } else {
            "normal"
        }
    }

    /// File name for this key with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-{}-{}.{}", self.family, self.weight, self.style(), extension)
    }

    /// Parse a cache file name back into its key.
    fn from_file_name(name: &str) -> Option<Self> {
        let (stem, _ext) = name.rsplit_once('.')?;
        let mut parts = stem.rsplitn(3, '-');
        let italic = match parts.next()? {
            "italic" => true,
            "normal" => false,
            _ => return None,
        };
        let weight = parts.next()?.parse().ok()?;
        let family = parts.next()?.to_string();
        if family.is_empty() {
            return None;
        }
        Some(Self {
            family,
            weight,
            italic,
        })
    }
}

/// Normalize a family name: compatibility-decomposed, lowercase, spaces as
/// underscores. Accents are dropped; other non-ASCII letters are kept as
/// `u{hex}` so families in non-Latin scripts get distinct, non-empty names.
pub fn slug(family: &str) -> String {
    let mut out = String::with_capacity(family.len());
    for c in family.trim().nfkd() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '_' || c == '-') && !out.ends_with('_') {
            out.push('_');
        } else if c.is_alphanumeric() && !is_combining_mark(c) {
            out.push_str(&format!("u{:x}", u32::from(c)));
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Directory-backed cache index.
pub struct FontCache {
    dir: PathBuf,
    index: RwLock<HashMap<CacheKey, PathBuf>>,
    generation: AtomicU64,
}

impl FontCache {
    /// Open (creating if needed) a cache directory and index its files.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut index = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(".part") {
                continue;
            }
            match CacheKey::from_file_name(name) {
                Some(key) => {
                    index.insert(key, entry.path());
                }
                None => log::debug!("Ignoring unrecognized cache file: {}", name),
            }
        }
        log::debug!("Font cache {} holds {} files", dir.display(), index.len());

        Ok(Self {
            dir,
            index: RwLock::new(index),
            generation: AtomicU64::new(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current generation; changes only on [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Exact lookup.
    pub fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        self.index.read().get(key).filter(|p| p.is_file()).cloned()
    }

    /// Closest cached weight for the same family, preferring the same style.
    pub fn nearest(&self, key: &CacheKey) -> Option<(CacheKey, PathBuf)> {
        let index = self.index.read();
        index
            .iter()
            .filter(|(k, path)| k.family == key.family && path.is_file())
            .min_by_key(|(k, _)| {
                (
                    k.italic != key.italic,
                    k.weight.abs_diff(key.weight),
                    // Prefer the heavier face on ties.
                    std::cmp::Reverse(k.weight),
                )
            })
            .map(|(k, path)| (k.clone(), path.clone()))
    }

    /// Write font bytes under a key and index them.
    ///
    /// The file is written beside its final name and renamed into place, so
    /// readers never see a partial file.
    pub fn store(&self, key: &CacheKey, data: &[u8], extension: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(key.file_name(extension));
        let partial = path.with_extension(format!("{}.part", extension));
        fs::write(&partial, data)?;
        fs::rename(&partial, &path)?;

        self.index.write().insert(key.clone(), path.clone());
        log::debug!("Cached font {}", path.display());
        Ok(path)
    }

    /// Remove every cached file and bump the generation.
    pub fn clear(&self) -> io::Result<()> {
        let mut index = self.index.write();
        for path in index.values() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        index.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

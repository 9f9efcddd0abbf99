//! Descriptor to font file resolution.

use crate::alias;
use crate::cache::{CacheKey, FontCache};
use crate::config::ResolverConfig;
use crate::source::{FetchError, FontSource, GoogleFontsSource, OfflineSource};
use parking_lot::{Mutex, RwLock};
use slidemaker_core::{FontDescriptor, FontFile, FontResolve, Provenance, Resolution, Warning};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolves font descriptors against the cache, local fonts and a remote
/// source. Shared by reference across concurrent calls.
pub struct FontResolver {
    config: ResolverConfig,
    cache: FontCache,
    db: fontdb::Database,
    source: Box<dyn FontSource>,
    /// One lock per key; holders are the only ones fetching that key.
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    /// Keys whose fetch failed permanently, with the failure message.
    failed: RwLock<HashMap<CacheKey, String>>,
}

impl FontResolver {
    /// Build a resolver; downloads go to Google Fonts when allowed.
    pub fn new(config: ResolverConfig) -> slidemaker_core::Result<Self> {
        let source: Box<dyn FontSource> = if config.allow_download {
            match GoogleFontsSource::new(&config) {
                Ok(source) => Box::new(source),
                Err(e) => {
                    log::warn!("Font downloads unavailable: {}", e);
                    Box::new(OfflineSource)
                }
            }
        } else {
            Box::new(OfflineSource)
        };
        Self::with_source(config, source)
    }

    /// Build a resolver over a specific font source.
    pub fn with_source(
        config: ResolverConfig,
        source: Box<dyn FontSource>,
    ) -> slidemaker_core::Result<Self> {
        let cache = FontCache::open(&config.cache_dir)?;

        let mut db = fontdb::Database::new();
        if config.use_system_fonts {
            db.load_system_fonts();
        }
        for dir in &config.bundle_dirs {
            db.load_fonts_dir(dir);
        }
        log::debug!(
            "Font resolver ready: {} local faces, {} cached files",
            db.len(),
            cache.len()
        );

        Ok(Self {
            config,
            cache,
            db,
            source,
            in_flight: Mutex::new(HashMap::new()),
            failed: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &FontCache {
        &self.cache
    }

    /// Drop every cached file and remembered failure.
    pub fn clear(&self) -> io::Result<()> {
        self.failed.write().clear();
        self.cache.clear()
    }

    fn resolve_descriptor(&self, requested: &FontDescriptor) -> Resolution {
        if let Some(file) = self
            .cached(requested)
            .or_else(|| self.local(requested, true))
        {
            return Resolution {
                file,
                warning: None,
            };
        }

        let substitute = alias::substitute(&requested.family);
        let target = match substitute {
            Some(family) => requested.with_family(family),
            None => requested.clone(),
        };

        if substitute.is_some() {
            let reason = format!("'{}' replaced by open substitute", requested.family);
            if let Some(file) = self.cached(&target).or_else(|| self.local(&target, true)) {
                return degraded(requested, substituted(file), reason);
            }
            return match self.fetch(&target) {
                Ok(path) => degraded(
                    requested,
                    self.file(&target, path, Provenance::Substituted),
                    reason,
                ),
                Err(err) => self.fall_back(requested, &target, &err),
            };
        }

        match self.fetch(&target) {
            Ok(path) => Resolution {
                file: self.file(&target, path, Provenance::Downloaded),
                warning: None,
            },
            Err(err) => self.fall_back(requested, &target, &err),
        }
    }

    /// Nearest weight of the target family, then the default family.
    fn fall_back(
        &self,
        requested: &FontDescriptor,
        target: &FontDescriptor,
        err: &FetchError,
    ) -> Resolution {
        if let Some(file) = self.nearest(target) {
            let reason = format!("{}; using weight {}", err, file.weight);
            return degraded(requested, file, reason);
        }

        let default = requested.with_family(self.config.default_family.as_str());
        let reason = format!("{}; using default family", err);
        if CacheKey::new(&default).family != CacheKey::new(target).family {
            let found = self
                .cached(&default)
                .or_else(|| self.local(&default, true))
                .or_else(|| {
                    self.fetch(&default)
                        .ok()
                        .map(|path| self.file(&default, path, Provenance::Substituted))
                })
                .or_else(|| self.nearest(&default));
            if let Some(file) = found {
                return degraded(requested, substituted(file), reason);
            }
        }

        log::debug!("No local file for default family {}", default.family);
        let file = FontFile {
            path: None,
            family: default.family.clone(),
            weight: default.weight,
            italic: default.italic,
            provenance: Provenance::Substituted,
            generation: self.cache.generation(),
        };
        degraded(requested, file, reason)
    }

    fn file(&self, descriptor: &FontDescriptor, path: PathBuf, provenance: Provenance) -> FontFile {
        FontFile {
            path: Some(path),
            family: descriptor.family.clone(),
            weight: descriptor.weight,
            italic: descriptor.italic,
            provenance,
            generation: self.cache.generation(),
        }
    }

    fn cached(&self, descriptor: &FontDescriptor) -> Option<FontFile> {
        let path = self.cache.get(&CacheKey::new(descriptor))?;
        Some(self.file(descriptor, path, Provenance::Downloaded))
    }

    fn nearest(&self, descriptor: &FontDescriptor) -> Option<FontFile> {
        if let Some((key, path)) = self.cache.nearest(&CacheKey::new(descriptor)) {
            return Some(FontFile {
                path: Some(path),
                family: descriptor.family.clone(),
                weight: key.weight,
                italic: key.italic,
                provenance: Provenance::Substituted,
                generation: self.cache.generation(),
            });
        }
        self.local(descriptor, false).map(substituted)
    }

    /// Bundled or system face of the family; with `exact`, only a face with
    /// the requested weight and style.
    fn local(&self, descriptor: &FontDescriptor, exact: bool) -> Option<FontFile> {
        let wanted = descriptor.family.trim();
        let family = self
            .db
            .faces()
            .flat_map(|face| face.families.iter())
            .map(|(name, _)| name.as_str())
            .find(|name| name.eq_ignore_ascii_case(wanted))?;

        let query = fontdb::Query {
            families: &[fontdb::Family::Name(family)],
            weight: fontdb::Weight(descriptor.weight),
            stretch: fontdb::Stretch::Normal,
            style: if descriptor.italic {
                fontdb::Style::Italic
            } else {
                fontdb::Style::Normal
            },
        };
        let face = self.db.face(self.db.query(&query)?)?;
        let italic = face.style != fontdb::Style::Normal;
        if exact && (face.weight.0 != descriptor.weight || italic != descriptor.italic) {
            return None;
        }

        let path = match &face.source {
            fontdb::Source::File(path) => path.clone(),
            fontdb::Source::SharedFile(path, _) => path.clone(),
            _ => return None,
        };
        Some(FontFile {
            path: Some(path),
            family: family.to_string(),
            weight: face.weight.0,
            italic,
            provenance: Provenance::Bundled,
            generation: self.cache.generation(),
        })
    }

    /// Download and cache a descriptor, at most once per key at a time.
    fn fetch(&self, descriptor: &FontDescriptor) -> Result<PathBuf, FetchError> {
        let key = CacheKey::new(descriptor);
        if let Some(message) = self.failed.read().get(&key) {
            return Err(FetchError::Previous(message.clone()));
        }

        let lock = self.in_flight.lock().entry(key.clone()).or_default().clone();
        let guard = lock.lock();
        let result = self.fetch_locked(descriptor, &key);
        // Later callers start a fresh lock; waiters on this one find the
        // cached file or the remembered failure.
        self.in_flight.lock().remove(&key);
        drop(guard);
        result
    }

    fn fetch_locked(&self, descriptor: &FontDescriptor, key: &CacheKey) -> Result<PathBuf, FetchError> {
        // Another caller may have finished while we waited.
        if let Some(path) = self.cache.get(key) {
            return Ok(path);
        }
        if let Some(message) = self.failed.read().get(key) {
            return Err(FetchError::Previous(message.clone()));
        }

        let result = self
            .fetch_with_retry(descriptor)
            .and_then(|font| Ok(self.cache.store(key, &font.data, &font.extension)?));
        match &result {
            Ok(path) => log::info!("Downloaded {} to {}", descriptor, path.display()),
            Err(err) if err.is_permanent() => {
                log::debug!("Fetching {} failed: {}", descriptor, err);
                self.failed.write().insert(key.clone(), err.to_string());
            }
            Err(err) => log::debug!("Fetching {} failed, will retry later: {}", descriptor, err),
        }
        result
    }

    fn fetch_with_retry(
        &self,
        descriptor: &FontDescriptor,
    ) -> Result<crate::source::FetchedFont, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .source
                .fetch(&descriptor.family, descriptor.weight, descriptor.italic)
            {
                Ok(font) => return Ok(font),
                Err(err) if err.is_retryable() && attempt <= self.config.max_retries => {
                    log::debug!("Attempt {} for {} failed: {}", attempt, descriptor, err);
                    let pause = self.config.retry_backoff_ms * u64::from(attempt);
                    if pause > 0 {
                        std::thread::sleep(Duration::from_millis(pause));
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl FontResolve for FontResolver {
    fn resolve(&self, descriptor: &FontDescriptor) -> Resolution {
        let resolution = self.resolve_descriptor(descriptor);
        log::debug!(
            "Resolved {} -> {} {} ({:?})",
            descriptor,
            resolution.file.family,
            resolution.file.weight,
            resolution.file.provenance
        );
        resolution
    }
}

fn substituted(file: FontFile) -> FontFile {
    FontFile {
        provenance: Provenance::Substituted,
        ..file
    }
}

fn degraded(requested: &FontDescriptor, file: FontFile, reason: String) -> Resolution {
    let warning = Warning::FontResolutionDegraded {
        requested: requested.clone(),
        resolved_family: file.family.clone(),
        reason,
    };
    Resolution {
        file,
        warning: Some(warning),
    }
}

//! Resolver configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Family every failed resolution falls back to.
pub const DEFAULT_FALLBACK_FAMILY: &str = "Open Sans";

/// Google Fonts CSS API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://fonts.googleapis.com";

/// Settings for a [`FontResolver`](crate::FontResolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory holding downloaded fonts, one file per normalized key.
    pub cache_dir: PathBuf,

    /// Extra directories scanned for bundled fonts.
    pub bundle_dirs: Vec<PathBuf>,

    /// Also index fonts installed on the system.
    pub use_system_fonts: bool,

    /// Fetch missing families from the font host.
    pub allow_download: bool,

    /// Font host base URL.
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Retries after the first failed fetch attempt.
    pub max_retries: u32,

    /// Pause between attempts in milliseconds, multiplied by the attempt number.
    pub retry_backoff_ms: u64,

    /// Family used when nothing closer can be found.
    pub default_family: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("slidemaker-fonts"),
            bundle_dirs: Vec::new(),
            use_system_fonts: true,
            allow_download: true,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 250,
            default_family: DEFAULT_FALLBACK_FAMILY.to_string(),
        }
    }
}

impl ResolverConfig {
    /// A configuration that never touches the network or system fonts.
    pub fn offline(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            use_system_fonts: false,
            allow_download: false,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ResolverConfig =
            serde_json::from_str(r#"{"allow_download": false, "max_retries": 5}"#).unwrap();
        assert!(!config.allow_download);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_family, "Open Sans");
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_offline_config() {
        let config = ResolverConfig::offline("/tmp/x");
        assert!(!config.allow_download);
        assert!(!config.use_system_fonts);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/x"));
    }
}

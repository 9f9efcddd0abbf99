//! Remote font sources.

use crate::config::ResolverConfig;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// `src: url(...) format('...')` entries in a CSS2 API response.
static FONT_SRC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"src:\s*url\(([^)]+)\)\s*format\(['"]([A-Za-z0-9-]+)['"]\)"#).unwrap()
});

/// Older desktop user agent; the CSS API answers it with TrueType files
/// instead of WOFF2.
const TRUETYPE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/534.30 (KHTML, like Gecko) Safari/534.30";

/// Why a fetch did not produce a font.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The host does not serve this family, weight or style.
    #[error("font not available: {0}")]
    NotFound(String),

    /// Downloads are disabled.
    #[error("downloads disabled")]
    Offline,

    /// Transport failure or unexpected response.
    #[error("fetch failed: {0}")]
    Http(String),

    /// The downloaded font could not be stored.
    #[error("cache write failed: {0}")]
    Io(#[from] std::io::Error),

    /// An earlier attempt for the same key failed with this message.
    #[error("{0}")]
    Previous(String),
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Http(_))
    }

    /// Whether every later attempt would fail the same way.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound(_) | FetchError::Offline)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err.to_string())
    }
}

/// Downloaded font bytes plus the file extension they should be stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFont {
    pub data: Vec<u8>,
    pub extension: String,
}

/// Somewhere font files can be downloaded from.
pub trait FontSource: Send + Sync {
    fn fetch(&self, family: &str, weight: u16, italic: bool) -> Result<FetchedFont, FetchError>;
}

/// A source that never has anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSource;

impl FontSource for OfflineSource {
    fn fetch(&self, _family: &str, _weight: u16, _italic: bool) -> Result<FetchedFont, FetchError> {
        Err(FetchError::Offline)
    }
}

/// Fetches fonts through the Google Fonts CSS2 API.
pub struct GoogleFontsSource {
    client: reqwest::blocking::Client,
    css_endpoint: reqwest::Url,
}

impl GoogleFontsSource {
    pub fn new(config: &ResolverConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(TRUETYPE_USER_AGENT)
            .build()?;
        let base = config.api_base_url.trim_end_matches('/');
        let css_endpoint = reqwest::Url::parse(&format!("{}/css2", base))
            .map_err(|e| FetchError::Http(format!("invalid font host URL '{}': {}", base, e)))?;
        Ok(Self {
            client,
            css_endpoint,
        })
    }

    /// CSS2 request for one face; the family query is percent-encoded.
    fn css_url(&self, family: &str, weight: u16, italic: bool) -> reqwest::Url {
        let mut url = self.css_endpoint.clone();
        url.query_pairs_mut().append_pair(
            "family",
            &format!("{}:ital,wght@{},{}", family.trim(), u8::from(italic), weight),
        );
        url
    }
}

impl FontSource for GoogleFontsSource {
    fn fetch(&self, family: &str, weight: u16, italic: bool) -> Result<FetchedFont, FetchError> {
        let url = self.css_url(family, weight, italic);
        log::debug!("Requesting {}", url);

        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(format!("{} {} (HTTP {})", family, weight, status)));
        }
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {} for {}", status, url)));
        }
        let css = response.text()?;

        let (font_url, format) = pick_font_url(&css)
            .ok_or_else(|| FetchError::Http(format!("no font URL in response for {}", family)))?;

        let response = self.client.get(&font_url).send()?.error_for_status()?;
        let data = response.bytes()?.to_vec();
        if data.is_empty() {
            return Err(FetchError::Http(format!("empty font file from {}", font_url)));
        }

        Ok(FetchedFont {
            data,
            extension: extension_for_format(&format).to_string(),
        })
    }
}

/// Choose one font URL from a CSS response, preferring TrueType/OpenType and,
/// among several subsets, the last one (the Latin subset).
fn pick_font_url(css: &str) -> Option<(String, String)> {
    let entries: Vec<(String, String)> = FONT_SRC_REGEX
        .captures_iter(css)
        .map(|c| {
            (
                c[1].trim().trim_matches(|ch| ch == '\'' || ch == '"').to_string(),
                c[2].to_lowercase(),
            )
        })
        .collect();

    entries
        .iter()
        .rev()
        .find(|(_, format)| format == "truetype" || format == "opentype")
        .or_else(|| entries.last())
        .cloned()
}

fn extension_for_format(format: &str) -> &'static str {
    match format {
        "opentype" => "otf",
        "woff2" => "woff2",
        "woff" => "woff",
        _ => "ttf",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSS: &str = r#"
/* cyrillic */
@font-face {
  font-family: 'Open Sans';
  font-style: normal;
  font-weight: 700;
  src: url(https://fonts.gstatic.com/s/opensans/v40/cyr.woff2) format('woff2');
}
/* latin */
@font-face {
  font-family: 'Open Sans';
  font-style: normal;
  font-weight: 700;
  src: url(https://fonts.gstatic.com/s/opensans/v40/latin.ttf) format('truetype');
}
"#;

    #[test]
    fn test_pick_prefers_truetype() {
        let (url, format) = pick_font_url(CSS).unwrap();
        assert_eq!(url, "https://fonts.gstatic.com/s/opensans/v40/latin.ttf");
        assert_eq!(format, "truetype");
        assert_eq!(extension_for_format(&format), "ttf");
    }

    #[test]
    fn test_pick_falls_back_to_last_entry() {
        let css = "src: url('https://x/a.woff2') format('woff2');\nsrc: url(https://x/b.woff2) format(\"woff2\");";
        let (url, format) = pick_font_url(css).unwrap();
        assert_eq!(url, "https://x/b.woff2");
        assert_eq!(extension_for_format(&format), "woff2");
        assert!(pick_font_url("body { color: red }").is_none());
    }

    #[test]
    fn test_css_url() {
        let config = ResolverConfig {
            api_base_url: "https://fonts.example.com/".into(),
            ..ResolverConfig::default()
        };
        let source = GoogleFontsSource::new(&config).unwrap();
        assert_eq!(
            source.css_url("Nunito Sans", 700, true).as_str(),
            "https://fonts.example.com/css2?family=Nunito+Sans%3Aital%2Cwght%401%2C700"
        );

        let url = source.css_url("Fira & Code#1", 400, false);
        assert_eq!(url.query_pairs().count(), 1);
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "family");
        assert_eq!(value, "Fira & Code#1:ital,wght@0,400");
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_host_url_is_rejected() {
        let config = ResolverConfig {
            api_base_url: "not a url".into(),
            ..ResolverConfig::default()
        };
        assert!(matches!(
            GoogleFontsSource::new(&config),
            Err(FetchError::Http(_))
        ));
    }

    #[test]
    fn test_offline_source() {
        let err = OfflineSource.fetch("Lato", 400, false).unwrap_err();
        assert!(matches!(err, FetchError::Offline));
        assert!(!err.is_retryable());
        assert!(err.is_permanent());
        assert!(!FetchError::Http("timed out".into()).is_permanent());
    }
}

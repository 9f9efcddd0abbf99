//! CLI tool for building and editing PowerPoint decks.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use slidemaker_core::FontDescriptor;
use slidemaker_fonts::{FontResolver, ResolverConfig};
use slidemaker_session::{CreateOptions, Session};
use std::fs;
use std::path::{Path, PathBuf};

/// Build, inspect and edit .pptx decks one operation at a time.
#[derive(Parser, Debug)]
#[command(name = "slidemaker")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    fonts: FontArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Font resolver settings.
#[derive(ClapArgs, Debug)]
struct FontArgs {
    /// Directory for downloaded fonts
    #[arg(long, global = true, env = "SLIDEMAKER_FONT_CACHE")]
    font_cache: Option<PathBuf>,

    /// Extra directories with bundled fonts
    #[arg(long = "font-dir", global = true, env = "SLIDEMAKER_FONT_DIRS", value_delimiter = ',')]
    font_dirs: Vec<PathBuf>,

    /// Do not index system fonts
    #[arg(long, global = true, env = "SLIDEMAKER_NO_SYSTEM_FONTS")]
    no_system_fonts: bool,

    /// Never download fonts
    #[arg(long, global = true, env = "SLIDEMAKER_OFFLINE")]
    offline: bool,

    /// Font host base URL
    #[arg(long, global = true, env = "SLIDEMAKER_FONT_API_URL")]
    font_api_url: Option<String>,

    /// Download timeout in seconds
    #[arg(long, global = true, env = "SLIDEMAKER_FONT_TIMEOUT")]
    font_timeout: Option<u64>,

    /// Download retries after the first attempt
    #[arg(long, global = true, env = "SLIDEMAKER_FONT_RETRIES")]
    font_retries: Option<u32>,

    /// Family used when nothing closer is available
    #[arg(long, global = true, env = "SLIDEMAKER_DEFAULT_FONT")]
    default_font: Option<String>,
}

impl FontArgs {
    fn config(&self) -> ResolverConfig {
        let mut config = ResolverConfig::default();
        if let Some(dir) = &self.font_cache {
            config.cache_dir = dir.clone();
        }
        config.bundle_dirs = self.font_dirs.clone();
        config.use_system_fonts = !self.no_system_fonts;
        config.allow_download = !self.offline;
        if let Some(url) = &self.font_api_url {
            config.api_base_url = url.clone();
        }
        if let Some(timeout) = self.font_timeout {
            config.timeout_secs = timeout;
        }
        if let Some(retries) = self.font_retries {
            config.max_retries = retries;
        }
        if let Some(family) = &self.default_font {
            config.default_family = family.clone();
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new deck from the built-in template
    Create {
        /// Output .pptx file
        output: PathBuf,

        /// Number of blank slides
        #[arg(short, long, default_value = "0")]
        slides: usize,

        /// Slide width in EMU
        #[arg(long)]
        width: Option<i64>,

        /// Slide height in EMU
        #[arg(long)]
        height: Option<i64>,
    },

    /// Print slide and element counts of a deck
    Describe {
        /// Input .pptx file
        input: PathBuf,
    },

    /// Apply one JSON operation to a deck
    Mutate {
        /// Operation JSON, or @path to read it from a file
        operation: String,

        /// Input .pptx file (starts from the built-in template when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Identifier of the input package, from a previous call
        #[arg(long)]
        package_id: Option<String>,
    },

    /// List template placeholders
    Scan {
        /// Input .pptx file
        input: PathBuf,

        /// Include the surrounding paragraph text
        #[arg(short, long)]
        content: bool,
    },

    /// Resolve a font request to a local file
    ResolveFont {
        /// Font family
        family: String,

        /// Weight (100-900)
        #[arg(short, long, default_value = "400")]
        weight: u16,

        /// Italic style
        #[arg(short, long)]
        italic: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let resolver =
        FontResolver::new(args.fonts.config()).context("Failed to open the font cache")?;
    let session = Session::new(&resolver);

    match args.command {
        Command::Create {
            output,
            slides,
            width,
            height,
        } => {
            let created = session
                .create(&CreateOptions {
                    slide_width: width,
                    slide_height: height,
                    slide_count: slides,
                })
                .context("Failed to create the deck")?;
            write_output(&output, &created.bytes)?;
            print_json(&created)
        }
        Command::Describe { input } => {
            let bytes = read_input(&input)?;
            let description = session
                .decode_and_describe(&bytes)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            print_json(&description)
        }
        Command::Mutate {
            operation,
            input,
            output,
            package_id,
        } => {
            let operation = parse_operation(&operation)?;
            let bytes = match &input {
                Some(path) => read_input(path)?,
                None => Vec::new(),
            };
            let output_path = output
                .or(input)
                .context("--output is required without --input")?;

            let mutated = session
                .mutate(&bytes, package_id.as_deref(), operation)
                .context("Operation failed")?;
            write_output(&output_path, &mutated.bytes)?;
            if args.verbose {
                eprintln!("Written to: {}", output_path.display());
            }
            print_json(&mutated)
        }
        Command::Scan { input, content } => {
            let bytes = read_input(&input)?;
            let scanned = session
                .scan_placeholders(&bytes, content)
                .with_context(|| format!("Failed to scan {}", input.display()))?;
            print_json(&scanned)
        }
        Command::ResolveFont {
            family,
            weight,
            italic,
        } => {
            let resolved = session.resolve_font(&FontDescriptor::new(family, weight, italic));
            print_json(&resolved)
        }
    }
}

/// Inline JSON, or `@path` to a JSON file.
fn parse_operation(arg: &str) -> Result<serde_json::Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read operation file {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("Operation is not valid JSON")
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Write output to a file, creating parent directories.
fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write to {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_and_file_operations() {
        let inline = parse_operation(r#"{"op": "add_slide"}"#).unwrap();
        assert_eq!(inline["op"], "add_slide");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.json");
        fs::write(&path, r#"{"op": "delete_slide", "slide_index": 0}"#).unwrap();
        let from_file = parse_operation(&format!("@{}", path.display())).unwrap();
        assert_eq!(from_file["slide_index"], 0);

        assert!(parse_operation("{not json").is_err());
    }

    #[test]
    fn test_font_flags_override_defaults() {
        let args = Args::parse_from([
            "slidemaker",
            "--offline",
            "--font-cache",
            "/tmp/fonts",
            "--font-timeout",
            "3",
            "resolve-font",
            "Inter",
        ]);
        let config = args.fonts.config();
        assert!(!config.allow_download);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/fonts"));
        assert_eq!(config.timeout_secs, 3);
        assert!(matches!(args.command, Command::ResolveFont { weight: 400, .. }));
    }

    #[test]
    fn test_session_errors_keep_their_cause() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResolverConfig {
            cache_dir: dir.path().to_path_buf(),
            use_system_fonts: false,
            allow_download: false,
            ..ResolverConfig::default()
        };
        let resolver = FontResolver::new(config).unwrap();
        let session = Session::new(&resolver);

        let err = session
            .decode_and_describe(b"not a zip")
            .context("Failed to read deck.pptx")
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to read deck.pptx");
        assert!(err
            .root_cause()
            .downcast_ref::<slidemaker_core::Error>()
            .is_some());
    }

    #[test]
    fn test_write_output_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deck.pptx");
        write_output(&path, b"bytes").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"bytes");
    }
}

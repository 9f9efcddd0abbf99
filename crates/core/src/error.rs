//! Error types for deck construction and mutation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a single decode, mutation or encode.
///
/// Font problems are never reported here; they surface as
/// [`Warning`](crate::font::Warning) values next to a successful result.
#[derive(Error, Debug)]
pub enum Error {
    /// The package bytes could not be read as a presentation.
    #[error("Malformed package: {0}")]
    MalformedPackage(String),

    /// An element spec or patch was rejected (bad box, wrong kind, bad shape).
    #[error("Invalid element: {0}")]
    InvalidElement(String),

    /// A slide, element, row, column or series reference does not exist.
    #[error("{what} index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A package identifier was supplied but the package bytes were not.
    #[error("Package '{0}' was referenced without its bytes; resend the latest package")]
    MissingPackageBytes(String),

    /// A model element points at a part that does not exist in the package.
    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    /// Operation arguments could not be understood.
    #[error("Invalid operation arguments: {0}")]
    InvalidArguments(String),

    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// ZIP archive error while writing a package.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML generation error.
    #[error("XML error: {0}")]
    XmlError(String),
}

impl Error {
    /// Shorthand for an out-of-bounds slide reference.
    pub fn slide_out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            what: "slide",
            index,
            len,
        }
    }

    /// Shorthand for an out-of-bounds element reference.
    pub fn element_out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            what: "element",
            index,
            len,
        }
    }
}

//! Error types for folio operations.

use thiserror::Error;

/// Errors that can occur while opening a book or producing its sections.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    /// Navigation entries could not be resolved, even after a recovery sweep.
    #[error("Malformed navigation: {0}")]
    MalformedNavigation(String),

    /// The requested page does not exist once every earlier page is resolved.
    #[error("Page index {index} out of range ({len} pages)")]
    PageIndexOutOfRange { index: usize, len: usize },

    /// A content document lacks `<body>` / `</body>`.
    #[error("Missing <body> in {0}")]
    MissingBody(String),

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! # folio
//!
//! Page-sized, well-formed sections from EPUB books.
//!
//! A book is read through its table of contents. Each entry becomes one
//! section; entries whose text exceeds the configured budget are cut at
//! markup-safe points into several sections, each closing the elements it
//! leaves open and reopening the ones it inherits.
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio::{Config, CssMode, Reader};
//!
//! let config = Config::default()
//!     .with_max_content(4000)
//!     .with_css_mode(CssMode::Omit);
//! let mut reader = Reader::open("book.epub", config)?;
//!
//! let first = reader.section(0)?;
//! println!("{}: {}", first.label, first.content);
//! # Ok::<(), folio::Error>(())
//! ```
//!
//! ## Synthetic books
//!
//! Anything implementing [`EntrySource`] can back a session:
//!
//! ```
//! use folio::{Config, MemorySource, NavPoint, Package, Paginator};
//!
//! let source = MemorySource::new()
//!     .with_entry("ch1.xhtml", "<html><body><p>Hello <b>world</b> and more text here</p></body></html>");
//! let points = vec![NavPoint::new("Chapter 1", "ch1.xhtml")];
//! let mut pages = Paginator::new(Box::new(source), Package::default(), points, Config::default().with_max_content(20));
//!
//! let first = pages.section(0)?;
//! assert!(first.content.contains("<p>Hello <b>world</b> and more</p>"));
//! assert_eq!(pages.len(), 2);
//! # Ok::<(), folio::Error>(())
//! ```

pub mod book;
pub mod config;
pub mod epub;
pub mod error;
pub mod io;
pub mod paginate;
pub mod reader;
pub(crate) mod util;

pub use book::{ManifestItem, Metadata, Package};
pub use config::{Config, CssMode};
pub use error::{Error, Result};
pub use io::{EntrySource, MemorySource, ZipFileSource, ZipMemorySource};
pub use paginate::{CacheStats, EntryKind, NavPoint, Paginator, Section};
pub use reader::Reader;

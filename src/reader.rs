//! Reading sessions over an EPUB archive.

use std::path::Path;

use crate::book::{Metadata, Package};
use crate::config::Config;
use crate::epub::{parse_container_xml, parse_ncx, parse_opf};
use crate::error::{Error, Result};
use crate::io::{EntrySource, ZipFileSource, ZipMemorySource};
use crate::paginate::{CacheStats, NavPoint, Paginator, Section};
use crate::util::{decode_document, parent_dir};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// A reading session: an opened book and a page cursor over it.
///
/// # Example
///
/// ```no_run
/// use folio::{Config, Reader};
///
/// let mut reader = Reader::open("book.epub", Config::default().with_max_content(2000))?;
/// while let Some(section) = reader.next_section()? {
///     println!("{}: {} bytes", section.label, section.content.len());
/// }
/// # Ok::<(), folio::Error>(())
/// ```
pub struct Reader {
    paginator: Paginator,
    position: Option<usize>,
}

impl Reader {
    /// Open an EPUB file on disk.
    ///
    /// The archive is re-opened for every document read; no file handle is
    /// held between calls.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        Self::from_source(Box::new(ZipFileSource::open(path)?), config)
    }

    /// Open an EPUB held in memory.
    pub fn from_bytes(data: Vec<u8>, config: Config) -> Result<Self> {
        Self::from_source(Box::new(ZipMemorySource::new(data)?), config)
    }

    /// Open a book from any entry source.
    pub fn from_source(source: Box<dyn EntrySource>, config: Config) -> Result<Self> {
        let container = match source.read_entry(CONTAINER_PATH) {
            Ok(bytes) => bytes,
            Err(Error::EntryNotFound(_)) => {
                return Err(Error::InvalidEpub(format!("missing {CONTAINER_PATH}")));
            }
            Err(e) => return Err(e),
        };
        let opf_path = parse_container_xml(&container)?;

        let opf = decode_document(&source.read_entry(&opf_path)?);
        let package = parse_opf(&opf, parent_dir(&opf_path))?;
        let points = navigation_points(source.as_ref(), &package)?;

        log::debug!(
            "Opened {:?}: {} navigation entries",
            package.metadata.title,
            points.len()
        );

        Ok(Self {
            paginator: Paginator::new(source, package, points, config),
            position: None,
        })
    }

    /// The section at `index`; moves the cursor there.
    pub fn section(&mut self, index: usize) -> Result<Section> {
        let section = self.paginator.section(index)?;
        self.position = Some(index);
        Ok(section)
    }

    /// The section after the last one returned, or `None` past the end.
    pub fn next_section(&mut self) -> Result<Option<Section>> {
        let next = self.position.map_or(0, |p| p + 1);
        match self.section(next) {
            Ok(section) => Ok(Some(section)),
            Err(Error::PageIndexOutOfRange { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The section before the last one returned, or `None` at the start.
    pub fn previous_section(&mut self) -> Result<Option<Section>> {
        match self.position {
            Some(p) if p > 0 => self.section(p - 1).map(Some),
            _ => Ok(None),
        }
    }

    /// Index of the last section returned.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Raw bytes of the cover image, if the package names one that exists.
    pub fn cover_image(&self) -> Result<Option<Vec<u8>>> {
        let package = self.paginator.package();
        let Some(item) = package.cover_item() else {
            return Ok(None);
        };

        match self.paginator.source().read_entry(&package.resolve(&item.href)) {
            Ok(data) => Ok(Some(data)),
            Err(Error::EntryNotFound(name)) => {
                log::warn!("Cover image {name} not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.paginator.package().metadata
    }

    pub fn package(&self) -> &Package {
        self.paginator.package()
    }

    /// Current navigation length. Grows as long entries are split, and
    /// shrinks as unresolvable ones are dropped.
    pub fn page_count_hint(&self) -> usize {
        self.paginator.len()
    }

    pub fn config(&self) -> &Config {
        self.paginator.config()
    }

    pub fn stats(&self) -> CacheStats {
        self.paginator.stats()
    }
}

/// Navigation entries from the NCX, or one per spine item when there is no
/// usable NCX.
fn navigation_points(source: &dyn EntrySource, package: &Package) -> Result<Vec<NavPoint>> {
    if let Some(href) = &package.ncx_href {
        let path = package.resolve(href);
        match source.read_entry(&path) {
            Ok(bytes) => {
                let points = parse_ncx(&decode_document(&bytes), parent_dir(&path))?;
                if !points.is_empty() {
                    return Ok(points);
                }
                log::warn!("NCX {path} has no entries; using the spine");
            }
            Err(Error::EntryNotFound(_)) => log::warn!("NCX {path} not found; using the spine"),
            Err(e) => return Err(e),
        }
    }

    Ok(package
        .spine
        .iter()
        .filter_map(|id| package.lookup_id(id))
        .map(|item| NavPoint::new(item.href.clone(), package.resolve(&item.href)))
        .collect())
}

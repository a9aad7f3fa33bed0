//! Archive access: named entries and their bytes.

mod entry_source;
mod zip_source;

pub use entry_source::{EntrySource, MemorySource};
pub use zip_source::{ZipFileSource, ZipMemorySource};

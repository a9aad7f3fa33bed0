use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::entry_source::EntrySource;
use crate::error::{Error, Result};

/// A zip archive on disk.
///
/// No handle is kept between calls: every [`read_entry`](EntrySource::read_entry)
/// re-opens the file and its central directory, and both are dropped on
/// every exit path.
#[derive(Debug, Clone)]
pub struct ZipFileSource {
    path: PathBuf,
    names: Vec<String>,
}

impl ZipFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut archive = ZipArchive::new(File::open(&path)?)?;
        let names = list_entries(&mut archive)?;
        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntrySource for ZipFileSource {
    fn entry_names(&self) -> &[String] {
        &self.names
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        read_zip_entry(&mut archive, name)
    }
}

/// A zip archive held in memory.
#[derive(Debug, Clone)]
pub struct ZipMemorySource {
    data: Vec<u8>,
    names: Vec<String>,
}

impl ZipMemorySource {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let names = {
            let mut archive = ZipArchive::new(Cursor::new(data.as_slice()))?;
            list_entries(&mut archive)?
        };
        Ok(Self { data, names })
    }
}

impl EntrySource for ZipMemorySource {
    fn entry_names(&self) -> &[String] {
        &self.names
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(self.data.as_slice()))?;
        read_zip_entry(&mut archive, name)
    }
}

/// File entry names in central-directory order; directories are skipped.
fn list_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if !file.is_dir() {
            names.push(file.name().to_string());
        }
    }
    Ok(names)
}

fn read_zip_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    // Fallback: try percent-decoded path (handles malformed EPUBs)
    let decoded = percent_encoding::percent_decode_str(name)
        .decode_utf8()
        .map_err(|_| Error::EntryNotFound(name.to_string()))?;
    if decoded == name {
        return Err(Error::EntryNotFound(name.to_string()));
    }

    match archive.by_name(&decoded) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            Ok(contents)
        }
        Err(zip::result::ZipError::FileNotFound) => Err(Error::EntryNotFound(name.to_string())),
        Err(e) => Err(e.into()),
    }
}

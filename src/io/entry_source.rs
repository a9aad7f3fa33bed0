use crate::error::{Error, Result};

/// A read-only source of named archive entries.
///
/// Entry names keep the archive's enumeration order; name scans that say
/// "first match wins" rely on it.
pub trait EntrySource: Send + Sync {
    /// All entry names, in archive order.
    fn entry_names(&self) -> &[String];

    /// Reads the full contents of one entry.
    ///
    /// Fails with [`Error::EntryNotFound`] when no entry has that name.
    fn read_entry(&self, name: &str) -> Result<Vec<u8>>;
}

// --- Implementation: In-Memory ---

/// An in-memory entry list, for synthetic books and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    names: Vec<String>,
    data: Vec<Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an entry, keeping first-insertion order.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let name = name.into();
        let data = data.into();
        match self.names.iter().position(|n| *n == name) {
            Some(i) => self.data[i] = data,
            None => {
                self.names.push(name);
                self.data.push(data);
            }
        }
    }

    pub fn with_entry(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }
}

impl EntrySource for MemorySource {
    fn entry_names(&self) -> &[String] {
        &self.names
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.data[i].clone())
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_keeps_insertion_order() {
        let source = MemorySource::new()
            .with_entry("b.xhtml", "b")
            .with_entry("a.xhtml", "a")
            .with_entry("b.xhtml", "b2");

        assert_eq!(source.entry_names(), ["b.xhtml", "a.xhtml"]);
        assert_eq!(source.read_entry("b.xhtml").unwrap(), b"b2");
    }

    #[test]
    fn test_memory_source_missing_entry() {
        let source = MemorySource::new();
        assert!(matches!(
            source.read_entry("nope.xhtml"),
            Err(Error::EntryNotFound(name)) if name == "nope.xhtml"
        ));
    }
}

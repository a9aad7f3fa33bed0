use crate::util::{canonical_name, file_name, resolve_path};

/// Book metadata (Dublin Core + extensions)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub identifier: String,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub date: Option<String>,
    pub rights: Option<String>,
    /// Manifest id of the cover image, if the package names one.
    pub cover_id: Option<String>,
}

/// One `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Href relative to the package document.
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_ref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == property))
    }
}

/// The parsed package document (OPF).
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub metadata: Metadata,
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
    /// Spine item ids, in reading order.
    pub spine: Vec<String>,
    /// Manifest href of the NCX navigation file.
    pub ncx_href: Option<String>,
    /// Directory of the package document inside the archive ("" at the root).
    pub base_dir: String,
}

impl Package {
    /// Manifest item with the given id.
    pub fn lookup_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Archive path of a manifest href.
    pub fn resolve(&self, href: &str) -> String {
        resolve_path(&self.base_dir, href)
    }

    /// Archive path of the manifest item with the given id.
    pub fn resolve_id(&self, id: &str) -> Option<String> {
        self.lookup_id(id).map(|item| self.resolve(&item.href))
    }

    /// Media type of the manifest item that names this archive entry.
    ///
    /// Exact path matches win over file-name matches.
    pub fn media_type_for(&self, entry_name: &str) -> Option<&str> {
        let exact = self
            .manifest
            .iter()
            .find(|item| self.resolve(&item.href) == entry_name);
        let item = exact.or_else(|| {
            let wanted = canonical_name(file_name(entry_name));
            self.manifest
                .iter()
                .find(|item| canonical_name(file_name(&item.href)) == wanted)
        })?;
        (!item.media_type.is_empty()).then_some(item.media_type.as_str())
    }

    /// The cover image's manifest item.
    ///
    /// The EPUB3 `cover-image` property takes priority over the EPUB2
    /// `<meta name="cover">` id.
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.has_property("cover-image"))
            .or_else(|| {
                self.metadata
                    .cover_id
                    .as_deref()
                    .and_then(|id| self.lookup_id(id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, href: &str, media_type: &str) -> ManifestItem {
        ManifestItem {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            properties: None,
        }
    }

    fn package() -> Package {
        Package {
            manifest: vec![
                item("ch1", "text/ch1.xhtml", "application/xhtml+xml"),
                item("img", "images/a b.png", "image/png"),
                item("cover", "images/cover.jpg", "image/jpeg"),
            ],
            base_dir: "OEBPS".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_id() {
        let pkg = package();
        assert_eq!(pkg.resolve_id("ch1").as_deref(), Some("OEBPS/text/ch1.xhtml"));
        assert_eq!(pkg.resolve_id("missing"), None);
    }

    #[test]
    fn test_media_type_for() {
        let pkg = package();
        assert_eq!(
            pkg.media_type_for("OEBPS/text/ch1.xhtml"),
            Some("application/xhtml+xml")
        );
        assert_eq!(pkg.media_type_for("elsewhere/a%20b.png"), Some("image/png"));
        assert_eq!(pkg.media_type_for("OEBPS/nothing.css"), None);
    }

    #[test]
    fn test_cover_item_prefers_property() {
        let mut pkg = package();
        pkg.metadata.cover_id = Some("cover".into());
        assert_eq!(pkg.cover_item().map(|i| i.id.as_str()), Some("cover"));

        pkg.manifest[1].properties = Some("cover-image".into());
        assert_eq!(pkg.cover_item().map(|i| i.id.as_str()), Some("img"));
    }
}

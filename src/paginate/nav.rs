//! Navigation list: an arena of immutable entries plus their reading order.

use std::collections::HashSet;

use crate::util::split_fragment;

/// What a navigation entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "lowercase"))]
pub enum EntryKind {
    /// A whole document.
    Chapter,
    /// A position inside a document, named by a fragment.
    Anchor,
    /// The overflow of a span split by the content budget.
    Continuation,
}

/// One table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub kind: EntryKind,
    /// Manifest id to fall back on when there is no direct reference.
    pub source_id: Option<String>,
    /// Archive path of the target, possibly with a `#fragment`.
    pub content_ref: Option<String>,
    pub label: String,
}

impl NavPoint {
    /// Entry referencing an archive path; anchored if the path has a fragment.
    pub fn new(label: impl Into<String>, content_ref: impl Into<String>) -> Self {
        let content_ref = content_ref.into();
        let kind = match split_fragment(&content_ref).1 {
            Some(_) => EntryKind::Anchor,
            None => EntryKind::Chapter,
        };
        Self {
            kind,
            source_id: None,
            content_ref: Some(content_ref),
            label: label.into(),
        }
    }

    /// Entry referencing a manifest item by id.
    pub fn from_manifest_id(label: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Chapter,
            source_id: Some(id.into()),
            content_ref: None,
            label: label.into(),
        }
    }

    pub(crate) fn continuation(label: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Continuation,
            source_id: None,
            content_ref: None,
            label: label.into(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.kind == EntryKind::Continuation
    }
}

/// Stable identity of an entry, unaffected by insertions, swaps and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// Entries in an append-only arena, read through a mutable order.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    points: Vec<NavPoint>,
    order: Vec<EntryId>,
}

impl Navigation {
    pub fn new(points: Vec<NavPoint>) -> Self {
        let order = (0..points.len()).map(EntryId).collect();
        Self { points, order }
    }

    /// Number of entries currently in reading order.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn id_at(&self, index: usize) -> Option<EntryId> {
        self.order.get(index).copied()
    }

    pub fn point_at(&self, index: usize) -> Option<&NavPoint> {
        self.id_at(index).map(|id| self.get(id))
    }

    pub fn get(&self, id: EntryId) -> &NavPoint {
        &self.points[id.0]
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.order.iter().position(|&e| e == id)
    }

    /// Entries in reading order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &NavPoint)> {
        self.order.iter().map(|&id| (id, self.get(id)))
    }

    /// Insert a new entry right after `index`.
    pub fn insert_after(&mut self, index: usize, point: NavPoint) -> EntryId {
        let id = EntryId(self.points.len());
        self.points.push(point);
        let at = (index + 1).min(self.order.len());
        self.order.insert(at, id);
        id
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.order.swap(a, b);
    }

    /// Drop every marked entry from the reading order in one pass.
    ///
    /// Returns the number of entries removed.
    pub fn remove_marked(&mut self, marked: &HashSet<EntryId>) -> usize {
        let before = self.order.len();
        self.order.retain(|id| !marked.contains(id));
        before - self.order.len()
    }

    pub fn remove_at(&mut self, index: usize) -> Option<EntryId> {
        (index < self.order.len()).then(|| self.order.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav() -> Navigation {
        Navigation::new(vec![
            NavPoint::new("One", "a.xhtml"),
            NavPoint::new("Two", "a.xhtml#two"),
            NavPoint::from_manifest_id("Three", "ch3"),
        ])
    }

    fn labels(nav: &Navigation) -> Vec<&str> {
        nav.iter().map(|(_, p)| p.label.as_str()).collect()
    }

    #[test]
    fn test_kind_from_reference() {
        let nav = nav();
        assert_eq!(nav.point_at(0).unwrap().kind, EntryKind::Chapter);
        assert_eq!(nav.point_at(1).unwrap().kind, EntryKind::Anchor);
        assert_eq!(NavPoint::new("x", "a.xhtml%23frag").kind, EntryKind::Anchor);
        assert_eq!(nav.point_at(2).unwrap().source_id.as_deref(), Some("ch3"));
    }

    #[test]
    fn test_ids_survive_reordering() {
        let mut nav = nav();
        let first = nav.id_at(0).unwrap();
        let third = nav.id_at(2).unwrap();

        let cont = nav.insert_after(0, NavPoint::continuation("One"));
        assert_eq!(labels(&nav), vec!["One", "One", "Two", "Three"]);
        assert_eq!(nav.position(cont), Some(1));
        assert!(nav.get(cont).is_continuation());

        nav.swap(2, 3);
        assert_eq!(labels(&nav), vec!["One", "One", "Three", "Two"]);
        assert_eq!(nav.position(third), Some(2));
        assert_eq!(nav.get(first).label, "One");
    }

    #[test]
    fn test_remove_marked_compacts_in_one_pass() {
        let mut nav = nav();
        let marked: HashSet<_> = [nav.id_at(0).unwrap(), nav.id_at(2).unwrap()].into();

        assert_eq!(nav.remove_marked(&marked), 2);
        assert_eq!(labels(&nav), vec!["Two"]);
        assert_eq!(nav.remove_at(5), None);
        assert!(nav.remove_at(0).is_some());
        assert!(nav.is_empty());
    }
}

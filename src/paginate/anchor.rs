//! Anchor resolution: which slice of a document a navigation entry covers.

use std::collections::HashSet;

use memchr::memmem;

use super::nav::{EntryId, NavPoint, Navigation};
use crate::book::Package;
use crate::error::{Error, Result};
use crate::util::{canonical_name, decode_ref, file_name, split_fragment};

/// The archive document and optional in-document anchor an entry targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub document: String,
    pub fragment: Option<String>,
}

/// Byte span of a document body assigned to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorSpan {
    /// The entry the span belongs to. Recovery and inversion repair can hand
    /// the position over to a different entry than the one requested.
    pub owner: EntryId,
    pub start: usize,
    pub limit: usize,
}

/// Find the archive entry a reference path names.
///
/// An exact match on the whole path wins; otherwise the first entry (in
/// archive order) with the same file name is taken.
pub fn match_document<'a>(names: &'a [String], path: &str) -> Option<&'a str> {
    let wanted = canonical_name(path);
    if let Some(name) = names.iter().find(|n| canonical_name(n) == wanted) {
        return Some(name);
    }

    let wanted = canonical_name(file_name(path));
    names
        .iter()
        .find(|n| canonical_name(file_name(n)) == wanted)
        .map(String::as_str)
}

/// Resolve an entry's target document and fragment.
///
/// Entries without a direct reference go through the manifest by id.
pub fn locate(point: &NavPoint, package: &Package, names: &[String]) -> Option<Target> {
    let reference = match &point.content_ref {
        Some(reference) => reference.clone(),
        None => package.resolve_id(point.source_id.as_deref()?)?,
    };
    let (path, fragment) = split_fragment(&reference);
    let document = match_document(names, path)?.to_string();

    Some(Target {
        document,
        fragment: fragment
            .filter(|f| !f.is_empty())
            .map(|f| decode_ref(f).into_owned()),
    })
}

/// Offset of the `<` opening the tag that carries `id="fragment"`.
pub fn find_anchor(body: &str, fragment: &str) -> Option<usize> {
    let pos = [format!("id=\"{fragment}\""), format!("id='{fragment}'")]
        .iter()
        .find_map(|needle| memmem::find(body.as_bytes(), needle.as_bytes()))?;
    Some(body[..pos].rfind('<').unwrap_or(0))
}

/// Fragment of the entry at `index` when it is a regular entry anchored
/// in `document`.
fn anchored_in<F>(nav: &Navigation, index: usize, document: &str, locate: &F) -> Option<String>
where
    F: Fn(&NavPoint) -> Option<Target>,
{
    let point = nav.point_at(index)?;
    if point.is_continuation() {
        return None;
    }
    let target = locate(point)?;
    if target.document != document {
        return None;
    }
    target.fragment
}

/// Span of the anchored entry at `index`, bounded by the next entry's anchor.
///
/// Inverted anchor pairs are swapped in the list. Entries whose anchors are
/// missing from the body are removed, and later entries of the same document
/// are scanned for a usable replacement.
pub fn anchored_span<F>(
    nav: &mut Navigation,
    index: usize,
    document: &str,
    fragment: &str,
    body: &str,
    locate: F,
) -> Result<AnchorSpan>
where
    F: Fn(&NavPoint) -> Option<Target>,
{
    let current_id = nav.id_at(index).ok_or(Error::PageIndexOutOfRange {
        index,
        len: nav.len(),
    })?;
    let next_fragment = anchored_in(nav, index + 1, document, &locate);
    let current = find_anchor(body, fragment);
    let next = next_fragment.as_deref().and_then(|f| find_anchor(body, f));

    match (current, &next_fragment, next) {
        (Some(start), None, _) => {
            return Ok(AnchorSpan {
                owner: current_id,
                start,
                limit: body.len(),
            });
        }
        (Some(cur), Some(_), Some(nxt)) if cur > nxt => {
            log::warn!("Navigation entries {index} and {} are out of order in {document}; swapping", index + 1);
            nav.swap(index, index + 1);
            let owner = nav.id_at(index).unwrap_or(current_id);
            return Ok(AnchorSpan {
                owner,
                start: nxt,
                limit: cur,
            });
        }
        (Some(start), Some(_), Some(limit)) => {
            return Ok(AnchorSpan {
                owner: current_id,
                start,
                limit,
            });
        }
        _ => {}
    }

    recover(nav, index, document, body, next_fragment.is_some(), (current, next), &locate)
}

/// Recovery sweep for missing anchors.
///
/// Entries are only marked while scanning; the list is compacted once at
/// the end.
fn recover<F>(
    nav: &mut Navigation,
    index: usize,
    document: &str,
    body: &str,
    had_next: bool,
    (current, next): (Option<usize>, Option<usize>),
    locate: &F,
) -> Result<AnchorSpan>
where
    F: Fn(&NavPoint) -> Option<Target>,
{
    let current_id = nav.id_at(index).ok_or(Error::PageIndexOutOfRange {
        index,
        len: nav.len(),
    })?;
    let mut marked: HashSet<EntryId> = HashSet::new();
    let mut found: Option<(EntryId, usize)> = current.map(|offset| (current_id, offset));
    let mut limit: Option<usize> = None;

    if found.is_none() {
        marked.insert(current_id);
    }

    let mut j = index + 1;
    if had_next {
        if let Some(next_id) = nav.id_at(index + 1) {
            match (next, found) {
                (Some(offset), None) => found = Some((next_id, offset)),
                _ => {
                    marked.insert(next_id);
                }
            }
        }
        j = index + 2;
    }

    while limit.is_none() {
        let Some(id) = nav.id_at(j) else {
            break;
        };
        let point = nav.get(id);
        if point.is_continuation() {
            break;
        }
        let Some(target) = locate(point).filter(|t| t.document == document) else {
            break;
        };
        // Un-anchored entries end the sweep.
        let Some(fragment) = target.fragment.as_deref() else {
            break;
        };

        let offset = find_anchor(body, fragment);
        match (offset, found) {
            (Some(offset), None) => found = Some((id, offset)),
            (Some(offset), Some((_, start))) if offset > start => limit = Some(offset),
            _ => {
                marked.insert(id);
            }
        }
        j += 1;
    }

    // Nothing usable: the entry keeps the whole body.
    let (owner, start) = match found {
        Some(found) => found,
        None => {
            marked.remove(&current_id);
            (current_id, 0)
        }
    };

    if marked.len() >= nav.len() {
        return Err(Error::MalformedNavigation(format!(
            "no navigation entry resolves to an anchor in {document}"
        )));
    }

    let removed = nav.remove_marked(&marked);
    if removed > 0 {
        log::warn!("Removed {removed} navigation entries with missing anchors in {document}");
    }

    Ok(AnchorSpan {
        owner,
        start,
        limit: limit.unwrap_or(body.len()),
    })
}

//! Tag index: matched open/close offsets for every element of a document body.

use std::ops::Range;

use memchr::{memchr, memchr2};

/// HTML elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// One element occurrence in a document body.
///
/// Offsets are byte offsets into the body the index was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// Element name, ASCII-lowercased.
    pub name: String,
    /// The opening tag's markup as written (attributes included).
    pub full_tag: String,
    /// Span of the opening tag, `<` through `>` inclusive.
    pub open: Range<usize>,
    /// Span of the closing tag. Equal to `open` for self-closing tags,
    /// `None` when the element is never closed.
    pub close: Option<Range<usize>>,
}

impl TagRecord {
    pub fn is_self_closing(&self) -> bool {
        self.close.as_ref() == Some(&self.open)
    }

    /// True if the element is still open at `offset`.
    ///
    /// Unclosed elements stay open until the end of the document.
    pub fn is_open_at(&self, offset: usize) -> bool {
        match &self.close {
            Some(close) => !self.is_self_closing() && close.start >= offset,
            None => true,
        }
    }
}

/// Which part of an element a markup span belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    Open,
    Close,
    SelfClosing,
}

/// A contiguous run of tag markup in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    pub range: Range<usize>,
    pub kind: MarkupKind,
    /// Index of the owning record in [`TagIndex::records`].
    pub record: usize,
}

/// Ordered tag records of one document body, plus every markup span
/// sorted by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    records: Vec<TagRecord>,
    markup: Vec<Markup>,
}

impl TagIndex {
    /// Index a document body in a single left-to-right scan.
    pub fn build(body: &str) -> Self {
        let bytes = body.as_bytes();
        let mut records: Vec<TagRecord> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut pos = 0;

        while let Some(rel) = memchr(b'<', &bytes[pos..]) {
            let lt = pos + rel;

            // Comments, declarations and processing instructions are skipped whole.
            if let Some(&next) = bytes.get(lt + 1)
                && (next == b'!' || next == b'?')
            {
                pos = skip_special(bytes, lt);
                continue;
            }

            // Find the delimiter ending this tag; a new '<' restarts the scan.
            let Some(end_rel) = memchr2(b'<', b'>', &bytes[lt + 1..]) else {
                break;
            };
            let end = lt + 1 + end_rel;
            if bytes[end] == b'<' {
                pos = end;
                continue;
            }

            let span = lt..end + 1;
            let inner = &body[lt + 1..end];
            pos = end + 1;

            if let Some(rest) = inner.strip_prefix('/') {
                let Some(name) = tag_name(rest) else {
                    continue;
                };
                // Pop the nearest still-open record with this name.
                if let Some(slot) = stack.iter().rposition(|&i| records[i].name == name) {
                    let i = stack.remove(slot);
                    records[i].close = Some(span);
                }
                continue;
            }

            let Some(name) = tag_name(inner) else {
                continue;
            };
            let self_closing = inner.ends_with('/') || VOID_ELEMENTS.contains(&name.as_str());

            records.push(TagRecord {
                name,
                full_tag: body[span.clone()].to_string(),
                close: self_closing.then(|| span.clone()),
                open: span,
            });
            if !self_closing {
                stack.push(records.len() - 1);
            }
        }

        let mut markup = Vec::with_capacity(records.len() * 2);
        for (i, record) in records.iter().enumerate() {
            if record.is_self_closing() {
                markup.push(Markup {
                    range: record.open.clone(),
                    kind: MarkupKind::SelfClosing,
                    record: i,
                });
                continue;
            }
            markup.push(Markup {
                range: record.open.clone(),
                kind: MarkupKind::Open,
                record: i,
            });
            if let Some(close) = &record.close {
                markup.push(Markup {
                    range: close.clone(),
                    kind: MarkupKind::Close,
                    record: i,
                });
            }
        }
        markup.sort_by_key(|m| m.range.start);

        Self { records, markup }
    }

    /// Records ordered by opening offset.
    pub fn records(&self) -> &[TagRecord] {
        &self.records
    }

    /// Markup spans ordered by position.
    pub fn markup(&self) -> &[Markup] {
        &self.markup
    }

    /// The record whose opening tag starts exactly at `offset`.
    pub fn record_at(&self, offset: usize) -> Option<&TagRecord> {
        self.records
            .binary_search_by_key(&offset, |r| r.open.start)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Records whose opening tag starts in `start..end`.
    pub fn records_opened_in(&self, start: usize, end: usize) -> &[TagRecord] {
        let lo = self.records.partition_point(|r| r.open.start < start);
        let hi = self.records.partition_point(|r| r.open.start < end);
        &self.records[lo..hi.max(lo)]
    }

    /// Markup spans starting in `start..end`.
    pub fn markup_in(&self, start: usize, end: usize) -> &[Markup] {
        let lo = self.markup.partition_point(|m| m.range.start < start);
        let hi = self.markup.partition_point(|m| m.range.start < end);
        &self.markup[lo..hi.max(lo)]
    }

    /// Total length of markup starting in `start..end`.
    pub fn markup_len_in(&self, start: usize, end: usize) -> usize {
        self.markup_in(start, end)
            .iter()
            .map(|m| m.range.len())
            .sum()
    }

    /// The markup span strictly containing `offset`, if any.
    ///
    /// An offset on a span's first byte is outside it: cutting there is safe.
    pub fn markup_containing(&self, offset: usize) -> Option<&Markup> {
        let i = self.markup.partition_point(|m| m.range.start < offset);
        let candidate = self.markup.get(i.checked_sub(1)?)?;
        (candidate.range.end > offset).then_some(candidate)
    }
}

/// Lowercased element name at the start of a tag's inner text.
fn tag_name(inner: &str) -> Option<String> {
    let name_len = inner
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .unwrap_or(inner.len());
    let name = &inner[..name_len];
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

/// Offset just past a `<!…>` or `<?…>` construct starting at `lt`.
fn skip_special(bytes: &[u8], lt: usize) -> usize {
    let (terminator, from): (&[u8], usize) = if bytes[lt..].starts_with(b"<!--") {
        (b"-->", lt + 4)
    } else if bytes[lt..].starts_with(b"<![CDATA[") {
        (b"]]>", lt + 9)
    } else {
        (b">", lt + 2)
    };

    memchr::memmem::find(&bytes[from.min(bytes.len())..], terminator)
        .map(|i| from + i + terminator.len())
        .unwrap_or(bytes.len())
}

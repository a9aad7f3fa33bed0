//! Chunk post-processing: tables, images, linked stylesheets and plain text.

use std::collections::HashSet;
use std::ops::Range;

use base64::Engine;
use memchr::{memchr, memmem};

use super::anchor::match_document;
use super::tags::TagIndex;
use crate::book::Package;
use crate::io::EntrySource;
use crate::util::{decode_ref, decode_text, guess_media_type, parent_dir, resolve_path, split_fragment};

// ============================================================================
// Markup Scanning
// ============================================================================

/// Spans of an attribute inside a tag's markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrSpan {
    /// The whole attribute, including the whitespace before its name.
    pub whole: Range<usize>,
    /// The value, without quotes.
    pub value: Range<usize>,
}

/// Locate an attribute (case-insensitive name) in a single tag.
pub(crate) fn attribute_span(tag: &str, key: &str) -> Option<AttrSpan> {
    let bytes = tag.as_bytes();
    let is_delim = |b: u8| b.is_ascii_whitespace() || b == b'>' || b == b'/' || b == b'=';

    let mut pos = 1;
    while pos < bytes.len() && !is_delim(bytes[pos]) {
        pos += 1;
    }

    loop {
        let ws_start = pos;
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] == b'>' {
            return None;
        }

        let name_start = pos;
        while pos < bytes.len() && !is_delim(bytes[pos]) {
            pos += 1;
        }
        let name = &tag[name_start..pos];

        let mut look = pos;
        while look < bytes.len() && bytes[look].is_ascii_whitespace() {
            look += 1;
        }

        let value = if bytes.get(look) == Some(&b'=') {
            look += 1;
            while look < bytes.len() && bytes[look].is_ascii_whitespace() {
                look += 1;
            }
            match bytes.get(look) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let start = look + 1;
                    let end = memchr(quote, &bytes[start..]).map_or(bytes.len(), |i| start + i);
                    pos = (end + 1).min(bytes.len());
                    start..end
                }
                _ => {
                    let start = look;
                    while look < bytes.len() && !bytes[look].is_ascii_whitespace() && bytes[look] != b'>' {
                        look += 1;
                    }
                    pos = look;
                    start..look
                }
            }
        } else {
            pos..pos
        };

        if name.eq_ignore_ascii_case(key) {
            return Some(AttrSpan {
                whole: ws_start..pos,
                value,
            });
        }
        if name.is_empty() {
            pos += 1;
        }
    }
}

/// Value of an attribute in a single tag.
pub(crate) fn attribute<'a>(tag: &'a str, key: &str) -> Option<&'a str> {
    attribute_span(tag, key).map(|span| &tag[span.value])
}

/// Spans of every `<name …>` tag in `html`, in order.
pub(crate) fn find_tags(html: &str, name: &str) -> Vec<Range<usize>> {
    let lower = html.to_ascii_lowercase();
    let needle = format!("<{}", name.to_ascii_lowercase());
    let finder = memmem::Finder::new(needle.as_bytes());
    let bytes = lower.as_bytes();

    let mut tags = Vec::new();
    let mut pos = 0;
    while let Some(rel) = finder.find(&bytes[pos..]) {
        let start = pos + rel;
        let after = start + needle.len();
        pos = after;

        let boundary = bytes
            .get(after)
            .is_none_or(|&b| b.is_ascii_whitespace() || b == b'>' || b == b'/');
        if !boundary {
            continue;
        }
        let Some(end) = memchr(b'>', &bytes[after..]).map(|i| after + i + 1) else {
            break;
        };
        tags.push(start..end);
        pos = end;
    }
    tags
}

/// Spans of every `<name …>…</name>` block, outermost only.
pub(crate) fn find_blocks(html: &str, name: &str) -> Vec<Range<usize>> {
    let lower = html.to_ascii_lowercase();
    let closer = format!("</{}", name.to_ascii_lowercase());
    let opens = find_tags(html, name);

    let mut blocks = Vec::new();
    let mut i = 0;
    while i < opens.len() {
        let open = &opens[i];
        if html[..open.end].ends_with("/>") {
            blocks.push(open.clone());
            i += 1;
            continue;
        }

        // Walk closers, counting nested openings of the same element.
        let mut depth = 1;
        let mut pos = open.end;
        let mut j = i + 1;
        let mut end = None;
        while let Some(rel) = lower[pos..].find(&closer) {
            let close_start = pos + rel;
            while j < opens.len() && opens[j].start < close_start {
                depth += 1;
                j += 1;
            }
            let close_end = memchr(b'>', &lower.as_bytes()[close_start..])
                .map_or(lower.len(), |k| close_start + k + 1);
            depth -= 1;
            pos = close_end;
            if depth == 0 {
                end = Some(close_end);
                break;
            }
        }

        match end {
            Some(end) => {
                blocks.push(open.start..end);
                while j < opens.len() && opens[j].start < end {
                    j += 1;
                }
                i = j;
            }
            None => break,
        }
    }
    blocks
}

/// Replace spans of `html` (sorted, non-overlapping) with computed text.
fn splice<F>(html: &str, spans: &[Range<usize>], mut replace: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    for span in spans {
        out.push_str(&html[pos..span.start]);
        out.push_str(&replace(&html[span.clone()]));
        pos = span.end;
    }
    out.push_str(&html[pos..]);
    out
}

/// Remove every `<…>` run.
pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

// ============================================================================
// Tables and Stylesheets
// ============================================================================

/// Replace every table with its cell text, one line per row.
pub fn flatten_tables(html: &str) -> String {
    splice(html, &find_blocks(html, "table"), flatten_table)
}

fn flatten_table(table: &str) -> String {
    let lower = table.to_ascii_lowercase();
    let rows = find_tags(table, "tr");

    let mut lines = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let row_end = lower[row.end..]
            .find("</tr")
            .map(|k| row.end + k)
            .or_else(|| rows.get(i + 1).map(|next| next.start))
            .unwrap_or(table.len());
        let row_html = &table[row.end..row_end];

        let mut cells: Vec<Range<usize>> = find_tags(row_html, "td");
        cells.extend(find_tags(row_html, "th"));
        cells.sort_by_key(|c| c.start);

        let row_lower = &lower[row.end..row_end];
        let mut line = String::new();
        for cell in &cells {
            let cell_end = [row_lower[cell.end..].find("</td"), row_lower[cell.end..].find("</th")]
                .into_iter()
                .flatten()
                .min()
                .map_or(row_html.len(), |k| cell.end + k);
            line.push_str(&strip_tags(&row_html[cell.end..cell_end]));
        }
        lines.push(line);
    }
    lines.join("<br>")
}

/// True for `<link>` tags that pull in a stylesheet.
pub(crate) fn is_stylesheet_link(tag: &str) -> bool {
    attribute(tag, "rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|r| r.eq_ignore_ascii_case("stylesheet"))
    }) || attribute(tag, "type").is_some_and(|t| t.trim().eq_ignore_ascii_case("text/css"))
}

/// Drop every `<style>` block and stylesheet `<link>`.
pub fn strip_stylesheets(html: &str) -> String {
    let mut spans = find_blocks(html, "style");
    spans.extend(
        find_tags(html, "link")
            .into_iter()
            .filter(|span| is_stylesheet_link(&html[span.clone()])),
    );
    spans.sort_by_key(|s| s.start);
    spans.dedup_by(|b, a| b.start < a.end);
    splice(html, &spans, |_| String::new())
}

// ============================================================================
// Resource Inlining
// ============================================================================

/// References already found to be missing, so repeat lookups skip the archive.
#[derive(Debug, Clone, Default)]
pub struct MissingRefs {
    refs: HashSet<String>,
}

impl MissingRefs {
    pub fn contains(&self, reference: &str) -> bool {
        self.refs.contains(reference)
    }

    /// Record a missing reference; true the first time it is seen.
    pub fn record(&mut self, reference: &str) -> bool {
        self.refs.insert(reference.to_string())
    }

}

/// Where referenced images and stylesheets are looked up.
pub struct Resources<'a> {
    pub source: &'a dyn EntrySource,
    pub package: &'a Package,
    /// Archive path of the document the references appear in.
    pub document: &'a str,
}

impl<'a> Resources<'a> {
    /// Archive path a reference resolves to, relative to the document.
    fn resolve(&self, reference: &str) -> String {
        let (path, _) = split_fragment(reference);
        resolve_path(parent_dir(self.document), &decode_ref(path))
    }

    /// Read a referenced entry, consulting and updating the missing memo.
    fn fetch(&self, reference: &str, missing: &mut MissingRefs) -> Option<(&'a str, Vec<u8>)> {
        let key = self.resolve(reference);
        if missing.contains(&key) {
            return None;
        }

        let found = match_document(self.source.entry_names(), &key)
            .and_then(|name| self.source.read_entry(name).ok().map(|data| (name, data)));
        if found.is_none() && missing.record(&key) {
            log::warn!("Referenced resource {reference:?} not found in {}", self.document);
        }
        found
    }
}

/// Embed every `<img>` as a `data:` URI; images that cannot be found are dropped.
pub fn inline_images(html: &str, resources: &Resources<'_>, missing: &mut MissingRefs) -> String {
    splice(html, &find_tags(html, "img"), |tag| {
        let Some(src) = attribute_span(tag, "src") else {
            return tag.to_string();
        };
        let reference = &tag[src.value.clone()];
        if reference.starts_with("data:") {
            return tag.to_string();
        }

        let Some((name, data)) = resources.fetch(reference, missing) else {
            return String::new();
        };
        let media_type = resources
            .package
            .media_type_for(name)
            .or_else(|| guess_media_type(name, &data))
            .unwrap_or("application/octet-stream");
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);

        format!(
            "{}data:{media_type};base64,{encoded}{}",
            &tag[..src.value.start],
            &tag[src.value.end..]
        )
    })
}

/// Replace stylesheet `<link>` tags with the stylesheet inlined in a `<style>` block.
///
/// Stylesheets that cannot be found keep their tag with the reference removed.
pub fn inline_stylesheets(html: &str, resources: &Resources<'_>, missing: &mut MissingRefs) -> String {
    let links: Vec<_> = find_tags(html, "link")
        .into_iter()
        .filter(|span| is_stylesheet_link(&html[span.clone()]))
        .collect();

    splice(html, &links, |tag| {
        let Some(href) = attribute_span(tag, "href") else {
            return tag.to_string();
        };
        match resources.fetch(&tag[href.value.clone()], missing) {
            Some((_, data)) => {
                format!("<style type=\"text/css\">{}</style>", decode_text(&data, None))
            }
            None => format!("{}{}", &tag[..href.value.start], &tag[href.value.end..]),
        }
    })
}

// ============================================================================
// Plain Text
// ============================================================================

/// Text of `body[start..end]` with the markup of every indexed tag removed.
pub fn text_content(body: &str, index: &TagIndex, start: usize, end: usize) -> String {
    let mut out = String::with_capacity(end.saturating_sub(start));
    let mut pos = start;
    for markup in index.markup_in(start, end) {
        if markup.range.start > pos {
            out.push_str(&body[pos..markup.range.start]);
        }
        pos = pos.max(markup.range.end.min(end));
    }
    if pos < end {
        out.push_str(&body[pos..end]);
    }
    out
}

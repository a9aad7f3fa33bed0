//! Section building: the page cursor over a book's navigation list.

use std::collections::HashMap;
use std::ops::Range;

use super::anchor::{self, AnchorSpan};
use super::closure::{self, OpenTag};
use super::css::dissolve_styles;
use super::nav::{EntryId, NavPoint, Navigation};
use super::post::{self, MissingRefs, Resources};
use super::tags::TagIndex;
use super::trim;
use crate::book::Package;
use crate::config::{Config, CssMode};
use crate::error::{Error, Result};
use crate::io::EntrySource;
use crate::util::{decode_document, file_extension};

/// One page of a book.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Section {
    /// The full document markup with its body replaced by this page's chunk.
    pub content: String,
    /// The chunk's text with all markup removed, when requested.
    pub text_content: Option<String>,
    pub label: String,
    pub file_extension: Option<String>,
    pub media_type: Option<String>,
}

/// Counters for observing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Tag indexes built (one per document at most).
    pub tag_index_builds: usize,
    /// Navigation entries resolved to a span.
    pub resolutions: usize,
    /// Documents read from the archive.
    pub document_reads: usize,
}

/// Label and document facts a span reports in its section.
#[derive(Debug, Clone)]
struct SpanInfo {
    label: String,
    file_extension: Option<String>,
    media_type: Option<String>,
}

#[derive(Debug, Clone)]
struct ResolvedSpan {
    document: String,
    start: usize,
    end: usize,
    /// Elements reopened ahead of the chunk.
    carried: Vec<OpenTag>,
    /// Elements closed after the chunk.
    unclosed: Vec<OpenTag>,
    info: SpanInfo,
}

#[derive(Debug, Clone)]
enum EntryState {
    /// A continuation whose end has not been computed yet.
    Pending {
        document: String,
        start: usize,
        limit: usize,
        carried: Vec<OpenTag>,
        info: SpanInfo,
    },
    Resolved(ResolvedSpan),
}

/// A decoded document and the byte range of its body content.
struct LoadedDocument {
    markup: String,
    body: Range<usize>,
}

impl LoadedDocument {
    fn body(&self) -> &str {
        &self.markup[self.body.clone()]
    }
}

/// Byte range between the last `<body …>` and the last `</body>`.
pub fn body_range(markup: &str) -> Option<Range<usize>> {
    let open = post::find_tags(markup, "body").pop()?;
    let close = markup.to_ascii_lowercase().rfind("</body")?;
    (close >= open.end).then_some(open.end..close)
}

/// Splits a book into budget-sized sections, one navigation entry at a time.
///
/// Resolution mutates the navigation list (continuations are inserted,
/// unresolvable entries removed, inverted anchors swapped), so entries are
/// always resolved in reading order: asking for a page ahead of the cursor
/// resolves every page before it first.
pub struct Paginator {
    source: Box<dyn EntrySource>,
    package: Package,
    config: Config,
    nav: Navigation,
    states: HashMap<EntryId, EntryState>,
    indexes: HashMap<String, TagIndex>,
    missing: MissingRefs,
    cursor: usize,
    stats: CacheStats,
}

impl Paginator {
    pub fn new(
        source: Box<dyn EntrySource>,
        package: Package,
        points: Vec<NavPoint>,
        config: Config,
    ) -> Self {
        Self {
            source,
            package,
            config,
            nav: Navigation::new(points),
            states: HashMap::new(),
            indexes: HashMap::new(),
            missing: MissingRefs::default(),
            cursor: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn source(&self) -> &dyn EntrySource {
        self.source.as_ref()
    }

    /// Current number of entries; grows as oversized spans are split.
    pub fn len(&self) -> usize {
        self.nav.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nav.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Produce the section at `index`.
    pub fn section(&mut self, index: usize) -> Result<Section> {
        while self.cursor < index {
            if self.cursor >= self.nav.len() {
                return Err(Error::PageIndexOutOfRange {
                    index,
                    len: self.nav.len(),
                });
            }
            self.resolve(self.cursor)?;
            self.cursor += 1;
        }

        let id = self.resolve(index)?;
        self.cursor = self.cursor.max(index + 1);
        self.render(id)
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolve the entry at `index`, removing entries whose document is
    /// missing until one resolves or the list runs out.
    fn resolve(&mut self, index: usize) -> Result<EntryId> {
        let mut attempts = self.nav.len() + 1;
        loop {
            let id = self.nav.id_at(index).ok_or(Error::PageIndexOutOfRange {
                index,
                len: self.nav.len(),
            })?;

            match self.states.get(&id) {
                Some(EntryState::Resolved(_)) => return Ok(id),
                Some(EntryState::Pending { .. }) => return self.resolve_continuation(index, id),
                None => {}
            }

            if let Some(id) = self.resolve_entry(index, id)? {
                return Ok(id);
            }

            attempts -= 1;
            if attempts == 0 {
                return Err(Error::MalformedNavigation(
                    "navigation entries keep failing to resolve".into(),
                ));
            }
        }
    }

    /// First-time resolution of a regular entry. `None` if it was removed.
    fn resolve_entry(&mut self, index: usize, id: EntryId) -> Result<Option<EntryId>> {
        let point = self.nav.get(id);
        let Some(target) = anchor::locate(point, &self.package, self.source.entry_names()) else {
            log::warn!(
                "Source document for navigation entry {:?} not found; removing it",
                point.label
            );
            self.nav.remove_at(index);
            return Ok(None);
        };

        let doc = self.load_document(&target.document)?;
        let body = doc.body();

        let package = &self.package;
        let source = &self.source;
        let locate = |p: &NavPoint| anchor::locate(p, package, source.entry_names());

        let span = match target.fragment.as_deref() {
            Some(fragment) => {
                anchor::anchored_span(&mut self.nav, index, &target.document, fragment, body, locate)?
            }
            None => AnchorSpan {
                owner: id,
                start: 0,
                limit: body.len(),
            },
        };

        let position = self.nav.position(span.owner).unwrap_or(index);
        let info = SpanInfo {
            label: self.nav.get(span.owner).label.clone(),
            file_extension: file_extension(&target.document).map(str::to_string),
            media_type: self.package.media_type_for(&target.document).map(str::to_string),
        };

        let mut resolved = ResolvedSpan {
            document: target.document.clone(),
            start: span.start,
            end: span.limit,
            carried: Vec::new(),
            unclosed: Vec::new(),
            info,
        };

        if self.config.is_budgeted() {
            let tags = tag_index(&mut self.indexes, &mut self.stats, &target.document, body);
            let budget = self.config.max_content_per_section;

            if let Some(end) = trim::resolve(body, tags, span.start, Some(span.limit), budget) {
                log::debug!(
                    "Splitting {} at {end} (span {}..{})",
                    target.document,
                    span.start,
                    span.limit
                );
                resolved.end = end;
                resolved.unclosed = closure::opened_but_unclosed(tags, span.start, end);

                let continuation = self
                    .nav
                    .insert_after(position, NavPoint::continuation(resolved.info.label.clone()));
                self.states.insert(
                    continuation,
                    EntryState::Pending {
                        document: target.document,
                        start: end,
                        limit: span.limit,
                        carried: resolved.unclosed.clone(),
                        info: resolved.info.clone(),
                    },
                );
            }
        }

        self.stats.resolutions += 1;
        self.states.insert(span.owner, EntryState::Resolved(resolved));
        Ok(Some(span.owner))
    }

    /// Cut the next chunk of a split span.
    fn resolve_continuation(&mut self, index: usize, id: EntryId) -> Result<EntryId> {
        let Some(EntryState::Pending {
            document,
            start,
            limit,
            carried,
            info,
        }) = self.states.get(&id).cloned()
        else {
            return Ok(id);
        };

        let doc = self.load_document(&document)?;
        let body = doc.body();
        let limit = limit.min(body.len());

        let tags = tag_index(&mut self.indexes, &mut self.stats, &document, body);
        let cut = trim::resolve(body, tags, start, Some(limit), self.config.max_content_per_section);
        let end = cut.unwrap_or(limit);
        let unclosed = closure::carry_forward(tags, &carried, start, end);

        if let Some(end) = cut {
            log::debug!("Splitting {document} at {end} (span {start}..{limit})");
            let continuation = self
                .nav
                .insert_after(index, NavPoint::continuation(info.label.clone()));
            self.states.insert(
                continuation,
                EntryState::Pending {
                    document: document.clone(),
                    start: end,
                    limit,
                    carried: unclosed.clone(),
                    info: info.clone(),
                },
            );
        }

        self.stats.resolutions += 1;
        self.states.insert(
            id,
            EntryState::Resolved(ResolvedSpan {
                document,
                start,
                end,
                carried,
                unclosed,
                info,
            }),
        );
        Ok(id)
    }

    fn load_document(&mut self, name: &str) -> Result<LoadedDocument> {
        let bytes = self.source.read_entry(name)?;
        self.stats.document_reads += 1;

        let markup = decode_document(&bytes);
        let body = body_range(&markup).ok_or_else(|| Error::MissingBody(name.to_string()))?;
        Ok(LoadedDocument { markup, body })
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    fn render(&mut self, id: EntryId) -> Result<Section> {
        let Some(EntryState::Resolved(span)) = self.states.get(&id).cloned() else {
            return Err(Error::MalformedNavigation(
                "navigation entry has no resolved span".into(),
            ));
        };

        let doc = self.load_document(&span.document)?;
        let body = doc.body();
        let end = span.end.min(body.len());
        let start = span.start.min(end);

        let mut chunk = closure::opening_markup(&span.carried);
        chunk.push_str(&body[start..end]);
        chunk.push_str(&closure::closing_markup(&span.unclosed));

        let css_mode = self.config.css_mode;
        if css_mode == CssMode::Omit {
            chunk = post::flatten_tables(&chunk);
        }

        let resources = Resources {
            source: self.source.as_ref(),
            package: &self.package,
            document: &span.document,
        };
        let chunk = post::inline_images(&chunk, &resources, &mut self.missing);

        let content = format!(
            "{}{}{}",
            &doc.markup[..doc.body.start],
            chunk,
            &doc.markup[doc.body.end..]
        );
        let content = match css_mode {
            CssMode::Omit => post::strip_stylesheets(&content),
            CssMode::Keep => post::inline_stylesheets(&content, &resources, &mut self.missing),
            CssMode::Distribute => dissolve_styles(&post::inline_stylesheets(
                &content,
                &resources,
                &mut self.missing,
            )),
        };

        let text_content = self.config.include_text_content.then(|| {
            let index = tag_index(&mut self.indexes, &mut self.stats, &span.document, body);
            post::text_content(body, index, start, end)
        });

        Ok(Section {
            content,
            text_content,
            label: span.info.label,
            file_extension: span.info.file_extension,
            media_type: span.info.media_type,
        })
    }
}

/// The cached tag index of a document, built on first access.
fn tag_index<'a>(
    indexes: &'a mut HashMap<String, TagIndex>,
    stats: &mut CacheStats,
    document: &str,
    body: &str,
) -> &'a TagIndex {
    indexes.entry(document.to_string()).or_insert_with(|| {
        stats.tag_index_builds += 1;
        log::debug!("Indexing tags of {document}");
        TagIndex::build(body)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;
    use proptest::prelude::*;

    fn html(body: &str) -> String {
        format!("<html><head><title>t</title></head><body>{body}</body></html>")
    }

    fn paginator(docs: &[(&str, &str)], points: Vec<NavPoint>, config: Config) -> Paginator {
        let mut source = MemorySource::new();
        for (name, body) in docs {
            source.insert(*name, html(body));
        }
        Paginator::new(Box::new(source), Package::default(), points, config)
    }

    fn chunk(section: &Section) -> &str {
        let start = section.content.find("<body>").unwrap() + "<body>".len();
        let end = section.content.rfind("</body>").unwrap();
        &section.content[start..end]
    }

    /// Every section, in order, until the list runs out.
    fn all_sections(p: &mut Paginator) -> Vec<Section> {
        let mut out = Vec::new();
        let mut i = 0;
        loop {
            match p.section(i) {
                Ok(section) => out.push(section),
                Err(Error::PageIndexOutOfRange { .. }) => return out,
                Err(e) => panic!("unexpected error: {e}"),
            }
            i += 1;
        }
    }

    fn raw_spans(p: &Paginator) -> Vec<(usize, usize)> {
        p.nav
            .iter()
            .filter_map(|(id, _)| match p.states.get(&id) {
                Some(EntryState::Resolved(span)) => Some((span.start, span.end)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_body_range() {
        let markup = "<html><BODY class=\"x\">inner</Body></html>";
        assert_eq!(&markup[body_range(markup).unwrap()], "inner");
        assert_eq!(body_range("<html>no body</html>"), None);
    }

    #[test]
    fn test_short_document_is_not_trimmed() {
        let body = "<p><b>x</b><i>y</i></p>".repeat(10);
        let mut p = paginator(
            &[("a.xhtml", body.as_str())],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_max_content(1_000),
        );

        let section = p.section(0).unwrap();
        assert_eq!(chunk(&section), body);
        assert_eq!(section.label, "A");
        assert_eq!(section.file_extension.as_deref(), Some("xhtml"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_trimmed_chunks_close_and_reopen_tags() {
        let body = "<p>Hello <b>world</b> and more text here</p>";
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_max_content(20),
        );

        let first = p.section(0).unwrap();
        assert_eq!(chunk(&first), "<p>Hello <b>world</b> and more</p>");
        assert_eq!(p.len(), 2);

        let second = p.section(1).unwrap();
        assert_eq!(chunk(&second), "<p> text here</p>");
        assert_eq!(second.label, "A");
        assert!(matches!(
            p.section(2),
            Err(Error::PageIndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_open_bold_is_carried_across_cut() {
        let body = "<p>Hello <b>bold words that keep going on</b> end</p>";
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_max_content(14),
        );

        let sections = all_sections(&mut p);
        assert!(sections.len() > 1);
        assert!(chunk(&sections[0]).ends_with("</p></b>"));
        assert!(chunk(&sections[1]).starts_with("<p><b>"));
    }

    #[test]
    fn test_repeat_requests_hit_the_cache() {
        let body = "<p>one two three four five six seven eight nine ten</p>";
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_max_content(12).with_text_content(true),
        );

        let first = p.section(1).unwrap();
        let stats = p.stats();
        assert_eq!(stats.tag_index_builds, 1);

        let again = p.section(1).unwrap();
        assert_eq!(first, again);
        assert_eq!(p.stats().resolutions, stats.resolutions);
        assert_eq!(p.stats().tag_index_builds, 1);
    }

    #[test]
    fn test_out_of_order_request_resolves_predecessors() {
        let body = "<p>alpha beta gamma delta epsilon zeta eta theta</p>";
        let mut p = paginator(
            &[("a.xhtml", body), ("b.xhtml", "<p>B</p>")],
            vec![NavPoint::new("A", "a.xhtml"), NavPoint::new("B", "b.xhtml")],
            Config::new().with_max_content(16),
        );

        let last = p.len();
        assert_eq!(last, 2);
        let sections = all_sections(&mut p);
        assert!(sections.len() > 2);
        assert_eq!(sections.last().unwrap().label, "B");

        let mut fresh = paginator(
            &[("a.xhtml", body), ("b.xhtml", "<p>B</p>")],
            vec![NavPoint::new("A", "a.xhtml"), NavPoint::new("B", "b.xhtml")],
            Config::new().with_max_content(16),
        );
        let jumped = fresh.section(sections.len() - 1).unwrap();
        assert_eq!(jumped, *sections.last().unwrap());
        assert_eq!(fresh.cursor, sections.len());
    }

    #[test]
    fn test_missing_document_entry_is_removed() {
        let mut p = paginator(
            &[("b.xhtml", "<p>B</p>")],
            vec![NavPoint::new("A", "gone.xhtml"), NavPoint::new("B", "b.xhtml")],
            Config::new(),
        );

        let section = p.section(0).unwrap();
        assert_eq!(section.label, "B");
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_every_entry_missing_is_out_of_range() {
        let mut p = paginator(
            &[("b.xhtml", "<p>B</p>")],
            vec![NavPoint::new("A", "x.xhtml"), NavPoint::new("C", "y.xhtml")],
            Config::new(),
        );
        assert!(matches!(
            p.section(0),
            Err(Error::PageIndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_missing_body_is_an_error() {
        let source = MemorySource::new().with_entry("a.xhtml", "<html>nothing</html>");
        let mut p = Paginator::new(
            Box::new(source),
            Package::default(),
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new(),
        );
        assert!(matches!(p.section(0), Err(Error::MissingBody(name)) if name == "a.xhtml"));
    }

    #[test]
    fn test_anchor_inversion_is_corrected() {
        let body = r#"<h2 id="b">B</h2><p>bee</p><h2 id="a">A</h2><p>ay</p>"#;
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![
                NavPoint::new("Section A", "a.xhtml#a"),
                NavPoint::new("Section B", "a.xhtml#b"),
            ],
            Config::new(),
        );

        let first = p.section(0).unwrap();
        assert_eq!(first.label, "Section B");
        assert_eq!(chunk(&first), r#"<h2 id="b">B</h2><p>bee</p>"#);

        let second = p.section(1).unwrap();
        assert_eq!(second.label, "Section A");
        assert_eq!(chunk(&second), r#"<h2 id="a">A</h2><p>ay</p>"#);
    }

    #[test]
    fn test_chapter_entry_covers_whole_document() {
        let body = r#"<h1>Intro</h1><p>x</p><h2 id="s2">Two</h2><p>y</p>"#;
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("One", "a.xhtml"), NavPoint::new("Two", "a.xhtml#s2")],
            Config::new(),
        );
        assert_eq!(chunk(&p.section(0).unwrap()), body);
        assert_eq!(chunk(&p.section(1).unwrap()), r#"<h2 id="s2">Two</h2><p>y</p>"#);
    }

    #[test]
    fn test_split_anchor_span_stops_at_next_anchor() {
        let body = concat!(
            r#"<h2 id="a">Alpha</h2><p>first words of the alpha part run on</p>"#,
            r#"<h2 id="b">Beta</h2><p>second part</p>"#,
        );
        let a = body.find(r#"<h2 id="a""#).unwrap();
        let b = body.find(r#"<h2 id="b""#).unwrap();
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml#a"), NavPoint::new("B", "a.xhtml#b")],
            Config::new().with_max_content(12),
        );

        let sections = all_sections(&mut p);
        let a_count = sections.iter().take_while(|s| s.label == "A").count();
        assert!(a_count > 1);
        assert!(sections[a_count..].iter().all(|s| s.label == "B"));
        for section in &sections[..a_count] {
            assert!(!chunk(section).contains("Beta"));
            assert!(!chunk(section).contains("second part"));
        }

        let spans = raw_spans(&p);
        assert_eq!(spans.len(), sections.len());
        assert_eq!(spans[0].0, a);
        for pair in spans[..a_count].windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(spans[a_count - 1].1, b);
        assert_eq!(spans[a_count].0, b);
    }

    #[test]
    fn test_tables_are_kept_whole() {
        let body = "<p>intro</p><table><tr><td>aaaa aaaa</td></tr><tr><td>bbbb bbbb</td></tr></table><p>after the table ends</p>";
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_max_content(10),
        );

        let sections = all_sections(&mut p);
        let with_table: Vec<_> = sections
            .iter()
            .filter(|s| chunk(s).contains("<table>"))
            .collect();
        assert_eq!(with_table.len(), 1);
        assert!(chunk(with_table[0]).contains("</table>"));
    }

    #[test]
    fn test_omit_mode_flattens_tables() {
        let body = "<table><tr><td>A</td><td>B</td></tr></table>";
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_css_mode(CssMode::Omit),
        );
        let section = p.section(0).unwrap();
        assert_eq!(chunk(&section), "AB");
    }

    #[test]
    fn test_text_content_excludes_markup() {
        let body = "<p>Hello <b>world</b></p>";
        let mut p = paginator(
            &[("a.xhtml", body)],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new().with_text_content(true),
        );
        let section = p.section(0).unwrap();
        assert_eq!(section.text_content.as_deref(), Some("Hello world"));
        assert_eq!(p.stats().tag_index_builds, 1);
    }

    #[test]
    fn test_unbudgeted_resolution_skips_indexing() {
        let mut p = paginator(
            &[("a.xhtml", "<p>x</p>")],
            vec![NavPoint::new("A", "a.xhtml")],
            Config::new(),
        );
        p.section(0).unwrap();
        assert_eq!(p.stats().tag_index_builds, 0);
    }

    fn balanced(markup: &str, name: &str) -> bool {
        markup.matches(&format!("<{name}>")).count() == markup.matches(&format!("</{name}>")).count()
    }

    fn body_strategy() -> impl Strategy<Value = String> {
        let word = "[a-z]{1,8}";
        let run = prop::collection::vec(word, 1..6).prop_map(|w| w.join(" "));
        let inline = (run, 0..3u8).prop_map(|(text, kind)| match kind {
            0 => text,
            1 => format!("<b>{text}</b>"),
            _ => format!("<i>{text} <b>x</b></i>"),
        });
        let para = prop::collection::vec(inline, 1..5).prop_map(|parts| format!("<p>{}</p>", parts.join(" ")));
        prop::collection::vec(para, 1..6).prop_map(|ps| format!("<div>{}</div>", ps.join("\n")))
    }

    proptest! {
        #[test]
        fn prop_split_is_lossless_and_self_contained(body in body_strategy(), budget in 4usize..40) {
            let mut p = paginator(
                &[("a.xhtml", body.as_str())],
                vec![NavPoint::new("A", "a.xhtml")],
                Config::new().with_max_content(budget),
            );
            let sections = all_sections(&mut p);

            let spans = raw_spans(&p);
            prop_assert_eq!(spans.len(), sections.len());
            let mut joined = String::new();
            let mut expected_start = 0;
            for &(start, end) in &spans {
                prop_assert_eq!(start, expected_start);
                prop_assert!(end > start);
                joined.push_str(&body[start..end]);
                expected_start = end;
            }
            prop_assert_eq!(joined, body.clone());

            for section in &sections {
                let c = chunk(section);
                for name in ["div", "p", "b", "i"] {
                    prop_assert!(balanced(c, name), "unbalanced <{}> in {:?}", name, c);
                }
            }
        }
    }
}

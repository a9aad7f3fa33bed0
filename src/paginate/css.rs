//! Dissolving `<style>` blocks into inline `style` attributes.

use std::collections::BTreeMap;

use cssparser::{
    AtRuleParser, DeclarationParser, ParseError, Parser, ParserInput, QualifiedRuleParser,
    RuleBodyItemParser, RuleBodyParser, StyleSheetParser,
};

use super::post::{attribute_span, find_blocks, find_tags};

/// Simple selectors (`p`, `.note`, `p.note`) mapped to their declarations.
///
/// Ordered, so rewriting is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssMap {
    rules: BTreeMap<String, Vec<String>>,
}

impl CssMap {
    /// Parse a stylesheet, splitting every selector list on `,`, whitespace
    /// and `>` into simple selectors.
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rules: Vec<(String, Vec<String>)> = Vec::new();

        let mut rule_parser = RuleCollector { rules: &mut rules };
        for result in StyleSheetParser::new(&mut parser, &mut rule_parser) {
            // Lenient: skip rules that fail to parse
            let _ = result;
        }

        let mut map = Self::default();
        for (prelude, declarations) in rules {
            for selector in prelude.split([',', '>']).flat_map(str::split_ascii_whitespace) {
                map.rules
                    .entry(selector.to_string())
                    .or_default()
                    .extend(declarations.iter().cloned());
            }
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, selector: &str) -> Option<&[String]> {
        self.rules.get(selector).map(Vec::as_slice)
    }

    /// Rewrite one opening tag, or `None` if no rule applies.
    ///
    /// Class tokens that selected a rule are dropped from `class`.
    fn apply(&self, tag: &str) -> Option<String> {
        let name_len = tag[1..]
            .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
            .map_or(tag.len() - 1, |i| i);
        let name = tag[1..1 + name_len].to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }

        let class_span = attribute_span(tag, "class");
        let classes: Vec<&str> = class_span
            .as_ref()
            .map(|span| tag[span.value.clone()].split_ascii_whitespace().collect())
            .unwrap_or_default();

        let mut declarations: Vec<&str> = Vec::new();
        declarations.extend(self.get(&name).into_iter().flatten().map(String::as_str));

        let mut kept_classes = Vec::new();
        for class in &classes {
            let mut used = false;
            for selector in [format!(".{class}"), format!("{name}.{class}")] {
                if let Some(found) = self.get(&selector) {
                    declarations.extend(found.iter().map(String::as_str));
                    used = true;
                }
            }
            if !used {
                kept_classes.push(*class);
            }
        }

        if declarations.is_empty() {
            return None;
        }
        let style = declarations.join(" ");

        // Edit back to front so earlier spans stay valid.
        let mut out = tag.to_string();
        let style_span = attribute_span(tag, "style");
        let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();

        match &style_span {
            Some(span) => {
                let existing = tag[span.value.clone()].trim();
                let merged = if existing.is_empty() {
                    style.clone()
                } else {
                    format!("{style} {existing}")
                };
                edits.push((span.value.clone(), merged));
            }
            None => {
                let at = 1 + name_len;
                edits.push((at..at, format!(" style=\"{style}\"")));
            }
        }

        if let Some(span) = &class_span
            && kept_classes.len() != classes.len()
        {
            if kept_classes.is_empty() {
                edits.push((span.whole.clone(), String::new()));
            } else {
                edits.push((span.value.clone(), kept_classes.join(" ")));
            }
        }

        edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
        for (range, text) in edits {
            out.replace_range(range, &text);
        }
        Some(out)
    }
}

/// Move every `<style>` block's rules into the matching tags' `style`
/// attributes and remove the blocks.
pub fn dissolve_styles(html: &str) -> String {
    let blocks = find_blocks(html, "style");
    if blocks.is_empty() {
        return html.to_string();
    }

    let mut css = String::new();
    for block in &blocks {
        let text = &html[block.clone()];
        let inner_start = text.find('>').map_or(text.len(), |i| i + 1);
        let inner_end = text
            .to_ascii_lowercase()
            .rfind("</style")
            .unwrap_or(text.len())
            .max(inner_start);
        css.push_str(&text[inner_start..inner_end]);
        css.push('\n');
    }
    let map = CssMap::parse(&css);

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    for block in &blocks {
        out.push_str(&html[pos..block.start]);
        pos = block.end;
    }
    out.push_str(&html[pos..]);

    if map.is_empty() {
        return out;
    }
    apply_to_body(&out, &map)
}

/// Rewrite opening tags inside `<body>`.
fn apply_to_body(html: &str, map: &CssMap) -> String {
    let lower = html.to_ascii_lowercase();
    let body_start = find_tags(html, "body")
        .last()
        .map_or(0, |span| span.end);
    let body_end = lower.rfind("</body").filter(|&e| e >= body_start).unwrap_or(html.len());

    let region = &html[body_start..body_end];
    let index = super::tags::TagIndex::build(region);

    let mut out = String::with_capacity(html.len());
    out.push_str(&html[..body_start]);
    let mut pos = 0;
    for record in index.records() {
        if let Some(rewritten) = map.apply(&record.full_tag) {
            out.push_str(&region[pos..record.open.start]);
            out.push_str(&rewritten);
            pos = record.open.end;
        }
    }
    out.push_str(&region[pos..]);
    out.push_str(&html[body_end..]);
    out
}

// ============================================================================
// cssparser plumbing
// ============================================================================

/// Collects `(selector text, declarations)` pairs from top-level rules.
struct RuleCollector<'a> {
    rules: &'a mut Vec<(String, Vec<String>)>,
}

impl<'i> AtRuleParser<'i> for RuleCollector<'_> {
    type Prelude = ();
    type AtRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        _name: cssparser::CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        // @media, @font-face and friends carry nothing that maps onto a tag
        Err(input.new_custom_error(()))
    }
}

impl<'i> QualifiedRuleParser<'i> for RuleCollector<'_> {
    type Prelude = String;
    type QualifiedRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let start = input.position();
        while input.next().is_ok() {}
        Ok(input.slice_from(start).trim().to_string())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &cssparser::ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let mut declarations = Vec::new();
        let mut decl_parser = DeclarationCollector {
            declarations: &mut declarations,
        };
        for result in RuleBodyParser::new(input, &mut decl_parser) {
            let _ = result;
        }

        if !prelude.is_empty() && !declarations.is_empty() {
            self.rules.push((prelude, declarations));
        }
        Ok(())
    }
}

/// Collects `name: value;` declarations verbatim.
struct DeclarationCollector<'a> {
    declarations: &'a mut Vec<String>,
}

impl<'i> DeclarationParser<'i> for DeclarationCollector<'_> {
    type Declaration = ();
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: cssparser::CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &cssparser::ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let start = input.position();
        while input.next().is_ok() {}
        let value = input.slice_from(start).trim();
        if !value.is_empty() {
            self.declarations.push(format!("{name}: {value};"));
        }
        Ok(())
    }
}

impl<'i> AtRuleParser<'i> for DeclarationCollector<'_> {
    type Prelude = ();
    type AtRule = ();
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationCollector<'_> {
    type Prelude = ();
    type QualifiedRule = ();
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, (), ()> for DeclarationCollector<'_> {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_map_splits_selectors() {
        let map = CssMap::parse("h1, h2 { color: red } div > p.note { margin: 0 } @media print { p { x: y } }");

        assert_eq!(map.get("h1"), Some(&["color: red;".to_string()][..]));
        assert_eq!(map.get("h2"), Some(&["color: red;".to_string()][..]));
        assert_eq!(map.get("div"), Some(&["margin: 0;".to_string()][..]));
        assert_eq!(map.get("p.note"), Some(&["margin: 0;".to_string()][..]));
        assert_eq!(map.get("p"), None);
    }

    #[test]
    fn test_repeated_selectors_merge() {
        let map = CssMap::parse("p { a: 1 } p { b: 2; c: 3 }");
        assert_eq!(map.get("p").map(<[String]>::len), Some(3));
    }

    #[test]
    fn test_apply_adds_style_and_drops_used_class() {
        let map = CssMap::parse("p.note { margin: 0 } .big { font-size: 2em }");

        assert_eq!(
            map.apply(r#"<p class="note keep">"#).as_deref(),
            Some(r#"<p style="margin: 0;" class="keep">"#)
        );
        assert_eq!(
            map.apply(r#"<div class="big" style="color: red">"#).as_deref(),
            Some(r#"<div style="font-size: 2em; color: red">"#)
        );
        assert_eq!(map.apply("<span>"), None);
    }

    #[test]
    fn test_dissolve_styles() {
        let html = concat!(
            "<html><head><style type=\"text/css\">p { margin: 0 }</style></head>",
            "<body><p>one</p><p class=\"x\">two</p></body></html>"
        );
        assert_eq!(
            dissolve_styles(html),
            concat!(
                "<html><head></head>",
                "<body><p style=\"margin: 0;\">one</p><p style=\"margin: 0;\" class=\"x\">two</p></body></html>"
            )
        );
    }

    #[test]
    fn test_dissolve_without_styles_is_identity() {
        let html = "<html><body><p>x</p></body></html>";
        assert_eq!(dissolve_styles(html), html);
    }
}

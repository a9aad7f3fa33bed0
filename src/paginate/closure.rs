//! Closing and reopening markup for elements a cut leaves open.

use std::fmt::Write;

use super::tags::TagIndex;

/// An element left open by a cut, identified by its opening offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTag {
    pub name: String,
    pub offset: usize,
}

/// Elements opened in `start..end` that are still open at `end`,
/// in the order they were opened.
pub fn opened_but_unclosed(index: &TagIndex, start: usize, end: usize) -> Vec<OpenTag> {
    index
        .records_opened_in(start, end)
        .iter()
        .filter(|r| r.is_open_at(end))
        .map(|r| OpenTag {
            name: r.name.clone(),
            offset: r.open.start,
        })
        .collect()
}

/// Elements open at `end` of a chunk that began with `carried` already open.
///
/// Carried elements whose real closing tag lies inside the chunk drop out;
/// the rest stay ahead of the elements the chunk opens itself.
pub fn carry_forward(index: &TagIndex, carried: &[OpenTag], start: usize, end: usize) -> Vec<OpenTag> {
    let still_open = carried.iter().filter(|tag| {
        index
            .record_at(tag.offset)
            .is_none_or(|record| record.is_open_at(end))
    });

    still_open
        .cloned()
        .chain(opened_but_unclosed(index, start, end))
        .collect()
}

/// One closing tag per element, in discovery order.
pub fn closing_markup(tags: &[OpenTag]) -> String {
    tags.iter().fold(String::new(), |mut out, tag| {
        let _ = write!(out, "</{}>", tag.name);
        out
    })
}

/// One bare opening tag per element, in discovery order.
pub fn opening_markup(tags: &[OpenTag]) -> String {
    tags.iter().fold(String::new(), |mut out, tag| {
        let _ = write!(out, "<{}>", tag.name);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tags: &[OpenTag]) -> Vec<&str> {
        tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_opened_but_unclosed() {
        let body = "<div><p>Hello <b>bold</b> <i>italic and more</i></p></div>";
        let index = TagIndex::build(body);
        let cut = body.find("and").unwrap();

        let open = opened_but_unclosed(&index, 0, cut);
        assert_eq!(names(&open), vec!["div", "p", "i"]);
        assert_eq!(open[0].offset, 0);
    }

    #[test]
    fn test_self_closing_and_closed_tags_are_excluded() {
        let body = "<p>a<br/>b<em>c</em>d</p>";
        let index = TagIndex::build(body);
        assert_eq!(names(&opened_but_unclosed(&index, 3, 21)), Vec::<&str>::new());
        assert_eq!(names(&opened_but_unclosed(&index, 0, 21)), vec!["p"]);
    }

    #[test]
    fn test_markup_is_in_discovery_order() {
        let tags = vec![
            OpenTag { name: "div".into(), offset: 0 },
            OpenTag { name: "p".into(), offset: 5 },
        ];
        assert_eq!(closing_markup(&tags), "</div></p>");
        assert_eq!(opening_markup(&tags), "<div><p>");
        assert_eq!(closing_markup(&[]), "");
    }

    #[test]
    fn test_carry_forward_drops_closed_carried_tags() {
        let body = "<div><p>one two</p><p>three four</p></div>";
        let index = TagIndex::build(body);
        let first_cut = body.find("two").unwrap();
        let carried = opened_but_unclosed(&index, 0, first_cut);
        assert_eq!(names(&carried), vec!["div", "p"]);

        let second_cut = body.find("four").unwrap();
        let next = carry_forward(&index, &carried, first_cut, second_cut);
        assert_eq!(names(&next), vec!["div", "p"]);
        assert_eq!(next[1].offset, body.find("<p>three").unwrap());

        let rest = carry_forward(&index, &next, second_cut, body.len());
        assert!(rest.is_empty());
    }
}

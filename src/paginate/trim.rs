//! Trim point resolution: where to cut an oversized span without breaking markup.

use super::tags::{MarkupKind, TagIndex};

/// Resolve the end offset of a chunk starting at `start`.
///
/// `limit` is the end of the span being paginated (`None` for the end of the
/// body). `budget` is measured in bytes of text; markup inside the chunk does
/// not count against it.
///
/// Returns `None` when no trim is needed: the rest of the span fits the
/// budget, or growing the cut to account for markup reaches the limit.
/// Otherwise the returned offset lies strictly between `start` and `limit`,
/// on a `char` boundary, and never inside a tag or a table.
pub fn resolve(
    body: &str,
    index: &TagIndex,
    start: usize,
    limit: Option<usize>,
    budget: usize,
) -> Option<usize> {
    let limit = limit.unwrap_or(body.len()).min(body.len());
    if budget == 0 || start >= limit || limit - start <= budget {
        return None;
    }

    // Grow the cut by the markup it covers until that stops changing.
    let mut candidate = start + budget;
    loop {
        let grown = start + budget + index.markup_len_in(start, candidate);
        if grown >= limit {
            return None;
        }
        if grown == candidate {
            break;
        }
        candidate = grown;
    }

    if let Some(table_end) = crossed_table_end(index, start, candidate) {
        log::debug!("Trim at {candidate} falls inside a table; extending to {table_end}");
        return (table_end < limit).then_some(table_end);
    }

    let end = match index.markup_containing(candidate) {
        Some(markup) => match markup.kind {
            MarkupKind::SelfClosing | MarkupKind::Close => markup.range.end,
            MarkupKind::Open if markup.range.start > start => markup.range.start,
            MarkupKind::Open => markup.range.end,
        },
        None => snap_to_text_boundary(body, start, candidate),
    };

    (end > start && end < limit).then_some(end)
}

/// End of the first table opened in `start..candidate` that closes past it.
fn crossed_table_end(index: &TagIndex, start: usize, candidate: usize) -> Option<usize> {
    index
        .records_opened_in(start, candidate)
        .iter()
        .filter(|r| r.name == "table")
        .find_map(|r| {
            r.close
                .as_ref()
                .filter(|close| close.end > candidate)
                .map(|close| close.end)
        })
}

/// Walk back from `candidate` to whitespace or a tag delimiter.
fn snap_to_text_boundary(body: &str, start: usize, candidate: usize) -> usize {
    let candidate = body.floor_char_boundary(candidate);

    if let Some(c) = body[candidate..].chars().next()
        && (c.is_whitespace() || c == '<')
    {
        if candidate > start {
            return candidate;
        }
    }

    for (i, c) in body[start..candidate].char_indices().rev() {
        let at = start + i;
        match c {
            '>' => return at + 1,
            '<' if at > start => return at,
            '<' => break,
            c if c.is_whitespace() && at > start => return at,
            _ => {}
        }
    }

    // No boundary before the cut: split the word.
    if candidate > start {
        candidate
    } else {
        body.ceil_char_boundary(start + 1)
    }
}

//! Benchmarks for tag indexing, trimming and full-book pagination.
//!
//! Run with: cargo bench

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use folio::paginate::{TagIndex, trim};
use folio::{Config, CssMode, MemorySource, NavPoint, Package, Paginator};

/// A chapter body of `paragraphs` paragraphs with inline markup and a table.
fn sample_body(paragraphs: usize) -> String {
    let mut body = String::from("<div class=\"chapter\">");
    for i in 0..paragraphs {
        body.push_str(&format!(
            "<p class=\"text\">Paragraph {i} has <b>bold</b>, <i>italic <em>nested</em></i> and \
             plain words that run on for a while so the budget has something to cut.</p>\n"
        ));
        if i % 25 == 0 {
            body.push_str("<table><tr><td>a</td><td>b</td></tr><tr><td>c</td><td>d</td></tr></table>\n");
        }
    }
    body.push_str("</div>");
    body
}

fn sample_paginator(chapters: usize, config: Config) -> Paginator {
    let body = sample_body(200);
    let mut source = MemorySource::new();
    let mut points = Vec::new();
    for i in 0..chapters {
        let name = format!("text/ch{i}.xhtml");
        source.insert(
            &name,
            format!(
                "<html><head><style>p.text {{ margin: 0 }}</style></head><body>{body}</body></html>"
            ),
        );
        points.push(NavPoint::new(format!("Chapter {i}"), name));
    }
    Paginator::new(Box::new(source), Package::default(), points, config)
}

fn paginate_all(mut pages: Paginator) -> usize {
    let mut i = 0;
    while pages.section(i).is_ok() {
        i += 1;
    }
    i
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_tag_index(c: &mut Criterion) {
    let body = sample_body(200);

    c.bench_function("tag_index_build", |b| {
        b.iter(|| TagIndex::build(black_box(&body)));
    });
}

fn bench_trim(c: &mut Criterion) {
    let body = sample_body(200);
    let index = TagIndex::build(&body);

    c.bench_function("trim_resolve", |b| {
        b.iter(|| trim::resolve(black_box(&body), &index, 0, None, 2000));
    });
}

// ============================================================================
// Pagination Benchmarks
// ============================================================================

fn bench_paginate_book(c: &mut Criterion) {
    c.bench_function("paginate_book", |b| {
        b.iter(|| {
            let pages = sample_paginator(10, Config::new().with_max_content(2000));
            paginate_all(pages)
        });
    });
}

fn bench_paginate_distribute(c: &mut Criterion) {
    c.bench_function("paginate_book_distribute_css", |b| {
        b.iter(|| {
            let config = Config::new()
                .with_max_content(2000)
                .with_css_mode(CssMode::Distribute)
                .with_text_content(true);
            paginate_all(sample_paginator(10, config))
        });
    });
}

criterion_group!(
    benches,
    // Engine
    bench_tag_index,
    bench_trim,
    // Pagination
    bench_paginate_book,
    bench_paginate_distribute,
);
criterion_main!(benches);

//! Performance benchmarks for the differencing and clustering stages
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tender_autofill::cluster::cluster;
use tender_autofill::diff::diff;
use tender_autofill::{EngineConfig, Page, TextToken};

/// A dense form page: `rows` lines of label words, 14pt apart
fn blank_page(rows: usize) -> Page {
    let mut tokens = Vec::with_capacity(rows * 4);
    for row in 0..rows {
        let y = 40.0 + row as f32 * 14.0;
        for (col, word) in ["Name", "of", "Tenderer:", "...................."]
            .iter()
            .enumerate()
        {
            tokens.push(TextToken {
                text: word.to_string(),
                x: 40.0 + col as f32 * 60.0,
                y,
                width: 50.0,
                height: 11.0,
                font_size: 11.0,
                page_index: 0,
            });
        }
    }
    Page {
        index: 0,
        width: 595.0,
        height: 842.0,
        tokens,
    }
}

/// The blank page with a three-word value on every other row
fn filled_page(blank: &Page) -> Page {
    let mut filled = blank.clone();
    let rows = blank.tokens.len() / 4;
    for row in (0..rows).step_by(2) {
        let y = 40.0 + row as f32 * 14.0;
        for (i, word) in ["Acme", "Constructors", "Ltd"].iter().enumerate() {
            filled.tokens.push(TextToken {
                text: word.to_string(),
                x: 300.0 + i as f32 * 70.0,
                y,
                width: 60.0,
                height: 10.0,
                font_size: 10.0,
                page_index: 0,
            });
        }
    }
    filled
}

fn bench_diff(c: &mut Criterion) {
    let config = EngineConfig::default();
    let mut group = c.benchmark_group("diff");

    for rows in [10usize, 50] {
        let blank = blank_page(rows);
        let filled = filled_page(&blank);
        group.throughput(Throughput::Elements(filled.tokens.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| diff(black_box(&blank), black_box(&filled), &config));
        });
    }

    group.finish();
}

fn bench_diff_and_cluster(c: &mut Criterion) {
    let config = EngineConfig::default();
    let blank = blank_page(50);
    let filled = filled_page(&blank);

    c.bench_function("diff_and_cluster_50_rows", |b| {
        b.iter(|| {
            let insertions = diff(black_box(&blank), black_box(&filled), &config);
            cluster(&insertions, &config)
        });
    });
}

criterion_group!(benches, bench_diff, bench_diff_and_cluster);
criterion_main!(benches);

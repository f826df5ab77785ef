// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the streamed-chunk merge law (I-M1..I-M4).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use codi::types::{Message, Role};

fn chunk(role: Role, text: &str) -> Message {
    let mut message = Message::empty_delta(role);
    message.content = Some(codi::types::Content::Text(text.to_string()));
    message
}

/// Fold `n` tiny content deltas together, as happens once per SSE event
/// while a response streams in.
fn bench_merge_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_merge_chain");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("deltas", n), &n, |b, &n| {
            b.iter(|| {
                let mut acc = Message::empty_delta(Role::Assistant);
                for _ in 0..n {
                    acc = acc.merge(black_box(chunk(Role::Assistant, "a"))).unwrap();
                }
                acc
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge_chain);
criterion_main!(benches);

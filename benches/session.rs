// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for session persistence (C10): whole-file `messages.jsonl`
//! rewrites scale with history length, which is what makes the compaction
//! threshold in `AgentConfig` worth tuning.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use codi::session::{SessionLogger, StatsSnapshot};
use codi::types::{Message, Role};

fn history(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            Message::new(role, format!("message body number {i}"))
        })
        .collect()
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_save");

    for n in [10, 100, 1000] {
        let messages = history(n);

        group.bench_with_input(BenchmarkId::new("messages", n), &messages, |b, messages| {
            let dir = tempfile::tempdir().unwrap();
            let logger = SessionLogger::create(
                dir.path(),
                "bench",
                dir.path().to_path_buf(),
                chrono::Utc::now(),
            )
            .unwrap();

            b.iter(|| {
                logger
                    .save(black_box(messages), StatsSnapshot::default(), None, None, chrono::Utc::now())
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_save);
criterion_main!(benches);

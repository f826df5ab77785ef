// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the agent's in-memory message list and loop detector.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use codi::agent::loop_detection::ToolCallLoopDetector;
use codi::agent::message_list::MessageList;
use codi::types::{Message, Role};

fn bench_message_list_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_list_append");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("messages", n), &n, |b, &n| {
            b.iter(|| {
                let mut list = MessageList::new();
                for i in 0..n {
                    list.append(black_box(Message::new(Role::User, format!("turn {i}"))));
                }
                list.len()
            });
        });
    }

    group.finish();
}

fn bench_loop_detector(c: &mut Criterion) {
    let args = json!({"path": "src/lib.rs", "limit": 10});

    c.bench_function("loop_detector_detect_loop", |b| {
        b.iter(|| {
            let mut detector = ToolCallLoopDetector::with_default_threshold();
            for _ in 0..10 {
                black_box(detector.detect_loop("read_file", &args));
            }
        });
    });
}

criterion_group!(benches, bench_message_list_append, bench_loop_detector);
criterion_main!(benches);

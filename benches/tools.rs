// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the tool registry and approval resolution (C6/C7).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use codi::agent::approval::ApprovalPolicy;

fn policy_with_globs(n: usize) -> ApprovalPolicy {
    let mut policy = ApprovalPolicy::default();
    policy.allowlist = (0..n).map(|i| format!("read_file *.rs{i}")).collect();
    policy.denylist = (0..n).map(|i| format!("bash rm -rf*{i}")).collect();
    policy
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("approval_resolve");

    for size in [1, 10, 50] {
        let policy = policy_with_globs(size);

        group.bench_with_input(BenchmarkId::new("globs", size), &policy, |b, policy| {
            b.iter(|| policy.resolve(black_box("read_file"), black_box("read_file src/lib.rs")))
        });
    }

    group.finish();
}

fn bench_tool_call_normalization(c: &mut Criterion) {
    let args = json!({
        "path": "src/lib.rs",
        "options": {"recursive": true, "limit": 100},
        "tags": ["a", "b", "c"],
    });

    c.bench_function("loop_detection_normalize_args", |b| {
        b.iter(|| codi::agent::loop_detection::normalize_args(black_box(&args)))
    });
}

criterion_group!(benches, bench_resolve, bench_tool_call_normalization);
criterion_main!(benches);

//! Criterion benchmarks for sluice-decay critical operations.
//!
//! Covers: record weight lookup, total weight replay, and checkpoint catch-up.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sluice_core::constants::{COIN, EPOCH_DURATION};
use sluice_core::types::{LockedBalance, RecordId};
use sluice_decay::CheckpointEngine;

const GENESIS: u64 = 2_000 * EPOCH_DURATION;

/// Engine with `n` records ending on staggered weekly boundaries.
fn populated(n: u64) -> CheckpointEngine {
    let mut engine = CheckpointEngine::new(GENESIS, 255);
    for i in 0..n {
        let end = GENESIS + (1 + i % 200) * EPOCH_DURATION;
        let lock = LockedBalance::temporary((i as u128 + 1) * COIN, end);
        engine
            .record_change(RecordId(i + 1), &LockedBalance::EMPTY, &lock, GENESIS)
            .unwrap();
    }
    engine
}

fn bench_weight_at(c: &mut Criterion) {
    let engine = populated(1_000);
    let t = GENESIS + 30 * EPOCH_DURATION + 17;

    c.bench_function("weight_at", |b| {
        b.iter(|| engine.weight_at(black_box(RecordId(500)), black_box(t)))
    });
}

fn bench_total_weight_replay(c: &mut Criterion) {
    let engine = populated(1_000);
    // 100 buckets past the last checkpoint.
    let t = GENESIS + 100 * EPOCH_DURATION - 1;

    c.bench_function("total_weight_replay_100", |b| {
        b.iter(|| engine.total_weight_at(black_box(t)).unwrap())
    });
}

fn bench_checkpoint(c: &mut Criterion) {
    let base = populated(1_000);
    let now = GENESIS + 52 * EPOCH_DURATION;

    c.bench_function("checkpoint_52_weeks", |b| {
        b.iter(|| {
            let mut engine = base.clone();
            engine.checkpoint(black_box(now)).unwrap()
        })
    });
}

criterion_group!(benches, bench_weight_at, bench_total_weight_replay, bench_checkpoint);
criterion_main!(benches);

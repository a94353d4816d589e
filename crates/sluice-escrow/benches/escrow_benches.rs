//! Criterion benchmarks for sluice-escrow entry points.
//!
//! Covers: lock creation and a one-year reward claim.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use sluice_core::bank::{MemoryBank, MemoryResolver};
use sluice_core::config::EscrowConfig;
use sluice_core::constants::{COIN, EPOCH_DURATION};
use sluice_core::types::{AccountId, Asset, RecordId, RewardKind};
use sluice_escrow::Escrow;

const W: u64 = EPOCH_DURATION;
const G: u64 = 1_000 * W;
const KIND: RewardKind = RewardKind(1);

type BenchEscrow = Escrow<MemoryBank, MemoryResolver>;

fn owner(i: u64) -> AccountId {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&i.to_le_bytes());
    AccountId(bytes)
}

/// 100 records and 52 weekly allocations, clock at the last boundary.
fn year_of_rewards() -> (BenchEscrow, RecordId) {
    let distributor = AccountId([0xD0; 32]);
    let cfg = EscrowConfig {
        distributors: vec![distributor],
        ..EscrowConfig::default()
    };
    let mut escrow = Escrow::new(cfg, G, MemoryBank::new(), MemoryResolver::new()).unwrap();
    escrow.bank_mut().credit(Asset::Reward(KIND), distributor, 1_000_000 * COIN);
    for i in 0..100 {
        escrow.bank_mut().credit(Asset::Locked, owner(i), 1_000 * COIN);
        escrow.create_lock(owner(i), (i as u128 + 1) * COIN, 200 * W, G).unwrap();
    }
    for week in 0..52 {
        escrow.notify(distributor, KIND, 1_000 * COIN, G + week * W).unwrap();
    }
    escrow.checkpoint(G + 52 * W).unwrap();
    (escrow, RecordId(50))
}

fn bench_create_lock(c: &mut Criterion) {
    c.bench_function("create_lock", |b| {
        b.iter_batched(
            || {
                let mut escrow: BenchEscrow =
                    Escrow::new(EscrowConfig::default(), G, MemoryBank::new(), MemoryResolver::new()).unwrap();
                escrow.bank_mut().credit(Asset::Locked, owner(1), COIN);
                escrow
            },
            |mut escrow| escrow.create_lock(black_box(owner(1)), COIN, 52 * W, G).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_claim_year(c: &mut Criterion) {
    let (base, id) = year_of_rewards();
    c.bench_function("get_reward_52_epochs", |b| {
        b.iter_batched(
            || base.snapshot(),
            |snap| {
                let mut escrow =
                    Escrow::restore(snap, base.bank().clone(), base.resolver().clone()).unwrap();
                escrow.get_reward(owner(49), black_box(id), &[KIND], G + 52 * W).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_earned_view(c: &mut Criterion) {
    let (escrow, id) = year_of_rewards();
    c.bench_function("earned_52_epochs", |b| {
        b.iter(|| escrow.earned(KIND, black_box(id), G + 52 * W).unwrap())
    });
}

criterion_group!(benches, bench_create_lock, bench_claim_year, bench_earned_view);
criterion_main!(benches);

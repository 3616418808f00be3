//! Criterion benchmarks for tally-core critical operations.
//!
//! Covers: delegation throughput, the kickout cascade, root computation,
//! and committing a populated aggregate.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tally_core::dpos::DposState;
use tally_core::table::MemoryTableStore;
use tally_core::types::Address;

/// Generate `n` deterministic distinct addresses.
fn make_addresses(n: usize) -> Vec<Address> {
    (0..n)
        .map(|i| {
            let hash = blake3::hash(&(i as u64).to_le_bytes());
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&hash.as_bytes()[..20]);
            Address(bytes)
        })
        .collect()
}

/// Aggregate with one candidate and `n` delegators pointing at it.
fn populated_state(n: usize) -> (DposState, Address) {
    let mut state = DposState::new(Arc::new(MemoryTableStore::new()));
    let candidate = Address([0xAA; 20]);
    state.become_candidate(candidate).unwrap();
    for delegator in make_addresses(n) {
        state.delegate(delegator, candidate).unwrap();
    }
    (state, candidate)
}

fn bench_delegate(c: &mut Criterion) {
    let delegators = make_addresses(1_000);
    c.bench_function("delegate_1000", |b| {
        b.iter(|| {
            let mut state = DposState::new(Arc::new(MemoryTableStore::new()));
            let candidate = Address([0xAA; 20]);
            state.become_candidate(candidate).unwrap();
            for delegator in &delegators {
                state.delegate(*delegator, candidate).unwrap();
            }
            black_box(state.root())
        })
    });
}

fn bench_kickout_cascade(c: &mut Criterion) {
    c.bench_function("kickout_1000_delegators", |b| {
        b.iter_with_setup(
            || populated_state(1_000),
            |(mut state, candidate)| {
                state.kickout_candidate(candidate).unwrap();
                black_box(state.root())
            },
        )
    });
}

fn bench_root(c: &mut Criterion) {
    let (state, _) = populated_state(1_000);
    c.bench_function("root_1000_entries", |b| b.iter(|| black_box(state.root())));
}

fn bench_commit(c: &mut Criterion) {
    c.bench_function("commit_1000_entries", |b| {
        b.iter_with_setup(
            || populated_state(1_000).0,
            |mut state| black_box(state.commit_to().unwrap()),
        )
    });
}

criterion_group!(
    benches,
    bench_delegate,
    bench_kickout_cascade,
    bench_root,
    bench_commit
);
criterion_main!(benches);

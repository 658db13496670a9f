use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{
    mine::mine_block_parallel,
    now_millis,
    pow::{mine_block, CancelToken},
    Block, Transaction,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn sample_block() -> Block {
    let mut rng = StdRng::seed_from_u64(42);
    let txs: Vec<Transaction> = (0..10)
        .map(|i| Transaction {
            from: Some(format!("alice-{i}")),
            to: "bob".into(),
            amount: rng.gen_range(1..10),
            timestamp: Some(now_millis()),
        })
        .collect();
    Block::new(1, now_millis(), txs, ledger_core::constants::GENESIS_HASH)
}

fn bench_pow(c: &mut Criterion) {
    let block = sample_block();

    c.bench_function("mine_block_difficulty_4", |b| {
        b.iter(|| {
            let _mined = mine_block(block.clone(), 4, &CancelToken::new());
        });
    });

    c.bench_function("mine_block_parallel_difficulty_4", |b| {
        b.iter(|| {
            let _mined = mine_block_parallel(block.clone(), 4, &CancelToken::new());
        });
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meshflow_workflow::{generate_hanoi_moves, HanoiBenchmark};
use tokio_util::sync::CancellationToken;

fn bench_move_generation(c: &mut Criterion) {
    c.bench_function("generate_hanoi_moves_16", |b| {
        b.iter(|| generate_hanoi_moves(black_box(16)))
    });
}

fn bench_engine_run(c: &mut Criterion) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => panic!("failed to build runtime: {e}"),
    };
    let bench = HanoiBenchmark::in_memory();
    let cancel = CancellationToken::new();

    c.bench_function("run_tower_of_hanoi_10", |b| {
        b.iter(|| rt.block_on(bench.run_tower_of_hanoi(black_box(10), &cancel)))
    });
}

criterion_group!(benches, bench_move_generation, bench_engine_run);
criterion_main!(benches);

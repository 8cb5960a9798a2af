//! Transaction benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entity_index_bench::data_gen::generate_players;
use entity_index_bench::stores::{create_file_index, create_inmemory_index};

fn bench_commit_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Transaction/Commit Size");
    let total = 1_000;
    let players = generate_players(total);
    group.throughput(Throughput::Elements(total as u64));

    for per_commit in [1, 10, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("inmemory", per_commit), per_commit, |b, &per_commit| {
            b.iter_with_setup(
                || create_inmemory_index().unwrap(),
                |ctx| {
                    for chunk in players.chunks(per_commit) {
                        let mut txn = ctx.index().begin_transaction().unwrap();
                        for player in chunk {
                            txn.add(player).unwrap();
                        }
                        txn.commit().unwrap();
                    }
                    black_box(ctx.index().version())
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("file", per_commit), per_commit, |b, &per_commit| {
            b.iter_with_setup(
                || create_file_index(1024).unwrap(),
                |ctx| {
                    for chunk in players.chunks(per_commit) {
                        let mut txn = ctx.index().begin_transaction().unwrap();
                        for player in chunk {
                            txn.add(player).unwrap();
                        }
                        txn.commit().unwrap();
                    }
                    black_box(ctx.index().version())
                },
            );
        });
    }

    group.finish();
}

fn bench_stats_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("Transaction/Update Stats");
    let size = 1_000;
    group.throughput(Throughput::Elements(size as u64));

    let ctx = create_inmemory_index().unwrap();
    let mut txn = ctx.index().begin_transaction().unwrap();
    for player in generate_players(size) {
        txn.add(&player).unwrap();
    }
    txn.commit().unwrap();

    group.bench_function("inmemory", |b| {
        b.iter(|| {
            let mut txn = ctx.index().begin_transaction().unwrap();
            for id in 0..size as i32 {
                txn.update_stats(id, id, id * 2).unwrap();
            }
            txn.commit().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_commit_sizes, bench_stats_updates);
criterion_main!(benches);

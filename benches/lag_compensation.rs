//! Benchmarks for the hot paths of the sync core: history recording and
//! rewind lookups, and per-recipient delta snapshot encoding.
//!
//! Run with: cargo bench --bench lag_compensation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use grimfell_sync_server::combat::history::{LagCompensator, PoseSample};
use grimfell_sync_server::net::baseline::BaselineStore;
use grimfell_sync_server::net::snapshot::{encode_snapshot, EntityState};
use grimfell_sync_server::util::fixed::FixedVec3;
use grimfell_sync_server::util::vec3::Vec3;

fn random_position(rng: &mut impl Rng) -> Vec3 {
    Vec3::new(
        rng.gen_range(-100.0..100.0),
        0.0,
        rng.gen_range(-100.0..100.0),
    )
}

/// A compensator with a full 2-second window for every entity
fn filled_compensator(entities: u32) -> LagCompensator {
    let compensator = LagCompensator::new();
    let mut rng = rand::thread_rng();
    for id in 0..entities {
        let base = random_position(&mut rng);
        for tick in 0..120u32 {
            compensator.record(
                id,
                PoseSample {
                    timestamp_ms: 1000 + tick * 16,
                    position: FixedVec3::from_vec3(base + Vec3::new(0.0, 0.0, tick as f32 * 0.1)),
                    velocity: FixedVec3::ZERO,
                    yaw: 0.0,
                    pitch: 0.0,
                },
            );
        }
    }
    compensator
}

fn random_states(count: u32) -> Vec<EntityState> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|id| EntityState {
            id,
            entity_type: 0,
            position: FixedVec3::from_vec3(random_position(&mut rng)),
            velocity: FixedVec3::from_vec3(Vec3::new(rng.gen_range(-6.0..6.0), 0.0, 0.0)),
            yaw: rng.gen_range(-3.0..3.0),
            pitch: 0.0,
            health_percent: 100,
            anim_state: 0,
        })
        .collect()
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    for count in [16u32, 64, 256] {
        let compensator = filled_compensator(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("sample_all", count), &count, |b, &count| {
            b.iter(|| {
                for id in 0..count {
                    black_box(compensator.sample_at(id, 1900));
                }
            });
        });
    }

    group.bench_function("record_one", |b| {
        let compensator = filled_compensator(1);
        let mut timestamp = 3000u32;
        b.iter(|| {
            timestamp += 16;
            compensator.record(
                0,
                PoseSample {
                    timestamp_ms: timestamp,
                    position: FixedVec3::new(1000, 0, 2000),
                    velocity: FixedVec3::ZERO,
                    yaw: 0.0,
                    pitch: 0.0,
                },
            );
        });
    });

    group.finish();
}

fn bench_snapshot_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for count in [16u32, 64, 256] {
        let states = random_states(count);
        let baseline: FxHashMap<_, _> = states.iter().map(|s| (s.id, *s)).collect();
        // Move a quarter of the entities so the delta has work to do
        let mut current = states.clone();
        for state in current.iter_mut().step_by(4) {
            state.position = FixedVec3::from_vec3(state.position.to_vec3() + Vec3::new(1.0, 0.0, 0.0));
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("encode_delta", count), &count, |b, _| {
            b.iter(|| {
                black_box(encode_snapshot(1000, 997, &current, &baseline, &[]).unwrap());
            });
        });
    }

    // Parallel fan-out across many recipients
    for recipients in [8usize, 32] {
        let states = random_states(64);
        let mut store = BaselineStore::new();
        for _ in 0..recipients {
            store.add_recipient(Uuid::new_v4());
        }

        group.throughput(Throughput::Elements(recipients as u64));
        group.bench_with_input(
            BenchmarkId::new("encode_all_recipients", recipients),
            &recipients,
            |b, _| {
                let mut tick = 0u32;
                b.iter(|| {
                    tick += 3;
                    black_box(store.encode_all(tick, &states));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_history, bench_snapshot_encoding);
criterion_main!(benches);

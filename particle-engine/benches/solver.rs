// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Benchmarks for a full solver frame
//!
//! Measures one `update()` (8 sub-steps) over settled piles of increasing
//! size and over increasing worker counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use particle_engine::{Color, Solver, SolverConfig, Vec2, WorkerPool};

const WORLD: Vec2 = Vec2::new(100.0, 100.0);

// Lay particles out on a loose lattice so the first frames are not explosive
fn populate(solver: &mut Solver<'_>, count: usize) {
    let per_row = 90;
    for i in 0..count {
        let x = 5.0 + (i % per_row) as f32;
        let y = 95.0 - (i / per_row) as f32;
        solver.add_particle_with_color(Vec2::new(x, y), 0.5, Color::WHITE);
    }
}

fn bench_frame_by_particle_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_by_particles");
    let pool = WorkerPool::new(4).unwrap();

    for count in [1_000usize, 4_000, 8_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let config = SolverConfig::new().with_step(1.0 / 60.0);
            let mut solver = Solver::with_config(WORLD, config, &pool).unwrap();
            populate(&mut solver, count);
            b.iter(|| black_box(solver.update()));
        });
    }

    group.finish();
}

fn bench_frame_by_threads(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_by_threads");

    for threads in [1usize, 2, 4, 8] {
        let pool = WorkerPool::new(threads).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            let config = SolverConfig::new().with_step(1.0 / 60.0);
            let mut solver = Solver::with_config(WORLD, config, &pool).unwrap();
            populate(&mut solver, 5_000);
            b.iter(|| black_box(solver.update()));
        });
    }

    group.finish();
}

fn bench_collision_pass(c: &mut Criterion) {
    let pool = WorkerPool::new(4).unwrap();
    let mut solver = Solver::with_config(WORLD, SolverConfig::new().with_gravity(Vec2::ZERO), &pool).unwrap();
    populate(&mut solver, 5_000);

    c.bench_function("resolve_collisions_5000", |b| {
        b.iter(|| black_box(solver.resolve_collisions()));
    });
}

criterion_group!(
    benches,
    bench_frame_by_particle_count,
    bench_frame_by_threads,
    bench_collision_pass
);
criterion_main!(benches);

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
//! Many-particle runs and backend parity
//!
//! These tests drive enough particles to fill cells, cross slice
//! boundaries and exercise every worker on every phase.

use particle_engine::{Color, Executor, Solver, SolverConfig, Vec2, WorkerPool};

const WORLD: Vec2 = Vec2::new(100.0, 100.0);

fn pour<E: Executor>(solver: &mut Solver<'_, E>, frames: usize) {
    for frame in 0..frames {
        if solver.particle_count() < 1500 {
            for i in 0..5 {
                solver.add_particle_with_velocity(
                    Vec2::new(2.0, 10.0 + i as f32 * 2.0),
                    1.0,
                    Color::from_u32(frame as u32),
                    Vec2::new(0.2, 0.0),
                );
            }
        }
        solver.update();
    }
}

fn assert_settled(particles: &[particle_engine::Particle]) {
    for (i, p) in particles.iter().enumerate() {
        assert!(p.pos.is_finite(), "particle {} is not finite", i);
        assert!(
            (0.0..=100.0).contains(&p.pos.x) && (0.0..=100.0).contains(&p.pos.y),
            "particle {} escaped to ({}, {})",
            i,
            p.pos.x,
            p.pos.y
        );
    }
}

#[test]
fn test_pouring_stays_inside_world() {
    for threads in [1, 2, 4] {
        let pool = WorkerPool::new(threads).unwrap();
        let config = SolverConfig::new().with_step(1.0 / 60.0);
        let mut solver = Solver::with_config(WORLD, config, &pool).unwrap();

        pour(&mut solver, 400);

        assert_eq!(solver.particle_count(), 1500);
        assert_settled(solver.particles());
        assert_eq!(solver.last_frame_stats().non_finite, 0);
    }
}

#[test]
fn test_pile_is_mostly_separated() {
    let pool = WorkerPool::new(4).unwrap();
    let mut solver = Solver::with_config(WORLD, SolverConfig::new().with_step(1.0 / 60.0), &pool).unwrap();
    pour(&mut solver, 600);

    let particles = solver.particles();
    let mut deep_overlaps = 0;
    for (i, a) in particles.iter().enumerate() {
        for b in &particles[i + 1..] {
            if (a.pos - b.pos).length() < 0.5 {
                deep_overlaps += 1;
            }
        }
    }
    assert!(
        deep_overlaps < particles.len() / 20,
        "{} pairs overlap by more than half a diameter",
        deep_overlaps
    );
}

#[test]
fn test_colour_tags_survive_simulation() {
    let pool = WorkerPool::new(2).unwrap();
    let mut solver = Solver::with_config(WORLD, SolverConfig::new().with_step(1.0 / 60.0), &pool).unwrap();
    pour(&mut solver, 50);

    for (i, p) in solver.particles().iter().enumerate() {
        assert_eq!(p.color, Color::from_u32((i / 5) as u32));
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_rayon_backend_runs_the_same_pipeline() {
    use particle_engine::RayonExecutor;

    let executor = RayonExecutor::new(3).unwrap();
    let mut solver = Solver::with_config(WORLD, SolverConfig::new().with_step(1.0 / 60.0), &executor).unwrap();
    pour(&mut solver, 300);

    assert_eq!(solver.particle_count(), 1500);
    assert_settled(solver.particles());
}

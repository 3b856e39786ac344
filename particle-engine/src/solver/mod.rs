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
//! Verlet particle solver
//!
//! The solver owns the particle array and advances it one frame per call to
//! [`Solver::update`]. A frame is `substeps` sub-steps; each sub-step runs
//! four phases in order, each one a full barrier on the executor:
//!
//! 1. [`apply_gravity`](Solver::apply_gravity): `acc += gravity`
//! 2. [`apply_boundary_constraint`](Solver::apply_boundary_constraint):
//!    clamp positions into `[margin, size - margin]`
//! 3. [`resolve_collisions`](Solver::resolve_collisions): rebuild the grid,
//!    then push overlapping pairs apart in two checkerboard passes; each
//!    overlapping pair is resolved once per sub-step
//! 4. [`integrate`](Solver::integrate): position Verlet,
//!    `pos' = pos + (pos - pos_prev) + acc * dt²`
//!
//! Per-particle phases split the array into disjoint index ranges. The
//! collision phase instead relies on [`CheckerboardPartition`]: slices
//! solved at the same time never share a column, so no particle is moved by
//! two threads at once and no locks are needed.
//!
//! # Boundary clamp
//!
//! The clamp moves `pos` but not `pos_prev`, so a particle pushed back from a
//! wall keeps the implied velocity that carried it there and the wall absorbs
//! part of that motion on the next sub-step. This damping at the walls is
//! kept on purpose.

mod checkerboard;
mod shared;

pub use checkerboard::{CheckerboardPartition, MIN_SLICE_WIDTH};

use self::shared::SharedParticles;
use crate::config::{self, SolverConfig};
use crate::error::{EngineError, Result};
use crate::executor::Executor;
use crate::grid::CollisionGrid;
use crate::math::Vec2;
use crate::particle::{Color, Particle};
use crate::pool::WorkerPool;
use crate::snapshot;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Particles closer than this to a world edge are left out of the grid
const GRID_BORDER: f32 = 1.0;

/// Diagnostics gathered while advancing one frame
///
/// Counts are summed over all sub-steps of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Sub-steps run
    pub substeps: u32,
    /// Particles skipped by the broad phase because they sat in the border band
    pub excluded: usize,
    /// Grid insertions rejected because the cell was full
    pub dropped_insertions: usize,
    /// Particles skipped because their position was NaN or infinite
    pub non_finite: usize,
}

impl FrameStats {
    fn absorb(&mut self, other: CollisionStats) {
        self.excluded += other.excluded;
        self.dropped_insertions += other.dropped_insertions;
        self.non_finite += other.non_finite;
    }
}

/// Broad-phase counters for one collision pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    /// Particles inserted into the grid
    pub inserted: usize,
    /// Particles in the border band
    pub excluded: usize,
    /// Insertions rejected by full cells
    pub dropped_insertions: usize,
    /// Particles with a non-finite position
    pub non_finite: usize,
}

/// Particle solver running its phases on an [`Executor`]
///
/// # Examples
///
/// ```
/// use particle_engine::{Solver, Vec2, WorkerPool};
///
/// let pool = WorkerPool::new(2).unwrap();
/// let mut solver = Solver::new(Vec2::new(100.0, 100.0), &pool).unwrap();
/// solver.set_step(1.0 / 60.0).unwrap();
///
/// let id = solver.add_particle(Vec2::new(50.0, 50.0), 1.0);
/// solver.update();
/// assert!(solver.particles()[id].pos.y > 50.0);
/// ```
pub struct Solver<'p, E: Executor = WorkerPool> {
    world_size: Vec2,
    particles: Vec<Particle>,
    grid: CollisionGrid,
    config: SolverConfig,
    dt: f32,
    pool: &'p E,
    last_stats: FrameStats,
}

impl<'p, E: Executor> Solver<'p, E> {
    /// Create a solver with the default configuration
    pub fn new(world_size: Vec2, pool: &'p E) -> Result<Self> {
        Self::with_config(world_size, SolverConfig::default(), pool)
    }

    /// Create a solver with an explicit configuration
    ///
    /// Fails if the world does not cover at least one cell on each axis or
    /// if the configuration does not validate.
    pub fn with_config(world_size: Vec2, config: SolverConfig, pool: &'p E) -> Result<Self> {
        if let Err(err) = config.validate() {
            log::warn!("rejecting solver configuration: {}", err);
            return Err(err);
        }
        let mut grid = CollisionGrid::for_world(world_size)?;
        grid.clear();

        log::info!(
            "solver created: world {}x{}, grid {}x{}, {} threads, {} substeps",
            world_size.x,
            world_size.y,
            grid.width(),
            grid.height(),
            pool.thread_count(),
            config.substeps
        );

        Ok(Solver {
            world_size,
            particles: Vec::new(),
            grid,
            dt: config.dt(),
            config,
            pool,
            last_stats: FrameStats::default(),
        })
    }

    /// Set the frame duration in seconds and recompute `dt`
    pub fn set_step(&mut self, seconds: f32) -> Result<()> {
        config::validate_step(seconds)?;
        self.config.step = seconds;
        self.dt = self.config.dt();
        Ok(())
    }

    /// Set the number of sub-steps per frame and recompute `dt`
    pub fn set_substeps(&mut self, count: u32) -> Result<()> {
        config::validate_substeps(count)?;
        self.config.substeps = count;
        self.dt = self.config.dt();
        Ok(())
    }

    /// Frame duration in seconds
    pub fn step(&self) -> f32 {
        self.config.step
    }

    /// Sub-steps per frame
    pub fn substeps(&self) -> u32 {
        self.config.substeps
    }

    /// Duration of one sub-step
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Active configuration
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// World extent
    pub fn world_size(&self) -> Vec2 {
        self.world_size
    }

    /// Collision grid as left by the last sub-step
    pub fn grid(&self) -> &CollisionGrid {
        &self.grid
    }

    /// Read-only view of all particles, indexed by their handle
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Particle with handle `index`
    pub fn particle(&self, index: usize) -> Result<&Particle> {
        self.particles.get(index).ok_or(EngineError::ParticleOutOfBounds {
            index,
            count: self.particles.len(),
        })
    }

    /// Number of particles
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Diagnostics of the last call to [`update`](Self::update)
    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Add a particle at rest and return its handle
    ///
    /// The position is clamped into the world first. Handles are dense and
    /// stay valid for the lifetime of the solver. Nothing is validated here;
    /// use [`try_add_particle`](Self::try_add_particle) to reject NaN
    /// positions and non-positive radii up front.
    pub fn add_particle(&mut self, pos: Vec2, radius: f32) -> usize {
        self.push(Particle::new(pos, radius), Vec2::ZERO)
    }

    /// Add a particle at rest with a colour tag
    pub fn add_particle_with_color(&mut self, pos: Vec2, radius: f32, color: Color) -> usize {
        self.push(Particle::with_color(pos, radius, color), Vec2::ZERO)
    }

    /// Add a particle whose colour follows `polarity`
    pub fn add_particle_with_polarity(&mut self, pos: Vec2, radius: f32, polarity: i32) -> usize {
        self.push(Particle::with_polarity(pos, radius, polarity), Vec2::ZERO)
    }

    /// Add a particle already moving by `displacement` per sub-step
    ///
    /// The previous position is placed at `pos - displacement`, which is how
    /// Verlet encodes an initial velocity.
    pub fn add_particle_with_velocity(
        &mut self,
        pos: Vec2,
        radius: f32,
        color: Color,
        displacement: Vec2,
    ) -> usize {
        self.push(Particle::with_color(pos, radius, color), displacement)
    }

    /// Checked form of [`add_particle_with_velocity`](Self::add_particle_with_velocity)
    ///
    /// Fails without touching the solver if the position or displacement is
    /// not finite or the radius is not a positive finite number.
    pub fn try_add_particle(
        &mut self,
        pos: Vec2,
        radius: f32,
        color: Color,
        displacement: Vec2,
    ) -> Result<usize> {
        let particle = Particle::with_color(pos, radius, color);
        check_particle(&particle, displacement)?;
        Ok(self.push(particle, displacement))
    }

    /// Recolour particles from a snapshot, see [`snapshot::apply_color_tags`]
    pub fn apply_color_tags(&mut self, tags: &[Color]) -> usize {
        snapshot::apply_color_tags(&mut self.particles, tags)
    }

    fn push(&mut self, mut particle: Particle, displacement: Vec2) -> usize {
        if let Err(err) = check_particle(&particle, displacement) {
            log::warn!("adding particle {}: {}", self.particles.len(), err);
        }
        particle.clamp_to(self.world_size, self.config.margin);
        particle.pos_prev = particle.pos - displacement;
        self.particles.push(particle);
        self.particles.len() - 1
    }

    /// Advance one frame
    pub fn update(&mut self) -> FrameStats {
        let mut stats = FrameStats::default();
        for _ in 0..self.config.substeps {
            self.apply_gravity();
            self.apply_boundary_constraint();
            stats.absorb(self.resolve_collisions());
            self.integrate();
            stats.substeps += 1;
        }

        if stats.dropped_insertions > 0 {
            log::debug!(
                "{} grid insertions dropped this frame (full cells)",
                stats.dropped_insertions
            );
        }
        if stats.non_finite > 0 {
            log::warn!(
                "{} particle positions were not finite this frame",
                stats.non_finite
            );
        }

        self.last_stats = stats;
        stats
    }

    fn for_each_particle<F>(&mut self, f: F)
    where
        F: Fn(&mut Particle) + Sync,
    {
        let pool = self.pool;
        let shared = SharedParticles::new(&mut self.particles);
        pool.dispatch(shared.len(), &|start, end| {
            // SAFETY: dispatch hands every task a disjoint range
            let range = unsafe { shared.range_mut(start, end) };
            for particle in range {
                f(particle);
            }
        });
    }

    /// Add gravity to every particle's acceleration
    pub fn apply_gravity(&mut self) {
        let gravity = self.config.gravity;
        self.for_each_particle(|p| p.accelerate(gravity));
    }

    /// Clamp every particle into `[margin, size - margin]`
    pub fn apply_boundary_constraint(&mut self) {
        let size = self.world_size;
        let margin = self.config.margin;
        self.for_each_particle(|p| p.clamp_to(size, margin));
    }

    /// Advance every particle by one Verlet step of `dt`
    pub fn integrate(&mut self) {
        let dt = self.dt;
        self.for_each_particle(|p| p.integrate(dt));
    }

    /// Rebuild the grid and push overlapping particles apart
    pub fn resolve_collisions(&mut self) -> CollisionStats {
        let stats = self.rebuild_grid();
        self.solve_checkerboard();
        stats
    }

    fn rebuild_grid(&mut self) -> CollisionStats {
        self.grid.clear();

        let grid = &self.grid;
        let particles = &self.particles[..];
        let (lo, hi) = (
            Vec2::new(GRID_BORDER, GRID_BORDER),
            self.world_size - Vec2::new(GRID_BORDER, GRID_BORDER),
        );
        let inserted = AtomicUsize::new(0);
        let excluded = AtomicUsize::new(0);
        let non_finite = AtomicUsize::new(0);

        self.pool.dispatch(particles.len(), &|start, end| {
            let (mut ins, mut exc, mut nan) = (0, 0, 0);
            for (offset, p) in particles[start..end].iter().enumerate() {
                if !p.pos.is_finite() {
                    nan += 1;
                    continue;
                }
                let inside = p.pos.x > lo.x && p.pos.x < hi.x && p.pos.y > lo.y && p.pos.y < hi.y;
                let cell = if inside { grid.cell_of(p.pos) } else { None };
                match cell {
                    Some((x, y)) => {
                        let stored = grid.insert(x, y, start + offset);
                        debug_assert!(stored.is_ok(), "cell_of returned a cell outside the grid");
                        if matches!(stored, Ok(true)) {
                            ins += 1;
                        }
                    }
                    None => exc += 1,
                }
            }
            inserted.fetch_add(ins, Ordering::Relaxed);
            excluded.fetch_add(exc, Ordering::Relaxed);
            non_finite.fetch_add(nan, Ordering::Relaxed);
        });

        CollisionStats {
            inserted: inserted.into_inner(),
            excluded: excluded.into_inner(),
            dropped_insertions: self.grid.dropped(),
            non_finite: non_finite.into_inner(),
        }
    }

    fn solve_checkerboard(&mut self) {
        let pool = self.pool;
        let grid = &self.grid;
        let partition = CheckerboardPartition::new(grid.width(), pool.thread_count());
        let contact = Contact {
            distance: self.config.contact_distance,
            friction: self.config.friction,
        };
        let particles = SharedParticles::new(&mut self.particles);

        for parity in 0..2 {
            pool.dispatch(partition.pass_len(parity), &|start, end| {
                for task in start..end {
                    let slice = partition.pass_slice(parity, task);
                    for x in partition.slice(slice) {
                        for y in 0..grid.height() {
                            solve_cell(grid, &particles, x, y, contact);
                        }
                    }
                }
            });
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    distance: f32,
    friction: f32,
}

/// Resolve every pair with at least one particle in cell `(x, y)`
///
/// Pairs inside the cell are taken in slot order and pairs reaching into
/// other cells use the forward half of the stencil, so across a full scan
/// each unordered pair is resolved exactly once.
fn solve_cell(grid: &CollisionGrid, particles: &SharedParticles<'_>, x: usize, y: usize, contact: Contact) {
    let Ok(bucket) = grid.bucket(x, y) else {
        return;
    };
    for (slot, a) in bucket.occupants().enumerate() {
        for b in bucket.occupants().skip(slot + 1) {
            solve_pair(particles, a, b, contact);
        }
        for neighbor in grid.forward_neighborhood(x, y) {
            for b in neighbor.occupants() {
                solve_pair(particles, a, b, contact);
            }
        }
    }
}

fn check_particle(particle: &Particle, displacement: Vec2) -> Result<()> {
    if !particle.pos.is_finite() {
        return Err(EngineError::InvalidParticle(format!(
            "position {:?} is not finite",
            particle.pos
        )));
    }
    if !displacement.is_finite() {
        return Err(EngineError::InvalidParticle(format!(
            "displacement {:?} is not finite",
            displacement
        )));
    }
    if !(particle.radius.is_finite() && particle.radius > 0.0) {
        return Err(EngineError::InvalidParticle(format!(
            "radius {} must be positive and finite",
            particle.radius
        )));
    }
    Ok(())
}

fn solve_pair(particles: &SharedParticles<'_>, a: usize, b: usize, contact: Contact) {
    if a == b {
        return;
    }
    // SAFETY: `a` sits in a column owned by the current slice and `b` in the
    // same column or the next one, which no concurrently running slice
    // touches.
    let (p1, p2) = unsafe { particles.pair_mut(a, b) };
    push_apart(p1, p2, contact);
}

/// Separate two overlapping particles along their centre line
///
/// Each particle moves by `0.5 * friction * (distance - d)`. Coincident
/// centres have no defined normal and are left alone.
fn push_apart(p1: &mut Particle, p2: &mut Particle, contact: Contact) {
    let delta = p1.pos - p2.pos;
    let dist_sq = delta.length_squared();
    if dist_sq < contact.distance * contact.distance {
        let dist = dist_sq.sqrt();
        if dist != 0.0 {
            let normal = delta / dist;
            let push = 0.5 * contact.friction * (contact.distance - dist);
            p1.pos += normal * push;
            p2.pos -= normal * push;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> SolverConfig {
        SolverConfig::new().with_gravity(Vec2::ZERO)
    }

    #[test]
    fn test_push_apart_is_symmetric() {
        let mut a = Particle::new(Vec2::new(10.0, 10.0), 0.5);
        let mut b = Particle::new(Vec2::new(10.6, 10.0), 0.5);
        push_apart(&mut a, &mut b, Contact { distance: 1.0, friction: 1.0 });

        assert!((a.pos.x - 9.8).abs() < 1e-5);
        assert!((b.pos.x - 10.8).abs() < 1e-5);
        assert!(((b.pos - a.pos).length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_push_apart_ignores_separated_and_coincident() {
        let contact = Contact { distance: 1.0, friction: 1.0 };
        let mut a = Particle::new(Vec2::new(0.0, 0.0), 0.5);
        let mut b = Particle::new(Vec2::new(1.0, 0.0), 0.5);
        push_apart(&mut a, &mut b, contact);
        assert_eq!(a.pos, Vec2::new(0.0, 0.0));
        assert_eq!(b.pos, Vec2::new(1.0, 0.0));

        let mut c = Particle::new(Vec2::new(5.0, 5.0), 0.5);
        let mut d = c;
        push_apart(&mut c, &mut d, contact);
        assert_eq!(c.pos, d.pos);
    }

    #[test]
    fn test_add_particle_clamps_and_rests() {
        let pool = WorkerPool::new(1).unwrap();
        let mut solver = Solver::new(Vec2::new(20.0, 20.0), &pool).unwrap();
        let id = solver.add_particle(Vec2::new(-3.0, 50.0), 1.0);
        let p = solver.particle(id).unwrap();
        assert_eq!(p.pos, Vec2::new(2.0, 18.0));
        assert_eq!(p.pos_prev, p.pos);
        assert_eq!(p.color, Color::BLUE);
        assert!(solver.particle(id + 1).is_err());
    }

    #[test]
    fn test_add_particle_with_velocity() {
        let pool = WorkerPool::new(1).unwrap();
        let mut solver = Solver::with_config(Vec2::new(20.0, 20.0), calm(), &pool).unwrap();
        solver.set_step(1.0 / 60.0).unwrap();
        solver.set_substeps(1).unwrap();
        let id = solver.add_particle_with_velocity(
            Vec2::new(5.0, 5.0),
            1.0,
            Color::WHITE,
            Vec2::new(0.2, 0.0),
        );
        let d = solver.particles()[id].displacement();
        assert!((d.x - 0.2).abs() < 1e-6);
        assert_eq!(d.y, 0.0);

        solver.update();
        assert!((solver.particles()[id].pos.x - 5.2).abs() < 1e-5);
    }

    #[test]
    fn test_try_add_particle_rejects_invalid_input() {
        let pool = WorkerPool::new(1).unwrap();
        let mut solver = Solver::with_config(Vec2::new(20.0, 20.0), calm(), &pool).unwrap();
        let nan = Vec2::new(f32::NAN, 5.0);
        let here = Vec2::new(5.0, 5.0);

        assert!(matches!(
            solver.try_add_particle(nan, 1.0, Color::BLUE, Vec2::ZERO),
            Err(EngineError::InvalidParticle(_))
        ));
        assert!(solver.try_add_particle(here, 0.0, Color::BLUE, Vec2::ZERO).is_err());
        assert!(solver.try_add_particle(here, -1.0, Color::BLUE, Vec2::ZERO).is_err());
        assert!(solver.try_add_particle(here, f32::INFINITY, Color::BLUE, Vec2::ZERO).is_err());
        assert!(solver
            .try_add_particle(here, 1.0, Color::BLUE, Vec2::new(0.0, f32::INFINITY))
            .is_err());
        assert_eq!(solver.particle_count(), 0);

        let id = solver
            .try_add_particle(here, 1.0, Color::RED, Vec2::new(0.25, 0.0))
            .unwrap();
        assert_eq!(id, 0);
        let p = solver.particle(id).unwrap();
        assert_eq!(p.color, Color::RED);
        assert!((p.displacement().x - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_each_pair_in_a_cell_is_solved_once() {
        let pool = WorkerPool::new(1).unwrap();
        let config = calm().with_friction(0.5);
        let mut solver = Solver::with_config(Vec2::new(20.0, 20.0), config, &pool).unwrap();
        let a = solver.add_particle(Vec2::new(10.1, 10.5), 0.5);
        let b = solver.add_particle(Vec2::new(10.9, 10.5), 0.5);

        solver.resolve_collisions();

        let gap = solver.particles()[b].pos.x - solver.particles()[a].pos.x;
        // half of the 0.2 overlap is removed, once
        assert!((gap - 0.9).abs() < 1e-5, "gap was {}", gap);
    }

    #[test]
    fn test_step_and_substeps_recompute_dt() {
        let pool = WorkerPool::new(1).unwrap();
        let mut solver = Solver::new(Vec2::new(10.0, 10.0), &pool).unwrap();
        assert_eq!(solver.dt(), 0.0);
        solver.set_step(0.16).unwrap();
        assert!((solver.dt() - 0.02).abs() < 1e-7);
        solver.set_substeps(4).unwrap();
        assert!((solver.dt() - 0.04).abs() < 1e-7);
        assert!(solver.set_substeps(0).is_err());
        assert!(solver.set_step(f32::NAN).is_err());
        assert!((solver.dt() - 0.04).abs() < 1e-7);
    }

    #[test]
    fn test_rejects_invalid_world() {
        let pool = WorkerPool::new(1).unwrap();
        assert!(Solver::new(Vec2::new(0.0, 10.0), &pool).is_err());
        assert!(Solver::new(Vec2::new(10.0, -1.0), &pool).is_err());
        assert!(Solver::with_config(Vec2::new(10.0, 10.0), calm().with_substeps(0), &pool).is_err());
    }

    #[test]
    fn test_rebuild_counts_border_and_nan() {
        let pool = WorkerPool::new(2).unwrap();
        let mut solver = Solver::with_config(Vec2::new(10.0, 10.0), calm().with_margin(0.0), &pool).unwrap();
        solver.add_particle(Vec2::new(5.5, 5.5), 0.5);
        solver.add_particle(Vec2::new(0.5, 5.5), 0.5);
        let bad = solver.add_particle(Vec2::new(3.0, 3.0), 0.5);
        solver.particles[bad].pos = Vec2::new(f32::NAN, 3.0);

        let stats = solver.resolve_collisions();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.non_finite, 1);
        assert!(solver.grid().bucket(5, 5).unwrap().contains(0));
    }

    #[test]
    fn test_full_cells_report_dropped_insertions() {
        let pool = WorkerPool::new(2).unwrap();
        let mut solver = Solver::with_config(Vec2::new(10.0, 10.0), calm(), &pool).unwrap();
        for i in 0..6 {
            solver.add_particle(Vec2::new(5.1 + 0.1 * i as f32, 5.5), 0.5);
        }
        let stats = solver.resolve_collisions();
        assert_eq!(stats.inserted, 4);
        assert_eq!(stats.dropped_insertions, 2);
    }

    #[test]
    fn test_update_reports_frame_stats() {
        let pool = WorkerPool::new(2).unwrap();
        let mut solver = Solver::with_config(Vec2::new(10.0, 10.0), calm().with_substeps(3), &pool).unwrap();
        solver.add_particle(Vec2::new(5.0, 5.0), 0.5);
        let stats = solver.update();
        assert_eq!(stats.substeps, 3);
        assert_eq!(stats.excluded, 0);
        assert_eq!(solver.last_frame_stats(), stats);
    }
}

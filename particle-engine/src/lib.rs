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
//! # Particle Engine
//!
//! A real-time 2D particle engine: circular bodies advanced with position
//! Verlet integration, colliding through a spatial-hash broad phase, and
//! stepped in parallel on a fixed worker pool.
//!
//! ## Features
//!
//! - **Verlet dynamics**: implicit velocity from current and previous position
//! - **Spatial hashing**: unit cells with fixed-capacity buckets and a 3×3
//!   neighbour search
//! - **Lock-free collisions**: checkerboard column slices solved in two
//!   parallel passes
//! - **Worker pool**: blocking range dispatch with condition-variable
//!   barriers; an optional Rayon backend behind the `parallel` feature
//!
//! ## Example
//!
//! ```rust
//! use particle_engine::{Solver, SolverConfig, Vec2, WorkerPool};
//!
//! let pool = WorkerPool::new(2).unwrap();
//! let config = SolverConfig::new().with_step(1.0 / 60.0);
//! let mut solver = Solver::with_config(Vec2::new(100.0, 100.0), config, &pool).unwrap();
//!
//! for i in 0..10 {
//!     solver.add_particle(Vec2::new(10.0 + i as f32 * 2.0, 10.0), 1.0);
//! }
//! solver.update();
//! assert_eq!(solver.particles().len(), 10);
//! ```

#![warn(missing_docs)]

/// Error types
pub mod error;

/// Vector math
pub mod math;

/// Particles and colour tags
pub mod particle;

/// Solver configuration
pub mod config;

/// Worker thread pool
pub mod pool;

/// Parallel-for backends
pub mod executor;

/// Spatial-hash collision grid
pub mod grid;

/// Verlet solver
pub mod solver;

/// Colour snapshot files
pub mod snapshot;

pub use config::SolverConfig;
pub use error::{EngineError, Result};
pub use executor::Executor;
#[cfg(feature = "parallel")]
pub use executor::RayonExecutor;
pub use grid::CollisionGrid;
pub use math::Vec2;
pub use particle::{Color, Particle};
pub use pool::{PoolConfig, WorkerPool};
pub use solver::{FrameStats, Solver};

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
//! Error types for engine construction and grid access

use thiserror::Error;

/// Errors reported by the engine
///
/// Configuration errors are raised at construction time so that an
/// unusable engine is never produced. Grid errors replace what would
/// otherwise be unchecked out-of-range bucket access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A worker pool needs at least one thread
    #[error("worker pool requires at least one thread")]
    ZeroThreads,

    /// The operating system refused to spawn a worker thread
    #[error("failed to spawn worker thread {index}: {reason}")]
    ThreadSpawn {
        /// Index of the worker that failed to start
        index: usize,
        /// Message from the underlying I/O error
        reason: String,
    },

    /// World dimensions must be finite and cover at least one cell per axis
    #[error("invalid world size {width} x {height}: both axes must be finite and >= 1")]
    InvalidWorldSize {
        /// Requested width
        width: f32,
        /// Requested height
        height: f32,
    },

    /// A solver parameter failed validation
    #[error("invalid solver parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Grid coordinates outside `[0, width) x [0, height)`
    #[error("cell ({x}, {y}) is outside the {width} x {height} grid")]
    CellOutOfRange {
        /// Column requested
        x: usize,
        /// Row requested
        y: usize,
        /// Grid width in cells
        width: usize,
        /// Grid height in cells
        height: usize,
    },

    /// A particle rejected by a checked insertion
    #[error("invalid particle: {0}")]
    InvalidParticle(String),

    /// A particle handle that was never issued by the solver
    #[error("particle index {index} out of bounds (count: {count})")]
    ParticleOutOfBounds {
        /// Index requested
        index: usize,
        /// Number of particles in the solver
        count: usize,
    },

    /// Reading or writing a colour snapshot failed
    #[error("colour snapshot error: {0}")]
    Snapshot(String),
}

impl EngineError {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Snapshot(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;

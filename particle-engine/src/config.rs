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
//! Solver configuration
//!
//! Every physical constant the solver uses lives here instead of in private
//! fields, so hosts can tune gravity, the push-apart strength or the wall
//! margin at construction time.

use crate::error::{EngineError, Result};
use crate::math::Vec2;

/// Default gravity in world units per second squared (y grows downward)
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, 20.0);

/// Default distance kept between particle centres and the world edges
pub const DEFAULT_MARGIN: f32 = 2.0;

/// Default centre distance below which two particles are pushed apart
pub const DEFAULT_CONTACT_DISTANCE: f32 = 1.0;

/// Default number of sub-steps per frame
pub const DEFAULT_SUBSTEPS: u32 = 8;

/// Physical constants and time stepping for a [`Solver`](crate::Solver)
///
/// # Examples
///
/// ```
/// use particle_engine::{SolverConfig, Vec2};
///
/// let config = SolverConfig::new()
///     .with_gravity(Vec2::new(0.0, 9.81))
///     .with_substeps(4)
///     .with_step(1.0 / 60.0);
/// assert!(config.validate().is_ok());
/// assert!((config.dt() - 1.0 / 240.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Constant acceleration applied to every particle each sub-step
    pub gravity: Vec2,
    /// Scale of the positional correction applied to overlapping pairs
    pub friction: f32,
    /// Distance kept from each world edge by the boundary clamp
    pub margin: f32,
    /// Centre distance below which two particles are in contact
    pub contact_distance: f32,
    /// Sub-steps per call to `update`
    pub substeps: u32,
    /// Frame duration in seconds
    pub step: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            gravity: DEFAULT_GRAVITY,
            friction: 1.0,
            margin: DEFAULT_MARGIN,
            contact_distance: DEFAULT_CONTACT_DISTANCE,
            substeps: DEFAULT_SUBSTEPS,
            step: 0.0,
        }
    }
}

impl SolverConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gravity vector
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the push-apart factor
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Set the boundary margin
    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Set the contact distance
    pub fn with_contact_distance(mut self, distance: f32) -> Self {
        self.contact_distance = distance;
        self
    }

    /// Set the number of sub-steps per frame
    pub fn with_substeps(mut self, substeps: u32) -> Self {
        self.substeps = substeps;
        self
    }

    /// Set the frame duration in seconds
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// Duration of one sub-step
    pub fn dt(&self) -> f32 {
        self.step / self.substeps as f32
    }

    /// Check every parameter
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_finite() {
            return Err(EngineError::parameter("gravity", "must be finite"));
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(EngineError::parameter("friction", "must be finite and >= 0"));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(EngineError::parameter("margin", "must be finite and >= 0"));
        }
        if !self.contact_distance.is_finite() || self.contact_distance <= 0.0 {
            return Err(EngineError::parameter("contact_distance", "must be finite and > 0"));
        }
        // Contacts are searched in a 3x3 block of unit cells
        if self.contact_distance > 1.0 {
            return Err(EngineError::parameter(
                "contact_distance",
                format!("{} exceeds the 1.0 cell size", self.contact_distance),
            ));
        }
        validate_substeps(self.substeps)?;
        validate_step(self.step)
    }
}

pub(crate) fn validate_substeps(substeps: u32) -> Result<()> {
    if substeps == 0 {
        return Err(EngineError::parameter("substeps", "must be at least 1"));
    }
    Ok(())
}

pub(crate) fn validate_step(step: f32) -> Result<()> {
    if !step.is_finite() || step < 0.0 {
        return Err(EngineError::parameter(
            "step",
            format!("{} must be finite and >= 0", step),
        ));
    }
    Ok(())
}

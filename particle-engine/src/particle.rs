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
//! Verlet particles and their cosmetic colour tag
//!
//! A particle carries no explicit velocity: motion is encoded by the
//! difference between its current and previous position. The colour tag and
//! polarity are carried for the host's benefit and never read by the solver.

use crate::math::Vec2;
use std::fmt;

/// RGBA colour tag packed the same way as a 32-bit `0xRRGGBBAA` integer
///
/// # Examples
///
/// ```
/// use particle_engine::Color;
///
/// let c = Color::from_u32(0x11223344);
/// assert_eq!((c.r, c.g, c.b, c.a), (0x11, 0x22, 0x33, 0x44));
/// assert_eq!(c.to_u32(), 0x11223344);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    pub a: u8,
}

impl Color {
    /// Opaque blue, the tag given to particles added without a colour
    pub const BLUE: Color = Color::rgba(0, 0, 255, 255);
    /// Opaque red
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    /// Opaque white
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    /// Create a colour from its four channels
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    /// Unpack a `0xRRGGBBAA` integer
    pub const fn from_u32(packed: u32) -> Self {
        Color {
            r: (packed >> 24) as u8,
            g: (packed >> 16) as u8,
            b: (packed >> 8) as u8,
            a: packed as u8,
        }
    }

    /// Pack into a `0xRRGGBBAA` integer
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 24) | ((self.g as u32) << 16) | ((self.b as u32) << 8) | self.a as u32
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLUE
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.to_u32())
    }
}

/// A circular body advanced by position Verlet integration
///
/// Fields are public so that a renderer can read them directly from
/// [`Solver::particles`](crate::Solver::particles).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Current position
    pub pos: Vec2,
    /// Position at the previous sub-step
    pub pos_prev: Vec2,
    /// Acceleration accumulated during the current sub-step
    pub acc: Vec2,
    /// Radius used for drawing
    pub radius: f32,
    /// Cosmetic colour tag
    pub color: Color,
    /// Reserved charge sign, unused by the solver
    pub polarity: i32,
}

impl Particle {
    /// Create a particle at rest at `pos`
    pub fn new(pos: Vec2, radius: f32) -> Self {
        Particle::with_color(pos, radius, Color::BLUE)
    }

    /// Create a particle at rest with an explicit colour tag
    pub fn with_color(pos: Vec2, radius: f32, color: Color) -> Self {
        Particle {
            pos,
            pos_prev: pos,
            acc: Vec2::ZERO,
            radius,
            color,
            polarity: 1,
        }
    }

    /// Create a particle at rest whose colour follows its polarity
    ///
    /// Positive polarity is tagged blue, anything else red.
    pub fn with_polarity(pos: Vec2, radius: f32, polarity: i32) -> Self {
        let color = if polarity > 0 { Color::BLUE } else { Color::RED };
        Particle {
            polarity,
            ..Particle::with_color(pos, radius, color)
        }
    }

    /// Displacement covered during the last sub-step
    pub fn displacement(&self) -> Vec2 {
        self.pos - self.pos_prev
    }

    /// Add to the acceleration accumulator
    pub fn accelerate(&mut self, a: Vec2) {
        self.acc += a;
    }

    /// Advance one Verlet step and reset the accumulator
    ///
    /// `pos' = pos + (pos - pos_prev) + acc * dt²`
    pub fn integrate(&mut self, dt: f32) {
        let displacement = self.pos - self.pos_prev;
        self.pos_prev = self.pos;
        self.pos += displacement + self.acc * (dt * dt);
        self.acc = Vec2::ZERO;
    }

    /// Clamp the position into `[margin, size - margin]` on both axes
    ///
    /// Only the position moves; `pos_prev` is left alone.
    pub fn clamp_to(&mut self, size: Vec2, margin: f32) {
        if self.pos.x > size.x - margin {
            self.pos.x = size.x - margin;
        } else if self.pos.x < margin {
            self.pos.x = margin;
        }
        if self.pos.y > size.y - margin {
            self.pos.y = size.y - margin;
        } else if self.pos.y < margin {
            self.pos.y = margin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_packing() {
        assert_eq!(Color::BLUE.to_u32(), 0x0000_ffff);
        assert_eq!(Color::RED.to_u32(), 0xff00_00ff);
        assert_eq!(Color::from_u32(Color::WHITE.to_u32()), Color::WHITE);
        assert_eq!(Color::default(), Color::BLUE);
        assert_eq!(Color::RED.to_string(), "#ff0000ff");
    }

    #[test]
    fn test_particle_starts_at_rest() {
        let p = Particle::new(Vec2::new(3.0, 4.0), 1.0);
        assert_eq!(p.pos_prev, p.pos);
        assert_eq!(p.acc, Vec2::ZERO);
        assert_eq!(p.displacement(), Vec2::ZERO);
        assert_eq!(p.polarity, 1);
    }

    #[test]
    fn test_polarity_selects_color() {
        assert_eq!(Particle::with_polarity(Vec2::ZERO, 1.0, 1).color, Color::BLUE);
        let negative = Particle::with_polarity(Vec2::ZERO, 1.0, -1);
        assert_eq!(negative.color, Color::RED);
        assert_eq!(negative.polarity, -1);
    }

    #[test]
    fn test_integrate_keeps_momentum_and_resets_acceleration() {
        let mut p = Particle::new(Vec2::new(1.0, 1.0), 1.0);
        p.pos_prev = Vec2::new(0.5, 1.0);
        p.accelerate(Vec2::new(0.0, 100.0));
        p.integrate(0.1);

        assert_eq!(p.pos_prev, Vec2::new(1.0, 1.0));
        assert!((p.pos.x - 1.5).abs() < 1e-6);
        assert!((p.pos.y - 2.0).abs() < 1e-5);
        assert_eq!(p.acc, Vec2::ZERO);
    }

    #[test]
    fn test_clamp_moves_position_only() {
        let size = Vec2::new(10.0, 10.0);
        let mut p = Particle::new(Vec2::new(-5.0, 12.0), 1.0);
        p.pos_prev = Vec2::new(-4.0, 11.0);
        p.clamp_to(size, 2.0);

        assert_eq!(p.pos, Vec2::new(2.0, 8.0));
        assert_eq!(p.pos_prev, Vec2::new(-4.0, 11.0));
    }
}

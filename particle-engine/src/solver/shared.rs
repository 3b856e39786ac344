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
//! Shared mutable view of the particle array for parallel phases

use crate::particle::Particle;
use std::marker::PhantomData;

/// Raw view over `&mut [Particle]` that can be handed to several tasks
///
/// The view itself enforces nothing beyond bounds: callers promise that
/// concurrently running tasks never touch the same particle. The solver
/// upholds this with disjoint index ranges for per-particle phases and with
/// the checkerboard column partition for collisions.
pub(crate) struct SharedParticles<'a> {
    ptr: *mut Particle,
    len: usize,
    _marker: PhantomData<&'a mut [Particle]>,
}

// SAFETY: access is only through the unsafe methods below, whose callers
// guarantee that no two threads alias the same particle.
unsafe impl Send for SharedParticles<'_> {}
unsafe impl Sync for SharedParticles<'_> {}

impl<'a> SharedParticles<'a> {
    pub(crate) fn new(particles: &'a mut [Particle]) -> Self {
        SharedParticles {
            ptr: particles.as_mut_ptr(),
            len: particles.len(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Mutable access to `start..end`
    ///
    /// # Safety
    ///
    /// No other live reference obtained from this view may overlap the range.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn range_mut(&self, start: usize, end: usize) -> &mut [Particle] {
        assert!(start <= end && end <= self.len, "range {}..{} out of {}", start, end, self.len);
        std::slice::from_raw_parts_mut(self.ptr.add(start), end - start)
    }

    /// Mutable access to two distinct particles
    ///
    /// # Safety
    ///
    /// No other live reference obtained from this view may point at `a` or `b`.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn pair_mut(&self, a: usize, b: usize) -> (&mut Particle, &mut Particle) {
        assert!(a != b && a < self.len && b < self.len, "bad pair ({}, {}) of {}", a, b, self.len);
        (&mut *self.ptr.add(a), &mut *self.ptr.add(b))
    }
}

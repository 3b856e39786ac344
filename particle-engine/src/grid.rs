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
//! Spatial-hash collision grid
//!
//! The world is covered by square cells of edge 1.0. Each cell owns a
//! [`Bucket`] holding the indices of the particles whose centre lies inside
//! it. Buckets are stored column-major: cell `(x, y)` lives at flat index
//! `x * height + y`, so a contiguous range of flat indices is a contiguous
//! range of columns.
//!
//! With unit cells and unit-radius particles only a handful of particles
//! share a cell, and all contact candidates of a particle are found in the
//! 3×3 block of cells around it.
//!
//! # Concurrency
//!
//! [`CollisionGrid::insert`] takes `&self` and may be called from many
//! threads at once: each bucket reserves slots with an atomic counter.
//! Inserts into a full bucket are rejected and counted in
//! [`CollisionGrid::dropped`]. Reads of bucket contents are only meaningful
//! after the inserting threads have been joined by a barrier.

use crate::error::{EngineError, Result};
use crate::math::Vec2;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maximum number of particles a single cell can hold
pub const BUCKET_CAPACITY: usize = 4;

/// Cell offsets `(dx, dy)` visited for each particle, self included
pub const STENCIL: [(isize, isize); 9] = [
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

/// Half of [`STENCIL`]: the cells after `(x, y)` in column-major order
///
/// Every pair of adjacent cells appears exactly once when each cell is
/// paired with itself and its forward neighbours, so a scan over all cells
/// visits every neighbouring cell pair once. The offsets never reach the
/// previous column.
pub const FORWARD_STENCIL: [(isize, isize); 4] = [(0, 1), (1, -1), (1, 0), (1, 1)];

/// Fixed-capacity, unordered set of particle indices for one cell
#[derive(Debug, Default)]
pub struct Bucket {
    reserved: AtomicUsize,
    slots: [AtomicUsize; BUCKET_CAPACITY],
}

impl Bucket {
    fn try_push(&self, index: usize) -> bool {
        let slot = self.reserved.fetch_add(1, Ordering::Relaxed);
        if slot < BUCKET_CAPACITY {
            self.slots[slot].store(index, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of particles stored
    pub fn len(&self) -> usize {
        self.reserved.load(Ordering::Relaxed).min(BUCKET_CAPACITY)
    }

    /// Check if the bucket holds no particles
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the stored particle indices
    pub fn occupants(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots[..self.len()]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
    }

    /// Check if `index` is stored in this bucket
    pub fn contains(&self, index: usize) -> bool {
        self.occupants().any(|i| i == index)
    }

    fn clear(&mut self) {
        *self.reserved.get_mut() = 0;
    }

    fn remove(&mut self, index: usize) -> bool {
        let len = self.len();
        let slots = &mut self.slots;
        for i in 0..len {
            if *slots[i].get_mut() == index {
                let last = *slots[len - 1].get_mut();
                *slots[i].get_mut() = last;
                *self.reserved.get_mut() = len - 1;
                return true;
            }
        }
        false
    }
}

/// Column-major grid of buckets at one-unit resolution
pub struct CollisionGrid {
    width: usize,
    height: usize,
    buckets: Vec<Bucket>,
    dropped: AtomicUsize,
}

impl CollisionGrid {
    /// Create an empty grid of `width × height` cells
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidWorldSize {
                width: width as f32,
                height: height as f32,
            });
        }
        let cells = width
            .checked_mul(height)
            .ok_or(EngineError::InvalidWorldSize {
                width: width as f32,
                height: height as f32,
            })?;
        let mut buckets = Vec::with_capacity(cells);
        buckets.resize_with(cells, Bucket::default);
        Ok(CollisionGrid {
            width,
            height,
            buckets,
            dropped: AtomicUsize::new(0),
        })
    }

    /// Create a grid covering a world of the given size
    ///
    /// The cell count on each axis is the floor of the world extent.
    pub fn for_world(size: Vec2) -> Result<Self> {
        if !size.is_finite() || size.x < 1.0 || size.y < 1.0 {
            return Err(EngineError::InvalidWorldSize {
                width: size.x,
                height: size.y,
            });
        }
        Self::new(size.x as usize, size.y as usize)
    }

    /// Width in cells
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells
    pub fn cell_count(&self) -> usize {
        self.buckets.len()
    }

    fn check(&self, x: usize, y: usize) -> Result<usize> {
        if x < self.width && y < self.height {
            Ok(x * self.height + y)
        } else {
            Err(EngineError::CellOutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Cell containing `pos`, or `None` if it lies outside the grid or is NaN
    pub fn cell_of(&self, pos: Vec2) -> Option<(usize, usize)> {
        if !pos.is_finite() || pos.x < 0.0 || pos.y < 0.0 {
            return None;
        }
        let (x, y) = (pos.x as usize, pos.y as usize);
        (x < self.width && y < self.height).then_some((x, y))
    }

    /// Store `index` in cell `(x, y)`
    ///
    /// Returns `Ok(false)` if the bucket was already full; the insertion is
    /// then counted in [`dropped`](Self::dropped).
    pub fn insert(&self, x: usize, y: usize, index: usize) -> Result<bool> {
        let cell = self.check(x, y)?;
        let stored = self.buckets[cell].try_push(index);
        if !stored {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(stored)
    }

    /// Remove `index` from cell `(x, y)`
    ///
    /// Returns whether the index was found. The last occupant takes the
    /// freed slot.
    pub fn remove(&mut self, x: usize, y: usize, index: usize) -> Result<bool> {
        let cell = self.check(x, y)?;
        Ok(self.buckets[cell].remove(index))
    }

    /// Empty every bucket and reset the dropped-insertion counter
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        *self.dropped.get_mut() = 0;
    }

    /// Bucket for cell `(x, y)`
    pub fn bucket(&self, x: usize, y: usize) -> Result<&Bucket> {
        let cell = self.check(x, y)?;
        Ok(&self.buckets[cell])
    }

    /// Insertions rejected because their bucket was full since the last clear
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total number of stored indices
    pub fn occupancy(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Buckets of the 3×3 block centred on `(x, y)`, in [`STENCIL`] order
    ///
    /// Offsets that fall outside the grid are skipped, so cells on the
    /// border have fewer neighbours and nothing wraps into the adjacent
    /// column.
    pub fn neighborhood(&self, x: usize, y: usize) -> impl Iterator<Item = &Bucket> + '_ {
        self.offsets(x, y, &STENCIL)
    }

    /// Buckets of the [`FORWARD_STENCIL`] cells of `(x, y)`, `(x, y)` excluded
    ///
    /// Border handling is the same as for [`neighborhood`](Self::neighborhood).
    pub fn forward_neighborhood(&self, x: usize, y: usize) -> impl Iterator<Item = &Bucket> + '_ {
        self.offsets(x, y, &FORWARD_STENCIL)
    }

    fn offsets<'a>(
        &'a self,
        x: usize,
        y: usize,
        stencil: &'static [(isize, isize)],
    ) -> impl Iterator<Item = &'a Bucket> + 'a {
        stencil.iter().filter_map(move |&(dx, dy)| {
            let nx = x.checked_add_signed(dx)?;
            let ny = y.checked_add_signed(dy)?;
            self.check(nx, ny).ok().map(|cell| &self.buckets[cell])
        })
    }
}

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
//! Column partition for lock-free parallel collision solving
//!
//! Grid columns are cut into contiguous slices. Slices are processed in two
//! passes: all even slices concurrently, then all odd slices. A particle in
//! column `c` is only paired with particles in columns `c ..= c + 1` (the
//! forward half of the neighbour stencil), so the columns touched by a slice
//! `[start, end)` are `start ..= end`. As long as every slice is at least
//! [`MIN_SLICE_WIDTH`] columns wide, two slices of the same parity are
//! separated by a whole slice and never touch a common column.

use std::ops::{Range, RangeInclusive};

/// Narrowest slice that keeps same-parity slices from touching
pub const MIN_SLICE_WIDTH: usize = 2;

/// Assignment of grid columns to checkerboard slices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerboardPartition {
    columns: usize,
    slice_count: usize,
    slice_width: usize,
}

impl CheckerboardPartition {
    /// Partition `columns` columns for `threads` workers
    ///
    /// Aims for `2 × threads` slices, fewer if the grid is too narrow to give
    /// each slice [`MIN_SLICE_WIDTH`] columns. The last slice absorbs the
    /// columns left over by the integer division.
    pub fn new(columns: usize, threads: usize) -> Self {
        let slice_count = (2 * threads.max(1)).min(columns / MIN_SLICE_WIDTH).max(1);
        CheckerboardPartition {
            columns,
            slice_count,
            slice_width: columns / slice_count,
        }
    }

    /// Number of slices
    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    /// Total number of columns covered
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Columns owned by `slice`
    pub fn slice(&self, slice: usize) -> Range<usize> {
        let start = slice * self.slice_width;
        let end = if slice + 1 == self.slice_count {
            self.columns
        } else {
            start + self.slice_width
        };
        start..end
    }

    /// Columns read or written while solving `slice`
    pub fn footprint(&self, slice: usize) -> RangeInclusive<usize> {
        let owned = self.slice(slice);
        let last = self.columns.saturating_sub(1);
        owned.start..=owned.end.min(last)
    }

    /// Number of slices run in the pass of the given parity (0 or 1)
    pub fn pass_len(&self, parity: usize) -> usize {
        (self.slice_count + 1 - parity.min(1)) / 2
    }

    /// Slice index of the `task`-th slice in the pass of `parity`
    pub fn pass_slice(&self, parity: usize, task: usize) -> usize {
        2 * task + parity
    }
}

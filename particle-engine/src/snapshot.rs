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
//! Flat colour-tag snapshots
//!
//! A snapshot is a whitespace-separated list of decimal `0xRRGGBBAA` colour
//! tags, one per particle in handle order. Hosts write one when they shut
//! down and read it back on start-up to recolour particles as they are
//! spawned again with [`apply_color_tags`]. The solver itself never reads
//! these files.

use crate::error::{EngineError, Result};
use crate::particle::{Color, Particle};
use std::io::{BufRead, Write};

/// Write the colour tag of every particle, in handle order
pub fn write_color_tags<W: Write>(mut writer: W, particles: &[Particle]) -> Result<()> {
    for (i, particle) in particles.iter().enumerate() {
        if i > 0 {
            writer.write_all(b" ")?;
        }
        write!(writer, "{}", particle.color.to_u32())?;
    }
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read every colour tag from a snapshot
///
/// Fails on the first token that is not a decimal `u32`.
pub fn read_color_tags<R: BufRead>(reader: R) -> Result<Vec<Color>> {
    let mut tags = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        for token in line.split_whitespace() {
            let packed: u32 = token.parse().map_err(|err| {
                EngineError::Snapshot(format!(
                    "line {}: bad colour tag {:?}: {}",
                    line_no + 1,
                    token,
                    err
                ))
            })?;
            tags.push(Color::from_u32(packed));
        }
    }
    log::debug!("read {} colour tags", tags.len());
    Ok(tags)
}

/// Paint `particles` with `tags`, pairing them in handle order
///
/// Only the first `min(particles.len(), tags.len())` particles change.
/// Particles without a tag keep their colour and surplus tags are ignored.
/// Returns the number of particles painted.
pub fn apply_color_tags(particles: &mut [Particle], tags: &[Color]) -> usize {
    if particles.len() != tags.len() {
        log::debug!(
            "applying {} colour tags to {} particles",
            tags.len(),
            particles.len()
        );
    }
    for (particle, &color) in particles.iter_mut().zip(tags) {
        particle.color = color;
    }
    particles.len().min(tags.len())
}

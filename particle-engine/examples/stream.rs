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
//! Headless particle stream
//!
//! Streams particles into a 100×100 world from the left edge, a few per
//! frame, until a cap is reached, then keeps simulating. Frame times and
//! solver diagnostics are reported through `log` (set `RUST_LOG=info` or
//! `RUST_LOG=debug` to see them).
//!
//! When `--colors` names an existing snapshot, spawned particles are painted
//! from it in handle order. On exit the colour of every particle is written
//! back to the same file.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=info cargo run --example stream --release
//! RUST_LOG=info cargo run --example stream --release -- --threads 4 --max 5000 --frames 1200
//! cargo run --example stream --release -- --colors colors.txt
//! ```

use particle_engine::snapshot::{read_color_tags, write_color_tags};
use particle_engine::{Color, Solver, SolverConfig, Vec2, WorkerPool};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

const WORLD: Vec2 = Vec2::new(100.0, 100.0);
const FRAME_RATE: f32 = 60.0;

struct DemoConfig {
    threads: usize,
    max_particles: usize,
    frames: usize,
    colors: Option<PathBuf>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            threads: 2,
            max_particles: 10_000,
            frames: 600,
            colors: None,
        }
    }
}

fn parse_args() -> DemoConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DemoConfig::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--threads", Some(v)) => match v.parse() {
                Ok(n) => config.threads = n,
                Err(_) => log::warn!("invalid thread count '{}', using {}", v, config.threads),
            },
            ("--max", Some(v)) => match v.parse() {
                Ok(n) => config.max_particles = n,
                Err(_) => log::warn!("invalid particle cap '{}', using {}", v, config.max_particles),
            },
            ("--frames", Some(v)) => match v.parse() {
                Ok(n) => config.frames = n,
                Err(_) => log::warn!("invalid frame count '{}', using {}", v, config.frames),
            },
            ("--colors", Some(v)) => config.colors = Some(PathBuf::from(v)),
            (flag, _) => {
                log::warn!("ignoring argument '{}'", flag);
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    config
}

fn load_colors(path: &Option<PathBuf>) -> Vec<Color> {
    let Some(path) = path else {
        return Vec::new();
    };
    match File::open(path) {
        Ok(file) => match read_color_tags(BufReader::new(file)) {
            Ok(tags) => tags,
            Err(err) => {
                log::warn!("ignoring colour snapshot {}: {}", path.display(), err);
                Vec::new()
            }
        },
        Err(_) => {
            log::info!("no colour snapshot at {}, using default colours", path.display());
            Vec::new()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let demo = parse_args();

    let pool = WorkerPool::new(demo.threads)?;
    let config = SolverConfig::new().with_step(1.0 / FRAME_RATE).with_substeps(8);
    let mut solver = Solver::with_config(WORLD, config, &pool)?;

    let palette = load_colors(&demo.colors);
    let started = Instant::now();

    for frame in 0..demo.frames {
        let frame_start = Instant::now();

        let count = solver.particle_count();
        if count < demo.max_particles {
            // A short column of emitters on the left wall, more as the world fills
            for i in 0..(count / 1000 + 1) {
                solver.add_particle_with_velocity(
                    Vec2::new(2.0, 10.0 + i as f32 * 2.0),
                    1.0,
                    Color::BLUE,
                    Vec2::new(0.2, 0.0),
                );
            }
            if count < palette.len() {
                solver.apply_color_tags(&palette);
            }
        }

        let stats = solver.update();

        if frame % 60 == 0 {
            log::info!(
                "frame {:>5}: {:>6} particles, {:.2} ms, {} dropped, {} in border band",
                frame,
                solver.particle_count(),
                frame_start.elapsed().as_secs_f64() * 1000.0,
                stats.dropped_insertions,
                stats.excluded
            );
        }
    }

    let elapsed = started.elapsed();
    println!(
        "{} frames, {} particles, {:.2} ms/frame",
        demo.frames,
        solver.particle_count(),
        elapsed.as_secs_f64() * 1000.0 / demo.frames.max(1) as f64
    );

    if let Some(path) = &demo.colors {
        let file = BufWriter::new(File::create(path)?);
        write_color_tags(file, solver.particles())?;
        log::info!("wrote {} colour tags to {}", solver.particle_count(), path.display());
    }

    Ok(())
}

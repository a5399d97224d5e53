//! Frame-sharded rendering of fertility sweeps.
//!
//! Every frame renders one diagram of a single logistic population whose
//! fertility cycle is `[y, y, k, k]`, with `k` swept between `start` and `end`
//! along a power curve. A run covers one contiguous shard of the frames so
//! that several processes can split a sequence between them.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use verhulst_core::interp::pow_interp;
use verhulst_core::{
    ColorMap, Diagram, Fertility, LawKind, Population, PopulationSystem, RenderSettings,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub frames: usize,
    pub shards: usize,
    pub shard: usize,
    pub start: f64,
    pub end: f64,
    pub power: f64,
    pub iterations: usize,
    pub width: u32,
    pub height: u32,
    pub y_min: f64,
    pub y_max: f64,
    pub out_dir: PathBuf,
    pub prefix: String,
    pub parallel: bool,
}

/// Frames handled by `shard` out of `shards`. The last shard absorbs the
/// remainder when `frames` is not a multiple of `shards`.
pub fn shard_range(frames: usize, shards: usize, shard: usize) -> Result<Range<usize>> {
    if shards == 0 {
        bail!("Shard count must be at least 1.");
    }
    if shard >= shards {
        bail!("Shard index {} out of range for {} shards.", shard, shards);
    }
    let per_shard = frames / shards;
    let start = per_shard * shard;
    let end = if shard + 1 == shards {
        frames
    } else {
        start + per_shard
    };
    Ok(start..end)
}

/// Swept fertility constant for `frame`.
pub fn frame_fertility(config: &BatchConfig, frame: usize) -> f64 {
    pow_interp(
        frame as f64,
        config.power,
        0.0,
        config.frames as f64,
        config.start,
        config.end,
    )
}

pub fn frame_diagram(config: &BatchConfig, frame: usize) -> Result<Diagram> {
    let k = frame_fertility(config, frame);
    let pop = Population::new(
        LawKind::Logistic.shared(),
        vec![Fertility::Axis, Fertility::Axis, k.into(), k.into()],
        0.5,
    )?;
    let system = PopulationSystem::new(vec![pop], config.iterations);
    let diagram = Diagram::new(
        system,
        config.y_min,
        config.y_max,
        config.width,
        config.height,
        ColorMap::RED_TO_BLACK,
    )?;
    Ok(diagram.with_settings(RenderSettings {
        parallel: config.parallel,
        ..RenderSettings::default()
    }))
}

pub fn frame_path(config: &BatchConfig, frame: usize) -> PathBuf {
    config
        .out_dir
        .join(format!("{}-{:04}.png", config.prefix, frame))
}

fn render_frame(config: &BatchConfig, frame: usize) -> Result<()> {
    let timer = Instant::now();
    info!(frame, frames = config.frames, "starting frame");

    let mut diagram = frame_diagram(config, frame)?;
    let path = frame_path(config, frame);
    diagram
        .save(&path)
        .with_context(|| format!("Failed to render frame {}", frame))?;

    info!(
        frame,
        frames = config.frames,
        elapsed_s = timer.elapsed().as_secs_f64(),
        "done frame"
    );
    Ok(())
}

/// Renders every frame of the configured shard. With `parallel` set, frames
/// and columns are both spread over the rayon pool.
pub fn run(config: &BatchConfig) -> Result<()> {
    let frames = shard_range(config.frames, config.shards, config.shard)?;
    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("Failed to create {}", config.out_dir.display()))?;
    info!(
        shard = config.shard,
        shards = config.shards,
        first = frames.start,
        end = frames.end,
        "rendering shard"
    );

    if config.parallel {
        frames
            .into_par_iter()
            .try_for_each(|frame| render_frame(config, frame))
    } else {
        frames.into_iter().try_for_each(|frame| render_frame(config, frame))
    }
}

//! Raster bifurcation diagrams.
//!
//! Each pixel column sweeps the system's axis value, runs a settling
//! trajectory and plots every population value of every retained state in
//! that column. The color encodes how far along the trajectory the point
//! occurred.

use crate::colormap::ColorMap;
use crate::error::ConfigError;
use crate::interp::lin_interp;
use crate::system::{PopulationSystem, SettleSettings};
use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub settle: SettleSettings,
    /// Sample columns on the rayon thread pool. The output is identical to a
    /// sequential render.
    #[serde(default)]
    pub parallel: bool,
}

/// Color maps as supplied by the caller: one shared by every population or
/// one per population.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorMaps {
    Shared(ColorMap),
    PerPopulation(Vec<ColorMap>),
}

impl ColorMaps {
    /// Expands to exactly one map per population.
    pub fn normalize(self, populations: usize) -> Result<Vec<ColorMap>, ConfigError> {
        match self {
            ColorMaps::Shared(cmap) => Ok(vec![cmap; populations]),
            ColorMaps::PerPopulation(maps) if maps.len() == populations => Ok(maps),
            ColorMaps::PerPopulation(maps) => Err(ConfigError::ColorMapCount {
                expected: populations,
                got: maps.len(),
            }),
        }
    }
}

impl From<ColorMap> for ColorMaps {
    fn from(cmap: ColorMap) -> Self {
        ColorMaps::Shared(cmap)
    }
}

impl From<Vec<ColorMap>> for ColorMaps {
    fn from(maps: Vec<ColorMap>) -> Self {
        ColorMaps::PerPopulation(maps)
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub image: RgbImage,
    /// Pixel writes performed.
    pub plotted: usize,
    /// Samples skipped because they fell outside the raster.
    pub out_of_range: usize,
}

pub struct Diagram {
    system: PopulationSystem,
    y_min: f64,
    y_max: f64,
    width: u32,
    height: u32,
    color_maps: Vec<ColorMap>,
    settings: RenderSettings,
}

impl Diagram {
    pub fn new(
        system: PopulationSystem,
        y_min: f64,
        y_max: f64,
        width: u32,
        height: u32,
        color_maps: impl Into<ColorMaps>,
    ) -> Result<Self, ConfigError> {
        if !y_min.is_finite() || !y_max.is_finite() {
            return Err(ConfigError::InvalidAxisRange {
                min: y_min,
                max: y_max,
            });
        }
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidDimensions { width, height });
        }
        let color_maps = color_maps.into().normalize(system.populations().len())?;
        Ok(Self {
            system,
            y_min,
            y_max,
            width,
            height,
            color_maps,
            settings: RenderSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn system(&self) -> &PopulationSystem {
        &self.system
    }

    pub fn color_maps(&self) -> &[ColorMap] {
        &self.color_maps
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn range(&self) -> (f64, f64) {
        (self.y_min, self.y_max)
    }

    /// Axis value swept at pixel column `column`.
    pub fn axis_value_at(&self, column: u32) -> f64 {
        column_axis_value(column, self.width, self.y_min, self.y_max)
    }

    /// Suggested output name: the summary with `:`, `*` and `'` removed.
    pub fn file_name(&self) -> String {
        let summary = self.to_string();
        let cleaned: String = summary
            .chars()
            .filter(|c| !matches!(c, ':' | '*' | '\''))
            .collect();
        format!("{cleaned}.png")
    }

    /// Renders the diagram. Never fails: samples that land outside the raster
    /// are logged and skipped.
    pub fn render(&mut self) -> RenderOutcome {
        info!(
            width = self.width,
            height = self.height,
            populations = self.system.populations().len(),
            iterations = self.system.iterations(),
            parallel = self.settings.parallel,
            "rendering diagram"
        );

        let projector = Projector {
            y_min: self.y_min,
            y_max: self.y_max,
            width: self.width,
            height: self.height,
            color_maps: &self.color_maps,
            settle: self.settings.settle,
            skip: self.system.max_fertility_len(),
            color_end: self.system.iterations() as f64 / 2.0,
            progress: AtomicUsize::new(0),
        };

        let columns: Vec<ColumnSamples> = if self.settings.parallel {
            let template = &self.system;
            (0..self.width)
                .into_par_iter()
                .map_init(|| template.clone(), |system, column| projector.column(system, column))
                .collect()
        } else {
            (0..self.width)
                .map(|column| projector.column(&mut self.system, column))
                .collect()
        };

        let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let mut plotted = 0;
        let mut out_of_range = 0;
        for samples in &columns {
            for &(row, color) in &samples.pixels {
                image.put_pixel(samples.column, row, color);
            }
            plotted += samples.pixels.len();
            out_of_range += samples.out_of_range;
        }

        if out_of_range > 0 {
            warn!(out_of_range, "skipped samples outside the raster");
        }
        info!(plotted, "diagram rendered");

        RenderOutcome {
            image,
            plotted,
            out_of_range,
        }
    }

    /// Renders and writes a PNG to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<RenderOutcome> {
        let path = path.as_ref();
        let outcome = self.render();

        info!(path = %path.display(), "saving diagram");
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        outcome
            .image
            .write_to(&mut writer, ImageFormat::Png)
            .with_context(|| format!("Failed to encode PNG to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;

        Ok(outcome)
    }
}

impl fmt::Display for Diagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on [{}, {}]", self.system, self.y_min, self.y_max)
    }
}

struct ColumnSamples {
    column: u32,
    pixels: Vec<(u32, Rgb<u8>)>,
    out_of_range: usize,
}

/// Everything needed to turn one column's trajectory into pixels.
struct Projector<'a> {
    y_min: f64,
    y_max: f64,
    width: u32,
    height: u32,
    color_maps: &'a [ColorMap],
    settle: SettleSettings,
    // States at or before this index are the initial transient.
    skip: usize,
    color_end: f64,
    progress: AtomicUsize,
}

impl Projector<'_> {
    fn column(&self, system: &mut PopulationSystem, column: u32) -> ColumnSamples {
        system.set_axis_value(column_axis_value(column, self.width, self.y_min, self.y_max));

        let mut pixels = Vec::new();
        let mut out_of_range = 0;
        for (index, state) in system.settle(self.settle).enumerate() {
            if index <= self.skip {
                continue;
            }
            for (population, &value) in state.values().iter().enumerate() {
                let row = lin_interp(value, 0.0, 1.0, 0.0, f64::from(self.height - 1));
                match pixel_row(row, self.height) {
                    Some(row) => {
                        let color =
                            self.color_maps[population].pixel(index as f64, 0.0, self.color_end);
                        pixels.push((row, color));
                    }
                    None => {
                        debug!(column, row, population, value, "sample out of range");
                        out_of_range += 1;
                    }
                }
            }
        }

        self.report_progress();
        ColumnSamples {
            column,
            pixels,
            out_of_range,
        }
    }

    fn report_progress(&self) {
        let done = self.progress.fetch_add(1, Ordering::Relaxed) + 1;
        let width = self.width as usize;
        let step = (width / 10).max(1);
        if done % step == 0 || done == width {
            debug!(done, total = width, "columns sampled");
        }
    }
}

/// Maps pixel column `column` of `width` linearly onto `[y_min, y_max)`.
fn column_axis_value(column: u32, width: u32, y_min: f64, y_max: f64) -> f64 {
    lin_interp(f64::from(column), 0.0, f64::from(width), y_min, y_max)
}

/// Integer row for a projected coordinate, truncated toward zero, or `None`
/// when the truncated row falls outside `[0, height)` or is not finite.
fn pixel_row(row: f64, height: u32) -> Option<u32> {
    // Anything in (-1, 0) truncates onto the first row.
    if !row.is_finite() || row <= -1.0 {
        return None;
    }
    let row = row.trunc();
    (row < f64::from(height)).then_some(row as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laws::{CustomLaw, LawKind};
    use crate::population::{Fertility, Population};

    fn sweep_system(iterations: usize) -> PopulationSystem {
        let pop = Population::with_fertility(LawKind::Logistic.shared(), Fertility::Axis, 0.5);
        PopulationSystem::new(vec![pop], iterations)
    }

    #[test]
    fn single_color_map_is_broadcast() {
        let pops = vec![
            Population::with_fertility(LawKind::Logistic.shared(), 2.0, 0.5),
            Population::with_fertility(LawKind::Logistic.shared(), 3.0, 0.5),
        ];
        let diagram = Diagram::new(
            PopulationSystem::new(pops, 10),
            0.0,
            4.0,
            8,
            8,
            ColorMap::RED_TO_BLACK,
        )
        .expect("valid diagram");
        assert_eq!(diagram.color_maps(), &[ColorMap::RED_TO_BLACK; 2]);
    }

    #[test]
    fn color_map_count_must_match_populations() {
        let err = Diagram::new(
            sweep_system(10),
            0.0,
            4.0,
            8,
            8,
            vec![ColorMap::BLACK, ColorMap::BLUE_TO_BLACK],
        )
        .err()
        .expect("mismatched color maps");
        assert_eq!(err, ConfigError::ColorMapCount { expected: 1, got: 2 });
    }

    #[test]
    fn rejects_degenerate_geometry() {
        let err = Diagram::new(sweep_system(10), 0.0, f64::NAN, 8, 8, ColorMap::BLACK)
            .err()
            .expect("invalid range");
        assert!(matches!(err, ConfigError::InvalidAxisRange { .. }));

        let err = Diagram::new(sweep_system(10), 0.0, 4.0, 0, 8, ColorMap::BLACK)
            .err()
            .expect("invalid size");
        assert_eq!(err, ConfigError::InvalidDimensions { width: 0, height: 8 });
    }

    #[test]
    fn pixel_row_rejects_outside_and_non_finite() {
        assert_eq!(pixel_row(0.0, 10), Some(0));
        assert_eq!(pixel_row(9.7, 10), Some(9));
        assert_eq!(pixel_row(10.0, 10), None);
        assert_eq!(pixel_row(-0.2, 10), Some(0));
        assert_eq!(pixel_row(-0.999, 10), Some(0));
        assert_eq!(pixel_row(-1.0, 10), None);
        assert_eq!(pixel_row(f64::NAN, 10), None);
        assert_eq!(pixel_row(f64::INFINITY, 10), None);
    }

    #[test]
    fn columns_sweep_axis_range() {
        let diagram =
            Diagram::new(sweep_system(10), 2.0, 4.0, 100, 10, ColorMap::BLACK).expect("diagram");
        assert_eq!(diagram.axis_value_at(0), 2.0);
        assert!((diagram.axis_value_at(50) - 3.0).abs() < 1e-12);
        assert!(diagram.axis_value_at(99) < 4.0);
        assert_eq!(diagram.axis_value_at(50), column_axis_value(50, 100, 2.0, 4.0));
    }

    #[test]
    fn render_starts_from_white_and_plots_attractor() {
        let mut diagram =
            Diagram::new(sweep_system(200), 2.5, 4.0, 40, 50, ColorMap::BLACK).expect("diagram");
        let outcome = diagram.render();
        assert_eq!(outcome.image.dimensions(), (40, 50));
        assert_eq!(outcome.out_of_range, 0);
        assert!(outcome.plotted > 0);

        // Column 0 sweeps fertility 2.5: the fixed point 0.6 is plotted, the
        // initial value 0.5 is not.
        let fixed_row = (0.6 * 49.0) as u32;
        assert_eq!(*outcome.image.get_pixel(0, fixed_row), Rgb([0, 0, 0]));
        assert_eq!(*outcome.image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn parallel_render_matches_sequential() {
        let build = |parallel| {
            Diagram::new(sweep_system(120), 2.8, 4.0, 64, 48, ColorMap::BLUE_TO_RED)
                .expect("diagram")
                .with_settings(RenderSettings {
                    parallel,
                    ..RenderSettings::default()
                })
        };
        let sequential = build(false).render();
        let parallel = build(true).render();
        assert_eq!(sequential.plotted, parallel.plotted);
        assert_eq!(sequential.image.as_raw(), parallel.image.as_raw());
    }

    #[test]
    fn out_of_range_samples_are_skipped_not_fatal() {
        let law = CustomLaw::shared("overshoot", |p, f, _| p + f);
        let pop = Population::with_fertility(law, 0.4, 0.0);
        let system = PopulationSystem::new(vec![pop], 20);
        let mut diagram = Diagram::new(system, 0.0, 1.0, 5, 10, ColorMap::BLACK).expect("diagram");

        let outcome = diagram.render();
        // Index 1 is skipped as transient, index 2 (0.8) is in range, the rest
        // exceed 1.0.
        assert_eq!(outcome.plotted, 5);
        assert_eq!(outcome.out_of_range, 5 * 18);
        assert_eq!(outcome.image.dimensions(), (5, 10));
    }

    #[test]
    fn values_just_below_zero_land_on_first_row() {
        let echo = CustomLaw::shared("echo", |_, f, _| f);
        let pop = Population::with_fertility(
            echo,
            Fertility::function(|_, i| -0.0001 * i as f64),
            0.0,
        );
        let system = PopulationSystem::new(vec![pop], 10);
        let mut diagram = Diagram::new(system, 0.0, 1.0, 3, 11, ColorMap::BLACK).expect("diagram");

        let outcome = diagram.render();
        // Indices 2..=10 per column; every row lies in (-0.1, 0].
        assert_eq!(outcome.out_of_range, 0);
        assert_eq!(outcome.plotted, 3 * 9);
        for column in 0..3 {
            assert_eq!(*outcome.image.get_pixel(column, 0), Rgb([0, 0, 0]));
        }
    }

    #[test]
    fn file_name_strips_reserved_characters() {
        let diagram = Diagram::new(sweep_system(10), 0.0, 4.0, 8, 8, ColorMap::BLACK)
            .expect("diagram");
        let name = diagram.file_name();
        assert!(name.ends_with(" on [0, 4].png"));
        assert!(!name.contains(':'));
        assert!(name.contains("(logistic(y))"));
    }
}

//! Declarative diagram configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "populations": [
//!     { "law": "logistic_env", "fertilities": "y" },
//!     { "law": "logistic_env", "fertilities": ["y", 3.7], "initial": 0.4 }
//!   ],
//!   "relations": [{ "source": 1, "target": 0, "coefficient": 0.5 }],
//!   "iterations": 400,
//!   "axis": { "min": 0.0, "max": 4.0 },
//!   "width": 1920,
//!   "height": 1080,
//!   "color_maps": ["red_to_black", "blue_to_black"]
//! }
//! ```

use crate::colormap::ColorMap;
use crate::diagram::{ColorMaps, Diagram, RenderSettings};
use crate::error::ConfigError;
use crate::laws::LawKind;
use crate::population::{Fertility, Population};
use crate::system::{PopulationSystem, Relation};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FertilityConfig {
    Constant(f64),
    Expression(String),
}

impl FertilityConfig {
    pub fn build(&self) -> Result<Fertility, ConfigError> {
        match self {
            FertilityConfig::Constant(value) => Ok(Fertility::Constant(*value)),
            FertilityConfig::Expression(source) if source.trim() == "y" => Ok(Fertility::Axis),
            FertilityConfig::Expression(source) => Fertility::parse(source),
        }
    }
}

/// A bare term is shorthand for a cycle of length one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FertilitiesConfig {
    Single(FertilityConfig),
    Cycle(Vec<FertilityConfig>),
}

impl FertilitiesConfig {
    pub fn build(&self) -> Result<Vec<Fertility>, ConfigError> {
        match self {
            FertilitiesConfig::Single(entry) => Ok(vec![entry.build()?]),
            FertilitiesConfig::Cycle(entries) => entries.iter().map(FertilityConfig::build).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub law: LawKind,
    pub fertilities: FertilitiesConfig,
    #[serde(default = "default_initial")]
    pub initial: f64,
}

impl PopulationConfig {
    pub fn build(&self) -> Result<Population, ConfigError> {
        Population::new(self.law.shared(), self.fertilities.build()?, self.initial)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorMapConfig {
    Preset(String),
    Custom(ColorMap),
}

impl ColorMapConfig {
    pub fn build(&self) -> Result<ColorMap, ConfigError> {
        match self {
            ColorMapConfig::Preset(name) => ColorMap::preset(name),
            ColorMapConfig::Custom(cmap) => Ok(*cmap),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorMapsConfig {
    Shared(ColorMapConfig),
    PerPopulation(Vec<ColorMapConfig>),
}

impl ColorMapsConfig {
    pub fn build(&self) -> Result<ColorMaps, ConfigError> {
        match self {
            ColorMapsConfig::Shared(entry) => Ok(ColorMaps::Shared(entry.build()?)),
            ColorMapsConfig::PerPopulation(entries) => entries
                .iter()
                .map(ColorMapConfig::build)
                .collect::<Result<Vec<_>, _>>()
                .map(ColorMaps::PerPopulation),
        }
    }
}

impl Default for ColorMapsConfig {
    fn default() -> Self {
        ColorMapsConfig::Shared(ColorMapConfig::Preset("black".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub min: f64,
    pub max: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self { min: 0.0, max: 4.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub populations: Vec<PopulationConfig>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default)]
    pub axis: AxisConfig,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub color_maps: ColorMapsConfig,
    #[serde(default)]
    pub render: RenderSettings,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse scenario JSON.")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn build_system(&self) -> Result<PopulationSystem, ConfigError> {
        let populations = self
            .populations
            .iter()
            .map(PopulationConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        PopulationSystem::with_relations(populations, self.relations.iter().copied(), self.iterations)
    }

    pub fn build(&self) -> Result<Diagram, ConfigError> {
        let system = self.build_system()?;
        let diagram = Diagram::new(
            system,
            self.axis.min,
            self.axis.max,
            self.width,
            self.height,
            self.color_maps.build()?,
        )?;
        Ok(diagram.with_settings(self.render))
    }
}

fn default_initial() -> f64 {
    0.5
}

fn default_iterations() -> usize {
    1000
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

use thiserror::Error;

use crate::expression::ExpressionError;

/// Errors raised while assembling populations, systems and diagrams.
/// Every variant is detected before any trajectory is computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("population {population} cannot be in relation with itself; use its fertility instead")]
    SelfRelation { population: usize },
    #[error("relation refers to population {index}, but the system only has {count}")]
    UnknownPopulation { index: usize, count: usize },
    #[error("a population needs at least one fertility term")]
    EmptyFertilities,
    #[error("expected {expected} color maps (one per population), got {got}")]
    ColorMapCount { expected: usize, got: usize },
    #[error("axis range must be finite, got [{min}, {max}]")]
    InvalidAxisRange { min: f64, max: f64 },
    #[error("diagram dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("unknown law `{0}`")]
    UnknownLaw(String),
    #[error("unknown color map `{0}`")]
    UnknownColorMap(String),
    #[error("invalid fertility expression: {0}")]
    Expression(#[from] ExpressionError),
}

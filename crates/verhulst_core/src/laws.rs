//! Recurrence laws followed by individual populations.
//!
//! Each law takes the previous value `p`, the active fertility `f` and the
//! environment term `e` (the weighted sum of related populations, zero when
//! uncoupled) and returns the next value.

use crate::error::ConfigError;
use crate::interp::clamp;
use crate::traits::Law;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Shared handle to a law. Cloned into every render worker.
pub type LawRef = Arc<dyn Law>;

/// The laws shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LawKind {
    /// `f·p·(1−p)`; ignores the environment.
    Logistic,
    /// `f·p·(1−p+e)`
    LogisticEnv,
    /// `f·p·(1−p+e)` restricted to `[0, 1]`.
    LogisticClamp,
    /// `f·(sin(p+e)+1)/5`; stays within `[0, 2f/5]`.
    Trigonometric,
    /// Competitive discrete Lotka–Volterra step `p·(1 + f·(1−p) + e)`.
    LotkaVolterra,
}

impl LawKind {
    pub const ALL: [LawKind; 5] = [
        LawKind::Logistic,
        LawKind::LogisticEnv,
        LawKind::LogisticClamp,
        LawKind::Trigonometric,
        LawKind::LotkaVolterra,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LawKind::Logistic => "logistic",
            LawKind::LogisticEnv => "logistic_env",
            LawKind::LogisticClamp => "logistic_clamp",
            LawKind::Trigonometric => "trigonometric",
            LawKind::LotkaVolterra => "lotka_volterra",
        }
    }

    pub fn shared(self) -> LawRef {
        Arc::new(self)
    }
}

impl Law for LawKind {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn next(&self, p: f64, f: f64, e: f64) -> f64 {
        match self {
            LawKind::Logistic => f * p * (1.0 - p),
            LawKind::LogisticEnv => f * p * (1.0 - p + e),
            LawKind::LogisticClamp => clamp(f * p * (1.0 - p + e), 0.0, 1.0),
            LawKind::Trigonometric => f * ((p + e).sin() + 1.0) / 5.0,
            LawKind::LotkaVolterra => p * (1.0 + f * (1.0 - p) + e),
        }
    }
}

impl fmt::Display for LawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LawKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LawKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownLaw(s.to_string()))
    }
}

/// A user supplied law backed by a closure.
pub struct CustomLaw<F> {
    name: String,
    func: F,
}

impl<F> CustomLaw<F>
where
    F: Fn(f64, f64, f64) -> f64 + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn shared(name: impl Into<String>, func: F) -> LawRef {
        Arc::new(Self::new(name, func))
    }
}

impl<F> Law for CustomLaw<F>
where
    F: Fn(f64, f64, f64) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn next(&self, value: f64, fertility: f64, environment: f64) -> f64 {
        (self.func)(value, fertility, environment)
    }
}

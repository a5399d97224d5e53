use crate::error::ConfigError;
use crate::expression::Expression;
use crate::laws::LawRef;
use std::fmt;
use std::sync::Arc;

/// Closure form of a fertility term, called with `(axis value, iteration)`.
pub type FertilityFn = Arc<dyn Fn(f64, usize) -> f64 + Send + Sync>;

/// One entry of a population's fertility cycle.
#[derive(Clone)]
pub enum Fertility {
    Constant(f64),
    /// The current axis sweep value.
    Axis,
    Expression(Expression),
    Function(FertilityFn),
}

impl Fertility {
    pub fn function<F>(func: F) -> Self
    where
        F: Fn(f64, usize) -> f64 + Send + Sync + 'static,
    {
        Fertility::Function(Arc::new(func))
    }

    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        Ok(Fertility::Expression(Expression::parse(source)?))
    }

    /// Resolves the term to a scalar for axis value `axis` at iteration `i`.
    pub fn resolve(&self, axis: f64, i: usize) -> f64 {
        match self {
            Fertility::Constant(value) => *value,
            Fertility::Axis => axis,
            Fertility::Expression(expr) => expr.eval(axis, i),
            Fertility::Function(func) => func(axis, i),
        }
    }
}

impl From<f64> for Fertility {
    fn from(value: f64) -> Self {
        Fertility::Constant(value)
    }
}

impl fmt::Display for Fertility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fertility::Constant(value) => write!(f, "{value}"),
            Fertility::Axis => f.write_str("y"),
            Fertility::Expression(expr) => write!(f, "{expr}"),
            Fertility::Function(_) => f.write_str("fn(y, i)"),
        }
    }
}

impl fmt::Debug for Fertility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fertility({self})")
    }
}

/// A single simulated quantity: a law, a cyclic fertility sequence and an
/// initial value.
#[derive(Clone)]
pub struct Population {
    law: LawRef,
    fertilities: Vec<Fertility>,
    initial: f64,
    name: String,
}

impl Population {
    /// Builds a population with a fertility cycle. The cycle must not be empty.
    pub fn new(
        law: LawRef,
        fertilities: Vec<Fertility>,
        initial: f64,
    ) -> Result<Self, ConfigError> {
        if fertilities.is_empty() {
            return Err(ConfigError::EmptyFertilities);
        }
        let name = display_name(&footprint(law.name(), &fertilities, initial));
        Ok(Self {
            law,
            fertilities,
            initial,
            name,
        })
    }

    /// Builds a population whose cycle is a single term.
    pub fn with_fertility(law: LawRef, fertility: impl Into<Fertility>, initial: f64) -> Self {
        let fertilities = vec![fertility.into()];
        let name = display_name(&footprint(law.name(), &fertilities, initial));
        Self {
            law,
            fertilities,
            initial,
            name,
        }
    }

    pub fn law(&self) -> &LawRef {
        &self.law
    }

    pub fn fertilities(&self) -> &[Fertility] {
        &self.fertilities
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Decorative name derived from the configuration; equal configurations
    /// get equal names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fertility applied at iteration `i`: entry `i mod len` of the cycle.
    pub fn fertility_at(&self, axis: f64, i: usize) -> f64 {
        self.fertilities[i % self.fertilities.len()].resolve(axis, i)
    }

    pub fn next(&self, value: f64, axis: f64, i: usize, environment: f64) -> f64 {
        self.law.next(value, self.fertility_at(axis, i), environment)
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:(", self.name, self.law.name())?;
        for (idx, fert) in self.fertilities.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{fert}")?;
        }
        f.write_str("))")
    }
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("name", &self.name)
            .field("law", &self.law.name())
            .field("fertilities", &self.fertilities)
            .field("initial", &self.initial)
            .finish()
    }
}

const SYLLABLES: [&str; 9] = ["lou", "da", "cris", "ker", "nel", "li", "nux", "py", "thon"];

fn footprint(law: &str, fertilities: &[Fertility], initial: f64) -> String {
    let ferts: Vec<String> = fertilities.iter().map(|f| f.to_string()).collect();
    format!("{law}({}){initial}", ferts.join(","))
}

// FNV-1a, then splitmix64 to draw syllables. Stable across platforms and runs.
fn display_name(footprint: &str) -> String {
    let mut seed = footprint.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    });
    let mut next = move || {
        seed = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    };
    let count = 1 + (next() % 4) as usize;
    (0..count)
        .map(|_| SYLLABLES[(next() % SYLLABLES.len() as u64) as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laws::LawKind;

    #[test]
    fn fertility_cycle_wraps_by_iteration() {
        let pop = Population::new(
            LawKind::Logistic.shared(),
            vec![Fertility::Axis, Fertility::Axis, 3.7.into(), 3.9.into()],
            0.5,
        )
        .expect("valid population");

        assert_eq!(pop.fertility_at(2.5, 0), 2.5);
        assert_eq!(pop.fertility_at(2.5, 1), 2.5);
        assert_eq!(pop.fertility_at(2.5, 2), 3.7);
        assert_eq!(pop.fertility_at(2.5, 3), 3.9);
        assert_eq!(pop.fertility_at(1.0, 4), 1.0);
        assert_eq!(pop.fertility_at(1.0, 7), 3.9);
    }

    #[test]
    fn callable_fertility_receives_axis_and_iteration() {
        let pop = Population::with_fertility(
            LawKind::Logistic.shared(),
            Fertility::function(|y, i| y + i as f64),
            0.5,
        );
        assert_eq!(pop.fertilities().len(), 1);
        assert_eq!(pop.fertility_at(2.0, 3), 5.0);
        assert_eq!(pop.fertility_at(3.0, 3), 6.0);
    }

    #[test]
    fn expression_fertility_is_evaluated_each_step() {
        let fert = Fertility::parse("y * 0.5 + i").expect("expression");
        assert!((fert.resolve(3.0, 2) - 3.5).abs() < 1e-12);
        assert!(Fertility::parse("z").is_err());
    }

    #[test]
    fn empty_fertility_cycle_is_rejected() {
        let err = Population::new(LawKind::Logistic.shared(), Vec::new(), 0.5)
            .expect_err("empty cycle");
        assert_eq!(err, ConfigError::EmptyFertilities);
    }

    #[test]
    fn next_applies_law_with_resolved_fertility() {
        let pop = Population::with_fertility(LawKind::LogisticEnv.shared(), Fertility::Axis, 0.5);
        assert!((pop.next(0.5, 2.0, 1, 0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn names_are_deterministic_and_pronounceable() {
        let make = || Population::with_fertility(LawKind::Logistic.shared(), 3.2, 0.5);
        let a = make();
        let b = make();
        assert_eq!(a.name(), b.name());
        assert!(!a.name().is_empty());
        assert!(a.name().chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn display_lists_law_and_fertilities() {
        let pop = Population::new(
            LawKind::Trigonometric.shared(),
            vec![Fertility::Axis, 2.5.into()],
            0.5,
        )
        .expect("valid population");
        let text = pop.to_string();
        assert!(text.starts_with(pop.name()));
        assert!(text.ends_with("(trigonometric:(y, 2.5))"));
    }
}

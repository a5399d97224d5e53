use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the interpolation helpers.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a discrete-time dynamical system.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the map.
    /// t: index of the state being produced
    /// x: previous state
    /// out: buffer to write x_{n+1}
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for steppers that advance a system by one iteration.
pub trait Steppable<T: Scalar> {
    /// Performs one step.
    /// t: current iteration (updated after step)
    /// state: current state (updated after step)
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T]);
}

/// The recurrence followed by a single population:
/// `(value, fertility, environment) -> next value`.
///
/// Implementations must be pure. The engine treats them as opaque and may call
/// them from several render workers at once.
pub trait Law: Send + Sync {
    /// Stable name used in summaries and diagnostics.
    fn name(&self) -> &str;

    fn next(&self, value: f64, fertility: f64, environment: f64) -> f64;
}

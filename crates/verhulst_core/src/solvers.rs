use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Discrete Map Stepper
/// Just evaluates x_{n+1} = f(x_n) and advances the iteration counter by one.
/// Every population is updated from the same previous state, so no entity
/// observes a value computed during the current step.
pub struct DiscreteMap<T: Scalar> {
    tmp: Vec<T>,
}

impl<T: Scalar> DiscreteMap<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for DiscreteMap<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T]) {
        // x_{n+1} = f(x_n)
        system.apply(*t, state, &mut self.tmp);

        state.copy_from_slice(&self.tmp);

        *t = *t + T::one();
    }
}

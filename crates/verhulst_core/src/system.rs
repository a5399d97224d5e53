//! Coupled population systems and their trajectories.
//!
//! Populations are enumerated in insertion order. That order fixes the
//! layout of every [`JointState`] and the color map each population is drawn
//! with, so it is preserved explicitly rather than derived from a map.

use crate::error::ConfigError;
use crate::population::Population;
use crate::solvers::DiscreteMap;
use crate::traits::{DynamicalSystem, Steppable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Index of a population within its system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopulationId(pub usize);

/// Directed influence of `source` on `target`: each step, `target`'s
/// environment gains `coefficient · source`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: PopulationId,
    pub target: PopulationId,
    pub coefficient: f64,
}

impl Relation {
    pub fn new(source: PopulationId, target: PopulationId, coefficient: f64) -> Self {
        Self {
            source,
            target,
            coefficient,
        }
    }
}

/// Validated relation coefficients keyed by `(source, target)`.
/// Missing entries are zero; relations need not be symmetric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationGraph {
    edges: BTreeMap<(PopulationId, PopulationId), f64>,
}

impl RelationGraph {
    fn build(
        relations: impl IntoIterator<Item = Relation>,
        count: usize,
    ) -> Result<Self, ConfigError> {
        let mut edges = BTreeMap::new();
        for relation in relations {
            for id in [relation.source, relation.target] {
                if id.0 >= count {
                    return Err(ConfigError::UnknownPopulation { index: id.0, count });
                }
            }
            if relation.source == relation.target {
                return Err(ConfigError::SelfRelation {
                    population: relation.source.0,
                });
            }
            // Later entries for the same pair replace earlier ones.
            edges.insert((relation.source, relation.target), relation.coefficient);
        }
        Ok(Self { edges })
    }

    pub fn coefficient(&self, source: PopulationId, target: PopulationId) -> f64 {
        self.edges.get(&(source, target)).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Relation> + '_ {
        self.edges
            .iter()
            .map(|(&(source, target), &coefficient)| Relation::new(source, target, coefficient))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Controls for [`PopulationSystem::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettleSettings {
    /// Longest cycle searched for; the incoming state is compared against the
    /// `max_loop_len - 1` retained states preceding the most recent one.
    pub max_loop_len: usize,
    /// Per-component distance below which two values count as equal.
    pub threshold: f64,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            max_loop_len: 10,
            threshold: 1e-6,
        }
    }
}

/// Values of every population at one iteration, in population order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointState {
    values: Vec<f64>,
}

impl JointState {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, id: PopulationId) -> Option<f64> {
        self.values.get(id.0).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every component is within `threshold` of `other`'s.
    /// Non-finite components never compare equal.
    pub fn approx_eq(&self, other: &JointState, threshold: f64) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a - b).abs() < threshold)
    }
}

/// A set of populations plus the directed relations between them.
#[derive(Clone)]
pub struct PopulationSystem {
    populations: Vec<Population>,
    relations: RelationGraph,
    // incoming[target] = [(source, coefficient)]
    incoming: Vec<Vec<(usize, f64)>>,
    iterations: usize,
    axis_value: f64,
}

impl PopulationSystem {
    /// Uncoupled populations.
    pub fn new(populations: Vec<Population>, iterations: usize) -> Self {
        let incoming = vec![Vec::new(); populations.len()];
        Self {
            populations,
            relations: RelationGraph::default(),
            incoming,
            iterations,
            axis_value: 0.0,
        }
    }

    /// Populations coupled by `relations`. Rejects relations from a
    /// population to itself and references to missing populations.
    pub fn with_relations(
        populations: Vec<Population>,
        relations: impl IntoIterator<Item = Relation>,
        iterations: usize,
    ) -> Result<Self, ConfigError> {
        let relations = RelationGraph::build(relations, populations.len())?;
        let mut incoming = vec![Vec::new(); populations.len()];
        for relation in relations.iter() {
            incoming[relation.target.0].push((relation.source.0, relation.coefficient));
        }
        Ok(Self {
            populations,
            relations,
            incoming,
            iterations,
            axis_value: 0.0,
        })
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn relations(&self) -> &RelationGraph {
        &self.relations
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn axis_value(&self) -> f64 {
        self.axis_value
    }

    /// Sets the sweep value seen by axis-dependent fertilities. Traversals
    /// started afterwards use the new value.
    pub fn set_axis_value(&mut self, axis_value: f64) {
        self.axis_value = axis_value;
    }

    /// Longest fertility cycle among the populations (0 when empty).
    pub fn max_fertility_len(&self) -> usize {
        self.populations
            .iter()
            .map(|pop| pop.fertilities().len())
            .max()
            .unwrap_or(0)
    }

    /// Weighted sum of the related populations' values in `state`.
    pub fn environment(&self, id: PopulationId, state: &[f64]) -> f64 {
        self.incoming[id.0]
            .iter()
            .map(|&(source, coefficient)| state[source] * coefficient)
            .sum()
    }

    /// Full trajectory: the initial state followed by one state per
    /// iteration, `iterations + 1` states in total.
    pub fn trajectory(&self) -> Trajectory<'_> {
        let map = CoupledMap { system: self };
        Trajectory {
            stepper: DiscreteMap::new(map.dimension()),
            map,
            state: self.populations.iter().map(Population::initial).collect(),
            t: 0.0,
            iterations: self.iterations,
        }
    }

    /// Trajectory that stops early once it converges or revisits a recent
    /// state.
    pub fn settle(&self, settings: SettleSettings) -> Settle<'_> {
        Settle {
            inner: self.trajectory(),
            retained: VecDeque::with_capacity(settings.max_loop_len.max(1)),
            retained_count: 0,
            settings,
            status: SettleStatus::Running,
        }
    }

    pub fn first_states(&self, settings: SettleSettings) -> Vec<JointState> {
        self.settle(settings).collect()
    }
}

impl fmt::Display for PopulationSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, pop) in self.populations.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ; ")?;
            }
            write!(f, "{pop}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PopulationSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulationSystem")
            .field("populations", &self.populations)
            .field("relations", &self.relations)
            .field("iterations", &self.iterations)
            .field("axis_value", &self.axis_value)
            .finish()
    }
}

/// The synchronous step of a system at its current axis value.
struct CoupledMap<'a> {
    system: &'a PopulationSystem,
}

impl DynamicalSystem<f64> for CoupledMap<'_> {
    fn dimension(&self) -> usize {
        self.system.populations.len()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        let i = t as usize;
        let axis = self.system.axis_value;
        for (k, pop) in self.system.populations.iter().enumerate() {
            let environment = self.system.environment(PopulationId(k), x);
            out[k] = pop.next(x[k], axis, i, environment);
        }
    }
}

/// Lazy iterator over the joint states of a system.
pub struct Trajectory<'a> {
    map: CoupledMap<'a>,
    stepper: DiscreteMap<f64>,
    state: Vec<f64>,
    // Index of the next state to produce.
    t: f64,
    iterations: usize,
}

impl Trajectory<'_> {
    fn next_index(&self) -> usize {
        self.t as usize
    }
}

impl Iterator for Trajectory<'_> {
    type Item = JointState;

    fn next(&mut self) -> Option<JointState> {
        let index = self.next_index();
        if index > self.iterations {
            return None;
        }
        if index == 0 {
            self.t = 1.0;
        } else {
            self.stepper.step(&self.map, &mut self.t, &mut self.state);
        }
        Some(JointState {
            values: self.state.clone(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.iterations + 1).saturating_sub(self.next_index());
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Trajectory<'_> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStatus {
    Running,
    /// The incoming state matched the previous one within the threshold.
    Converged,
    /// The incoming state matched an earlier state within the loop window.
    CycleDetected,
    /// All `iterations + 1` states were produced.
    Exhausted,
}

/// Early-stopping wrapper around [`Trajectory`]. The state that triggers a
/// stop is never yielded. Not restartable; call
/// [`PopulationSystem::settle`] again for a fresh traversal.
pub struct Settle<'a> {
    inner: Trajectory<'a>,
    // Most recent retained states, newest at the back.
    retained: VecDeque<JointState>,
    retained_count: usize,
    settings: SettleSettings,
    status: SettleStatus,
}

impl Settle<'_> {
    pub fn status(&self) -> SettleStatus {
        self.status
    }

    pub fn retained_count(&self) -> usize {
        self.retained_count
    }

    fn stop_reason(&self, state: &JointState) -> Option<SettleStatus> {
        let threshold = self.settings.threshold;
        let last = self.retained.back()?;
        if self.retained_count >= 2 && state.approx_eq(last, threshold) {
            return Some(SettleStatus::Converged);
        }
        let window = self.settings.max_loop_len.saturating_sub(1);
        self.retained
            .iter()
            .rev()
            .skip(1)
            .take(window)
            .any(|earlier| state.approx_eq(earlier, threshold))
            .then_some(SettleStatus::CycleDetected)
    }
}

impl Iterator for Settle<'_> {
    type Item = JointState;

    fn next(&mut self) -> Option<JointState> {
        if self.status != SettleStatus::Running {
            return None;
        }
        let Some(state) = self.inner.next() else {
            self.status = SettleStatus::Exhausted;
            return None;
        };
        if let Some(reason) = self.stop_reason(&state) {
            self.status = reason;
            return None;
        }

        if self.retained.len() >= self.settings.max_loop_len.max(1) {
            self.retained.pop_front();
        }
        self.retained.push_back(state.clone());
        self.retained_count += 1;
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laws::LawKind;
    use crate::population::Fertility;

    fn logistic(fertility: f64) -> Population {
        Population::with_fertility(LawKind::Logistic.shared(), fertility, 0.5)
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T, ConfigError>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn trajectory_yields_initial_plus_one_state_per_iteration() {
        let system = PopulationSystem::new(vec![logistic(3.9)], 25);
        let states: Vec<_> = system.trajectory().collect();
        assert_eq!(states.len(), 26);
        assert_eq!(states[0].values(), &[0.5]);
        assert!((states[1].values()[0] - 3.9 * 0.25).abs() < 1e-12);
        assert_eq!(system.trajectory().len(), 26);
    }

    #[test]
    fn zero_iterations_yields_only_initial_state() {
        let system = PopulationSystem::new(vec![logistic(3.0)], 0);
        let states: Vec<_> = system.trajectory().collect();
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn fertility_index_matches_iteration() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let pop = Population::with_fertility(
            LawKind::Logistic.shared(),
            Fertility::function(move |_, i| {
                sink.lock().expect("lock").push(i);
                2.0
            }),
            0.5,
        );
        let system = PopulationSystem::new(vec![pop], 3);
        let _ = system.trajectory().count();
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 3]);
    }

    #[test]
    fn relations_update_synchronously() {
        // Identity-like law exposes the environment directly.
        let law = crate::laws::CustomLaw::shared("env", |_, _, e| e);
        let a = Population::with_fertility(law.clone(), 0.0, 1.0);
        let b = Population::with_fertility(law, 0.0, 2.0);
        let system = PopulationSystem::with_relations(
            vec![a, b],
            [
                Relation::new(PopulationId(1), PopulationId(0), 1.0),
                Relation::new(PopulationId(0), PopulationId(1), 1.0),
            ],
            2,
        )
        .expect("valid system");

        let states: Vec<_> = system.trajectory().map(|s| s.values().to_vec()).collect();
        assert_eq!(states, vec![vec![1.0, 2.0], vec![2.0, 1.0], vec![1.0, 2.0]]);
    }

    #[test]
    fn relation_graph_defaults_to_zero_and_is_directed() {
        let system = PopulationSystem::with_relations(
            vec![logistic(2.0), logistic(2.0)],
            [Relation::new(PopulationId(1), PopulationId(0), 0.5)],
            1,
        )
        .expect("valid system");
        let relations = system.relations();
        assert_eq!(relations.coefficient(PopulationId(1), PopulationId(0)), 0.5);
        assert_eq!(relations.coefficient(PopulationId(0), PopulationId(1)), 0.0);
        assert_eq!(system.environment(PopulationId(0), &[0.2, 0.4]), 0.2);
        assert_eq!(system.environment(PopulationId(1), &[0.2, 0.4]), 0.0);
    }

    #[test]
    fn self_relation_is_rejected() {
        let result = PopulationSystem::with_relations(
            vec![logistic(2.0), logistic(2.0)],
            [Relation::new(PopulationId(1), PopulationId(1), 0.3)],
            10,
        );
        assert_eq!(
            result.as_ref().map(|_| ()).expect_err("self relation"),
            &ConfigError::SelfRelation { population: 1 }
        );
        assert_err_contains(result, "cannot be in relation with itself");
    }

    #[test]
    fn unknown_population_is_rejected() {
        let result = PopulationSystem::with_relations(
            vec![logistic(2.0)],
            [Relation::new(PopulationId(0), PopulationId(3), 0.3)],
            10,
        );
        assert_err_contains(result, "population 3");
    }

    #[test]
    fn settle_stops_on_convergence() {
        let system = PopulationSystem::new(vec![logistic(2.5)], 1000);
        let mut settle = system.settle(SettleSettings::default());
        let states: Vec<_> = settle.by_ref().collect();
        assert!(states.len() < 100);
        assert!(matches!(
            settle.status(),
            SettleStatus::Converged | SettleStatus::CycleDetected
        ));
        let last = states[states.len() - 1].values()[0];
        assert!((last - 0.6).abs() < 1e-5);
    }

    #[test]
    fn settle_detects_period_two_cycle() {
        let system = PopulationSystem::new(vec![logistic(3.2)], 1000);
        let mut settle = system.settle(SettleSettings::default());
        let states: Vec<_> = settle.by_ref().collect();
        assert_eq!(settle.status(), SettleStatus::CycleDetected);
        assert!(states.len() < 200);
        let n = states.len();
        let a = states[n - 1].values()[0];
        let b = states[n - 2].values()[0];
        assert!((a - b).abs() > 0.1);
    }

    fn echo_cycle(period: usize, iterations: usize) -> PopulationSystem {
        let echo = crate::laws::CustomLaw::shared("echo", |_, f, _| f);
        let fertilities = (0..period).map(|k| Fertility::Constant(k as f64)).collect();
        let pop = Population::new(echo, fertilities, -1.0).expect("valid population");
        PopulationSystem::new(vec![pop], iterations)
    }

    #[test]
    fn cycle_window_spans_max_loop_len() {
        // State n is n mod period, so the first repeat is state period + 1.
        let system = echo_cycle(9, 100);
        let mut settle = system.settle(SettleSettings::default());
        assert_eq!(settle.by_ref().count(), 10);
        assert_eq!(settle.status(), SettleStatus::CycleDetected);

        let system = echo_cycle(10, 100);
        let mut settle = system.settle(SettleSettings::default());
        assert_eq!(settle.by_ref().count(), 11);
        assert_eq!(settle.retained_count(), 11);
        assert_eq!(settle.status(), SettleStatus::CycleDetected);

        let system = echo_cycle(11, 100);
        let mut settle = system.settle(SettleSettings::default());
        assert_eq!(settle.by_ref().count(), 101);
        assert_eq!(settle.status(), SettleStatus::Exhausted);
    }

    #[test]
    fn zero_loop_len_disables_cycle_search() {
        let system = echo_cycle(2, 30);
        let settings = SettleSettings {
            max_loop_len: 0,
            ..SettleSettings::default()
        };
        let mut settle = system.settle(settings);
        assert_eq!(settle.by_ref().count(), 31);
        assert_eq!(settle.status(), SettleStatus::Exhausted);
    }

    #[test]
    fn settle_runs_to_exhaustion_in_chaos() {
        let system = PopulationSystem::new(vec![logistic(3.99)], 50);
        let mut settle = system.settle(SettleSettings::default());
        assert_eq!(settle.by_ref().count(), 51);
        assert_eq!(settle.status(), SettleStatus::Exhausted);
        assert_eq!(settle.next(), None);
    }

    #[test]
    fn settle_ignores_repeat_of_most_recent_state_until_two_are_retained() {
        // A fixed point from the start: the second state equals the first but
        // only one state has been retained, so it is kept.
        let system = PopulationSystem::new(vec![logistic(2.0)], 100);
        let mut settle = system.settle(SettleSettings::default());
        let states: Vec<_> = settle.by_ref().collect();
        assert_eq!(states.len(), 2);
        assert_eq!(settle.status(), SettleStatus::Converged);
    }

    #[test]
    fn settle_never_yields_non_finite_matches() {
        let law = crate::laws::CustomLaw::shared("nan", |_, _, _| f64::NAN);
        let pop = Population::with_fertility(law, 1.0, 0.5);
        let system = PopulationSystem::new(vec![pop], 20);
        assert_eq!(system.first_states(SettleSettings::default()).len(), 21);
    }

    #[test]
    fn max_fertility_len_spans_all_populations() {
        let cycle = Population::new(
            LawKind::Logistic.shared(),
            vec![Fertility::Axis, Fertility::Axis, 3.7.into()],
            0.5,
        )
        .expect("valid population");
        let system = PopulationSystem::new(vec![logistic(2.0), cycle], 10);
        assert_eq!(system.max_fertility_len(), 3);
        assert_eq!(PopulationSystem::new(Vec::new(), 10).max_fertility_len(), 0);
    }

    #[test]
    fn axis_value_reaches_fertility() {
        let pop = Population::with_fertility(LawKind::Logistic.shared(), Fertility::Axis, 0.5);
        let mut system = PopulationSystem::new(vec![pop], 1);
        system.set_axis_value(2.0);
        let states: Vec<_> = system.trajectory().collect();
        assert!((states[1].values()[0] - 0.5).abs() < 1e-12);
        system.set_axis_value(4.0);
        let states: Vec<_> = system.trajectory().collect();
        assert!((states[1].values()[0] - 1.0).abs() < 1e-12);
    }
}

pub mod colormap;
pub mod diagram;
pub mod error;
pub mod expression;
pub mod interp;
pub mod laws;
pub mod population;
pub mod scenario;
pub mod solvers;
pub mod system;
/// The `verhulst_core` crate simulates coupled discrete-time population
/// recurrences and renders their long-run behavior as bifurcation diagrams.
///
/// Key components:
/// - **Traits**: `Law` (population recurrences), `DynamicalSystem` and `Steppable` (discrete maps).
/// - **System**: `PopulationSystem`, a relation graph of populations advanced synchronously,
///   with lazy `Trajectory` and early-stopping `Settle` iterators.
/// - **Diagram**: projects settled trajectories onto pixel columns, colored by trajectory position.
/// - **Scenario**: serde-backed configuration for whole diagrams.
pub mod traits;

pub use colormap::ColorMap;
pub use diagram::{ColorMaps, Diagram, RenderOutcome, RenderSettings};
pub use error::ConfigError;
pub use laws::{CustomLaw, LawKind, LawRef};
pub use population::{Fertility, Population};
pub use scenario::Scenario;
pub use system::{
    JointState, PopulationId, PopulationSystem, Relation, SettleSettings, SettleStatus,
};
pub use traits::Law;

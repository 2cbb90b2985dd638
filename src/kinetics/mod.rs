//! Adaptive truncated-grid Klein-Kramers solver.
//!
//! The phase modules are pure functions over explicit state; [`KleinKramers`]
//! owns that state and sequences them once per step.

pub mod activity;
mod engine;
pub mod extrapolate;
pub mod field;
pub mod grid;
pub mod index_set;
pub mod moments;
pub mod observables;
pub mod potential;
pub mod stencil;
pub mod support;
mod sync;

pub use activity::{ActiveRegion, Thresholds};
pub use engine::{KleinKramers, StepReport};
pub use field::{FieldBuffers, RowMoments};
pub use grid::{Bounds, Grid};
pub use index_set::IndexSet;
pub use moments::{EquilibriumPolicy, Physics};
pub use observables::Correlation;
pub use potential::{DoubleWell, Free, GaussianPacket, MetastableWell, Potential, PotentialKind};
pub use support::{EdgeClosure, InteriorSupport, MaskSupport, Support, Unrestricted};

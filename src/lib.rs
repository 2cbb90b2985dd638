//! Klein-Kramers phase-space transport on an adaptive truncated grid.
//!
//! A probability density over (position, momentum) is advanced with RK4,
//! but only on the cells where it is numerically significant. The tracked
//! region grows by log-linear extrapolation inside a step and is trimmed
//! after normalization.

pub mod config;
pub mod error;
pub mod kinetics;
pub mod snapshot;

pub use config::SimulationConfig;
pub use error::{KineticsError, Result};
pub use kinetics::{KleinKramers, StepReport};
pub use snapshot::SnapshotWriter;

//! Simulation configuration.
//!
//! Loaded from JSON, validated once, and then handed to
//! [`KleinKramers::new`](crate::KleinKramers::new). Every section falls back
//! to defaults, so a partial file only needs the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KineticsError, Result};
use crate::kinetics::{EdgeClosure, EquilibriumPolicy, Grid, PotentialKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub lower: [f64; 2],
    pub upper: [f64; 2],
    pub spacing: [f64; 2],
    /// Cells on each side that are never evolved.
    pub edge: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            lower: [-8.0, -6.0],
            upper: [8.0, 6.0],
            spacing: [0.05, 0.05],
            edge: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub dt: f64,
    pub total_time: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            dt: 0.002,
            total_time: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub mass: f64,
    pub kb: f64,
    pub temperature: f64,
    /// Relaxation rate of the collision term.
    pub gamma: f64,
    pub hbar: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            kb: 1.0,
            temperature: 0.5,
            gamma: 0.1,
            hbar: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    /// Evolve every interior cell and skip all truncation logic.
    pub full_grid: bool,
    /// Cells below this value (and below the gradient tolerance) are dropped.
    pub tol_high: f64,
    /// Shell cells at or above this value (or gradient) trigger growth.
    pub tol_low: f64,
    pub tol_high_gradient: f64,
    pub tol_low_gradient: f64,
    /// Decay rate applied when an extrapolated value must be damped.
    pub extrapolation_reduce: f64,
    /// Maximum growth rounds per step.
    pub extrapolation_limit: usize,
    pub closure: EdgeClosure,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            full_grid: false,
            tol_high: 1e-10,
            tol_low: 1e-6,
            tol_high_gradient: 1e-8,
            tol_low_gradient: 1e-4,
            extrapolation_reduce: 0.5,
            extrapolation_limit: 20,
            closure: EdgeClosure::Mirror,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConfig {
    pub center: [f64; 2],
    pub width: [f64; 2],
}

impl Default for InitialConfig {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            width: [0.5, 0.5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Progress log interval in steps.
    pub period: usize,
    /// Interval for shell and moment dumps.
    pub print_period: usize,
    pub wavefunction_period: usize,
    pub wavefunction: bool,
    pub edge: bool,
    pub density: bool,
    pub drift_velocity: bool,
    pub temperature: bool,
    pub transmittance: bool,
    pub correlation: bool,
    /// Position beyond which mass counts as transmitted.
    pub transmittance_x0: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            period: 100,
            print_period: 100,
            wavefunction_period: 1000,
            wavefunction: false,
            edge: false,
            density: false,
            drift_velocity: false,
            temperature: false,
            transmittance: false,
            correlation: false,
            transmittance_x0: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// `None` means auto-detect from physical cores.
    pub thread_count: Option<usize>,
    /// Hard cap applied after auto-detection.
    pub max_threads: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub time: TimeConfig,
    pub physics: PhysicsConfig,
    pub truncation: TruncationConfig,
    pub equilibrium: EquilibriumPolicy,
    pub initial: InitialConfig,
    pub potential: PotentialKind,
    pub output: OutputConfig,
    pub threads: ThreadConfig,
}

impl SimulationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set an explicit thread count for the compute pool.
    pub fn thread_count(mut self, n: usize) -> Self {
        self.threads.thread_count = Some(n.max(1));
        self
    }

    /// Set a hard upper bound on threads.
    pub fn max_threads(mut self, n: usize) -> Self {
        self.threads.max_threads = Some(n.max(1));
        self
    }

    pub fn full_grid(mut self, enabled: bool) -> Self {
        self.truncation.full_grid = enabled;
        self
    }

    /// Number of steps covering `total_time`.
    pub fn time_steps(&self) -> u64 {
        (self.time.total_time / self.time.dt).round().max(0.0) as u64
    }

    pub fn build_grid(&self) -> Result<Grid> {
        Grid::new(self.grid.lower, self.grid.upper, self.grid.spacing, self.grid.edge)
    }

    pub fn validate(&self) -> Result<()> {
        self.build_grid()?;

        positive("time.dt", self.time.dt)?;
        non_negative("time.total_time", self.time.total_time)?;

        let p = &self.physics;
        positive("physics.mass", p.mass)?;
        positive("physics.kb", p.kb)?;
        positive("physics.temperature", p.temperature)?;
        positive("physics.hbar", p.hbar)?;
        non_negative("physics.gamma", p.gamma)?;

        let t = &self.truncation;
        non_negative("truncation.tol_high", t.tol_high)?;
        non_negative("truncation.tol_low", t.tol_low)?;
        non_negative("truncation.tol_high_gradient", t.tol_high_gradient)?;
        non_negative("truncation.tol_low_gradient", t.tol_low_gradient)?;
        non_negative("truncation.extrapolation_reduce", t.extrapolation_reduce)?;

        positive("initial.width[0]", self.initial.width[0])?;
        positive("initial.width[1]", self.initial.width[1])?;

        let o = &self.output;
        for (key, value) in [
            ("output.period", o.period),
            ("output.print_period", o.print_period),
            ("output.wavefunction_period", o.wavefunction_period),
        ] {
            if value == 0 {
                return Err(KineticsError::invalid(key, value, "must be at least 1"));
            }
        }
        if !o.transmittance_x0.is_finite() {
            return Err(KineticsError::invalid("output.transmittance_x0", o.transmittance_x0, "must be finite"));
        }

        for (key, value) in [
            ("threads.thread_count", self.threads.thread_count),
            ("threads.max_threads", self.threads.max_threads),
        ] {
            if value == Some(0) {
                return Err(KineticsError::invalid(key, 0, "must be at least 1"));
            }
        }
        Ok(())
    }
}

fn positive(key: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(KineticsError::invalid(key, value, "must be positive and finite"))
    }
}

fn non_negative(key: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KineticsError::invalid(key, value, "must be non-negative and finite"))
    }
}

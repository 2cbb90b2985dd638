//! Dense per-cell buffers owned by the engine.

/// Number of Runge-Kutta stages.
pub const STAGES: usize = 4;

/// Row moments of the density along the momentum axis, one entry per row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowMoments {
    pub density: Vec<f64>,
    pub velocity: Vec<f64>,
    pub temperature: Vec<f64>,
}

impl RowMoments {
    pub fn zeros(rows: usize) -> Self {
        Self {
            density: vec![0.0; rows],
            velocity: vec![0.0; rows],
            temperature: vec![0.0; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.density.len()
    }

    pub(crate) fn clear(&mut self) {
        self.density.fill(0.0);
        self.velocity.fill(0.0);
        self.temperature.fill(0.0);
    }

    pub(crate) fn clear_row(&mut self, i1: usize) {
        self.density[i1] = 0.0;
        self.velocity[i1] = 0.0;
        self.temperature[i1] = 0.0;
    }
}

/// All field arrays for one grid. Every buffer has `grid.len()` entries.
///
/// - `f`: authoritative density, committed once per step.
/// - `ff`: provisional RK4 result for the step in flight.
/// - `pf`: density after the previous normalization.
/// - `feq`: local-equilibrium target for the relaxation term.
/// - `stages`: RK4 stage increments.
/// - `force`: potential gradient sampled at each cell.
#[derive(Clone, Debug)]
pub struct FieldBuffers {
    pub(crate) f: Vec<f64>,
    pub(crate) ff: Vec<f64>,
    pub(crate) pf: Vec<f64>,
    pub(crate) feq: Vec<f64>,
    pub(crate) stages: [Vec<f64>; STAGES],
    pub(crate) force: Vec<f64>,
    pub(crate) moments: RowMoments,
}

impl FieldBuffers {
    pub fn zeros(cells: usize, rows: usize) -> Self {
        Self {
            f: vec![0.0; cells],
            ff: vec![0.0; cells],
            pf: vec![0.0; cells],
            feq: vec![0.0; cells],
            stages: std::array::from_fn(|_| vec![0.0; cells]),
            force: vec![0.0; cells],
            moments: RowMoments::zeros(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.f.len()
    }

    pub fn is_empty(&self) -> bool {
        self.f.is_empty()
    }

    /// Split borrow of the stage buffers: the previous stage (read) and the
    /// current one (written).
    pub(crate) fn stage_pair(stages: &mut [Vec<f64>; STAGES], stage: usize) -> (Option<&[f64]>, &mut [f64]) {
        debug_assert!(stage < STAGES);
        let (done, rest) = stages.split_at_mut(stage);
        let prev = done.last().map(Vec::as_slice);
        (prev, rest[0].as_mut_slice())
    }
}

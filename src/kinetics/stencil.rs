//! Four-stage Runge-Kutta update of the flux-form Klein-Kramers operator.
//!
//! Stage increment at cell `(i1, i2)` with stage-shifted values `g = f + c·k`:
//!
//! ```text
//! k = -advect·p·(g[i1+1] - g[i1-1]) + force·V'(x)·(g[i2+1] - g[i2-1]) + relax·(feq - g)
//! ```
//!
//! with `advect = dt/(2·h1·m)`, `force = dt/(2·h2)`, `relax = dt·gamma`. A
//! neighbour outside the support is replaced according to [`EdgeClosure`].
//! The provisional field accumulates `ff = f + k1/6 + k2/3 + k3/3 + k4/6`.
//!
//! Two drivers share the same per-cell arithmetic: a row pass over a bounding
//! box and an index-set pass over an explicit list of cells. Both only ever
//! write stage buffers and `ff`.

use rayon::prelude::*;

use super::field::{FieldBuffers, STAGES};
use super::grid::{Bounds, Grid};
use super::index_set::IndexSet;
use super::moments::Physics;
use super::support::{EdgeClosure, Support};
use super::sync::{PARALLEL_ROW_THRESHOLD, PARALLEL_SET_THRESHOLD, SharedSlice};

const STAGE_SHIFT: [f64; STAGES] = [0.0, 0.5, 0.5, 1.0];
const STAGE_DIVISOR: [f64; STAGES] = [6.0, 3.0, 3.0, 6.0];

/// Time-step scaled coefficients of the three operator terms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StencilCoefficients {
    pub advect: f64,
    pub force: f64,
    pub relax: f64,
}

impl StencilCoefficients {
    pub fn new(grid: &Grid, physics: &Physics, dt: f64) -> Self {
        let [h1, h2] = grid.spacing();
        Self {
            advect: dt / (2.0 * h1 * physics.mass),
            force: dt / (2.0 * h2),
            relax: dt * physics.gamma,
        }
    }
}

/// Read-only inputs of one RK4 pass.
pub struct StageInputs<'a, S: Support> {
    pub grid: &'a Grid,
    pub support: &'a S,
    pub closure: EdgeClosure,
    pub coeffs: StencilCoefficients,
    pub f: &'a [f64],
    pub feq: &'a [f64],
    pub force: &'a [f64],
    pub momenta: &'a [f64],
}

impl<S: Support> StageInputs<'_, S> {
    /// Increment of stage `stage` at `idx`. `idx` must be an interior cell so
    /// that its four neighbours exist.
    #[inline(always)]
    fn increment(&self, prev: Option<&[f64]>, stage: usize, idx: usize, i2: usize) -> f64 {
        let shift = STAGE_SHIFT[stage];
        let shifted = |j: usize| match prev {
            Some(k) => self.f[j] + shift * k[j],
            None => self.f[j],
        };
        let own = shifted(idx);
        let edge = match self.closure {
            EdgeClosure::Mirror => own,
            EdgeClosure::Vacuum => 0.0,
        };
        let sample = |j: usize| if self.support.is_active(j) { shifted(j) } else { edge };

        let stride = self.grid.stride();
        let d1 = sample(idx + stride) - sample(idx - stride);
        let d2 = sample(idx + 1) - sample(idx - 1);
        let c = &self.coeffs;
        -c.advect * self.momenta[i2] * d1 + c.force * self.force[idx] * d2 + c.relax * (self.feq[idx] - own)
    }

    #[inline(always)]
    fn accumulate(&self, stage: usize, idx: usize, ff_prev: f64, k: f64) -> f64 {
        if stage == 0 {
            self.f[idx] + k / STAGE_DIVISOR[0]
        } else {
            ff_prev + k / STAGE_DIVISOR[stage]
        }
    }
}

/// Four stages over every supported cell of `region`.
pub fn rk4_region<S: Support>(
    inputs: &StageInputs<'_, S>,
    region: Bounds,
    stages: &mut [Vec<f64>; STAGES],
    ff: &mut [f64],
) {
    let stride = inputs.grid.stride();
    let first_row = region.min[0];
    let rows = region.max[0] - first_row + 1;
    let span = first_row * stride..(region.max[0] + 1) * stride;
    let parallel = rows * region.cols().count() >= PARALLEL_ROW_THRESHOLD;

    for stage in 0..STAGES {
        let (prev, out) = FieldBuffers::stage_pair(stages, stage);
        let row_pass = |(offset, (k_row, ff_row)): (usize, (&mut [f64], &mut [f64]))| {
            let base = (first_row + offset) * stride;
            for i2 in region.cols() {
                let idx = base + i2;
                if inputs.support.is_active(idx) {
                    let k = inputs.increment(prev, stage, idx, i2);
                    k_row[i2] = k;
                    ff_row[i2] = inputs.accumulate(stage, idx, ff_row[i2], k);
                }
            }
        };
        let k_block = &mut out[span.clone()];
        let ff_block = &mut ff[span.clone()];
        if parallel {
            k_block
                .par_chunks_mut(stride)
                .zip(ff_block.par_chunks_mut(stride))
                .enumerate()
                .for_each(row_pass);
        } else {
            k_block
                .chunks_mut(stride)
                .zip(ff_block.chunks_mut(stride))
                .enumerate()
                .for_each(row_pass);
        }
    }
}

/// Four stages over an explicit set of supported cells. Neighbours outside
/// the set are read from whatever the stage buffers already hold.
pub fn rk4_cells<S: Support>(
    inputs: &StageInputs<'_, S>,
    cells: &IndexSet,
    stages: &mut [Vec<f64>; STAGES],
    ff: &mut [f64],
) {
    if cells.is_empty() {
        return;
    }
    let stride = inputs.grid.stride();
    let parallel = cells.len() >= PARALLEL_SET_THRESHOLD;

    for stage in 0..STAGES {
        let (prev, out) = FieldBuffers::stage_pair(stages, stage);
        let k_out = SharedSlice::new(out);
        let ff_out = SharedSlice::new(&mut ff[..]);
        // SAFETY: `cells` is strictly increasing, so every index is visited by
        // exactly one worker, and stage reads go to `prev` and `f`, never to
        // the buffers being written.
        let cell_pass = |&idx: &usize| unsafe {
            debug_assert!(inputs.support.is_active(idx));
            let k = inputs.increment(prev, stage, idx, idx % stride);
            k_out.write(idx, k);
            ff_out.write(idx, inputs.accumulate(stage, idx, ff_out.read(idx), k));
        };
        if parallel {
            cells.as_slice().par_iter().for_each(cell_pass);
        } else {
            cells.as_slice().iter().for_each(cell_pass);
        }
    }
}

//! Derived scalar series: transmittance past a position and overlap of the
//! position density with its initial profile.

use super::grid::{Bounds, Grid};
use super::support::Support;
use super::sync::map_rows;

/// `Σ values·h2` over supported cells of each row in `bounds`. Rows outside
/// `bounds` are zero.
pub fn row_profile<S: Support>(grid: &Grid, support: &S, bounds: Option<Bounds>, values: &[f64]) -> Vec<f64> {
    let mut profile = vec![0.0; grid.shape()[0]];
    let Some(bounds) = bounds else {
        return profile;
    };
    let h2 = grid.spacing()[1];
    let sums = map_rows(bounds.rows(), bounds.cols().count(), |i1| {
        let base = grid.index(i1, 0);
        let mut sum = 0.0;
        for i2 in bounds.cols() {
            if support.is_active(base + i2) {
                sum += values[base + i2];
            }
        }
        sum * h2
    });
    for (i1, sum) in bounds.rows().zip(sums) {
        profile[i1] = sum;
    }
    profile
}

/// Probability mass in rows at or beyond `from_row`.
pub fn transmittance<S: Support>(
    grid: &Grid,
    support: &S,
    bounds: Option<Bounds>,
    values: &[f64],
    from_row: usize,
) -> f64 {
    let Some(mut bounds) = bounds else {
        return 0.0;
    };
    if from_row > bounds.max[0] {
        return 0.0;
    }
    bounds.min[0] = bounds.min[0].max(from_row);
    let h1 = grid.spacing()[0];
    let profile = row_profile(grid, support, Some(bounds), values);
    profile[bounds.min[0]..=bounds.max[0]].iter().sum::<f64>() * h1
}

/// Overlap of the position density with a reference profile, normalized so
/// that the reference scores 1.
#[derive(Clone, Debug)]
pub struct Correlation {
    reference: Vec<f64>,
    norm: f64,
}

impl Correlation {
    pub fn capture<S: Support>(grid: &Grid, support: &S, bounds: Option<Bounds>, values: &[f64]) -> Self {
        let reference = row_profile(grid, support, bounds, values);
        let h1 = grid.spacing()[0];
        let norm = reference.iter().map(|v| v * v).sum::<f64>() * h1;
        Self { reference, norm }
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn evaluate<S: Support>(&self, grid: &Grid, support: &S, bounds: Option<Bounds>, values: &[f64]) -> f64 {
        if self.norm == 0.0 {
            return 0.0;
        }
        let current = row_profile(grid, support, bounds, values);
        let h1 = grid.spacing()[0];
        let overlap: f64 = current.iter().zip(&self.reference).map(|(a, b)| a * b).sum();
        overlap * h1 / self.norm
    }
}

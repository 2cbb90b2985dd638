//! Row moments and the local Maxwellian used by the relaxation term.
//!
//! One routine serves both execution modes: the caller supplies the row/column
//! box to integrate over and a [`Support`] predicate (the active mask, or the
//! whole interior), and picks a policy.

use std::f64::consts::PI;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::field::RowMoments;
use super::grid::{Bounds, Grid};
use super::support::Support;
use super::sync::{PARALLEL_ROW_THRESHOLD, map_rows};

/// How drift velocity and temperature of the local equilibrium are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquilibriumPolicy {
    /// Zero drift, bath temperature.
    #[default]
    Linearized,
    /// Measured drift, bath temperature.
    Isothermal,
    /// Measured drift and temperature.
    Full,
}

/// Physical constants of the bath and particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Physics {
    pub mass: f64,
    pub kb: f64,
    pub temperature: f64,
    pub gamma: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Moment {
    density: f64,
    velocity: f64,
    temperature: f64,
}

#[inline]
fn row_moment<S: Support>(
    grid: &Grid,
    physics: &Physics,
    policy: EquilibriumPolicy,
    support: &S,
    cols: &Bounds,
    f: &[f64],
    momenta: &[f64],
    i1: usize,
) -> Moment {
    let h2 = grid.spacing()[1];
    let base = grid.index(i1, 0);
    let active = || cols.cols().filter(move |&i2| support.is_active(base + i2));

    let mut density = 0.0;
    for i2 in active() {
        density += f[base + i2] * h2;
    }
    if density <= 0.0 || !density.is_finite() {
        return Moment::default();
    }

    let m = physics.mass;
    let velocity = match policy {
        EquilibriumPolicy::Linearized => 0.0,
        EquilibriumPolicy::Isothermal | EquilibriumPolicy::Full => {
            let mut sum = 0.0;
            for i2 in active() {
                sum += momenta[i2] * f[base + i2] * h2;
            }
            sum / (m * density)
        }
    };
    let temperature = match policy {
        EquilibriumPolicy::Full => {
            let mut sum = 0.0;
            for i2 in active() {
                let dv = momenta[i2] - m * velocity;
                sum += dv * dv * f[base + i2] * h2;
            }
            sum / (m * physics.kb * density)
        }
        _ => physics.temperature,
    };
    Moment {
        density,
        velocity,
        temperature,
    }
}

/// Local Maxwellian at momentum `p` for a row with the given moments.
/// Non-finite results and results above `cap` collapse to zero.
#[inline(always)]
pub fn maxwellian(density: f64, velocity: f64, temperature: f64, physics: &Physics, p: f64, cap: f64) -> f64 {
    if density <= 0.0 {
        return 0.0;
    }
    let mkt = physics.mass * physics.kb * temperature;
    let dp = p - physics.mass * velocity;
    let value = density * (1.0 / (2.0 * PI * mkt)).sqrt() * (-dp * dp / (2.0 * mkt)).exp();
    if value.is_finite() && value <= cap { value } else { 0.0 }
}

/// Recompute row moments over `region` and the equilibrium field at every
/// supported cell of `region`. Rows outside `region` get zero moments.
#[allow(clippy::too_many_arguments)]
pub fn compute_equilibrium<S: Support>(
    grid: &Grid,
    physics: &Physics,
    policy: EquilibriumPolicy,
    support: &S,
    region: Bounds,
    f: &[f64],
    momenta: &[f64],
    feq: &mut [f64],
    moments: &mut RowMoments,
) {
    let width = region.cols().count();
    let rows = map_rows(region.rows(), width, |i1| {
        row_moment(grid, physics, policy, support, &region, f, momenta, i1)
    });

    for i1 in 0..moments.rows() {
        moments.clear_row(i1);
    }
    for (i1, m) in region.rows().zip(&rows) {
        moments.density[i1] = m.density;
        moments.velocity[i1] = m.velocity;
        moments.temperature[i1] = m.temperature;
    }

    let cap = 1.0 / grid.cell_volume();
    let stride = grid.stride();
    let first_row = region.min[0];
    let fill_row = |(offset, row): (usize, &mut [f64])| {
        let i1 = first_row + offset;
        let m = rows[offset];
        let base = grid.index(i1, 0);
        for i2 in region.cols() {
            if support.is_active(base + i2) {
                row[i2] = maxwellian(m.density, m.velocity, m.temperature, physics, momenta[i2], cap);
            }
        }
    };
    let block = &mut feq[first_row * stride..(region.max[0] + 1) * stride];
    if rows.len() * width >= PARALLEL_ROW_THRESHOLD {
        block.par_chunks_mut(stride).enumerate().for_each(fill_row);
    } else {
        block.chunks_mut(stride).enumerate().for_each(fill_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::support::{InteriorSupport, MaskSupport};

    fn physics() -> Physics {
        Physics {
            mass: 1.0,
            kb: 1.0,
            temperature: 0.5,
            gamma: 0.1,
        }
    }

    fn grid() -> Grid {
        Grid::new([-2.0, -6.0], [2.0, 6.0], [0.5, 0.05], 2).unwrap()
    }

    fn gaussian_rows(grid: &Grid, shift: f64, width: f64) -> Vec<f64> {
        let mut f = vec![0.0; grid.len()];
        let interior = grid.interior();
        for i1 in interior.rows() {
            for i2 in interior.cols() {
                let p = grid.x2(i2) - shift;
                f[grid.index(i1, i2)] = (-p * p / (2.0 * width)).exp();
            }
        }
        f
    }

    fn run(policy: EquilibriumPolicy, f: &[f64]) -> (Vec<f64>, RowMoments) {
        let grid = grid();
        let momenta = grid.momenta();
        let mut feq = vec![0.0; grid.len()];
        let mut moments = RowMoments::zeros(grid.shape()[0]);
        compute_equilibrium(
            &grid,
            &physics(),
            policy,
            &InteriorSupport(&grid),
            grid.interior(),
            f,
            &momenta,
            &mut feq,
            &mut moments,
        );
        (feq, moments)
    }

    #[test]
    fn linearized_ignores_drift() {
        let grid = grid();
        let f = gaussian_rows(&grid, 0.8, 0.3);
        let (_, moments) = run(EquilibriumPolicy::Linearized, &f);
        let row = 5;
        assert!(moments.density[row] > 0.0);
        assert_eq!(moments.velocity[row], 0.0);
        assert_eq!(moments.temperature[row], 0.5);
    }

    #[test]
    fn isothermal_measures_drift_only() {
        let grid = grid();
        let f = gaussian_rows(&grid, 0.8, 0.3);
        let (_, moments) = run(EquilibriumPolicy::Isothermal, &f);
        assert!((moments.velocity[5] - 0.8).abs() < 1e-6);
        assert_eq!(moments.temperature[5], 0.5);
    }

    #[test]
    fn full_policy_recovers_gaussian_moments() {
        let grid = grid();
        let f = gaussian_rows(&grid, -0.4, 0.3);
        let (feq, moments) = run(EquilibriumPolicy::Full, &f);
        let width = 0.3f64;
        let expected_density = (2.0 * PI * width).sqrt();
        assert!((moments.density[5] - expected_density).abs() < 1e-6);
        assert!((moments.velocity[5] + 0.4).abs() < 1e-6);
        assert!((moments.temperature[5] - width).abs() < 1e-6);

        // the local Maxwellian reproduces the input profile
        let idx = grid.index(5, grid.interior().min[1] + 100);
        assert!((feq[idx] - f[idx]).abs() < 1e-6, "{} vs {}", feq[idx], f[idx]);
    }

    #[test]
    fn empty_rows_have_zero_equilibrium_and_outside_rows_are_cleared() {
        let grid = grid();
        let momenta = grid.momenta();
        let f = vec![0.0; grid.len()];
        let mut feq = vec![7.0; grid.len()];
        let mut moments = RowMoments::zeros(grid.shape()[0]);
        moments.density[0] = 3.0;
        let mask = vec![true; grid.len()];
        let region = Bounds { min: [3, 2], max: [4, 200] };
        compute_equilibrium(
            &grid,
            &physics(),
            EquilibriumPolicy::Full,
            &MaskSupport(&mask),
            region,
            &f,
            &momenta,
            &mut feq,
            &mut moments,
        );
        assert!(moments.density.iter().all(|&d| d == 0.0));
        assert_eq!(feq[grid.index(3, 50)], 0.0);
        assert_eq!(feq[grid.index(2, 50)], 7.0, "rows outside the region keep their buffer");
    }

    #[test]
    fn maxwellian_is_capped_by_cell_volume() {
        let p = physics();
        assert_eq!(maxwellian(10.0, 0.0, 1e-12, &p, 0.0, 100.0), 0.0);
        assert_eq!(maxwellian(1.0, 0.0, -1.0, &p, 0.0, 100.0), 0.0);
        assert_eq!(maxwellian(-1.0, 0.0, 1.0, &p, 0.0, 100.0), 0.0);
        let v = maxwellian(1.0, 0.0, 0.5, &p, 0.0, 100.0);
        assert!((v - (1.0 / PI).sqrt()).abs() < 1e-12);
    }
}
